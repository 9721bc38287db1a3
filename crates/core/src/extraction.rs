//! Orchestrator call contract and the stored extraction record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{CarterId, JobId};
use crate::job::{DocumentType, ExtractionJob};

/// Input handed to the extraction orchestrator for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub job_id: JobId,
    pub carter_id: CarterId,
    pub document_type: DocumentType,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub metadata: serde_json::Value,
}

impl From<&ExtractionJob> for ExtractionRequest {
    fn from(job: &ExtractionJob) -> Self {
        Self {
            job_id: job.id.clone(),
            carter_id: job.carter_id.clone(),
            document_type: job.document_type,
            file_path: job.file_path.clone(),
            file_size: job.file_size,
            mime_type: job.mime_type.clone(),
            metadata: job.metadata.clone(),
        }
    }
}

/// Structured answer from the orchestrator.
///
/// `success == false` is a reported failure; `error` then carries the
/// message persisted on the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub success: bool,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub parsed_data: serde_json::Value,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub fields_found: Vec<String>,
    #[serde(default)]
    pub fields_missing: Vec<String>,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ExtractionOutcome {
    /// Message to persist when the outcome is a failure.
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.errors.first().cloned())
            .unwrap_or_else(|| "extraction failed without an error message".to_string())
    }
}

/// Status stored on an extraction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Completed,
    Partial,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Completed => "completed",
            ExtractionStatus::Partial => "partial",
        }
    }
}

/// Persisted result of a successful extraction. At most one per job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub job_id: JobId,
    pub carter_id: CarterId,
    pub document_type: DocumentType,
    pub file_path: String,
    pub extraction_status: ExtractionStatus,
    pub ocr_text: Option<String>,
    pub extracted_data: serde_json::Value,
    pub confidence_score: f64,
    pub fields_found: Vec<String>,
    pub fields_missing: Vec<String>,
    pub processing_time_ms: u64,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionRecord {
    /// Build the record for a job from a successful orchestrator outcome.
    ///
    /// Outcomes that leave fields missing are stored as `partial`.
    pub fn from_outcome(job: &ExtractionJob, outcome: &ExtractionOutcome, now: DateTime<Utc>) -> Self {
        let extraction_status = if outcome.fields_missing.is_empty() {
            ExtractionStatus::Completed
        } else {
            ExtractionStatus::Partial
        };

        Self {
            job_id: job.id.clone(),
            carter_id: job.carter_id.clone(),
            document_type: job.document_type,
            file_path: job.file_path.clone(),
            extraction_status,
            ocr_text: outcome.ocr_text.clone(),
            extracted_data: outcome.parsed_data.clone(),
            confidence_score: outcome.confidence,
            fields_found: outcome.fields_found.clone(),
            fields_missing: outcome.fields_missing.clone(),
            processing_time_ms: outcome.processing_time_ms,
            errors: outcome.errors.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}
