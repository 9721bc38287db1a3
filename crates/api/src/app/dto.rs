use serde::{Deserialize, Serialize};

use docportal_core::{
    CarterId, DocumentType, ExtractionJob, ExtractionRecord, JobStatus, NewJob,
    DEFAULT_MAX_RETRIES,
};
use docportal_infra::jobs::{JobFilter, ProcessedJob};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessJobRequest {
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJobRequest {
    pub carter_id: String,
    pub document_type: String,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub metadata: Option<serde_json::Value>,
    pub max_retries: Option<u32>,
}

impl EnqueueJobRequest {
    pub fn into_new_job(self) -> Result<NewJob, docportal_core::DomainError> {
        if self.file_path.trim().is_empty() {
            return Err(docportal_core::DomainError::validation("filePath is required"));
        }
        Ok(NewJob {
            carter_id: CarterId::parse(self.carter_id)?,
            document_type: self.document_type.parse::<DocumentType>()?,
            file_path: self.file_path,
            file_size: self.file_size,
            mime_type: self.mime_type,
            metadata: self.metadata.unwrap_or_else(|| serde_json::json!({})),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub carter_id: Option<String>,
    pub limit: Option<usize>,
}

impl ListJobsQuery {
    pub fn into_filter(self) -> Result<JobFilter, docportal_core::DomainError> {
        let mut filter = JobFilter::default();
        if let Some(raw) = self.status {
            filter.status = Some(raw.parse::<JobStatus>()?);
        }
        if let Some(raw) = self.carter_id {
            filter.carter_id = Some(CarterId::parse(raw)?);
        }
        if let Some(limit) = self.limit {
            filter.limit = limit.clamp(1, 500);
        }
        Ok(filter)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessJobResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub extracted_data: serde_json::Value,
    pub confidence: f64,
    pub fields_found: Vec<String>,
}

impl From<ProcessedJob> for ProcessJobResponse {
    fn from(processed: ProcessedJob) -> Self {
        Self {
            success: true,
            message: format!("Job {} processed successfully", processed.job.id),
            result: Some(ProcessResult {
                extracted_data: processed.record.extracted_data,
                confidence: processed.record.confidence_score,
                fields_found: processed.record.fields_found,
            }),
        }
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn job_to_json(job: &ExtractionJob) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.as_str(),
        "status": job.status.as_str(),
        "carterId": job.carter_id.as_str(),
        "documentType": job.document_type.as_str(),
        "filePath": job.file_path,
        "fileSize": job.file_size,
        "mimeType": job.mime_type,
        "metadata": job.metadata,
        "retryCount": job.retry_count,
        "maxRetries": job.max_retries,
        "startedAt": job.started_at,
        "completedAt": job.completed_at,
        "errorMessage": job.error_message,
        "createdAt": job.created_at,
        "updatedAt": job.updated_at,
    })
}

pub fn extraction_to_json(record: &ExtractionRecord) -> serde_json::Value {
    serde_json::json!({
        "jobId": record.job_id.as_str(),
        "carterId": record.carter_id.as_str(),
        "documentType": record.document_type.as_str(),
        "filePath": record.file_path,
        "extractionStatus": record.extraction_status.as_str(),
        "ocrText": record.ocr_text,
        "extractedData": record.extracted_data,
        "confidenceScore": record.confidence_score,
        "fieldsFound": record.fields_found,
        "fieldsMissing": record.fields_missing,
        "processingTimeMs": record.processing_time_ms,
        "errors": record.errors,
        "createdAt": record.created_at,
        "updatedAt": record.updated_at,
    })
}
