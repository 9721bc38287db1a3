//! Extraction orchestrator client.
//!
//! The orchestrator performs OCR and field parsing for one document. It is an
//! external service; this module only models its call contract.

use async_trait::async_trait;
use tracing::{debug, instrument};

use docportal_core::{ExtractionOutcome, ExtractionRequest};

/// Performs the extraction for one job.
///
/// `Ok` with `success == false` is a failure reported by the orchestrator;
/// `Err` means the orchestrator could not be reached or answered garbage.
/// Callers treat both as a failed extraction.
#[async_trait]
pub trait ExtractionOrchestrator: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest)
        -> Result<ExtractionOutcome, OrchestratorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("orchestrator request failed: {0}")]
    Transport(String),
    #[error("orchestrator returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("orchestrator response could not be decoded: {0}")]
    Decode(String),
}

/// Orchestrator reached over HTTP (a serverless function on the hosted
/// backend by default).
#[derive(Debug, Clone)]
pub struct HttpExtractionOrchestrator {
    client: reqwest::Client,
    url: String,
    service_key: String,
}

impl HttpExtractionOrchestrator {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            service_key: service_key.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ExtractionOrchestrator for HttpExtractionOrchestrator {
    #[instrument(skip(self, request), fields(job_id = %request.job_id, url = %self.url))]
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, OrchestratorError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.service_key)
            .json(request)
            .send()
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OrchestratorError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let outcome: ExtractionOutcome = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::Decode(e.to_string()))?;

        debug!(
            success = outcome.success,
            confidence = outcome.confidence,
            processing_time_ms = outcome.processing_time_ms,
            "orchestrator answered"
        );
        Ok(outcome)
    }
}
