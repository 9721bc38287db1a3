//! Single-shot processing of one queued job.
//!
//! `queued → processing → {completed | failed}`, driven synchronously inside
//! one request. Every status write is a conditional transition, so a job can
//! be accepted by at most one caller.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use docportal_core::{
    ExtractionJob, ExtractionRecord, ExtractionRequest, JobId, JobStatus, JobTransition,
};

use super::store::{JobStore, JobStoreError};
use crate::orchestrator::ExtractionOrchestrator;

/// A job that went through extraction successfully.
#[derive(Debug, Clone)]
pub struct ProcessedJob {
    pub job: ExtractionJob,
    pub record: ExtractionRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Missing, or not in `queued` status. Nothing was written.
    #[error("job {0} not found or not in queued status")]
    NotQueued(JobId),
    /// The orchestrator failed; the job is now `failed` with this message.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Drives a queued job through extraction.
#[derive(Clone)]
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    orchestrator: Arc<dyn ExtractionOrchestrator>,
}

impl JobLifecycle {
    pub fn new(store: Arc<dyn JobStore>, orchestrator: Arc<dyn ExtractionOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// Process one job.
    ///
    /// No retry happens here: a failed extraction leaves the job `failed`
    /// for the processor's retry pass.
    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn process(&self, job_id: &JobId) -> Result<ProcessedJob, LifecycleError> {
        if self
            .store
            .find_job_in_status(job_id, JobStatus::Queued)
            .await?
            .is_none()
        {
            return Err(LifecycleError::NotQueued(job_id.clone()));
        }

        let Some(job) = self
            .store
            .transition(job_id, &JobTransition::start(Utc::now()))
            .await?
        else {
            warn!("job left queued status before it could be claimed");
            return Err(LifecycleError::NotQueued(job_id.clone()));
        };
        info!(document_type = %job.document_type, "job accepted for extraction");

        let request = ExtractionRequest::from(&job);
        let outcome = match self.orchestrator.extract(&request).await {
            Ok(outcome) if outcome.success => outcome,
            Ok(outcome) => return Err(self.fail(job_id, outcome.failure_message()).await),
            Err(e) => return Err(self.fail(job_id, e.to_string()).await),
        };

        let record = ExtractionRecord::from_outcome(&job, &outcome, Utc::now());
        if let Err(e) = self.store.upsert_extraction(record.clone()).await {
            error!(error = %e, "failed to store extraction record");
            self.record_failure(job_id, format!("failed to store extraction record: {e}"))
                .await;
            return Err(LifecycleError::Store(e));
        }

        let completed = self
            .store
            .transition(job_id, &JobTransition::complete(Utc::now()))
            .await
            .and_then(|job| {
                job.ok_or_else(|| {
                    JobStoreError::Storage(format!(
                        "job {job_id} left processing status during extraction"
                    ))
                })
            });
        let job = match completed {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "failed to mark job completed");
                self.record_failure(job_id, format!("failed to mark job completed: {e}"))
                    .await;
                return Err(LifecycleError::Store(e));
            }
        };

        info!(
            confidence = record.confidence_score,
            fields_found = record.fields_found.len(),
            fields_missing = record.fields_missing.len(),
            "job completed"
        );
        Ok(ProcessedJob { job, record })
    }

    /// Mark the job failed with the orchestrator's message.
    async fn fail(&self, job_id: &JobId, message: String) -> LifecycleError {
        warn!(error = %message, "extraction failed");
        match self
            .store
            .transition(job_id, &JobTransition::fail(message.clone(), Utc::now()))
            .await
        {
            Ok(Some(_)) => LifecycleError::ExtractionFailed(message),
            Ok(None) => {
                warn!("job left processing status; failure not recorded");
                LifecycleError::ExtractionFailed(message)
            }
            Err(e) => {
                error!(error = %e, "failed to record extraction failure");
                LifecycleError::Store(e)
            }
        }
    }

    async fn record_failure(&self, job_id: &JobId, message: String) {
        if let Err(e) = self
            .store
            .transition(job_id, &JobTransition::fail(message, Utc::now()))
            .await
        {
            error!(error = %e, "failed to mark job failed after store error");
        }
    }
}
