//! Fixtures shared by the job module tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docportal_core::{
    CarterId, DocumentType, ExtractionJob, ExtractionOutcome, ExtractionRecord, JobId, JobStatus,
    JobTransition, NewJob, DEFAULT_MAX_RETRIES,
};

use super::store::{InMemoryJobStore, JobFilter, JobStore, JobStoreError};

pub(crate) fn queued_job(id: &str) -> ExtractionJob {
    ExtractionJob::queued(
        JobId::parse(id).unwrap(),
        NewJob {
            carter_id: CarterId::parse("c1").unwrap(),
            document_type: DocumentType::License,
            file_path: "/f".to_string(),
            file_size: 100,
            mime_type: "image/png".to_string(),
            metadata: serde_json::json!({}),
            max_retries: DEFAULT_MAX_RETRIES,
        },
        Utc::now(),
    )
}

pub(crate) fn failed_job(id: &str, retry_count: u32, max_retries: u32) -> ExtractionJob {
    let mut job = queued_job(id);
    job.status = JobStatus::Failed;
    job.retry_count = retry_count;
    job.max_retries = max_retries;
    job.error_message = Some("previous attempt failed".to_string());
    job
}

pub(crate) fn sample_outcome(confidence: f64) -> ExtractionOutcome {
    ExtractionOutcome {
        success: true,
        ocr_text: Some("DRIVER LICENSE L-123".to_string()),
        parsed_data: serde_json::json!({"licenseNumber": "L-123"}),
        confidence,
        fields_found: vec!["licenseNumber".to_string()],
        fields_missing: vec![],
        processing_time_ms: 120,
        error: None,
        errors: vec![],
    }
}

/// In-memory store that can refuse transitions into one status and counts
/// calls to the retry procedure.
#[derive(Debug, Default)]
pub(crate) struct ScriptedStore {
    pub(crate) inner: InMemoryJobStore,
    refuse_transitions_to: Mutex<Option<JobStatus>>,
    retry_calls: AtomicUsize,
}

impl ScriptedStore {
    pub(crate) fn refuse_transitions_to(&self, status: JobStatus) {
        *self.refuse_transitions_to.lock().unwrap() = Some(status);
    }

    pub(crate) fn retry_calls(&self) -> usize {
        self.retry_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for ScriptedStore {
    async fn insert_job(&self, job: ExtractionJob) -> Result<(), JobStoreError> {
        self.inner.insert_job(job).await
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<ExtractionJob>, JobStoreError> {
        self.inner.get_job(job_id).await
    }

    async fn find_job_in_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> Result<Option<ExtractionJob>, JobStoreError> {
        self.inner.find_job_in_status(job_id, status).await
    }

    async fn transition(
        &self,
        job_id: &JobId,
        transition: &JobTransition,
    ) -> Result<Option<ExtractionJob>, JobStoreError> {
        let refused = *self.refuse_transitions_to.lock().unwrap();
        if refused == Some(transition.to) {
            return Err(JobStoreError::Unavailable(format!(
                "transition to {} refused",
                transition.to
            )));
        }
        self.inner.transition(job_id, transition).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<ExtractionJob>, JobStoreError> {
        self.inner.list_jobs(filter).await
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64, JobStoreError> {
        self.inner.count_by_status(status).await
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, JobStoreError> {
        self.inner.count_created_since(since).await
    }

    async fn list_retry_eligible(&self, limit: usize) -> Result<Vec<ExtractionJob>, JobStoreError> {
        self.inner.list_retry_eligible(limit).await
    }

    async fn retry_failed_job(&self, job_id: &JobId) -> Result<bool, JobStoreError> {
        self.retry_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.retry_failed_job(job_id).await
    }

    async fn upsert_extraction(&self, record: ExtractionRecord) -> Result<(), JobStoreError> {
        self.inner.upsert_extraction(record).await
    }

    async fn get_extraction(
        &self,
        job_id: &JobId,
    ) -> Result<Option<ExtractionRecord>, JobStoreError> {
        self.inner.get_extraction(job_id).await
    }
}
