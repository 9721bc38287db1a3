//! Job store abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docportal_core::{
    CarterId, DomainError, ExtractionJob, ExtractionRecord, JobId, JobStatus, JobTransition,
};

/// Query/command interface of the row store holding jobs and extraction
/// records.
///
/// Status changes go through [`JobStore::transition`], which is a
/// compare-and-swap on the job's current status: two callers racing on the
/// same job can never both win.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    async fn insert_job(&self, job: ExtractionJob) -> Result<(), JobStoreError>;

    /// Get a job by ID.
    async fn get_job(&self, job_id: &JobId) -> Result<Option<ExtractionJob>, JobStoreError>;

    /// Get a job by ID, only if it currently has `status`.
    async fn find_job_in_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> Result<Option<ExtractionJob>, JobStoreError>;

    /// Apply `transition` if the job is still in `transition.expected_from()`.
    ///
    /// Returns the updated job, or `None` when the job is missing or its
    /// status no longer matches.
    async fn transition(
        &self,
        job_id: &JobId,
        transition: &JobTransition,
    ) -> Result<Option<ExtractionJob>, JobStoreError>;

    /// List jobs, newest first.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<ExtractionJob>, JobStoreError>;

    /// Count jobs in a status.
    async fn count_by_status(&self, status: JobStatus) -> Result<u64, JobStoreError>;

    /// Count jobs created at or after `since`.
    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, JobStoreError>;

    /// Failed jobs whose `retry_count` is below their own `max_retries`,
    /// oldest first.
    async fn list_retry_eligible(&self, limit: usize) -> Result<Vec<ExtractionJob>, JobStoreError>;

    /// Store-side retry procedure. Returns whether the job was requeued.
    async fn retry_failed_job(&self, job_id: &JobId) -> Result<bool, JobStoreError>;

    /// Insert or replace the extraction record keyed on its job id.
    async fn upsert_extraction(&self, record: ExtractionRecord) -> Result<(), JobStoreError>;

    /// Get the extraction record of a job.
    async fn get_extraction(&self, job_id: &JobId)
        -> Result<Option<ExtractionRecord>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Filter for [`JobStore::list_jobs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub carter_id: Option<CarterId>,
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            carter_id: None,
            limit: 50,
        }
    }
}

impl JobFilter {
    fn matches(&self, job: &ExtractionJob) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.carter_id.as_ref().is_none_or(|c| &job.carter_id == c)
    }
}

/// In-memory job store for tests/dev.
///
/// [`InMemoryJobStore::set_available`] simulates an outage of the remote
/// store: while unavailable every call fails with
/// [`JobStoreError::Unavailable`].
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, ExtractionJob>>,
    extractions: RwLock<HashMap<JobId, ExtractionRecord>>,
    available: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            extractions: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored extraction records.
    pub fn extraction_count(&self) -> usize {
        self.extractions.read().map(|e| e.len()).unwrap_or_default()
    }

    fn ensure_available(&self) -> Result<(), JobStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(JobStoreError::Unavailable("in-memory store marked unavailable".to_string()))
        }
    }

    fn jobs_read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, ExtractionJob>>, JobStoreError> {
        self.ensure_available()?;
        self.jobs.read().map_err(|_| poisoned())
    }

    fn jobs_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, ExtractionJob>>, JobStoreError> {
        self.ensure_available()?;
        self.jobs.write().map_err(|_| poisoned())
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: ExtractionJob) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_write()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<ExtractionJob>, JobStoreError> {
        Ok(self.jobs_read()?.get(job_id).cloned())
    }

    async fn find_job_in_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> Result<Option<ExtractionJob>, JobStoreError> {
        let jobs = self.jobs_read()?;
        Ok(jobs.get(job_id).filter(|j| j.status == status).cloned())
    }

    async fn transition(
        &self,
        job_id: &JobId,
        transition: &JobTransition,
    ) -> Result<Option<ExtractionJob>, JobStoreError> {
        let mut jobs = self.jobs_write()?;
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(None);
        };
        if job.status != transition.expected_from() {
            return Ok(None);
        }

        job.apply(transition)?;
        Ok(Some(job.clone()))
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<ExtractionJob>, JobStoreError> {
        let jobs = self.jobs_read()?;
        let mut result: Vec<_> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        result.truncate(filter.limit);
        Ok(result)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64, JobStoreError> {
        let jobs = self.jobs_read()?;
        Ok(jobs.values().filter(|j| j.status == status).count() as u64)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let jobs = self.jobs_read()?;
        Ok(jobs.values().filter(|j| j.created_at >= since).count() as u64)
    }

    async fn list_retry_eligible(&self, limit: usize) -> Result<Vec<ExtractionJob>, JobStoreError> {
        let jobs = self.jobs_read()?;
        let mut result: Vec<_> = jobs.values().filter(|j| j.is_retry_eligible()).cloned().collect();

        // Oldest failures first
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        result.truncate(limit);
        Ok(result)
    }

    async fn retry_failed_job(&self, job_id: &JobId) -> Result<bool, JobStoreError> {
        let mut jobs = self.jobs_write()?;
        match jobs.get_mut(job_id) {
            Some(job) if job.is_retry_eligible() => {
                job.apply(&JobTransition::requeue(Utc::now()))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_extraction(&self, record: ExtractionRecord) -> Result<(), JobStoreError> {
        self.ensure_available()?;
        let mut extractions = self.extractions.write().map_err(|_| poisoned())?;

        let record = match extractions.get(&record.job_id) {
            Some(existing) => ExtractionRecord {
                created_at: existing.created_at,
                ..record
            },
            None => record,
        };
        extractions.insert(record.job_id.clone(), record);
        Ok(())
    }

    async fn get_extraction(
        &self,
        job_id: &JobId,
    ) -> Result<Option<ExtractionRecord>, JobStoreError> {
        self.ensure_available()?;
        let extractions = self.extractions.read().map_err(|_| poisoned())?;
        Ok(extractions.get(job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_support::{queued_job, sample_outcome};

    #[tokio::test]
    async fn insert_and_find_by_status() {
        let store = InMemoryJobStore::new();
        let job = queued_job("j1");
        store.insert_job(job.clone()).await.unwrap();

        let found = store.find_job_in_status(&job.id, JobStatus::Queued).await.unwrap();
        assert_eq!(found, Some(job.clone()));

        let wrong = store.find_job_in_status(&job.id, JobStatus::Failed).await.unwrap();
        assert!(wrong.is_none());

        assert!(matches!(
            store.insert_job(job).await,
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn transition_is_compare_and_swap() {
        let store = InMemoryJobStore::new();
        let job = queued_job("j1");
        store.insert_job(job.clone()).await.unwrap();

        let first = store.transition(&job.id, &JobTransition::start(Utc::now())).await.unwrap();
        assert_eq!(first.map(|j| j.status), Some(JobStatus::Processing));

        // Second caller racing on the same queued job loses.
        let second = store.transition(&job.id, &JobTransition::start(Utc::now())).await.unwrap();
        assert!(second.is_none());

        let missing = JobId::parse("nope").unwrap();
        assert!(store
            .transition(&missing, &JobTransition::start(Utc::now()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn upsert_keeps_one_record_per_job() {
        let store = InMemoryJobStore::new();
        let job = queued_job("j1");
        let outcome = sample_outcome(0.9);

        let first = ExtractionRecord::from_outcome(&job, &outcome, Utc::now());
        store.upsert_extraction(first.clone()).await.unwrap();

        let mut second = ExtractionRecord::from_outcome(&job, &sample_outcome(0.5), Utc::now());
        second.created_at = Utc::now() + chrono::Duration::seconds(5);
        store.upsert_extraction(second).await.unwrap();

        assert_eq!(store.extraction_count(), 1);
        let stored = store.get_extraction(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.confidence_score, 0.5);
        assert_eq!(stored.created_at, first.created_at);
    }

    #[tokio::test]
    async fn retry_respects_each_jobs_budget() {
        let store = InMemoryJobStore::new();

        let mut exhausted = queued_job("exhausted");
        exhausted.status = JobStatus::Failed;
        exhausted.retry_count = 2;
        exhausted.max_retries = 2;

        let mut eligible = queued_job("eligible");
        eligible.status = JobStatus::Failed;
        eligible.retry_count = 4;
        eligible.max_retries = 5;

        store.insert_job(exhausted.clone()).await.unwrap();
        store.insert_job(eligible.clone()).await.unwrap();

        let listed = store.list_retry_eligible(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, eligible.id);

        assert!(store.retry_failed_job(&eligible.id).await.unwrap());
        assert!(!store.retry_failed_job(&exhausted.id).await.unwrap());

        let requeued = store.get_job(&eligible.id).await.unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert_eq!(requeued.retry_count, 5);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryJobStore::new();
        store.set_available(false);

        assert!(matches!(
            store.count_by_status(JobStatus::Queued).await,
            Err(JobStoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.get_extraction(&JobId::parse("j1").unwrap()).await,
            Err(JobStoreError::Unavailable(_))
        ));

        store.set_available(true);
        assert_eq!(store.count_by_status(JobStatus::Queued).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_filters_and_counts() {
        let store = InMemoryJobStore::new();
        for i in 0..5 {
            store.insert_job(queued_job(&format!("j{i}"))).await.unwrap();
        }
        let mut failed = queued_job("f1");
        failed.status = JobStatus::Failed;
        store.insert_job(failed).await.unwrap();

        let queued = store
            .list_jobs(&JobFilter {
                status: Some(JobStatus::Queued),
                limit: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(queued.len(), 3);
        assert!(queued.iter().all(|j| j.status == JobStatus::Queued));

        assert_eq!(store.count_by_status(JobStatus::Queued).await.unwrap(), 5);
        assert_eq!(store.count_by_status(JobStatus::Failed).await.unwrap(), 1);

        let yesterday = Utc::now() - chrono::Duration::days(1);
        assert_eq!(store.count_created_since(yesterday).await.unwrap(), 6);
    }
}
