//! Extraction jobs and their status lifecycle.
//!
//! ```text
//! queued ──► processing ──► completed
//!   ▲             │
//!   │             ▼
//!   └──(retry)── failed
//! ```
//!
//! Every status change goes through [`JobTransition`] so that the same rules
//! apply to the in-memory store and to the conditional SQL update.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{CarterId, JobId};

/// Retry budget given to jobs that do not specify one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up
    Queued,
    /// Handed to the orchestrator
    Processing,
    /// Extraction succeeded and a record was stored
    Completed,
    /// Extraction failed; may be retried while under budget
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Failed, JobStatus::Queued)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown job status '{other}' (expected queued, processing, completed or failed)"
            ))),
        }
    }
}

/// Kind of document submitted for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    License,
    CarterCert,
    Insurance,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::License => "license",
            DocumentType::CarterCert => "carter_cert",
            DocumentType::Insurance => "insurance",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "license" => Ok(DocumentType::License),
            "carter_cert" => Ok(DocumentType::CarterCert),
            "insurance" => Ok(DocumentType::Insurance),
            other => Err(DomainError::validation(format!(
                "unknown document type '{other}' (expected license, carter_cert or insurance)"
            ))),
        }
    }
}

/// Attributes of a job supplied at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub carter_id: CarterId,
    pub document_type: DocumentType,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub metadata: serde_json::Value,
    pub max_retries: u32,
}

/// One unit of requested document extraction work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub id: JobId,
    pub status: JobStatus,
    pub carter_id: CarterId,
    pub document_type: DocumentType,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub metadata: serde_json::Value,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionJob {
    /// A freshly queued job.
    pub fn queued(id: JobId, new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            carter_id: new.carter_id,
            document_type: new.document_type,
            file_path: new.file_path,
            file_size: new.file_size,
            mime_type: new.mime_type,
            metadata: new.metadata,
            retry_count: 0,
            max_retries: new.max_retries,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Failed and still under this job's own retry budget.
    pub fn is_retry_eligible(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }

    /// Apply a status change, enforcing the lifecycle.
    pub fn apply(&mut self, transition: &JobTransition) -> DomainResult<()> {
        if !self.status.can_transition_to(transition.to) {
            return Err(DomainError::invalid_transition(self.status, transition.to));
        }

        match transition.to {
            JobStatus::Processing => {
                self.started_at = Some(transition.at);
                self.completed_at = None;
                self.error_message = None;
            }
            JobStatus::Completed => {
                self.completed_at = Some(transition.at);
                self.error_message = None;
            }
            JobStatus::Failed => {
                self.completed_at = Some(transition.at);
                self.error_message = transition.error_message.clone();
            }
            JobStatus::Queued => {
                // Keep the last error visible until the next attempt starts.
                self.retry_count += 1;
                self.started_at = None;
                self.completed_at = None;
            }
        }

        self.status = transition.to;
        self.updated_at = transition.at;
        Ok(())
    }
}

/// A requested status change, applied only if the job is still in the
/// expected source status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    pub to: JobStatus,
    pub at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl JobTransition {
    /// `queued -> processing`, recording the start time.
    pub fn start(at: DateTime<Utc>) -> Self {
        Self {
            to: JobStatus::Processing,
            at,
            error_message: None,
        }
    }

    /// `processing -> completed`, recording the completion time.
    pub fn complete(at: DateTime<Utc>) -> Self {
        Self {
            to: JobStatus::Completed,
            at,
            error_message: None,
        }
    }

    /// `processing -> failed`, recording the error and completion time.
    pub fn fail(error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            to: JobStatus::Failed,
            at,
            error_message: Some(error.into()),
        }
    }

    /// `failed -> queued`, consuming one retry.
    pub fn requeue(at: DateTime<Utc>) -> Self {
        Self {
            to: JobStatus::Queued,
            at,
            error_message: None,
        }
    }

    /// The status a job must currently hold for this transition to apply.
    pub fn expected_from(&self) -> JobStatus {
        match self.to {
            JobStatus::Processing => JobStatus::Queued,
            JobStatus::Completed | JobStatus::Failed => JobStatus::Processing,
            JobStatus::Queued => JobStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_job() -> ExtractionJob {
        ExtractionJob::queued(
            JobId::parse("j1").unwrap(),
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

    #[test]
    fn happy_path_lifecycle() {
        let mut job = sample_job();
        let t0 = Utc::now();

        job.apply(&JobTransition::start(t0)).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.started_at, Some(t0));

        job.apply(&JobTransition::complete(t0)).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(t0));
        assert!(JobStatus::ALL.iter().all(|s| !job.status.can_transition_to(*s)));
    }

    #[test]
    fn failure_records_error_and_requeue_consumes_a_retry() {
        let mut job = sample_job();
        let now = Utc::now();

        job.apply(&JobTransition::start(now)).unwrap();
        job.apply(&JobTransition::fail("ocr timed out", now)).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("ocr timed out"));
        assert!(job.is_retry_eligible());

        job.apply(&JobTransition::requeue(now)).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn completing_a_queued_job_is_rejected() {
        let mut job = sample_job();
        let err = job.apply(&JobTransition::complete(Utc::now())).unwrap_err();
        assert_eq!(
            err,
            DomainError::invalid_transition(JobStatus::Queued, JobStatus::Completed)
        );
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn eligibility_uses_the_jobs_own_budget() {
        let mut job = sample_job();
        job.status = JobStatus::Failed;
        job.max_retries = 1;
        job.retry_count = 0;
        assert!(job.is_retry_eligible());

        job.retry_count = 1;
        assert!(!job.is_retry_eligible());
    }

    #[test]
    fn status_and_document_type_parse_from_store_strings() {
        assert_eq!("queued".parse::<JobStatus>().unwrap(), JobStatus::Queued);
        assert_eq!("carter_cert".parse::<DocumentType>().unwrap(), DocumentType::CarterCert);
        assert!("archived".parse::<JobStatus>().is_err());
    }

    proptest! {
        #[test]
        fn transitions_only_follow_the_lifecycle(from in 0usize..4, to in 0usize..4) {
            let from = JobStatus::ALL[from];
            let to = JobStatus::ALL[to];
            let mut job = sample_job();
            job.status = from;

            let transition = JobTransition { to, at: Utc::now(), error_message: None };
            let applied = job.apply(&transition).is_ok();

            prop_assert_eq!(applied, from.can_transition_to(to));
            if applied {
                prop_assert_eq!(transition.expected_from(), from);
            } else {
                prop_assert_eq!(job.status, from);
            }
        }
    }
}
