//! Batch job processor.
//!
//! Looks at the queue through the job store, kicks the hosted batch edge
//! function when there is work, reports queue statistics and re-queues failed
//! jobs that still have retry budget.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use docportal_core::JobStatus;

use super::store::{JobStore, JobStoreError};
use crate::config::ProcessorConfig;

const DEFAULT_TRIGGER_MESSAGE: &str = "Processing triggered successfully";

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("edge function request failed: {0}")]
    Http(String),
    #[error("edge function returned {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("edge function response could not be decoded: {0}")]
    Decode(String),
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerReport {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub success: bool,
    pub message: String,
    pub queued_count: u64,
    /// Whether the edge function was called.
    pub triggered: bool,
}

/// Queue counts for the dashboard.
///
/// When any count fails every figure is zero and `error` carries the reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub created_today: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueStats {
    fn degraded(reason: String) -> Self {
        Self {
            error: Some(reason),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
    pub retried_count: u64,
    pub eligible_count: u64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct EdgeFunctionReply {
    #[serde(default)]
    message: Option<String>,
}

pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    client: reqwest::Client,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(store: Arc<dyn JobStore>, config: ProcessorConfig) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Call the batch edge function once.
    #[instrument(skip(self), fields(url = %self.config.function_url()))]
    pub async fn trigger_processing(&self) -> Result<TriggerReport, ProcessorError> {
        let resp = self
            .client
            .post(self.config.function_url())
            .bearer_auth(self.config.service_key())
            .send()
            .await
            .map_err(|e| ProcessorError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unknown status").to_string();
            warn!(status = status.as_u16(), %reason, "edge function rejected trigger");
            return Err(ProcessorError::Status {
                status: status.as_u16(),
                reason,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ProcessorError::Http(e.to_string()))?;
        let message = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice::<EdgeFunctionReply>(&body)
                .map_err(|e| ProcessorError::Decode(e.to_string()))?
                .message
        };

        let message = message.unwrap_or_else(|| DEFAULT_TRIGGER_MESSAGE.to_string());
        info!(%message, "edge function triggered");
        Ok(TriggerReport {
            success: true,
            message,
        })
    }

    /// Trigger the edge function only when jobs are waiting.
    #[instrument(skip(self))]
    pub async fn check_and_process(&self) -> Result<CheckReport, ProcessorError> {
        let queued_count = self.store.count_by_status(JobStatus::Queued).await?;
        if queued_count == 0 {
            debug!("no queued jobs");
            return Ok(CheckReport {
                success: true,
                message: "No queued jobs to process".to_string(),
                queued_count: 0,
                triggered: false,
            });
        }

        let report = self.trigger_processing().await?;
        Ok(CheckReport {
            success: report.success,
            message: format!("Found {queued_count} queued jobs. {}", report.message),
            queued_count,
            triggered: true,
        })
    }

    /// Current queue counts. Never fails.
    pub async fn queue_stats(&self) -> QueueStats {
        self.queue_stats_at(Utc::now()).await
    }

    async fn queue_stats_at(&self, now: DateTime<Utc>) -> QueueStats {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);

        let counts = tokio::try_join!(
            self.store.count_by_status(JobStatus::Queued),
            self.store.count_by_status(JobStatus::Processing),
            self.store.count_by_status(JobStatus::Completed),
            self.store.count_by_status(JobStatus::Failed),
            self.store.count_created_since(start_of_day),
        );

        match counts {
            Ok((queued, processing, completed, failed, created_today)) => QueueStats {
                queued,
                processing,
                completed,
                failed,
                created_today,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "queue statistics unavailable; reporting zeros");
                QueueStats::degraded(e.to_string())
            }
        }
    }

    /// Re-queue failed jobs whose retry count is below their own limit.
    ///
    /// Jobs are retried one after another; a failed retry is logged and
    /// skipped.
    #[instrument(skip(self), fields(limit = self.config.retry_batch_limit()))]
    pub async fn retry_failed_jobs(&self) -> Result<RetryReport, ProcessorError> {
        let eligible = self
            .store
            .list_retry_eligible(self.config.retry_batch_limit())
            .await?;
        let eligible_count = eligible.len() as u64;

        let mut retried_count = 0u64;
        for job in &eligible {
            match self.store.retry_failed_job(&job.id).await {
                Ok(true) => retried_count += 1,
                Ok(false) => debug!(job_id = %job.id, "job no longer eligible for retry"),
                Err(e) => warn!(job_id = %job.id, error = %e, "retry failed"),
            }
        }

        if eligible_count > 0 {
            info!(retried_count, eligible_count, "failed jobs re-queued");
        }
        Ok(RetryReport {
            retried_count,
            eligible_count,
            message: format!("Retried {retried_count}/{eligible_count} failed jobs"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::test_support::{failed_job, queued_job, ScriptedStore};
    use chrono::TimeZone;
    use docportal_core::JobId;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FUNCTION_PATH: &str = "/functions/v1/process-extraction-jobs";

    fn processor(store: Arc<InMemoryJobStore>, base_url: &str) -> JobProcessor {
        let config = ProcessorConfig::new(base_url, "service-key").unwrap();
        JobProcessor::new(store, config)
    }

    #[tokio::test]
    async fn trigger_sends_bearer_and_reads_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FUNCTION_PATH))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "Processed 2 jobs"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let processor = processor(Arc::new(InMemoryJobStore::new()), &server.uri());
        let report = processor.trigger_processing().await.unwrap();

        assert!(report.success);
        assert_eq!(report.message, "Processed 2 jobs");
    }

    #[tokio::test]
    async fn trigger_without_message_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let processor = processor(Arc::new(InMemoryJobStore::new()), &server.uri());
        let report = processor.trigger_processing().await.unwrap();
        assert_eq!(report.message, DEFAULT_TRIGGER_MESSAGE);
    }

    #[tokio::test]
    async fn trigger_non_success_reports_status_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let processor = processor(Arc::new(InMemoryJobStore::new()), &server.uri());
        let err = processor.trigger_processing().await.unwrap_err();

        match err {
            ProcessorError::Status { status, reason } => {
                assert_eq!(status, 503);
                assert_eq!(reason, "Service Unavailable");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_with_empty_queue_never_calls_edge_function() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(failed_job("f1", 0, 3)).await.unwrap();
        let processor = processor(store, &server.uri());

        let report = processor.check_and_process().await.unwrap();
        assert!(report.success);
        assert!(!report.triggered);
        assert_eq!(report.queued_count, 0);
    }

    #[tokio::test]
    async fn check_with_queued_jobs_triggers_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FUNCTION_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(queued_job("q1")).await.unwrap();
        store.insert_job(queued_job("q2")).await.unwrap();
        let processor = processor(store, &server.uri());

        let report = processor.check_and_process().await.unwrap();
        assert!(report.triggered);
        assert_eq!(report.queued_count, 2);
        assert_eq!(report.message, "Found 2 queued jobs. ok");
    }

    #[tokio::test]
    async fn stats_count_each_status_and_todays_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(queued_job("q1")).await.unwrap();
        store.insert_job(failed_job("f1", 1, 3)).await.unwrap();
        let mut old = queued_job("old");
        old.status = JobStatus::Completed;
        old.created_at = Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap();
        store.insert_job(old).await.unwrap();

        let processor = processor(store, "http://localhost:1");
        let stats = processor.queue_stats().await;

        assert_eq!(stats.queued, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.created_today, 2);
        assert!(stats.error.is_none());
    }

    #[tokio::test]
    async fn stats_degrade_to_zeros_when_store_is_down() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(queued_job("q1")).await.unwrap();
        store.set_available(false);

        let processor = processor(store, "http://localhost:1");
        let stats = processor.queue_stats().await;

        assert_eq!(
            (stats.queued, stats.processing, stats.completed, stats.failed, stats.created_today),
            (0, 0, 0, 0, 0)
        );
        assert!(stats.error.is_some());
    }

    #[tokio::test]
    async fn retry_with_nothing_eligible_is_a_no_op() {
        let store = Arc::new(ScriptedStore::default());
        store.insert_job(failed_job("spent", 3, 3)).await.unwrap();
        store.insert_job(queued_job("q1")).await.unwrap();

        let processor = JobProcessor::new(
            store.clone(),
            ProcessorConfig::new("http://localhost:1", "service-key").unwrap(),
        );
        let report = processor.retry_failed_jobs().await.unwrap();

        assert_eq!(report.retried_count, 0);
        assert_eq!(report.eligible_count, 0);
        assert_eq!(store.retry_calls(), 0);
        let spent = store.get_job(&JobId::parse("spent").unwrap()).await.unwrap().unwrap();
        assert_eq!(spent.status, JobStatus::Failed);
        assert_eq!(spent.retry_count, 3);
    }

    #[tokio::test]
    async fn retry_uses_each_jobs_own_limit() {
        let store = Arc::new(ScriptedStore::default());
        store.insert_job(failed_job("a", 0, 1)).await.unwrap();
        store.insert_job(failed_job("b", 4, 5)).await.unwrap();
        store.insert_job(failed_job("c", 2, 2)).await.unwrap();

        let processor = JobProcessor::new(
            store.clone(),
            ProcessorConfig::new("http://localhost:1", "service-key").unwrap(),
        );
        let report = processor.retry_failed_jobs().await.unwrap();

        assert_eq!(report.eligible_count, 2);
        assert_eq!(report.retried_count, 2);
        assert_eq!(store.retry_calls(), 2);
        assert_eq!(report.message, "Retried 2/2 failed jobs");

        let b = store.get_job(&JobId::parse("b").unwrap()).await.unwrap().unwrap();
        assert_eq!(b.status, JobStatus::Queued);
        assert_eq!(b.retry_count, 5);
        let c = store.get_job(&JobId::parse("c").unwrap()).await.unwrap().unwrap();
        assert_eq!(c.status, JobStatus::Failed);
    }
}
