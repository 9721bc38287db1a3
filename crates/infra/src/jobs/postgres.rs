//! Postgres-backed job store.
//!
//! Talks to the backend-as-a-service database directly. The schema is owned
//! by the hosted project; this module expects:
//!
//! | table / function | notes |
//! |---|---|
//! | `extraction_jobs` | `id uuid` primary key, `status text`, `carter_id text`, `document_type text`, `file_path text`, `file_size bigint`, `mime_type text`, `metadata jsonb`, `retry_count int`, `max_retries int`, `started_at`, `completed_at`, `created_at`, `updated_at timestamptz`, `error_message text` |
//! | `document_extractions` | unique `job_id uuid`, `text[]` field lists, `extracted_data jsonb`, `confidence_score double precision`, `processing_time_ms bigint` |
//! | `retry_failed_job(uuid) returns boolean` | requeues an eligible failed job |
//!
//! ## Status changes
//!
//! `transition()` loads the job in its expected status, applies the lifecycle
//! rules in Rust, then writes back with `WHERE id = $1 AND status = $expected`.
//! If another writer moved the job in between, zero rows match and the call
//! reports `None`, exactly like a lost compare-and-swap.
//!
//! ## Error Mapping
//!
//! | SQLx error | JobStoreError |
//! |---|---|
//! | Database, code `23505` (unique violation) | `AlreadyExists` (inserts only) |
//! | `PoolClosed`, `PoolTimedOut`, `Io`, `Tls` | `Unavailable` |
//! | anything else | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use docportal_core::{
    CarterId, DomainError, ExtractionJob, ExtractionRecord, ExtractionStatus, JobId, JobStatus,
    JobTransition,
};

use super::store::{JobFilter, JobStore, JobStoreError};

const JOB_COLUMNS: &str = r#"
    id, status, carter_id, document_type, file_path, file_size, mime_type, metadata,
    retry_count, max_retries, started_at, completed_at, error_message, created_at, updated_at
"#;

const EXTRACTION_COLUMNS: &str = r#"
    job_id, carter_id, document_type, file_path, extraction_status, ocr_text, extracted_data,
    confidence_score, fields_found, fields_missing, processing_time_ms, errors, created_at,
    updated_at
"#;

/// Postgres-backed job store.
///
/// Uses the SQLx connection pool, so it is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_job(
        &self,
        id: Uuid,
        status: Option<JobStatus>,
    ) -> Result<Option<ExtractionJob>, JobStoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM extraction_jobs \
             WHERE id = $1 AND ($2::text IS NULL OR status = $2)"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .bind(status.map(|s| s.as_str()))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_job", e))?;

        row.map(ExtractionJob::try_from).transpose()
    }
}

/// Ids in the `extraction_jobs` table are UUIDs; anything else cannot match a row.
fn row_id(job_id: &JobId) -> Option<Uuid> {
    Uuid::parse_str(job_id.as_str()).ok()
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn insert_job(&self, job: ExtractionJob) -> Result<(), JobStoreError> {
        let id = row_id(&job.id).ok_or_else(|| {
            DomainError::invalid_id(format!("job id '{}' is not a UUID", job.id))
        })?;

        sqlx::query(
            r#"
            INSERT INTO extraction_jobs (
                id, status, carter_id, document_type, file_path, file_size, mime_type, metadata,
                retry_count, max_retries, started_at, completed_at, error_message, created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(id)
        .bind(job.status.as_str())
        .bind(job.carter_id.as_str())
        .bind(job.document_type.as_str())
        .bind(&job.file_path)
        .bind(job.file_size as i64)
        .bind(&job.mime_type)
        .bind(&job.metadata)
        .bind(job.retry_count as i32)
        .bind(job.max_retries as i32)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id.clone())
            } else {
                map_sqlx_error("insert_job", e)
            }
        })?;

        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<ExtractionJob>, JobStoreError> {
        match row_id(job_id) {
            Some(id) => self.fetch_job(id, None).await,
            None => Ok(None),
        }
    }

    async fn find_job_in_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> Result<Option<ExtractionJob>, JobStoreError> {
        match row_id(job_id) {
            Some(id) => self.fetch_job(id, Some(status)).await,
            None => Ok(None),
        }
    }

    #[instrument(skip(self, transition), fields(to = %transition.to))]
    async fn transition(
        &self,
        job_id: &JobId,
        transition: &JobTransition,
    ) -> Result<Option<ExtractionJob>, JobStoreError> {
        let Some(id) = row_id(job_id) else {
            return Ok(None);
        };
        let expected = transition.expected_from();
        let Some(mut job) = self.fetch_job(id, Some(expected)).await? else {
            return Ok(None);
        };
        job.apply(transition)?;

        let result = sqlx::query(
            r#"
            UPDATE extraction_jobs
            SET status = $2,
                retry_count = $3,
                started_at = $4,
                completed_at = $5,
                error_message = $6,
                updated_at = $7
            WHERE id = $1 AND status = $8
            "#,
        )
        .bind(id)
        .bind(job.status.as_str())
        .bind(job.retry_count as i32)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(job.updated_at)
        .bind(expected.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transition", e))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(job))
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<ExtractionJob>, JobStoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM extraction_jobs \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR carter_id = $2) \
             ORDER BY created_at DESC, id ASC \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.carter_id.as_ref().map(|c| c.as_str()))
            .bind(filter.limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_jobs", e))?;

        rows.into_iter().map(ExtractionJob::try_from).collect()
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64, JobStoreError> {
        let total: i64 =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM extraction_jobs WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_by_status", e))?;
        Ok(total.max(0) as u64)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let total: i64 =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM extraction_jobs WHERE created_at >= $1")
                .bind(since)
                .fetch_one(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_created_since", e))?;
        Ok(total.max(0) as u64)
    }

    async fn list_retry_eligible(&self, limit: usize) -> Result<Vec<ExtractionJob>, JobStoreError> {
        // Compare against each row's own budget.
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM extraction_jobs \
             WHERE status = 'failed' AND retry_count < max_retries \
             ORDER BY created_at ASC, id ASC \
             LIMIT $1"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_retry_eligible", e))?;

        rows.into_iter().map(ExtractionJob::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn retry_failed_job(&self, job_id: &JobId) -> Result<bool, JobStoreError> {
        let Some(id) = row_id(job_id) else {
            return Ok(false);
        };
        let retried: Option<bool> = sqlx::query_scalar::<_, Option<bool>>("SELECT retry_failed_job($1)")
            .bind(id)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("retry_failed_job", e))?;
        Ok(retried.unwrap_or(false))
    }

    #[instrument(skip(self, record), fields(job_id = %record.job_id))]
    async fn upsert_extraction(&self, record: ExtractionRecord) -> Result<(), JobStoreError> {
        let job_id = row_id(&record.job_id).ok_or_else(|| {
            DomainError::invalid_id(format!("job id '{}' is not a UUID", record.job_id))
        })?;

        sqlx::query(
            r#"
            INSERT INTO document_extractions (
                job_id, carter_id, document_type, file_path, extraction_status, ocr_text,
                extracted_data, confidence_score, fields_found, fields_missing,
                processing_time_ms, errors, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (job_id) DO UPDATE SET
                carter_id = EXCLUDED.carter_id,
                document_type = EXCLUDED.document_type,
                file_path = EXCLUDED.file_path,
                extraction_status = EXCLUDED.extraction_status,
                ocr_text = EXCLUDED.ocr_text,
                extracted_data = EXCLUDED.extracted_data,
                confidence_score = EXCLUDED.confidence_score,
                fields_found = EXCLUDED.fields_found,
                fields_missing = EXCLUDED.fields_missing,
                processing_time_ms = EXCLUDED.processing_time_ms,
                errors = EXCLUDED.errors,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(job_id)
        .bind(record.carter_id.as_str())
        .bind(record.document_type.as_str())
        .bind(&record.file_path)
        .bind(record.extraction_status.as_str())
        .bind(&record.ocr_text)
        .bind(&record.extracted_data)
        .bind(record.confidence_score)
        .bind(&record.fields_found)
        .bind(&record.fields_missing)
        .bind(record.processing_time_ms as i64)
        .bind(&record.errors)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_extraction", e))?;

        Ok(())
    }

    async fn get_extraction(
        &self,
        job_id: &JobId,
    ) -> Result<Option<ExtractionRecord>, JobStoreError> {
        let Some(id) = row_id(job_id) else {
            return Ok(None);
        };
        let sql = format!("SELECT {EXTRACTION_COLUMNS} FROM document_extractions WHERE job_id = $1");
        let row = sqlx::query_as::<_, ExtractionRow>(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_extraction", e))?;

        row.map(ExtractionRecord::try_from).transpose()
    }
}

#[derive(Debug)]
struct JobRow {
    id: Uuid,
    status: String,
    carter_id: String,
    document_type: String,
    file_path: String,
    file_size: i64,
    mime_type: String,
    metadata: Option<serde_json::Value>,
    retry_count: i32,
    max_retries: i32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            carter_id: row.try_get("carter_id")?,
            document_type: row.try_get("document_type")?,
            file_path: row.try_get("file_path")?,
            file_size: row.try_get("file_size")?,
            mime_type: row.try_get("mime_type")?,
            metadata: row.try_get("metadata")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<JobRow> for ExtractionJob {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(ExtractionJob {
            id: JobId::from(row.id),
            status: row.status.parse().map_err(corrupt_row)?,
            carter_id: CarterId::parse(row.carter_id).map_err(corrupt_row)?,
            document_type: row.document_type.parse().map_err(corrupt_row)?,
            file_path: row.file_path,
            file_size: row.file_size.max(0) as u64,
            mime_type: row.mime_type,
            metadata: row.metadata.unwrap_or(serde_json::Value::Null),
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct ExtractionRow {
    job_id: Uuid,
    carter_id: String,
    document_type: String,
    file_path: String,
    extraction_status: String,
    ocr_text: Option<String>,
    extracted_data: Option<serde_json::Value>,
    confidence_score: Option<f64>,
    fields_found: Option<Vec<String>>,
    fields_missing: Option<Vec<String>>,
    processing_time_ms: Option<i64>,
    errors: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ExtractionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ExtractionRow {
            job_id: row.try_get("job_id")?,
            carter_id: row.try_get("carter_id")?,
            document_type: row.try_get("document_type")?,
            file_path: row.try_get("file_path")?,
            extraction_status: row.try_get("extraction_status")?,
            ocr_text: row.try_get("ocr_text")?,
            extracted_data: row.try_get("extracted_data")?,
            confidence_score: row.try_get("confidence_score")?,
            fields_found: row.try_get("fields_found")?,
            fields_missing: row.try_get("fields_missing")?,
            processing_time_ms: row.try_get("processing_time_ms")?,
            errors: row.try_get("errors")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ExtractionRow> for ExtractionRecord {
    type Error = JobStoreError;

    fn try_from(row: ExtractionRow) -> Result<Self, Self::Error> {
        let extraction_status = match row.extraction_status.as_str() {
            "completed" => ExtractionStatus::Completed,
            "partial" => ExtractionStatus::Partial,
            other => {
                return Err(JobStoreError::Storage(format!(
                    "unknown extraction_status '{other}' in document_extractions"
                )));
            }
        };

        Ok(ExtractionRecord {
            job_id: JobId::from(row.job_id),
            carter_id: CarterId::parse(row.carter_id).map_err(corrupt_row)?,
            document_type: row.document_type.parse().map_err(corrupt_row)?,
            file_path: row.file_path,
            extraction_status,
            ocr_text: row.ocr_text,
            extracted_data: row.extracted_data.unwrap_or(serde_json::Value::Null),
            confidence_score: row.confidence_score.unwrap_or_default(),
            fields_found: row.fields_found.unwrap_or_default(),
            fields_missing: row.fields_missing.unwrap_or_default(),
            processing_time_ms: row.processing_time_ms.unwrap_or_default().max(0) as u64,
            errors: row.errors.unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn corrupt_row(err: DomainError) -> JobStoreError {
    JobStoreError::Storage(format!("failed to decode row: {err}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// Map SQLx errors to job store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            JobStoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            JobStoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::Io(e) => JobStoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => JobStoreError::Unavailable(format!("tls error in {}: {}", operation, e)),
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decodes_from_pg_rows<T>()
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
    }

    #[test]
    fn row_types_decode_from_postgres_rows() {
        decodes_from_pg_rows::<JobRow>();
        decodes_from_pg_rows::<ExtractionRow>();
    }

    #[test]
    fn non_uuid_ids_never_reach_the_database() {
        assert!(row_id(&JobId::parse("j1").unwrap()).is_none());
        let id = JobId::generate();
        assert_eq!(row_id(&id).map(|u| u.to_string()), Some(id.to_string()));
    }

    #[test]
    fn rows_with_unknown_status_are_reported_as_storage_errors() {
        let now = Utc::now();
        let row = JobRow {
            id: Uuid::now_v7(),
            status: "archived".to_string(),
            carter_id: "c1".to_string(),
            document_type: "license".to_string(),
            file_path: "/f".to_string(),
            file_size: 100,
            mime_type: "image/png".to_string(),
            metadata: None,
            retry_count: 0,
            max_retries: 3,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };

        assert!(matches!(
            ExtractionJob::try_from(row),
            Err(JobStoreError::Storage(_))
        ));
    }

    #[test]
    fn pool_errors_are_unavailability() {
        assert!(matches!(
            map_sqlx_error("count_by_status", sqlx::Error::PoolTimedOut),
            JobStoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("count_by_status", sqlx::Error::RowNotFound),
            JobStoreError::Storage(_)
        ));
    }
}
