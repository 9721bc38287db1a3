//! `docportal-core`: domain types for the document extraction portal.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! job identifiers, the job status lifecycle, and the orchestrator/record
//! shapes.

pub mod error;
pub mod extraction;
pub mod id;
pub mod job;

pub use error::{DomainError, DomainResult};
pub use extraction::{ExtractionOutcome, ExtractionRecord, ExtractionRequest, ExtractionStatus};
pub use id::{CarterId, JobId};
pub use job::{DocumentType, ExtractionJob, JobStatus, JobTransition, NewJob, DEFAULT_MAX_RETRIES};
