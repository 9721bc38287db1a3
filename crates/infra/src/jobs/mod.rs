//! Extraction job lifecycle.
//!
//! ## Components
//!
//! - `JobStore`: row-store contract (in-memory or Postgres)
//! - `JobLifecycle`: single-shot `queued → processing → completed | failed`
//! - `JobProcessor`: queue counts, edge function trigger, retry pass
//! - `ProcessorPoller`: optional background loop over the processor

pub mod lifecycle;
pub mod poller;
pub mod postgres;
pub mod processor;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use lifecycle::{JobLifecycle, LifecycleError, ProcessedJob};
pub use poller::{PollerConfig, PollerStats, ProcessorPoller, ProcessorPollerHandle};
pub use postgres::PostgresJobStore;
pub use processor::{CheckReport, JobProcessor, ProcessorError, QueueStats, RetryReport, TriggerReport};
pub use store::{InMemoryJobStore, JobFilter, JobStore, JobStoreError};
