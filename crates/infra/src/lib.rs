//! Infrastructure layer: job store adapters, external service clients, config.

pub mod config;
pub mod jobs;
pub mod orchestrator;

pub use config::{ConfigError, PortalConfig, ProcessorConfig};
pub use orchestrator::{ExtractionOrchestrator, HttpExtractionOrchestrator, OrchestratorError};
