//! Configuration loading and representation.
//!
//! All settings are read once at start-up into [`PortalConfig`] and passed to
//! the components that need them. Missing credentials are a construction
//! error, never a late runtime surprise.

use std::time::Duration;

/// Batch edge function that processes queued jobs.
pub const DEFAULT_EDGE_FUNCTION: &str = "process-extraction-jobs";
/// Serverless function performing a single extraction.
pub const DEFAULT_ORCHESTRATOR_FUNCTION: &str = "extract-document";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_RETRY_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Settings for the job processor's calls to the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    base_url: String,
    service_key: String,
    function_name: String,
    retry_batch_limit: usize,
}

impl ProcessorConfig {
    /// Both the base URL and the service credential are required.
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let service_key = service_key.into().trim().to_string();
        if base_url.is_empty() {
            return Err(ConfigError::Missing("SUPABASE_URL"));
        }
        if service_key.is_empty() {
            return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"));
        }

        Ok(Self {
            base_url,
            service_key,
            function_name: DEFAULT_EDGE_FUNCTION.to_string(),
            retry_batch_limit: DEFAULT_RETRY_BATCH_LIMIT,
        })
    }

    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    pub fn with_retry_batch_limit(mut self, limit: usize) -> Self {
        self.retry_batch_limit = limit;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    pub fn retry_batch_limit(&self) -> usize {
        self.retry_batch_limit
    }

    /// URL of the batch edge function.
    pub fn function_url(&self) -> String {
        format!("{}/functions/v1/{}", self.base_url, self.function_name)
    }
}

/// Process-wide configuration of the portal service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub orchestrator_url: String,
    pub admin_token: Option<String>,
    pub poll_interval: Option<Duration>,
    pub processor: ProcessorConfig,
}

impl PortalConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let service_key = get("SUPABASE_SERVICE_ROLE_KEY")
            .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?;

        let mut processor = ProcessorConfig::new(base_url, service_key)?;
        if let Some(name) = get("EDGE_FUNCTION_NAME") {
            processor = processor.with_function_name(name);
        }
        if let Some(raw) = get("RETRY_BATCH_LIMIT") {
            let limit = parse_positive(&raw, "RETRY_BATCH_LIMIT")?;
            processor = processor.with_retry_batch_limit(limit as usize);
        }

        let poll_interval = get("PROCESSOR_POLL_SECS")
            .map(|raw| parse_positive(&raw, "PROCESSOR_POLL_SECS").map(Duration::from_secs))
            .transpose()?;

        let orchestrator_url = get("ORCHESTRATOR_URL").unwrap_or_else(|| {
            format!(
                "{}/functions/v1/{}",
                processor.base_url(),
                DEFAULT_ORCHESTRATOR_FUNCTION
            )
        });

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: get("DATABASE_URL"),
            orchestrator_url,
            admin_token: get("ADMIN_TOKEN"),
            poll_interval,
            processor,
        })
    }
}

fn parse_positive(raw: &str, key: &'static str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            message: "must be greater than zero".to_string(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
    }
}
