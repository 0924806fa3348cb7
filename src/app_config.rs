use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Target language to translate into (free-form, e.g. "German")
    pub target_language: String,

    /// Batch API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Batch partitioning limits
    #[serde(default)]
    pub batch: BatchConfig,

    /// Job lifecycle settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Remote batch API configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    /// Model name used inside each batched chat request
    #[serde(default = "default_model")]
    pub model: String,

    /// API key for the service
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service endpoint URL (optional, for Azure OpenAI or self-hosted)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-call request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Limits applied when packing requests into batch files.
///
/// A finalized batch satisfies all three simultaneously: the sum of
/// estimated tokens stays under `max_tokens_per_batch`, every individual
/// request stays under `max_tokens_per_request`, and the request count
/// stays under `max_requests_per_file`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct BatchConfig {
    /// Maximum cumulative estimated tokens per batch file
    #[serde(default = "default_max_tokens_per_batch")]
    pub max_tokens_per_batch: usize,

    /// Maximum estimated tokens for a single request
    #[serde(default = "default_max_tokens_per_request")]
    pub max_tokens_per_request: usize,

    /// Maximum number of requests per batch file
    #[serde(default = "default_max_requests_per_file")]
    pub max_requests_per_file: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: default_max_tokens_per_batch(),
            max_tokens_per_request: default_max_tokens_per_request(),
            max_requests_per_file: default_max_requests_per_file(),
        }
    }
}

/// Job lifecycle and admission control settings
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct JobsConfig {
    /// Seconds between status polls for an in-flight job
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive polls without a status change before a job is
    /// declared stalled and escalated to a fatal timeout
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Maximum number of jobs concurrently submitted or in progress
    #[serde(default = "default_max_in_flight_jobs")]
    pub max_in_flight_jobs: usize,

    /// Ceiling on aggregate estimated tokens across all in-flight jobs
    #[serde(default = "default_max_in_flight_tokens")]
    pub max_in_flight_tokens: usize,

    /// Retry count for transient network failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How many times a capacity-failed batch may be halved before the
    /// remaining piece is escalated to a fatal failure
    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
            max_in_flight_jobs: default_max_in_flight_jobs(),
            max_in_flight_tokens: default_max_in_flight_tokens(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_split_depth: default_max_split_depth(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_tokens_per_batch() -> usize {
    89_900
}

fn default_max_tokens_per_request() -> usize {
    950
}

fn default_max_requests_per_file() -> usize {
    500
}

fn default_poll_interval_secs() -> u64 {
    30 // Fixed poll cadence, independent per job
}

fn default_max_poll_attempts() -> u32 {
    120 // One hour of unchanged status at the default cadence
}

fn default_max_in_flight_jobs() -> usize {
    2
}

fn default_max_in_flight_tokens() -> usize {
    900_000
}

fn default_retry_count() -> u32 {
    3 // Default to 3 retries
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_split_depth() -> u32 {
    4
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save the configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;

        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write config to file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("Target language must not be empty"));
        }

        if self.batch.max_tokens_per_batch == 0
            || self.batch.max_tokens_per_request == 0
            || self.batch.max_requests_per_file == 0
        {
            return Err(anyhow!("Batch limits must all be greater than zero"));
        }

        if self.batch.max_tokens_per_request > self.batch.max_tokens_per_batch {
            return Err(anyhow!(
                "max_tokens_per_request ({}) cannot exceed max_tokens_per_batch ({})",
                self.batch.max_tokens_per_request,
                self.batch.max_tokens_per_batch
            ));
        }

        if self.jobs.max_in_flight_jobs == 0 {
            return Err(anyhow!("max_in_flight_jobs must be at least 1"));
        }

        // The endpoint must at least parse as a URL
        url::Url::parse(&self.api.endpoint)
            .with_context(|| format!("Invalid API endpoint: {}", self.api.endpoint))?;

        Ok(())
    }

    /// Whether an API key is available for authenticated calls
    pub fn has_api_key(&self) -> bool {
        !self.api.api_key.trim().is_empty()
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            target_language: "German".to_string(),
            api: ApiConfig::default(),
            batch: BatchConfig::default(),
            jobs: JobsConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
