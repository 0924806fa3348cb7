/*!
 * Error types for the tabtrans application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

// Allow dead code - error types are for library consumers
#![allow(dead_code)]

use thiserror::Error;

/// Errors that can occur when talking to the remote batch API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiRejection {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ApiError {
    /// Whether the error is worth retrying with backoff.
    ///
    /// Connection failures, timeouts, rate limiting (429) and server-side
    /// errors (5xx) are transient; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) => true,
            Self::ApiRejection { status_code, .. } => {
                *status_code == 429 || (500..=599).contains(status_code)
            }
            _ => false,
        }
    }
}

/// Errors that can occur while orchestrating a translation run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A single row's normalized text exceeds the per-request token budget.
    /// Rows are never split, so this is surfaced before any submission.
    #[error("Request {custom_id} estimated at {estimated_tokens} tokens exceeds the per-request limit of {limit}")]
    OversizedRequest {
        /// The offending request's custom_id
        custom_id: String,
        /// Estimated token count of the request
        estimated_tokens: usize,
        /// Configured per-request limit
        limit: usize,
    },

    /// A network operation kept failing after bounded retries
    #[error("Network failure during {operation} after {attempts} attempts: {source}")]
    TransientNetwork {
        /// The operation that was being attempted
        operation: &'static str,
        /// Number of attempts made
        attempts: u32,
        /// The last underlying API error
        source: ApiError,
    },

    /// A non-transient API error during an orchestration step
    #[error("API error during {operation}: {source}")]
    ApiFailure {
        /// The operation that was being attempted
        operation: &'static str,
        /// The underlying API error
        source: ApiError,
    },

    /// The remote job failed because the provider capacity or enqueued
    /// token ceiling was hit; the batch is resubmitted in smaller pieces
    #[error("Job {job_id} exceeded provider capacity: {message}")]
    CapacityExceeded {
        /// Remote job id that reported the failure
        job_id: String,
        /// Provider-supplied failure message
        message: String,
    },

    /// The remote job failed for a non-retryable reason
    #[error("Job {job_id} failed: {reason}")]
    FatalJob {
        /// Remote job id that failed
        job_id: String,
        /// Provider-supplied failure reason
        reason: String,
    },

    /// The remote job stopped making progress
    #[error("Job {job_id} stalled after {polls} polls without a status change")]
    JobTimeout {
        /// Remote job id that stalled
        job_id: String,
        /// Number of consecutive polls observed with no change
        polls: u32,
    },

    /// Model output references a placeholder that was never issued
    #[error("Translated row {custom_id} references unknown placeholder {placeholder}")]
    UnknownPlaceholder {
        /// custom_id of the corrupted row
        custom_id: String,
        /// The dangling placeholder token
        placeholder: String,
    },

    /// One or more row ids are unaccounted for in the merged output
    #[error("Translation incomplete: {} row ids missing: {missing_ids:?}", missing_ids.len())]
    IncompleteTranslation {
        /// Row ids with no translated result
        missing_ids: Vec<u64>,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from the batch API
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Error from the translation pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
