/*!
 * Batch API client implementations.
 *
 * This module contains clients for the remote asynchronous batch
 * processing service:
 * - OpenAI: Files + Batches API integration
 * - Mock: in-process simulator used by the test suite
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

use crate::errors::ApiError;
use crate::jobs::TranslatedResult;

/// Common trait for asynchronous batch processing services.
///
/// The service is treated as opaque: content is uploaded, a processing job
/// is created against the uploaded file, status is polled until terminal,
/// and the result artifact is downloaded. Failure reasons must be
/// classifiable into capacity-related and everything else.
#[async_trait]
pub trait BatchApi: Send + Sync + Debug {
    /// Upload a request file to the remote store
    ///
    /// # Arguments
    /// * `file_name` - Name assigned to the uploaded file
    /// * `content` - Raw JSONL file content
    ///
    /// # Returns
    /// * `Result<String, ApiError>` - The remote file id
    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String, ApiError>;

    /// Create a processing job referencing an uploaded file
    ///
    /// # Returns
    /// * `Result<String, ApiError>` - The remote job id
    async fn create_job(&self, file_id: &str) -> Result<String, ApiError>;

    /// Fetch the current status of a job
    async fn poll_status(&self, job_id: &str) -> Result<RemoteJobStatus, ApiError>;

    /// Download the result artifact of a completed job
    ///
    /// # Arguments
    /// * `output_file_id` - The output file id reported with the terminal status
    async fn download_result(&self, output_file_id: &str) -> Result<Bytes, ApiError>;

    /// Request remote cancellation of a job (best effort)
    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError>;

    /// List jobs currently known to the remote service
    async fn list_jobs(&self) -> Result<Vec<RemoteJobSummary>, ApiError>;
}

/// Remote-side lifecycle states of a batch job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobState {
    /// Input file is being validated
    Validating,
    /// Job is being processed
    InProgress,
    /// Results are being assembled
    Finalizing,
    /// Job finished successfully
    Completed,
    /// Job failed
    Failed,
    /// Job did not finish within the completion window
    Expired,
    /// Cancellation requested
    Cancelling,
    /// Job was cancelled
    Cancelled,
}

impl RemoteJobState {
    /// Parse a provider status string, defaulting unknown values to Validating
    pub fn from_provider(status: &str) -> Self {
        match status {
            "in_progress" => Self::InProgress,
            "finalizing" => Self::Finalizing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "expired" => Self::Expired,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            _ => Self::Validating,
        }
    }
}

/// How a job failure should be handled by the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider capacity or enqueued token ceiling: resubmit smaller batches
    Capacity,
    /// Anything else: fatal, no resubmission
    Other,
}

/// Failure details attached to a terminal failed status
#[derive(Debug, Clone)]
pub struct JobFailure {
    /// Classified failure category
    pub kind: FailureKind,
    /// Provider-supplied message
    pub message: String,
}

/// Snapshot of a job's remote status
#[derive(Debug, Clone)]
pub struct RemoteJobStatus {
    /// Current lifecycle state
    pub state: RemoteJobState,
    /// Output file id, present once the job completes
    pub output_file_id: Option<String>,
    /// Failure details, present for failed/expired jobs
    pub failure: Option<JobFailure>,
}

/// One entry from a job listing
#[derive(Debug, Clone)]
pub struct RemoteJobSummary {
    /// Remote job id
    pub id: String,
    /// Raw provider status string
    pub status: String,
}

/// Classify a failure reason into capacity-related or other, from the
/// provider's error code and message. Classification is driven by the
/// API-provided category, never by re-inspecting batch content.
pub fn classify_failure(code: Option<&str>, message: &str) -> FailureKind {
    if let Some(code) = code {
        if code.contains("token_limit") || code.contains("rate_limit") {
            return FailureKind::Capacity;
        }
    }

    let lowered = message.to_lowercase();
    if lowered.contains("enqueued token limit") || lowered.contains("token limit reached") {
        FailureKind::Capacity
    } else {
        FailureKind::Other
    }
}

/// Parse a downloaded result artifact (JSONL, one completed request per
/// line) into translated results.
///
/// Lines are processed leniently: for every line carrying a custom_id, the
/// first assistant message content among the response choices is taken as
/// the translated text. Lines without an assistant message are skipped.
pub fn parse_result_artifact(content: &[u8]) -> Result<Vec<TranslatedResult>, ApiError> {
    let text = std::str::from_utf8(content)
        .map_err(|e| ApiError::ParseError(format!("Result artifact is not UTF-8: {}", e)))?;

    let mut results = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| ApiError::ParseError(format!("Invalid result line: {}", e)))?;

        let Some(custom_id) = value.get("custom_id").and_then(|v| v.as_str()) else {
            continue;
        };

        let choices = value
            .pointer("/response/body/choices")
            .and_then(|v| v.as_array());

        if let Some(choices) = choices {
            for choice in choices {
                let message = choice.get("message");
                let is_assistant = message
                    .and_then(|m| m.get("role"))
                    .and_then(|r| r.as_str())
                    == Some("assistant");

                if is_assistant {
                    if let Some(content) = message
                        .and_then(|m| m.get("content"))
                        .and_then(|c| c.as_str())
                    {
                        results.push(TranslatedResult {
                            custom_id: custom_id.to_string(),
                            translated_text: content.to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }

    Ok(results)
}

pub mod mock;
pub mod openai;
