/*!
 * Mock batch API implementations for testing.
 *
 * This module provides an in-process simulator of the remote batch service
 * with configurable behaviors:
 * - `MockBatchApi::instant()` - jobs complete after the usual poll cadence
 * - `MockBatchApi::reversed()` - results are delivered out of order
 * - `MockBatchApi::capacity_above(n)` - batches above n requests fail with
 *   a capacity reason; smaller ones succeed
 * - `MockBatchApi::fatal(message)` - every job fails with a non-capacity reason
 * - `MockBatchApi::stalled()` - jobs never leave the in-progress state
 * - `MockBatchApi::flaky_upload(n)` - the first n uploads fail transiently
 *
 * Translation is simulated as identity: the translated text equals the
 * submitted payload, so placeholder round-trips can be asserted end to end.
 */

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;

use crate::errors::ApiError;

use super::{
    BatchApi, FailureKind, JobFailure, RemoteJobState, RemoteJobStatus, RemoteJobSummary,
};

/// Behavior mode for the mock batch service
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Jobs complete normally
    Instant,
    /// Jobs complete normally but results come back in reversed order
    ReversedResults,
    /// Batches with more than `max_requests` requests fail with a
    /// capacity reason; smaller batches complete
    CapacityAbove {
        /// Request-count threshold above which jobs fail
        max_requests: usize,
    },
    /// Every job fails with a non-retryable reason
    Fatal {
        /// Failure message reported by the service
        message: String,
    },
    /// Jobs never advance past in_progress
    Stalled,
    /// The first `failures` upload calls fail with a connection error
    FlakyUpload {
        /// Number of uploads that fail before uploads start succeeding
        failures: usize,
    },
}

/// One request parsed from an uploaded batch file
#[derive(Debug, Clone)]
struct ParsedRequest {
    custom_id: String,
    content: String,
}

/// Remote-side record of a created job
#[derive(Debug)]
struct MockJob {
    file_id: String,
    polls: u32,
}

/// Shared mutable state of the simulated service
#[derive(Debug, Default)]
struct MockState {
    next_file: usize,
    next_job: usize,
    files: HashMap<String, Vec<ParsedRequest>>,
    jobs: HashMap<String, MockJob>,
    failed_uploads: usize,
    cancelled: Vec<String>,
}

/// Mock batch API for testing job lifecycle behavior
#[derive(Debug)]
pub struct MockBatchApi {
    /// Behavior mode
    behavior: MockBehavior,
    /// Polls before a job reaches its terminal state
    polls_until_terminal: u32,
    /// Simulated remote state
    state: Arc<Mutex<MockState>>,
}

impl MockBatchApi {
    /// Create a mock with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            polls_until_terminal: 2,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock where jobs complete normally
    pub fn instant() -> Self {
        Self::new(MockBehavior::Instant)
    }

    /// Create a mock that delivers results in reversed order
    pub fn reversed() -> Self {
        Self::new(MockBehavior::ReversedResults)
    }

    /// Create a mock where large batches fail on capacity
    pub fn capacity_above(max_requests: usize) -> Self {
        Self::new(MockBehavior::CapacityAbove { max_requests })
    }

    /// Create a mock where every job fails fatally
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(MockBehavior::Fatal {
            message: message.into(),
        })
    }

    /// Create a mock where jobs never make progress
    pub fn stalled() -> Self {
        Self::new(MockBehavior::Stalled)
    }

    /// Create a mock whose first uploads fail transiently
    pub fn flaky_upload(failures: usize) -> Self {
        Self::new(MockBehavior::FlakyUpload { failures })
    }

    /// Override how many polls a job needs to reach its terminal state
    pub fn with_polls_until_terminal(mut self, polls: u32) -> Self {
        self.polls_until_terminal = polls.max(1);
        self
    }

    /// Number of successfully uploaded batch files
    pub fn upload_count(&self) -> usize {
        self.state.lock().files.len()
    }

    /// Jobs created so far, as (job id, request count) pairs
    pub fn jobs_created(&self) -> Vec<(String, usize)> {
        let state = self.state.lock();
        let mut jobs: Vec<(String, usize)> = state
            .jobs
            .iter()
            .map(|(id, job)| {
                let count = state.files.get(&job.file_id).map(|f| f.len()).unwrap_or(0);
                (id.clone(), count)
            })
            .collect();
        jobs.sort();
        jobs
    }

    /// Remote job ids that received a cancel call
    pub fn cancelled_jobs(&self) -> Vec<String> {
        self.state.lock().cancelled.clone()
    }

    fn output_file_id(job_id: &str) -> String {
        format!("mock-output-{}", job_id)
    }
}

#[async_trait]
impl BatchApi for MockBatchApi {
    async fn upload(&self, _file_name: &str, content: Vec<u8>) -> Result<String, ApiError> {
        let mut state = self.state.lock();

        if let MockBehavior::FlakyUpload { failures } = &self.behavior {
            if state.failed_uploads < *failures {
                state.failed_uploads += 1;
                return Err(ApiError::ConnectionError(
                    "simulated upload failure".to_string(),
                ));
            }
        }

        let text = String::from_utf8(content)
            .map_err(|e| ApiError::ParseError(format!("uploaded file is not UTF-8: {}", e)))?;

        let mut requests = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let value: serde_json::Value = serde_json::from_str(line)
                .map_err(|e| ApiError::ParseError(format!("invalid request line: {}", e)))?;

            let custom_id = value
                .get("custom_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ApiError::ParseError("request line missing custom_id".into()))?
                .to_string();

            // The user message carries the payload; the system prompt is first
            let content = value
                .pointer("/body/messages/1/content")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            requests.push(ParsedRequest { custom_id, content });
        }

        state.next_file += 1;
        let file_id = format!("mock-file-{}", state.next_file);
        state.files.insert(file_id.clone(), requests);
        Ok(file_id)
    }

    async fn create_job(&self, file_id: &str) -> Result<String, ApiError> {
        let mut state = self.state.lock();

        if !state.files.contains_key(file_id) {
            return Err(ApiError::RequestFailed(format!(
                "unknown file id: {}",
                file_id
            )));
        }

        state.next_job += 1;
        let job_id = format!("mock-job-{}", state.next_job);
        state.jobs.insert(
            job_id.clone(),
            MockJob {
                file_id: file_id.to_string(),
                polls: 0,
            },
        );
        Ok(job_id)
    }

    async fn poll_status(&self, job_id: &str) -> Result<RemoteJobStatus, ApiError> {
        let mut state = self.state.lock();

        let request_count = {
            let job = state
                .jobs
                .get(job_id)
                .ok_or_else(|| ApiError::RequestFailed(format!("unknown job id: {}", job_id)))?;
            state.files.get(&job.file_id).map(|f| f.len()).unwrap_or(0)
        };

        let job = state.jobs.get_mut(job_id).expect("job disappeared");
        job.polls += 1;
        let terminal = job.polls >= self.polls_until_terminal;

        let in_progress = RemoteJobStatus {
            state: RemoteJobState::InProgress,
            output_file_id: None,
            failure: None,
        };

        let status = match &self.behavior {
            MockBehavior::Stalled => in_progress,
            MockBehavior::Fatal { message } if terminal => RemoteJobStatus {
                state: RemoteJobState::Failed,
                output_file_id: None,
                failure: Some(JobFailure {
                    kind: FailureKind::Other,
                    message: message.clone(),
                }),
            },
            MockBehavior::CapacityAbove { max_requests }
                if terminal && request_count > *max_requests =>
            {
                RemoteJobStatus {
                    state: RemoteJobState::Failed,
                    output_file_id: None,
                    failure: Some(JobFailure {
                        kind: FailureKind::Capacity,
                        message: "Enqueued token limit reached".to_string(),
                    }),
                }
            }
            _ if terminal => RemoteJobStatus {
                state: RemoteJobState::Completed,
                output_file_id: Some(Self::output_file_id(job_id)),
                failure: None,
            },
            _ => in_progress,
        };

        Ok(status)
    }

    async fn download_result(&self, output_file_id: &str) -> Result<Bytes, ApiError> {
        let state = self.state.lock();

        let job_id = output_file_id
            .strip_prefix("mock-output-")
            .ok_or_else(|| ApiError::RequestFailed(format!("unknown file: {}", output_file_id)))?;

        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| ApiError::RequestFailed(format!("unknown job id: {}", job_id)))?;

        let requests = state
            .files
            .get(&job.file_id)
            .ok_or_else(|| ApiError::RequestFailed(format!("unknown file id: {}", job.file_id)))?;

        let mut ordered: Vec<&ParsedRequest> = requests.iter().collect();
        if matches!(self.behavior, MockBehavior::ReversedResults) {
            ordered.reverse();
        }

        let mut out = String::new();
        for request in ordered {
            // Identity translation: the model echoes the payload back
            let line = json!({
                "custom_id": request.custom_id,
                "response": {
                    "body": {
                        "choices": [
                            { "message": { "role": "assistant", "content": request.content } }
                        ]
                    }
                }
            });
            out.push_str(&line.to_string());
            out.push('\n');
        }

        Ok(Bytes::from(out))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock();

        if !state.jobs.contains_key(job_id) {
            return Err(ApiError::RequestFailed(format!(
                "unknown job id: {}",
                job_id
            )));
        }

        state.cancelled.push(job_id.to_string());
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<RemoteJobSummary>, ApiError> {
        let state = self.state.lock();
        let mut summaries: Vec<RemoteJobSummary> = state
            .jobs
            .iter()
            .map(|(id, job)| RemoteJobSummary {
                id: id.clone(),
                status: if job.polls >= self.polls_until_terminal {
                    "completed".to_string()
                } else {
                    "in_progress".to_string()
                },
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }
}
