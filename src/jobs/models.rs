/*!
 * Job records and run reporting types.
 *
 * A `Job` is the local bookkeeping record for one submission of one batch.
 * Retrying never mutates a submitted job into a different submission:
 * a capacity retry creates new jobs for the split halves, and `attempts`
 * records the depth of that chain.
 */

use std::fmt;

use chrono::{DateTime, Local};

use crate::errors::PipelineError;

/// Local lifecycle states of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Batch file exists locally but has not been uploaded
    PendingUpload,
    /// Batch file is in the remote store
    Uploaded,
    /// Processing job created
    Submitted,
    /// Remote side reports active processing
    InProgress,
    /// Results downloaded, bookkeeping released
    Completed,
    /// Failed on capacity; requests were handed to replacement jobs
    FailedRetryable,
    /// Failed for good; surfaced in the run report
    FailedFatal,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PendingUpload => "pending_upload",
            Self::Uploaded => "uploaded",
            Self::Submitted => "submitted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::FailedRetryable => "failed_retryable",
            Self::FailedFatal => "failed_fatal",
        };
        write!(f, "{}", name)
    }
}

/// Bookkeeping record for one submission of one batch
#[derive(Debug, Clone)]
pub struct Job {
    /// Label of the batch this job carries, e.g. "3" or "3.1"
    pub batch_label: String,
    /// Remote file id once uploaded
    pub remote_file_id: Option<String>,
    /// Remote job id once submitted; a resubmission gets a fresh id
    pub remote_job_id: Option<String>,
    /// Current lifecycle state
    pub state: JobState,
    /// When this job record was created
    pub created_at: DateTime<Local>,
    /// Retry-chain depth: 0 for an original batch, +1 per capacity split
    pub attempts: u32,
}

impl Job {
    /// Create a fresh job record for a batch
    pub fn new(batch_label: impl Into<String>, attempts: u32) -> Self {
        Self {
            batch_label: batch_label.into(),
            remote_file_id: None,
            remote_job_id: None,
            state: JobState::PendingUpload,
            created_at: Local::now(),
            attempts,
        }
    }

    /// Identifier used in logs and diagnostics: the remote job id when
    /// one exists, the batch label otherwise
    pub fn display_id(&self) -> &str {
        self.remote_job_id
            .as_deref()
            .unwrap_or(&self.batch_label)
    }
}

/// One completed request's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedResult {
    /// The custom_id of the originating request
    pub custom_id: String,
    /// The model's translated text
    pub translated_text: String,
}

/// Outcome of driving a set of batches to completion
#[derive(Debug, Default)]
pub struct JobReport {
    /// All translated results, in arrival order
    pub results: Vec<TranslatedResult>,
    /// Final bookkeeping records for every job that ran, including
    /// abandoned capacity-failed jobs and their replacements
    pub jobs: Vec<Job>,
    /// Fatal per-job failures; one entry never aborts unrelated jobs
    pub failures: Vec<PipelineError>,
}

impl JobReport {
    /// Whether every job chain ended in success
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of jobs that reached the completed state
    pub fn completed_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.state == JobState::Completed)
            .count()
    }
}
