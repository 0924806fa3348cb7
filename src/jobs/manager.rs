/*!
 * Concurrent job runner with admission control.
 *
 * Each batch is driven through upload -> submit -> poll -> download as one
 * independent async task. Many jobs are in flight at once, bounded two
 * ways: a semaphore caps concurrent jobs, and a token gauge keeps the
 * aggregate estimated tokens of in-flight work under a global ceiling so
 * the provider's enqueued-token limit is approached deliberately rather
 * than hit.
 *
 * A job that fails with a capacity reason is abandoned and its batch is
 * split in half; both halves re-enter the same machinery as new jobs.
 * Halving terminates: a single-request batch that still hits the wall is
 * escalated to a fatal failure instead of looping.
 */

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Semaphore;

use crate::app_config::{Config, JobsConfig};
use crate::batching::{Batch, RequestTemplate};
use crate::errors::{ApiError, PipelineError};
use crate::file_utils::FileManager;
use crate::providers::{parse_result_artifact, BatchApi, FailureKind, RemoteJobState};

use super::models::{Job, JobReport, JobState, TranslatedResult};

/// Sleep between admission checks when the token gauge is full
const GAUGE_WAIT_MS: u64 = 250;

/// Shared accounting of estimated tokens currently in flight.
///
/// Mutated from many concurrent submissions and completions; all updates
/// go through the single mutex-guarded counter.
struct TokenGauge {
    limit: usize,
    used: Mutex<usize>,
}

impl TokenGauge {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            used: Mutex::new(0),
        }
    }

    /// Wait until `amount` tokens fit under the ceiling, then reserve them.
    /// A batch larger than the whole ceiling is admitted when it would run
    /// alone, so one oversized batch cannot wedge the run.
    async fn acquire(self: &Arc<Self>, amount: usize) -> TokenReservation {
        loop {
            {
                let mut used = self.used.lock();
                if *used == 0 || *used + amount <= self.limit {
                    *used += amount;
                    return TokenReservation {
                        gauge: Arc::clone(self),
                        amount,
                    };
                }
            }
            tokio::time::sleep(Duration::from_millis(GAUGE_WAIT_MS)).await;
        }
    }

    fn release(&self, amount: usize) {
        let mut used = self.used.lock();
        *used = used.saturating_sub(amount);
    }
}

/// RAII reservation against the token gauge
struct TokenReservation {
    gauge: Arc<TokenGauge>,
    amount: usize,
}

impl Drop for TokenReservation {
    fn drop(&mut self) {
        self.gauge.release(self.amount);
    }
}

/// Terminal outcome of one job attempt
enum JobOutcome {
    /// Job completed; results downloaded and parsed
    Completed {
        job: Job,
        results: Vec<TranslatedResult>,
    },
    /// Job hit the provider capacity wall; batch is returned for splitting
    Capacity {
        job: Job,
        batch: Batch,
        depth: u32,
        message: String,
    },
    /// Job failed for good
    Fatal { job: Job, error: PipelineError },
}

/// Outcome of polling a submitted job to a terminal status
enum PollOutcome {
    Completed { output_file_id: String },
    Capacity { message: String },
    Fatal { reason: String },
}

/// Drives batches through the remote job lifecycle
pub struct JobRunner<A: BatchApi> {
    api: Arc<A>,
    jobs_config: JobsConfig,
    template: RequestTemplate,
    workdir: PathBuf,
    semaphore: Arc<Semaphore>,
    token_gauge: Arc<TokenGauge>,
    active_jobs: Arc<Mutex<HashSet<String>>>,
}

impl<A: BatchApi> JobRunner<A> {
    /// Create a runner from the application configuration
    pub fn new(api: Arc<A>, config: &Config, workdir: PathBuf) -> Self {
        Self::with_registry(api, config, workdir, Arc::new(Mutex::new(HashSet::new())))
    }

    /// Create a runner sharing an externally owned registry of active
    /// remote job ids, so the caller can cancel them on abort
    pub fn with_registry(
        api: Arc<A>,
        config: &Config,
        workdir: PathBuf,
        active_jobs: Arc<Mutex<HashSet<String>>>,
    ) -> Self {
        Self {
            api,
            jobs_config: config.jobs,
            template: RequestTemplate::new(config.api.model.clone(), &config.target_language),
            workdir,
            semaphore: Arc::new(Semaphore::new(config.jobs.max_in_flight_jobs)),
            token_gauge: Arc::new(TokenGauge::new(config.jobs.max_in_flight_tokens)),
            active_jobs,
        }
    }

    /// Drive all batches to a terminal state.
    ///
    /// Jobs run concurrently; completion order is arbitrary and irrelevant
    /// because the aggregator re-imposes row order afterwards. The progress
    /// callback receives (settled, total) job counts, where total grows as
    /// capacity retries split batches into replacement jobs.
    pub async fn run(
        &self,
        batches: Vec<Batch>,
        progress_callback: impl Fn(usize, usize),
    ) -> JobReport {
        let mut report = JobReport::default();
        let mut in_flight = FuturesUnordered::new();
        let mut total = batches.len();
        let mut settled = 0usize;

        for batch in batches {
            in_flight.push(self.execute(batch, 0));
        }

        while let Some(outcome) = in_flight.next().await {
            settled += 1;
            match outcome {
                JobOutcome::Completed { job, results } => {
                    info!(
                        "Job {} for batch {} completed with {} results",
                        job.display_id(),
                        job.batch_label,
                        results.len()
                    );
                    report.results.extend(results);
                    report.jobs.push(job);
                }
                JobOutcome::Capacity {
                    job,
                    batch,
                    depth,
                    message,
                } => {
                    let job_id = job.display_id().to_string();
                    report.jobs.push(job);

                    if batch.len() < 2 || depth >= self.jobs_config.max_split_depth {
                        error!(
                            "Job {} hit the capacity wall and batch {} cannot shrink further: {}",
                            job_id, batch.label, message
                        );
                        report.failures.push(PipelineError::CapacityExceeded {
                            job_id,
                            message,
                        });
                    } else {
                        let (first, second) = batch.split();
                        warn!(
                            "Job {} exceeded capacity ({}); resubmitting as batches {} and {}",
                            job_id, message, first.label, second.label
                        );
                        total += 2;
                        in_flight.push(self.execute(first, depth + 1));
                        in_flight.push(self.execute(second, depth + 1));
                    }
                }
                JobOutcome::Fatal { job, error } => {
                    error!("Job {} failed: {}", job.display_id(), error);
                    report.jobs.push(job);
                    report.failures.push(error);
                }
            }
            progress_callback(settled, total);
        }

        report
    }

    /// Drive one batch through a single job attempt
    async fn execute(&self, batch: Batch, depth: u32) -> JobOutcome {
        let mut job = Job::new(batch.label.clone(), depth);

        // Admission control: one permit per job, plus room under the
        // aggregate in-flight token ceiling
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("job semaphore closed");
        let _reservation = self.token_gauge.acquire(batch.total_tokens()).await;

        // The batch gets its local file handle before anything is submitted
        let content = batch.to_jsonl(&self.template);
        let artifact_path = self.workdir.join(batch.file_name());
        if let Err(e) = FileManager::write_to_file(&artifact_path, &content) {
            job.state = JobState::FailedFatal;
            return JobOutcome::Fatal {
                job,
                error: PipelineError::FatalJob {
                    job_id: batch.label.clone(),
                    reason: format!("could not write batch file: {}", e),
                },
            };
        }
        debug!(
            "Batch {} written to {:?} ({} requests, ~{} tokens)",
            batch.label,
            artifact_path,
            batch.len(),
            batch.total_tokens()
        );

        let file_name = batch.file_name();
        let file_id = match self
            .with_retry("file upload", || {
                self.api.upload(&file_name, content.as_bytes().to_vec())
            })
            .await
        {
            Ok(id) => id,
            Err(error) => {
                job.state = JobState::FailedFatal;
                return JobOutcome::Fatal { job, error };
            }
        };
        job.remote_file_id = Some(file_id.clone());
        job.state = JobState::Uploaded;
        debug!("Batch {} uploaded as file {}", batch.label, file_id);

        let job_id = match self
            .with_retry("job creation", || self.api.create_job(&file_id))
            .await
        {
            Ok(id) => id,
            Err(error) => {
                job.state = JobState::FailedFatal;
                return JobOutcome::Fatal { job, error };
            }
        };
        job.remote_job_id = Some(job_id.clone());
        job.state = JobState::Submitted;
        self.active_jobs.lock().insert(job_id.clone());
        info!("Batch {} submitted as job {}", batch.label, job_id);

        let poll_outcome = self.poll_until_terminal(&mut job, &job_id).await;
        self.active_jobs.lock().remove(&job_id);

        match poll_outcome {
            Ok(PollOutcome::Completed { output_file_id }) => {
                let artifact = match self
                    .with_retry("result download", || {
                        self.api.download_result(&output_file_id)
                    })
                    .await
                {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        job.state = JobState::FailedFatal;
                        return JobOutcome::Fatal { job, error };
                    }
                };

                let output_path = self.workdir.join(format!("output_{}.jsonl", job_id));
                if let Err(e) = FileManager::write_bytes(&output_path, &artifact) {
                    warn!("Could not persist result artifact {:?}: {}", output_path, e);
                }

                let results = match parse_result_artifact(&artifact) {
                    Ok(results) => results,
                    Err(e) => {
                        job.state = JobState::FailedFatal;
                        return JobOutcome::Fatal {
                            job,
                            error: PipelineError::ApiFailure {
                                operation: "result parsing",
                                source: e,
                            },
                        };
                    }
                };

                job.state = JobState::Completed;
                JobOutcome::Completed { job, results }
            }
            Ok(PollOutcome::Capacity { message }) => {
                job.state = JobState::FailedRetryable;
                JobOutcome::Capacity {
                    job,
                    batch,
                    depth,
                    message,
                }
            }
            Ok(PollOutcome::Fatal { reason }) => {
                job.state = JobState::FailedFatal;
                JobOutcome::Fatal {
                    job,
                    error: PipelineError::FatalJob { job_id, reason },
                }
            }
            Err(error) => {
                job.state = JobState::FailedFatal;
                JobOutcome::Fatal { job, error }
            }
        }
    }

    /// Poll a submitted job until it reaches a terminal status.
    ///
    /// The poll cadence is fixed and independent per job. A job whose
    /// status does not change for `max_poll_attempts` consecutive polls is
    /// treated as stalled and escalated instead of hanging forever.
    async fn poll_until_terminal(
        &self,
        job: &mut Job,
        job_id: &str,
    ) -> Result<PollOutcome, PipelineError> {
        let interval = Duration::from_secs(self.jobs_config.poll_interval_secs);
        let mut unchanged = 0u32;
        let mut last_state: Option<RemoteJobState> = None;

        loop {
            tokio::time::sleep(interval).await;

            let crate::providers::RemoteJobStatus {
                state,
                output_file_id,
                failure,
            } = self
                .with_retry("status poll", || self.api.poll_status(job_id))
                .await?;

            if last_state.as_ref() == Some(&state) {
                unchanged += 1;
                if unchanged >= self.jobs_config.max_poll_attempts {
                    return Err(PipelineError::JobTimeout {
                        job_id: job_id.to_string(),
                        polls: unchanged,
                    });
                }
            } else {
                debug!("Job {} status: {:?} -> {:?}", job_id, last_state, state);
                unchanged = 0;
                last_state = Some(state.clone());
            }

            match state {
                RemoteJobState::Completed => {
                    let output_file_id = output_file_id.ok_or_else(|| {
                        PipelineError::FatalJob {
                            job_id: job_id.to_string(),
                            reason: "completed without an output file id".to_string(),
                        }
                    })?;
                    return Ok(PollOutcome::Completed { output_file_id });
                }
                RemoteJobState::Failed | RemoteJobState::Expired => {
                    let (kind, message) = match failure {
                        Some(failure) => (failure.kind, failure.message),
                        None => (
                            FailureKind::Other,
                            "no failure details provided".to_string(),
                        ),
                    };
                    return Ok(match kind {
                        FailureKind::Capacity => PollOutcome::Capacity { message },
                        FailureKind::Other => PollOutcome::Fatal { reason: message },
                    });
                }
                RemoteJobState::Cancelling | RemoteJobState::Cancelled => {
                    return Ok(PollOutcome::Fatal {
                        reason: "job was cancelled remotely".to_string(),
                    });
                }
                RemoteJobState::InProgress | RemoteJobState::Finalizing => {
                    if job.state == JobState::Submitted {
                        job.state = JobState::InProgress;
                    }
                }
                RemoteJobState::Validating => {}
            }
        }
    }

    /// Run a network operation, retrying transient failures with
    /// exponential backoff and jitter, bounded by `retry_count`
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0u32;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.jobs_config.retry_count => {
                    let backoff_ms = self.jobs_config.retry_backoff_ms * (1u64 << attempt);
                    let jitter_ms = rand::rng().random_range(0..=backoff_ms / 4);
                    warn!(
                        "{} failed ({}), retrying in {}ms - attempt {}/{}",
                        operation,
                        e,
                        backoff_ms + jitter_ms,
                        attempt + 1,
                        self.jobs_config.retry_count + 1
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(PipelineError::TransientNetwork {
                        operation,
                        attempts: attempt + 1,
                        source: e,
                    });
                }
                Err(e) => {
                    return Err(PipelineError::ApiFailure {
                        operation,
                        source: e,
                    });
                }
            }
        }
    }
}
