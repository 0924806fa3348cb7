use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use crate::aggregator::ResultAggregator;
use crate::app_config::Config;
use crate::batching::{build_requests, Batch, BatchPartitioner, RequestTemplate};
use crate::dataset::{self, Row};
use crate::file_utils::FileManager;
use crate::jobs::JobRunner;
use crate::providers::{BatchApi, RemoteJobSummary};
use crate::providers::openai::OpenAIBatch;
use crate::tag_codec::TagCodec;
use crate::tokens::HeuristicTokenEstimator;

// @module: Application controller for dataset translation

/// File name of the persisted placeholder mapping
pub const TAG_DICT_FILE: &str = "tag_dict.json";

/// Normalized dataset and batches, ready for submission
#[derive(Debug)]
pub struct PreparedRun {
    /// Ingested rows in input order
    pub rows: Vec<Row>,
    /// The run's placeholder codec, fully populated
    pub codec: TagCodec,
    /// Batches in partition order
    pub batches: Vec<Batch>,
    /// Sum of estimated tokens across all requests
    pub total_estimated_tokens: usize,
}

/// Outcome summary of a completed run
#[derive(Debug)]
pub struct RunSummary {
    /// Rows ingested from the input file
    pub total_rows: usize,
    /// Rows written to the output file
    pub translated_rows: usize,
    /// Row ids whose translation carried unknown placeholders
    pub corrupted_ids: Vec<u64>,
    /// Jobs that reached completion (including split replacements)
    pub completed_jobs: usize,
    /// Fatal job failures
    pub failed_jobs: usize,
    /// Total estimated tokens submitted
    pub estimated_tokens: usize,
    /// Wall-clock duration of the run
    pub elapsed: std::time::Duration,
}

/// Main application controller for dataset translation
pub struct Controller<A: BatchApi + 'static> {
    // @field: App configuration
    config: Config,
    // @field: Batch API client
    api: Arc<A>,
    // @field: Remote ids of jobs currently in flight, for abort cancellation
    active_jobs: Arc<Mutex<HashSet<String>>>,
}

impl Controller<OpenAIBatch> {
    // @method: Create a controller backed by the real OpenAI Batch API
    pub fn with_config(config: Config) -> Result<Self> {
        let api = OpenAIBatch::new_with_config(
            config.api.api_key.clone(),
            config.api.endpoint.clone(),
            config.api.request_timeout_secs,
        );
        Ok(Self::with_api(config, Arc::new(api)))
    }
}

impl<A: BatchApi> Controller<A> {
    /// Create a controller with an explicit API client implementation
    pub fn with_api(config: Config, api: Arc<A>) -> Self {
        Self {
            config,
            api,
            active_jobs: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest and normalize the dataset, persist the tag dictionary, and
    /// partition requests into batches. This sequential phase fully
    /// precedes any concurrent job work.
    pub fn prepare(&self, input_file: &Path, workdir: &Path) -> Result<PreparedRun> {
        if !FileManager::file_exists(input_file) {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }
        FileManager::ensure_dir(workdir)?;

        // Stale request files from a previous run would collide with this
        // run's batch labels
        for stale in FileManager::find_files_with_prefix(workdir, "batch_requests_part_", "jsonl")?
        {
            debug!("Removing stale batch file {:?}", stale);
            std::fs::remove_file(&stale)
                .with_context(|| format!("Failed to remove stale batch file: {:?}", stale))?;
        }

        let mut codec = TagCodec::new();
        let rows = dataset::read_rows(input_file, &mut codec)?;
        if rows.is_empty() {
            return Err(anyhow!("Input file is empty: {:?}", input_file));
        }

        codec
            .save_to_file(workdir.join(TAG_DICT_FILE))
            .context("Failed to persist tag dictionary")?;

        let estimator = HeuristicTokenEstimator::new();
        let template = self.request_template();
        let requests = build_requests(&rows, &estimator, &template);
        let total_estimated_tokens = requests.iter().map(|r| r.estimated_tokens).sum();

        let partitioner = BatchPartitioner::new(self.config.batch);
        let batches = partitioner.partition(requests)?;

        info!(
            "Prepared {} rows into {} batches (~{} estimated tokens, {} placeholders)",
            rows.len(),
            batches.len(),
            total_estimated_tokens,
            codec.len()
        );

        Ok(PreparedRun {
            rows,
            codec,
            batches,
            total_estimated_tokens,
        })
    }

    /// Write every batch request file without submitting anything.
    /// Used by dry runs to make the artifacts inspectable.
    pub fn write_batch_files(&self, prepared: &PreparedRun, workdir: &Path) -> Result<Vec<PathBuf>> {
        let template = self.request_template();
        let mut paths = Vec::with_capacity(prepared.batches.len());

        for batch in &prepared.batches {
            let path = workdir.join(batch.file_name());
            FileManager::write_to_file(&path, &batch.to_jsonl(&template))?;
            info!(
                "Batch file {:?} created with {} requests",
                path,
                batch.len()
            );
            paths.push(path);
        }

        Ok(paths)
    }

    /// Run the main workflow: normalize, partition, submit and drive all
    /// jobs, then aggregate and write the translated output.
    pub async fn run(
        &self,
        input_file: PathBuf,
        output_file: PathBuf,
        workdir: PathBuf,
    ) -> Result<RunSummary> {
        let start_time = Instant::now();

        let prepared = self.prepare(&input_file, &workdir)?;
        let expected_ids: Vec<u64> = prepared.rows.iter().map(|r| r.id).collect();

        let progress = ProgressBar::new(prepared.batches.len() as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} jobs {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let runner = JobRunner::with_registry(
            Arc::clone(&self.api),
            &self.config,
            workdir.clone(),
            Arc::clone(&self.active_jobs),
        );

        let bar = progress.clone();
        let mut report = runner
            .run(prepared.batches, move |settled, total| {
                bar.set_length(total as u64);
                bar.set_position(settled as u64);
            })
            .await;
        progress.finish_and_clear();

        for failure in &report.failures {
            error!("{}", failure);
        }

        let results = std::mem::take(&mut report.results);
        let aggregator = ResultAggregator::new(&prepared.codec);
        let output = aggregator.merge(results, &expected_ids);

        if let Some(completeness) = output.completeness_error() {
            // Never silently truncate: persist what exists, then fail loudly
            let partial_path = partial_output_path(&output_file);
            let lines: Vec<String> = output.rows.iter().map(|r| r.text.clone()).collect();
            dataset::write_rows(&partial_path, &lines)?;
            warn!(
                "Partial output ({} of {} rows) written to {:?}",
                output.rows.len(),
                expected_ids.len(),
                partial_path
            );

            return Err(anyhow::Error::new(completeness).context(format!(
                "{} of {} jobs failed; translation is incomplete",
                report.failures.len(),
                report.jobs.len()
            )));
        }

        let lines: Vec<String> = output.rows.iter().map(|r| r.text.clone()).collect();
        dataset::write_rows(&output_file, &lines)?;

        let elapsed = start_time.elapsed();
        let summary = RunSummary {
            total_rows: expected_ids.len(),
            translated_rows: output.rows.len(),
            corrupted_ids: output.corrupted_ids,
            completed_jobs: report.completed_jobs(),
            failed_jobs: report.failures.len(),
            estimated_tokens: prepared.total_estimated_tokens,
            elapsed,
        };

        info!(
            "Translation completed: {} rows in {} ({} jobs, ~{} tokens){}",
            summary.translated_rows,
            format_duration(elapsed),
            summary.completed_jobs,
            summary.estimated_tokens,
            if summary.corrupted_ids.is_empty() {
                String::new()
            } else {
                format!(", {} rows flagged corrupted", summary.corrupted_ids.len())
            }
        );
        info!("Output saved to {:?}", output_file);

        Ok(summary)
    }

    /// Best-effort remote cancellation of in-flight jobs, used when a run
    /// is aborted. Jobs not yet submitted are simply dropped locally.
    pub async fn cancel_active(&self) {
        let ids: Vec<String> = self.active_jobs.lock().iter().cloned().collect();
        for job_id in ids {
            match self.api.cancel_job(&job_id).await {
                Ok(()) => info!("Cancelled remote job {}", job_id),
                Err(e) => warn!("Could not cancel remote job {}: {}", job_id, e),
            }
        }
    }

    /// List jobs currently known to the remote service
    pub async fn list_remote_jobs(&self) -> Result<Vec<RemoteJobSummary>> {
        self.api
            .list_jobs()
            .await
            .context("Failed to list remote jobs")
    }

    fn request_template(&self) -> RequestTemplate {
        RequestTemplate::new(self.config.api.model.clone(), &self.config.target_language)
    }
}

/// Path for partial output when a run ends incomplete
fn partial_output_path(output_file: &Path) -> PathBuf {
    let mut name = output_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    name.push_str(".partial");
    output_file.with_file_name(name)
}

/// Format a duration as a compact human-readable string
fn format_duration(duration: std::time::Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
