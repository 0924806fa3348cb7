/*!
 * Tests for job models and the job runner
 */

use std::sync::Arc;

use tabtrans::batching::Batch;
use tabtrans::errors::PipelineError;
use tabtrans::jobs::{Job, JobRunner, JobState};
use tabtrans::providers::mock::MockBatchApi;

use crate::common::{fast_config, request};

fn batch_of(label: &str, ids: std::ops::RangeInclusive<u64>) -> Batch {
    Batch::new(label, ids.map(|i| request(i, 10)).collect())
}

#[test]
fn test_batch_split_shouldPartitionRequestsExactlyOnce() {
    let batch = batch_of("3", 1..=9);
    let original_ids: Vec<String> = batch.requests.iter().map(|r| r.custom_id.clone()).collect();

    let (first, second) = batch.split();

    assert_eq!(first.label, "3.1");
    assert_eq!(second.label, "3.2");
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 5);

    let mut recombined: Vec<String> = first
        .requests
        .iter()
        .chain(second.requests.iter())
        .map(|r| r.custom_id.clone())
        .collect();
    assert_eq!(recombined, original_ids);
    recombined.sort();
    recombined.dedup();
    assert_eq!(recombined.len(), 9);
}

#[test]
fn test_batch_total_tokens_shouldSumRequests() {
    let batch = batch_of("1", 1..=4);
    assert_eq!(batch.total_tokens(), 40);
}

#[test]
fn test_job_state_display_shouldUseSnakeCase() {
    assert_eq!(JobState::PendingUpload.to_string(), "pending_upload");
    assert_eq!(JobState::FailedRetryable.to_string(), "failed_retryable");
}

#[test]
fn test_job_display_id_shouldPreferRemoteJobId() {
    let mut job = Job::new("4", 0);
    assert_eq!(job.display_id(), "4");

    job.remote_job_id = Some("batch_abc".to_string());
    assert_eq!(job.display_id(), "batch_abc");
}

#[tokio::test]
async fn test_runner_withWorkingApi_shouldCompleteAllBatches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(MockBatchApi::instant());
    let runner = JobRunner::new(Arc::clone(&api), &fast_config(), dir.path().to_path_buf());

    let batches = vec![batch_of("1", 1..=3), batch_of("2", 4..=6)];
    let report = runner.run(batches, |_, _| {}).await;

    assert!(report.is_complete());
    assert_eq!(report.completed_jobs(), 2);
    assert_eq!(report.results.len(), 6);

    // Batch request artifacts get written before submission
    assert!(dir.path().join("batch_requests_part_1.jsonl").exists());
    assert!(dir.path().join("batch_requests_part_2.jsonl").exists());
}

#[tokio::test]
async fn test_runner_shouldPersistResultArtifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(MockBatchApi::instant());
    let runner = JobRunner::new(Arc::clone(&api), &fast_config(), dir.path().to_path_buf());

    let report = runner.run(vec![batch_of("1", 1..=2)], |_, _| {}).await;
    assert!(report.is_complete());

    let job_id = report.jobs[0].remote_job_id.clone().expect("job id");
    assert!(dir.path().join(format!("output_{}.jsonl", job_id)).exists());
}

#[tokio::test]
async fn test_runner_withStalledJob_shouldEscalateToTimeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(MockBatchApi::stalled());
    let mut config = fast_config();
    config.jobs.max_poll_attempts = 3;
    let runner = JobRunner::new(Arc::clone(&api), &config, dir.path().to_path_buf());

    let report = runner.run(vec![batch_of("1", 1..=2)], |_, _| {}).await;

    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        PipelineError::JobTimeout { polls, .. } => assert_eq!(*polls, 3),
        other => panic!("Expected JobTimeout, got {:?}", other),
    }
    assert_eq!(report.jobs[0].state, JobState::FailedFatal);
}

#[tokio::test]
async fn test_runner_withFatalFailure_shouldNotResubmit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(MockBatchApi::fatal("permission denied for model"));
    let runner = JobRunner::new(Arc::clone(&api), &fast_config(), dir.path().to_path_buf());

    let report = runner.run(vec![batch_of("1", 1..=5)], |_, _| {}).await;

    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        PipelineError::FatalJob { reason, .. } => {
            assert!(reason.contains("permission denied"));
        }
        other => panic!("Expected FatalJob, got {:?}", other),
    }
    // One job, no replacement submissions
    assert_eq!(api.jobs_created().len(), 1);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_runner_withFlakyUploads_shouldRetryTransientFailures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(MockBatchApi::flaky_upload(2));
    let runner = JobRunner::new(Arc::clone(&api), &fast_config(), dir.path().to_path_buf());

    let report = runner.run(vec![batch_of("1", 1..=2)], |_, _| {}).await;

    assert!(report.is_complete());
    assert_eq!(report.results.len(), 2);
    assert_eq!(api.upload_count(), 1);
}

#[tokio::test]
async fn test_runner_withExhaustedRetries_shouldFailWithNetworkError() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(MockBatchApi::flaky_upload(100));
    let mut config = fast_config();
    config.jobs.retry_count = 2;
    let runner = JobRunner::new(Arc::clone(&api), &config, dir.path().to_path_buf());

    let report = runner.run(vec![batch_of("1", 1..=2)], |_, _| {}).await;

    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        PipelineError::TransientNetwork {
            operation,
            attempts,
            ..
        } => {
            assert_eq!(*operation, "file upload");
            assert_eq!(*attempts, 3);
        }
        other => panic!("Expected TransientNetwork, got {:?}", other),
    }
}

#[tokio::test]
async fn test_runner_withCapacityFailure_shouldResubmitHalvesExactlyOnce() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Batches above 300 requests fail with a capacity reason
    let api = Arc::new(MockBatchApi::capacity_above(300));
    let mut config = fast_config();
    config.batch.max_tokens_per_batch = 1_000_000;
    config.jobs.max_in_flight_tokens = 10_000_000;
    let runner = JobRunner::new(Arc::clone(&api), &config, dir.path().to_path_buf());

    let report = runner.run(vec![batch_of("1", 1..=500)], |_, _| {}).await;

    assert!(report.is_complete());
    assert_eq!(report.results.len(), 500);

    // The original job plus the two replacement halves
    assert_eq!(api.jobs_created().len(), 3);

    // Union of resubmitted requests equals the original batch exactly once
    let mut ids: Vec<String> = report.results.iter().map(|r| r.custom_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 500);

    // The abandoned job is kept in the bookkeeping as failed-retryable
    let retryable = report
        .jobs
        .iter()
        .filter(|j| j.state == JobState::FailedRetryable)
        .count();
    assert_eq!(retryable, 1);
    assert_eq!(report.completed_jobs(), 2);
}

#[tokio::test]
async fn test_runner_withUnsplittableCapacityFailure_shouldEscalate() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Every batch fails on capacity, even a single request
    let api = Arc::new(MockBatchApi::capacity_above(0));
    let runner = JobRunner::new(Arc::clone(&api), &fast_config(), dir.path().to_path_buf());

    let report = runner.run(vec![batch_of("1", 1..=1)], |_, _| {}).await;

    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        PipelineError::CapacityExceeded { message, .. } => {
            assert!(message.contains("token limit"));
        }
        other => panic!("Expected CapacityExceeded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_runner_progressCallback_shouldTrackSplitsInTotal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(MockBatchApi::capacity_above(300));
    let mut config = fast_config();
    config.batch.max_tokens_per_batch = 1_000_000;
    config.jobs.max_in_flight_tokens = 10_000_000;
    let runner = JobRunner::new(Arc::clone(&api), &config, dir.path().to_path_buf());

    let observed = std::sync::Mutex::new(Vec::new());
    let report = runner
        .run(vec![batch_of("1", 1..=500)], |settled, total| {
            observed.lock().unwrap().push((settled, total));
        })
        .await;
    assert!(report.is_complete());

    let observed = observed.into_inner().unwrap();
    // Three settled jobs overall, with the total growing after the split
    assert_eq!(observed.last(), Some(&(3, 3)));
    assert_eq!(observed.first(), Some(&(1, 3)));
}
