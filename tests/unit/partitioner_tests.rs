/*!
 * Tests for greedy batch partitioning
 */

use tabtrans::app_config::BatchConfig;
use tabtrans::batching::BatchPartitioner;
use tabtrans::errors::PipelineError;

use crate::common::request;

fn limits(per_batch: usize, per_request: usize, per_file: usize) -> BatchConfig {
    BatchConfig {
        max_tokens_per_batch: per_batch,
        max_tokens_per_request: per_request,
        max_requests_per_file: per_file,
    }
}

#[test]
fn test_partition_withEmptyInput_shouldProduceNoBatches() {
    let partitioner = BatchPartitioner::new(limits(100, 50, 10));
    let batches = partitioner.partition(Vec::new()).expect("partition");
    assert!(batches.is_empty());
}

#[test]
fn test_partition_withSmallInput_shouldProduceSingleBatch() {
    let partitioner = BatchPartitioner::new(limits(100, 50, 10));
    let requests = vec![request(1, 20), request(2, 20), request(3, 20)];

    let batches = partitioner.partition(requests).expect("partition");

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    assert_eq!(batches[0].label, "1");
}

#[test]
fn test_partition_withTokenLimit_shouldCloseBatchBeforeOverflow() {
    let partitioner = BatchPartitioner::new(limits(100, 50, 10));
    let requests: Vec<_> = (1..=7).map(|i| request(i, 30)).collect();

    let batches = partitioner.partition(requests).expect("partition");

    // 3 requests of 30 tokens fit under 100; the 4th would overflow
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].len(), 3);
    assert_eq!(batches[1].len(), 3);
    assert_eq!(batches[2].len(), 1);
}

#[test]
fn test_partition_withCountLimit_shouldCapRequestsPerFile() {
    let partitioner = BatchPartitioner::new(limits(10_000, 50, 10));
    let requests: Vec<_> = (1..=25).map(|i| request(i, 1)).collect();

    let batches = partitioner.partition(requests).expect("partition");

    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].len(), 10);
    assert_eq!(batches[1].len(), 10);
    assert_eq!(batches[2].len(), 5);
}

#[test]
fn test_partition_shouldRespectAllLimitsSimultaneously() {
    let config = limits(90, 40, 4);
    let partitioner = BatchPartitioner::new(config);
    let sizes = [10, 35, 40, 5, 5, 5, 5, 40, 1, 39, 30, 20];
    let requests: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, tokens)| request(i as u64 + 1, *tokens))
        .collect();

    let batches = partitioner.partition(requests).expect("partition");

    for batch in &batches {
        assert!(batch.total_tokens() <= config.max_tokens_per_batch);
        assert!(batch.len() <= config.max_requests_per_file);
        for request in &batch.requests {
            assert!(request.estimated_tokens <= config.max_tokens_per_request);
        }
    }
}

#[test]
fn test_partition_shouldPreserveInputOrder() {
    let partitioner = BatchPartitioner::new(limits(50, 30, 3));
    let requests: Vec<_> = (1..=20).map(|i| request(i, 10)).collect();

    let batches = partitioner.partition(requests).expect("partition");

    let flattened: Vec<String> = batches
        .iter()
        .flat_map(|b| b.requests.iter().map(|r| r.custom_id.clone()))
        .collect();
    let expected: Vec<String> = (1..=20).map(|i| format!("row-{}", i)).collect();
    assert_eq!(flattened, expected);
}

#[test]
fn test_partition_shouldBeDeterministic() {
    let partitioner = BatchPartitioner::new(limits(77, 40, 5));
    let requests: Vec<_> = (1..=30).map(|i| request(i, (i as usize % 13) + 5)).collect();

    let first = partitioner.partition(requests.clone()).expect("partition");
    let second = partitioner.partition(requests).expect("partition");

    let shape = |batches: &[tabtrans::batching::Batch]| {
        batches.iter().map(|b| b.len()).collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[test]
fn test_partition_withOversizedRequest_shouldRejectBeforePacking() {
    let partitioner = BatchPartitioner::new(limits(100, 50, 10));
    let requests = vec![request(1, 20), request(2, 51), request(3, 20)];

    let result = partitioner.partition(requests);

    match result {
        Err(PipelineError::OversizedRequest {
            custom_id,
            estimated_tokens,
            limit,
        }) => {
            assert_eq!(custom_id, "row-2");
            assert_eq!(estimated_tokens, 51);
            assert_eq!(limit, 50);
        }
        other => panic!("Expected OversizedRequest, got {:?}", other),
    }
}

#[test]
fn test_batch_fileName_shouldFollowPartNaming() {
    let partitioner = BatchPartitioner::new(limits(100, 50, 2));
    let requests: Vec<_> = (1..=3).map(|i| request(i, 10)).collect();

    let batches = partitioner.partition(requests).expect("partition");

    assert_eq!(batches[0].file_name(), "batch_requests_part_1.jsonl");
    assert_eq!(batches[1].file_name(), "batch_requests_part_2.jsonl");
}
