/*!
 * Greedy order-preserving batch partitioning.
 *
 * Determinism is preferred over packing optimality: requests are packed in
 * input order, a batch closes as soon as the next request would violate a
 * limit, and a closed batch is never reopened. The same input always
 * produces the same batches, which keeps runs reproducible and artifacts
 * debuggable.
 */

use log::debug;

use crate::app_config::BatchConfig;
use crate::errors::PipelineError;

use super::request::{Batch, TranslationRequest};

/// Packs requests into batches under the configured limits
#[derive(Debug, Clone, Copy)]
pub struct BatchPartitioner {
    limits: BatchConfig,
}

impl BatchPartitioner {
    /// Create a partitioner with the given limits
    pub fn new(limits: BatchConfig) -> Self {
        Self { limits }
    }

    /// Partition requests into an ordered sequence of batches.
    ///
    /// Any single request over the per-request token limit rejects the
    /// whole input before packing starts: a row is never silently split
    /// across requests.
    pub fn partition(
        &self,
        requests: Vec<TranslationRequest>,
    ) -> Result<Vec<Batch>, PipelineError> {
        for request in &requests {
            if request.estimated_tokens > self.limits.max_tokens_per_request {
                return Err(PipelineError::OversizedRequest {
                    custom_id: request.custom_id.clone(),
                    estimated_tokens: request.estimated_tokens,
                    limit: self.limits.max_tokens_per_request,
                });
            }
        }

        let mut batches = Vec::new();
        let mut open: Vec<TranslationRequest> = Vec::new();
        let mut open_tokens = 0usize;

        for request in requests {
            let would_overflow = open_tokens + request.estimated_tokens
                > self.limits.max_tokens_per_batch
                || open.len() >= self.limits.max_requests_per_file;

            if would_overflow && !open.is_empty() {
                batches.push(Batch::new(
                    (batches.len() + 1).to_string(),
                    std::mem::take(&mut open),
                ));
                open_tokens = 0;
            }

            open_tokens += request.estimated_tokens;
            open.push(request);
        }

        if !open.is_empty() {
            batches.push(Batch::new((batches.len() + 1).to_string(), open));
        }

        debug!(
            "Partitioned into {} batches (limits: {} tokens/batch, {} tokens/request, {} requests/file)",
            batches.len(),
            self.limits.max_tokens_per_batch,
            self.limits.max_tokens_per_request,
            self.limits.max_requests_per_file
        );

        Ok(batches)
    }
}
