/*!
 * Request construction and batch partitioning.
 *
 * This module turns normalized rows into model-facing requests and packs
 * them into batches that respect the provider's token and count limits:
 *
 * - `request`: Request and batch value types plus the wire-format template
 * - `partitioner`: Greedy order-preserving bin packing
 */

// Re-export main types for easier usage
pub use self::partitioner::BatchPartitioner;
pub use self::request::{build_requests, Batch, RequestTemplate, TranslationRequest};

// Submodules
pub mod partitioner;
pub mod request;
