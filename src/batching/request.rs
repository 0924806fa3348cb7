/*!
 * Request and batch value types.
 *
 * A `TranslationRequest` is one model-facing call; a `Batch` is an ordered,
 * immutable set of requests that is serialized to a JSONL file and submitted
 * as one remote job.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::dataset::Row;
use crate::tokens::TokenEstimator;

/// Tokens reserved per request on top of the payload estimate, covering
/// response framing and request envelope overhead
pub const RESPONSE_MARGIN_TOKENS: usize = 100;

// @const: custom_id shape; a trailing "-{n}" sub-chunk suffix is accepted
// and ignored for forward compatibility
static CUSTOM_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^row-(\d+)(?:-\d+)?$").unwrap()
});

/// One model-facing translation call
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    /// Globally unique id encoding the originating row, e.g. "row-42"
    pub custom_id: String,
    /// The normalized row text sent to the model
    pub payload: String,
    /// Estimated tokens for this request including system prompt and margin
    pub estimated_tokens: usize,
}

impl TranslationRequest {
    /// The custom_id assigned to a given row
    pub fn custom_id_for_row(row_id: u64) -> String {
        format!("row-{}", row_id)
    }

    /// Recover the originating row id from a custom_id, with no auxiliary
    /// lookup. Returns None for ids this run never issued.
    pub fn decode_row_id(custom_id: &str) -> Option<u64> {
        CUSTOM_ID_REGEX
            .captures(custom_id)
            .and_then(|caps| caps[1].parse().ok())
    }
}

/// Wire-format template shared by every request in a run
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    /// Model name placed in each request body
    pub model: String,
    /// System prompt instructing the model to preserve placeholders
    pub system_prompt: String,
    /// Completion token cap per request
    pub max_tokens: u32,
}

impl RequestTemplate {
    /// Build the template for a target language
    pub fn new(model: impl Into<String>, target_language: &str) -> Self {
        let system_prompt = format!(
            "You are a translation assistant. Translate the following text to {}. \
             The following STEPS must be followed. Whenever you are forming a response, \
             ensure all STEPS have been followed otherwise start over, forming a new \
             response and repeat until the finished response follows all the STEPS. \
             Then send the response. \
             STEPS: \
             STEP-1: Keep {{{{tag_x}}}} tags with numbers as they are. \
             STEP-2: You must not miss the data from user's input in your responses \
             especially {{{{tag_x}}}} tags, special symbols '{{{{{{', '}}}}}}', '|||' etc.! \
             STEP-3: Just translate. No comments or explanations. \
             STEP-4: If you can't assist with the request just return the request as an answer.",
            target_language
        );

        Self {
            model: model.into(),
            system_prompt,
            max_tokens: 1000,
        }
    }
}

/// One line of a batch request file, in the provider's wire format
#[derive(Debug, Serialize)]
struct BatchFileLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ChatBody<'a>,
}

/// Chat completion request body embedded in a batch file line
#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

/// Chat message object
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// An ordered set of requests submitted together as one remote job.
/// Immutable once finalized by the partitioner; a capacity retry replaces
/// it with two halves rather than mutating it.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Human-readable batch label, e.g. "3" or "3.1" for a split half
    pub label: String,
    /// Requests in input order
    pub requests: Vec<TranslationRequest>,
}

impl Batch {
    /// Create a batch from already-validated requests
    pub fn new(label: impl Into<String>, requests: Vec<TranslationRequest>) -> Self {
        Self {
            label: label.into(),
            requests,
        }
    }

    /// Number of requests in the batch
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the batch holds no requests
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Sum of estimated tokens across all requests
    pub fn total_tokens(&self) -> usize {
        self.requests.iter().map(|r| r.estimated_tokens).sum()
    }

    /// The local artifact file name assigned to this batch
    pub fn file_name(&self) -> String {
        format!("batch_requests_part_{}.jsonl", self.label)
    }

    /// Split the batch into two halves by request order, preserving the
    /// original ordering across the pair. Panics only if called on a
    /// batch with fewer than two requests, which the runner guards against.
    pub fn split(self) -> (Batch, Batch) {
        debug_assert!(self.requests.len() >= 2);
        let mid = self.requests.len() / 2;
        let mut first = self.requests;
        let second = first.split_off(mid);

        (
            Batch::new(format!("{}.1", self.label), first),
            Batch::new(format!("{}.2", self.label), second),
        )
    }

    /// Serialize the batch to the provider's JSONL request-file format,
    /// one request per line
    pub fn to_jsonl(&self, template: &RequestTemplate) -> String {
        let mut out = String::new();
        for request in &self.requests {
            let line = BatchFileLine {
                custom_id: &request.custom_id,
                method: "POST",
                url: "/v1/chat/completions",
                body: ChatBody {
                    model: &template.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: &template.system_prompt,
                        },
                        ChatMessage {
                            role: "user",
                            content: &request.payload,
                        },
                    ],
                    max_tokens: template.max_tokens,
                    temperature: 0.0,
                },
            };

            // Requests are plain data structs; serialization cannot fail
            out.push_str(&serde_json::to_string(&line).expect("batch line serialization"));
            out.push('\n');
        }
        out
    }
}

/// Build one request per row, in row order.
///
/// Each estimate carries the system prompt cost and a fixed response
/// margin so batch budgeting reflects what the provider will count.
pub fn build_requests(
    rows: &[Row],
    estimator: &dyn TokenEstimator,
    template: &RequestTemplate,
) -> Vec<TranslationRequest> {
    let overhead = estimator.estimate(&template.system_prompt) + RESPONSE_MARGIN_TOKENS;

    rows.iter()
        .map(|row| TranslationRequest {
            custom_id: TranslationRequest::custom_id_for_row(row.id),
            payload: row.normalized_text.clone(),
            estimated_tokens: estimator.estimate(&row.normalized_text) + overhead,
        })
        .collect()
}
