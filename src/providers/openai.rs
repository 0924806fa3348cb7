use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::error;
use reqwest::{multipart, Client, Response};
use serde::Deserialize;
use serde_json::json;

use crate::errors::ApiError;

use super::{
    classify_failure, BatchApi, JobFailure, RemoteJobState, RemoteJobStatus, RemoteJobSummary,
};

/// OpenAI client for the Files + Batches API
pub struct OpenAIBatch {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL (optional, defaults to public API)
    endpoint: String,
}

// api_key is deliberately excluded from Debug output
impl fmt::Debug for OpenAIBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIBatch")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// File object returned by the upload endpoint
#[derive(Debug, Deserialize)]
struct FileObject {
    /// Remote file id
    id: String,
}

/// Batch object returned by the batch endpoints
#[derive(Debug, Deserialize)]
struct BatchObject {
    /// Remote job id
    id: String,
    /// Current status string
    status: String,
    /// Output file id, present once completed
    output_file_id: Option<String>,
    /// Failure details, present when the batch failed
    errors: Option<BatchErrorList>,
}

/// Error list attached to a failed batch
#[derive(Debug, Deserialize)]
struct BatchErrorList {
    /// Individual error entries
    #[serde(default)]
    data: Vec<BatchErrorDatum>,
}

/// One error entry from a failed batch
#[derive(Debug, Deserialize)]
struct BatchErrorDatum {
    /// Machine-readable error code
    code: Option<String>,
    /// Human-readable error message
    message: Option<String>,
}

/// Response of the batch listing endpoint
#[derive(Debug, Deserialize)]
struct ListBatchesResponse {
    /// Batches known to the account
    #[serde(default)]
    data: Vec<BatchObject>,
}

impl BatchObject {
    /// Convert the wire object into the provider-neutral status snapshot
    fn into_status(self) -> RemoteJobStatus {
        let failure = self.errors.and_then(|list| {
            list.data.first().map(|datum| {
                let message = datum
                    .message
                    .clone()
                    .unwrap_or_else(|| "No error message provided".to_string());
                JobFailure {
                    kind: classify_failure(datum.code.as_deref(), &message),
                    message,
                }
            })
        });

        RemoteJobStatus {
            state: RemoteJobState::from_provider(&self.status),
            output_file_id: self.output_file_id,
            failure,
        }
    }
}

impl OpenAIBatch {
    /// Create a new client with the default request timeout
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new_with_config(api_key, endpoint, 120)
    }

    /// Create a new client with an explicit per-call timeout
    pub fn new_with_config(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.is_empty() {
            "https://api.openai.com".to_string()
        } else {
            endpoint.trim_end_matches('/').to_string()
        };

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Map a non-success HTTP response to the error taxonomy
    async fn rejection(response: Response) -> ApiError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        error!("OpenAI API error ({}): {}", status, error_text);

        match status.as_u16() {
            401 | 403 => ApiError::AuthenticationError(error_text),
            code => ApiError::ApiRejection {
                status_code: code,
                message: error_text,
            },
        }
    }

    /// Execute a request future and decode a JSON body, mapping transport
    /// and HTTP failures onto the error taxonomy
    async fn decode<T: serde::de::DeserializeOwned>(
        result: Result<Response, reqwest::Error>,
    ) -> Result<T, ApiError> {
        let response = result.map_err(|e| ApiError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl BatchApi for OpenAIBatch {
    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String, ApiError> {
        let form = multipart::Form::new()
            .text("purpose", "batch")
            .part(
                "file",
                multipart::Part::bytes(content)
                    .file_name(file_name.to_string())
                    .mime_str("application/jsonl")
                    .map_err(|e| ApiError::RequestFailed(e.to_string()))?,
            );

        let result = self
            .client
            .post(self.url("/v1/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await;

        let file: FileObject = Self::decode(result).await?;
        Ok(file.id)
    }

    async fn create_job(&self, file_id: &str) -> Result<String, ApiError> {
        let body = json!({
            "input_file_id": file_id,
            "endpoint": "/v1/chat/completions",
            "completion_window": "24h",
            "metadata": { "description": "Translation batch job" },
        });

        let result = self
            .client
            .post(self.url("/v1/batches"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let batch: BatchObject = Self::decode(result).await?;
        Ok(batch.id)
    }

    async fn poll_status(&self, job_id: &str) -> Result<RemoteJobStatus, ApiError> {
        let result = self
            .client
            .get(self.url(&format!("/v1/batches/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        let batch: BatchObject = Self::decode(result).await?;
        Ok(batch.into_status())
    }

    async fn download_result(&self, output_file_id: &str) -> Result<Bytes, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/files/{}/content", output_file_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ApiError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        response
            .bytes()
            .await
            .map_err(|e| ApiError::ConnectionError(e.to_string()))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let result = self
            .client
            .post(self.url(&format!("/v1/batches/{}/cancel", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        let _: BatchObject = Self::decode(result).await?;
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<RemoteJobSummary>, ApiError> {
        let result = self
            .client
            .get(self.url("/v1/batches"))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        let listing: ListBatchesResponse = Self::decode(result).await?;
        Ok(listing
            .data
            .into_iter()
            .map(|batch| RemoteJobSummary {
                id: batch.id,
                status: batch.status,
            })
            .collect())
    }
}
