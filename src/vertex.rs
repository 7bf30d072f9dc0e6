//! Vertex AI RAG Engine and Gemini over REST.
//!
//! [`VertexPlatform`] implements all three remote traits against the
//! `v1` API of one project/region:
//!
//! | Trait method | Endpoint |
//! |--------------|----------|
//! | `retrieve_contexts` | `POST {parent}:retrieveContexts` |
//! | `import_files` | `POST {corpus}/ragFiles:import` (long-running) |
//! | `get_corpus` | `GET {corpus}` |
//! | `create_corpus` | `POST {parent}/ragCorpora` (long-running) |
//! | `generate` | `POST {parent}/publishers/google/models/{model}:generateContent` |
//!
//! where `parent = projects/{project}/locations/{region}`.
//!
//! # Authentication
//!
//! Requests carry an OAuth bearer token read once at startup from the
//! environment variable named by `platform.access_token_env`
//! (default `GOOGLE_OAUTH_ACCESS_TOKEN`, e.g. from
//! `gcloud auth print-access-token`).
//!
//! # Error Mapping
//!
//! - HTTP 404 → [`RemoteError::NotFound`], 400 → [`RemoteError::InvalidArgument`]
//! - other non-2xx → [`RemoteError::Status`]
//! - connection failures and timeouts → [`RemoteError::Transport`]
//! - finished long-running operations report gRPC codes: 5 → NotFound,
//!   3 → InvalidArgument
//!
//! No call is retried here; retry policy belongs to the caller.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

use rag_relay_core::remote::{
    ChunkingParams, CorpusInfo, GenerationBackend, GenerationParams, IndexingBackend, RawContext,
    RemoteError, RetrievalBackend, RetrievalRequest,
};

use crate::config::Config;

const GRPC_INVALID_ARGUMENT: i64 = 3;
const GRPC_NOT_FOUND: i64 = 5;

/// REST client for one Vertex AI project and region.
pub struct VertexPlatform {
    client: reqwest::Client,
    base_url: String,
    parent: String,
    model: String,
    token: String,
    poll_interval: Duration,
    operation_timeout: Duration,
}

impl VertexPlatform {
    /// Creates a client, reading the bearer token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token variable is unset or empty.
    pub fn new(config: &Config) -> Result<Self> {
        let var = &config.platform.access_token_env;
        let token = match std::env::var(var) {
            Ok(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => bail!("{} environment variable not set", var),
        };
        Self::with_token(config, token)
    }

    pub fn with_token(config: &Config, token: String) -> Result<Self> {
        let platform = &config.platform;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(platform.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url(platform.endpoint.as_deref(), &platform.region),
            parent: format!(
                "projects/{}/locations/{}",
                platform.project_id, platform.region
            ),
            model: config.generation.model.clone(),
            token,
            poll_interval: Duration::from_millis(platform.operation_poll_ms),
            operation_timeout: Duration::from_secs(platform.operation_timeout_secs),
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    fn model_url(&self) -> String {
        if self.model.starts_with("projects/") {
            self.url(&format!("{}:generateContent", self.model))
        } else {
            self.url(&format!(
                "{}/publishers/google/models/{}:generateContent",
                self.parent, self.model
            ))
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, RemoteError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::from_status(
                status.as_u16(),
                error_message(&body),
            ));
        }

        if body.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed(e.to_string()))
    }

    /// Polls a long-running operation until it finishes, returning its
    /// `response` payload.
    async fn wait_for_operation(&self, mut operation: Value) -> Result<Value, RemoteError> {
        let started = Instant::now();
        loop {
            if operation.get("done").and_then(Value::as_bool).unwrap_or(false) {
                return operation_result(&operation);
            }

            let name = operation
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| RemoteError::Malformed("operation has no name".to_string()))?
                .to_string();

            if started.elapsed() >= self.operation_timeout {
                return Err(RemoteError::Status {
                    status: 504,
                    message: format!(
                        "operation {} did not finish within {}s",
                        name,
                        self.operation_timeout.as_secs()
                    ),
                });
            }

            debug!(operation = %name, "waiting for long-running operation");
            tokio::time::sleep(self.poll_interval).await;
            operation = self.send(self.client.get(self.url(&name))).await?;
        }
    }
}

#[async_trait]
impl RetrievalBackend for VertexPlatform {
    async fn retrieve_contexts(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RawContext>, RemoteError> {
        let url = self.url(&format!("{}:retrieveContexts", self.parent));
        let json = self
            .send(self.client.post(url).json(&retrieve_body(request)))
            .await?;
        parse_retrieve_response(&json)
    }
}

#[async_trait]
impl IndexingBackend for VertexPlatform {
    async fn import_files(
        &self,
        corpus: &str,
        uris: &[String],
        chunking: &ChunkingParams,
    ) -> Result<u64, RemoteError> {
        let url = self.url(&format!("{}/ragFiles:import", corpus));
        let operation = self
            .send(self.client.post(url).json(&import_body(uris, chunking)))
            .await?;
        let response = self.wait_for_operation(operation).await?;
        Ok(response
            .get("importedRagFilesCount")
            .map(parse_count)
            .unwrap_or(0))
    }

    async fn get_corpus(&self, corpus: &str) -> Result<CorpusInfo, RemoteError> {
        let json = self.send(self.client.get(self.url(corpus))).await?;
        parse_corpus(&json)
    }

    async fn create_corpus(
        &self,
        display_name: &str,
        description: &str,
    ) -> Result<CorpusInfo, RemoteError> {
        let url = self.url(&format!("{}/ragCorpora", self.parent));
        let body = json!({
            "displayName": display_name,
            "description": description,
        });
        let operation = self.send(self.client.post(url).json(&body)).await?;
        let response = self.wait_for_operation(operation).await?;
        parse_corpus(&response)
    }
}

#[async_trait]
impl GenerationBackend for VertexPlatform {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, RemoteError> {
        let json = self
            .send(
                self.client
                    .post(self.model_url())
                    .json(&generate_body(prompt, params)),
            )
            .await?;
        parse_generate_response(&json)
    }
}

/// API root for a region, or the configured override without a trailing `/`.
pub fn base_url(endpoint: Option<&str>, region: &str) -> String {
    match endpoint {
        Some(e) => e.trim_end_matches('/').to_string(),
        None => format!("https://{}-aiplatform.googleapis.com/v1", region),
    }
}

fn retrieve_body(request: &RetrievalRequest) -> Value {
    let resources: Vec<Value> = request
        .corpora
        .iter()
        .map(|c| json!({ "ragCorpus": c }))
        .collect();

    let mut store = json!({ "ragResources": resources });
    if let Some(threshold) = request.distance_threshold {
        store["vectorDistanceThreshold"] = json!(threshold);
    }

    json!({
        "vertexRagStore": store,
        "query": {
            "text": request.query,
            "ragRetrievalConfig": { "topK": request.top_k },
        },
    })
}

fn import_body(uris: &[String], chunking: &ChunkingParams) -> Value {
    json!({
        "importRagFilesConfig": {
            "gcsSource": { "uris": uris },
            "ragFileTransformationConfig": {
                "ragFileChunkingConfig": {
                    "fixedLengthChunking": {
                        "chunkSize": chunking.chunk_size,
                        "chunkOverlap": chunking.chunk_overlap,
                    }
                }
            }
        }
    })
}

fn generate_body(prompt: &str, params: &GenerationParams) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": {
            "temperature": params.temperature,
            "topP": params.top_p,
            "topK": params.top_k,
            "maxOutputTokens": params.max_output_tokens,
        },
    })
}

/// Extracts passages from a `retrieveContexts` response.
///
/// The passages live under `contexts.contexts`; an empty response body
/// means no passages. `distance` is preferred, falling back to `score`.
fn parse_retrieve_response(json: &Value) -> Result<Vec<RawContext>, RemoteError> {
    let Some(items) = json.get("contexts").and_then(|c| c.get("contexts")) else {
        return Ok(Vec::new());
    };
    let items = items
        .as_array()
        .ok_or_else(|| RemoteError::Malformed("contexts.contexts is not an array".to_string()))?;

    Ok(items
        .iter()
        .map(|item| RawContext {
            text: item
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            source_uri: item
                .get("sourceUri")
                .and_then(Value::as_str)
                .map(str::to_string),
            distance: item
                .get("distance")
                .or_else(|| item.get("score"))
                .and_then(Value::as_f64),
        })
        .collect())
}

/// Joins the text parts of the first candidate.
fn parse_generate_response(json: &Value) -> Result<String, RemoteError> {
    let candidate = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first());

    let Some(candidate) = candidate else {
        let reason = json
            .get("promptFeedback")
            .and_then(|f| f.get("blockReason"))
            .and_then(Value::as_str);
        return Err(match reason {
            Some(r) => RemoteError::Malformed(format!("prompt blocked: {}", r)),
            None => RemoteError::Malformed("response has no candidates".to_string()),
        });
    };

    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array);

    let text: String = parts
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let finish = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");
        return Err(RemoteError::Malformed(format!(
            "candidate has no text (finish reason {})",
            finish
        )));
    }

    Ok(text)
}

fn parse_corpus(json: &Value) -> Result<CorpusInfo, RemoteError> {
    let name = json
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Malformed("corpus has no name".to_string()))?;
    Ok(CorpusInfo {
        name: name.to_string(),
        display_name: json
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// int64 fields arrive as JSON strings; accept numbers too.
fn parse_count(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

fn operation_result(operation: &Value) -> Result<Value, RemoteError> {
    if let Some(error) = operation.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(2);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("operation failed")
            .to_string();
        return Err(match code {
            GRPC_NOT_FOUND => RemoteError::NotFound(message),
            GRPC_INVALID_ARGUMENT => RemoteError::InvalidArgument(message),
            _ => RemoteError::Status {
                status: 500,
                message: format!("operation failed with code {}: {}", code, message),
            },
        });
    }
    Ok(operation.get("response").cloned().unwrap_or_else(|| json!({})))
}

/// Pulls `error.message` out of a Google API error body, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(500).collect())
}
