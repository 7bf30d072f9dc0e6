//! Ingestion: storage events in, corpus imports out.
//!
//! ```text
//! event body ──▶ parse_envelope ──▶ EventHandler::handle
//!                                      │ placeholder? ─▶ Skipped
//!                                      │ route()      ─▶ Skipped (no route)
//!                                      ▼
//!                               IngestionClient::import_document
//!                                      │ retry on transient errors
//!                                      ▼
//!                               Success / Failed / Err
//! ```
//!
//! Only the remote import call is retried. Terminal errors (unknown corpus,
//! rejected request) end the attempt loop immediately and become a `false`
//! result; anything else is retried per [`RetryPolicy`] and the last error
//! propagates once attempts run out.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use rag_relay_core::models::{ImportOutcome, IngestionEvent, SkipReason};
use rag_relay_core::remote::{ChunkingParams, IndexingBackend, RemoteError};
use rag_relay_core::retry::RetryPolicy;
use rag_relay_core::routing::CollectionRouter;

use crate::config::Config;

/// Error text of [`ImportOutcome::Failed`] when the import was rejected.
pub const IMPORT_FAILED: &str = "document import failed";

/// Imports documents into corpora with bounded retry.
pub struct IngestionClient {
    backend: Arc<dyn IndexingBackend>,
    chunking: ChunkingParams,
    retry: RetryPolicy,
}

impl IngestionClient {
    pub fn new(
        backend: Arc<dyn IndexingBackend>,
        chunking: ChunkingParams,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            chunking,
            retry,
        }
    }

    /// Imports one document into `corpus`.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the platform
    /// rejects the request outright (NotFound / InvalidArgument). Other
    /// errors are retried; the last one is returned after the final attempt.
    pub async fn import_document(
        &self,
        corpus: &str,
        locator: &str,
        display_name: &str,
    ) -> Result<bool, RemoteError> {
        let uris = vec![locator.to_string()];
        let mut attempt = 1;

        loop {
            info!(corpus, locator, attempt, "importing document");

            match self
                .backend
                .import_files(corpus, &uris, &self.chunking)
                .await
            {
                Ok(imported) => {
                    info!(corpus, locator, display_name, imported, "document imported");
                    return Ok(true);
                }
                Err(err) if err.is_terminal() => {
                    error!(corpus, locator, attempt, error = %err, "import rejected");
                    return Ok(false);
                }
                Err(err) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        corpus,
                        locator,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "import failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(corpus, locator, attempt, error = %err, "import failed; giving up");
                    return Err(err);
                }
            }
        }
    }

    /// Makes sure `corpus` exists, creating a corpus named `display_name`
    /// when it does not. Never fails; problems are logged and reported as
    /// `false`.
    ///
    /// The platform assigns created corpora a fresh identifier, which is
    /// logged so it can be copied into the configuration.
    pub async fn ensure_collection_exists(&self, corpus: &str, display_name: &str) -> bool {
        match self.backend.get_corpus(corpus).await {
            Ok(info) => {
                info!(corpus = %info.name, display_name = %info.display_name, "corpus exists");
                true
            }
            Err(RemoteError::NotFound(_)) => {
                let description = format!("RAG corpus for {}", display_name);
                match self.backend.create_corpus(display_name, &description).await {
                    Ok(created) => {
                        info!(
                            requested = corpus,
                            created = %created.name,
                            display_name,
                            "corpus created"
                        );
                        true
                    }
                    Err(err) => {
                        error!(corpus, error = %err, "failed to create corpus");
                        false
                    }
                }
            }
            Err(err) => {
                error!(corpus, error = %err, "failed to look up corpus");
                false
            }
        }
    }
}

/// Routes storage events and imports the documents they describe.
pub struct EventHandler {
    router: CollectionRouter,
    client: IngestionClient,
}

impl EventHandler {
    pub fn new(router: CollectionRouter, client: IngestionClient) -> Self {
        Self { router, client }
    }

    /// Handler wired from configuration onto `backend`.
    pub fn from_config(config: &Config, backend: Arc<dyn IndexingBackend>) -> Self {
        Self::new(
            CollectionRouter::from_collections(&config.collections),
            IngestionClient::new(
                backend,
                config.ingest.chunking(),
                config.ingest.retry_policy(),
            ),
        )
    }

    pub fn router(&self) -> &CollectionRouter {
        &self.router
    }

    /// Processes one event. Errors are remote failures that outlived the
    /// retry budget.
    pub async fn handle(&self, event: &IngestionEvent) -> Result<ImportOutcome, RemoteError> {
        info!(
            bucket = %event.bucket,
            object = %event.object_name,
            content_type = event.content_type.as_deref().unwrap_or("-"),
            "storage event received"
        );

        if event.is_placeholder() {
            info!(object = %event.object_name, "skipping placeholder file");
            return Ok(ImportOutcome::skipped(SkipReason::Placeholder));
        }

        let Some(corpus) = self.router.route(&event.object_name) else {
            warn!(object = %event.object_name, "no collection route for object");
            return Ok(ImportOutcome::Skipped {
                reason: SkipReason::NoRoute,
                object: Some(event.object_name.clone()),
            });
        };

        let locator = event.locator();
        let display_name = event.display_name();
        info!(
            folder = self.router.folder_of(&event.object_name).unwrap_or_default(),
            corpus,
            locator = %locator,
            "routing document"
        );

        if self
            .client
            .import_document(corpus, &locator, display_name)
            .await?
        {
            Ok(ImportOutcome::Success {
                collection: corpus.to_string(),
                document_name: display_name.to_string(),
                locator,
            })
        } else {
            Ok(ImportOutcome::Failed {
                error: IMPORT_FAILED.to_string(),
            })
        }
    }
}

// ============ Event envelopes ============

/// A storage event body that cannot be turned into an [`IngestionEvent`].
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error("invalid event body: {0}")]
    InvalidBody(String),
    #[error("event is missing '{0}'")]
    MissingField(&'static str),
}

/// CloudEvent metadata plus the storage event it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub id: Option<String>,
    pub event_type: Option<String>,
    pub event: IngestionEvent,
}

#[derive(Deserialize)]
struct StorageObject {
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "contentType")]
    content_type: Option<String>,
}

/// Parses an event delivery in either CloudEvents mode.
///
/// - structured: `{"id", "type", "data": {"bucket", "name", "contentType"}}`
/// - binary: the storage object itself as the body, with `ce-id` and
///   `ce-type` passed in as `header_id` / `header_type`
///
/// Values in the body take precedence over headers.
pub fn parse_envelope(
    body: &[u8],
    header_id: Option<&str>,
    header_type: Option<&str>,
) -> Result<EventEnvelope, EventError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| EventError::InvalidBody(e.to_string()))?;
    if !value.is_object() {
        return Err(EventError::InvalidBody("expected a JSON object".to_string()));
    }

    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    let id = text("id").or_else(|| header_id.map(str::to_string));
    let event_type = text("type").or_else(|| header_type.map(str::to_string));

    let payload = match value.get("data") {
        Some(data) if data.is_object() => data.clone(),
        _ => value.clone(),
    };
    let object: StorageObject =
        serde_json::from_value(payload).map_err(|e| EventError::InvalidBody(e.to_string()))?;

    let bucket = non_empty(object.bucket).ok_or(EventError::MissingField("bucket"))?;
    let name = non_empty(object.name).ok_or(EventError::MissingField("name"))?;

    let mut event = IngestionEvent::new(bucket, name);
    event.content_type = object.content_type;

    Ok(EventEnvelope {
        id,
        event_type,
        event,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============ CLI ============

/// Prints the collection an object path would be routed to.
pub fn run_route(config: &Config, object_path: &str) -> anyhow::Result<()> {
    let router = CollectionRouter::from_collections(&config.collections);
    let event = IngestionEvent::new(config.ingest.bucket.as_deref().unwrap_or("-"), object_path);

    if event.is_placeholder() {
        println!("{}: skipped ({})", object_path, SkipReason::Placeholder);
        return Ok(());
    }
    match (router.route(object_path), router.folder_of(object_path)) {
        (Some(corpus), Some(folder)) => println!("{}: {} → {}", object_path, folder, corpus),
        _ => println!("{}: skipped ({})", object_path, SkipReason::NoRoute),
    }
    Ok(())
}

/// Runs the event handler for one object and prints the outcome as JSON.
///
/// A failed outcome is also returned as an error so the exit code is
/// non-zero.
pub async fn run_ingest(
    config: &Config,
    bucket: &str,
    object_name: &str,
    content_type: Option<String>,
) -> anyhow::Result<()> {
    let handler = crate::platform::connect(config)?.event_handler(config);

    let mut event = IngestionEvent::new(bucket, object_name);
    event.content_type = content_type;

    let outcome = handler.handle(&event).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let ImportOutcome::Failed { error } = outcome {
        anyhow::bail!("{}: {}", event.locator(), error);
    }
    Ok(())
}
