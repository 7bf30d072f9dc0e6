//! Contracts for the remote platform services.
//!
//! The managed RAG platform and the hosted model are black boxes behind
//! three traits:
//!
//! | Trait | Operations |
//! |-------|------------|
//! | [`RetrievalBackend`] | one fan-in passage query across corpora |
//! | [`IndexingBackend`] | import files into a corpus, get/create corpora |
//! | [`GenerationBackend`] | one prompt → text call |
//!
//! Implementations must be `Send + Sync`; they are shared across request
//! tasks behind `Arc`.
//!
//! Failures are reported as [`RemoteError`]. NotFound and InvalidArgument
//! are *terminal*: retrying cannot help, so callers degrade (skip the
//! document, return no context) instead of retrying.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a remote platform call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// The referenced corpus, file, or model does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request was rejected as malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Any other non-success status (rate limiting, server errors, auth).
    #[error("remote service error {status}: {message}")]
    Status { status: u16, message: String },
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Classifies an HTTP status code. 404 and 400 are terminal.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => RemoteError::NotFound(message),
            400 => RemoteError::InvalidArgument(message),
            _ => RemoteError::Status { status, message },
        }
    }

    /// Whether the failure is permanent for this request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteError::NotFound(_) | RemoteError::InvalidArgument(_)
        )
    }
}

/// One retrieval call spanning several corpora.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub query: String,
    pub corpora: Vec<String>,
    pub top_k: usize,
    /// Drop passages whose vector distance exceeds this bound.
    pub distance_threshold: Option<f64>,
}

/// A passage as the retrieval service returned it, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawContext {
    pub text: String,
    pub source_uri: Option<String>,
    pub distance: Option<f64>,
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    /// Low-randomness settings that keep answers close to the context.
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 2048,
        }
    }
}

/// Platform-side chunking applied to imported documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Corpus metadata returned by get/create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusInfo {
    /// Full resource name.
    pub name: String,
    pub display_name: String,
}

#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Returns passages in relevance order; may be empty.
    async fn retrieve_contexts(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RawContext>, RemoteError>;
}

#[async_trait]
pub trait IndexingBackend: Send + Sync {
    /// Imports documents into `corpus`, returning how many files were imported.
    async fn import_files(
        &self,
        corpus: &str,
        uris: &[String],
        chunking: &ChunkingParams,
    ) -> Result<u64, RemoteError>;

    async fn get_corpus(&self, corpus: &str) -> Result<CorpusInfo, RemoteError>;

    async fn create_corpus(
        &self,
        display_name: &str,
        description: &str,
    ) -> Result<CorpusInfo, RemoteError>;
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Model identifier reported alongside answers.
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, RemoteError>;
}
