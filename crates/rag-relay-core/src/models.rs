//! Core data models shared by the ingestion and query pipelines.
//!
//! Ingestion side: [`IngestionEvent`] in, [`ImportOutcome`] out.
//! Query side: [`RetrievedContext`]s collected into a [`RetrievalResult`],
//! then packaged with the model output as a [`GeneratedAnswer`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// URI scheme of document locators handed to the indexing service.
pub const LOCATOR_SCHEME: &str = "gs";

/// Source label used when the retrieval service omits a passage's origin.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// A logical collection of documents and the corpus that backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Logical name (e.g. `"legal"`).
    pub name: String,
    /// Storage folder prefix routed to this collection (e.g. `"legal/"`).
    pub prefix: String,
    /// Platform corpus identifier. Empty when not yet provisioned.
    #[serde(default)]
    pub corpus: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl Collection {
    /// Whether a backing corpus identifier has been configured.
    pub fn is_provisioned(&self) -> bool {
        !self.corpus.trim().is_empty()
    }
}

/// One storage-object-created notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionEvent {
    pub bucket: String,
    /// Object path within the bucket; may contain `/`-separated folders.
    pub object_name: String,
    /// Advisory MIME type reported by the store.
    pub content_type: Option<String>,
}

impl IngestionEvent {
    pub fn new(bucket: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_name: object_name.into(),
            content_type: None,
        }
    }

    /// Folder keep-alive files (`legal/.keep`) carry no content.
    pub fn is_placeholder(&self) -> bool {
        self.object_name.ends_with(".keep")
    }

    /// Storage URI of the object, e.g. `gs://docs/legal/contract.pdf`.
    pub fn locator(&self) -> String {
        format!("{}://{}/{}", LOCATOR_SCHEME, self.bucket, self.object_name)
    }

    /// Final path segment of the object name.
    pub fn display_name(&self) -> &str {
        self.object_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.object_name)
    }
}

/// Why an event was acknowledged without importing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Placeholder,
    NoRoute,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Placeholder => "placeholder file",
            SkipReason::NoRoute => "no matching collection route",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SkipReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Result of handling one [`IngestionEvent`].
///
/// Serialized with a `status` tag:
///
/// ```json
/// {"status": "success", "corpus": "...", "document": "a.pdf", "gcs_uri": "gs://b/legal/a.pdf"}
/// {"status": "skipped", "reason": "placeholder file"}
/// {"status": "failed", "error": "document import failed"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportOutcome {
    Success {
        #[serde(rename = "corpus")]
        collection: String,
        #[serde(rename = "document")]
        document_name: String,
        #[serde(rename = "gcs_uri")]
        locator: String,
    },
    Skipped {
        reason: SkipReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        object: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl ImportOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        ImportOutcome::Skipped {
            reason,
            object: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ImportOutcome::Failed { .. })
    }
}

/// One passage returned by the retrieval service, after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    /// 1-based position in the order the service returned results.
    pub rank: usize,
    pub text: String,
    /// Origin document, `"unknown"` when the service did not say.
    pub source: String,
    pub distance: Option<f64>,
}

/// Ordered passages from one retrieval call.
///
/// An empty result means "nothing relevant found"; it is a normal outcome,
/// not a transport failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalResult(Vec<RetrievedContext>);

impl RetrievalResult {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedContext> {
        self.0.iter()
    }

    pub fn contexts(&self) -> &[RetrievedContext] {
        &self.0
    }
}

impl From<Vec<RetrievedContext>> for RetrievalResult {
    fn from(contexts: Vec<RetrievedContext>) -> Self {
        Self(contexts)
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a RetrievedContext;
    type IntoIter = std::slice::Iter<'a, RetrievedContext>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A grounded answer with provenance.
///
/// Matches the agent's `POST /query` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub response: String,
    pub contexts: RetrievalResult,
    pub model: String,
    pub num_contexts_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
