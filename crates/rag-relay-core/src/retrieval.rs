//! Retrieval client: one fan-in query across corpora, normalized results.
//!
//! The client never fails the query pipeline. Terminal errors (unknown
//! corpus, rejected request) and unexpected errors alike degrade to an
//! empty [`RetrievalResult`]; callers that need to tell an outage apart from
//! "nothing relevant" use [`Retriever::try_retrieve`].

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::models::{Collection, RetrievalResult, RetrievedContext, UNKNOWN_SOURCE};
use crate::remote::{RawContext, RemoteError, RetrievalBackend, RetrievalRequest};

/// Queries the retrieval service on behalf of the answer composer.
pub struct Retriever {
    backend: Arc<dyn RetrievalBackend>,
    collections: Vec<Collection>,
    default_top_k: usize,
    distance_threshold: Option<f64>,
}

impl Retriever {
    pub fn new(
        backend: Arc<dyn RetrievalBackend>,
        collections: Vec<Collection>,
        default_top_k: usize,
    ) -> Self {
        Self {
            backend,
            collections,
            default_top_k: default_top_k.max(1),
            distance_threshold: None,
        }
    }

    pub fn with_distance_threshold(mut self, threshold: Option<f64>) -> Self {
        self.distance_threshold = threshold;
        self
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Corpora searched when the caller gives no filter.
    pub fn default_corpora(&self) -> Vec<String> {
        self.collections
            .iter()
            .filter(|c| c.is_provisioned())
            .map(|c| c.corpus.clone())
            .collect()
    }

    /// Maps a caller filter to corpus identifiers.
    ///
    /// Entries naming a configured collection (`"legal"`) resolve to its
    /// corpus; anything else is taken as a corpus identifier already. A
    /// missing or empty filter means every provisioned collection.
    ///
    /// Each corpus appears once, in first-seen order.
    pub fn resolve_corpora(&self, filter: Option<&[String]>) -> Vec<String> {
        let corpora = match filter {
            Some(entries) if !entries.is_empty() => entries
                .iter()
                .map(|entry| {
                    self.collections
                        .iter()
                        .find(|c| c.name == *entry && c.is_provisioned())
                        .map(|c| c.corpus.clone())
                        .unwrap_or_else(|| entry.clone())
                })
                .collect(),
            _ => self.default_corpora(),
        };

        let mut unique: Vec<String> = Vec::with_capacity(corpora.len());
        for corpus in corpora {
            if !unique.contains(&corpus) {
                unique.push(corpus);
            }
        }
        unique
    }

    /// Retrieves passages, degrading every failure to an empty result.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: Option<&[String]>,
        top_k: Option<usize>,
    ) -> RetrievalResult {
        match self.try_retrieve(query, filter, top_k).await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "retrieval failed; continuing without context");
                RetrievalResult::empty()
            }
        }
    }

    /// Retrieves passages, surfacing non-terminal failures.
    ///
    /// NotFound and InvalidArgument still yield an empty result: they mean
    /// the request cannot match anything, not that the service is down.
    pub async fn try_retrieve(
        &self,
        query: &str,
        filter: Option<&[String]>,
        top_k: Option<usize>,
    ) -> Result<RetrievalResult, RemoteError> {
        let corpora = self.resolve_corpora(filter);
        if corpora.is_empty() {
            warn!("no provisioned corpora to search");
            return Ok(RetrievalResult::empty());
        }

        let request = RetrievalRequest {
            query: query.to_string(),
            top_k: top_k.unwrap_or(self.default_top_k).max(1),
            corpora,
            distance_threshold: self.distance_threshold,
        };
        info!(
            corpora = request.corpora.len(),
            top_k = request.top_k,
            "retrieving contexts"
        );

        match self.backend.retrieve_contexts(&request).await {
            Ok(raw) => {
                let result = normalize(raw);
                info!(contexts = result.len(), "retrieved contexts");
                Ok(result)
            }
            Err(err) if err.is_terminal() => {
                error!(error = %err, "retrieval rejected");
                Ok(RetrievalResult::empty())
            }
            Err(err) => Err(err),
        }
    }
}

/// Converts raw passages into ranked contexts, preserving service order.
///
/// Missing or blank sources become `"unknown"`; non-finite distances are
/// dropped.
pub fn normalize(raw: Vec<RawContext>) -> RetrievalResult {
    raw.into_iter()
        .enumerate()
        .map(|(idx, ctx)| RetrievedContext {
            rank: idx + 1,
            text: ctx.text,
            source: ctx
                .source_uri
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            distance: ctx.distance.filter(|d| d.is_finite()),
        })
        .collect::<Vec<_>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a scripted response and records every request.
    struct ScriptedRetrieval {
        response: Result<Vec<RawContext>, RemoteError>,
        requests: Mutex<Vec<RetrievalRequest>>,
    }

    impl ScriptedRetrieval {
        fn new(response: Result<Vec<RawContext>, RemoteError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<RetrievalRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RetrievalBackend for ScriptedRetrieval {
        async fn retrieve_contexts(
            &self,
            request: &RetrievalRequest,
        ) -> Result<Vec<RawContext>, RemoteError> {
            self.requests.lock().unwrap().push(request.clone());
            self.response.clone()
        }
    }

    fn collection(name: &str, corpus: &str) -> Collection {
        Collection {
            name: name.to_string(),
            prefix: format!("{}/", name),
            corpus: corpus.to_string(),
            description: String::new(),
        }
    }

    fn collections() -> Vec<Collection> {
        vec![
            collection("legal", "corpora/legal"),
            collection("technical", "corpora/technical"),
            collection("training", ""),
        ]
    }

    fn raw(text: &str, source: Option<&str>, distance: Option<f64>) -> RawContext {
        RawContext {
            text: text.to_string(),
            source_uri: source.map(str::to_string),
            distance,
        }
    }

    #[test]
    fn test_normalize_assigns_contiguous_ranks() {
        let result = normalize(vec![
            raw("b", Some("gs://x/b.pdf"), Some(0.4)),
            raw("a", Some("gs://x/a.pdf"), Some(0.1)),
            raw("c", None, None),
        ]);
        let ranks: Vec<usize> = result.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        // Service order is kept even when distances disagree.
        assert_eq!(result.contexts()[0].text, "b");
        assert_eq!(result.contexts()[2].source, "unknown");
        assert_eq!(result.contexts()[2].distance, None);
    }

    #[test]
    fn test_normalize_blank_source_and_nan_distance() {
        let result = normalize(vec![raw("t", Some("  "), Some(f64::NAN))]);
        assert_eq!(result.contexts()[0].source, "unknown");
        assert_eq!(result.contexts()[0].distance, None);
    }

    #[test]
    fn test_resolve_corpora() {
        let backend = ScriptedRetrieval::new(Ok(vec![]));
        let retriever = Retriever::new(backend, collections(), 5);

        assert_eq!(
            retriever.resolve_corpora(None),
            vec!["corpora/legal", "corpora/technical"]
        );
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            retriever.resolve_corpora(Some(empty.as_slice())),
            vec!["corpora/legal", "corpora/technical"]
        );
        let filter = vec!["technical".to_string(), "raw/id".to_string()];
        assert_eq!(
            retriever.resolve_corpora(Some(filter.as_slice())),
            vec!["corpora/technical", "raw/id"]
        );
    }

    #[test]
    fn test_resolve_corpora_drops_duplicates() {
        let backend = ScriptedRetrieval::new(Ok(vec![]));
        let retriever = Retriever::new(backend, collections(), 5);

        let filter: Vec<String> = ["legal", "technical", "legal", "corpora/technical"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            retriever.resolve_corpora(Some(filter.as_slice())),
            vec!["corpora/legal", "corpora/technical"]
        );
    }

    #[tokio::test]
    async fn test_single_fan_in_call() {
        let backend = ScriptedRetrieval::new(Ok(vec![raw("x", None, None)]));
        let retriever = Retriever::new(backend.clone(), collections(), 5)
            .with_distance_threshold(Some(0.5));

        let result = retriever.retrieve("termination", None, None).await;
        assert_eq!(result.len(), 1);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].corpora.len(), 2);
        assert_eq!(requests[0].top_k, 5);
        assert_eq!(requests[0].distance_threshold, Some(0.5));
        assert_eq!(requests[0].query, "termination");
    }

    #[tokio::test]
    async fn test_top_k_override() {
        let backend = ScriptedRetrieval::new(Ok(vec![]));
        let retriever = Retriever::new(backend.clone(), collections(), 5);
        retriever.retrieve("q", None, Some(12)).await;
        assert_eq!(backend.requests()[0].top_k, 12);
    }

    #[tokio::test]
    async fn test_terminal_errors_yield_empty() {
        for err in [
            RemoteError::NotFound("corpus".to_string()),
            RemoteError::InvalidArgument("bad".to_string()),
        ] {
            let retriever = Retriever::new(ScriptedRetrieval::new(Err(err)), collections(), 5);
            let result = retriever.try_retrieve("q", None, None).await.unwrap();
            assert!(result.is_empty());
        }
    }

    #[tokio::test]
    async fn test_outage_surfaces_only_through_try_retrieve() {
        let err = RemoteError::Status {
            status: 503,
            message: "unavailable".to_string(),
        };
        let retriever = Retriever::new(ScriptedRetrieval::new(Err(err.clone())), collections(), 5);

        assert!(retriever.retrieve("q", None, None).await.is_empty());
        assert_eq!(retriever.try_retrieve("q", None, None).await, Err(err));
    }

    #[tokio::test]
    async fn test_no_provisioned_corpora_skips_call() {
        let backend = ScriptedRetrieval::new(Ok(vec![raw("x", None, None)]));
        let retriever = Retriever::new(backend.clone(), vec![collection("training", "")], 5);
        assert!(retriever.retrieve("q", None, None).await.is_empty());
        assert!(backend.requests().is_empty());
    }
}
