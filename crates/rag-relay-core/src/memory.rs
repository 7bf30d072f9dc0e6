//! In-process stand-ins for the remote platform.
//!
//! [`InMemoryPlatform`] implements both [`RetrievalBackend`] and
//! [`IndexingBackend`] over `HashMap`s behind `std::sync::RwLock`:
//! imported documents are split into fixed character windows and retrieval
//! ranks windows by query-term overlap. [`StaticGenerator`] answers every
//! prompt with a canned reply and counts its calls.
//!
//! Both follow the remote contracts closely enough (NotFound for unknown
//! corpora and objects, InvalidArgument for malformed requests) to drive the
//! ingestion and query pipelines in tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use crate::remote::{
    ChunkingParams, CorpusInfo, GenerationBackend, GenerationParams, IndexingBackend, RawContext,
    RemoteError, RetrievalBackend, RetrievalRequest,
};

const CORPUS_PARENT: &str = "projects/local/locations/memory/ragCorpora";

struct StoredChunk {
    source_uri: String,
    text: String,
}

struct MemoryCorpus {
    info: CorpusInfo,
    chunks: Vec<StoredChunk>,
}

/// In-memory retrieval and indexing platform.
pub struct InMemoryPlatform {
    corpora: RwLock<HashMap<String, MemoryCorpus>>,
    objects: RwLock<HashMap<String, String>>,
    next_id: AtomicUsize,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            corpora: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Registers an existing corpus under a fixed resource name.
    pub fn add_corpus(&self, name: &str, display_name: &str) {
        let mut corpora = self.corpora.write().unwrap_or_else(PoisonError::into_inner);
        corpora.entry(name.to_string()).or_insert_with(|| MemoryCorpus {
            info: CorpusInfo {
                name: name.to_string(),
                display_name: display_name.to_string(),
            },
            chunks: Vec::new(),
        });
    }

    /// Makes an object's text available for import under `uri`.
    pub fn put_object(&self, uri: &str, text: &str) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), text.to_string());
    }

    /// Distinct source URIs imported into `corpus`, in import order.
    pub fn imported_sources(&self, corpus: &str) -> Vec<String> {
        let corpora = self.corpora.read().unwrap_or_else(PoisonError::into_inner);
        let mut sources: Vec<String> = Vec::new();
        if let Some(c) = corpora.get(corpus) {
            for chunk in &c.chunks {
                if !sources.contains(&chunk.source_uri) {
                    sources.push(chunk.source_uri.clone());
                }
            }
        }
        sources
    }

    pub fn chunk_count(&self, corpus: &str) -> usize {
        self.corpora
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(corpus)
            .map(|c| c.chunks.len())
            .unwrap_or(0)
    }

    pub fn has_corpus(&self, corpus: &str) -> bool {
        self.corpora
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(corpus)
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits text into windows of `chunk_size` characters, each starting
/// `chunk_size - chunk_overlap` characters after the previous one.
fn split_windows(text: &str, chunking: &ChunkingParams) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let step = chunking.chunk_size - chunking.chunk_overlap;
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunking.chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
    {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    terms
}

#[async_trait]
impl IndexingBackend for InMemoryPlatform {
    async fn import_files(
        &self,
        corpus: &str,
        uris: &[String],
        chunking: &ChunkingParams,
    ) -> Result<u64, RemoteError> {
        if uris.is_empty() {
            return Err(RemoteError::InvalidArgument("no files to import".to_string()));
        }
        if chunking.chunk_size == 0 || chunking.chunk_overlap >= chunking.chunk_size {
            return Err(RemoteError::InvalidArgument(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }

        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut corpora = self.corpora.write().unwrap_or_else(PoisonError::into_inner);
        let target = corpora
            .get_mut(corpus)
            .ok_or_else(|| RemoteError::NotFound(format!("corpus {}", corpus)))?;

        let mut staged = Vec::with_capacity(uris.len());
        for uri in uris {
            let text = objects
                .get(uri)
                .ok_or_else(|| RemoteError::NotFound(format!("object {}", uri)))?;
            staged.push((uri, split_windows(text, chunking)));
        }

        for (uri, windows) in staged {
            target.chunks.retain(|c| &c.source_uri != uri);
            target
                .chunks
                .extend(windows.into_iter().map(|text| StoredChunk {
                    source_uri: uri.clone(),
                    text,
                }));
        }

        Ok(uris.len() as u64)
    }

    async fn get_corpus(&self, corpus: &str) -> Result<CorpusInfo, RemoteError> {
        self.corpora
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(corpus)
            .map(|c| c.info.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("corpus {}", corpus)))
    }

    async fn create_corpus(
        &self,
        display_name: &str,
        _description: &str,
    ) -> Result<CorpusInfo, RemoteError> {
        if display_name.trim().is_empty() {
            return Err(RemoteError::InvalidArgument(
                "display name must not be empty".to_string(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}/{}", CORPUS_PARENT, id);
        self.add_corpus(&name, display_name);
        Ok(CorpusInfo {
            name,
            display_name: display_name.to_string(),
        })
    }
}

#[async_trait]
impl RetrievalBackend for InMemoryPlatform {
    async fn retrieve_contexts(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RawContext>, RemoteError> {
        if request.query.trim().is_empty() {
            return Err(RemoteError::InvalidArgument("query text is empty".to_string()));
        }
        if request.corpora.is_empty() {
            return Err(RemoteError::InvalidArgument("no corpora given".to_string()));
        }

        let terms = query_terms(&request.query);
        let corpora = self.corpora.read().unwrap_or_else(PoisonError::into_inner);

        let mut scored: Vec<RawContext> = Vec::new();
        for name in &request.corpora {
            let corpus = corpora
                .get(name)
                .ok_or_else(|| RemoteError::NotFound(format!("corpus {}", name)))?;
            for chunk in &corpus.chunks {
                let text = chunk.text.to_lowercase();
                let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
                if matched == 0 {
                    continue;
                }
                let distance = 1.0 - matched as f64 / terms.len() as f64;
                if request.distance_threshold.is_some_and(|max| distance > max) {
                    continue;
                }
                scored.push(RawContext {
                    text: chunk.text.clone(),
                    source_uri: Some(chunk.source_uri.clone()),
                    distance: Some(distance),
                });
            }
        }

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(request.top_k);
        Ok(scored)
    }
}

/// Generator that returns a fixed reply and records what it was asked.
pub struct StaticGenerator {
    model: String,
    reply: Result<String, RemoteError>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StaticGenerator {
    pub fn new(model: &str, reply: &str) -> Self {
        Self::with_reply(model, Ok(reply.to_string()))
    }

    pub fn failing(model: &str, err: RemoteError) -> Self {
        Self::with_reply(model, Err(err))
    }

    fn with_reply(model: &str, reply: Result<String, RemoteError>) -> Self {
        Self {
            model: model.to_string(),
            reply,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GenerationBackend for StaticGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());
        self.reply.clone()
    }
}
