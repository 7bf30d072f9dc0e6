//! Remote backend selection.
//!
//! `platform.provider` picks the implementation behind the three remote
//! traits:
//!
//! - `vertex`: [`VertexPlatform`] against the configured project.
//! - `memory`: [`InMemoryPlatform`] with every provisioned collection's
//!   corpus pre-registered, plus a [`StaticGenerator`]. Nothing leaves the
//!   process; useful for local runs and tests.

use anyhow::{bail, Result};
use std::sync::Arc;

use rag_relay_core::answer::AnswerComposer;
use rag_relay_core::memory::{InMemoryPlatform, StaticGenerator};
use rag_relay_core::remote::{GenerationBackend, IndexingBackend, RetrievalBackend};
use rag_relay_core::retrieval::Retriever;

use crate::config::Config;
use crate::ingest::{EventHandler, IngestionClient};
use crate::vertex::VertexPlatform;

/// Reply of the memory provider's generator.
pub const MEMORY_REPLY: &str = "Generated answer unavailable: the memory provider has no language model.";

/// The backends both services are built from.
#[derive(Clone)]
pub struct Backends {
    pub retrieval: Arc<dyn RetrievalBackend>,
    pub indexing: Arc<dyn IndexingBackend>,
    pub generation: Arc<dyn GenerationBackend>,
}

impl Backends {
    /// Wires all three roles to one in-memory platform.
    pub fn memory(platform: Arc<InMemoryPlatform>, generator: Arc<dyn GenerationBackend>) -> Self {
        Self {
            retrieval: platform.clone(),
            indexing: platform,
            generation: generator,
        }
    }

    pub fn retriever(&self, config: &Config) -> Retriever {
        Retriever::new(
            self.retrieval.clone(),
            config.collections.clone(),
            config.retrieval.top_k,
        )
        .with_distance_threshold(config.retrieval.similarity_threshold)
    }

    pub fn composer(&self, config: &Config) -> AnswerComposer {
        AnswerComposer::new(
            self.retriever(config),
            self.generation.clone(),
            config.generation.params(),
        )
    }

    pub fn ingestion_client(&self, config: &Config) -> IngestionClient {
        IngestionClient::new(
            self.indexing.clone(),
            config.ingest.chunking(),
            config.ingest.retry_policy(),
        )
    }

    pub fn event_handler(&self, config: &Config) -> EventHandler {
        EventHandler::from_config(config, self.indexing.clone())
    }
}

/// Builds the backends named by `config.platform.provider`.
pub fn connect(config: &Config) -> Result<Backends> {
    match config.platform.provider.as_str() {
        "vertex" => {
            let vertex = Arc::new(VertexPlatform::new(config)?);
            Ok(Backends {
                retrieval: vertex.clone(),
                indexing: vertex.clone(),
                generation: vertex,
            })
        }
        "memory" => {
            let generator = Arc::new(StaticGenerator::new(&config.generation.model, MEMORY_REPLY));
            Ok(Backends::memory(memory_platform(config), generator))
        }
        other => bail!("Unknown platform provider: '{}'", other),
    }
}

/// An in-memory platform holding an empty corpus per provisioned collection.
pub fn memory_platform(config: &Config) -> Arc<InMemoryPlatform> {
    let platform = InMemoryPlatform::new();
    for collection in config.collections.iter().filter(|c| c.is_provisioned()) {
        platform.add_corpus(&collection.corpus, &collection.name);
    }
    Arc::new(platform)
}
