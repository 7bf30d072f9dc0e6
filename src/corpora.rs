//! Configured collections: listing and corpus provisioning.
//!
//! `relay corpora list` prints the collection table; `relay corpora ensure`
//! checks every provisioned collection's corpus on the platform and creates
//! the ones that are missing. The agent's `GET /corpora` serves the same
//! listing as JSON.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::ingest::IngestionClient;

/// One row of the collection listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusEntry {
    pub name: String,
    pub prefix: String,
    /// Backing corpus identifier; empty when not provisioned.
    pub corpus_name: String,
    pub description: String,
}

pub fn list_corpora(config: &Config) -> Vec<CorpusEntry> {
    config
        .collections
        .iter()
        .map(|c| CorpusEntry {
            name: c.name.clone(),
            prefix: c.prefix.clone(),
            corpus_name: c.corpus.clone(),
            description: c.description.clone(),
        })
        .collect()
}

pub fn print_corpora(config: &Config) {
    println!("{:<16} {:<16} CORPUS", "COLLECTION", "PREFIX");
    for entry in list_corpora(config) {
        let corpus = if entry.corpus_name.is_empty() {
            "NOT CONFIGURED"
        } else {
            entry.corpus_name.as_str()
        };
        println!("{:<16} {:<16} {}", entry.name, entry.prefix, corpus);
    }
}

/// Runs `ensure_collection_exists` for every provisioned collection.
///
/// Unprovisioned collections are reported and skipped. Fails if any
/// corpus could not be confirmed or created.
pub async fn ensure_corpora(config: &Config, client: &IngestionClient) -> Result<()> {
    let mut failed = Vec::new();

    for collection in &config.collections {
        if !collection.is_provisioned() {
            println!("{:<16} skipped (no corpus configured)", collection.name);
            continue;
        }
        if client
            .ensure_collection_exists(&collection.corpus, &collection.name)
            .await
        {
            println!("{:<16} ok", collection.name);
        } else {
            println!("{:<16} FAILED", collection.name);
            failed.push(collection.name.as_str());
        }
    }

    if !failed.is_empty() {
        bail!("Could not ensure corpora for: {}", failed.join(", "));
    }
    Ok(())
}
