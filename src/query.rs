//! `relay retrieve` and `relay query`.
//!
//! `retrieve` prints the ranked passages for a query and fails on
//! infrastructure errors; `query` runs the full answer composer exactly as
//! the agent's `POST /query` does and prints the answer with its sources.

use anyhow::{bail, Result};

use rag_relay_core::models::{GeneratedAnswer, RetrievalResult};

use crate::config::Config;
use crate::platform::connect;

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    corpora: &[String],
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    if top_k == Some(0) {
        bail!("--top-k must be >= 1");
    }

    let retriever = connect(config)?.retriever(config);
    let filter = (!corpora.is_empty()).then_some(corpora);
    let result = retriever.try_retrieve(query.trim(), filter, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_contexts(&result);
    }
    Ok(())
}

pub async fn run_query(
    config: &Config,
    query: &str,
    corpora: &[String],
    include_citations: bool,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let composer = connect(config)?.composer(config);
    let filter = (!corpora.is_empty()).then_some(corpora);
    let answer = composer
        .answer(query.trim(), filter, include_citations)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

fn print_contexts(result: &RetrievalResult) {
    if result.is_empty() {
        println!("No results.");
        return;
    }

    for context in result {
        match context.distance {
            Some(d) => println!("{}. [{:.3}] {}", context.rank, d, context.source),
            None => println!("{}. {}", context.rank, context.source),
        }
        println!("    excerpt: \"{}\"", excerpt(&context.text, 240));
        println!();
    }
}

fn print_answer(answer: &GeneratedAnswer) {
    println!("{}", answer.response);
    println!();
    println!(
        "model: {}  contexts: {}",
        answer.model, answer.num_contexts_used
    );
    for context in &answer.contexts {
        println!("  [{}] {}", context.rank, context.source);
    }
    if let Some(err) = &answer.error {
        eprintln!("Error: {}", err);
    }
}

/// First `max` characters of `text` on one line.
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max {
        flat.to_string()
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}…", cut.trim_end())
    }
}
