//! # RAG Relay CLI (`relay`)
//!
//! Runs either service and exposes each pipeline step for operators.
//!
//! ## Usage
//!
//! ```bash
//! relay --config ./config/relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay serve ingestor` | Start the storage event service |
//! | `relay serve agent` | Start the query service |
//! | `relay corpora list` | List collections and their corpora |
//! | `relay corpora ensure` | Create missing corpora |
//! | `relay route <path>` | Show where an object would be routed |
//! | `relay ingest <bucket> <object>` | Import one object now |
//! | `relay retrieve "<query>"` | Print ranked passages |
//! | `relay query "<query>"` | Answer a question |
//! | `relay completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Retrieve from the legal collection only
//! relay retrieve "termination notice" --corpus legal --top-k 3
//!
//! # Full answer as JSON, without the citation instruction
//! relay query "What is the onboarding process?" --no-citations --json
//!
//! # Import an object that was uploaded before the ingestor was running
//! relay ingest acme-docs legal/contracts/msa.pdf
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use rag_relay::config::{self, DEFAULT_CONFIG_PATH};
use rag_relay::{corpora, ingest, logging, platform, query, server};

/// RAG Relay CLI: storage ingestion and grounded question answering over a
/// managed RAG platform.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/relay.example.toml` for a full example. Environment
/// variables such as `GCP_PROJECT_ID` override file values.
#[derive(Parser)]
#[command(
    name = "relay",
    about = "RAG Relay: document ingestion and grounded answers over a managed RAG platform",
    version,
    long_about = "RAG Relay routes uploaded documents into per-collection corpora on a managed \
    RAG platform and answers questions from those corpora with a hosted generative model. \
    Both services and their individual steps are available from this CLI."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/relay.toml`; when that file is absent the
    /// built-in defaults plus environment overrides are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start one of the HTTP services.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Inspect or provision the corpora behind each collection.
    Corpora {
        #[command(subcommand)]
        action: CorporaAction,
    },

    /// Show which collection an object path routes to.
    ///
    /// Pure lookup against the configured prefixes; nothing is imported.
    Route {
        /// Object path within the bucket (e.g. `legal/contracts/msa.pdf`).
        path: String,
    },

    /// Import one storage object, exactly as the ingestor would.
    ///
    /// Prints the outcome as JSON. Exits non-zero when the import fails.
    Ingest {
        /// Bucket holding the object.
        bucket: String,

        /// Object path within the bucket.
        object: String,

        /// MIME type to record with the event.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Retrieve ranked passages without generating an answer.
    ///
    /// Unlike the agent, infrastructure errors are reported instead of
    /// being treated as "no results".
    Retrieve {
        /// The query text.
        query: String,

        /// Restrict to a collection name or corpus id (repeatable).
        #[arg(long = "corpus")]
        corpus: Vec<String>,

        /// Number of passages (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the corpora.
    Query {
        /// The question.
        query: String,

        /// Restrict to a collection name or corpus id (repeatable).
        #[arg(long = "corpus")]
        corpus: Vec<String>,

        /// Leave the citation instruction out of the prompt.
        #[arg(long)]
        no_citations: bool,

        /// Print the full answer object as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script to stdout.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the storage event service.
    ///
    /// Binds to `[server].ingestor_bind` (or `0.0.0.0:$PORT`).
    Ingestor,
    /// Start the query service.
    ///
    /// Binds to `[server].agent_bind` (or `0.0.0.0:$PORT`).
    Agent,
}

/// Corpus subcommands.
#[derive(Subcommand)]
enum CorporaAction {
    /// List configured collections and their corpus identifiers.
    List,
    /// Check every configured corpus and create the missing ones.
    Ensure,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "relay", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Serve { service } => match service {
            ServeService::Ingestor => server::run_ingestor(&cfg).await?,
            ServeService::Agent => server::run_agent(&cfg).await?,
        },
        Commands::Corpora { action } => match action {
            CorporaAction::List => corpora::print_corpora(&cfg),
            CorporaAction::Ensure => {
                let client = platform::connect(&cfg)?.ingestion_client(&cfg);
                corpora::ensure_corpora(&cfg, &client).await?;
            }
        },
        Commands::Route { path } => {
            ingest::run_route(&cfg, &path)?;
        }
        Commands::Ingest {
            bucket,
            object,
            content_type,
        } => {
            ingest::run_ingest(&cfg, &bucket, &object, content_type).await?;
        }
        Commands::Retrieve {
            query: text,
            corpus,
            top_k,
            json,
        } => {
            query::run_retrieve(&cfg, &text, &corpus, top_k, json).await?;
        }
        Commands::Query {
            query: text,
            corpus,
            no_citations,
            json,
        } => {
            query::run_query(&cfg, &text, &corpus, !no_citations, json).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
