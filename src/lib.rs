//! # RAG Relay
//!
//! Two small services around a managed retrieval-augmented generation
//! platform.
//!
//! The **ingestor** receives storage "object finalized" events, routes each
//! object to a collection by folder prefix and asks the platform to import
//! it into that collection's corpus, retrying transient failures. The
//! **agent** answers questions by retrieving passages from the corpora,
//! grounding a prompt in them and calling a hosted model once.
//!
//! ## Architecture
//!
//! ```text
//!  storage event                         POST /query
//!       │                                     │
//!       ▼                                     ▼
//! ┌───────────┐   ┌──────────────┐     ┌────────────┐   ┌───────────┐
//! │  Router   │──▶│ Ingestion    │     │ Retriever  │──▶│ Formatter │
//! │ (prefix)  │   │ Client+retry │     │  (fan-in)  │   └─────┬─────┘
//! └───────────┘   └──────┬───────┘     └─────┬──────┘         ▼
//!                        │                   │         ┌────────────┐
//!                        ▼                   ▼         │  Composer  │
//!                 ┌──────────────────────────────┐     └─────┬──────┘
//!                 │ platform: vertex | memory    │◀──────────┘
//!                 └──────────────────────────────┘
//! ```
//!
//! The routing, retry, retrieval, formatting and composition logic lives in
//! `rag-relay-core` and is platform-independent. This crate adds
//! configuration, logging, the Vertex AI client, the HTTP services and the
//! `relay` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! relay corpora list                  # show collections and their corpora
//! relay route legal/contracts/msa.pdf # where would this object go?
//! relay serve ingestor                # storage event endpoint on :8080
//! relay serve agent                   # query endpoint on :8081
//! relay query "What is the termination clause?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, environment overrides, validation |
//! | [`logging`] | tracing subscriber setup |
//! | [`platform`] | Backend selection (`vertex` / `memory`) and wiring |
//! | [`vertex`] | Vertex AI REST client |
//! | [`ingest`] | Ingestion client, event handler, event envelopes |
//! | [`corpora`] | Collection listing and corpus provisioning |
//! | [`query`] | `retrieve` / `query` commands |
//! | [`server`] | Ingestor and agent HTTP services |

pub mod config;
pub mod corpora;
pub mod ingest;
pub mod logging;
pub mod platform;
pub mod query;
pub mod server;
pub mod vertex;
