//! # rag-relay core
//!
//! Platform-independent logic shared by the ingestor and agent services:
//! data models, collection routing, remote service traits, retrieval
//! normalization, context formatting, and grounded prompt assembly.
//!
//! This crate does no network or filesystem I/O and pulls in no async
//! runtime. Concrete remote backends (Vertex AI over REST) and the retry
//! loop that sleeps between attempts live in the `rag-relay` app crate;
//! [`memory`] provides an in-process backend for tests and offline runs.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Events, outcomes, contexts, answers |
//! | [`routing`] | Folder-prefix → collection routing |
//! | [`remote`] | Remote service traits and [`RemoteError`](remote::RemoteError) |
//! | [`retry`] | Exponential backoff schedule |
//! | [`retrieval`] | Retrieval client and result normalization |
//! | [`format`] | Prompt-ready context rendering |
//! | [`answer`] | Answer composer and prompt template |
//! | [`memory`] | In-memory platform |

pub mod answer;
pub mod format;
pub mod memory;
pub mod models;
pub mod remote;
pub mod retrieval;
pub mod retry;
pub mod routing;
