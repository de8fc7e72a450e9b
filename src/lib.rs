//! leadforge — library crate, re-exported for integration tests under
//! `tests/`.
//!
//! `api` is deliberately not re-exported here: its router and middleware
//! are generic over `AppState`, which is defined in `main.rs` and only
//! exists in the binary crate. Integration tests exercise the pipeline
//! modules directly instead of going through HTTP.

pub mod auth;
pub mod config;
pub mod domain;
pub mod enrichment;
pub mod errors;
pub mod jobs;
pub mod llm;
pub mod messaging;
pub mod orchestrator;
pub mod quota;
pub mod scoring;
pub mod scraping;
pub mod store;
