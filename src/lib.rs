#![deny(missing_docs)]

//! Core library for docqa: load documents, reuse their vector indexes when the content is
//! unchanged, and answer questions or summarize them with a chat model.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Content-addressed vector index cache and store.
pub mod index;
/// Chat completion client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Service metrics helpers.
pub mod metrics;
/// Document loading, answering, and summarization pipeline.
pub mod processing;
