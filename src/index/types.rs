//! Shared types and errors for the index cache and vector store.

use crate::embedding::EmbeddingClientError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Contiguous span of extracted text from a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Chunk text content.
    pub text: String,
}

impl DocumentChunk {
    /// Wrap chunk text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for DocumentChunk {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for DocumentChunk {
    fn from(text: String) -> Self {
        Self { text }
    }
}

/// Ordered chunks produced by one load operation.
pub type ChunkSet = Vec<DocumentChunk>;

/// Errors raised by [`crate::index::VectorStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Embedding provider failed while vectors were being produced.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index file could not be read or written.
    #[error("Index storage at {path} failed: {source}")]
    Storage {
        /// File or directory involved in the failing operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Persisted index exists but cannot be decoded.
    #[error("Index at {path} is corrupt: {reason}")]
    Corrupt {
        /// Index file that failed to decode.
        path: PathBuf,
        /// Decoder diagnostic.
        reason: String,
    },
    /// Provider returned vectors inconsistent with each other or with the chunk count.
    #[error("Embedding shape mismatch: {0}")]
    Shape(String),
}

/// Errors surfaced by [`crate::index::IndexCache::resolve`].
#[derive(Debug, Error)]
pub enum IndexError {
    /// Storage location or one of its records cannot be created or written.
    #[error("Index storage unavailable at {path}: {source}")]
    StorageUnavailable {
        /// Path that could not be created or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Building the index from the supplied chunks failed.
    #[error("Failed to build index: {0}")]
    BuildFailed(#[source] StoreError),
}

impl From<StoreError> for IndexError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Storage { path, source } => Self::StorageUnavailable { path, source },
            other => Self::BuildFailed(other),
        }
    }
}
