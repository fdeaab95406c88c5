//! Vector store seam and the file-backed flat index used by the service.

use super::types::{DocumentChunk, StoreError};
use crate::embedding::EmbeddingClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

/// File name of the persisted index inside a storage location.
pub const INDEX_FILE: &str = "index.json";

const DEFAULT_EMBEDDING_BATCH: usize = 64;

/// Shared handle to a built or reopened index.
pub type VectorIndexHandle = Arc<VectorIndex>;

/// Builds and reopens persisted vector indexes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed `chunks` and persist a fresh index at `location`, replacing any previous one.
    async fn build_index(
        &self,
        chunks: &[DocumentChunk],
        location: &Path,
    ) -> Result<VectorIndexHandle, StoreError>;

    /// Reopen the index persisted at `location` without embedding anything.
    async fn open_index(&self, location: &Path) -> Result<VectorIndexHandle, StoreError>;
}

/// Chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Stored chunk text.
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    text: String,
    vector: Vec<f32>,
}

/// In-memory flat index over chunk embeddings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Embedder that produced the vectors; empty for indexes built without one.
    #[serde(default)]
    embedding_model: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Assemble an index from `(text, vector)` pairs, rejecting ragged vectors.
    pub fn from_entries(entries: Vec<(String, Vec<f32>)>) -> Result<Self, StoreError> {
        let dimension = entries.first().map(|(_, vector)| vector.len()).unwrap_or(0);
        if let Some((_, vector)) = entries.iter().find(|(_, v)| v.len() != dimension) {
            return Err(StoreError::Shape(format!(
                "expected dimension {dimension}, got {}",
                vector.len()
            )));
        }
        Ok(Self {
            embedding_model: String::new(),
            dimension,
            entries: entries
                .into_iter()
                .map(|(text, vector)| IndexEntry { text, vector })
                .collect(),
        })
    }

    /// Embedder the vectors were produced by.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension, or zero for an empty index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Indexed chunk texts in insertion order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.text.as_str())
    }

    /// Return up to `limit` chunks ranked by cosine similarity, ties kept in insertion order.
    ///
    /// A query vector whose size differs from the indexed vectors is a [`StoreError::Shape`].
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        if limit == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(StoreError::Shape(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dimension
            )));
        }
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query, &entry.vector)))
            .collect();
        scored.sort_by(|left, right| {
            right
                .1
                .partial_cmp(&left.1)
                .unwrap_or(Ordering::Equal)
                .then(left.0.cmp(&right.0))
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(position, score)| RetrievedChunk {
                text: self.entries[position].text.clone(),
                score,
            })
            .collect())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|v| v * v).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|v| v * v).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

/// Vector store persisting each index as JSON under its storage location.
///
/// Persisted indexes record the embedding model and vector dimension; reopening one built by a
/// different embedder fails as [`StoreError::Corrupt`], which the index cache treats as a miss.
pub struct FileVectorStore {
    embedding_client: Arc<dyn EmbeddingClient>,
    embedding_model: String,
    batch_size: usize,
}

impl FileVectorStore {
    /// Build a store that embeds chunks through `embedding_client`.
    pub fn new(embedding_client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            embedding_client,
            embedding_model: String::new(),
            batch_size: DEFAULT_EMBEDDING_BATCH,
        }
    }

    /// Name the embedder recorded in, and required of, persisted indexes.
    pub fn with_embedding_model(mut self, embedding_model: impl Into<String>) -> Self {
        self.embedding_model = embedding_model.into();
        self
    }

    /// Override the number of chunks sent to the provider per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn embed_all(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let mut embedded = self.embedding_client.generate_embeddings(texts).await?;
            if embedded.len() != batch.len() {
                return Err(StoreError::Shape(format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.append(&mut embedded);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn build_index(
        &self,
        chunks: &[DocumentChunk],
        location: &Path,
    ) -> Result<VectorIndexHandle, StoreError> {
        let vectors = self.embed_all(chunks).await?;
        let mut index = VectorIndex::from_entries(
            chunks
                .iter()
                .map(|chunk| chunk.text.clone())
                .zip(vectors)
                .collect(),
        )?;
        index.embedding_model = self.embedding_model.clone();

        let path = location.join(INDEX_FILE);
        let encoded = serde_json::to_vec(&index).map_err(|error| StoreError::Corrupt {
            path: path.clone(),
            reason: error.to_string(),
        })?;
        super::write_atomic(&path, &encoded)
            .await
            .map_err(|source| StoreError::Storage {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            path = %path.display(),
            chunks = index.len(),
            dimension = index.dimension(),
            "Persisted vector index"
        );
        Ok(Arc::new(index))
    }

    async fn open_index(&self, location: &Path) -> Result<VectorIndexHandle, StoreError> {
        let path = location.join(INDEX_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| StoreError::Storage {
                path: path.clone(),
                source,
            })?;
        let index: VectorIndex =
            serde_json::from_slice(&bytes).map_err(|error| StoreError::Corrupt {
                path: path.clone(),
                reason: error.to_string(),
            })?;
        if index.embedding_model != self.embedding_model {
            return Err(StoreError::Corrupt {
                path,
                reason: format!(
                    "built with embedding model '{}', expected '{}'",
                    index.embedding_model, self.embedding_model
                ),
            });
        }
        if let Some(expected) = self.embedding_client.dimension() {
            if !index.is_empty() && index.dimension != expected {
                return Err(StoreError::Corrupt {
                    path,
                    reason: format!(
                        "vectors have dimension {}, embedder produces {expected}",
                        index.dimension
                    ),
                });
            }
        }
        tracing::debug!(path = %path.display(), chunks = index.len(), "Opened vector index");
        Ok(Arc::new(index))
    }
}
