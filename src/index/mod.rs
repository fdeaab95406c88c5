//! Content-addressed vector index cache.
//!
//! A session's storage location holds two artifacts: the persisted vector index and a
//! `doc_hash.txt` record with the fingerprint of the chunks it was built from. [`IndexCache`]
//! owns the read-modify-write sequence over both, reopening the index when the fingerprint of
//! freshly loaded chunks matches the record and rebuilding it otherwise.

pub mod cache;
pub mod fingerprint;
pub mod store;
pub mod types;

pub use cache::{IndexCache, Resolution};
pub use fingerprint::{ContentFingerprint, FINGERPRINT_FILE};
pub use store::{
    FileVectorStore, INDEX_FILE, RetrievedChunk, VectorIndex, VectorIndexHandle, VectorStore,
};
pub use types::{ChunkSet, DocumentChunk, IndexError, StoreError};

use std::path::Path;

/// Replace `path` with `contents` so readers never observe a partially written file.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = std::path::PathBuf::from(staging);
    tokio::fs::write(&staging, contents).await?;
    tokio::fs::rename(&staging, path).await
}
