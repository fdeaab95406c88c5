//! Hash-gated reuse of persisted vector indexes.

use super::fingerprint::{self as record, ContentFingerprint, FingerprintRecord};
use super::store::{VectorIndexHandle, VectorStore};
use super::types::{DocumentChunk, IndexError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};

/// Outcome of [`IndexCache::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Handle to the built or reopened index.
    pub handle: VectorIndexHandle,
    /// Whether the index was (re)built from the supplied chunks.
    pub rebuilt: bool,
    /// Fingerprint of the supplied chunks, now persisted beside the index.
    pub fingerprint: ContentFingerprint,
}

/// Decides whether a persisted index can be reused for a chunk set.
///
/// Every storage location gets its own reader/writer lock: `resolve` holds it exclusively for
/// the whole compare-and-rebuild sequence, and queries hold it shared through
/// [`IndexCache::read_lock`], so a rebuild never interleaves with reads of the same location
/// while unrelated locations proceed independently.
pub struct IndexCache {
    store: Arc<dyn VectorStore>,
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl IndexCache {
    /// Create a cache that builds and reopens indexes through `store`.
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Reopen the index at `location` when it was built from `chunks`, otherwise rebuild it.
    ///
    /// The fingerprint record is written only after the index has been persisted, and any
    /// stale record is removed before a rebuild starts, so an existing record always describes
    /// the index stored beside it.
    pub async fn resolve(
        &self,
        chunks: &[DocumentChunk],
        location: &Path,
    ) -> Result<Resolution, IndexError> {
        let fingerprint = ContentFingerprint::of(chunks);
        let lock = self.lock_for(location);
        let _guard = lock.write().await;

        match record::read_record(location).await {
            FingerprintRecord::Present(stored) if stored == fingerprint => {
                match self.store.open_index(location).await {
                    Ok(handle) => {
                        tracing::info!(
                            location = %location.display(),
                            fingerprint = %fingerprint,
                            chunks = chunks.len(),
                            "Reusing persisted index"
                        );
                        return Ok(Resolution {
                            handle,
                            rebuilt: false,
                            fingerprint,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(
                            location = %location.display(),
                            error = %error,
                            "Persisted index unreadable despite matching fingerprint; rebuilding"
                        );
                    }
                }
            }
            FingerprintRecord::Present(stored) => {
                tracing::debug!(
                    location = %location.display(),
                    stored = %stored,
                    current = %fingerprint,
                    "Document content changed"
                );
            }
            FingerprintRecord::Corrupt(reason) => {
                tracing::warn!(
                    location = %location.display(),
                    reason = %reason,
                    "Fingerprint record corrupt; treating as cache miss"
                );
            }
            FingerprintRecord::Missing => {
                tracing::debug!(location = %location.display(), "No fingerprint record");
            }
        }

        let handle = self.rebuild(chunks, location, &fingerprint).await?;
        Ok(Resolution {
            handle,
            rebuilt: true,
            fingerprint,
        })
    }

    /// Acquire a shared lock on `location` for the duration of a query.
    pub async fn read_lock(&self, location: &Path) -> OwnedRwLockReadGuard<()> {
        self.lock_for(location).read_owned().await
    }

    async fn rebuild(
        &self,
        chunks: &[DocumentChunk],
        location: &Path,
        fingerprint: &ContentFingerprint,
    ) -> Result<VectorIndexHandle, IndexError> {
        let storage_error = |source: std::io::Error| IndexError::StorageUnavailable {
            path: location.to_path_buf(),
            source,
        };
        tokio::fs::create_dir_all(location)
            .await
            .map_err(storage_error)?;
        record::remove_record(location)
            .await
            .map_err(storage_error)?;

        tracing::info!(
            location = %location.display(),
            chunks = chunks.len(),
            "Creating a new index"
        );
        let handle = self.store.build_index(chunks, location).await?;

        record::write_record(location, fingerprint)
            .await
            .map_err(storage_error)?;
        Ok(handle)
    }

    /// Locks nobody holds are dropped here, so the registry only tracks active locations.
    fn lock_for(&self, location: &Path) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(location.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingClientError;
    use crate::index::fingerprint::FINGERPRINT_FILE;
    use crate::index::store::VectorIndex;
    use crate::index::types::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory store that counts builds and opens.
    #[derive(Default)]
    struct CountingStore {
        builds: AtomicUsize,
        opens: AtomicUsize,
        fail_builds: AtomicBool,
        persisted: Mutex<HashMap<PathBuf, VectorIndexHandle>>,
    }

    impl CountingStore {
        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn forget(&self, location: &Path) {
            self.persisted.lock().unwrap().remove(location);
        }
    }

    #[async_trait]
    impl VectorStore for CountingStore {
        async fn build_index(
            &self,
            chunks: &[DocumentChunk],
            location: &Path,
        ) -> Result<VectorIndexHandle, StoreError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.fail_builds.load(Ordering::SeqCst) {
                return Err(StoreError::Embedding(EmbeddingClientError::GenerationFailed(
                    "provider down".into(),
                )));
            }
            let index = VectorIndex::from_entries(
                chunks
                    .iter()
                    .map(|chunk| (chunk.text.clone(), vec![1.0]))
                    .collect(),
            )?;
            let handle = Arc::new(index);
            self.persisted
                .lock()
                .unwrap()
                .insert(location.to_path_buf(), handle.clone());
            Ok(handle)
        }

        async fn open_index(&self, location: &Path) -> Result<VectorIndexHandle, StoreError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.persisted
                .lock()
                .unwrap()
                .get(location)
                .cloned()
                .ok_or_else(|| StoreError::Storage {
                    path: location.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
        }
    }

    fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
        texts.iter().map(|text| DocumentChunk::from(*text)).collect()
    }

    fn persisted_record(location: &Path) -> String {
        std::fs::read_to_string(location.join(FINGERPRINT_FILE)).expect("record present")
    }

    fn setup() -> (TempDir, Arc<CountingStore>, IndexCache) {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(CountingStore::default());
        let cache = IndexCache::new(store.clone());
        (dir, store, cache)
    }

    #[tokio::test]
    async fn first_run_builds_and_persists_fingerprint() {
        let (dir, store, cache) = setup();
        let location = dir.path().join("session");
        let input = chunks(&["alpha", "beta"]);

        let resolution = cache.resolve(&input, &location).await.expect("resolve");

        assert!(resolution.rebuilt);
        assert_eq!(store.builds(), 1);
        assert_eq!(persisted_record(&location), ContentFingerprint::of(&input).as_str());
    }

    #[tokio::test]
    async fn unchanged_content_reuses_index() {
        let (dir, store, cache) = setup();
        let input = chunks(&["alpha", "beta"]);

        let first = cache.resolve(&input, dir.path()).await.expect("first");
        let second = cache.resolve(&input, dir.path()).await.expect("second");

        assert!(first.rebuilt);
        assert!(!second.rebuilt);
        assert_eq!(store.builds(), 1);
        assert_eq!(store.opens(), 1);
        assert!(Arc::ptr_eq(&first.handle, &second.handle));
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[tokio::test]
    async fn changed_content_rebuilds_and_overwrites_fingerprint() {
        let (dir, store, cache) = setup();
        let original = chunks(&["alpha", "beta"]);
        let changed = chunks(&["alpha", "beta", "gamma"]);

        let first = cache.resolve(&original, dir.path()).await.expect("first");
        let reused = cache.resolve(&original, dir.path()).await.expect("reuse");
        let third = cache.resolve(&changed, dir.path()).await.expect("third");

        assert!(!reused.rebuilt);
        assert_eq!(reused.fingerprint, first.fingerprint);
        assert!(third.rebuilt);
        assert_ne!(third.fingerprint, first.fingerprint);
        assert_eq!(store.builds(), 2);
        assert_eq!(persisted_record(dir.path()), third.fingerprint.as_str());
        assert_eq!(third.handle.len(), 3);
    }

    #[tokio::test]
    async fn empty_chunk_set_resolves_with_defined_fingerprint() {
        let (dir, _store, cache) = setup();
        let resolution = cache.resolve(&[], dir.path()).await.expect("resolve");

        assert!(resolution.rebuilt);
        assert!(resolution.handle.is_empty());
        assert_eq!(
            resolution.fingerprint.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn corrupt_record_is_treated_as_miss() {
        let (dir, store, cache) = setup();
        let input = chunks(&["alpha"]);
        cache.resolve(&input, dir.path()).await.expect("first");
        std::fs::write(dir.path().join(FINGERPRINT_FILE), "definitely not a digest").unwrap();

        let resolution = cache.resolve(&input, dir.path()).await.expect("recovered");

        assert!(resolution.rebuilt);
        assert_eq!(store.builds(), 2);
        assert_eq!(persisted_record(dir.path()), resolution.fingerprint.as_str());
    }

    #[tokio::test]
    async fn unreadable_index_with_matching_record_is_rebuilt() {
        let (dir, store, cache) = setup();
        let input = chunks(&["alpha"]);
        cache.resolve(&input, dir.path()).await.expect("first");
        store.forget(dir.path());

        let resolution = cache.resolve(&input, dir.path()).await.expect("rebuilt");

        assert!(resolution.rebuilt);
        assert_eq!(store.builds(), 2);
    }

    #[tokio::test]
    async fn failed_build_leaves_no_fingerprint() {
        let (dir, store, cache) = setup();
        cache
            .resolve(&chunks(&["alpha"]), dir.path())
            .await
            .expect("first");
        store.fail_builds.store(true, Ordering::SeqCst);

        let error = cache
            .resolve(&chunks(&["beta"]), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(error, IndexError::BuildFailed(_)));
        assert!(!dir.path().join(FINGERPRINT_FILE).exists());
    }

    #[tokio::test]
    async fn uncreatable_location_is_storage_unavailable() {
        let (dir, store, cache) = setup();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file in the way").unwrap();

        let error = cache
            .resolve(&chunks(&["alpha"]), &blocker.join("session"))
            .await
            .unwrap_err();

        assert!(matches!(error, IndexError::StorageUnavailable { .. }));
        assert_eq!(store.builds(), 0);
    }

    #[tokio::test]
    async fn concurrent_resolves_build_once() {
        let (dir, store, cache) = setup();
        let input = chunks(&["alpha", "beta"]);

        let (left, right) = tokio::join!(
            cache.resolve(&input, dir.path()),
            cache.resolve(&input, dir.path())
        );
        let (left, right) = (left.expect("left"), right.expect("right"));

        assert_eq!(store.builds(), 1);
        assert!(left.rebuilt ^ right.rebuilt);
    }

    #[tokio::test]
    async fn idle_location_locks_are_pruned() {
        let (dir, _store, cache) = setup();
        let busy = dir.path().join("busy");
        let reader = cache.read_lock(&busy).await;
        for session in ["a", "b", "c"] {
            cache
                .resolve(&chunks(&["alpha"]), &dir.path().join(session))
                .await
                .expect("resolve");
        }

        {
            let locks = cache.locks.lock().unwrap();
            assert_eq!(locks.len(), 2);
            assert!(locks.contains_key(&busy));
            assert!(locks.contains_key(&dir.path().join("c")));
        }
        drop(reader);
        cache
            .resolve(&chunks(&["alpha"]), &dir.path().join("d"))
            .await
            .expect("resolve");
        assert_eq!(cache.locks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readers_of_one_location_do_not_block_other_locations() {
        let (dir, _store, cache) = setup();
        let busy = dir.path().join("busy");
        let free = dir.path().join("free");
        let _reader = cache.read_lock(&busy).await;

        let resolved = tokio::time::timeout(
            Duration::from_secs(5),
            cache.resolve(&chunks(&["alpha"]), &free),
        )
        .await
        .expect("independent location not blocked")
        .expect("resolve");
        assert!(resolved.rebuilt);

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            cache.resolve(&chunks(&["alpha"]), &busy),
        )
        .await;
        assert!(blocked.is_err(), "rebuild must wait for readers");
    }
}
