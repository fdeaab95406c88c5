//! Document service coordinating loading, index resolution, retrieval, and summarization.

use crate::{
    config::{Config, EmbeddingProvider, FeatureFlags},
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    index::{
        ChunkSet, DocumentChunk, FileVectorStore, IndexCache, VectorIndexHandle, write_atomic,
    },
    llm::{ChatClient, ChatRequest, get_chat_client},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        answer::{ANSWER_SYSTEM_PROMPT, build_answer_prompt},
        chunking::{build_token_counter, determine_chunk_size},
        loader::{ChunkingPlan, load_file},
        sanitize::{sanitize_file_name, sanitize_session_id},
        summarize::Summarizer,
        types::{
            Answer, DocumentEntry, LoadOptions, LoadOutcome, LoaderKind, ProcessingError,
            SessionInfo, SummaryChain,
        },
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::RwLock;
use walkdir::WalkDir;

/// Settings the service needs from [`Config`], separated so tests can build them directly.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Provider whose tokenizer drives chunk sizing.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model name, used for tokenizer and window lookup.
    pub embedding_model: String,
    /// Chat model used for answers and summaries.
    pub llm_model: String,
    /// Sampling temperature for chat requests.
    pub llm_temperature: f32,
    /// Default chunk size override in tokens.
    pub chunk_size: Option<usize>,
    /// Token overlap between adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Token budget for a single summarization prompt.
    pub summary_max_prompt_tokens: usize,
    /// Root directory holding one storage location per session.
    pub index_dir: PathBuf,
    /// Directory listed for documents; uploads land in one subdirectory per session.
    pub documents_dir: PathBuf,
    /// Enabled capabilities.
    pub features: FeatureFlags,
}

impl ServiceSettings {
    /// Extract service settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            embedding_provider: config.embedding_provider,
            embedding_model: config.embedding_model.clone(),
            llm_model: config.llm_model.clone(),
            llm_temperature: config.llm_temperature,
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap.unwrap_or(0),
            retrieval_top_k: config.retrieval_top_k.max(1),
            summary_max_prompt_tokens: config.summary_max_prompt_tokens,
            index_dir: config.index_dir.clone(),
            documents_dir: config.documents_dir.clone(),
            features: config.features,
        }
    }
}

/// Document currently attached to a session.
struct SessionState {
    source: String,
    kind: LoaderKind,
    chunks: ChunkSet,
    page_count: usize,
    index: VectorIndexHandle,
    fingerprint: String,
    rebuilt: bool,
    loaded_at: String,
}

/// Coordinates the document pipeline: loading and chunking, hash-gated index resolution,
/// retrieval-augmented answers, and summarization.
///
/// Each session owns a storage location `<index_dir>/<session_id>` managed by the shared
/// [`IndexCache`]. Construct the service once near process start and share it through an `Arc`.
pub struct DocumentService {
    settings: ServiceSettings,
    embedding_client: Arc<dyn EmbeddingClient>,
    chat_client: Arc<dyn ChatClient>,
    index_cache: IndexCache,
    sessions: RwLock<HashMap<String, Arc<SessionState>>>,
    load_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the document pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Store uploaded bytes in the session's upload directory, returning the saved path.
    async fn store_upload(
        &self,
        session_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ProcessingError>;

    /// Load `path` into `session_id`, reusing the persisted index when its content is unchanged.
    async fn load_document(
        &self,
        session_id: &str,
        path: &Path,
        options: LoadOptions,
    ) -> Result<LoadOutcome, ProcessingError>;

    /// Answer a question against the session's loaded document.
    async fn ask_question(&self, session_id: &str, query: &str) -> Result<Answer, ProcessingError>;

    /// Summarize the session's loaded document.
    async fn summarize(
        &self,
        session_id: &str,
        chain: SummaryChain,
    ) -> Result<String, ProcessingError>;

    /// Enumerate uploaded documents.
    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ProcessingError>;

    /// Describe the document loaded into a session, if any.
    async fn session_info(&self, session_id: &str) -> Option<SessionInfo>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentService {
    /// Build a service with the providers selected by `config`.
    pub fn new(config: &Config) -> Self {
        tracing::info!(
            embedding_provider = ?config.embedding_provider,
            llm_provider = ?config.llm_provider,
            "Initializing provider clients"
        );
        let embedding_client: Arc<dyn EmbeddingClient> = Arc::from(get_embedding_client(config));
        let chat_client: Arc<dyn ChatClient> = Arc::from(get_chat_client(config));
        Self::with_clients(
            ServiceSettings::from_config(config),
            embedding_client,
            chat_client,
        )
    }

    /// Build a service from explicit settings and provider clients.
    pub fn with_clients(
        settings: ServiceSettings,
        embedding_client: Arc<dyn EmbeddingClient>,
        chat_client: Arc<dyn ChatClient>,
    ) -> Self {
        let store = FileVectorStore::new(embedding_client.clone()).with_embedding_model(format!(
            "{:?}/{}",
            settings.embedding_provider, settings.embedding_model
        ));
        Self {
            settings,
            embedding_client,
            chat_client,
            index_cache: IndexCache::new(Arc::new(store)),
            sessions: RwLock::new(HashMap::new()),
            load_locks: Mutex::new(HashMap::new()),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Storage location backing a session.
    pub fn storage_location(&self, session_id: &str) -> PathBuf {
        self.settings
            .index_dir
            .join(sanitize_session_id(Some(session_id)))
    }

    /// Directory holding a session's uploads.
    pub fn upload_dir(&self, session_id: &str) -> PathBuf {
        self.settings
            .documents_dir
            .join(sanitize_session_id(Some(session_id)))
    }

    /// Store uploaded bytes in the session's upload directory using only the final name
    /// component, so sessions uploading the same file name never replace each other's copy.
    pub async fn store_upload(
        &self,
        session_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ProcessingError> {
        let name = sanitize_file_name(file_name)
            .ok_or_else(|| ProcessingError::InvalidUpload(format!("bad file name '{file_name}'")))?;
        let dir = self.upload_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ProcessingError::Storage {
                path: dir.clone(),
                source,
            })?;
        let path = dir.join(&name);
        write_atomic(&path, bytes)
            .await
            .map_err(|source| ProcessingError::Storage {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Stored upload");
        Ok(path)
    }

    /// Load a document into a session.
    ///
    /// The file is read with the requested (or inferred) loader, the page range applied, and
    /// the resulting chunks handed to the index cache, which reopens the session's persisted
    /// index when the content fingerprint is unchanged and rebuilds it otherwise.
    pub async fn load_document(
        &self,
        session_id: &str,
        path: &Path,
        options: LoadOptions,
    ) -> Result<LoadOutcome, ProcessingError> {
        let session_id = sanitize_session_id(Some(session_id));
        let kind = match options.kind {
            Some(kind) => kind,
            None => LoaderKind::from_path(path).ok_or_else(|| {
                ProcessingError::UnsupportedFormat(path.display().to_string())
            })?,
        };
        let chunk_size = determine_chunk_size(
            options.chunk_size.or(self.settings.chunk_size),
            self.settings.embedding_provider,
            &self.settings.embedding_model,
        );
        let plan = ChunkingPlan {
            chunk_size,
            overlap: self.settings.chunk_overlap,
            provider: self.settings.embedding_provider,
            model: self.settings.embedding_model.clone(),
        };
        tracing::info!(
            session = %session_id,
            path = %path.display(),
            kind = %kind,
            chunk_size,
            page_range = ?options.page_range,
            "Loading document"
        );

        let loaded = load_file(path, kind, options.page_range, &plan).await?;
        if loaded.chunks.is_empty() {
            return Err(ProcessingError::EmptyDocument);
        }

        let load_lock = self.load_lock_for(&session_id);
        let _load_guard = load_lock.lock().await;

        let location = self.storage_location(&session_id);
        let resolution = self.index_cache.resolve(&loaded.chunks, &location).await?;
        let chunk_count = loaded.chunks.len();
        self.metrics
            .record_load(chunk_count as u64, resolution.rebuilt);

        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let fingerprint = resolution.fingerprint.to_string();
        let state = SessionState {
            source: source.clone(),
            kind,
            chunks: loaded.chunks,
            page_count: loaded.page_count,
            index: resolution.handle,
            fingerprint: fingerprint.clone(),
            rebuilt: resolution.rebuilt,
            loaded_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(state));

        tracing::info!(
            session = %session_id,
            source = %source,
            chunks = chunk_count,
            rebuilt = resolution.rebuilt,
            fingerprint = %fingerprint,
            "Document loaded"
        );

        Ok(LoadOutcome {
            session_id,
            source,
            kind,
            rebuilt: resolution.rebuilt,
            chunk_count,
            page_count: loaded.page_count,
            chunk_size,
            fingerprint,
        })
    }

    /// Answer a question by retrieving the closest chunks and stuffing them into one prompt.
    pub async fn ask_question(
        &self,
        session_id: &str,
        query: &str,
    ) -> Result<Answer, ProcessingError> {
        if !self.settings.features.question_answer {
            return Err(ProcessingError::FeatureDisabled("question_answer"));
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(ProcessingError::EmptyQuery);
        }
        let session_id = sanitize_session_id(Some(session_id));

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no embedding returned for query".into())
        })?;

        let context = {
            let _read_guard = self
                .index_cache
                .read_lock(&self.storage_location(&session_id))
                .await;
            let session = self
                .session(&session_id)
                .await
                .ok_or(ProcessingError::NoDocumentLoaded)?;
            session
                .index
                .search(&vector, self.settings.retrieval_top_k)
                .map_err(ProcessingError::Retrieval)?
        };
        tracing::debug!(
            session = %session_id,
            retrieved = context.len(),
            top_score = context.first().map(|hit| hit.score),
            "Retrieved context"
        );

        let answer = self
            .chat_client
            .complete(ChatRequest {
                model: self.settings.llm_model.clone(),
                system: Some(ANSWER_SYSTEM_PROMPT.to_string()),
                prompt: build_answer_prompt(query, &context),
                temperature: self.settings.llm_temperature,
            })
            .await?;
        self.metrics.record_question();
        tracing::info!(session = %session_id, "Question answered");

        Ok(Answer {
            answer: answer.trim().to_string(),
            sources: context.into_iter().map(|hit| hit.text).collect(),
        })
    }

    /// Summarize the document loaded into a session.
    pub async fn summarize(
        &self,
        session_id: &str,
        chain: SummaryChain,
    ) -> Result<String, ProcessingError> {
        if !self.settings.features.summarize {
            return Err(ProcessingError::FeatureDisabled("summarize"));
        }
        let session_id = sanitize_session_id(Some(session_id));
        let session = self
            .session(&session_id)
            .await
            .ok_or(ProcessingError::NoDocumentLoaded)?;
        let summary = self.summarize_chunks(&session.chunks, chain).await?;
        tracing::info!(session = %session_id, chain = ?chain, "Summary generated");
        Ok(summary)
    }

    /// Summarize an explicit chunk set with the configured chat model.
    pub async fn summarize_chunks(
        &self,
        chunks: &[DocumentChunk],
        chain: SummaryChain,
    ) -> Result<String, ProcessingError> {
        if chunks.is_empty() {
            return Err(ProcessingError::NoDocumentLoaded);
        }
        let counter = build_token_counter(
            self.settings.embedding_provider,
            &self.settings.embedding_model,
        )
        .map_err(|error| ProcessingError::Load(error.into()))?;
        let summarizer = Summarizer::new(
            self.chat_client.as_ref(),
            &self.settings.llm_model,
            self.settings.llm_temperature,
            self.settings.summary_max_prompt_tokens,
            counter,
        );
        let summary = summarizer.summarize(chunks, chain).await?;
        self.metrics.record_summary();
        Ok(summary)
    }

    /// Enumerate files in the documents directory and in its per-session upload directories,
    /// sorted by name. Uploads are named `<session>/<file>`.
    pub async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ProcessingError> {
        let dir = &self.settings.documents_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(2) {
            let entry = entry.map_err(|error| ProcessingError::Storage {
                path: dir.clone(),
                source: error.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().ends_with(".tmp") {
                continue;
            }
            let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            let name = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(DocumentEntry {
                name,
                path: entry.path().to_path_buf(),
                size_bytes,
            });
        }
        entries.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(entries)
    }

    /// Describe the document loaded into a session.
    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let session_id = sanitize_session_id(Some(session_id));
        let state = self.session(&session_id).await?;
        Some(SessionInfo {
            session_id,
            source: state.source.clone(),
            kind: state.kind,
            chunk_count: state.chunks.len(),
            page_count: state.page_count,
            fingerprint: state.fingerprint.clone(),
            rebuilt: state.rebuilt,
            loaded_at: state.loaded_at.clone(),
        })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn session(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Loads into one session are serialized so the session entry always matches the index
    /// last resolved for its location. Locks no load holds are pruned on each call.
    fn load_lock_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.load_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn store_upload(
        &self,
        session_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ProcessingError> {
        DocumentService::store_upload(self, session_id, file_name, bytes).await
    }

    async fn load_document(
        &self,
        session_id: &str,
        path: &Path,
        options: LoadOptions,
    ) -> Result<LoadOutcome, ProcessingError> {
        DocumentService::load_document(self, session_id, path, options).await
    }

    async fn ask_question(&self, session_id: &str, query: &str) -> Result<Answer, ProcessingError> {
        DocumentService::ask_question(self, session_id, query).await
    }

    async fn summarize(
        &self,
        session_id: &str,
        chain: SummaryChain,
    ) -> Result<String, ProcessingError> {
        DocumentService::summarize(self, session_id, chain).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ProcessingError> {
        DocumentService::list_documents(self).await
    }

    async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        DocumentService::session_info(self, session_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbeddingClient;
    use crate::llm::ChatClientError;
    use crate::processing::loader::sample_pdf;
    use crate::processing::types::PageRange;
    use tempfile::TempDir;

    struct EchoChat;

    #[async_trait]
    impl ChatClient for EchoChat {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
            Ok(format!("echo: {}", request.prompt.len()))
        }
    }

    /// Local embeddings from a provider that does not advertise its vector size.
    struct UnsizedEmbedding(LocalEmbeddingClient);

    #[async_trait]
    impl EmbeddingClient for UnsizedEmbedding {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.0.generate_embeddings(texts).await
        }
    }

    fn settings(root: &Path) -> ServiceSettings {
        ServiceSettings {
            embedding_provider: EmbeddingProvider::Local,
            embedding_model: "local".into(),
            llm_model: "test".into(),
            llm_temperature: 0.0,
            chunk_size: Some(16),
            chunk_overlap: 0,
            retrieval_top_k: 2,
            summary_max_prompt_tokens: 256,
            index_dir: root.join("db_index"),
            documents_dir: root.join("documents"),
            features: FeatureFlags::default(),
        }
    }

    fn service(root: &Path) -> DocumentService {
        DocumentService::with_clients(
            settings(root),
            Arc::new(LocalEmbeddingClient::new(64)),
            Arc::new(EchoChat),
        )
    }

    #[tokio::test]
    async fn second_load_of_same_file_reuses_index() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        let path = service
            .store_upload("s1", "notes.txt", b"Crabs walk sideways. Ferris is a crab.")
            .await
            .expect("upload");

        let first = service
            .load_document("s1", &path, LoadOptions::default())
            .await
            .expect("first load");
        let second = service
            .load_document("s1", &path, LoadOptions::default())
            .await
            .expect("second load");

        assert!(first.rebuilt);
        assert!(!second.rebuilt);
        assert_eq!(first.fingerprint, second.fingerprint);
        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.index_rebuilds, 1);
        assert_eq!(snapshot.index_reuses, 1);
    }

    #[tokio::test]
    async fn pdf_page_range_changes_chunks_and_fingerprint() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        let pdf = sample_pdf(&["Ferris page", "Cargo page", "Tokio page"]);
        let path = service
            .store_upload("s1", "guide.pdf", &pdf)
            .await
            .expect("upload");

        let whole = service
            .load_document("s1", &path, LoadOptions::default())
            .await
            .expect("whole document");
        let first_page = service
            .load_document(
                "s1",
                &path,
                LoadOptions {
                    page_range: Some(PageRange {
                        start: None,
                        end: Some(1),
                    }),
                    ..LoadOptions::default()
                },
            )
            .await
            .expect("first page");

        assert_eq!(whole.kind, LoaderKind::Pdf);
        assert_eq!(whole.page_count, 3);
        assert_eq!(whole.chunk_count, 3);
        assert_eq!(first_page.chunk_count, 1);
        assert!(first_page.rebuilt);
        assert_ne!(whole.fingerprint, first_page.fingerprint);
    }

    #[tokio::test]
    async fn query_vector_of_wrong_size_is_a_retrieval_error() {
        let dir = TempDir::new().expect("tempdir");
        let build = |dimension| {
            DocumentService::with_clients(
                settings(dir.path()),
                Arc::new(UnsizedEmbedding(LocalEmbeddingClient::new(dimension))),
                Arc::new(EchoChat),
            )
        };
        let first = build(64);
        let path = first
            .store_upload("s1", "notes.txt", b"Ferris is a crab.")
            .await
            .expect("upload");
        first
            .load_document("s1", &path, LoadOptions::default())
            .await
            .expect("load");

        let resized = build(32);
        let reused = resized
            .load_document("s1", &path, LoadOptions::default())
            .await
            .expect("reload");
        assert!(!reused.rebuilt);

        let error = resized.ask_question("s1", "Who is Ferris?").await.unwrap_err();
        assert!(matches!(error, ProcessingError::Retrieval(_)));
        assert_eq!(resized.metrics_snapshot().questions_answered, 0);
    }

    #[tokio::test]
    async fn finished_loads_release_their_session_locks() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        for session in ["s1", "s2", "s3"] {
            let path = service
                .store_upload(session, "notes.txt", b"Ferris is a crab.")
                .await
                .expect("upload");
            service
                .load_document(session, &path, LoadOptions::default())
                .await
                .expect("load");
        }
        let locks = service.load_locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("s3"));
    }

    #[tokio::test]
    async fn sessions_use_separate_locations() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        assert_ne!(service.storage_location("a"), service.storage_location("b"));
        assert_eq!(
            service.storage_location("../escape"),
            dir.path().join("db_index").join("escape")
        );
    }

    #[tokio::test]
    async fn ask_without_document_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        let error = service.ask_question("nobody", "hello?").await.unwrap_err();
        assert!(matches!(error, ProcessingError::NoDocumentLoaded));

        let error = service.ask_question("nobody", "   ").await.unwrap_err();
        assert!(matches!(error, ProcessingError::EmptyQuery));
    }

    #[tokio::test]
    async fn disabled_features_are_reported() {
        let dir = TempDir::new().expect("tempdir");
        let mut settings = settings(dir.path());
        settings.features = FeatureFlags {
            summarize: false,
            question_answer: false,
        };
        let service = DocumentService::with_clients(
            settings,
            Arc::new(LocalEmbeddingClient::new(16)),
            Arc::new(EchoChat),
        );

        assert!(matches!(
            service.ask_question("default", "q").await,
            Err(ProcessingError::FeatureDisabled("question_answer"))
        ));
        assert!(matches!(
            service.summarize("default", SummaryChain::Stuff).await,
            Err(ProcessingError::FeatureDisabled("summarize"))
        ));
    }

    #[tokio::test]
    async fn blank_document_is_empty_and_writes_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        let path = service.store_upload("default", "blank.txt", b" \n\t").await.expect("upload");

        let error = service
            .load_document("default", &path, LoadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, ProcessingError::EmptyDocument));
        assert!(!service.storage_location("default").exists());
    }

    #[tokio::test]
    async fn unknown_extension_requires_explicit_loader() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        let path = service.store_upload("default", "data.bin", b"abc").await.expect("upload");

        let error = service
            .load_document("default", &path, LoadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, ProcessingError::UnsupportedFormat(_)));

        let outcome = service
            .load_document(
                "default",
                &path,
                LoadOptions {
                    kind: Some(LoaderKind::Text),
                    ..LoadOptions::default()
                },
            )
            .await
            .expect("explicit text loader");
        assert_eq!(outcome.kind, LoaderKind::Text);
    }

    #[tokio::test]
    async fn list_documents_reports_uploads_in_name_order() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(dir.path());
        assert!(service.list_documents().await.expect("empty").is_empty());

        service.store_upload("s1", "b.txt", b"bee").await.expect("upload");
        service.store_upload("s1", "../a.csv", b"x\n1").await.expect("upload");
        std::fs::write(dir.path().join("documents").join("c.txt"), "sea").expect("copy");
        let names: Vec<String> = service
            .list_documents()
            .await
            .expect("list")
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["c.txt", "s1/a.csv", "s1/b.txt"]);
    }
}
