//! Core data types and error definitions for the document pipeline.

use crate::{
    embedding::EmbeddingClientError,
    index::{IndexError, StoreError},
    llm::ChatClientError,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while turning raw text into semantic chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Load configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors raised while reading a source file into chunks.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Source file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// PDF structure could not be parsed.
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),
    /// CSV content could not be parsed.
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
    /// Requested page range starts after it ends.
    #[error("Invalid page range: start {start} is after end {end}")]
    InvalidPageRange {
        /// First page requested (zero-based, inclusive).
        start: usize,
        /// Page after the last one requested (zero-based, exclusive).
        end: usize,
    },
    /// Page ranges only apply to paginated formats.
    #[error("Page ranges are not supported for {0} documents")]
    PageRangeUnsupported(LoaderKind),
    /// Extraction task panicked or was cancelled.
    #[error("Document extraction task failed: {0}")]
    Task(String),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Errors emitted by the document service.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Source file could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// File extension or requested loader is not recognized.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// Upload was missing or had an unusable file name.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    /// Loaded file produced no text at all.
    #[error("The document contains no extractable text.")]
    EmptyDocument,
    /// Session has no loaded document to query or summarize.
    #[error("No document loaded. Please load a document first.")]
    NoDocumentLoaded,
    /// Question was blank.
    #[error("Query must not be empty.")]
    EmptyQuery,
    /// Capability switched off by configuration.
    #[error("Feature '{0}' is disabled")]
    FeatureDisabled(&'static str),
    /// Uploaded file could not be stored.
    #[error("Failed to store {path}: {source}")]
    Storage {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Index cache failed to build or persist the index.
    #[error("Index resolution failed: {0}")]
    Index(#[from] IndexError),
    /// Query could not be matched against the session's index.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] StoreError),
    /// Embedding provider failed for a query.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Chat provider failed while answering or summarizing.
    #[error("Language model request failed: {0}")]
    Chat(#[from] ChatClientError),
}

/// Source formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    /// Paginated PDF; one unit per page.
    Pdf,
    /// Plain UTF-8 text.
    Text,
    /// Comma-separated values; one unit per row.
    Csv,
}

impl LoaderKind {
    /// Infer the loader from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" | "md" | "markdown" => Some(Self::Text),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Csv => "csv",
        })
    }
}

impl FromStr for LoaderKind {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" | "text" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            other => Err(ProcessingError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Half-open page selection `[start, end)`, zero-based. Missing bounds mean "from the first
/// page" and "through the last page".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRange {
    /// First page to include.
    pub start: Option<usize>,
    /// Page after the last one to include.
    pub end: Option<usize>,
}

impl PageRange {
    /// Whether neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Per-call options for loading a document.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Loader override; inferred from the file extension when absent.
    pub kind: Option<LoaderKind>,
    /// Optional page selection for PDFs.
    pub page_range: Option<PageRange>,
    /// Optional chunk size override in tokens.
    pub chunk_size: Option<usize>,
}

/// Result of loading a document into a session.
#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    /// Session the document is now attached to.
    pub session_id: String,
    /// File name of the loaded source.
    pub source: String,
    /// Loader used.
    pub kind: LoaderKind,
    /// Whether the index had to be rebuilt.
    pub rebuilt: bool,
    /// Number of chunks in the loaded set.
    pub chunk_count: usize,
    /// Pages (PDF), rows (CSV), or 1 (text) read from the source before slicing.
    pub page_count: usize,
    /// Chunk size used, in tokens.
    pub chunk_size: usize,
    /// Content fingerprint persisted beside the index.
    pub fingerprint: String,
}

/// Chain used to summarize a chunk set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryChain {
    /// Every chunk in a single prompt.
    Stuff,
    /// Summarize chunks independently, then combine the partial summaries.
    #[default]
    MapReduce,
    /// Walk the chunks in order, refining a running summary.
    Refine,
}

impl FromStr for SummaryChain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stuff" => Ok(Self::Stuff),
            "map_reduce" | "map-reduce" | "mapreduce" => Ok(Self::MapReduce),
            "refine" => Ok(Self::Refine),
            other => Err(format!("unknown chain type '{other}'")),
        }
    }
}

/// Answer produced for a question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Model answer.
    pub answer: String,
    /// Retrieved chunk texts passed to the model as context.
    pub sources: Vec<String>,
}

/// Public view of a session's loaded document.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub session_id: String,
    /// File name of the loaded source.
    pub source: String,
    /// Loader used.
    pub kind: LoaderKind,
    /// Number of chunks indexed.
    pub chunk_count: usize,
    /// Pages, rows, or 1 read from the source.
    pub page_count: usize,
    /// Content fingerprint of the chunk set.
    pub fingerprint: String,
    /// Whether the last load rebuilt the index.
    pub rebuilt: bool,
    /// RFC 3339 timestamp of the last load.
    pub loaded_at: String,
}

/// Uploaded document available for loading.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentEntry {
    /// File name.
    pub name: String,
    /// Path on disk.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_kind_inferred_from_extension() {
        assert_eq!(LoaderKind::from_path(Path::new("a/Report.PDF")), Some(LoaderKind::Pdf));
        assert_eq!(LoaderKind::from_path(Path::new("notes.txt")), Some(LoaderKind::Text));
        assert_eq!(LoaderKind::from_path(Path::new("table.csv")), Some(LoaderKind::Csv));
        assert_eq!(LoaderKind::from_path(Path::new("archive.zip")), None);
        assert_eq!(LoaderKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn summary_chain_parses_aliases() {
        assert_eq!("map_reduce".parse::<SummaryChain>(), Ok(SummaryChain::MapReduce));
        assert_eq!("Refine".parse::<SummaryChain>(), Ok(SummaryChain::Refine));
        assert_eq!(SummaryChain::default(), SummaryChain::MapReduce);
        assert!("bogus".parse::<SummaryChain>().is_err());
    }
}
