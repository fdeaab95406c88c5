//! Document pipeline: loading, chunking, index resolution, answering, and summarization.

mod answer;
mod chunking;
mod loader;
pub mod sanitize;
mod service;
mod summarize;
pub mod types;

pub use service::{DocumentApi, DocumentService, ServiceSettings};
pub use types::{
    Answer, ChunkingError, DocumentEntry, LoadError, LoadOptions, LoadOutcome, LoaderKind,
    PageRange, ProcessingError, SessionInfo, SummaryChain,
};
