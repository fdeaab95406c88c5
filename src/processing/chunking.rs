//! Chunk-size heuristics and semantic chunking helpers.
//!
//! - Automatic sizing: derive a token budget from the embedding model's context window and clamp
//!   it to a conservative range; callers override it per load or via `TEXT_SPLITTER_CHUNK_SIZE`.
//! - Overlap: optionally carry a sliding token overlap (`TEXT_SPLITTER_CHUNK_OVERLAP`) between
//!   adjacent chunks so spans around boundaries stay retrievable.
//! - Token counting: `tiktoken-rs` for OpenAI/known encodings, whitespace counting for the local
//!   provider and for Ollama models without a known tokenizer.

use crate::config::EmbeddingProvider;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    p50k_edit, r50k_base,
};

use super::types::ChunkingError;

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;
const LOCAL_CONTEXT_WINDOW: usize = 4096;

/// Determine the chunk size for a load, respecting overrides.
///
/// Precedence:
/// 1) Explicit override (per request, then `TEXT_SPLITTER_CHUNK_SIZE`) wins, clamped at `>= 1`.
/// 2) Otherwise, derive from the provider/model context window divided by `8`, clamped into
///    `[256, 1024]`.
pub(crate) fn determine_chunk_size(
    override_size: Option<usize>,
    provider: EmbeddingProvider,
    model: &str,
) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    (embedding_context_window(provider, model) / 8)
        .clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

/// Look up the embedding context window for a given provider/model combination.
pub(crate) fn embedding_context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::OpenAI => openai_embedding_context_window(model),
        EmbeddingProvider::Ollama => ollama_embedding_context_window(model),
        EmbeddingProvider::Local => LOCAL_CONTEXT_WINDOW,
    }
}

fn openai_embedding_context_window(model: &str) -> usize {
    // Every `text-embedding-*` model accepts 8191 input tokens.
    if model.starts_with("text-embedding-") {
        8192
    } else {
        get_context_size(model)
    }
}

fn ollama_embedding_context_window(model: &str) -> usize {
    let normalized = model.to_lowercase();
    match normalized.as_str() {
        "nomic-embed-text" | "mxbai-embed-large" | "mxbai-embed-large-v1" => 8192,
        value if value.contains("all-minilm") => 512,
        value if value.contains("e5-large") => 4096,
        _ => {
            tracing::trace!(model, "Using default Ollama context window estimate");
            4096
        }
    }
}

/// Split each unit (a PDF page, a CSV row, a whole text file) into semantic chunks.
///
/// - `chunk_size` is a hard upper bound on the token count per chunk.
/// - Units that already fit are kept whole apart from surrounding whitespace; larger units go
///   through the semantic chunker with an optional sliding `overlap` (tokens).
/// - Blank units are dropped, so an all-whitespace document yields no chunks.
pub(crate) fn split_units(
    units: &[String],
    chunk_size: usize,
    overlap: usize,
    provider: EmbeddingProvider,
    model: &str,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if units.iter().all(|unit| unit.trim().is_empty()) {
        return Ok(Vec::new());
    }

    let token_counter = build_token_counter(provider, model)?;
    let mut chunks = Vec::new();
    for unit in units {
        let trimmed = unit.trim();
        if trimmed.is_empty() {
            continue;
        }
        if token_counter.as_ref()(trimmed) <= chunk_size {
            chunks.push(trimmed.to_string());
        } else {
            chunks.extend(chunk_text_with_counter(
                trimmed,
                chunk_size,
                overlap,
                token_counter.clone(),
            ));
        }
    }
    Ok(chunks)
}

/// Build a token counter for the given provider/model.
///
/// Uses OpenAI encodings when possible and gracefully falls back to whitespace tokenization for
/// unknown or locally aliased models (typical with Ollama). The fallback is logged at `warn` level
/// to aid diagnosis while keeping ingestion flowing.
pub(crate) fn build_token_counter(
    provider: EmbeddingProvider,
    model: &str,
) -> Result<TokenCounter, ChunkingError> {
    match provider {
        EmbeddingProvider::OpenAI => build_tiktoken_counter(model),
        EmbeddingProvider::Ollama => match build_tiktoken_counter(model) {
            Ok(counter) => Ok(counter),
            Err(error) => {
                tracing::warn!(
                    model,
                    error = %error,
                    "Tokenizer unavailable for Ollama model; falling back to whitespace counter"
                );
                Ok(default_token_counter())
            }
        },
        EmbeddingProvider::Local => Ok(default_token_counter()),
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

/// Resolve `model` as a model name, then as an encoding name, then fall back to `cl100k_base`.
fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    get_bpe_from_model(model).or_else(|_| {
        encoding_from_name(model).unwrap_or_else(|| {
            tracing::warn!(model, "Unknown tokenizer; counting with 'cl100k_base'");
            cl100k_base()
        })
    })
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

pub(crate) fn default_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Lower-level chunker that accepts an explicit token counter.
pub(crate) fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
) -> Vec<String> {
    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, &token_counter)
}

/// Prefix each chunk after the first with up to `overlap` tokens from the end of its
/// predecessor, trimming from the front so no chunk exceeds `chunk_size`.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    let overlap = overlap.min(chunk_size.saturating_sub(1));
    let Some(first) = chunks.first().cloned() else {
        return chunks;
    };
    if overlap == 0 {
        return chunks;
    }
    std::iter::once(first)
        .chain(chunks.windows(2).map(|pair| {
            build_overlapped_chunk(&pair[0], &pair[1], overlap, chunk_size, token_counter)
        }))
        .collect()
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    token_counter: &TokenCounter,
) -> String {
    let tail = suffix_within_budget(previous, overlap, token_counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    if !tail.is_empty() {
        combined.push_str(tail);
        if !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace) {
            combined.push(' ');
        }
    }
    combined.push_str(current);
    suffix_within_budget(&combined, chunk_size, token_counter).to_string()
}

/// Longest suffix of `text`, leading whitespace trimmed, that fits in `budget` tokens.
fn suffix_within_budget<'a>(text: &'a str, budget: usize, token_counter: &TokenCounter) -> &'a str {
    text.char_indices()
        .map(|(offset, _)| text[offset..].trim_start())
        .find(|candidate| token_counter.as_ref()(candidate) <= budget)
        .unwrap_or("")
}
