//! Source loaders: read PDF, text, and CSV files into ordered chunk sets.

use super::chunking::split_units;
use super::types::{LoadError, LoaderKind, PageRange};
use crate::config::EmbeddingProvider;
use crate::index::{ChunkSet, DocumentChunk};
use lopdf::Document;
use std::path::Path;

/// Chunking parameters resolved for one load.
#[derive(Debug, Clone)]
pub(crate) struct ChunkingPlan {
    pub chunk_size: usize,
    pub overlap: usize,
    pub provider: EmbeddingProvider,
    pub model: String,
}

/// Chunks extracted from a source file.
#[derive(Debug)]
pub(crate) struct LoadedDocument {
    pub chunks: ChunkSet,
    /// Pages, rows, or 1 for plain text, counted before any page selection.
    pub page_count: usize,
}

/// Read `path` with the given loader, apply the page selection, and chunk the result.
pub(crate) async fn load_file(
    path: &Path,
    kind: LoaderKind,
    page_range: Option<PageRange>,
    plan: &ChunkingPlan,
) -> Result<LoadedDocument, LoadError> {
    let range = page_range.unwrap_or_default();
    if kind != LoaderKind::Pdf && !range.is_unbounded() {
        return Err(LoadError::PageRangeUnsupported(kind));
    }

    let bytes = tokio::fs::read(path).await.map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let units = match kind {
        LoaderKind::Pdf => pdf_pages(bytes).await?,
        LoaderKind::Text => vec![String::from_utf8_lossy(&bytes).into_owned()],
        LoaderKind::Csv => csv_rows(&bytes)?,
    };
    let page_count = units.len();
    let selected = select_pages(units, range)?;

    let chunks = split_units(
        &selected,
        plan.chunk_size,
        plan.overlap,
        plan.provider,
        &plan.model,
    )?;
    tracing::debug!(
        path = %path.display(),
        kind = %kind,
        pages = page_count,
        selected = selected.len(),
        chunks = chunks.len(),
        "Loaded document"
    );

    Ok(LoadedDocument {
        chunks: chunks.into_iter().map(DocumentChunk::from).collect(),
        page_count,
    })
}

/// Keep pages `[start, end)`. Missing bounds default to the whole document and bounds past the
/// last page are clamped, so an out-of-range selection yields no pages rather than an error.
/// Only an explicit `start` greater than an explicit `end` is rejected.
pub(crate) fn select_pages(pages: Vec<String>, range: PageRange) -> Result<Vec<String>, LoadError> {
    if let PageRange {
        start: Some(start),
        end: Some(end),
    } = range
    {
        if start > end {
            return Err(LoadError::InvalidPageRange { start, end });
        }
    }
    let total = pages.len();
    let start = range.start.unwrap_or(0).min(total);
    let end = range.end.unwrap_or(total).min(total);
    Ok(pages
        .into_iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect())
}

/// Extract text per page, keeping the parser off the async executor.
async fn pdf_pages(bytes: Vec<u8>) -> Result<Vec<String>, LoadError> {
    tokio::task::spawn_blocking(move || -> Result<Vec<String>, LoadError> {
        let document =
            Document::load_mem(&bytes).map_err(|err| LoadError::Pdf(err.to_string()))?;
        let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        page_numbers.sort_unstable();

        Ok(page_numbers
            .into_iter()
            .map(|page| {
                document.extract_text(&[page]).unwrap_or_else(|err| {
                    tracing::warn!(page, error = %err, "Page has no extractable text layer");
                    String::new()
                })
            })
            .collect())
    })
    .await
    .map_err(|err| LoadError::Task(err.to_string()))?
}

/// Render each CSV record as `header: value` lines, one unit per row.
fn csv_rows(bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(column, value)| match headers.get(column) {
                Some(header) if !header.is_empty() => format!("{header}: {value}"),
                _ => format!("column_{column}: {value}"),
            })
            .collect();
        rows.push(lines.join("\n"));
    }
    Ok(rows)
}

/// Build an in-memory PDF with one line of text per page.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = document.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    let page_count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("serialize pdf");
    bytes
}
