//! PDF loading: one [`SourceDocument`] per page.
//!
//! Parsing uses [`lopdf`], which is synchronous, so each file is parsed on
//! the blocking thread pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::document::SourceDocument;
use crate::error::{RagError, Result};

fn is_pdf(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn parse_pages(path: &Path) -> Result<Vec<SourceDocument>> {
    let pdf_error = |message: String| RagError::PdfError { path: path.to_path_buf(), message };

    let document = lopdf::Document::load(path).map_err(|e| pdf_error(e.to_string()))?;
    let pages = document.get_pages();
    let total_pages = pages.len();
    let source = path.display().to_string();
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let mut documents = Vec::with_capacity(total_pages);
    for &number in pages.keys() {
        let text = match document.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %source, page = number, error = %e, "could not extract page text");
                String::new()
            }
        };
        documents.push(
            SourceDocument::new(source.clone(), number, text)
                .with_metadata("file_name", file_name.clone())
                .with_metadata("total_pages", total_pages.to_string()),
        );
    }
    Ok(documents)
}

/// Load every page of a PDF, in page order.
///
/// Pages whose text cannot be extracted come back empty; the chunker skips
/// them.
///
/// # Errors
///
/// - [`RagError::NotFound`] if `path` does not exist.
/// - [`RagError::PdfError`] if it is not a `.pdf` file or cannot be parsed.
pub async fn load_pdf(path: impl AsRef<Path>) -> Result<Vec<SourceDocument>> {
    let path = path.as_ref().to_path_buf();
    if !tokio::fs::try_exists(&path).await? {
        return Err(RagError::NotFound { path });
    }
    if !is_pdf(&path) {
        return Err(RagError::PdfError { path, message: "not a PDF file".to_string() });
    }

    let documents = tokio::task::spawn_blocking({
        let path = path.clone();
        move || parse_pages(&path)
    })
    .await
    .map_err(|e| RagError::PdfError { path: path.clone(), message: format!("parser task failed: {e}") })??;

    debug!(path = %path.display(), pages = documents.len(), "loaded PDF");
    Ok(documents)
}

/// List the `*.pdf` files directly inside `directory`, sorted by path.
///
/// The extension match is case-insensitive and subdirectories are not
/// searched.
///
/// # Errors
///
/// Returns [`RagError::NotFound`] if `directory` does not exist or is not a
/// directory.
pub async fn collect_pdf_paths(directory: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let directory = directory.as_ref();
    let is_dir = tokio::fs::metadata(directory).await.map(|m| m.is_dir()).unwrap_or(false);
    if !is_dir {
        return Err(RagError::NotFound { path: directory.to_path_buf() });
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_pdf(&path) && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Load `paths` concurrently, at most `max_workers` files at a time.
///
/// Returns one entry per file that loaded, in the order of `paths`. Files
/// that fail are logged and skipped.
pub async fn load_files(paths: &[PathBuf], max_workers: usize) -> Vec<Vec<SourceDocument>> {
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut tasks = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => load_pdf(&path).await,
                Err(e) => Err(RagError::PdfError { path: path.clone(), message: e.to_string() }),
            };
            (index, path, outcome)
        });
    }

    let mut loaded = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, _, Ok(pages))) => {
                loaded.insert(index, pages);
            }
            Ok((_, path, Err(e))) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable PDF");
            }
            Err(e) => warn!(error = %e, "PDF loading task did not complete"),
        }
    }
    loaded.into_values().collect()
}

/// Load every PDF in `directory`, `max_workers` files at a time. Files that
/// fail to parse are logged and skipped.
pub async fn load_directory(
    directory: impl AsRef<Path>,
    max_workers: usize,
) -> Result<Vec<SourceDocument>> {
    let paths = collect_pdf_paths(directory.as_ref()).await?;
    info!(directory = %directory.as_ref().display(), files = paths.len(), "loading PDF directory");
    Ok(load_files(&paths, max_workers).await.into_iter().flatten().collect())
}
