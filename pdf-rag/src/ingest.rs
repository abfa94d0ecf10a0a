//! Parallel embedding and upsert of chunk batches.
//!
//! [`ParallelIngestor`] splits chunks into contiguous batches with
//! [`partition_batches`], embeds and upserts each batch on its own task, and
//! waits for all of them. A failed batch is recorded in the
//! [`IngestionReport`] and never cancels its siblings.

use std::collections::BTreeMap;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::document::Chunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Split `total` items into contiguous batch ranges.
///
/// Fewer items than `batch_size_hint` form a single batch. Otherwise the
/// batch count is `ceil(total / hint)` capped at `max_workers * 2`, and every
/// batch except possibly the last holds `ceil(total / batch_count)` items.
/// The ranges are disjoint and cover `0..total` in order.
pub fn partition_batches(total: usize, batch_size_hint: usize, max_workers: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let hint = batch_size_hint.max(1);
    if total < hint {
        return vec![0..total];
    }

    let batch_count = total.div_ceil(hint).clamp(1, max_workers.max(1) * 2);
    let batch_size = total.div_ceil(batch_count);
    (0..total).step_by(batch_size).map(|start| start..(start + batch_size).min(total)).collect()
}

/// A batch that did not make it into the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// 1-based batch number.
    pub batch: usize,
    pub chunk_count: usize,
    pub error: String,
}

/// Outcome of one [`ParallelIngestor::ingest`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionReport {
    /// Chunks handed to the ingestor.
    pub total_chunks: usize,
    /// Chunks from batches that were embedded and upserted.
    pub ingested_chunks: usize,
    /// Number of batches the chunks were split into.
    pub batches: usize,
    pub failures: Vec<BatchFailure>,
}

impl IngestionReport {
    /// True when every batch succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Embeds chunks and writes them to a collection using a bounded pool of
/// concurrent batch tasks.
///
/// # Example
///
/// ```rust,ignore
/// let ingestor = ParallelIngestor::new(embedder, store, "pdf_documents")
///     .with_batch_size(100)
///     .with_max_workers(4);
/// let report = ingestor.ingest(chunks).await;
/// assert!(report.is_complete());
/// ```
#[derive(Clone)]
pub struct ParallelIngestor {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    batch_size: usize,
    max_workers: usize,
}

impl ParallelIngestor {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self { embedder, store, collection: collection.into(), batch_size: 100, max_workers: 4 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Embed and upsert `chunks`, returning once every batch has finished.
    pub async fn ingest(&self, chunks: Vec<Chunk>) -> IngestionReport {
        let total_chunks = chunks.len();
        let ranges = partition_batches(total_chunks, self.batch_size, self.max_workers);
        let batch_count = ranges.len();
        info!(
            collection = %self.collection,
            chunks = total_chunks,
            batches = batch_count,
            workers = self.max_workers,
            "processing batches"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut pending: BTreeMap<usize, usize> = BTreeMap::new();
        let mut tasks = JoinSet::new();
        let mut remaining = chunks;

        // Split from the back so each batch owns its chunks without cloning.
        for (index, range) in ranges.into_iter().enumerate().rev() {
            let batch = index + 1;
            let batch_chunks = remaining.split_off(range.start);
            pending.insert(batch, batch_chunks.len());

            let embedder = Arc::clone(&self.embedder);
            let store = Arc::clone(&self.store);
            let collection = self.collection.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let count = batch_chunks.len();
                let work = async {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        RagError::IngestionBatchError { batch, message: e.to_string() }
                    })?;
                    ingest_batch(embedder.as_ref(), store.as_ref(), &collection, batch_chunks, batch)
                        .await
                };
                let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => Err(RagError::IngestionBatchError {
                        batch,
                        message: "batch task panicked".to_string(),
                    }),
                };
                (batch, count, outcome)
            });
        }

        let mut report =
            IngestionReport { total_chunks, batches: batch_count, ..IngestionReport::default() };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((batch, count, Ok(()))) => {
                    pending.remove(&batch);
                    report.ingested_chunks += count;
                    info!(batch, batches = batch_count, chunks = count, "added batch");
                }
                Ok((batch, count, Err(e))) => {
                    pending.remove(&batch);
                    error!(batch, batches = batch_count, error = %e, "error adding batch");
                    report.failures.push(BatchFailure { batch, chunk_count: count, error: e.to_string() });
                }
                Err(e) => error!(error = %e, "batch task did not complete"),
            }
        }

        // Tasks that died without reporting back.
        for (batch, count) in pending {
            report.failures.push(BatchFailure {
                batch,
                chunk_count: count,
                error: "batch task did not complete".to_string(),
            });
        }
        report.failures.sort_by_key(|f| f.batch);

        info!(
            collection = %self.collection,
            ingested = report.ingested_chunks,
            failed_batches = report.failures.len(),
            "ingestion finished"
        );
        report
    }
}

async fn ingest_batch(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    collection: &str,
    mut chunks: Vec<Chunk>,
    batch: usize,
) -> Result<()> {
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let embeddings = embedder.embed_documents(&texts).await?;
    if embeddings.len() != chunks.len() {
        return Err(RagError::IngestionBatchError {
            batch,
            message: format!("expected {} embeddings, got {}", chunks.len(), embeddings.len()),
        });
    }
    for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
        chunk.embedding = embedding;
    }
    store.upsert(collection, &chunks).await
}
