//! Chunked batch inserts.
//!
//! A batch is NOT transactional as a unit. Chunks are sent one after another.
//! When chunk `k` fails, chunks `0..k` stay committed and chunks after `k`
//! are never sent. The error carries the committed chunk results so callers
//! can resume or compensate.
//!
//! A store error for chunk `k` means its statement did not apply. A deadline
//! or cancellation that abandons chunk `k` after it was sent leaves its
//! outcome unknown; the failure is then marked `in_doubt`.

use std::sync::Arc;

use harvest_core::{BatchChunkFailure, ChunkResult, HarvestError, HarvestResult, Record};
use tracing::{debug, info, warn};

use crate::context::OpContext;
use crate::registry::CategoryRegistry;
use crate::store::{DataStore, InsertOptions};

const OPERATION: &str = "batch_insert";

pub struct BatchWriter {
    store: Arc<dyn DataStore>,
    registry: Arc<CategoryRegistry>,
    default_chunk_size: usize,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn DataStore>,
        registry: Arc<CategoryRegistry>,
        default_chunk_size: usize,
    ) -> Self {
        Self {
            store,
            registry,
            default_chunk_size,
        }
    }

    /// Insert `records` into `category` in chunks of `chunk_size` (or the
    /// configured default), skipping rows whose primary key already exists.
    ///
    /// Returns one [`ChunkResult`] per chunk on success. On the first chunk
    /// failure returns [`HarvestError::Batch`].
    pub async fn insert_batches(
        &self,
        category: &str,
        records: &[Record],
        chunk_size: Option<usize>,
        ctx: &OpContext,
    ) -> HarvestResult<Vec<ChunkResult>> {
        let chunk_size = chunk_size.unwrap_or(self.default_chunk_size);
        if chunk_size == 0 {
            return Err(HarvestError::invalid_value("chunk_size", "chunk size must be at least 1"));
        }
        let table = self.registry.resolve(category)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_count = records.len().div_ceil(chunk_size);
        info!(
            category = %category,
            records = records.len(),
            chunk_size,
            chunks = chunk_count,
            "Starting batch insert"
        );

        let mut completed: Vec<ChunkResult> = Vec::with_capacity(chunk_count);
        for (index, chunk) in records.chunks(chunk_size).enumerate() {
            let outcome = match ctx.check(OPERATION) {
                Err(e) => Err((e, false)),
                Ok(()) => ctx
                    .race(
                        OPERATION,
                        self.store
                            .insert_many(&table, chunk, InsertOptions::skip_duplicates()),
                    )
                    .await
                    .map_err(|e| {
                        let in_doubt = e.is_interruption();
                        (e, in_doubt)
                    }),
            };

            match outcome {
                Ok(inserted) => {
                    debug!(
                        category = %category,
                        chunk = index,
                        attempted = chunk.len(),
                        inserted,
                        "Batch chunk committed"
                    );
                    completed.push(ChunkResult {
                        index,
                        attempted: chunk.len(),
                        inserted,
                    });
                }
                Err((source, in_doubt)) => {
                    warn!(
                        category = %category,
                        chunk = index,
                        attempted = chunk.len(),
                        committed_chunks = completed.len(),
                        in_doubt,
                        error = %source,
                        "Batch chunk failed, aborting remaining chunks"
                    );
                    return Err(BatchChunkFailure {
                        category: category.to_string(),
                        chunk_index: index,
                        attempted: chunk.len(),
                        completed,
                        in_doubt,
                        source: Box::new(source),
                    }
                    .into());
                }
            }
        }

        let inserted: u64 = completed.iter().map(|c| c.inserted).sum();
        info!(category = %category, chunks = completed.len(), inserted, "Batch insert complete");
        Ok(completed)
    }
}
