//! Batch mutation processing.
//!
//! Bulk inputs are split into contiguous chunks of at most `batch_size` items. Chunks run
//! strictly one after another and never share a transaction: a failing chunk or item is
//! recorded and processing moves on. The per-chunk results are merged into a single
//! [`BulkOperationResult`].
//!
//! ```ignore
//! use rowlayer::batch::{BatchProcessor, ChunkResult};
//!
//! let result = BatchProcessor::new(100)
//!     .process(rows, |offset, chunk| async move {
//!         BatchProcessor::each(offset, chunk, |index, row| write(index, row)).await
//!     })
//!     .await;
//! ```

use std::future::Future;

use bson::Bson;
use serde::Serialize;
use tracing::{debug, warn};

/// A failed item in a bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    /// Position of the item in the bulk input.
    pub index: usize,
    /// Identity of the item, when it has one.
    pub id: Option<Bson>,
    pub message: String,
}

impl BatchError {
    pub fn new(index: usize, id: Option<Bson>, message: impl Into<String>) -> Self {
        Self {
            index,
            id,
            message: message.into(),
        }
    }
}

/// Counters for a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchInfo {
    /// Number of input items.
    pub size: usize,
    pub processed: usize,
    pub failed: usize,
    /// One entry per failed item.
    pub errors: Vec<BatchError>,
}

/// Outcome of a bulk operation: counters plus the rows that were written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkOperationResult<T> {
    pub batch: BatchInfo,
    pub data: Vec<T>,
}

impl<T> BulkOperationResult<T> {
    /// The result of a bulk call with no input.
    pub fn empty() -> Self {
        Self {
            batch: BatchInfo::default(),
            data: Vec::new(),
        }
    }

    /// Whether every input item was processed.
    pub fn is_complete(&self) -> bool {
        self.batch.failed == 0 && self.batch.processed == self.batch.size
    }

    /// Fails every item up front, without running anything.
    pub fn rejected(ids: Vec<Option<Bson>>, message: &str) -> Self {
        let size = ids.len();
        let errors = ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| BatchError::new(index, id, message))
            .collect::<Vec<_>>();

        Self {
            batch: BatchInfo {
                size,
                processed: 0,
                failed: size,
                errors,
            },
            data: Vec::new(),
        }
    }
}

/// The merged outcome of one chunk.
#[derive(Debug)]
pub struct ChunkResult<T> {
    pub data: Vec<T>,
    pub processed: usize,
    pub errors: Vec<BatchError>,
}

impl<T> Default for ChunkResult<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            processed: 0,
            errors: Vec::new(),
        }
    }
}

impl<T> ChunkResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chunk whose every item was processed.
    pub fn succeeded(data: Vec<T>) -> Self {
        Self {
            processed: data.len(),
            data,
            errors: Vec::new(),
        }
    }

    /// Records a processed item.
    pub fn succeed(&mut self, item: T) {
        self.processed += 1;
        self.data.push(item);
    }

    /// Records a failed item.
    pub fn fail(&mut self, error: BatchError) {
        self.errors.push(error);
    }

    /// Fails every listed item with the same message.
    ///
    /// `items` pairs each item's position in the bulk input with its identity.
    pub fn fail_all(
        &mut self,
        items: impl IntoIterator<Item = (usize, Option<Bson>)>,
        message: &str,
    ) {
        self.errors.extend(
            items
                .into_iter()
                .map(|(index, id)| BatchError::new(index, id, message)),
        );
    }

    pub fn merge(&mut self, other: ChunkResult<T>) {
        self.data.extend(other.data);
        self.processed += other.processed;
        self.errors.extend(other.errors);
    }
}

/// Splits bulk input into sequentially processed chunks.
#[derive(Debug, Clone, Copy)]
pub struct BatchProcessor {
    batch_size: usize,
}

impl BatchProcessor {
    /// Creates a processor. A zero batch size is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs `run_chunk` over each chunk, in order, and merges the results.
    ///
    /// `run_chunk` receives the position of the chunk's first item in `items` and the
    /// chunk itself. Empty input returns immediately.
    pub async fn process<I, T, F, Fut>(&self, items: Vec<I>, mut run_chunk: F) -> BulkOperationResult<T>
    where
        F: FnMut(usize, Vec<I>) -> Fut,
        Fut: Future<Output = ChunkResult<T>>,
    {
        if items.is_empty() {
            return BulkOperationResult::empty();
        }

        let size = items.len();
        let mut merged = ChunkResult::new();
        let mut remaining = items;
        let mut offset = 0;

        while !remaining.is_empty() {
            let tail = remaining.split_off(self.batch_size.min(remaining.len()));
            let chunk = std::mem::replace(&mut remaining, tail);
            let len = chunk.len();

            let result = run_chunk(offset, chunk).await;

            debug!(
                offset,
                len,
                processed = result.processed,
                failed = result.errors.len(),
                "processed chunk"
            );

            merged.merge(result);
            offset += len;
        }

        let failed = merged.errors.len();
        if failed > 0 {
            warn!(size, processed = merged.processed, failed, "bulk operation partially failed");
        }

        BulkOperationResult {
            batch: BatchInfo {
                size,
                processed: merged.processed,
                failed,
                errors: merged.errors,
            },
            data: merged.data,
        }
    }

    /// Runs `op` over each item of a chunk, one at a time.
    ///
    /// `op` receives each item's position in the bulk input (`offset` plus its position in
    /// the chunk).
    pub async fn each<I, T, F, Fut>(offset: usize, items: Vec<I>, mut op: F) -> ChunkResult<T>
    where
        F: FnMut(usize, I) -> Fut,
        Fut: Future<Output = Result<T, BatchError>>,
    {
        let mut result = ChunkResult::new();

        for (position, item) in items.into_iter().enumerate() {
            match op(offset + position, item).await {
                Ok(row) => result.succeed(row),
                Err(error) => result.fail(error),
            }
        }

        result
    }
}
