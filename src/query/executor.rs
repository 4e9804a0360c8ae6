//! Parallel query executor
//!
//! Executes a query per group, per segment: segments are consumed in time
//! order (oldest first ascending, newest first descending), each scanned
//! by a pool of workers fed from a bounded channel. Every worker owns its
//! scratch block, cursor heap, and bounded result buffer; nothing mutable
//! is shared across workers. A final k-way merge reduces all worker
//! buffers to one ordered result of at most `max_element_size` rows.
//!
//! Worker errors are collected with multi-error semantics; cancellation is
//! cooperative and observed at batch boundaries.

use crate::query::cursor::{BlockCursor, ScanScratch};
use crate::query::error::{QueryError, QueryResult};
use crate::query::merge::{merge_sorted_rows, CursorHeap};
use crate::query::scan::{BlockScanBatch, BlockScanner};
use crate::query::{
    resolve_series_in_segment, QueryOptions, QueryRequest, QueryResponse, QueryRow,
};
use crate::storage::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Query executor over one engine.
pub struct QueryExecutor {
    engine: Arc<Engine>,
    worker_count: usize,
}

impl QueryExecutor {
    /// Create an executor sized to the host's available CPUs.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self::with_worker_count(engine, num_cpus::get())
    }

    pub fn with_worker_count(engine: Arc<Engine>, worker_count: usize) -> Self {
        Self {
            engine,
            worker_count: worker_count.max(1),
        }
    }

    /// Execute a query to completion.
    pub async fn execute(&self, request: QueryRequest) -> QueryResult<QueryResponse> {
        self.execute_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Execute a query, stopping cooperatively when `token` fires.
    pub async fn execute_with_cancellation(
        &self,
        request: QueryRequest,
        token: CancellationToken,
    ) -> QueryResult<QueryResponse> {
        if request.max_element_size == 0 {
            return Err(QueryError::InvalidRequest(
                "max_element_size must be at least 1".to_string(),
            ));
        }
        if request.time_range.start >= request.time_range.end {
            return Err(QueryError::InvalidRequest(
                "time range start must be before end".to_string(),
            ));
        }

        let mut collected: Vec<Vec<QueryRow>> = Vec::new();

        for group in &request.groups {
            let schema = self.engine.registry().resource(group, &request.resource)?;
            let tsdb = self.engine.tsdb(group)?;

            let mut segments = tsdb.segments_for(&request.time_range);
            if !request.asc {
                segments.reverse();
            }
            if segments.is_empty() {
                continue;
            }

            let mut series_to_entity = HashMap::new();
            for segment in &segments {
                resolve_series_in_segment(segment, &schema, &request, &mut series_to_entity)?;
            }
            if series_to_entity.is_empty() {
                continue;
            }

            let qo = Arc::new(QueryOptions {
                time_range: request.time_range,
                tag_projection: request.tag_projection.clone(),
                field_projection: request.field_projection.clone(),
                max_element_size: request.max_element_size,
                asc: request.asc,
                series_to_entity,
                schema,
            });

            // Segments tile time, so once a group has produced enough rows
            // the remaining segments cannot contribute to the final cut.
            let mut group_rows = 0usize;
            for segment in segments {
                if token.is_cancelled() {
                    return Err(QueryError::Cancelled);
                }
                let buffers = self
                    .scan_segment(BlockScanner::new(segment, Arc::clone(&qo)), &qo, &token)
                    .await?;
                group_rows += buffers.iter().map(|b| b.len()).sum::<usize>();
                collected.extend(buffers);
                if group_rows >= request.max_element_size {
                    break;
                }
            }
        }

        if token.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let rows = merge_sorted_rows(collected, request.max_element_size, request.asc);
        Ok(QueryResponse { rows })
    }

    /// Fan one segment's block batches across the worker pool and return
    /// the per-worker ordered buffers.
    async fn scan_segment(
        &self,
        scanner: BlockScanner,
        qo: &Arc<QueryOptions>,
        token: &CancellationToken,
    ) -> QueryResult<Vec<Vec<QueryRow>>> {
        let (tx, rx) = mpsc::channel::<BlockScanBatch>(self.worker_count);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let rx = Arc::clone(&rx);
            let qo = Arc::clone(qo);
            let token = token.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(rx, qo, token).await
            }));
        }

        scanner.scan(tx, token.clone()).await;

        let mut buffers = Vec::with_capacity(self.worker_count);
        let mut errors = Vec::new();
        for worker in workers {
            match worker.await {
                Ok((buffer, worker_errors)) => {
                    if !buffer.is_empty() {
                        buffers.push(buffer);
                    }
                    errors.extend(worker_errors);
                }
                Err(e) => errors.push(QueryError::Internal(format!("worker panicked: {}", e))),
            }
        }

        if !errors.is_empty() {
            return Err(QueryError::combine(errors));
        }
        Ok(buffers)
    }
}

/// One worker: drain batches, decode cursors into the heap, merge into a
/// bounded buffer. Stops pulling at cancellation; the batch in hand is
/// finished first.
async fn worker_loop(
    rx: Arc<Mutex<mpsc::Receiver<BlockScanBatch>>>,
    qo: Arc<QueryOptions>,
    token: CancellationToken,
) -> (Vec<QueryRow>, Vec<QueryError>) {
    let mut scratch = ScanScratch::default();
    let mut heap = CursorHeap::new(qo.asc);
    let mut result: Vec<QueryRow> = Vec::new();
    let mut errors: Vec<QueryError> = Vec::new();

    loop {
        if token.is_cancelled() {
            break;
        }
        let batch = { rx.lock().await.recv().await };
        let Some(batch) = batch else {
            break;
        };
        if let Some(err) = batch.err {
            errors.push(err);
            continue;
        }

        heap.clear();
        for item in batch.items {
            match BlockCursor::load(&item.block, item.series_id, &qo, &mut scratch) {
                Ok(Some(mut cursor)) => {
                    if !qo.asc {
                        cursor.idx = cursor.len() as isize - 1;
                    }
                    heap.push(cursor);
                }
                Ok(None) => {}
                Err(e) => errors.push(e.into()),
            }
        }

        let mut batch_rows = Vec::new();
        heap.merge(qo.max_element_size, &mut batch_rows);
        if !batch_rows.is_empty() {
            result = merge_sorted_rows(
                vec![result, batch_rows],
                qo.max_element_size,
                qo.asc,
            );
        }
    }

    (result, errors)
}
