//! Block scanner
//!
//! For one segment, the scanner intersects the resolved series set with
//! every shard table's blocks and streams the candidates to the worker
//! pool in batches. The channel is bounded to the worker count, so the
//! producers block when the workers are saturated. Cancellation stops
//! production at the next send.

use crate::query::error::QueryError;
use crate::query::QueryOptions;
use crate::storage::segment::Segment;
use crate::storage::series::SeriesId;
use crate::storage::table::{Block, ShardId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Candidate block descriptors per producer batch.
pub(crate) const SCAN_BATCH_SIZE: usize = 64;

/// One candidate: a block known to hold rows of `series_id`.
#[derive(Clone)]
pub(crate) struct BlockScanItem {
    pub block: Arc<Block>,
    pub series_id: SeriesId,
}

/// A batch of candidates, or a per-batch error. Batch errors are reported
/// by the worker that receives them; they do not stop the scan.
pub(crate) struct BlockScanBatch {
    pub items: Vec<BlockScanItem>,
    pub err: Option<QueryError>,
}

/// Scanner over one segment.
pub(crate) struct BlockScanner {
    segment: Arc<Segment>,
    qo: Arc<QueryOptions>,
}

impl BlockScanner {
    pub fn new(segment: Arc<Segment>, qo: Arc<QueryOptions>) -> Self {
        Self { segment, qo }
    }

    /// Candidate (block, series) pairs grouped by shard: blocks whose time
    /// bounds intersect the query range and whose series set intersects
    /// the resolved series.
    pub fn search_series(&self) -> Vec<(ShardId, Vec<BlockScanItem>)> {
        let mut per_shard = Vec::new();
        for table in self.segment.tables() {
            let mut items = Vec::new();
            for block in table.blocks() {
                if block.is_empty()
                    || !self
                        .qo
                        .time_range
                        .overlaps_bounds(block.min_timestamp, block.max_timestamp)
                {
                    continue;
                }
                for series_id in self.qo.series_to_entity.keys() {
                    if block.contains_series(*series_id) {
                        items.push(BlockScanItem {
                            block: Arc::clone(&block),
                            series_id: *series_id,
                        });
                    }
                }
            }
            if !items.is_empty() {
                per_shard.push((table.shard(), items));
            }
        }
        per_shard
    }

    /// Stream candidates to the channel, one producer task per shard.
    /// Resolves when every producer has drained or cancellation hit.
    pub async fn scan(
        self,
        tx: mpsc::Sender<BlockScanBatch>,
        token: CancellationToken,
    ) {
        let mut producers = Vec::new();
        for (shard, items) in self.search_series() {
            let tx = tx.clone();
            let token = token.clone();
            producers.push(tokio::spawn(async move {
                for chunk in items.chunks(SCAN_BATCH_SIZE) {
                    let batch = BlockScanBatch {
                        items: chunk.to_vec(),
                        err: None,
                    };
                    tokio::select! {
                        _ = token.cancelled() => {
                            tracing::debug!(shard = shard, "scan cancelled, stop producing");
                            return;
                        }
                        sent = tx.send(batch) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }));
        }
        drop(tx);

        for producer in producers {
            let _ = producer.await;
        }
    }
}
