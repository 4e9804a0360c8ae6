//! Time segments
//!
//! A segment is one half-open time window within a group. It owns at most
//! one columnar table per shard plus one inverted index, all under a
//! directory named for the window bounds (`seg_<start>_<end>`).
//!
//! Segment handles are `Arc<Segment>`: cloning acquires, dropping releases.
//! Every code path that obtains a segment therefore balances its reference
//! on all exits, including errors.

use crate::index::InvertedIndex;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::table::{ShardId, TsTable};
use crate::storage::types::TimeRange;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const INDEX_DIR: &str = "index";
const INDEX_DIRTY_MARKER: &str = "index.dirty";

/// One time-window partition of a group.
pub struct Segment {
    group: String,
    time_range: TimeRange,
    dir: PathBuf,
    tables: RwLock<HashMap<ShardId, Arc<TsTable>>>,
    index: InvertedIndex,
}

impl Segment {
    /// Open or create the segment for `time_range` under `group_root`.
    ///
    /// When the persisted index is missing, corrupt, or flagged dirty by a
    /// failed index write, it is rebuilt from the data parts.
    pub(crate) fn open_or_create(
        group: &str,
        group_root: &Path,
        time_range: TimeRange,
    ) -> StorageResult<Arc<Self>> {
        let dir = group_root.join(segment_dir_name(&time_range));
        std::fs::create_dir_all(&dir)?;

        let mut tables = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(shard_str) = name.strip_prefix("shard-") {
                if let Ok(shard) = shard_str.parse::<ShardId>() {
                    let table = TsTable::open(entry.path(), shard)?;
                    tables.insert(shard, Arc::new(table));
                }
            }
        }

        let index_dir = dir.join(INDEX_DIR);
        let (index, existed) = match InvertedIndex::open(&index_dir) {
            Ok(opened) => opened,
            Err(StorageError::Corruption(reason)) => {
                tracing::warn!(group = group, segment = %dir.display(), reason = %reason,
                    "segment index is corrupt, rebuilding from parts");
                std::fs::remove_dir_all(&index_dir)?;
                (InvertedIndex::open(&index_dir)?.0, false)
            }
            Err(e) => return Err(e),
        };

        let segment = Self {
            group: group.to_string(),
            time_range,
            dir,
            tables: RwLock::new(tables),
            index,
        };

        if (!existed || segment.index_dirty()) && !segment.tables.read().is_empty() {
            segment.rebuild_index()?;
        }

        Ok(Arc::new(segment))
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    /// The table for `shard`, created on first use.
    pub fn table_for(&self, shard: ShardId) -> StorageResult<Arc<TsTable>> {
        if let Some(table) = self.tables.read().get(&shard) {
            return Ok(Arc::clone(table));
        }
        let mut tables = self.tables.write();
        // Re-check: another writer may have created it while we waited.
        if let Some(table) = tables.get(&shard) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(TsTable::open(
            self.dir.join(format!("shard-{}", shard)),
            shard,
        )?);
        tables.insert(shard, Arc::clone(&table));
        Ok(table)
    }

    /// Snapshot of all shard tables, sorted by shard id.
    pub fn tables(&self) -> Vec<Arc<TsTable>> {
        let mut tables: Vec<_> = self.tables.read().values().cloned().collect();
        tables.sort_by_key(|t| t.shard());
        tables
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// Flag that an index write failed after its data append succeeded.
    /// The next open reconciles by rebuilding the index from parts.
    pub fn mark_index_dirty(&self) {
        if let Err(e) = std::fs::write(self.dir.join(INDEX_DIRTY_MARKER), b"") {
            tracing::error!(segment = %self.dir.display(), error = %e,
                "cannot write index dirty marker");
        }
    }

    fn index_dirty(&self) -> bool {
        self.dir.join(INDEX_DIRTY_MARKER).exists()
    }

    /// Re-derive metadata documents from the data parts.
    fn rebuild_index(&self) -> StorageResult<()> {
        let mut docs = Vec::new();
        for table in self.tables.read().values() {
            docs.extend(table.metadata_docs());
        }
        let count = docs.len();
        self.index.insert(docs)?;
        let _ = std::fs::remove_file(self.dir.join(INDEX_DIRTY_MARKER));
        tracing::info!(
            group = %self.group,
            segment = %self.dir.display(),
            docs = count,
            "rebuilt segment index from data parts"
        );
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.tables.read().values().map(|t| t.row_count()).sum()
    }
}

fn segment_dir_name(range: &TimeRange) -> String {
    format!("seg_{}_{}", range.start, range.end)
}

/// Parse a segment directory name back into its time range.
pub(crate) fn parse_segment_dir_name(name: &str) -> Option<TimeRange> {
    let rest = name.strip_prefix("seg_")?;
    let (start, end) = rest.split_once('_')?;
    TimeRange::try_new(start.parse().ok()?, end.parse().ok()?)
}
