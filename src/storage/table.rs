//! Columnar table for one (segment, shard)
//!
//! A `TsTable` is append-only. Each append persists one part file and then
//! publishes the decoded block to readers in a single step, so a batch is
//! either fully visible or not at all.
//!
//! Part file layout:
//! ```text
//! ┌──────────────────────────────┐
//! │ magic: [u8; 4] = "STPT"      │
//! │ version: u16                 │
//! │ payload_len: u32             │
//! │ payload_crc32: u32           │
//! │ payload: bincode ColumnBatch │
//! └──────────────────────────────┘
//! ```
//!
//! On open, parts replay in order; the first part that fails its checksum
//! or framing is treated as a torn append, deleted, and replay stops there.

use crate::index::IndexDocument;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::series::SeriesId;
use crate::storage::types::NameValues;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PART_MAGIC: [u8; 4] = *b"STPT";
const PART_VERSION: u16 = 1;

/// Stable numeric partition within a group.
pub type ShardId = u32;

/// One staged or persisted batch of rows in columnar form.
///
/// All row-parallel vectors must have equal length; `append` enforces it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnBatch {
    pub series_ids: Vec<SeriesId>,
    pub timestamps: Vec<i64>,
    pub versions: Vec<i64>,
    /// Per row: the non-empty tag families of that row.
    pub tag_families: Vec<Vec<NameValues>>,
    /// Per row: the field column group (empty values for streams).
    pub fields: Vec<NameValues>,
    /// Metadata documents staged with this batch. Carried in the part so a
    /// lost segment index can be re-derived from data parts alone.
    pub metadata_docs: Vec<IndexDocument>,
}

impl ColumnBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn push_row(
        &mut self,
        series_id: SeriesId,
        timestamp: i64,
        version: i64,
        tag_families: Vec<NameValues>,
        fields: NameValues,
    ) {
        self.series_ids.push(series_id);
        self.timestamps.push(timestamp);
        self.versions.push(version);
        self.tag_families.push(tag_families);
        self.fields.push(fields);
    }

    /// Verify all column vectors carry one entry per row.
    pub fn validate_alignment(&self) -> StorageResult<()> {
        let n = self.timestamps.len();
        if self.series_ids.len() != n
            || self.versions.len() != n
            || self.tag_families.len() != n
            || self.fields.len() != n
        {
            return Err(StorageError::Corruption(format!(
                "column misalignment: series={} timestamps={} versions={} tag_families={} fields={}",
                self.series_ids.len(),
                n,
                self.versions.len(),
                self.tag_families.len(),
                self.fields.len(),
            )));
        }
        Ok(())
    }
}

/// A committed, immutable block of rows with its scan metadata.
#[derive(Debug)]
pub struct Block {
    pub data: ColumnBatch,
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    series: HashSet<SeriesId>,
}

impl Block {
    fn from_batch(data: ColumnBatch) -> Self {
        let min_timestamp = data.timestamps.iter().copied().min().unwrap_or(i64::MAX);
        let max_timestamp = data.timestamps.iter().copied().max().unwrap_or(i64::MIN);
        let series = data.series_ids.iter().copied().collect();
        Self {
            data,
            min_timestamp,
            max_timestamp,
            series,
        }
    }

    pub fn contains_series(&self, id: SeriesId) -> bool {
        self.series.contains(&id)
    }

    pub fn series(&self) -> &HashSet<SeriesId> {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Append-only columnar store for one (segment, shard).
pub struct TsTable {
    dir: PathBuf,
    shard: ShardId,
    blocks: RwLock<Vec<Arc<Block>>>,
}

impl TsTable {
    /// Open (or create) the table directory and replay its parts.
    pub fn open(dir: impl Into<PathBuf>, shard: ShardId) -> StorageResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut blocks = Vec::new();
        for idx in 0.. {
            let path = part_path(&dir, idx);
            if !path.exists() {
                break;
            }
            match read_part(&path) {
                Ok(batch) => blocks.push(Arc::new(Block::from_batch(batch))),
                Err(e) => {
                    tracing::warn!(
                        shard = shard,
                        part = %path.display(),
                        error = %e,
                        "discarding torn part and stopping replay"
                    );
                    let _ = std::fs::remove_file(&path);
                    break;
                }
            }
        }

        Ok(Self {
            dir,
            shard,
            blocks: RwLock::new(blocks),
        })
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Append a batch: persist it as one part, then publish the block.
    ///
    /// Atomic with respect to readers: a concurrent scan sees either none
    /// or all of the batch's rows.
    pub fn append(&self, batch: ColumnBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        batch.validate_alignment()?;

        let mut blocks = self.blocks.write();
        let path = part_path(&self.dir, blocks.len());
        write_part(&path, &batch)?;
        blocks.push(Arc::new(Block::from_batch(batch)));
        Ok(())
    }

    /// Snapshot of all committed blocks.
    pub fn blocks(&self) -> Vec<Arc<Block>> {
        self.blocks.read().clone()
    }

    pub fn row_count(&self) -> usize {
        self.blocks.read().iter().map(|b| b.len()).sum()
    }

    /// All metadata documents persisted in this table's parts.
    pub fn metadata_docs(&self) -> Vec<IndexDocument> {
        self.blocks
            .read()
            .iter()
            .flat_map(|b| b.data.metadata_docs.iter().cloned())
            .collect()
    }
}

fn part_path(dir: &Path, idx: usize) -> PathBuf {
    dir.join(format!("part-{:06}.bin", idx))
}

fn write_part(path: &Path, batch: &ColumnBatch) -> StorageResult<()> {
    let payload = bincode::serialize(batch)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&PART_MAGIC)?;
    file.write_all(&PART_VERSION.to_le_bytes())?;
    file.write_all(&(payload.len() as u32).to_le_bytes())?;
    file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    file.write_all(&payload)?;
    file.sync_all()?;
    Ok(())
}

fn read_part(path: &Path) -> StorageResult<ColumnBatch> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 14];
    file.read_exact(&mut header)?;

    if header[0..4] != PART_MAGIC {
        return Err(StorageError::Corruption(format!(
            "part has invalid magic: {:?}",
            &header[0..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > PART_VERSION {
        return Err(StorageError::Corruption(format!(
            "unsupported part version: {}",
            version
        )));
    }
    let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let stored_crc = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);

    let mut payload = vec![0u8; len];
    file.read_exact(&mut payload)?;
    let computed = crc32fast::hash(&payload);
    if computed != stored_crc {
        return Err(StorageError::Corruption(format!(
            "part checksum mismatch: stored={}, computed={}",
            stored_crc, computed
        )));
    }

    let batch: ColumnBatch = bincode::deserialize(&payload)?;
    batch.validate_alignment()?;
    Ok(batch)
}
