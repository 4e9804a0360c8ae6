//! Per-group TSDB
//!
//! One `Tsdb` per group: it locates or creates the segment tiling any write
//! timestamp, lists the segments a query range touches, and carries the
//! group's write clock (the max timestamp the group has accepted), which
//! retention and rotation observe.

use crate::storage::error::StorageResult;
use crate::storage::schema::GroupSchema;
use crate::storage::segment::{parse_segment_dir_name, Segment};
use crate::storage::types::TimeRange;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Per-group TSDB handle: segments plus the write frontier.
pub struct Tsdb {
    schema: Arc<GroupSchema>,
    root: PathBuf,
    /// Sorted by segment start.
    segments: RwLock<Vec<Arc<Segment>>>,
    frontier: AtomicI64,
}

impl Tsdb {
    /// Open the group's directory and load any existing segments.
    pub fn open(schema: Arc<GroupSchema>, data_dir: &std::path::Path) -> StorageResult<Self> {
        let root = data_dir.join(&schema.name);
        std::fs::create_dir_all(&root)?;

        let mut segments = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(range) = parse_segment_dir_name(&name) {
                segments.push(Segment::open_or_create(&schema.name, &root, range)?);
            }
        }
        segments.sort_by_key(|s| s.time_range().start);
        tracing::info!(group = %schema.name, segments = segments.len(), "opened tsdb");

        Ok(Self {
            schema,
            root,
            segments: RwLock::new(segments),
            frontier: AtomicI64::new(i64::MIN),
        })
    }

    pub fn schema(&self) -> &Arc<GroupSchema> {
        &self.schema
    }

    pub fn shard_count(&self) -> u32 {
        self.schema.shard_count
    }

    /// The segment window tiling `ts`.
    fn window_for(&self, ts: i64) -> TimeRange {
        let interval = self.schema.segment_interval;
        let start = ts.div_euclid(interval) * interval;
        TimeRange {
            start,
            end: start.saturating_add(interval),
        }
    }

    /// The segment containing `ts`, created if absent.
    ///
    /// Idempotent under concurrent ingestion: the window is re-checked
    /// under the write lock before creating.
    pub fn segment_for(&self, ts: i64) -> StorageResult<Arc<Segment>> {
        if let Some(seg) = self.find_segment(ts) {
            return Ok(seg);
        }

        let window = self.window_for(ts);
        let mut segments = self.segments.write();
        if let Some(seg) = segments.iter().find(|s| s.time_range().contains(ts)) {
            return Ok(Arc::clone(seg));
        }
        let segment = Segment::open_or_create(&self.schema.name, &self.root, window)?;
        tracing::debug!(
            group = %self.schema.name,
            start = window.start,
            end = window.end,
            "created segment"
        );
        segments.push(Arc::clone(&segment));
        segments.sort_by_key(|s| s.time_range().start);
        Ok(segment)
    }

    fn find_segment(&self, ts: i64) -> Option<Arc<Segment>> {
        self.segments
            .read()
            .iter()
            .find(|s| s.time_range().contains(ts))
            .cloned()
    }

    /// All segments overlapping `range`, oldest first.
    pub fn segments_for(&self, range: &TimeRange) -> Vec<Arc<Segment>> {
        self.segments
            .read()
            .iter()
            .filter(|s| s.time_range().overlaps(range))
            .cloned()
            .collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Advance the write clock so retention sees the new write frontier.
    pub fn tick(&self, latest_ts: i64) {
        self.frontier.fetch_max(latest_ts, Ordering::Relaxed);
    }

    /// Max accepted write timestamp, or `None` before the first write.
    pub fn write_frontier(&self) -> Option<i64> {
        match self.frontier.load(Ordering::Relaxed) {
            i64::MIN => None,
            ts => Some(ts),
        }
    }

    pub fn row_count(&self) -> usize {
        self.segments.read().iter().map(|s| s.row_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_tsdb(dir: &std::path::Path, interval: i64) -> Tsdb {
        let schema = Arc::new(GroupSchema::new("metrics", 2, interval));
        Tsdb::open(schema, dir).unwrap()
    }

    #[test]
    fn test_segments_tile_time_without_overlap() {
        let dir = tempdir().unwrap();
        let tsdb = open_tsdb(dir.path(), 1000);

        let a = tsdb.segment_for(0).unwrap();
        let b = tsdb.segment_for(999).unwrap();
        let c = tsdb.segment_for(1000).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.time_range(), TimeRange::new(0, 1000));
        assert_eq!(c.time_range(), TimeRange::new(1000, 2000));
    }

    #[test]
    fn test_negative_timestamps_tile_correctly() {
        let dir = tempdir().unwrap();
        let tsdb = open_tsdb(dir.path(), 1000);

        let seg = tsdb.segment_for(-1).unwrap();
        assert_eq!(seg.time_range(), TimeRange::new(-1000, 0));
    }

    #[test]
    fn test_segment_for_is_idempotent() {
        let dir = tempdir().unwrap();
        let tsdb = open_tsdb(dir.path(), 1000);

        tsdb.segment_for(500).unwrap();
        tsdb.segment_for(700).unwrap();
        assert_eq!(tsdb.segment_count(), 1);
    }

    #[test]
    fn test_segments_for_range_sorted_oldest_first() {
        let dir = tempdir().unwrap();
        let tsdb = open_tsdb(dir.path(), 1000);

        tsdb.segment_for(2500).unwrap();
        tsdb.segment_for(500).unwrap();
        tsdb.segment_for(1500).unwrap();

        let segs = tsdb.segments_for(&TimeRange::new(0, 3000));
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].time_range().start, 0);
        assert_eq!(segs[1].time_range().start, 1000);
        assert_eq!(segs[2].time_range().start, 2000);

        let segs = tsdb.segments_for(&TimeRange::new(1000, 1001));
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn test_reopen_rediscovers_segments() {
        let dir = tempdir().unwrap();
        {
            let tsdb = open_tsdb(dir.path(), 1000);
            tsdb.segment_for(500).unwrap();
            tsdb.segment_for(1500).unwrap();
        }

        let tsdb = open_tsdb(dir.path(), 1000);
        assert_eq!(tsdb.segment_count(), 2);
    }

    #[test]
    fn test_write_frontier() {
        let dir = tempdir().unwrap();
        let tsdb = open_tsdb(dir.path(), 1000);

        assert_eq!(tsdb.write_frontier(), None);
        tsdb.tick(500);
        tsdb.tick(300);
        assert_eq!(tsdb.write_frontier(), Some(500));
    }
}
