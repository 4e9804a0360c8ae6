//! Block cursors
//!
//! A cursor reads one series out of one committed block: rows are filtered
//! by the query's time range, sorted by timestamp, projected, and
//! positioned at one row at a time for the heap merge.
//!
//! Entity tags are not stored in tables, so projected entity tags are
//! synthesized here by replicating the series' entity value across the
//! cursor's rows. A projected family absent from the block materializes
//! with null tags, pre-allocated at projection size.

use crate::query::{QueryOptions, QueryRow};
use crate::storage::error::StorageResult;
use crate::storage::series::SeriesId;
use crate::storage::table::Block;
use crate::storage::types::{encode_value, NameValue, NameValues, ValueType};

/// Worker-owned scratch for row ordering, reused across cursor loads.
#[derive(Default)]
pub(crate) struct ScanScratch {
    order: Vec<(i64, usize)>,
}

/// A positioned reader over one series' rows within one block.
pub(crate) struct BlockCursor {
    timestamps: Vec<i64>,
    rows: Vec<Option<QueryRow>>,
    pub idx: isize,
}

impl BlockCursor {
    /// Decode `series_id`'s rows from `block`. Returns `None` when the
    /// block holds no matching rows in range.
    pub fn load(
        block: &Block,
        series_id: SeriesId,
        qo: &QueryOptions,
        scratch: &mut ScanScratch,
    ) -> StorageResult<Option<BlockCursor>> {
        scratch.order.clear();
        for (i, &ts) in block.data.timestamps.iter().enumerate() {
            if block.data.series_ids[i] == series_id && qo.time_range.contains(ts) {
                scratch.order.push((ts, i));
            }
        }
        if scratch.order.is_empty() {
            return Ok(None);
        }
        scratch.order.sort_unstable();

        let mut timestamps = Vec::with_capacity(scratch.order.len());
        let mut rows = Vec::with_capacity(scratch.order.len());
        for &(ts, i) in &scratch.order {
            timestamps.push(ts);
            rows.push(Some(QueryRow {
                series_id,
                timestamp: ts,
                version: block.data.versions[i],
                tag_families: project_tag_families(block, i, series_id, qo)?,
                fields: project_fields(block, i, qo),
            }));
        }

        Ok(Some(BlockCursor {
            timestamps,
            rows,
            idx: 0,
        }))
    }

    /// Build a cursor over rows already sorted ascending by timestamp.
    pub fn from_rows(rows: Vec<QueryRow>) -> Option<BlockCursor> {
        if rows.is_empty() {
            return None;
        }
        let timestamps = rows.iter().map(|r| r.timestamp).collect();
        Some(BlockCursor {
            timestamps,
            rows: rows.into_iter().map(Some).collect(),
            idx: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn current_ts(&self) -> i64 {
        self.timestamps[self.idx as usize]
    }

    /// Move the current row out of the cursor.
    pub fn take_current(&mut self) -> Option<QueryRow> {
        self.rows[self.idx as usize].take()
    }

    /// Step one row in query order. Returns whether the cursor still has
    /// a current row.
    pub fn advance(&mut self, asc: bool) -> bool {
        self.idx += if asc { 1 } else { -1 };
        self.idx >= 0 && (self.idx as usize) < self.timestamps.len()
    }
}

/// Apply the tag projection to one stored row.
///
/// With no projection the row's stored families pass through unchanged.
/// Otherwise each projected family gets its tag vector allocated at
/// projection size up front, then filled from storage, from the entity
/// tuple, or left null.
fn project_tag_families(
    block: &Block,
    row: usize,
    series_id: SeriesId,
    qo: &QueryOptions,
) -> StorageResult<Vec<NameValues>> {
    let stored = &block.data.tag_families[row];
    if qo.tag_projection.is_empty() {
        return Ok(stored.clone());
    }

    let entity_values = qo.series_to_entity.get(&series_id);
    let mut out = Vec::with_capacity(qo.tag_projection.len());
    for proj in &qo.tag_projection {
        let stored_family = stored.iter().find(|f| f.name == proj.family);
        let mut values: Vec<NameValue> = proj
            .tags
            .iter()
            .map(|tag| {
                let ty = qo
                    .schema
                    .tag_spec(tag)
                    .map(|s| s.tag_type)
                    .unwrap_or(ValueType::Str);
                NameValue::null(tag.clone(), ty)
            })
            .collect();

        for (j, tag) in proj.tags.iter().enumerate() {
            let Some(spec) = qo.schema.tag_spec(tag) else {
                continue;
            };
            if spec.indexed_only {
                continue;
            }
            if let Some(position) = qo.schema.entity_position(tag) {
                if let Some(value) = entity_values.and_then(|ev| ev.get(position)) {
                    values[j] = encode_value(tag, spec.tag_type, value)?;
                }
                continue;
            }
            if let Some(family) = stored_family {
                if let Some(cell) = family.values.iter().find(|v| v.name == *tag) {
                    values[j] = cell.clone();
                }
            }
        }

        out.push(NameValues {
            name: proj.family.clone(),
            values,
        });
    }
    Ok(out)
}

/// Apply the field projection to one stored row. Empty projection keeps
/// every field.
fn project_fields(block: &Block, row: usize, qo: &QueryOptions) -> Vec<NameValue> {
    let stored = &block.data.fields[row].values;
    if qo.field_projection.is_empty() {
        return stored.clone();
    }
    qo.field_projection
        .iter()
        .filter_map(|name| stored.iter().find(|v| v.name == *name).cloned())
        .collect()
}
