//! Strata Query Engine
//!
//! The time-ordered read path:
//!
//! - **scan**: per-segment block scanner feeding a bounded channel
//! - **cursor**: decoded per-series block cursors with entity synthesis
//! - **merge**: k-way time-ordered merge with early termination
//! - **executor**: worker-parallel execution across segments
//! - **error**: error types
//!
//! # Execution Pipeline
//!
//! ```text
//! request → resolve series per group → segments in time order
//!         → scanner fans block batches to workers
//!         → per-worker heap merge, bounded buffers
//!         → final k-way reduce → ordered, limited result
//! ```

mod cursor;
mod error;
mod executor;
mod merge;
mod scan;

pub use error::{QueryError, QueryResult};
pub use executor::QueryExecutor;

use crate::storage::engine::index_key_for;
use crate::storage::schema::ResourceSchema;
use crate::storage::segment::Segment;
use crate::storage::series::{Series, SeriesId};
use crate::storage::types::{encode_value, NameValue, NameValues, TimeRange, Value};
use crate::storage::StorageError;
use std::collections::HashMap;
use std::sync::Arc;

/// One position of a series matcher: a concrete entity value or a wildcard.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityTerm {
    Value(Value),
    Any,
}

/// Matches series by their entity tuple. An empty matcher list in the
/// request matches every series of the queried resource.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMatcher {
    pub entity: Vec<EntityTerm>,
}

impl SeriesMatcher {
    /// Match the exact entity tuple.
    pub fn exact(values: Vec<Value>) -> Self {
        Self {
            entity: values.into_iter().map(EntityTerm::Value).collect(),
        }
    }

    fn matches(&self, entity_values: &[Value]) -> bool {
        if self.entity.len() != entity_values.len() {
            return false;
        }
        self.entity
            .iter()
            .zip(entity_values)
            .all(|(term, value)| match term {
                EntityTerm::Any => true,
                EntityTerm::Value(v) => v == value,
            })
    }
}

/// Conjunction of exact tag matches, evaluated via the segment index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagPredicate {
    pub terms: Vec<(String, Value)>,
}

/// Requested tags of one tag family.
#[derive(Debug, Clone, PartialEq)]
pub struct TagFamilyProjection {
    pub family: String,
    pub tags: Vec<String>,
}

/// A time-ordered query over one resource across one or more groups.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub groups: Vec<String>,
    pub resource: String,
    pub series: Vec<SeriesMatcher>,
    pub time_range: TimeRange,
    pub predicate: Option<TagPredicate>,
    /// Empty projection returns each row's stored tag families.
    pub tag_projection: Vec<TagFamilyProjection>,
    /// Empty projection returns all fields.
    pub field_projection: Vec<String>,
    pub max_element_size: usize,
    pub asc: bool,
}

impl QueryRequest {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            groups: vec![group.into()],
            resource: resource.into(),
            series: Vec::new(),
            time_range: TimeRange::all(),
            predicate: None,
            tag_projection: Vec::new(),
            field_projection: Vec::new(),
            max_element_size: 100,
            asc: true,
        }
    }

    pub fn with_series(mut self, matcher: SeriesMatcher) -> Self {
        self.series.push(matcher);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = range;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.max_element_size = limit;
        self
    }

    pub fn descending(mut self) -> Self {
        self.asc = false;
        self
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub series_id: SeriesId,
    pub timestamp: i64,
    pub version: i64,
    pub tag_families: Vec<NameValues>,
    pub fields: Vec<NameValue>,
}

/// An ordered, bounded query result.
#[derive(Debug, Default)]
pub struct QueryResponse {
    pub rows: Vec<QueryRow>,
}

impl QueryResponse {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }
}

/// Resolved scan parameters shared by the scanner, cursors, and workers.
pub(crate) struct QueryOptions {
    pub time_range: TimeRange,
    pub tag_projection: Vec<TagFamilyProjection>,
    pub field_projection: Vec<String>,
    pub max_element_size: usize,
    pub asc: bool,
    /// Resolved series, carrying the entity values the scanner synthesizes
    /// for projected entity tags (they are not stored in tables).
    pub series_to_entity: HashMap<SeriesId, Vec<Value>>,
    pub schema: Arc<ResourceSchema>,
}

/// Intersect one segment's series index with the request's matchers and
/// predicate, accumulating `SeriesId → entityValues`.
///
/// Entity values are re-checked from the document's canonical buffer; the
/// series hash is never trusted on its own.
pub(crate) fn resolve_series_in_segment(
    segment: &Segment,
    schema: &ResourceSchema,
    request: &QueryRequest,
    out: &mut HashMap<SeriesId, Vec<Value>>,
) -> QueryResult<()> {
    let mut allowed: Option<Vec<u64>> = None;
    if let Some(predicate) = &request.predicate {
        for (tag, value) in &predicate.terms {
            let spec = schema.tag_spec(tag).ok_or_else(|| {
                StorageError::SchemaMismatch(format!("unknown predicate tag \"{}\"", tag))
            })?;
            let encoded = encode_value(tag, spec.tag_type, value)?;
            let bytes = encoded.value.ok_or_else(|| {
                StorageError::SchemaMismatch(format!(
                    "predicate tag \"{}\" has no scalar value",
                    tag
                ))
            })?;
            let ids = segment.index().search(&index_key_for(schema, tag), &bytes);
            allowed = Some(match allowed {
                None => ids,
                Some(prev) => prev.into_iter().filter(|id| ids.contains(id)).collect(),
            });
        }
    }

    for doc in segment.index().all_docs() {
        if let Some(allowed) = &allowed {
            if !allowed.contains(&doc.doc_id) {
                continue;
            }
        }
        let Ok((subject, entity_values)) = Series::unmarshal(&doc.entity_values) else {
            continue;
        };
        if subject != schema.name {
            continue;
        }
        if !request.series.is_empty()
            && !request.series.iter().any(|m| m.matches(&entity_values))
        {
            continue;
        }
        out.insert(SeriesId(doc.doc_id), entity_values);
    }
    Ok(())
}
