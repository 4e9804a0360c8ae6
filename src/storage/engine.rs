//! Strata storage engine facade
//!
//! The engine owns the schema registry, one TSDB per group, and the disk
//! admission gauge. Handlers talk to it for writes and schema definition;
//! the query executor reaches through it for segments and indexes.

use crate::index::{FieldKey, IndexDocument};
use crate::storage::disk::{DirUsageProbe, DiskGauge, UsageProbe};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{GroupSchema, ResourceSchema, SchemaRegistry};
use crate::storage::tsdb::Tsdb;
use crate::storage::types::{encode_value, TimeRange, Value};
use crate::storage::write::{self, BatchOutcome, WriteEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for the storage engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for all data
    pub data_dir: PathBuf,
    /// Refuse writes above this disk usage percentage (0 = read-only)
    pub max_disk_usage_percent: u8,
    /// Capacity the default usage probe measures against
    pub disk_capacity_bytes: u64,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_disk_usage_percent: 95,
            disk_capacity_bytes: 64 * 1024 * 1024 * 1024, // 64 GiB
        }
    }
}

/// The strata storage engine.
pub struct Engine {
    config: EngineConfig,
    registry: SchemaRegistry,
    tsdbs: RwLock<HashMap<String, Arc<Tsdb>>>,
    disk: Arc<DiskGauge>,
}

impl Engine {
    /// Open the engine, loading registered groups and their segments.
    pub fn open(config: EngineConfig) -> StorageResult<Self> {
        let probe = DirUsageProbe::new(&config.data_dir, config.disk_capacity_bytes);
        Self::open_with_probe(config, Box::new(probe))
    }

    /// Open with a caller-supplied disk usage probe.
    pub fn open_with_probe(
        config: EngineConfig,
        probe: Box<dyn UsageProbe>,
    ) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let registry = SchemaRegistry::load(&config.data_dir)?;
        let disk = Arc::new(DiskGauge::new(config.max_disk_usage_percent, probe));

        let mut tsdbs = HashMap::new();
        for name in registry.group_names() {
            let schema = registry.group(&name)?;
            tsdbs.insert(name, Arc::new(Tsdb::open(schema, &config.data_dir)?));
        }
        tracing::info!(
            data_dir = %config.data_dir.display(),
            groups = tsdbs.len(),
            "opened storage engine"
        );

        Ok(Self {
            config,
            registry,
            tsdbs: RwLock::new(tsdbs),
            disk,
        })
    }

    /// Register a group and open its TSDB.
    pub fn define_group(&self, group: GroupSchema) -> StorageResult<Arc<Tsdb>> {
        let schema = self.registry.register_group(group)?;
        let tsdb = Arc::new(Tsdb::open(Arc::clone(&schema), &self.config.data_dir)?);
        self.tsdbs
            .write()
            .insert(schema.name.clone(), Arc::clone(&tsdb));
        Ok(tsdb)
    }

    /// Register a measure or stream in an existing group.
    pub fn define_resource(&self, resource: ResourceSchema) -> StorageResult<Arc<ResourceSchema>> {
        self.registry.register_resource(resource)
    }

    /// The TSDB owning `group`.
    pub fn tsdb(&self, group: &str) -> StorageResult<Arc<Tsdb>> {
        self.tsdbs
            .read()
            .get(group)
            .cloned()
            .ok_or_else(|| StorageError::UnknownGroup(group.to_string()))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub(crate) fn disk(&self) -> &DiskGauge {
        &self.disk
    }

    /// Shared admission gauge, for sibling stores under the same roof.
    pub fn disk_gauge(&self) -> Arc<DiskGauge> {
        Arc::clone(&self.disk)
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Ingest a batch of write events. See [`write::BatchOutcome`] for the
    /// per-event and per-group error report.
    pub fn write_batch(&self, events: Vec<WriteEvent>) -> StorageResult<BatchOutcome> {
        write::process_batch(self, &events)
    }

    /// Search a resource's index documents by exact tag matches over a
    /// time range. This is the read path for index-mode resources.
    ///
    /// One batch replicates its documents into every segment it touches,
    /// so a multi-segment range can surface the same doc id several
    /// times; results are deduplicated here, keeping the newest
    /// (version, timestamp) copy.
    pub fn index_search(
        &self,
        group: &str,
        resource: &str,
        terms: &[(String, Value)],
        range: TimeRange,
    ) -> StorageResult<Vec<IndexDocument>> {
        let schema = self.registry.resource(group, resource)?;
        let tsdb = self.tsdb(group)?;

        let mut best: HashMap<u64, IndexDocument> = HashMap::new();
        for segment in tsdb.segments_for(&range) {
            let mut candidates: Option<Vec<u64>> = None;
            for (tag, value) in terms {
                let key = index_key_for(&schema, tag);
                let spec = schema.tag_spec(tag).ok_or_else(|| {
                    StorageError::SchemaMismatch(format!("unknown tag \"{}\"", tag))
                })?;
                let encoded = encode_value(tag, spec.tag_type, value)?;
                let Some(bytes) = encoded.value else {
                    return Err(StorageError::SchemaMismatch(format!(
                        "tag \"{}\" predicate has no scalar value",
                        tag
                    )));
                };
                let ids = segment.index().search(&key, &bytes);
                candidates = Some(match candidates {
                    None => ids,
                    Some(prev) => prev.into_iter().filter(|id| ids.contains(id)).collect(),
                });
            }

            for id in candidates.unwrap_or_default() {
                if let Some(doc) = segment.index().doc(id) {
                    let newer = match best.get(&doc.doc_id) {
                        Some(stored) => {
                            (doc.version, doc.timestamp) > (stored.version, stored.timestamp)
                        }
                        None => true,
                    };
                    if newer {
                        best.insert(doc.doc_id, doc);
                    }
                }
            }
        }
        Ok(best.into_values().collect())
    }

    /// Engine-level statistics.
    pub fn stats(&self) -> EngineStats {
        let tsdbs = self.tsdbs.read();
        EngineStats {
            group_count: tsdbs.len(),
            segment_count: tsdbs.values().map(|t| t.segment_count()).sum(),
            row_count: tsdbs.values().map(|t| t.row_count()).sum(),
        }
    }
}

/// The posting-list key a tag predicate resolves to: its index rule when
/// one exists, the prefixed entity entry for index-mode entity tags, or
/// the bare tag name.
pub(crate) fn index_key_for(schema: &ResourceSchema, tag: &str) -> FieldKey {
    if let Some(rule) = schema.rule_for(tag) {
        return FieldKey::Rule {
            rule_id: rule.id,
            analyzer: rule.analyzer.clone(),
        };
    }
    if schema.index_mode && schema.is_entity_tag(tag) {
        return FieldKey::Tag(format!(
            "{}{}",
            crate::index::INDEX_MODE_ENTITY_TAG_PREFIX,
            tag
        ));
    }
    FieldKey::Tag(tag.to_string())
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub group_count: usize,
    pub segment_count: usize,
    pub row_count: usize,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Groups: {}, Segments: {}, Rows: {}",
            self.group_count, self.segment_count, self.row_count
        )
    }
}
