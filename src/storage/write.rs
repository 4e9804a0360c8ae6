//! Ingestion core
//!
//! Batches of write events are staged per group, bound to series
//! identities, and appended to the right (segment, shard) tables in one
//! shot. Index documents ride alongside: a metadata document per series so
//! queries can resolve series by tag predicates, and full documents for
//! index-mode resources, whose payload never touches a table.
//!
//! Error isolation is per event: a failing event discards only its group's
//! staged state and the batch keeps going. At commit time, table appends
//! run before index writes, so a series visible in the index always has its
//! data visible too. Index write failures are logged and flagged for
//! reconciliation, never surfaced.

use crate::index::{
    FieldKey, IndexDocument, IndexField, INDEX_MODE_ENTITY_TAG_PREFIX, SUBJECT_FIELD_NAME,
};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{ResourceKind, ResourceSchema};
use crate::storage::segment::Segment;
use crate::storage::series::Series;
use crate::storage::table::{ColumnBatch, ShardId, TsTable};
use crate::storage::tsdb::Tsdb;
use crate::storage::types::{check_timestamp, encode_value, NameValues, TimeRange, Value};
use crate::storage::Engine;
use std::collections::HashMap;
use std::sync::Arc;

/// One write event, typed at ingress.
///
/// `tag_families` and `fields` are positional against the resource schema;
/// short vectors are padded with nulls, longer ones fail the event.
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub group: String,
    pub resource: String,
    pub shard_id: ShardId,
    pub entity_values: Vec<Value>,
    /// Nanoseconds.
    pub timestamp: i64,
    pub version: i64,
    pub tag_families: Vec<Vec<Value>>,
    pub fields: Vec<Value>,
}

/// A failed event, reported positionally against the input batch.
#[derive(Debug)]
pub struct EventError {
    pub index: usize,
    pub error: StorageError,
}

/// A group whose staged data could not be committed.
#[derive(Debug)]
pub struct GroupError {
    pub group: String,
    pub error: StorageError,
}

/// Result of one batch: per-event failures plus per-group commit failures.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Events staged and committed. A group whose commit fails gives its
    /// staged events back to this count as rejected.
    pub accepted: usize,
    pub event_errors: Vec<EventError>,
    pub group_errors: Vec<GroupError>,
}

impl BatchOutcome {
    pub fn fully_applied(&self) -> bool {
        self.event_errors.is_empty() && self.group_errors.is_empty()
    }
}

/// Rows staged for one (segment window, shard) pair.
struct TableBatch {
    time_range: TimeRange,
    shard: ShardId,
    table: Arc<TsTable>,
    batch: ColumnBatch,
}

/// Everything staged for one group within the current batch.
struct GroupBatch {
    tsdb: Arc<Tsdb>,
    latest_ts: i64,
    segments: Vec<Arc<Segment>>,
    tables: Vec<TableBatch>,
    metadata_docs: Vec<IndexDocument>,
    index_mode_docs: Vec<IndexDocument>,
    /// Events staged into this group, charged back to the batch outcome
    /// if the group's commit fails.
    staged_events: usize,
}

impl GroupBatch {
    fn new(tsdb: Arc<Tsdb>) -> Self {
        Self {
            tsdb,
            latest_ts: i64::MIN,
            segments: Vec::new(),
            tables: Vec::new(),
            metadata_docs: Vec::new(),
            index_mode_docs: Vec::new(),
            staged_events: 0,
        }
    }

    /// The staged segment containing `ts`, resolved lazily per batch.
    fn segment_for(&mut self, ts: i64) -> StorageResult<Arc<Segment>> {
        if let Some(seg) = self
            .segments
            .iter()
            .find(|s| s.time_range().contains(ts))
        {
            return Ok(Arc::clone(seg));
        }
        let segment = self.tsdb.segment_for(ts)?;
        self.segments.push(Arc::clone(&segment));
        Ok(segment)
    }
}

/// Stage and commit one batch of write events.
pub(crate) fn process_batch(engine: &Engine, events: &[WriteEvent]) -> StorageResult<BatchOutcome> {
    engine.disk().check()?;

    let mut groups: HashMap<String, GroupBatch> = HashMap::new();
    let mut outcome = BatchOutcome::default();

    for (index, event) in events.iter().enumerate() {
        if let Err(error) = stage_event(engine, &mut groups, event) {
            tracing::warn!(
                group = %event.group,
                resource = %event.resource,
                index = index,
                error = %error,
                "cannot handle write event"
            );
            groups.remove(&event.group);
            outcome.event_errors.push(EventError { index, error });
        }
    }
    outcome.accepted = events.len() - outcome.event_errors.len();

    commit(groups, &mut outcome);
    Ok(outcome)
}

fn stage_event(
    engine: &Engine,
    groups: &mut HashMap<String, GroupBatch>,
    event: &WriteEvent,
) -> StorageResult<()> {
    check_timestamp(event.timestamp)?;
    let ts = event.timestamp;

    let tsdb = engine.tsdb(&event.group)?;
    let gb = groups
        .entry(event.group.clone())
        .or_insert_with(|| GroupBatch::new(tsdb));
    if gb.latest_ts < ts {
        gb.latest_ts = ts;
    }

    let schema = engine.registry().resource(&event.group, &event.resource)?;

    if event.tag_families.is_empty() {
        return Err(StorageError::NoTagFamily(format!(
            "{}/{}",
            event.group, event.resource
        )));
    }
    if event.tag_families.len() > schema.tag_families.len() {
        return Err(StorageError::SchemaMismatch(format!(
            "{}/{} has {} tag families, schema declares {}",
            event.group,
            event.resource,
            event.tag_families.len(),
            schema.tag_families.len()
        )));
    }

    let series = Series::bind(event.resource.clone(), event.entity_values.clone())?;

    let (tag_families, fields) = handle_tag_families(&schema, event)?;

    if schema.index_mode {
        let fields = append_entity_tags_to_index_fields(fields, &schema, &series)?;
        gb.segment_for(ts)?;
        gb.index_mode_docs.push(IndexDocument {
            doc_id: series.id().0,
            entity_values: series.buffer().to_vec(),
            fields,
            version: event.version,
            timestamp: ts,
        });
        gb.staged_events += 1;
        return Ok(());
    }

    let field_values = encode_fields(&schema, event)?;

    let pos = gb
        .tables
        .iter()
        .position(|t| t.time_range.contains(ts) && t.shard == event.shard_id);
    let pos = match pos {
        Some(pos) => pos,
        None => {
            let segment = gb.segment_for(ts)?;
            let table = segment.table_for(event.shard_id)?;
            gb.tables.push(TableBatch {
                time_range: segment.time_range(),
                shard: event.shard_id,
                table,
                batch: ColumnBatch::default(),
            });
            gb.tables.len() - 1
        }
    };
    let table_batch = &mut gb.tables[pos];

    let doc = IndexDocument {
        doc_id: series.id().0,
        entity_values: series.buffer().to_vec(),
        fields,
        version: 0,
        timestamp: 0,
    };
    table_batch.batch.metadata_docs.push(doc.clone());
    gb.metadata_docs.push(doc);

    table_batch
        .batch
        .push_row(series.id(), ts, event.version, tag_families, field_values);
    gb.staged_events += 1;
    Ok(())
}

/// Route every declared tag: into the index (rule or index-mode), dropped
/// (entity or indexed-only), or into the row's tag-family payload.
fn handle_tag_families(
    schema: &ResourceSchema,
    event: &WriteEvent,
) -> StorageResult<(Vec<NameValues>, Vec<IndexField>)> {
    let mut tag_families = Vec::with_capacity(schema.tag_families.len());
    let mut fields = Vec::new();

    for (i, family_spec) in schema.tag_families.iter().enumerate() {
        let written = event.tag_families.get(i);
        let mut family = NameValues {
            name: family_spec.name.clone(),
            values: Vec::new(),
        };

        for (j, tag_spec) in family_spec.tags.iter().enumerate() {
            let value = written
                .and_then(|f| f.get(j))
                .unwrap_or(&Value::Null);
            let cell = encode_value(&tag_spec.name, tag_spec.tag_type, value)?;

            let rule = schema.rule_for(&tag_spec.name);
            if rule.is_some() || schema.index_mode {
                let key = match rule {
                    Some(r) => FieldKey::Rule {
                        rule_id: r.id,
                        analyzer: r.analyzer.clone(),
                    },
                    None => FieldKey::Tag(tag_spec.name.clone()),
                };
                // Index-mode tags without a rule are stored but not indexed.
                let to_index = rule.is_some() || !schema.index_mode;
                let no_sort = rule.map(|r| r.no_sort).unwrap_or(false);

                if let Some(bytes) = cell.value {
                    fields.push(IndexField {
                        key,
                        value: Some(bytes),
                        index: to_index,
                        store: true,
                        no_sort,
                    });
                } else if let Some(arr) = cell.value_arr {
                    for bytes in arr {
                        fields.push(IndexField {
                            key: key.clone(),
                            value: Some(bytes),
                            index: to_index,
                            store: true,
                            no_sort,
                        });
                    }
                }
                continue;
            }

            if tag_spec.indexed_only || schema.is_entity_tag(&tag_spec.name) {
                continue;
            }
            family.values.push(cell);
        }

        if !family.values.is_empty() {
            tag_families.push(family);
        }
    }

    Ok((tag_families, fields))
}

/// Index-mode documents additionally carry the subject and each entity tag
/// not already covered by an index rule, under a reserved prefix.
fn append_entity_tags_to_index_fields(
    mut fields: Vec<IndexField>,
    schema: &ResourceSchema,
    series: &Series,
) -> StorageResult<Vec<IndexField>> {
    let mut subject = IndexField::string(
        FieldKey::Tag(SUBJECT_FIELD_NAME.to_string()),
        series.subject(),
    );
    subject.no_sort = true;
    fields.push(subject);

    for (i, tag_name) in schema.entity_tag_names.iter().enumerate() {
        if schema.rule_for(tag_name).is_some() {
            continue;
        }
        let spec = schema.tag_spec(tag_name).ok_or_else(|| {
            StorageError::SchemaMismatch(format!(
                "entity tag \"{}\" is not declared in any tag family",
                tag_name
            ))
        })?;
        let value = series.entity_values().get(i).unwrap_or(&Value::Null);
        let cell = encode_value(tag_name, spec.tag_type, value)?;
        if let Some(bytes) = cell.value {
            let mut field = IndexField::bytes(
                FieldKey::Tag(format!("{}{}", INDEX_MODE_ENTITY_TAG_PREFIX, tag_name)),
                bytes,
            );
            field.no_sort = true;
            fields.push(field);
        }
    }
    Ok(fields)
}

/// Encode the field column group, padding missing trailing fields with
/// null cells so every row carries the schema's full field count.
fn encode_fields(schema: &ResourceSchema, event: &WriteEvent) -> StorageResult<NameValues> {
    if schema.kind == ResourceKind::Stream && !event.fields.is_empty() {
        return Err(StorageError::SchemaMismatch(format!(
            "stream {}/{} cannot carry fields",
            event.group, event.resource
        )));
    }

    let mut values = Vec::with_capacity(schema.fields.len());
    for (i, spec) in schema.fields.iter().enumerate() {
        let value = event.fields.get(i).unwrap_or(&Value::Null);
        values.push(encode_value(&spec.name, spec.field_type, value)?);
    }
    Ok(NameValues {
        name: String::new(),
        values,
    })
}

/// Apply staged state: table appends first, then per-segment index writes,
/// then the group clock. Index failures are logged and flagged, never
/// rolled back, and never surfaced to the client. An append failure
/// abandons the group and charges its staged events back as rejected.
fn commit(groups: HashMap<String, GroupBatch>, outcome: &mut BatchOutcome) {
    for (group, gb) in groups {
        let staged_events = gb.staged_events;
        let mut append_failed = false;
        for tb in gb.tables {
            if tb.batch.is_empty() {
                continue;
            }
            if let Err(error) = tb.table.append(tb.batch) {
                tracing::error!(
                    group = %group,
                    shard = tb.shard,
                    error = %error,
                    "cannot append data points"
                );
                outcome.group_errors.push(GroupError { group: group.clone(), error });
                append_failed = true;
                break;
            }
        }
        if append_failed {
            outcome.accepted = outcome.accepted.saturating_sub(staged_events);
            continue;
        }

        for segment in &gb.segments {
            if !gb.metadata_docs.is_empty() {
                if let Err(error) = segment.index().insert(gb.metadata_docs.clone()) {
                    tracing::error!(group = %group, error = %error, "cannot write metadata");
                    segment.mark_index_dirty();
                }
            }
            if !gb.index_mode_docs.is_empty() {
                if let Err(error) = segment.index().update(gb.index_mode_docs.clone()) {
                    tracing::error!(group = %group, error = %error, "cannot write index");
                    segment.mark_index_dirty();
                }
            }
        }

        gb.tsdb.tick(gb.latest_ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{
        FieldSpec, GroupSchema, IndexRule, TagFamilySpec, TagSpec,
    };
    use crate::storage::types::ValueType;
    use crate::storage::{Engine, EngineConfig};
    use tempfile::tempdir;

    const HOUR: i64 = 3_600_000_000_000;

    fn test_engine(dir: &std::path::Path) -> Engine {
        let engine = Engine::open(EngineConfig::new(dir)).unwrap();
        engine
            .define_group(GroupSchema::new("metrics", 2, HOUR))
            .unwrap();
        engine
            .define_resource(
                ResourceSchema::measure("metrics", "cpu_usage")
                    .with_tag_family(TagFamilySpec::new(
                        "default",
                        vec![
                            TagSpec::new("service", ValueType::Str),
                            TagSpec::new("host", ValueType::Str),
                            TagSpec::new("env", ValueType::Str),
                        ],
                    ))
                    .with_field(FieldSpec::new("value", ValueType::Int64))
                    .with_entity(vec!["service", "host"])
                    .with_index_rule(IndexRule::new(1, "env")),
            )
            .unwrap();
        engine
    }

    fn event(ts: i64, shard: ShardId, host: &str, value: i64) -> WriteEvent {
        WriteEvent {
            group: "metrics".to_string(),
            resource: "cpu_usage".to_string(),
            shard_id: shard,
            entity_values: vec![Value::Str("svc1".into()), Value::Str(host.into())],
            timestamp: ts,
            version: 1,
            tag_families: vec![vec![
                Value::Str("svc1".into()),
                Value::Str(host.into()),
                Value::Str("prod".into()),
            ]],
            fields: vec![Value::Int64(value)],
        }
    }

    #[test]
    fn test_write_appends_rows_and_metadata() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());

        let outcome = engine
            .write_batch(vec![event(1000, 0, "host1", 42)])
            .unwrap();
        assert!(outcome.fully_applied());
        assert_eq!(outcome.accepted, 1);

        let tsdb = engine.tsdb("metrics").unwrap();
        assert_eq!(tsdb.row_count(), 1);
        assert_eq!(tsdb.write_frontier(), Some(1000));

        let segment = tsdb.segment_for(1000).unwrap();
        // Metadata doc resolves the series by its indexed tag.
        assert_eq!(
            segment
                .index()
                .search(
                    &FieldKey::Rule {
                        rule_id: 1,
                        analyzer: None
                    },
                    b"prod"
                )
                .len(),
            1
        );

        // Entity tags are dropped from the columnar payload.
        let blocks = segment.table_for(0).unwrap().blocks();
        let families = &blocks[0].data.tag_families[0];
        assert!(families.is_empty(), "entity and indexed tags stay out of the row");
    }

    #[test]
    fn test_rows_fan_out_across_shards_and_segments() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());

        let outcome = engine
            .write_batch(vec![
                event(1000, 0, "host1", 1),
                event(2000, 1, "host2", 2),
                event(HOUR + 5, 0, "host1", 3),
            ])
            .unwrap();
        assert!(outcome.fully_applied());

        let tsdb = engine.tsdb("metrics").unwrap();
        assert_eq!(tsdb.segment_count(), 2);
        assert_eq!(tsdb.row_count(), 3);
        assert_eq!(tsdb.write_frontier(), Some(HOUR + 5));
    }

    #[test]
    fn test_event_failure_discards_group_but_batch_continues() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());

        let bad_ts = WriteEvent {
            timestamp: i64::MAX,
            ..event(0, 0, "host1", 0)
        };
        let outcome = engine
            .write_batch(vec![event(1000, 0, "host1", 1), bad_ts, event(2000, 0, "host1", 2)])
            .unwrap();

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.event_errors.len(), 1);
        assert_eq!(outcome.event_errors[0].index, 1);
        assert!(matches!(
            outcome.event_errors[0].error,
            StorageError::BadTimestamp(_)
        ));

        // The failing event discarded rows staged before it for the group;
        // the event after it was staged and committed.
        let tsdb = engine.tsdb("metrics").unwrap();
        assert_eq!(tsdb.row_count(), 1);
    }

    #[test]
    fn test_unknown_group_and_resource_are_event_fatal() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());

        let mut e1 = event(1000, 0, "host1", 1);
        e1.group = "nope".to_string();
        let mut e2 = event(1000, 0, "host1", 1);
        e2.resource = "nope".to_string();

        let outcome = engine.write_batch(vec![e1, e2]).unwrap();
        assert_eq!(outcome.accepted, 0);
        assert!(matches!(
            outcome.event_errors[0].error,
            StorageError::UnknownGroup(_)
        ));
        assert!(matches!(
            outcome.event_errors[1].error,
            StorageError::UnknownResource(_)
        ));
    }

    #[test]
    fn test_tag_family_count_checks() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());

        let mut none = event(1000, 0, "host1", 1);
        none.tag_families.clear();
        let mut extra = event(1000, 0, "host1", 1);
        extra.tag_families.push(vec![Value::Str("x".into())]);

        let outcome = engine.write_batch(vec![none, extra]).unwrap();
        assert!(matches!(
            outcome.event_errors[0].error,
            StorageError::NoTagFamily(_)
        ));
        assert!(matches!(
            outcome.event_errors[1].error,
            StorageError::SchemaMismatch(_)
        ));
    }

    #[test]
    fn test_missing_field_padded_with_null() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());

        let mut e = event(1000, 0, "host1", 0);
        e.fields.clear();
        assert!(engine.write_batch(vec![e]).unwrap().fully_applied());

        let tsdb = engine.tsdb("metrics").unwrap();
        let blocks = tsdb.segment_for(1000).unwrap().table_for(0).unwrap().blocks();
        let fields = &blocks[0].data.fields[0];
        assert_eq!(fields.values.len(), 1);
        assert!(fields.values[0].is_null());
    }

    fn shard_dir(data_dir: &std::path::Path, group: &str, shard: ShardId) -> std::path::PathBuf {
        let group_dir = data_dir.join(group);
        for entry in std::fs::read_dir(group_dir).unwrap() {
            let candidate = entry.unwrap().path().join(format!("shard-{}", shard));
            if candidate.is_dir() {
                return candidate;
            }
        }
        panic!("shard directory not found");
    }

    #[test]
    fn test_append_failure_rejects_the_groups_staged_events() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());

        // Seed the segment so the shard directory exists on disk.
        assert!(engine
            .write_batch(vec![event(1000, 0, "host1", 1)])
            .unwrap()
            .fully_applied());

        // Occupy the next part slot with a directory so the append fails.
        let shard_dir = shard_dir(dir.path(), "metrics", 0);
        std::fs::create_dir(shard_dir.join("part-000001.bin")).unwrap();

        let outcome = engine
            .write_batch(vec![
                event(2000, 0, "host1", 2),
                event(3000, 0, "host1", 3),
                event(4000, 0, "host1", 4),
            ])
            .unwrap();

        // All three events staged cleanly, then the group's commit failed:
        // none of them were accepted.
        assert!(outcome.event_errors.is_empty());
        assert_eq!(outcome.group_errors.len(), 1);
        assert_eq!(outcome.group_errors[0].group, "metrics");
        assert_eq!(outcome.accepted, 0);

        // Only the seeded row is durable.
        let tsdb = engine.tsdb("metrics").unwrap();
        assert_eq!(tsdb.row_count(), 1);
    }

    #[test]
    fn test_stream_rows_have_no_fields() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(EngineConfig::new(dir.path())).unwrap();
        engine
            .define_group(GroupSchema::new("logs", 1, HOUR))
            .unwrap();
        engine
            .define_resource(
                ResourceSchema::stream("logs", "http_access")
                    .with_tag_family(TagFamilySpec::new(
                        "default",
                        vec![
                            TagSpec::new("service", ValueType::Str),
                            TagSpec::new("status", ValueType::Int64),
                        ],
                    ))
                    .with_entity(vec!["service"]),
            )
            .unwrap();

        let mut ok = WriteEvent {
            group: "logs".to_string(),
            resource: "http_access".to_string(),
            shard_id: 0,
            entity_values: vec![Value::Str("svc1".into())],
            timestamp: 1000,
            version: 1,
            tag_families: vec![vec![Value::Str("svc1".into()), Value::Int64(200)]],
            fields: vec![],
        };
        assert!(engine.write_batch(vec![ok.clone()]).unwrap().fully_applied());

        let tsdb = engine.tsdb("logs").unwrap();
        let blocks = tsdb.segment_for(1000).unwrap().table_for(0).unwrap().blocks();
        assert!(blocks[0].data.fields[0].values.is_empty());
        // The non-entity tag stays in the row payload.
        assert_eq!(blocks[0].data.tag_families[0][0].values[0].name, "status");

        // A stream event carrying fields fails the event.
        ok.fields = vec![Value::Int64(1)];
        ok.timestamp = 2000;
        let outcome = engine.write_batch(vec![ok]).unwrap();
        assert!(matches!(
            outcome.event_errors[0].error,
            StorageError::SchemaMismatch(_)
        ));
    }

    #[test]
    fn test_disk_full_is_batch_fatal() {
        let dir = tempdir().unwrap();
        let engine = Engine::open_with_probe(
            EngineConfig::new(dir.path()),
            Box::new(crate::storage::disk::FixedProbe(99)),
        )
        .unwrap();
        engine
            .define_group(GroupSchema::new("metrics", 1, HOUR))
            .unwrap();

        let err = engine.write_batch(vec![]).unwrap_err();
        assert_eq!(err.status(), Some("STATUS_DISK_FULL"));
    }

    #[test]
    fn test_index_mode_write_skips_table() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(EngineConfig::new(dir.path())).unwrap();
        engine
            .define_group(GroupSchema::new("meta", 1, HOUR))
            .unwrap();
        engine
            .define_resource(
                ResourceSchema::measure("meta", "endpoints")
                    .with_tag_family(TagFamilySpec::new(
                        "default",
                        vec![
                            TagSpec::new("service", ValueType::Str),
                            TagSpec::new("env", ValueType::Str),
                        ],
                    ))
                    .with_entity(vec!["service"])
                    .in_index_mode(),
            )
            .unwrap();

        let outcome = engine
            .write_batch(vec![WriteEvent {
                group: "meta".to_string(),
                resource: "endpoints".to_string(),
                shard_id: 0,
                entity_values: vec![Value::Str("svc1".into())],
                timestamp: 1000,
                version: 3,
                tag_families: vec![vec![Value::Str("svc1".into()), Value::Str("prod".into())]],
                fields: vec![],
            }])
            .unwrap();
        assert!(outcome.fully_applied());

        let tsdb = engine.tsdb("meta").unwrap();
        let segment = tsdb.segment_for(1000).unwrap();

        // No table row was appended.
        assert_eq!(segment.row_count(), 0);

        // One document with the tag, the subject, and the prefixed entity tag.
        assert_eq!(segment.index().len(), 1);
        let series = Series::bind("endpoints", vec![Value::Str("svc1".into())]).unwrap();
        let doc = segment.index().doc(series.id().0).unwrap();
        assert_eq!(doc.version, 3);
        assert_eq!(doc.timestamp, 1000);

        // Index-mode tags without rules are stored but not searchable.
        assert!(segment
            .index()
            .search(&FieldKey::Tag("env".into()), b"prod")
            .is_empty());
        assert!(doc.fields.iter().any(|f| {
            f.key == FieldKey::Tag("env".to_string()) && f.value.as_deref() == Some(b"prod")
        }));

        assert_eq!(
            segment
                .index()
                .search(&FieldKey::Tag(SUBJECT_FIELD_NAME.into()), b"endpoints"),
            vec![series.id().0]
        );
        let prefixed = format!("{}service", INDEX_MODE_ENTITY_TAG_PREFIX);
        assert_eq!(
            segment.index().search(&FieldKey::Tag(prefixed), b"svc1"),
            vec![series.id().0]
        );
    }
}
