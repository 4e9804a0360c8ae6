//! Schema registry
//!
//! Groups are namespaces that own one TSDB each; resources (measures and
//! streams) are the record families written into a group. The registry is
//! the single lookup point for both and persists to a JSON file under the
//! data directory's `meta/` folder.
//!
//! The write path never holds a reference back into the registry while it
//! stages data: every lookup hands out an `Arc` snapshot of the schema.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::ValueType;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Namespace owning one TSDB instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSchema {
    pub name: String,
    /// Number of shards writes are spread across.
    pub shard_count: u32,
    /// Width of one time segment, nanoseconds.
    pub segment_interval: i64,
}

impl GroupSchema {
    pub fn new(name: impl Into<String>, shard_count: u32, segment_interval: i64) -> Self {
        Self {
            name: name.into(),
            shard_count: shard_count.max(1),
            segment_interval: segment_interval.max(1),
        }
    }
}

/// Whether a resource carries numeric fields (measure) or only tags (stream).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Measure,
    Stream,
}

/// Declaration of one tag within a tag family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagSpec {
    pub name: String,
    pub tag_type: ValueType,
    /// Indexed-only tags are searchable but never stored in the table.
    #[serde(default)]
    pub indexed_only: bool,
}

impl TagSpec {
    pub fn new(name: impl Into<String>, tag_type: ValueType) -> Self {
        Self {
            name: name.into(),
            tag_type,
            indexed_only: false,
        }
    }

    pub fn indexed_only(mut self) -> Self {
        self.indexed_only = true;
        self
    }
}

/// A named group of tags stored as one column group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagFamilySpec {
    pub name: String,
    pub tags: Vec<TagSpec>,
}

impl TagFamilySpec {
    pub fn new(name: impl Into<String>, tags: Vec<TagSpec>) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }
}

/// Declaration of one numeric field (measures only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: ValueType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: ValueType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Secondary-index rule attached to one tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRule {
    pub id: u32,
    pub tag: String,
    #[serde(default)]
    pub analyzer: Option<String>,
    #[serde(default)]
    pub no_sort: bool,
}

impl IndexRule {
    pub fn new(id: u32, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            analyzer: None,
            no_sort: false,
        }
    }
}

/// Schema of one measure or stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSchema {
    pub name: String,
    pub group: String,
    pub kind: ResourceKind,
    pub tag_families: Vec<TagFamilySpec>,
    /// Empty for streams.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Ordered tag names whose values identify the entity.
    pub entity_tag_names: Vec<String>,
    #[serde(default)]
    pub index_rules: Vec<IndexRule>,
    /// Index-mode resources keep their payload only in the inverted index.
    #[serde(default)]
    pub index_mode: bool,
}

impl ResourceSchema {
    pub fn measure(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            kind: ResourceKind::Measure,
            tag_families: Vec::new(),
            fields: Vec::new(),
            entity_tag_names: Vec::new(),
            index_rules: Vec::new(),
            index_mode: false,
        }
    }

    pub fn stream(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Stream,
            ..Self::measure(group, name)
        }
    }

    pub fn with_tag_family(mut self, family: TagFamilySpec) -> Self {
        self.tag_families.push(family);
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_entity(mut self, tag_names: Vec<&str>) -> Self {
        self.entity_tag_names = tag_names.into_iter().map(String::from).collect();
        self
    }

    pub fn with_index_rule(mut self, rule: IndexRule) -> Self {
        self.index_rules.push(rule);
        self
    }

    pub fn in_index_mode(mut self) -> Self {
        self.index_mode = true;
        self
    }

    /// The index rule covering `tag`, if any.
    pub fn rule_for(&self, tag: &str) -> Option<&IndexRule> {
        self.index_rules.iter().find(|r| r.tag == tag)
    }

    /// Position of `tag` within the entity tuple, if it is an entity tag.
    pub fn entity_position(&self, tag: &str) -> Option<usize> {
        self.entity_tag_names.iter().position(|n| n == tag)
    }

    pub fn is_entity_tag(&self, tag: &str) -> bool {
        self.entity_position(tag).is_some()
    }

    /// Find a tag declaration by name across all families.
    pub fn tag_spec(&self, tag: &str) -> Option<&TagSpec> {
        self.tag_families
            .iter()
            .flat_map(|f| f.tags.iter())
            .find(|t| t.name == tag)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryImage {
    groups: Vec<GroupSchema>,
    resources: Vec<ResourceSchema>,
}

/// Registry of groups and resources with JSON persistence.
#[derive(Debug)]
pub struct SchemaRegistry {
    path: PathBuf,
    groups: RwLock<HashMap<String, Arc<GroupSchema>>>,
    resources: RwLock<HashMap<(String, String), Arc<ResourceSchema>>>,
}

impl SchemaRegistry {
    /// Load the registry from `meta/schemas.json`, or start empty.
    pub fn load(data_dir: &Path) -> StorageResult<Self> {
        let path = data_dir.join("meta").join("schemas.json");
        let image: RegistryImage = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            RegistryImage::default()
        };

        let groups = image
            .groups
            .into_iter()
            .map(|g| (g.name.clone(), Arc::new(g)))
            .collect();
        let resources = image
            .resources
            .into_iter()
            .map(|r| ((r.group.clone(), r.name.clone()), Arc::new(r)))
            .collect();

        Ok(Self {
            path,
            groups: RwLock::new(groups),
            resources: RwLock::new(resources),
        })
    }

    fn save(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let image = RegistryImage {
            groups: self.groups.read().values().map(|g| (**g).clone()).collect(),
            resources: self
                .resources
                .read()
                .values()
                .map(|r| (**r).clone())
                .collect(),
        };
        let content = serde_json::to_string_pretty(&image)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Register (or replace) a group schema.
    pub fn register_group(&self, group: GroupSchema) -> StorageResult<Arc<GroupSchema>> {
        let schema = Arc::new(group);
        self.groups
            .write()
            .insert(schema.name.clone(), Arc::clone(&schema));
        self.save()?;
        Ok(schema)
    }

    /// Register (or replace) a resource schema. Its group must exist.
    pub fn register_resource(&self, resource: ResourceSchema) -> StorageResult<Arc<ResourceSchema>> {
        self.group(&resource.group)?;
        let schema = Arc::new(resource);
        self.resources.write().insert(
            (schema.group.clone(), schema.name.clone()),
            Arc::clone(&schema),
        );
        self.save()?;
        Ok(schema)
    }

    pub fn group(&self, name: &str) -> StorageResult<Arc<GroupSchema>> {
        self.groups
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownGroup(name.to_string()))
    }

    pub fn resource(&self, group: &str, name: &str) -> StorageResult<Arc<ResourceSchema>> {
        self.resources
            .read()
            .get(&(group.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::UnknownResource(format!("{}/{}", group, name)))
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_resource() -> ResourceSchema {
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
            .with_index_rule(IndexRule::new(1, "env"))
    }

    #[test]
    fn test_lookup_helpers() {
        let schema = sample_resource();
        assert_eq!(schema.entity_position("host"), Some(1));
        assert!(schema.is_entity_tag("service"));
        assert!(!schema.is_entity_tag("env"));
        assert_eq!(schema.rule_for("env").map(|r| r.id), Some(1));
        assert!(schema.rule_for("host").is_none());
        assert_eq!(
            schema.tag_spec("env").map(|t| t.tag_type),
            Some(ValueType::Str)
        );
    }

    #[test]
    fn test_registry_round_trip() {
        let dir = tempdir().unwrap();

        {
            let registry = SchemaRegistry::load(dir.path()).unwrap();
            registry
                .register_group(GroupSchema::new("metrics", 2, 3_600_000_000_000))
                .unwrap();
            registry.register_resource(sample_resource()).unwrap();
        }

        let registry = SchemaRegistry::load(dir.path()).unwrap();
        let group = registry.group("metrics").unwrap();
        assert_eq!(group.shard_count, 2);
        let resource = registry.resource("metrics", "cpu_usage").unwrap();
        assert_eq!(resource.fields.len(), 1);
    }

    #[test]
    fn test_unknown_lookups() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::load(dir.path()).unwrap();

        assert!(matches!(
            registry.group("nope"),
            Err(StorageError::UnknownGroup(_))
        ));
        assert!(matches!(
            registry.resource("nope", "cpu"),
            Err(StorageError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_resource_requires_group() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::load(dir.path()).unwrap();
        assert!(registry.register_resource(sample_resource()).is_err());
    }
}
