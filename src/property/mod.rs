//! Property store
//!
//! Properties are small mutable tag bags addressed by `(group, name, id)`.
//! Apply supports MERGE (union of tag sets, new wins on conflict) and
//! REPLACE (full overwrite); deletes are tombstones carrying their delete
//! time so replicas can reconcile. The store shares the engine's disk
//! admission gauge and persists as one JSON file, loaded at open.

use crate::storage::disk::DiskGauge;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use twox_hash::XxHash64;

const PROPERTY_HASH_SEED: u64 = 0x5354_5241_5441_0002;

/// How an apply reconciles with an existing property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStrategy {
    #[default]
    Merge,
    Replace,
}

/// One tag of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTag {
    pub key: String,
    pub value: Value,
}

/// A property: a tag bag addressed by `(group, name, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub group: String,
    pub name: String,
    pub id: String,
    pub tags: Vec<PropertyTag>,
    #[serde(default)]
    pub version: i64,
}

impl Property {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            id: id.into(),
            tags: Vec::new(),
            version: 0,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: Value) -> Self {
        self.tags.push(PropertyTag {
            key: key.into(),
            value,
        });
        self
    }

    /// Stable 64-bit identity of `(group, name, id)`.
    pub fn property_id(&self) -> u64 {
        property_id(&self.group, &self.name, &self.id)
    }
}

/// Hash of the length-prefixed `(group, name, id)` triple.
pub fn property_id(group: &str, name: &str, id: &str) -> u64 {
    let mut buf = Vec::with_capacity(group.len() + name.len() + id.len() + 12);
    for part in [group, name, id] {
        buf.extend_from_slice(&(part.len() as u32).to_le_bytes());
        buf.extend_from_slice(part.as_bytes());
    }
    XxHash64::oneshot(PROPERTY_HASH_SEED, &buf)
}

/// Result of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Whether the `(group, name, id)` was absent before this apply.
    pub created: bool,
    /// Number of tags stored after the apply.
    pub tags_num: u32,
}

/// Query over the property store.
#[derive(Debug, Clone, Default)]
pub struct PropertyQuery {
    pub groups: Vec<String>,
    pub name: Option<String>,
    /// Empty matches every id.
    pub ids: Vec<String>,
    /// Conjunction of exact tag matches.
    pub tags: Vec<(String, Value)>,
    /// Empty keeps every tag.
    pub tag_projection: Vec<String>,
    pub limit: usize,
}

/// Replication view: sources aligned positionally with delete times
/// (0 = live).
#[derive(Debug, Default)]
pub struct InternalQueryOutcome {
    pub sources: Vec<Property>,
    pub deletes: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredProperty {
    property: Property,
    /// Tombstone time in nanoseconds; 0 means live.
    delete_time: i64,
}

/// The property store.
pub struct PropertyStore {
    path: PathBuf,
    disk: Arc<DiskGauge>,
    inner: RwLock<HashMap<u64, StoredProperty>>,
}

impl PropertyStore {
    /// Open the store rooted under `data_dir`, loading persisted state.
    pub fn open(data_dir: &std::path::Path, disk: Arc<DiskGauge>) -> StorageResult<Self> {
        let dir = data_dir.join("property");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("properties.json");

        let inner: HashMap<u64, StoredProperty> = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let stored: Vec<StoredProperty> = serde_json::from_str(&content)?;
            stored
                .into_iter()
                .map(|s| (s.property.property_id(), s))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            disk,
            inner: RwLock::new(inner),
        })
    }

    async fn persist(&self, inner: &HashMap<u64, StoredProperty>) -> StorageResult<()> {
        let stored: Vec<&StoredProperty> = inner.values().collect();
        let content = serde_json::to_string_pretty(&stored)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Apply a property with the given strategy.
    pub async fn apply(
        &self,
        property: Property,
        strategy: ApplyStrategy,
    ) -> StorageResult<Applied> {
        self.disk.check()?;
        if property.group.is_empty() || property.name.is_empty() || property.id.is_empty() {
            return Err(StorageError::SchemaMismatch(
                "property group, name, and id must be non-empty".to_string(),
            ));
        }

        let key = property.property_id();
        let mut inner = self.inner.write().await;

        let existing = inner.get(&key).filter(|s| s.delete_time == 0);
        let created = existing.is_none();

        let Property {
            group,
            name,
            id,
            tags: new_tags,
            version,
        } = property;
        let (tags, version) = match (strategy, existing) {
            (ApplyStrategy::Merge, Some(stored)) => {
                let mut tags = stored.property.tags.clone();
                for tag in new_tags {
                    match tags.iter_mut().find(|t| t.key == tag.key) {
                        Some(slot) => slot.value = tag.value,
                        None => tags.push(tag),
                    }
                }
                (tags, version.max(stored.property.version + 1))
            }
            (ApplyStrategy::Replace, Some(stored)) => {
                (new_tags, version.max(stored.property.version + 1))
            }
            (_, None) => (new_tags, version.max(1)),
        };
        let merged = Property {
            group,
            name,
            id,
            tags,
            version,
        };

        let tags_num = merged.tags.len() as u32;
        inner.insert(
            key,
            StoredProperty {
                property: merged,
                delete_time: 0,
            },
        );
        self.persist(&inner).await?;
        Ok(Applied { created, tags_num })
    }

    /// Tombstone by `(group, name, id)`, or every live id under
    /// `(group, name)` when `id` is `None`. Returns whether anything was
    /// deleted.
    pub async fn delete(
        &self,
        group: &str,
        name: &str,
        id: Option<&str>,
        delete_time: i64,
    ) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let mut deleted = false;
        for stored in inner.values_mut() {
            if stored.delete_time != 0 {
                continue;
            }
            let p = &stored.property;
            if p.group != group || p.name != name {
                continue;
            }
            if let Some(id) = id {
                if p.id != id {
                    continue;
                }
            }
            stored.delete_time = delete_time;
            deleted = true;
        }
        if deleted {
            self.persist(&inner).await?;
        }
        Ok(deleted)
    }

    /// Query live properties.
    pub async fn query(&self, query: &PropertyQuery) -> StorageResult<Vec<Property>> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for stored in inner.values() {
            if stored.delete_time != 0 {
                continue;
            }
            if !matches(&stored.property, query) {
                continue;
            }
            let mut property = stored.property.clone();
            if !query.tag_projection.is_empty() {
                property
                    .tags
                    .retain(|t| query.tag_projection.contains(&t.key));
            }
            out.push(property);
            if query.limit > 0 && out.len() >= query.limit {
                break;
            }
        }
        Ok(out)
    }

    /// Replication read: live and tombstoned properties, with delete
    /// times aligned positionally (0 = live).
    pub async fn internal_query(
        &self,
        query: &PropertyQuery,
    ) -> StorageResult<InternalQueryOutcome> {
        let inner = self.inner.read().await;
        let mut outcome = InternalQueryOutcome::default();
        for stored in inner.values() {
            if !matches(&stored.property, query) {
                continue;
            }
            outcome.sources.push(stored.property.clone());
            outcome.deletes.push(stored.delete_time);
        }
        Ok(outcome)
    }

    /// Replication delete: tombstone by property id. Returns how many
    /// live properties were tombstoned.
    pub async fn delete_by_ids(&self, ids: &[u64], delete_time: i64) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let mut deleted = 0;
        for id in ids {
            if let Some(stored) = inner.get_mut(id) {
                if stored.delete_time == 0 {
                    stored.delete_time = delete_time;
                    deleted += 1;
                }
            }
        }
        if deleted > 0 {
            self.persist(&inner).await?;
        }
        Ok(deleted)
    }

    /// Repair write from the replication control plane: force the stored
    /// state, including a possible tombstone.
    pub async fn repair(&self, property: Property, delete_time: i64) -> StorageResult<()> {
        let key = property.property_id();
        let mut inner = self.inner.write().await;
        inner.insert(
            key,
            StoredProperty {
                property,
                delete_time,
            },
        );
        self.persist(&inner).await?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.delete_time == 0)
            .count()
    }
}

fn matches(property: &Property, query: &PropertyQuery) -> bool {
    if !query.groups.is_empty() && !query.groups.contains(&property.group) {
        return false;
    }
    if let Some(name) = &query.name {
        if property.name != *name {
            return false;
        }
    }
    if !query.ids.is_empty() && !query.ids.contains(&property.id) {
        return false;
    }
    for (key, value) in &query.tags {
        let found = property
            .tags
            .iter()
            .any(|t| t.key == *key && t.value == *value);
        if !found {
            return false;
        }
    }
    true
}
