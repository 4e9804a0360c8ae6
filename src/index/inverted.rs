//! Inverted index for one segment
//!
//! Documents keyed by doc id, posting lists keyed by (field key, value
//! bytes). Persists to a checksummed binary image inside the segment
//! directory and rebuilds posting lists on load, so the on-disk format
//! stays a flat document list.

use crate::index::{FieldKey, IndexDocument};
use crate::storage::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const INDEX_MAGIC: [u8; 4] = *b"STIX";
const INDEX_VERSION: u16 = 1;
const INDEX_FILE: &str = "index.bin";

#[derive(Default)]
struct IndexInner {
    docs: HashMap<u64, IndexDocument>,
    postings: HashMap<(FieldKey, Vec<u8>), BTreeSet<u64>>,
}

impl IndexInner {
    fn unlink(&mut self, doc_id: u64) {
        if let Some(old) = self.docs.remove(&doc_id) {
            for field in &old.fields {
                if !field.index {
                    continue;
                }
                if let Some(value) = &field.value {
                    let key = (field.key.clone(), value.clone());
                    let drained = match self.postings.get_mut(&key) {
                        Some(set) => {
                            set.remove(&doc_id);
                            set.is_empty()
                        }
                        None => false,
                    };
                    if drained {
                        self.postings.remove(&key);
                    }
                }
            }
        }
    }

    fn link(&mut self, doc: IndexDocument) {
        for field in &doc.fields {
            if !field.index {
                continue;
            }
            if let Some(value) = &field.value {
                self.postings
                    .entry((field.key.clone(), value.clone()))
                    .or_default()
                    .insert(doc.doc_id);
            }
        }
        self.docs.insert(doc.doc_id, doc);
    }
}

/// Per-segment inverted index.
pub struct InvertedIndex {
    path: PathBuf,
    inner: RwLock<IndexInner>,
}

impl InvertedIndex {
    /// Open the index stored under `dir`, creating an empty one if absent.
    ///
    /// Returns whether a persisted image was found, so the caller can
    /// trigger recovery from data parts when it was not.
    pub fn open(dir: &Path) -> StorageResult<(Self, bool)> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE);

        let mut inner = IndexInner::default();
        let existed = path.exists();
        if existed {
            for doc in read_image(&path)? {
                inner.link(doc);
            }
        }

        Ok((
            Self {
                path,
                inner: RwLock::new(inner),
            },
            existed,
        ))
    }

    /// Upsert metadata documents by doc id. Idempotent.
    pub fn insert(&self, docs: Vec<IndexDocument>) -> StorageResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        {
            let mut inner = self.inner.write();
            for doc in docs {
                inner.unlink(doc.doc_id);
                inner.link(doc);
            }
        }
        self.persist()
    }

    /// Upsert full documents with last-write-wins conflict resolution:
    /// higher version wins, ties broken by higher timestamp, further ties
    /// by arrival order. Idempotent.
    pub fn update(&self, docs: Vec<IndexDocument>) -> StorageResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        {
            let mut inner = self.inner.write();
            for doc in docs {
                if let Some(stored) = inner.docs.get(&doc.doc_id) {
                    if (doc.version, doc.timestamp) < (stored.version, stored.timestamp) {
                        continue;
                    }
                }
                inner.unlink(doc.doc_id);
                inner.link(doc);
            }
        }
        self.persist()
    }

    /// Doc ids whose indexed field `(key, value)` matches exactly.
    pub fn search(&self, key: &FieldKey, value: &[u8]) -> Vec<u64> {
        self.inner
            .read()
            .postings
            .get(&(key.clone(), value.to_vec()))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn doc(&self, doc_id: u64) -> Option<IndexDocument> {
        self.inner.read().docs.get(&doc_id).cloned()
    }

    pub fn all_docs(&self) -> Vec<IndexDocument> {
        self.inner.read().docs.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> StorageResult<()> {
        let docs: Vec<IndexDocument> = self.inner.read().docs.values().cloned().collect();
        write_image(&self.path, &docs)
    }
}

fn write_image(path: &Path, docs: &[IndexDocument]) -> StorageResult<()> {
    let payload = bincode::serialize(docs)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&INDEX_MAGIC)?;
    file.write_all(&INDEX_VERSION.to_le_bytes())?;
    file.write_all(&(payload.len() as u32).to_le_bytes())?;
    file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    file.write_all(&payload)?;
    file.sync_all()?;
    Ok(())
}

fn read_image(path: &Path) -> StorageResult<Vec<IndexDocument>> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 14];
    file.read_exact(&mut header)?;

    if header[0..4] != INDEX_MAGIC {
        return Err(StorageError::Corruption(format!(
            "index image has invalid magic: {:?}",
            &header[0..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > INDEX_VERSION {
        return Err(StorageError::Corruption(format!(
            "unsupported index image version: {}",
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
            "index image checksum mismatch: stored={}, computed={}",
            stored_crc, computed
        )));
    }
    Ok(bincode::deserialize(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexField;
    use tempfile::tempdir;

    fn doc(id: u64, tag: &str, value: &str, version: i64, timestamp: i64) -> IndexDocument {
        IndexDocument {
            doc_id: id,
            entity_values: vec![1, 2, 3],
            fields: vec![IndexField::string(FieldKey::Tag(tag.to_string()), value)],
            version,
            timestamp,
        }
    }

    #[test]
    fn test_insert_and_search() {
        let dir = tempdir().unwrap();
        let (index, existed) = InvertedIndex::open(dir.path()).unwrap();
        assert!(!existed);

        index
            .insert(vec![doc(1, "env", "prod", 0, 0), doc(2, "env", "dev", 0, 0)])
            .unwrap();

        let key = FieldKey::Tag("env".to_string());
        assert_eq!(index.search(&key, b"prod"), vec![1]);
        assert_eq!(index.search(&key, b"dev"), vec![2]);
        assert!(index.search(&key, b"staging").is_empty());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let dir = tempdir().unwrap();
        let (index, _) = InvertedIndex::open(dir.path()).unwrap();

        let d = doc(7, "env", "prod", 3, 100);
        index.insert(vec![d.clone()]).unwrap();
        index.insert(vec![d.clone()]).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.doc(7), Some(d));
        assert_eq!(index.search(&FieldKey::Tag("env".into()), b"prod"), vec![7]);
    }

    #[test]
    fn test_insert_replaces_postings() {
        let dir = tempdir().unwrap();
        let (index, _) = InvertedIndex::open(dir.path()).unwrap();

        index.insert(vec![doc(1, "env", "prod", 0, 0)]).unwrap();
        index.insert(vec![doc(1, "env", "dev", 0, 0)]).unwrap();

        let key = FieldKey::Tag("env".to_string());
        assert!(index.search(&key, b"prod").is_empty());
        assert_eq!(index.search(&key, b"dev"), vec![1]);
    }

    #[test]
    fn test_update_last_write_wins() {
        let dir = tempdir().unwrap();
        let (index, _) = InvertedIndex::open(dir.path()).unwrap();

        index.update(vec![doc(1, "env", "v2", 2, 50)]).unwrap();
        // Lower version loses.
        index.update(vec![doc(1, "env", "v1", 1, 999)]).unwrap();
        assert_eq!(index.doc(1).unwrap().version, 2);
        assert_eq!(index.search(&FieldKey::Tag("env".into()), b"v2"), vec![1]);

        // Same version, higher timestamp wins.
        index.update(vec![doc(1, "env", "v2b", 2, 60)]).unwrap();
        assert_eq!(index.doc(1).unwrap().timestamp, 60);

        // Exact tie: arrival order wins.
        index.update(vec![doc(1, "env", "v2c", 2, 60)]).unwrap();
        assert_eq!(index.search(&FieldKey::Tag("env".into()), b"v2c"), vec![1]);
    }

    #[test]
    fn test_rule_and_tag_keys_are_distinct() {
        let dir = tempdir().unwrap();
        let (index, _) = InvertedIndex::open(dir.path()).unwrap();

        let rule_key = FieldKey::Rule {
            rule_id: 1,
            analyzer: None,
        };
        index
            .insert(vec![IndexDocument {
                doc_id: 1,
                entity_values: vec![],
                fields: vec![IndexField::string(rule_key.clone(), "prod")],
                version: 0,
                timestamp: 0,
            }])
            .unwrap();

        assert_eq!(index.search(&rule_key, b"prod"), vec![1]);
        assert!(index
            .search(&FieldKey::Tag("env".to_string()), b"prod")
            .is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();

        {
            let (index, _) = InvertedIndex::open(dir.path()).unwrap();
            index.insert(vec![doc(1, "env", "prod", 0, 0)]).unwrap();
        }

        let (index, existed) = InvertedIndex::open(dir.path()).unwrap();
        assert!(existed);
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&FieldKey::Tag("env".into()), b"prod"), vec![1]);
    }

    #[test]
    fn test_corrupt_image_is_rejected() {
        let dir = tempdir().unwrap();
        {
            let (index, _) = InvertedIndex::open(dir.path()).unwrap();
            index.insert(vec![doc(1, "env", "prod", 0, 0)]).unwrap();
        }

        // Flip a payload byte.
        let path = dir.path().join(INDEX_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            InvertedIndex::open(dir.path()),
            Err(StorageError::Corruption(_))
        ));
    }
}
