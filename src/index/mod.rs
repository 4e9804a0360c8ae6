//! Secondary indexing
//!
//! Each segment owns one inverted index. Two document flows feed it:
//!
//! - **Metadata documents** let queries resolve series by tag predicates.
//!   One per series touched by a write batch, doc id = series id.
//! - **Index-mode documents** are the full payload of index-mode resources,
//!   which never touch a columnar table. Upserts are last-write-wins on
//!   (version, timestamp).

mod inverted;

pub use inverted::InvertedIndex;

use serde::{Deserialize, Serialize};

/// Field name carrying the subject of index-mode documents.
pub const SUBJECT_FIELD_NAME: &str = "_subject";

/// Prefix for entity tags mirrored into index-mode documents.
pub const INDEX_MODE_ENTITY_TAG_PREFIX: &str = "_entity_";

/// Identity of an indexed field: either an index rule or a bare tag name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Rule {
        rule_id: u32,
        analyzer: Option<String>,
    },
    Tag(String),
}

/// One indexed field within a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexField {
    pub key: FieldKey,
    /// Canonical encoded value; `None` marks a stored-but-valueless field.
    pub value: Option<Vec<u8>>,
    /// Whether the field participates in posting lists.
    pub index: bool,
    /// Whether the value is kept on the document.
    pub store: bool,
    pub no_sort: bool,
}

impl IndexField {
    pub fn bytes(key: FieldKey, value: Vec<u8>) -> Self {
        Self {
            key,
            value: Some(value),
            index: true,
            store: true,
            no_sort: false,
        }
    }

    pub fn string(key: FieldKey, value: &str) -> Self {
        Self::bytes(key, value.as_bytes().to_vec())
    }
}

/// A document in a segment's inverted index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndexDocument {
    pub doc_id: u64,
    /// Canonical series buffer; queries re-check entity values from it.
    pub entity_values: Vec<u8>,
    pub fields: Vec<IndexField>,
    pub version: i64,
    pub timestamp: i64,
}
