//! API Data Transfer Objects
//!
//! Request/response types for the HTTP surface, including the internal
//! replication surface for properties. Engine-internal types never cross
//! this boundary undecoded: encoded cells are turned back into typed
//! values before they are serialized to clients.

use crate::property::{Property, PropertyTag};
use crate::query::{QueryRow, TagFamilyProjection};
use crate::storage::types::{decode_value, Value};
use crate::storage::StorageResult;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    100
}

// --- ingest ---

/// One write event as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteEventDto {
    pub group: String,
    /// Measure or stream name.
    pub name: String,
    pub entity: Vec<Value>,
    /// Nanoseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub tag_families: Vec<Vec<Value>>,
    #[serde(default)]
    pub fields: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BatchWriteRequest {
    pub events: Vec<WriteEventDto>,
}

/// One failed event, positional against the submitted batch.
#[derive(Debug, Serialize)]
pub struct BatchError {
    pub index: usize,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchWriteResponse {
    pub status: String,
    pub accepted: usize,
    pub rejected: usize,
    pub errors: Vec<BatchError>,
}

// --- query ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTermDto {
    Any,
    Value(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagMatchDto {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagFamilyProjectionDto {
    pub family: String,
    pub tags: Vec<String>,
}

impl From<TagFamilyProjectionDto> for TagFamilyProjection {
    fn from(dto: TagFamilyProjectionDto) -> Self {
        Self {
            family: dto.family,
            tags: dto.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequestDto {
    pub groups: Vec<String>,
    /// Measure or stream name.
    pub name: String,
    #[serde(default)]
    pub series: Vec<Vec<EntityTermDto>>,
    /// Nanoseconds, half-open `[start, end)`.
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub criteria: Vec<TagMatchDto>,
    #[serde(default)]
    pub tag_projection: Vec<TagFamilyProjectionDto>,
    #[serde(default)]
    pub field_projection: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_true")]
    pub asc: bool,
}

#[derive(Debug, Serialize)]
pub struct TagDto {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct TagFamilyDto {
    pub name: String,
    pub tags: Vec<TagDto>,
}

#[derive(Debug, Serialize)]
pub struct QueryRowDto {
    pub series_id: String,
    pub timestamp: i64,
    pub version: i64,
    pub tag_families: Vec<TagFamilyDto>,
    pub fields: Vec<TagDto>,
}

impl QueryRowDto {
    /// Decode an engine row for the wire.
    pub fn from_row(row: &QueryRow) -> StorageResult<Self> {
        let mut tag_families = Vec::with_capacity(row.tag_families.len());
        for family in &row.tag_families {
            let mut tags = Vec::with_capacity(family.values.len());
            for cell in &family.values {
                tags.push(TagDto {
                    name: cell.name.clone(),
                    value: decode_value(cell)?,
                });
            }
            tag_families.push(TagFamilyDto {
                name: family.name.clone(),
                tags,
            });
        }
        let mut fields = Vec::with_capacity(row.fields.len());
        for cell in &row.fields {
            fields.push(TagDto {
                name: cell.name.clone(),
                value: decode_value(cell)?,
            });
        }
        Ok(Self {
            series_id: row.series_id.to_string(),
            timestamp: row.timestamp,
            version: row.version,
            tag_families,
            fields,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResponseDto {
    pub rows: Vec<QueryRowDto>,
}

// --- property ---

#[derive(Debug, Deserialize)]
pub struct PropertyApplyRequest {
    #[serde(default)]
    pub tags: Vec<PropertyTag>,
    #[serde(default)]
    pub strategy: crate::property::ApplyStrategy,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Serialize)]
pub struct PropertyApplyResponse {
    pub created: bool,
    pub tags_num: u32,
}

#[derive(Debug, Serialize)]
pub struct PropertyDeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct PropertyQueryRequest {
    pub groups: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub criteria: Vec<TagMatchDto>,
    #[serde(default)]
    pub tag_projection: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct PropertyQueryResponse {
    pub properties: Vec<Property>,
}

// --- internal replication surface ---

#[derive(Debug, Serialize, Deserialize)]
pub struct InternalUpdate {
    pub id: u64,
    pub shard_id: u32,
    pub property: Property,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InternalDelete {
    pub ids: Vec<u64>,
    /// Tombstone time, nanoseconds.
    pub delete_time: i64,
}

/// `deletes[i]` is the delete timestamp (0 = live) aligned positionally
/// with `sources[i]`.
#[derive(Debug, Serialize, Deserialize)]
pub struct InternalQueryResponse {
    pub sources: Vec<Property>,
    pub deletes: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InternalRepair {
    pub shard_id: u32,
    pub id: u64,
    pub property: Property,
    pub delete_time: i64,
}
