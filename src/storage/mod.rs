//! Strata Storage Engine
//!
//! The write half of the engine:
//!
//! - **types**: typed values, canonical codec, time ranges
//! - **series**: series binding (subject + entity values → SeriesId)
//! - **schema**: group/resource registry
//! - **tsdb**: per-group segment management and the write clock
//! - **segment**: time-window partitions owning shard tables and an index
//! - **table**: append-only columnar tables with checksummed parts
//! - **write**: the ingestion batcher
//! - **disk**: disk-usage admission control
//! - **engine**: the facade tying the above together
//! - **error**: error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   events → batch per group → bind series → {segment, shard} tables
//!          → columnar append → index documents → clock tick
//! ```

pub mod disk;
pub mod engine;
pub mod error;
pub mod schema;
pub mod segment;
pub mod series;
pub mod table;
pub mod tsdb;
pub mod types;
pub mod write;

// Re-export commonly used types
pub use disk::{DirUsageProbe, DiskGauge, FixedProbe, UsageProbe};
pub use engine::{Engine, EngineConfig, EngineStats};
pub use error::{StorageError, StorageResult};
pub use schema::{
    FieldSpec, GroupSchema, IndexRule, ResourceKind, ResourceSchema, SchemaRegistry,
    TagFamilySpec, TagSpec,
};
pub use segment::Segment;
pub use series::{Series, SeriesId};
pub use table::{Block, ColumnBatch, ShardId, TsTable};
pub use tsdb::Tsdb;
pub use types::{
    check_timestamp, decode_value, encode_value, NameValue, NameValues, TimeRange, Value,
    ValueType,
};
pub use write::{BatchOutcome, EventError, GroupError, WriteEvent};
