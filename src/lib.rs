//! # Strata
//!
//! A columnar, shard-partitioned, time-windowed observability storage
//! engine with integrated secondary indexing.
//!
//! ## Features
//!
//! - **Grouped storage**: each group owns one TSDB of time segments,
//!   each segment owning per-shard columnar tables and an inverted index
//! - **Batched ingestion**: writes are staged per group, bound to series
//!   identities, and appended with their index documents
//! - **Parallel queries**: block scans fan out across a worker pool and
//!   reduce through k-way time-ordered merges to a bounded result
//! - **Index-mode resources**: tag-only records living entirely in the
//!   inverted index
//! - **Properties**: small mutable tag bags with MERGE/REPLACE semantics
//!
//! ## Modules
//!
//! - [`storage`]: the write path and the engine facade
//! - [`index`]: per-segment inverted indexes
//! - [`query`]: the parallel time-ordered read path
//! - [`property`]: the property CRUD store
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata::storage::*;
//! use strata::query::{QueryExecutor, QueryRequest, SeriesMatcher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(Engine::open(EngineConfig::new("./strata_data"))?);
//!
//!     engine.define_group(GroupSchema::new("metrics", 2, 24 * 3_600_000_000_000))?;
//!     engine.define_resource(
//!         ResourceSchema::measure("metrics", "cpu_usage")
//!             .with_tag_family(TagFamilySpec::new(
//!                 "default",
//!                 vec![
//!                     TagSpec::new("service", ValueType::Str),
//!                     TagSpec::new("host", ValueType::Str),
//!                 ],
//!             ))
//!             .with_field(FieldSpec::new("value", ValueType::Int64))
//!             .with_entity(vec!["service", "host"]),
//!     )?;
//!
//!     engine.write_batch(vec![WriteEvent {
//!         group: "metrics".into(),
//!         resource: "cpu_usage".into(),
//!         shard_id: 0,
//!         entity_values: vec![Value::Str("svc1".into()), Value::Str("host1".into())],
//!         timestamp: 1_000,
//!         version: 1,
//!         tag_families: vec![vec![Value::Str("svc1".into()), Value::Str("host1".into())]],
//!         fields: vec![Value::Int64(42)],
//!     }])?;
//!
//!     let executor = QueryExecutor::new(Arc::clone(&engine));
//!     let response = executor
//!         .execute(
//!             QueryRequest::new("metrics", "cpu_usage")
//!                 .with_series(SeriesMatcher::exact(vec![
//!                     Value::Str("svc1".into()),
//!                     Value::Str("host1".into()),
//!                 ]))
//!                 .with_limit(10),
//!         )
//!         .await?;
//!
//!     println!("Found {} rows", response.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod index;
pub mod property;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    BatchOutcome, Engine, EngineConfig, EngineStats, FieldSpec, GroupSchema, IndexRule,
    ResourceKind, ResourceSchema, Series, SeriesId, StorageError, StorageResult, TagFamilySpec,
    TagSpec, TimeRange, Value, ValueType, WriteEvent,
};

pub use index::{FieldKey, IndexDocument, IndexField, InvertedIndex};

pub use query::{
    QueryError, QueryExecutor, QueryRequest, QueryResponse, QueryResult, QueryRow, SeriesMatcher,
};

pub use property::{ApplyStrategy, Property, PropertyStore, PropertyTag};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError};
