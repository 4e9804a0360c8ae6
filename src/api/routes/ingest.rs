//! Ingest Routes
//!
//! Batch write endpoints for measures and streams. Shard selection happens
//! here at the gateway: the entity tuple is bound to its series identity
//! and hashed onto one of the group's shards; the engine treats the shard
//! id as given. Failures are reported positionally per event, and a
//! disk-full refusal fails the whole batch with `STATUS_DISK_FULL`.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{BatchError, BatchWriteRequest, BatchWriteResponse, WriteEventDto};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::storage::{Series, WriteEvent};

/// POST /api/v1/measure/write
pub async fn measure_write(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchWriteRequest>,
) -> ApiResult<(StatusCode, Json<BatchWriteResponse>)> {
    write_batch(state, req).await
}

/// POST /api/v1/stream/write
pub async fn stream_write(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchWriteRequest>,
) -> ApiResult<(StatusCode, Json<BatchWriteResponse>)> {
    write_batch(state, req).await
}

async fn write_batch(
    state: Arc<AppState>,
    req: BatchWriteRequest,
) -> ApiResult<(StatusCode, Json<BatchWriteResponse>)> {
    if req.events.is_empty() {
        return Err(ApiError::Validation("Empty batch".to_string()));
    }
    if req.events.len() > state.config.max_batch_size {
        return Err(ApiError::Validation(format!(
            "Batch size exceeds maximum of {} events",
            state.config.max_batch_size
        )));
    }

    // Gateway-side resolution: events that cannot be routed to a shard are
    // reported positionally and never reach the engine.
    let mut events = Vec::with_capacity(req.events.len());
    let mut errors = Vec::new();
    let mut routed_indices = Vec::with_capacity(req.events.len());
    for (index, dto) in req.events.into_iter().enumerate() {
        match route_event(&state, dto) {
            Ok(event) => {
                routed_indices.push(index);
                events.push(event);
            }
            Err(e) => errors.push(BatchError {
                index,
                error: e.to_string(),
                status: e.status().map(String::from),
            }),
        }
    }

    let outcome = state.engine.write_batch(events)?;
    for event_error in &outcome.event_errors {
        errors.push(BatchError {
            index: routed_indices[event_error.index],
            error: event_error.error.to_string(),
            status: event_error.error.status().map(String::from),
        });
    }
    for group_error in &outcome.group_errors {
        errors.push(BatchError {
            index: 0,
            error: format!("group {}: {}", group_error.group, group_error.error),
            status: group_error.error.status().map(String::from),
        });
    }

    let accepted = outcome.accepted;
    let status = if errors.is_empty() {
        StatusCode::OK
    } else if accepted > 0 {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::BAD_REQUEST
    };
    let status_str = if errors.is_empty() { "ok" } else { "partial" };

    Ok((
        status,
        Json(BatchWriteResponse {
            status: status_str.to_string(),
            accepted,
            rejected: errors.len(),
            errors,
        }),
    ))
}

fn route_event(
    state: &AppState,
    dto: WriteEventDto,
) -> crate::storage::StorageResult<WriteEvent> {
    let shard_count = state.engine.tsdb(&dto.group)?.shard_count();
    let series = Series::bind(dto.name.clone(), dto.entity.clone())?;
    let shard_id = (series.id().0 % shard_count as u64) as u32;

    Ok(WriteEvent {
        group: dto.group,
        resource: dto.name,
        shard_id,
        entity_values: dto.entity,
        timestamp: dto.timestamp,
        version: dto.version,
        tag_families: dto.tag_families,
        fields: dto.fields,
    })
}
