//! Property Routes
//!
//! Property CRUD mapped onto the wire surface:
//!
//! - `PUT /v1/property/data/{group}/{name}/{id}` applies with MERGE/REPLACE
//! - `DELETE /v1/property/data/{group}/{name}/{id}` deletes one id
//! - `DELETE /v1/property/data/{group}/{name}` deletes by (group, name)
//! - `POST /v1/property/data/query` queries live properties
//!
//! plus the internal replication surface under `/v1/property/internal/`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{
    InternalDelete, InternalQueryResponse, InternalRepair, InternalUpdate,
    PropertyApplyRequest, PropertyApplyResponse, PropertyDeleteResponse, PropertyQueryRequest,
    PropertyQueryResponse,
};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::property::{Property, PropertyQuery};

/// PUT /v1/property/data/:group/:name/:id
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Path((group, name, id)): Path<(String, String, String)>,
    Json(req): Json<PropertyApplyRequest>,
) -> ApiResult<(StatusCode, Json<PropertyApplyResponse>)> {
    let property = Property {
        group,
        name,
        id,
        tags: req.tags,
        version: req.version,
    };
    let applied = state.properties.apply(property, req.strategy).await?;
    let status = if applied.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(PropertyApplyResponse {
            created: applied.created,
            tags_num: applied.tags_num,
        }),
    ))
}

/// DELETE /v1/property/data/:group/:name/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((group, name, id)): Path<(String, String, String)>,
) -> ApiResult<Json<PropertyDeleteResponse>> {
    let deleted = state
        .properties
        .delete(&group, &name, Some(&id), now_nanos())
        .await?;
    Ok(Json(PropertyDeleteResponse { deleted }))
}

/// DELETE /v1/property/data/:group/:name
pub async fn delete_by_name(
    State(state): State<Arc<AppState>>,
    Path((group, name)): Path<(String, String)>,
) -> ApiResult<Json<PropertyDeleteResponse>> {
    let deleted = state
        .properties
        .delete(&group, &name, None, now_nanos())
        .await?;
    Ok(Json(PropertyDeleteResponse { deleted }))
}

/// POST /v1/property/data/query
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PropertyQueryRequest>,
) -> ApiResult<Json<PropertyQueryResponse>> {
    let properties = state
        .properties
        .query(&PropertyQuery {
            groups: req.groups,
            name: req.name,
            ids: req.ids,
            tags: req.criteria.into_iter().map(|c| (c.name, c.value)).collect(),
            tag_projection: req.tag_projection,
            limit: req.limit,
        })
        .await?;
    Ok(Json(PropertyQueryResponse { properties }))
}

/// POST /v1/property/internal/update
pub async fn internal_update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InternalUpdate>,
) -> ApiResult<StatusCode> {
    state.properties.repair(req.property, 0).await?;
    Ok(StatusCode::OK)
}

/// POST /v1/property/internal/delete
pub async fn internal_delete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InternalDelete>,
) -> ApiResult<StatusCode> {
    let delete_time = if req.delete_time > 0 {
        req.delete_time
    } else {
        now_nanos()
    };
    state.properties.delete_by_ids(&req.ids, delete_time).await?;
    Ok(StatusCode::OK)
}

/// POST /v1/property/internal/query
pub async fn internal_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PropertyQueryRequest>,
) -> ApiResult<Json<InternalQueryResponse>> {
    let outcome = state
        .properties
        .internal_query(&PropertyQuery {
            groups: req.groups,
            name: req.name,
            ids: req.ids,
            tags: req.criteria.into_iter().map(|c| (c.name, c.value)).collect(),
            tag_projection: req.tag_projection,
            limit: req.limit,
        })
        .await?;
    Ok(Json(InternalQueryResponse {
        sources: outcome.sources,
        deletes: outcome.deletes,
    }))
}

/// POST /v1/property/internal/repair
pub async fn internal_repair(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InternalRepair>,
) -> ApiResult<StatusCode> {
    state
        .properties
        .repair(req.property, req.delete_time)
        .await?;
    Ok(StatusCode::OK)
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX - 1)
}
