//! Query Routes
//!
//! One endpoint executes the time-ordered query path across groups.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{
    EntityTermDto, QueryRequestDto, QueryResponseDto, QueryRowDto,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::{EntityTerm, QueryRequest, SeriesMatcher, TagPredicate};
use crate::storage::types::TimeRange;

/// POST /api/v1/query
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequestDto>,
) -> ApiResult<Json<QueryResponseDto>> {
    if req.groups.is_empty() {
        return Err(ApiError::Validation("At least one group is required".to_string()));
    }
    let time_range = TimeRange::try_new(req.start, req.end)
        .ok_or_else(|| ApiError::Validation("start must be before end".to_string()))?;

    let series = req
        .series
        .into_iter()
        .map(|terms| SeriesMatcher {
            entity: terms
                .into_iter()
                .map(|t| match t {
                    EntityTermDto::Any => EntityTerm::Any,
                    EntityTermDto::Value(v) => EntityTerm::Value(v),
                })
                .collect(),
        })
        .collect();

    let predicate = if req.criteria.is_empty() {
        None
    } else {
        Some(TagPredicate {
            terms: req.criteria.into_iter().map(|c| (c.name, c.value)).collect(),
        })
    };

    let request = QueryRequest {
        groups: req.groups,
        resource: req.name,
        series,
        time_range,
        predicate,
        tag_projection: req.tag_projection.into_iter().map(Into::into).collect(),
        field_projection: req.field_projection,
        max_element_size: req.limit,
        asc: req.asc,
    };

    let response = state.executor.execute(request).await?;
    let mut rows = Vec::with_capacity(response.len());
    for row in &response.rows {
        rows.push(QueryRowDto::from_row(row)?);
    }
    Ok(Json(QueryResponseDto { rows }))
}
