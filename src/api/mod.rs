//! Strata HTTP API
//!
//! HTTP surface for the engine, built with Axum.
//!
//! # Endpoints
//!
//! ## Ingest
//! - `POST /api/v1/measure/write` - Batch of measure samples
//! - `POST /api/v1/stream/write` - Batch of stream events
//!
//! ## Query
//! - `POST /api/v1/query` - Time-ordered query across groups
//!
//! ## Property
//! - `PUT /v1/property/data/:group/:name/:id` - Apply (MERGE/REPLACE)
//! - `DELETE /v1/property/data/:group/:name/:id` - Delete one property
//! - `DELETE /v1/property/data/:group/:name` - Delete by (group, name)
//! - `POST /v1/property/data/query` - Query properties
//! - `POST /v1/property/internal/{update,delete,query,repair}` -
//!   replication surface
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;

    let api_routes = Router::new()
        .route("/measure/write", post(routes::ingest::measure_write))
        .route("/stream/write", post(routes::ingest::stream_write))
        .route("/query", post(routes::query::execute_query))
        .layer(DefaultBodyLimit::max(max_body_size));

    let property_routes = Router::new()
        .route("/data/:group/:name/:id", put(routes::property::apply))
        .route("/data/:group/:name/:id", delete(routes::property::delete))
        .route("/data/:group/:name", delete(routes::property::delete_by_name))
        .route("/data/query", post(routes::property::query))
        .route("/internal/update", post(routes::property::internal_update))
        .route("/internal/delete", post(routes::property::internal_delete))
        .route("/internal/query", post(routes::property::internal_query))
        .route("/internal/repair", post(routes::property::internal_repair));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/v1/property", property_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Strata API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Strata API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyStore;
    use crate::query::QueryExecutor;
    use crate::storage::schema::{
        FieldSpec, GroupSchema, IndexRule, ResourceSchema, TagFamilySpec, TagSpec,
    };
    use crate::storage::types::ValueType;
    use crate::storage::{Engine, EngineConfig};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    const HOUR: i64 = 3_600_000_000_000;

    async fn create_test_app() -> (Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(Engine::open(EngineConfig::new(dir.path())).unwrap());
        engine
            .define_group(GroupSchema::new("metrics", 2, HOUR))
            .unwrap();
        engine
            .define_resource(
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
                    .with_index_rule(IndexRule::new(1, "env")),
            )
            .unwrap();

        let executor = Arc::new(QueryExecutor::with_worker_count(Arc::clone(&engine), 2));
        let properties =
            Arc::new(PropertyStore::open(dir.path(), engine.disk_gauge()).unwrap());
        let state = AppState::new(engine, executor, properties, ApiConfig::default());
        (build_router(state), dir)
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, _dir) = create_test_app().await;

        for uri in ["/health/live", "/health/ready", "/health"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "uri {}", uri);
        }
    }

    #[tokio::test]
    async fn test_write_then_query_round_trip() {
        let (app, _dir) = create_test_app().await;

        let write = json_request(
            "POST",
            "/api/v1/measure/write",
            r#"{"events":[{
                "group":"metrics","name":"cpu_usage",
                "entity":[{"str":"svc1"},{"str":"host1"}],
                "timestamp":1000,"version":1,
                "tag_families":[[{"str":"svc1"},{"str":"host1"},{"str":"prod"}]],
                "fields":[{"int64":42}]
            }]}"#,
        );
        let response = app.clone().oneshot(write).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let query = json_request(
            "POST",
            "/api/v1/query",
            r#"{"groups":["metrics"],"name":"cpu_usage",
                "start":0,"end":100000,"limit":10,"asc":true}"#,
        );
        let response = app.oneshot(query).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["timestamp"], 1000);
        assert_eq!(rows[0]["fields"][0]["value"]["int64"], 42);
    }

    #[tokio::test]
    async fn test_write_unknown_group_reports_positional_error() {
        let (app, _dir) = create_test_app().await;

        let write = json_request(
            "POST",
            "/api/v1/measure/write",
            r#"{"events":[{
                "group":"nope","name":"cpu_usage",
                "entity":[{"str":"svc1"}],"timestamp":1000
            }]}"#,
        );
        let response = app.oneshot(write).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["accepted"], 0);
        assert_eq!(body["errors"][0]["index"], 0);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let (app, _dir) = create_test_app().await;

        let response = app
            .oneshot(json_request("POST", "/api/v1/measure/write", r#"{"events":[]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_property_apply_delete_query() {
        let (app, _dir) = create_test_app().await;

        // Create.
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/v1/property/data/ui/pages/home",
                r#"{"tags":[{"key":"layout","value":{"str":"grid"}}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["created"], true);
        assert_eq!(body["tags_num"], 1);

        // Merge a second tag.
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/v1/property/data/ui/pages/home",
                r#"{"tags":[{"key":"theme","value":{"str":"dark"}}],"strategy":"merge"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["created"], false);
        assert_eq!(body["tags_num"], 2);

        // Query it back.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/property/data/query",
                r#"{"groups":["ui"],"name":"pages"}"#,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["properties"].as_array().unwrap().len(), 1);

        // Delete and verify.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/property/data/ui/pages/home")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["deleted"], true);

        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/property/data/query",
                r#"{"groups":["ui"],"name":"pages"}"#,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert!(body["properties"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_internal_query_aligns_deletes() {
        let (app, _dir) = create_test_app().await;

        app.clone()
            .oneshot(json_request(
                "PUT",
                "/v1/property/data/ui/pages/home",
                r#"{"tags":[]}"#,
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/property/data/ui/pages/home")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/property/internal/query",
                r#"{"groups":["ui"]}"#,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        let sources = body["sources"].as_array().unwrap();
        let deletes = body["deletes"].as_array().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(deletes.len(), 1);
        assert!(deletes[0].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let (app, _dir) = create_test_app().await;

        let response = app
            .oneshot(json_request("POST", "/api/v1/query", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
