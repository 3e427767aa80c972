//! Web server module for Quantitea.
//!
//! Provides the JSON API over the metric store, health probes and the
//! Prometheus scrape endpoint.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::exporter::MetricExporter;
use crate::storage::{ErrorKind, Metric, MetricStore, NewMetric, StorageError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: MetricStore,
    /// `None` disables `GET /metrics`.
    pub exporter: Option<Arc<MetricExporter>>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Body of `PUT /api/metrics/{name}/value`.
#[derive(Debug, Deserialize)]
pub struct SetValueRequest {
    pub value: f64,
}

/// Body of the increment and decrement endpoints.
#[derive(Debug, Deserialize)]
pub struct DeltaRequest {
    pub delta: f64,
}

/// Error body: `{"error": kind, "message": text}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
}

/// An error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::WouldGoNegative => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::StorageFailure => {
                tracing::error!(error = %err, "Storage failure");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self {
            status,
            kind,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_argument(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.kind,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Reject negative or non-finite request amounts before touching the store.
fn non_negative(field: &str, amount: f64) -> Result<f64, ApiError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ApiError::invalid_argument(format!(
            "{field} must be a non-negative number, got {amount}"
        )));
    }
    Ok(amount)
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(prometheus_handler))
        .route("/api/metrics", get(list_handler).post(add_handler))
        .route("/api/metrics/{name}", get(get_handler).delete(delete_handler))
        .route("/api/metrics/{name}/value", put(set_handler))
        .route("/api/metrics/{name}/increment", post(increment_handler))
        .route("/api/metrics/{name}/decrement", post(decrement_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks SQLite availability.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Prometheus scrape endpoint.
async fn prometheus_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(exporter) = state.exporter.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match exporter.render().await {
        Ok(body) => ([(header::CONTENT_TYPE, exporter.content_type())], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Metrics export failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("Error: {}", e)).into_response()
        }
    }
}

async fn list_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Metric>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn add_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewMetric>, JsonRejection>,
) -> Result<(StatusCode, Json<Metric>), ApiError> {
    let Json(new) = body?;
    Ok((StatusCode::CREATED, Json(state.store.add(new).await?)))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Metric>, ApiError> {
    Ok(Json(state.store.get(&name).await?))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<SetValueRequest>, JsonRejection>,
) -> Result<Json<Metric>, ApiError> {
    let Json(req) = body?;
    let value = non_negative("value", req.value)?;
    Ok(Json(state.store.set(&name, value).await?))
}

async fn increment_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<DeltaRequest>, JsonRejection>,
) -> Result<Json<Metric>, ApiError> {
    let Json(req) = body?;
    let delta = non_negative("delta", req.delta)?;
    Ok(Json(state.store.increment(&name, delta).await?))
}

async fn decrement_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<DeltaRequest>, JsonRejection>,
) -> Result<Json<Metric>, ApiError> {
    let Json(req) = body?;
    let delta = non_negative("delta", req.delta)?;
    Ok(Json(state.store.decrement(&name, delta).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageBuilder, StorageHandles};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn create_test_state() -> (AppState, StorageHandles) {
        let handles = StorageBuilder::new("sqlite::memory:")
            .build()
            .await
            .expect("Failed to build storage");

        let state = AppState {
            store: handles.store.clone(),
            exporter: Some(Arc::new(
                MetricExporter::new(handles.store.clone()).unwrap(),
            )),
        };

        (state, handles)
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (state, _handles) = create_test_state().await;
        let response = create_router(state)
            .oneshot(get_request("/healthz"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_readyz_reports_closed_database() {
        let (state, handles) = create_test_state().await;
        let app = create_router(state);

        let response = app.clone().oneshot(get_request("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        handles.shutdown().await.unwrap();
        let response = app.oneshot(get_request("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_add_then_increment() {
        let (state, _handles) = create_test_state().await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/metrics",
                r#"{"name":"water","category":"health","unit":"cups","reset_daily":true}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/metrics/water/increment",
                r#"{"delta":2.5}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["value"], 2.5);
        assert_eq!(body["reset_daily"], true);
    }

    #[tokio::test]
    async fn test_duplicate_add_conflicts() {
        let (state, _handles) = create_test_state().await;
        let app = create_router(state);
        let body = r#"{"name":"steps","category":"fitness"}"#;

        let first = app
            .clone()
            .oneshot(json_request("POST", "/api/metrics", body))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(json_request("POST", "/api/metrics", body))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["error"], "already_exists");
    }

    #[tokio::test]
    async fn test_unknown_metric_is_404() {
        let (state, _handles) = create_test_state().await;
        let response = create_router(state)
            .oneshot(get_request("/api/metrics/nonexistent"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_decrement_below_zero_is_422() {
        let (state, handles) = create_test_state().await;
        handles
            .store
            .add(NewMetric::new("coffee", "habits", "cups", false))
            .await
            .unwrap();
        handles.store.set("coffee", 1.0).await.unwrap();

        let response = create_router(state)
            .oneshot(json_request(
                "POST",
                "/api/metrics/coffee/decrement",
                r#"{"delta":2}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "would_go_negative");
        assert_eq!(handles.store.get("coffee").await.unwrap().value, 1.0);
    }

    #[tokio::test]
    async fn test_negative_delta_rejected_before_store() {
        let (state, handles) = create_test_state().await;
        handles
            .store
            .add(NewMetric::new("coffee", "habits", "cups", false))
            .await
            .unwrap();
        let app = create_router(state);

        for uri in ["/api/metrics/coffee/increment", "/api/metrics/coffee/decrement"] {
            let response = app
                .clone()
                .oneshot(json_request("POST", uri, r#"{"delta":-1}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/metrics/coffee/value",
                r#"{"value":-3}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (state, _handles) = create_test_state().await;
        let response = create_router(state)
            .oneshot(json_request("POST", "/api/metrics", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_delete_then_404() {
        let (state, handles) = create_test_state().await;
        handles
            .store
            .add(NewMetric::new("steps", "fitness", "", false))
            .await
            .unwrap();
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/metrics/steps")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(get_request("/api/metrics/steps")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prometheus_endpoint() {
        let (state, handles) = create_test_state().await;
        handles
            .store
            .add(NewMetric::new("water", "health", "cups", true))
            .await
            .unwrap();

        let response = create_router(state)
            .oneshot(get_request("/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("quantitea_metric_value{"));
        assert!(text.contains(r#"name="water""#));
    }

    #[tokio::test]
    async fn test_prometheus_endpoint_disabled() {
        let (mut state, _handles) = create_test_state().await;
        state.exporter = None;

        let response = create_router(state)
            .oneshot(get_request("/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
