//! Curation HTTP API.
//!
//! Exposes the curation engine over a JSON HTTP API for the gallery
//! frontend. Long-running consensus runs execute as background jobs; the
//! client polls for progress and retrieves the terminal result.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/curation/curate` | Start an async curation job |
//! | `GET`  | `/api/curation/curate/progress/{job_id}` | Poll job status/progress/result |
//! | `POST` | `/api/curation/curate/cancel/{job_id}` | Cancel a queued/running job |
//! | `POST` | `/api/curation/curate_sync` | Run curation inline and return the result |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "target_count must be > 0" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Request validation errors are surfaced synchronously; anything that fails
//! after a job was accepted is surfaced only through the job's terminal
//! `error` status on poll.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser-based
//! gallery can call the API cross-origin.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::{Config, DEFAULT_STORE};
use crate::consensus::{self, CurationPlan};
use crate::db;
use crate::jobs::JobRunner;
use crate::models::{CurationOutcome, JobStatus, SelectionMethod};
use crate::progress::NoProgress;
use crate::store::{self, MemoryStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    runner: JobRunner,
}

/// Starts the curation HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        runner: JobRunner::new(config.curation.retention_secs),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/curation/curate", post(handle_curate))
        .route(
            "/api/curation/curate/progress/{job_id}",
            get(handle_progress),
        )
        .route("/api/curation/curate/cancel/{job_id}", post(handle_cancel))
        .route("/api/curation/curate_sync", post(handle_curate_sync))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Curation server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 404 Not Found error.
fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Constructs a 500 Internal error.
fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ Request validation ============

/// Body of `POST /api/curation/curate` and `curate_sync`.
#[derive(Debug, Deserialize)]
struct CurateRequest {
    target_count: i64,
    #[serde(default)]
    iterations: Option<i64>,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    excluded_indices: Vec<i64>,
    /// Embedding store identifier; defaults to the `default` store.
    #[serde(default)]
    store: Option<String>,
}

fn default_method() -> String {
    "fps".to_string()
}

/// A validated request: clamped plan plus the exclusion set and store name.
#[derive(Debug)]
struct ValidatedRequest {
    plan: CurationPlan,
    excluded: HashSet<usize>,
    store: String,
}

fn validate_request(config: &Config, req: &CurateRequest) -> Result<ValidatedRequest, AppError> {
    if req.target_count <= 0 {
        return Err(bad_request("target_count must be > 0"));
    }

    let method: SelectionMethod = req
        .method
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let iterations = match req.iterations {
        None => config.curation.default_iterations,
        Some(n) if n <= 0 => return Err(bad_request("iterations must be > 0")),
        // Clamp, never reject: the engine caps per-job work at the configured
        // maximum regardless of what the caller asked for.
        Some(n) => (n as u64).min(u64::from(config.curation.max_iterations)) as u32,
    };

    let mut excluded = HashSet::with_capacity(req.excluded_indices.len());
    for &idx in &req.excluded_indices {
        if idx < 0 {
            return Err(bad_request("excluded_indices must be non-negative"));
        }
        excluded.insert(idx as usize);
    }

    let store = req
        .store
        .clone()
        .unwrap_or_else(|| DEFAULT_STORE.to_string());
    if config.store_path(&store).is_err() {
        return Err(not_found(format!("Unknown store: {}", store)));
    }

    let mut plan = CurationPlan::new(req.target_count as usize, iterations, method);
    plan.kmeans_max_iter = config.curation.kmeans_max_iter;

    Ok(ValidatedRequest {
        plan,
        excluded,
        store,
    })
}

/// Load a consistent store snapshot for one job.
async fn load_snapshot(config: &Config, store_name: &str) -> Result<MemoryStore, AppError> {
    let pool = db::connect(config, store_name)
        .await
        .map_err(|e| internal(e.to_string()))?;
    let snapshot = store::load_store(&pool)
        .await
        .map_err(|e| internal(e.to_string()));
    pool.close().await;
    snapshot
}

// ============ POST /api/curation/curate ============

/// JSON response body for job acceptance.
#[derive(Serialize)]
struct CurateStartedResponse {
    job_id: String,
    status: String,
    /// Iterations the job will actually run (after clamping).
    iterations: u32,
}

/// Handler for `POST /api/curation/curate`.
///
/// Validates the request, snapshots the store, and starts a background job.
/// Returns the job id immediately; the computation proceeds off the
/// request/response cycle.
async fn handle_curate(
    State(state): State<AppState>,
    Json(req): Json<CurateRequest>,
) -> Result<Json<CurateStartedResponse>, AppError> {
    let validated = validate_request(&state.config, &req)?;
    let snapshot = load_snapshot(&state.config, &validated.store).await?;

    let iterations = validated.plan.iterations;
    let job_id = state
        .runner
        .submit(Arc::new(snapshot), validated.excluded, validated.plan);

    Ok(Json(CurateStartedResponse {
        job_id,
        status: "started".to_string(),
        iterations,
    }))
}

// ============ GET /api/curation/curate/progress/{job_id} ============

/// Handler for `GET /api/curation/curate/progress/{job_id}`.
///
/// Idempotent: polling never mutates job state, and a terminal job returns
/// the same payload on every read.
async fn handle_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let snap = state
        .runner
        .snapshot(&job_id)
        .ok_or_else(|| not_found(format!("No curation job with id: {}", job_id)))?;

    let mut body = serde_json::json!({ "status": snap.status });
    match snap.status {
        JobStatus::Queued | JobStatus::Running => {
            body["progress"] = serde_json::to_value(&snap.progress)
                .map_err(|e| internal(e.to_string()))?;
        }
        JobStatus::Completed => {
            let result = snap
                .result
                .ok_or_else(|| internal("Completed job is missing its result"))?;
            body["result"] = success_payload(&result)?;
        }
        JobStatus::Error => {
            body["error"] = serde_json::Value::String(
                snap.error.unwrap_or_else(|| "Unknown error".to_string()),
            );
        }
    }

    Ok(Json(body))
}

// ============ POST /api/curation/curate/cancel/{job_id} ============

/// Handler for `POST /api/curation/curate/cancel/{job_id}`.
///
/// A queued or running job moves straight to the terminal `error` state with
/// message `"cancelled"`; the worker halts at the next iteration boundary.
/// Cancelling a terminal job is a no-op returning the current status.
async fn handle_cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let snap = state
        .runner
        .cancel(&job_id)
        .ok_or_else(|| not_found(format!("No curation job with id: {}", job_id)))?;

    Ok(Json(serde_json::json!({
        "job_id": snap.job_id,
        "status": snap.status,
    })))
}

// ============ POST /api/curation/curate_sync ============

/// Handler for `POST /api/curation/curate_sync`.
///
/// Runs the full consensus inline (on a blocking worker) and returns the
/// final result in one round trip. Intended for small collections and tests;
/// large runs should use the async endpoint.
async fn handle_curate_sync(
    State(state): State<AppState>,
    Json(req): Json<CurateRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let validated = validate_request(&state.config, &req)?;
    let snapshot = load_snapshot(&state.config, &validated.store).await?;

    let plan = validated.plan;
    let excluded = validated.excluded;
    let outcome = tokio::task::spawn_blocking(move || {
        consensus::curate(&snapshot, &excluded, &plan, &NoProgress, None)
    })
    .await
    .map_err(|e| internal(e.to_string()))?
    .map_err(|e| internal(e.to_string()))?;

    Ok(Json(success_payload(&outcome)?))
}

/// Flatten a [`CurationOutcome`] into the wire result object.
fn success_payload(outcome: &CurationOutcome) -> Result<serde_json::Value, AppError> {
    let mut value = serde_json::to_value(outcome).map_err(|e| internal(e.to_string()))?;
    value["status"] = serde_json::Value::String("success".to_string());
    Ok(value)
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> Config {
        Config {
            stores: HashMap::from([(
                DEFAULT_STORE.to_string(),
                std::path::PathBuf::from("data/images.sqlite"),
            )]),
            curation: Default::default(),
            server: crate::config::ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
        }
    }

    fn request(target: i64, iterations: Option<i64>, method: &str) -> CurateRequest {
        CurateRequest {
            target_count: target,
            iterations,
            method: method.to_string(),
            excluded_indices: vec![],
            store: None,
        }
    }

    #[test]
    fn rejects_non_positive_target() {
        let cfg = test_config();
        assert!(validate_request(&cfg, &request(0, None, "fps")).is_err());
        assert!(validate_request(&cfg, &request(-5, None, "fps")).is_err());
    }

    #[test]
    fn rejects_unknown_method() {
        let cfg = test_config();
        assert!(validate_request(&cfg, &request(3, None, "random")).is_err());
    }

    #[test]
    fn rejects_zero_iterations() {
        let cfg = test_config();
        assert!(validate_request(&cfg, &request(3, Some(0), "fps")).is_err());
    }

    #[test]
    fn clamps_oversized_iterations() {
        let cfg = test_config();
        let validated = validate_request(&cfg, &request(3, Some(100), "fps")).unwrap();
        assert_eq!(validated.plan.iterations, 30);
    }

    #[test]
    fn defaults_iterations_and_store() {
        let cfg = test_config();
        let validated = validate_request(&cfg, &request(3, None, "kmeans")).unwrap();
        assert_eq!(validated.plan.iterations, cfg.curation.default_iterations);
        assert_eq!(validated.store, DEFAULT_STORE);
        assert_eq!(validated.plan.method, SelectionMethod::Kmeans);
    }

    #[test]
    fn rejects_negative_excluded_indices() {
        let cfg = test_config();
        let mut req = request(3, None, "fps");
        req.excluded_indices = vec![1, -2];
        assert!(validate_request(&cfg, &req).is_err());
    }

    #[test]
    fn errors_and_validated_requests_are_debuggable() {
        let err = bad_request("target_count must be > 0");
        assert!(format!("{:?}", err).contains("bad_request"));

        let cfg = test_config();
        let validated = validate_request(&cfg, &request(3, None, "fps")).unwrap();
        assert!(format!("{:?}", validated).contains("Fps"));
    }

    #[test]
    fn rejects_unknown_store() {
        let cfg = test_config();
        let mut req = request(3, None, "fps");
        req.store = Some("portraits".to_string());
        let err = validate_request(&cfg, &req).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
