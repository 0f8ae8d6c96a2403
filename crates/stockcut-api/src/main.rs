use anyhow::{anyhow, Context};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use stockcut_core::history::DEFAULT_HISTORY_FILE;
use stockcut_core::report::{self, DEFAULT_BAR_WIDTH};
use stockcut_core::{
    HistoryRecord, HistoryStore, JsonFileStore, OptimizationOutcome, OptimizationRequest,
    Optimizer, OptimizerError, PackingResult, ReportOptions,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Shared state: the history store, serialized behind one lock so that the
/// load, search and write of a request never interleave with another's.
#[derive(Clone)]
struct AppState {
    history: Arc<Mutex<JsonFileStore>>,
}

impl AppState {
    fn new(store: JsonFileStore) -> Self {
        Self {
            history: Arc::new(Mutex::new(store)),
        }
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/optimize", post(optimize))
        .route("/api/report", post(render_report))
        .route("/api/history/:signature", get(history_entry))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("STOCKCUT_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let history_path =
        std::env::var("STOCKCUT_HISTORY").unwrap_or_else(|_| DEFAULT_HISTORY_FILE.to_string());

    info!("Starting stockcut API");
    info!("Using history file {}", history_path);

    let state = AppState::new(JsonFileStore::open(history_path));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("API server listening on http://{}", addr);
    info!("Try: curl http://localhost:3000/api/health");

    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "stockcut-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
struct OptimizeResponse {
    #[serde(flatten)]
    outcome: OptimizationOutcome,
    report: String,
}

/// Main optimization endpoint
async fn optimize(
    State(state): State<AppState>,
    Json(request): Json<OptimizationRequest>,
) -> Result<Json<OptimizeResponse>, AppError> {
    info!(
        "Received optimization request with {} pieces in {} widths ({})",
        request.demand.total_pieces(),
        request.demand.len(),
        request.algorithm
    );

    let history = state.history.clone();
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<OptimizationOutcome> {
        let optimizer = Optimizer::new(request)?;
        let mut store = history
            .lock()
            .map_err(|_| anyhow!("history store lock poisoned"))?;
        Ok(optimizer.run(&mut *store)?)
    })
    .await
    .map_err(anyhow::Error::from)??;

    info!(
        "Optimization complete: {} sheets, {:.2}% utilization{}",
        outcome.result.sheet_count,
        outcome.result.utilization_percent,
        if outcome.from_history {
            " (from history)"
        } else {
            ""
        }
    );

    let report = report::format_outcome(&outcome, &ReportOptions::default());
    Ok(Json(OptimizeResponse { outcome, report }))
}

fn default_bar_width() -> usize {
    DEFAULT_BAR_WIDTH
}

#[derive(Deserialize)]
struct ReportRequest {
    result: PackingResult,
    capacity: u32,
    #[serde(default = "default_bar_width")]
    bar_width: usize,
}

/// Renders a packing result as a plain-text cutting plan
async fn render_report(Json(request): Json<ReportRequest>) -> Result<Response, AppError> {
    if request.capacity == 0 {
        return Err(OptimizerError::InvalidCapacity(request.capacity).into());
    }

    info!("Rendering report for {} sheets", request.result.sheet_count);

    let options = ReportOptions::with_bar_width(request.bar_width)?;
    let text = report::format_result(&request.result, request.capacity, &options);

    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        text,
    )
        .into_response())
}

/// Stored solution for a canonical signature
async fn history_entry(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> Result<Response, AppError> {
    let history = state.history.clone();
    let key = signature.clone();
    let record = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<HistoryRecord>> {
        let mut store = history
            .lock()
            .map_err(|_| anyhow!("history store lock poisoned"))?;
        store.refresh();
        Ok(store.lookup(&key))
    })
    .await
    .map_err(anyhow::Error::from)??;

    match record {
        Some(record) => Ok(Json(record).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("No stored solution for '{}'", signature),
            })),
        )
            .into_response()),
    }
}

/// Application error type
struct AppError(anyhow::Error);

impl From<OptimizerError> for AppError {
    fn from(err: OptimizerError) -> Self {
        AppError(err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request error: {}", self.0);

        let status = match self.0.downcast_ref::<OptimizerError>() {
            Some(
                OptimizerError::InvalidDemand(_)
                | OptimizerError::InvalidCapacity(_)
                | OptimizerError::PieceTooWide { .. }
                | OptimizerError::InvalidInput(_),
            ) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(json!({
                "error": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_app(dir: &tempfile::TempDir) -> Router {
        app(AppState::new(JsonFileStore::open(
            dir.path().join("history.json"),
        )))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::get("/api/health").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(&dir), request).await;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "healthy");
    }

    #[tokio::test]
    async fn test_optimize_then_reuse_from_history() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let body = json!({
            "demand": {"100": 12},
            "capacity": 1200,
            "target": 99.0,
            "algorithm": "ffd"
        });

        let (status, first) = send(app.clone(), post_json("/api/optimize", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let first: Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(first["result"]["sheet_count"], 1);
        assert_eq!(first["target_met"], true);
        assert_eq!(first["from_history"], false);
        assert_eq!(first["signature"], "100x12|alg:ffd");
        assert!(first["report"]
            .as_str()
            .unwrap()
            .contains("FINAL CUTTING PLAN"));

        let (status, second) = send(app, post_json("/api/optimize", body)).await;
        assert_eq!(status, StatusCode::OK);
        let second: Value = serde_json::from_slice(&second).unwrap();
        assert_eq!(second["from_history"], true);
        assert_eq!(second["result"], first["result"]);
    }

    #[tokio::test]
    async fn test_optimize_rejects_invalid_input() {
        let dir = tempfile::tempdir().unwrap();

        let too_wide = json!({"demand": {"1300": 1}, "capacity": 1200});
        let (status, _) = send(test_app(&dir), post_json("/api/optimize", too_wide)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let no_capacity = json!({"demand": {"300": 1}, "capacity": 0});
        let (status, body) = send(test_app(&dir), post_json("/api/optimize", no_capacity)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].as_str().unwrap().contains("capacity"));
    }

    #[tokio::test]
    async fn test_report_endpoint_renders_text() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({
            "result": {
                "sheet_count": 1,
                "utilization_percent": 100.0,
                "sheets": [{"used_width": 1200, "leftover": 0, "cuts": [600, 600]}]
            },
            "capacity": 1200,
            "bar_width": 20
        });

        let (status, text) = send(test_app(&dir), post_json("/api/report", body)).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("Sheet 1 : [600×2]"));
        assert!(text.contains(&format!("|{}|", "█".repeat(20))));
    }

    #[tokio::test]
    async fn test_report_rejects_oversized_bar() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({
            "result": {
                "sheet_count": 1,
                "utilization_percent": 50.0,
                "sheets": [{"used_width": 600, "leftover": 600, "cuts": [600]}]
            },
            "capacity": 1200,
            "bar_width": usize::MAX / 2
        });

        let (status, body) = send(test_app(&dir), post_json("/api/report", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].as_str().unwrap().contains("bar width"));
    }

    #[tokio::test]
    async fn test_history_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let body = json!({"demand": {"700": 2}, "algorithm": "best_fit", "seed": 1});
        let (status, _) = send(app.clone(), post_json("/api/optimize", body)).await;
        assert_eq!(status, StatusCode::OK);

        let found = Request::get("/api/history/700x2%7Calg:best_fit")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), found).await;
        assert_eq!(status, StatusCode::OK);
        let record: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(record["sheet_count"], 2);
        assert!(record["timestamp"].is_string());

        let missing = Request::get("/api/history/1x1%7Calg:ffd")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
