use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ovt_models::config::TraderConfig;
use ovt_models::records::DashboardData;
use ovt_store::StoreError;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::service::TradingService;

const DEFAULT_RUN_LIMIT: usize = 20;
const DEFAULT_BACKTEST_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(e) => ApiError::Unprocessable(e.to_string()),
            StoreError::Unavailable(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRequest {
    pub notes: Option<String>,
    pub override_config: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoRequest {
    pub initial_balance: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

pub fn router(service: Arc<TradingService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/runs", post(create_run).get(list_runs))
        .route("/runs/:id", get(get_run))
        .route("/backtests", post(create_backtest).get(list_backtests))
        .route("/demo", post(create_demo))
        .route("/dashboard", get(dashboard))
        .route(
            "/config",
            get(get_config).put(replace_config).patch(update_config),
        )
        .with_state(service)
}

/// GET /
async fn index() -> Json<Value> {
    Json(json!({
        "name": "ov-trader",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "POST /runs",
            "GET /runs",
            "GET /runs/{id}",
            "POST /backtests",
            "GET /backtests",
            "POST /demo",
            "GET /dashboard",
            "GET /config",
            "PUT /config",
            "PATCH /config",
        ],
    }))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /runs
async fn create_run(
    State(service): State<Arc<TradingService>>,
    body: Option<Json<CycleRequest>>,
) -> ApiResult<Value> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let run = service
        .run_cycle(req.notes, req.override_config.as_ref())
        .await?;
    Ok(Json(json!({ "run": run })))
}

/// GET /runs?limit=20
async fn list_runs(
    State(service): State<Arc<TradingService>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Value> {
    let runs = service.runs(Some(params.limit.unwrap_or(DEFAULT_RUN_LIMIT)))?;
    Ok(Json(json!({ "runs": runs })))
}

/// GET /runs/:id
async fn get_run(
    State(service): State<Arc<TradingService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let run = service
        .run(id)?
        .ok_or_else(|| ApiError::NotFound(format!("run {id} not found")))?;
    Ok(Json(json!({ "run": run })))
}

/// POST /backtests
async fn create_backtest(
    State(service): State<Arc<TradingService>>,
    body: Option<Json<CycleRequest>>,
) -> ApiResult<Value> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let backtest = service
        .run_backtest(req.notes, req.override_config.as_ref())
        .await?;
    Ok(Json(json!({ "backtest": backtest })))
}

/// GET /backtests?limit=10
async fn list_backtests(
    State(service): State<Arc<TradingService>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Value> {
    let limit = params.limit.unwrap_or(DEFAULT_BACKTEST_LIMIT);
    let backtests = service.backtests(Some(limit))?;
    Ok(Json(json!({ "backtests": backtests })))
}

/// POST /demo
async fn create_demo(
    State(service): State<Arc<TradingService>>,
    body: Option<Json<DemoRequest>>,
) -> ApiResult<Value> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let demo = service.run_demo(req.initial_balance, req.notes)?;
    Ok(Json(json!({ "demo": demo })))
}

/// GET /dashboard
async fn dashboard(State(service): State<Arc<TradingService>>) -> ApiResult<DashboardData> {
    Ok(Json(service.dashboard()?))
}

/// GET /config
async fn get_config(State(service): State<Arc<TradingService>>) -> ApiResult<TraderConfig> {
    Ok(Json(service.config()?))
}

/// PUT /config
async fn replace_config(
    State(service): State<Arc<TradingService>>,
    Json(payload): Json<Value>,
) -> ApiResult<TraderConfig> {
    Ok(Json(service.replace_config(payload)?))
}

/// PATCH /config
async fn update_config(
    State(service): State<Arc<TradingService>>,
    Json(patch): Json<Value>,
) -> ApiResult<TraderConfig> {
    Ok(Json(service.update_config(&patch)?))
}
