// =============================================================================
// Command Shell: REST endpoints (Axum 0.7)
// =============================================================================
//
// A thin request/response layer over the published indicator snapshot:
//
//   GET  /api/v1/health      liveness
//   GET  /api/v1/rsi         current RSI (or "not enough data")
//   GET  /api/v1/test-mode   test-mode flag
//   POST /api/v1/test-mode   set the flag
//   POST /api/v1/test-alert  push a synthetic alert through the live sink
//
// The shell is bound to localhost by default and carries no authentication.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::ShellState;
use crate::types::Direction;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<ShellState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/rsi", get(current_rsi))
        .route("/api/v1/test-mode", get(get_test_mode).post(set_test_mode))
        .route("/api/v1/test-alert", post(test_alert))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    symbol: String,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<ShellState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        symbol: state.policy.symbol().to_string(),
        uptime_secs: state.uptime_secs(),
        server_time: Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Current RSI
// =============================================================================

#[derive(Serialize)]
struct RsiResponse {
    symbol: String,
    period: usize,
    ready: bool,
    rsi: Option<f64>,
    closes: usize,
    last_close: Option<f64>,
    message: String,
}

async fn current_rsi(State(state): State<Arc<ShellState>>) -> impl IntoResponse {
    let snap = state.snapshot();
    let message = match snap.rsi {
        Some(rsi) => format!("The current RSI is: {rsi:.2}"),
        None => format!(
            "Not enough data to calculate RSI. Current closes: {}",
            snap.closes
        ),
    };

    Json(RsiResponse {
        symbol: snap.symbol,
        period: snap.period,
        ready: snap.rsi.is_some(),
        rsi: snap.rsi,
        closes: snap.closes,
        last_close: snap.last_close,
        message,
    })
}

// =============================================================================
// Test mode
// =============================================================================

#[derive(Serialize)]
struct TestModeResponse {
    enabled: bool,
    message: String,
}

impl TestModeResponse {
    fn current(enabled: bool) -> Self {
        let word = if enabled { "enabled" } else { "disabled" };
        Self {
            enabled,
            message: format!("Test mode is currently {word}."),
        }
    }
}

#[derive(Deserialize)]
struct TestModeRequest {
    enabled: bool,
}

async fn get_test_mode(State(state): State<Arc<ShellState>>) -> impl IntoResponse {
    Json(TestModeResponse::current(state.test_mode()))
}

async fn set_test_mode(
    State(state): State<Arc<ShellState>>,
    Json(req): Json<TestModeRequest>,
) -> impl IntoResponse {
    state.set_test_mode(req.enabled);
    info!(enabled = req.enabled, "test mode updated");

    let word = if req.enabled { "enabled" } else { "disabled" };
    Json(TestModeResponse {
        enabled: req.enabled,
        message: format!("Test mode is now {word}."),
    })
}

// =============================================================================
// Test alert
// =============================================================================

#[derive(Deserialize)]
struct TestAlertRequest {
    rsi: f64,
}

#[derive(Serialize)]
struct TestAlertResponse {
    alert_id: String,
    at: DateTime<Utc>,
    direction: Direction,
    rsi: f64,
    dispatched: bool,
    message: String,
}

async fn test_alert(
    State(state): State<Arc<ShellState>>,
    Json(req): Json<TestAlertRequest>,
) -> impl IntoResponse {
    if !state.test_mode() {
        let body = serde_json::json!({
            "error": "Test mode is not enabled. POST /api/v1/test-mode {\"enabled\": true} to enable it.",
        });
        return (StatusCode::CONFLICT, Json(body)).into_response();
    }

    if !(0.0..=100.0).contains(&req.rsi) {
        warn!(rsi = req.rsi, "test alert rejected: RSI out of range");
        let body = serde_json::json!({ "error": "rsi must be between 0 and 100" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let alert = state.policy.decide(req.rsi);
    let dispatched = state.dispatcher.dispatch(alert.clone()).is_some();
    info!(alert_id = %alert.id, rsi = req.rsi, direction = %alert.direction, dispatched, "test alert");

    Json(TestAlertResponse {
        alert_id: alert.id.clone(),
        at: alert.at,
        direction: alert.direction,
        rsi: alert.rsi,
        dispatched,
        message: alert.message(),
    })
    .into_response()
}
