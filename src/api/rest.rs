// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only surface.  Liveness (`/`, `/api/v1/health`) touches no state at
// all so it keeps answering whatever the decision loop is doing.  Decision
// history is re-queried from the ledger on every request.
//
// CORS is configured permissively; the API exposes no write operations.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;

/// Rows returned by `/api/v1/decisions` when no limit is given.
pub const DEFAULT_DECISION_LIMIT: usize = 50;
const MAX_DECISION_LIMIT: usize = 1000;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Liveness ────────────────────────────────────────────────
        .route("/", get(health))
        .route("/api/v1/health", get(health))
        // ── Read-only views ─────────────────────────────────────────
        .route("/api/v1/status", get(status))
        .route("/api/v1/decisions", get(decisions))
        .route("/api/v1/calibration", get(calibration))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the task is dropped.
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind API server on {addr}"))?;
    info!(addr = %addr, "API server listening");
    axum::serve(listener, router(state))
        .await
        .context("API server failed")
}

// =============================================================================
// Liveness
// =============================================================================

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Status
// =============================================================================

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_status())
}

// =============================================================================
// Decisions
// =============================================================================

#[derive(Debug, Deserialize)]
struct DecisionsQuery {
    symbol: Option<String>,
    limit: Option<usize>,
}

async fn decisions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DecisionsQuery>,
) -> impl IntoResponse {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_DECISION_LIMIT)
        .min(MAX_DECISION_LIMIT);
    let symbol = q.symbol.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty());
    let rows = state.ledger.read(symbol.as_deref(), limit).await;
    Json(rows)
}

// =============================================================================
// Calibration
// =============================================================================

async fn calibration(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.calibration())
}
