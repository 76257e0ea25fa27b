//! Unauthenticated health-check endpoint.

use std::sync::atomic::Ordering;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/health` — liveness probe.
///
/// Returns status, uptime, version, the configured broker address, and the
/// session counters. No authentication required, suitable for load-balancer
/// health checks.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.start_time.elapsed().as_secs();
    let stats = &state.stats;

    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
        "broker": state.config.broker.addr,
        "sessions": {
            "active": stats.active_sessions.load(Ordering::Relaxed),
            "total": stats.total_sessions.load(Ordering::Relaxed),
            "upstream_failures": stats.upstream_failures.load(Ordering::Relaxed),
        },
    }))
}
