#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! wsmq library — exposes the bridge building blocks for the binary and the
//! integration tests.
//!
//! - `bridge` — the per-connection bridging session (upgrade, dial, pumps)
//! - `config` — configuration loading
//! - `routes` — REST route handlers
//! - `state` — shared application state
//! - `supervisor` — restart-on-crash wrapper for `wsmq supervise`

pub mod bridge;
pub mod config;
pub mod routes;
pub mod state;
pub mod supervisor;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use state::AppState;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Assemble the router: health probe plus the bridge endpoint.
///
/// Shared by `main` and the integration tests so both serve the same app.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/mqtt", get(bridge::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
