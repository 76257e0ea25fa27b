//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Shared application state for the wsmq server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Process-wide session counters.
    pub stats: Arc<BridgeStats>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            stats: Arc::new(BridgeStats::new()),
        }
    }
}

/// Bridge statistics — atomics for lock-free updates from session tasks.
///
/// Sessions are otherwise fully independent; these counters are the only
/// cross-session state in the process.
pub struct BridgeStats {
    /// Sessions currently in the `Active` or `Closing` state.
    pub active_sessions: AtomicU64,
    /// Sessions accepted since startup, including ones that failed to dial.
    pub total_sessions: AtomicU64,
    /// Broker dials that failed before a session became active.
    pub upstream_failures: AtomicU64,
}

impl BridgeStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            active_sessions: AtomicU64::new(0),
            total_sessions: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}
