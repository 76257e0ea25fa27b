#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # wsmq
//!
//! MQTT-over-WebSocket bridge for brokers that only speak TCP.
//!
//! MQTT clients behind HTTP-only firewalls connect to `ws://host:8083/mqtt`
//! (sub-protocol `mqtt`); each accepted connection is bridged to the
//! configured broker over a fresh TCP connection, byte-for-byte and in both
//! directions, until either side closes. The bridge never parses MQTT.
//!
//! ## Subcommands
//!
//! - `wsmq serve` (default) — run the bridge
//! - `wsmq supervise` — run as supervisor: starts the bridge and restarts on crash
//!
//! ## API surface
//!
//! | Method | Path          | Description                          |
//! |--------|---------------|--------------------------------------|
//! | GET    | `/api/health` | Liveness probe + session counters    |
//! | GET    | `/mqtt`       | WebSocket endpoint, bridged to TCP   |
//!
//! ## Architecture
//!
//! ```text
//! main.rs            — entry point, clap subcommands, router, graceful shutdown
//! supervisor.rs      — built-in supervisor (spawn/restart loop)
//! config.rs          — TOML + env-var configuration
//! state.rs           — AppState, session counters
//! routes/
//!   health.rs        — GET /api/health
//! bridge/
//!   mod.rs           — WebSocket upgrade, sub-protocol declaration
//!   session.rs       — per-session supervisor (dial, race, teardown)
//!   pump.rs          — the two one-directional byte pumps
//!   batch.rs         — MQTT-tuned write batching (flush thresholds)
//!   upstream.rs      — broker dialer
//! ```

use clap::{Parser, Subcommand};
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;
use tracing::{info, warn};

use wsmq::bridge::upstream;
use wsmq::{AppState, Config};

/// MQTT-over-WebSocket bridge for TCP-only brokers.
#[derive(Parser)]
#[command(name = "wsmq", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
    /// Run as supervisor: starts the bridge and restarts on crash.
    Supervise {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Supervise { config }) => {
            run_supervisor_mode(config.as_deref()).await;
        }
        Some(Commands::Serve { config }) => {
            run_server(config.as_deref()).await;
        }
        None => {
            // Backward compat: no subcommand but --config may be passed
            let args: Vec<String> = std::env::args().collect();
            let config_path = args
                .windows(2)
                .find(|w| w[0] == "--config")
                .map(|w| w[1].clone());
            run_server(config_path.as_deref()).await;
        }
    }
}

async fn run_supervisor_mode(config_path: Option<&str>) -> ! {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("wsmq supervisor starting");
    wsmq::supervisor::run_supervisor(config_path, &config.supervisor).await
}

async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("wsmq v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Bridging ws://{}/mqtt -> tcp://{}",
        config.server.listen, config.broker.addr
    );
    if config.transport.heartbeat {
        warn!("Transport heartbeat enabled — MQTT keepalive already covers liveness");
    }

    // Informational reachability probe; sessions dial for themselves.
    match upstream::dial(&config.broker.addr).await {
        Ok(_) => info!("Broker reachable at {}", config.broker.addr),
        Err(e) => warn!("Broker not reachable yet at {}: {e}", config.broker.addr),
    }

    let state = AppState::new(config);
    let app = wsmq::router(state.clone());

    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .expect("Failed to bind");

    info!("Server ready");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    info!("Shutting down...");
    let active = state.stats.active_sessions.load(Ordering::Relaxed);
    if active > 0 {
        info!("{active} sessions still active at shutdown");
    }
    info!("Goodbye");
}
