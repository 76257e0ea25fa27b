//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `WSMQ_LISTEN`, `WSMQ_BROKER_ADDR`
//! 2. **Config file** — path via `--config <path>`, or `wsmq.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8083"
//!
//! [broker]
//! addr = "127.0.0.1:1883"
//!
//! [transport]
//! read_chunk_size = 65536          # bytes per TCP read
//! flush_threshold = 131072         # force a flush past this many pending bytes
//! small_packet_threshold = 100     # flush immediately below this chunk size
//! heartbeat = false                # transport-level WS ping/pong
//! heartbeat_interval_secs = 30     # only used when heartbeat = true
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8083`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Upstream MQTT broker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// `host:port` of the TCP broker (default `127.0.0.1:1883`).
    #[serde(default = "default_broker_addr")]
    pub addr: String,
}

/// Per-session transport policy. Fixed at startup, not tunable per session.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransportConfig {
    /// Bytes read from the broker per TCP read (default 65536).
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Pending-byte count past which a write forces a flush (default 131072).
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Chunks smaller than this flush immediately — they are presumed to be
    /// MQTT acks or pings that must not wait behind bulk payload (default 100).
    #[serde(default = "default_small_packet_threshold")]
    pub small_packet_threshold: usize,
    /// Transport-level WebSocket ping/pong (default false). MQTT carries its
    /// own keepalive through the pumps; a second one competes with it for the
    /// send path and can tear down a healthy session under load.
    #[serde(default)]
    pub heartbeat: bool,
    /// Seconds between transport pings when `heartbeat = true` (default 30).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Supervisor settings for `wsmq supervise`.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Maximum seconds between restart attempts (default 60).
    #[serde(default = "default_supervisor_max_backoff")]
    pub max_backoff: u64,
    /// Seconds of uptime before resetting backoff (default 60).
    #[serde(default = "default_supervisor_stable_threshold")]
    pub stable_threshold: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8083".to_string()
}
fn default_broker_addr() -> String {
    "127.0.0.1:1883".to_string()
}
fn default_read_chunk_size() -> usize {
    65536
}
fn default_flush_threshold() -> usize {
    131072
}
fn default_small_packet_threshold() -> usize {
    100
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_supervisor_max_backoff() -> u64 {
    60
}
fn default_supervisor_stable_threshold() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            addr: default_broker_addr(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: default_read_chunk_size(),
            flush_threshold: default_flush_threshold(),
            small_packet_threshold: default_small_packet_threshold(),
            heartbeat: false,
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_backoff: default_supervisor_max_backoff(),
            stable_threshold: default_supervisor_stable_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            broker: BrokerConfig::default(),
            transport: TransportConfig::default(),
            logging: LoggingConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `wsmq.toml` in the current directory, falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("wsmq.toml").exists() {
            let content = std::fs::read_to_string("wsmq.toml").expect("Failed to read wsmq.toml");
            toml::from_str(&content).expect("Failed to parse wsmq.toml")
        } else {
            Config::default()
        };

        // Env var overrides
        if let Ok(listen) = std::env::var("WSMQ_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(addr) = std::env::var("WSMQ_BROKER_ADDR") {
            config.broker.addr = addr;
        }

        config
    }
}
