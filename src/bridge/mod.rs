//! WebSocket ↔ TCP bridging for MQTT.
//!
//! MQTT clients stuck behind HTTP-only firewalls connect here over WebSocket;
//! each accepted connection is bridged to the TCP-only broker byte-for-byte,
//! with no parsing of the MQTT payload in either direction:
//!
//! ```text
//! client ── ws binary frames ──> inbound pump ── batched writes ──> broker
//! client <── ws binary frames ── outbound pump <── chunked reads ── broker
//! ```
//!
//! One [`session::BridgeSession`] per accepted socket owns the whole
//! lifecycle; the pumps in [`pump`] are pure one-directional forwarders, and
//! [`batch::BatchedWriter`] carries the MQTT-tuned flush policy on the
//! inbound path.

pub mod batch;
pub mod pump;
pub mod session;
pub mod upstream;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use tracing::{info_span, Instrument};

use crate::AppState;

use session::BridgeSession;

/// The registered WebSocket sub-protocol name for MQTT. Declared during the
/// upgrade so conforming clients can verify they reached an MQTT endpoint.
pub const SUBPROTOCOL: &str = "mqtt";

/// `GET /mqtt` — WebSocket upgrade handler.
///
/// Runs one bridging session per accepted socket under its own tracing span.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let session = BridgeSession::new(&state);
    let broker_addr = state.config.broker.addr.clone();
    let span = info_span!("session", id = %session.id());
    ws.protocols([SUBPROTOCOL]).on_upgrade(move |socket| {
        async move { session.run(socket, &broker_addr).await }.instrument(span)
    })
}
