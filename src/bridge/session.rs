//! Session supervisor — owns one bridging session end to end.
//!
//! The supervisor is the only component with lifecycle authority: it dials
//! the broker, starts both pumps, races them to first completion, cancels
//! the loser, and releases both transports before returning. The pumps are
//! pure forwarders with no awareness of each other.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::io::BufWriter;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::state::{AppState, BridgeStats};

use super::batch::BatchedWriter;
use super::pump::{inbound_pump, outbound_pump};

/// How long teardown waits for the cancelled pump before closing the socket
/// out from under it. Cancellation is best-effort; the close is not.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Session lifecycle. Transitions are monotonic; no state is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upstream dial in flight.
    Connecting,
    /// Both pumps running.
    Active,
    /// One pump ended; cancellation issued to the other.
    Closing,
    /// Both transports released.
    Closed,
}

impl SessionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Which pump won the first-completion race.
#[derive(Debug, Clone, Copy)]
enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "ws->tcp",
            Self::Outbound => "tcp->ws",
        }
    }
}

/// One bridging session: an accepted WebSocket paired with a dialed broker
/// connection. Owned by its `run` call for its entire lifetime.
pub struct BridgeSession {
    id: Uuid,
    policy: TransportConfig,
    stats: Arc<BridgeStats>,
    state: SessionState,
}

impl BridgeSession {
    #[must_use]
    pub fn new(app: &AppState) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy: app.config.transport,
            stats: app.stats.clone(),
            state: SessionState::Connecting,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = self.state.as_str(), to = next.as_str(), "session state");
        self.state = next;
    }

    /// Run the session to completion. When this returns, both transports are
    /// released — teardown is synchronous with the supervisor, never deferred,
    /// so a broker that evicts duplicate client ids never sees a lingering
    /// socket from a client that already reconnected.
    pub async fn run(mut self, socket: WebSocket, broker_addr: &str) {
        self.stats.total_sessions.fetch_add(1, Ordering::Relaxed);

        // Dial first: if the broker is unreachable there is nothing to
        // bridge, and no pump may ever start.
        let broker = match super::upstream::dial(broker_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("broker {broker_addr} unreachable: {e}");
                self.stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
                self.close_unreachable(socket).await;
                return;
            }
        };

        self.transition(SessionState::Active);
        self.stats.active_sessions.fetch_add(1, Ordering::Relaxed);
        info!("bridging to {broker_addr}");

        // One half per pump: the inbound pump is the only writer of the broker
        // socket and the outbound pump its only reader, so no locking is
        // needed. The write half sits behind a BufWriter sized to the flush
        // threshold — that buffer is what the batching policy drains.
        let (mut broker_rx, broker_wr) = broker.into_split();
        let mut broker_tx = BatchedWriter::new(
            BufWriter::with_capacity(self.policy.flush_threshold, broker_wr),
            self.policy.flush_threshold,
            self.policy.small_packet_threshold,
        );
        let (mut ws_tx, mut ws_rx) = socket.split();

        let ping = self
            .policy
            .heartbeat
            .then(|| Duration::from_secs(self.policy.heartbeat_interval_secs));
        let cancel = CancellationToken::new();

        // First completion wins, success and error alike: a half-open bridge
        // (one side dead, one still pumping) is unsafe to keep alive.
        let (first, first_outcome, second) = {
            let inbound = inbound_pump(&mut ws_rx, &mut broker_tx, cancel.clone());
            let outbound = outbound_pump(
                &mut broker_rx,
                &mut ws_tx,
                self.policy.read_chunk_size,
                ping,
                cancel.clone(),
            );
            tokio::pin!(inbound);
            tokio::pin!(outbound);

            let (first, first_outcome) = tokio::select! {
                outcome = &mut inbound => (Direction::Inbound, outcome),
                outcome = &mut outbound => (Direction::Outbound, outcome),
            };

            self.transition(SessionState::Closing);
            cancel.cancel();
            let second = match first {
                Direction::Inbound => timeout(TEARDOWN_GRACE, &mut outbound).await,
                Direction::Outbound => timeout(TEARDOWN_GRACE, &mut inbound).await,
            };
            (first, first_outcome, second)
        };

        // The broker socket is assumed gone past this point no matter what
        // close reports; dropping both halves releases the fd exactly once.
        if let Err(e) = broker_tx.shutdown().await {
            debug!("broker shutdown: {e}");
        }
        let _ = ws_tx.close().await;

        self.stats.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.transition(SessionState::Closed);

        match second {
            Ok(second_outcome) => info!(
                first = first.as_str(),
                outcome = first_outcome.as_str(),
                other = second_outcome.as_str(),
                "session closed"
            ),
            Err(_) => warn!(
                first = first.as_str(),
                outcome = first_outcome.as_str(),
                "session closed; cancelled pump did not exit within grace period"
            ),
        }
    }

    /// Terminal setup-failure path: tell the peer the upstream is unreachable
    /// with the distinguished close code. No pump has started.
    async fn close_unreachable(&mut self, mut socket: WebSocket) {
        let frame = CloseFrame {
            code: close_code::ERROR,
            reason: Utf8Bytes::from_static("upstream unreachable"),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
        self.transition(SessionState::Closed);
    }
}
