//! The two byte-forwarding pumps of a bridging session.
//!
//! Each pump forwards bytes in exactly one direction and knows nothing about
//! the other: [`inbound_pump`] drains WebSocket frames into the broker socket
//! through the batching writer, [`outbound_pump`] drains the broker socket
//! into outbound binary messages. Neither retries nor distinguishes error
//! subtypes — any transport failure ends the pump, and the session supervisor
//! resolves what that means for the session.
//!
//! Every blocking read, write, and send is raced against the supervisor's
//! [`CancellationToken`] so the losing pump of the teardown race is
//! interrupted mid-call instead of waiting out its own completion.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::batch::BatchedWriter;

/// Terminal result of one pump. The supervisor treats all variants alike when
/// resolving the race; the distinction exists for the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The transport being drained ended cleanly.
    PeerClosed,
    /// A read, write, or send failed. Not retried.
    TransportError,
    /// The supervisor cancelled this pump after the other one ended.
    Cancelled,
}

impl PumpOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::TransportError => "transport_error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// WebSocket → TCP. Drains inbound frames and writes binary payloads through
/// the batching writer.
///
/// Binary frames are the bridged traffic. A Close frame or the end of the
/// stream flushes any coalesced remainder and ends the pump cleanly. Text
/// frames are not bridged (MQTT-over-WebSocket is binary-only); Ping/Pong are
/// the framework's concern.
pub async fn inbound_pump<S, E, W>(
    frames: &mut S,
    broker: &mut BatchedWriter<W>,
    cancel: CancellationToken,
) -> PumpOutcome
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => return PumpOutcome::Cancelled,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(Message::Binary(data))) => {
                let write = tokio::select! {
                    () = cancel.cancelled() => return PumpOutcome::Cancelled,
                    result = broker.write_chunk(&data) => result,
                };
                if let Err(e) = write {
                    debug!("inbound pump: broker write failed: {e}");
                    return PumpOutcome::TransportError;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                // Peer is done; hand any coalesced remainder to the OS.
                let flush = tokio::select! {
                    () = cancel.cancelled() => return PumpOutcome::Cancelled,
                    result = broker.finish() => result,
                };
                if let Err(e) = flush {
                    debug!("inbound pump: final flush failed: {e}");
                    return PumpOutcome::TransportError;
                }
                return PumpOutcome::PeerClosed;
            }
            Some(Ok(Message::Text(_))) => {
                debug!("inbound pump: ignoring text frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("inbound pump: websocket error: {e}");
                return PumpOutcome::TransportError;
            }
        }
    }
}

/// TCP → WebSocket. Reads the broker in fixed-size chunks and forwards each
/// non-empty chunk as one binary message.
///
/// No batching on this side: the WebSocket transport frames and flushes each
/// message itself, and the broker paces reads. A zero-length read is orderly
/// broker shutdown and ends the pump.
///
/// `ping_interval` is `Some` only when the transport heartbeat option is
/// enabled; the shipped policy is `None`, because MQTT's own keepalive flows
/// through the pumps like any other payload.
pub async fn outbound_pump<R, K, E>(
    broker: &mut R,
    frames: &mut K,
    read_chunk_size: usize,
    ping_interval: Option<Duration>,
    cancel: CancellationToken,
) -> PumpOutcome
where
    R: AsyncRead + Unpin,
    K: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let mut buf = vec![0u8; read_chunk_size];
    let mut ping =
        ping_interval.map(|d| tokio::time::interval_at(tokio::time::Instant::now() + d, d));

    loop {
        tokio::select! {
            () = cancel.cancelled() => return PumpOutcome::Cancelled,
            read = broker.read(&mut buf) => match read {
                Ok(0) => return PumpOutcome::PeerClosed,
                Ok(n) => {
                    let msg = Message::Binary(Bytes::copy_from_slice(&buf[..n]));
                    let sent = tokio::select! {
                        () = cancel.cancelled() => return PumpOutcome::Cancelled,
                        result = frames.send(msg) => result,
                    };
                    if let Err(e) = sent {
                        debug!("outbound pump: websocket send failed: {e}");
                        return PumpOutcome::TransportError;
                    }
                }
                Err(e) => {
                    debug!("outbound pump: broker read failed: {e}");
                    return PumpOutcome::TransportError;
                }
            },
            Some(()) = tick(&mut ping) => {
                if let Err(e) = frames.send(Message::Ping(Bytes::new())).await {
                    debug!("outbound pump: ping failed: {e}");
                    return PumpOutcome::TransportError;
                }
            }
        }
    }
}

/// Resolves on the next heartbeat tick, or never when the heartbeat is off.
async fn tick(ping: &mut Option<tokio::time::Interval>) -> Option<()> {
    match ping.as_mut() {
        Some(interval) => {
            interval.tick().await;
            Some(())
        }
        None => None,
    }
}
