//! Upstream dialer — opens the TCP connection to the broker for a new session.

use tokio::net::TcpStream;
use tracing::debug;

/// Dial the broker. No protocol handshake happens here: the MQTT CONNECT is
/// opaque payload the inbound pump forwards later.
///
/// Failure has no side effects; the caller owns the close-code response
/// toward the WebSocket peer.
pub async fn dial(addr: &str) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    // Coalescing happens in the session's write buffer; Nagle on top of it
    // would only delay packets that were flushed on purpose.
    stream.set_nodelay(true)?;
    debug!("connected to broker at {addr}");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dial_succeeds_against_live_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = dial(&addr.to_string()).await.unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn dial_reports_unreachable_broker() {
        // Grab a free port and release it so nothing is listening there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(dial(&addr.to_string()).await.is_err());
    }
}
