//! End-to-end bridge tests: real router, real sockets, a stub TCP broker,
//! and `tokio-tungstenite` as the WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use wsmq::{AppState, Config};

const WAIT: Duration = Duration::from_secs(5);

/// First bytes of an MQTT CONNECT packet — opaque payload as far as the
/// bridge is concerned, but realistic traffic.
const CONNECT: &[u8] = b"\x10\x10\x00\x04MQTT\x04\x02\x00\x3c\x00\x04wsmq";
/// CONNACK, session-present 0, accepted.
const CONNACK: &[u8] = b"\x20\x02\x00\x00";

/// Serve the real router on an ephemeral port, bridging to `broker_addr`.
async fn serve_app(broker_addr: SocketAddr) -> SocketAddr {
    let mut config = Config::default();
    config.server.listen = "127.0.0.1:0".to_string();
    config.broker.addr = broker_addr.to_string();

    let app = wsmq::router(AppState::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect a WebSocket client requesting the `mqtt` sub-protocol.
async fn connect(addr: SocketAddr) -> (WsClient, tokio_tungstenite::tungstenite::handshake::client::Response) {
    let mut request = format!("ws://{addr}/mqtt").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", "mqtt".parse().unwrap());
    timeout(WAIT, tokio_tungstenite::connect_async(request))
        .await
        .expect("handshake timed out")
        .expect("handshake failed")
}

#[tokio::test]
async fn negotiates_mqtt_subprotocol() {
    let broker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = serve_app(broker.local_addr().unwrap()).await;

    let (_ws, response) = connect(addr).await;
    let negotiated = response
        .headers()
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok());
    assert_eq!(negotiated, Some("mqtt"));
}

#[tokio::test]
async fn bridges_bytes_in_both_directions() {
    let broker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = serve_app(broker.local_addr().unwrap()).await;

    let (mut ws, _) = connect(addr).await;
    let (mut broker_sock, _) = timeout(WAIT, broker.accept())
        .await
        .expect("bridge never dialed the broker")
        .unwrap();

    // Client → broker. The CONNECT is under the small-packet threshold, so it
    // must arrive without waiting for more traffic.
    ws.send(Message::Binary(Bytes::from_static(CONNECT)))
        .await
        .unwrap();
    let mut buf = vec![0u8; 256];
    let n = timeout(WAIT, broker_sock.read(&mut buf))
        .await
        .expect("CONNECT never reached the broker")
        .unwrap();
    assert_eq!(&buf[..n], CONNECT);

    // Broker → client: one TCP write surfaces as one binary message.
    broker_sock.write_all(CONNACK).await.unwrap();
    let msg = timeout(WAIT, ws.next())
        .await
        .expect("CONNACK never reached the client")
        .unwrap()
        .unwrap();
    assert_eq!(msg, Message::Binary(Bytes::from_static(CONNACK)));
}

#[tokio::test]
async fn unreachable_broker_closes_with_error_code_before_any_pump() {
    // Grab a free port and release it so nothing is listening there.
    let placeholder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker_addr = placeholder.local_addr().unwrap();
    drop(placeholder);

    let addr = serve_app(broker_addr).await;
    let (mut ws, _) = connect(addr).await;

    let msg = timeout(WAIT, ws.next())
        .await
        .expect("no close frame after dial failure")
        .unwrap()
        .unwrap();
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Error);
            assert_eq!(frame.reason.as_str(), "upstream unreachable");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn broker_disconnect_tears_down_the_session() {
    let broker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = serve_app(broker.local_addr().unwrap()).await;

    let (mut ws, _) = connect(addr).await;
    let (broker_sock, _) = timeout(WAIT, broker.accept()).await.unwrap().unwrap();

    // Broker drops the connection while the client is idle.
    drop(broker_sock);

    let closed = timeout(WAIT, async {
        loop {
            match ws.next().await {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "websocket stayed open after broker disconnect");
}

#[tokio::test]
async fn client_disconnect_closes_the_broker_socket() {
    let broker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = serve_app(broker.local_addr().unwrap()).await;

    let (mut ws, _) = connect(addr).await;
    let (mut broker_sock, _) = timeout(WAIT, broker.accept()).await.unwrap().unwrap();

    ws.close(None).await.unwrap();

    // The bridge must shut the broker socket down as part of teardown, not
    // leave it to linger: the stub sees EOF.
    let mut buf = [0u8; 16];
    let n = timeout(WAIT, broker_sock.read(&mut buf))
        .await
        .expect("broker socket still open after client disconnect")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn pending_bytes_flush_when_client_closes() {
    let broker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = serve_app(broker.local_addr().unwrap()).await;

    let (mut ws, _) = connect(addr).await;
    let (mut broker_sock, _) = timeout(WAIT, broker.accept()).await.unwrap().unwrap();

    // 4 KiB is above the small-packet threshold and far below the flush
    // threshold: it sits in the batch buffer until the close drains it.
    let payload = vec![0x5au8; 4096];
    ws.send(Message::Binary(Bytes::from(payload.clone())))
        .await
        .unwrap();
    ws.close(None).await.unwrap();

    let mut received = Vec::new();
    timeout(WAIT, broker_sock.read_to_end(&mut received))
        .await
        .expect("payload never flushed to the broker")
        .unwrap();
    assert_eq!(received, payload);
}

#[tokio::test]
async fn health_reports_ok_over_plain_http() {
    let broker = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = serve_app(broker.local_addr().unwrap()).await;

    let mut sock = TcpStream::connect(addr).await.unwrap();
    sock.write_all(b"GET /api/health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(WAIT, sock.read_to_string(&mut response))
        .await
        .expect("no health response")
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"status\":\"ok\""), "{response}");
}
