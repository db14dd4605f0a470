//! Session over a real WebSocket, against a loopback server.

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::{Value, json};
use tdlink_core::{Event, encode, kinds, probe};
use tdlink_session::transport::websocket::split_stream;
use tdlink_session::transport::{FrameSink, FrameSource};
use tdlink_session::{Session, SessionConfig, SessionError, SessionState, TransportError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const LONG: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Handshake {
    path: String,
    token: Option<String>,
}

/// Accept one client, answer pings and echo `client.echo` as `server.echo`.
async fn spawn_server() -> (String, oneshot::Receiver<Handshake>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut seen = None;
        let ws = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            seen = Some(Handshake {
                path: req.uri().path().to_owned(),
                token: req
                    .headers()
                    .get("token")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
            });
            Ok(resp)
        })
        .await
        .unwrap();
        if let Some(seen) = seen {
            let _ = seen_tx.send(seen);
        }

        let mut conn = split_stream(ws);
        loop {
            let frame = match conn.source.read_frame().await {
                Ok(frame) => frame,
                Err(TransportError::Closed { .. }) => {
                    // Reading once more flushes the queued close reply
                    let _ = conn.source.read_frame().await;
                    break;
                }
                Err(_) => break,
            };
            let header = probe(&frame).unwrap();
            let reply = match header.kind.as_str() {
                kinds::CLIENT_PING => Event::new(
                    kinds::SERVER_CONFIRM,
                    json!({ "confirm_id": header.confirm_id.unwrap().as_str() }),
                ),
                "client.echo" => {
                    let body: Value = serde_json::from_slice(&frame).unwrap();
                    Event::new("server.echo", body["params"].clone())
                }
                "client.hangup" => break,
                _ => continue,
            };
            conn.sink.write_frame(encode(&reply).unwrap()).await.unwrap();
        }
    });

    (format!("ws://{addr}/messaging/team-a"), seen_rx, server)
}

fn config(url: &str) -> SessionConfig {
    let mut config = SessionConfig::new(url).with_header("token", "s3cret");
    config.close_grace = Duration::from_millis(500);
    config
}

#[tokio::test]
async fn handshake_carries_path_and_token() {
    let (url, seen, _server) = spawn_server().await;
    let session = Session::connect(config(&url)).await.unwrap();

    let seen = timeout(LONG, seen).await.unwrap().unwrap();
    assert_eq!(seen.path, "/messaging/team-a");
    assert_eq!(seen.token.as_deref(), Some("s3cret"));
    assert_eq!(session.state(), SessionState::Open);
    session.close().await;
}

#[tokio::test]
async fn ping_round_trip() {
    let (url, _seen, _server) = spawn_server().await;
    let session = Session::connect(config(&url)).await.unwrap();
    let id = session.ping(LONG).await.unwrap();
    assert!(!id.as_str().is_empty());
    session.close().await;
}

#[tokio::test]
async fn request_response_over_socket() {
    let (url, _seen, _server) = spawn_server().await;
    let session = Session::connect(config(&url)).await.unwrap();
    let mut echoes = session
        .subscribe(tdlink_session::KindFilter::kind("server.echo"))
        .unwrap();

    for n in 0..3 {
        session
            .send(&Event::new("client.echo", json!({ "n": n })))
            .await
            .unwrap();
    }
    for n in 0..3 {
        let echo = timeout(LONG, echoes.recv()).await.unwrap().unwrap();
        assert_eq!(echo.params::<Value>().unwrap(), json!({ "n": n }));
    }
    session.close().await;
}

#[tokio::test]
async fn close_handshake_completes() {
    let (url, _seen, server) = spawn_server().await;
    let session = Session::connect(config(&url)).await.unwrap();

    timeout(LONG, session.close()).await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.failure(), None);
    timeout(LONG, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn server_vanishing_fails_session() {
    let (url, _seen, server) = spawn_server().await;
    let session = Session::connect(config(&url)).await.unwrap();
    session
        .send(&Event::new("client.hangup", json!({})))
        .await
        .unwrap();
    timeout(LONG, server).await.unwrap().unwrap();

    let err = timeout(LONG, session.terminated()).await.unwrap();
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn refused_connection_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Session::connect(config(&format!("ws://{addr}/messaging/team-a"))).await;
    assert_matches!(
        result.err(),
        Some(SessionError::Transport(TransportError::Connect { .. }))
    );
}
