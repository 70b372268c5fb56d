//! Gateway listener tests against local HTTP and WebSocket stubs.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lockwatch_discord::{DiscordConfig, DiscordNotifier, GatewayError};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Answers every HTTP request with the same status and body.
async fn serve_http(status_line: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    format!("http://{addr}/api/v10")
}

/// Accepts one WebSocket session: Hello, wait for Identify, then close
/// with `close_code`. Returns the Identify payload.
async fn serve_gateway(close_code: u16) -> (String, JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({ "op": 10, "d": { "heartbeat_interval": 45000 } });
        ws.send(Message::Text(hello.to_string())).await.unwrap();

        let identify = loop {
            let frame = ws.next().await.unwrap().unwrap();
            let payload: Value = serde_json::from_str(&frame.into_text().unwrap()).unwrap();
            if payload["op"] == 2 {
                break payload;
            }
        };

        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(close_code),
            reason: "Authentication failed.".into(),
        })))
        .await
        .unwrap();
        identify
    });

    (format!("ws://{addr}"), handle)
}

fn notifier_for(api_base: String) -> DiscordNotifier {
    let mut config = DiscordConfig::new("test-bot-token", 42);
    config.api_base = api_base;
    DiscordNotifier::new(config).unwrap()
}

// ============================================================================
// Token Rejection
// ============================================================================

#[tokio::test]
async fn test_rejected_token_on_gateway_lookup_stops_listener_with_error() {
    let base = serve_http("401 Unauthorized", r#"{"message":"401: Unauthorized"}"#.to_string()).await;
    let notifier = notifier_for(base);

    let (mut actions, handle) = notifier.gateway().spawn(CancellationToken::new());

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener should stop instead of retrying")
        .expect("listener should not panic");
    assert!(matches!(result, Err(GatewayError::AuthenticationFailed)));

    // The action stream ends with the listener.
    assert!(actions.recv().await.is_none());
}

#[tokio::test]
async fn test_authentication_close_code_stops_listener_with_error() {
    let (ws_url, gateway) = serve_gateway(4004).await;
    let base = serve_http("200 OK", json!({ "url": ws_url }).to_string()).await;
    let notifier = notifier_for(base);

    let (_actions, handle) = notifier.gateway().spawn(CancellationToken::new());

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener should stop instead of retrying")
        .expect("listener should not panic");
    assert!(matches!(result, Err(GatewayError::AuthenticationFailed)));

    let identify = gateway.await.unwrap();
    assert_eq!(identify["d"]["token"], "test-bot-token");
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_cancel_during_backoff_stops_listener_cleanly() {
    let base = serve_http("502 Bad Gateway", "{}".to_string()).await;
    let notifier = notifier_for(base);
    let cancel = CancellationToken::new();

    let (_actions, handle) = notifier.gateway().spawn(cancel.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished(), "transient failures are retried");

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener should stop on cancel")
        .expect("listener should not panic");
    assert!(result.is_ok());
}
