//! HTTP-level tests for the SESAME client against a local stub server.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::time::Duration;

use lockwatch_core::{Device, DeviceApi, DeviceApiError, DeviceSecret, LockState};
use lockwatch_sesame::{SesameClient, SesameConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_device() -> Device {
    let secret = DeviceSecret::parse("0102030405060708090a0b0c0d0e0f10").unwrap();
    Device::new("dev-1", secret).with_name("Front door")
}

fn client_for(base_url: String, timeout: Duration) -> SesameClient {
    let mut config = SesameConfig::new("test-api-key");
    config.base_url = base_url;
    config.request_timeout = timeout;
    SesameClient::new(config).unwrap()
}

/// Reads one HTTP/1.1 request (headers plus Content-Length body).
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let len = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serves a single canned response and returns the raw request it received.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
        request
    });

    (format!("http://{addr}/api/sesame2"), handle)
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_get_status_sends_api_key_and_parses_body() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"batteryPercentage":73,"CHSesame2Status":"unlocked","position":11}"#,
    )
    .await;
    let client = client_for(base, Duration::from_secs(5));

    let status = client.get_status(&test_device()).await.unwrap();
    assert_eq!(status.lock_state, LockState::Unlocked);
    assert_eq!(status.battery.value(), Some(73));

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/sesame2/dev-1 "), "got: {request}");
    assert!(request.to_lowercase().contains("x-api-key: test-api-key"));
}

#[tokio::test]
async fn test_get_status_auth_error() {
    let (base, server) = serve_once("403 Forbidden", r#"{"message":"Forbidden"}"#).await;
    let client = client_for(base, Duration::from_secs(5));

    let err = client.get_status(&test_device()).await.unwrap_err();
    assert_eq!(err, DeviceApiError::Auth { status: 403 });
    server.await.unwrap();
}

#[tokio::test]
async fn test_get_status_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept and hold the connection without ever answering
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(stream);
    });

    let client = client_for(format!("http://{addr}/api/sesame2"), Duration::from_millis(200));
    let err = client.get_status(&test_device()).await.unwrap_err();
    assert_eq!(err, DeviceApiError::Timeout);

    server.abort();
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_lock_posts_signed_command() {
    let (base, server) = serve_once("200 OK", "").await;
    let client = client_for(base, Duration::from_secs(5));

    client.lock(&test_device()).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/sesame2/dev-1/cmd "), "got: {request}");

    let body_start = request.find("\r\n\r\n").unwrap() + 4;
    let body: serde_json::Value = serde_json::from_str(&request[body_start..]).unwrap();
    assert_eq!(body["cmd"], 82);
    assert_eq!(body["history"], "bG9ja3dhdGNo");
    assert_eq!(body["sign"].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn test_lock_busy() {
    let (base, server) = serve_once("423 Locked", r#"{"message":"busy"}"#).await;
    let client = client_for(base, Duration::from_secs(5));

    let err = client.lock(&test_device()).await.unwrap_err();
    assert_eq!(err, DeviceApiError::DeviceBusy);
    server.await.unwrap();
}
