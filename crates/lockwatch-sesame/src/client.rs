//! HTTP client for the SESAME web API.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use lockwatch_core::{Battery, Device, DeviceApi, DeviceApiError, DeviceStatus, LockState};

use crate::sign::sign_command_now;

// ============================================================================
// Constants
// ============================================================================

/// Production endpoint for SESAME 2/3/4/5 devices.
pub const DEFAULT_BASE_URL: &str = "https://app.candyhouse.co/api/sesame2";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tag recorded in the lock's history for commands we send.
pub const HISTORY_TAG: &str = "lockwatch";

/// `/cmd` code for "lock". The daemon never unlocks.
const LOCK_COMMAND: u8 = 82;

// ============================================================================
// Configuration
// ============================================================================

/// Settings for [`SesameClient`].
#[derive(Clone)]
pub struct SesameConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl SesameConfig {
    /// Creates a config for the production endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for SesameConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SesameConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Errors that can occur while building the client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// API key contains characters not allowed in a header.
    #[error("API key is not a valid header value")]
    InvalidApiKey,

    /// The underlying HTTP client could not be created.
    #[error("failed to build HTTP client: {0}")]
    Http(String),
}

// ============================================================================
// Wire Types
// ============================================================================

/// Response body of `GET /{device_id}`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(rename = "CHSesame2Status")]
    status: Option<String>,

    #[serde(rename = "batteryPercentage")]
    battery_percentage: Option<i64>,
}

/// Request body of `POST /{device_id}/cmd`.
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    cmd: u8,
    history: String,
    sign: &'a str,
}

// ============================================================================
// Client
// ============================================================================

/// SESAME cloud API client.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct SesameClient {
    http: reqwest::Client,
    base_url: String,
}

impl SesameClient {
    /// Creates a client with the API key installed as a default header.
    pub fn new(config: SesameConfig) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ClientBuildError::InvalidApiKey)?;
        headers.insert("x-api-key", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .user_agent(concat!("lockwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientBuildError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_command(&self, device: &Device, command: u8) -> Result<(), DeviceApiError> {
        let url = format!("{}/{}/cmd", self.base_url, device.id);
        let sign = sign_command_now(&device.secret)?;
        let body = CommandRequest {
            cmd: command,
            history: BASE64.encode(HISTORY_TAG),
            sign: &sign,
        };

        info!(device_id = %device.id, cmd = command, "Sending command");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            info!(device_id = %device.id, cmd = command, "Command accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        warn!(device_id = %device.id, status = status.as_u16(), body = %text, "Command rejected");
        Err(classify_status(status, text))
    }
}

#[async_trait]
impl DeviceApi for SesameClient {
    async fn get_status(&self, device: &Device) -> Result<DeviceStatus, DeviceApiError> {
        let url = format!("{}/{}", self.base_url, device.id);
        debug!(device_id = %device.id, "Requesting status");

        let requested_at = Utc::now();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let text = response.text().await.map_err(map_transport_error)?;
        parse_status(device, &text).map(|status| status.observed_at(requested_at))
    }

    async fn lock(&self, device: &Device) -> Result<(), DeviceApiError> {
        self.send_command(device, LOCK_COMMAND).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Maps a non-success HTTP status to a device API error.
pub fn classify_status(status: StatusCode, body: String) -> DeviceApiError {
    match status.as_u16() {
        401 | 403 => DeviceApiError::Auth {
            status: status.as_u16(),
        },
        404 => DeviceApiError::NotFound,
        409 | 423 | 429 => DeviceApiError::DeviceBusy,
        408 | 504 => DeviceApiError::Timeout,
        code => DeviceApiError::UnexpectedStatus { status: code, body },
    }
}

fn map_transport_error(err: reqwest::Error) -> DeviceApiError {
    if err.is_timeout() {
        DeviceApiError::Timeout
    } else {
        DeviceApiError::Transport(err.to_string())
    }
}

fn parse_status(device: &Device, body: &str) -> Result<DeviceStatus, DeviceApiError> {
    let raw: StatusResponse =
        serde_json::from_str(body).map_err(|e| DeviceApiError::InvalidResponse(e.to_string()))?;

    let lock_state = raw
        .status
        .as_deref()
        .map(LockState::from_vendor)
        .unwrap_or(LockState::Unknown);

    Ok(DeviceStatus::new(
        device.id.clone(),
        lock_state,
        Battery::from_raw(raw.battery_percentage),
    ))
}
