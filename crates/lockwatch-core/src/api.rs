//! Collaborator seams: the lock vendor's cloud API and the chat notifier.
//!
//! The daemon depends only on these traits. Concrete implementations live
//! in `lockwatch-sesame` and `lockwatch-discord`; tests use in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::{ActionEvent, ActuationReport, AlertEntry, Device, DeviceStatus, MessageHandle};

// ============================================================================
// Device API
// ============================================================================

/// Errors returned by a device API call.
///
/// Every variant is scoped to one device and one call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceApiError {
    /// The call did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// The API key or device secret was rejected.
    #[error("authentication rejected (HTTP {status})")]
    Auth { status: u16 },

    /// The device id is unknown to the API.
    #[error("device not found")]
    NotFound,

    /// The device is busy with another command.
    #[error("device busy")]
    DeviceBusy,

    /// Any other non-success HTTP status.
    #[error("unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The device secret could not be used to sign a command.
    #[error("invalid device secret: {0}")]
    InvalidSecret(String),
}

impl DeviceApiError {
    /// Returns true for credential problems that need operator attention.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::InvalidSecret(_))
    }
}

/// Read and write access to lock devices.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Fetches the current status of a device.
    async fn get_status(&self, device: &Device) -> Result<DeviceStatus, DeviceApiError>;

    /// Submits a lock command to a device.
    async fn lock(&self, device: &Device) -> Result<(), DeviceApiError>;
}

// ============================================================================
// Notifier
// ============================================================================

/// Errors returned by the chat notifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifierError {
    /// The chat platform could not be reached or refused the request.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),

    /// The platform answered with something we could not use.
    #[error("invalid notifier response: {0}")]
    InvalidResponse(String),
}

/// Sends alerts and reports to a fixed destination channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Posts an unlock alert listing `entries` with an attached "lock all"
    /// control. `mention` is appended when set.
    async fn send_alert(
        &self,
        entries: &[AlertEntry],
        mention: Option<&str>,
    ) -> Result<MessageHandle, NotifierError>;

    /// Reports the outcome of a batch lock back to the user who clicked.
    ///
    /// Best effort: callers log failures and move on.
    async fn report_result(
        &self,
        event: &ActionEvent,
        report: &ActuationReport,
    ) -> Result<(), NotifierError>;
}
