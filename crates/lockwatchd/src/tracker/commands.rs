//! Tracker actor commands and errors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use lockwatch_core::{DeviceId, LockState};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Tracker Commands
// ============================================================================

/// Commands sent to the tracker actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum TrackerCommand {
    /// Record an observed lock state.
    ///
    /// Responds `true` when this observation is a transition into
    /// Unlocked (the edge that warrants an alert).
    Observe {
        device_id: DeviceId,
        state: LockState,
        observed_at: DateTime<Utc>,
        respond_to: oneshot::Sender<bool>,
    },

    /// Record that a lock command for this device succeeded.
    MarkLocked {
        device_id: DeviceId,
        locked_at: DateTime<Utc>,
        respond_to: oneshot::Sender<()>,
    },

    /// Get the last-known state of one device.
    Get {
        device_id: DeviceId,
        respond_to: oneshot::Sender<Option<LockState>>,
    },

    /// Get a copy of every entry.
    Snapshot {
        respond_to: oneshot::Sender<HashMap<DeviceId, LockState>>,
    },
}

// ============================================================================
// Tracker Errors
// ============================================================================

/// Errors that can occur during tracker operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The actor stopped before answering.
    #[error("tracker channel closed")]
    ChannelClosed,
}
