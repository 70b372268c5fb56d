//! Client interface for interacting with the TrackerActor.
//!
//! The `TrackerHandle` is cheap to clone and is the only way to read or
//! mutate tracker state.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `TrackerError::ChannelClosed`

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use lockwatch_core::{DeviceId, LockState};
use tokio::sync::{mpsc, oneshot};

use super::commands::{TrackerCommand, TrackerError};

/// Handle for interacting with the tracker actor.
#[derive(Clone)]
pub struct TrackerHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    /// Create a new tracker handle.
    pub fn new(sender: mpsc::Sender<TrackerCommand>) -> Self {
        Self { sender }
    }

    /// Record a state observed at `observed_at`.
    ///
    /// Returns `true` when the device just transitioned into Unlocked.
    /// Observations taken at or before the device's last `mark_locked`
    /// are ignored and return `false`.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn observe(
        &self,
        device_id: DeviceId,
        state: LockState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool, TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::Observe {
                device_id,
                state,
                observed_at,
                respond_to: tx,
            })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Record that a device was locked by an actuation just now.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn mark_locked(&self, device_id: DeviceId) -> Result<(), TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::MarkLocked {
                device_id,
                locked_at: Utc::now(),
                respond_to: tx,
            })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Get the last-known state of a device.
    ///
    /// Returns `None` if the device was never observed or the actor is gone.
    pub async fn get(&self, device_id: DeviceId) -> Option<LockState> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::Get {
                device_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get a copy of every tracked entry.
    ///
    /// Returns an empty map if communication with the actor fails.
    pub async fn snapshot(&self) -> HashMap<DeviceId, LockState> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(TrackerCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return HashMap::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (TrackerHandle, mpsc::Receiver<TrackerCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (TrackerHandle::new(cmd_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_observe_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(TrackerCommand::Observe {
                device_id,
                state,
                respond_to,
                ..
            }) = rx.recv().await
            {
                assert_eq!(device_id.as_str(), "front");
                assert_eq!(state, LockState::Unlocked);
                let _ = respond_to.send(true);
                return true;
            }
            false
        });

        let result = handle
            .observe(DeviceId::new("front"), LockState::Unlocked, Utc::now())
            .await;
        assert_eq!(result, Ok(true));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_observe_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle
            .observe(DeviceId::new("front"), LockState::Locked, Utc::now())
            .await;
        assert_eq!(result, Err(TrackerError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_mark_locked_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.mark_locked(DeviceId::new("front")).await;
        assert_eq!(result, Err(TrackerError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_get_returns_none_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);
        assert!(handle.get(DeviceId::new("front")).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_returns_empty_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);
        assert!(handle.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (handle, rx) = create_test_handle();
        assert!(handle.is_connected());
        drop(rx);
        assert!(!handle.is_connected());
    }
}
