//! Tracker actor - owns all last-known lock state and processes commands.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller went away)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use lockwatch_core::{DeviceId, LockState};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::commands::TrackerCommand;

/// One tracker entry.
#[derive(Debug, Clone, Copy)]
struct Entry {
    state: LockState,

    /// Set by the last successful actuation
    locked_at: Option<DateTime<Utc>>,
}

/// The tracker actor - owns the device → last-known-state map.
///
/// Processes commands sequentially in a single task, which makes every
/// `observe` an atomic read-modify-write.
pub struct TrackerActor {
    /// Command receiver
    receiver: mpsc::Receiver<TrackerCommand>,

    /// Last recorded state per device
    entries: HashMap<DeviceId, Entry>,
}

impl TrackerActor {
    /// Creates a new tracker actor with no entries.
    pub fn new(receiver: mpsc::Receiver<TrackerCommand>) -> Self {
        Self {
            receiver,
            entries: HashMap::new(),
        }
    }

    /// Runs the actor event loop until every sender is dropped.
    pub async fn run(mut self) {
        info!("State tracker starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(devices = self.entries.len(), "State tracker stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: TrackerCommand) {
        match cmd {
            TrackerCommand::Observe {
                device_id,
                state,
                observed_at,
                respond_to,
            } => {
                let edge = self.handle_observe(device_id, state, observed_at);
                let _ = respond_to.send(edge);
            }
            TrackerCommand::MarkLocked {
                device_id,
                locked_at,
                respond_to,
            } => {
                self.handle_mark_locked(device_id, locked_at);
                let _ = respond_to.send(());
            }
            TrackerCommand::Get {
                device_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.state_of(&device_id));
            }
            TrackerCommand::Snapshot { respond_to } => {
                let snapshot = self
                    .entries
                    .iter()
                    .map(|(id, entry)| (id.clone(), entry.state))
                    .collect();
                let _ = respond_to.send(snapshot);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Records an observation and reports whether it is an unlock edge.
    ///
    /// Known states overwrite the entry. `Unknown` only fills an empty slot,
    /// so a transient "moved" reading between two Unlocked polls cannot
    /// re-arm the alert. Readings taken at or before the last actuation
    /// are discarded.
    fn handle_observe(
        &mut self,
        device_id: DeviceId,
        state: LockState,
        observed_at: DateTime<Utc>,
    ) -> bool {
        let previous = self.entries.get(&device_id).copied();

        if let Some(locked_at) = previous.and_then(|e| e.locked_at) {
            if observed_at <= locked_at {
                debug!(
                    device_id = %device_id,
                    state = %state,
                    %observed_at,
                    %locked_at,
                    "Ignoring observation older than last lock"
                );
                return false;
            }
        }

        let previous_state = previous.map(|e| e.state);
        let locked_at = previous.and_then(|e| e.locked_at);

        if !state.is_known() {
            if previous.is_none() {
                self.entries.insert(
                    device_id,
                    Entry {
                        state: LockState::Unknown,
                        locked_at: None,
                    },
                );
            }
            return false;
        }

        let edge = state == LockState::Unlocked && previous_state != Some(LockState::Unlocked);

        if previous_state != Some(state) {
            debug!(
                device_id = %device_id,
                from = ?previous_state,
                to = %state,
                "Lock state changed"
            );
        }

        self.entries.insert(device_id, Entry { state, locked_at });
        edge
    }

    fn handle_mark_locked(&mut self, device_id: DeviceId, locked_at: DateTime<Utc>) {
        debug!(device_id = %device_id, "Marking device locked after actuation");
        self.entries.insert(
            device_id,
            Entry {
                state: LockState::Locked,
                locked_at: Some(locked_at),
            },
        );
    }

    fn state_of(&self, device_id: &DeviceId) -> Option<LockState> {
        self.entries.get(device_id).map(|e| e.state)
    }

    /// Returns the number of tracked devices.
    pub fn device_count(&self) -> usize {
        self.entries.len()
    }
}
