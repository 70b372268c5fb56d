//! Lock state tracker using Actor pattern.
//!
//! The tracker is the single owner of the last-known lock state of every
//! device. It receives commands via a tokio mpsc channel, so every
//! read-modify-write is serialized without a shared lock.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Monitor Loop   │──┐  observe()
//! └─────────────────┘  │
//!                      ▼
//!               ┌─────────────────┐
//!               │  TrackerActor   │  DeviceId → (LockState, locked_at)
//!               └─────────────────┘
//!                      ▲
//! ┌─────────────────┐  │  mark_locked()
//! │ Actuation batch │──┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::TrackerActor;
pub use commands::{TrackerCommand, TrackerError};
pub use handle::TrackerHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the tracker actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use chrono::Utc;
/// use lockwatch_core::{DeviceId, LockState};
/// use lockwatchd::tracker::spawn_tracker;
///
/// #[tokio::main]
/// async fn main() {
///     let tracker = spawn_tracker();
///     let edge = tracker
///         .observe(DeviceId::new("front"), LockState::Unlocked, Utc::now())
///         .await;
///     assert!(matches!(edge, Ok(true)));
/// }
/// ```
pub fn spawn_tracker() -> TrackerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = TrackerActor::new(cmd_rx);
    tokio::spawn(actor.run());

    TrackerHandle::new(cmd_tx)
}
