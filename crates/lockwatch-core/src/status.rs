//! Lock state snapshots produced by each poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DeviceId;

// ============================================================================
// Lock State
// ============================================================================

/// Lock state of a device as reported by the cloud API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Bolt is thrown
    Locked,

    /// Bolt is retracted
    Unlocked,

    /// Moving, jammed, unreachable, or any state the API does not name
    #[default]
    Unknown,
}

impl LockState {
    /// Parses the vendor status string (`"locked"`, `"unlocked"`, ...).
    ///
    /// Anything unrecognized (e.g., `"moved"`) maps to `Unknown`, which is
    /// never treated as unlocked.
    pub fn from_vendor(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "locked" => Self::Locked,
            "unlocked" => Self::Unlocked,
            _ => Self::Unknown,
        }
    }

    /// Returns a short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if this state is definitely known.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Battery
// ============================================================================

/// Battery level as a percentage, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Battery(Option<u8>);

impl Battery {
    /// Battery level that was not reported.
    pub const UNKNOWN: Self = Self(None);

    /// Creates a battery level, clamping to 0-100.
    pub fn percent(value: i64) -> Self {
        Self(Some(value.clamp(0, 100) as u8))
    }

    /// Creates a battery level from an optional raw value.
    pub fn from_raw(value: Option<i64>) -> Self {
        value.map(Self::percent).unwrap_or(Self::UNKNOWN)
    }

    /// Returns the percentage if known.
    pub fn value(&self) -> Option<u8> {
        self.0
    }
}

impl fmt::Display for Battery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(pct) => write!(f, "{pct}%"),
            None => f.write_str("unknown"),
        }
    }
}

// ============================================================================
// Device Status
// ============================================================================

/// One observation of a device.
///
/// A fresh snapshot is produced on every poll; snapshots are never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Device that was observed
    pub device_id: DeviceId,

    /// Reported lock state
    pub lock_state: LockState,

    /// Reported battery level
    pub battery: Battery,

    /// When the observation was made; for remote reads, when the request
    /// was sent
    pub observed_at: DateTime<Utc>,
}

impl DeviceStatus {
    /// Creates a snapshot stamped with the current time.
    pub fn new(device_id: DeviceId, lock_state: LockState, battery: Battery) -> Self {
        Self {
            device_id,
            lock_state,
            battery,
            observed_at: Utc::now(),
        }
    }

    /// Replaces the observation timestamp.
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Returns true if the device reported Unlocked.
    pub fn is_unlocked(&self) -> bool {
        self.lock_state == LockState::Unlocked
    }
}
