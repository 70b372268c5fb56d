//! Device identity and configuration entities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a lock device.
///
/// Wraps the device UUID string issued by the vendor
/// (e.g., "11200416-0103-0701-6800-7300ffffffff").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new DeviceId from a string.
    ///
    /// Note: This does not validate UUID format. The cloud API rejects
    /// unknown ids with NotFound, which is reported per device.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// Per-device command secret (hex-encoded AES-128 key).
///
/// Opaque to everything except the device API client. `Debug` never
/// prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceSecret(String);

/// Length in bytes of a decoded device secret.
pub const SECRET_LEN: usize = 16;

impl DeviceSecret {
    /// Creates a secret after checking it is 16 bytes of hex.
    pub fn parse(hex_str: &str) -> DomainResult<Self> {
        let trimmed = hex_str.trim();
        let is_hex = trimmed.chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex || trimmed.len() != SECRET_LEN * 2 {
            return Err(DomainError::InvalidFieldValue {
                field: "device secret".to_string(),
                value: format!("<{} chars>", trimmed.len()),
                expected: format!("{} hex characters", SECRET_LEN * 2),
            });
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Returns the hex key material.
    ///
    /// Only the command signer should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceSecret(<redacted>)")
    }
}

// ============================================================================
// Device
// ============================================================================

/// A configured lock device.
///
/// The configured set is fixed at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable device identifier
    pub id: DeviceId,

    /// Optional human-friendly name
    pub name: Option<String>,

    /// Command secret, used only by the device API client
    pub secret: DeviceSecret,
}

impl Device {
    /// Creates a device without a display name.
    pub fn new(id: impl Into<DeviceId>, secret: DeviceSecret) -> Self {
        Self {
            id: id.into(),
            name: None,
            secret,
        }
    }

    /// Sets the display name. Blank names are ignored.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        self.name = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Returns the name to show users, falling back to the device id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}
