//! Notification payloads exchanged with the chat platform.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Battery, Device, DeviceId};

/// One device row in an unlock alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub device_id: DeviceId,
    pub name: String,
    pub battery: Battery,
}

impl AlertEntry {
    /// Builds an alert row for a configured device.
    pub fn for_device(device: &Device, battery: Battery) -> Self {
        Self {
            device_id: device.id.clone(),
            name: device.display_name().to_string(),
            battery,
        }
    }
}

/// Identifies a message previously posted by the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// A user click on the "lock all" control of an alert.
///
/// Delivered once per distinct click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEvent {
    /// Unique id of this click (platform interaction id)
    pub correlation_id: String,

    /// The alert message that carried the control
    pub message: MessageHandle,

    /// Platform token for replying to this click, if the platform uses one
    pub reply_token: Option<String>,

    /// Who clicked, for logging
    pub actor: Option<String>,
}

impl ActionEvent {
    /// Returns the actor name or a placeholder.
    pub fn actor_label(&self) -> &str {
        self.actor.as_deref().unwrap_or("unknown user")
    }
}
