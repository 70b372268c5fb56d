//! AES-CMAC signatures for SESAME commands.
//!
//! The cloud API authenticates a command with
//! `hex(AES-CMAC(secret, ts[1..4]))`, where `ts` is the current UNIX time
//! in seconds as 4 little-endian bytes. Dropping the lowest byte makes a
//! signature valid for a ~256 second window.

use aes::Aes128;
use chrono::Utc;
use cmac::{Cmac, Mac};
use lockwatch_core::{DeviceApiError, DeviceSecret};

/// Signs a command for the given UNIX timestamp (seconds).
pub fn sign_command(secret: &DeviceSecret, unix_secs: i64) -> Result<String, DeviceApiError> {
    let key = hex::decode(secret.expose())
        .map_err(|e| DeviceApiError::InvalidSecret(e.to_string()))?;

    let ts = (unix_secs as u32).to_le_bytes();
    let message = ts
        .get(1..)
        .ok_or_else(|| DeviceApiError::InvalidSecret("timestamp encoding".to_string()))?;

    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(&key)
        .map_err(|e| DeviceApiError::InvalidSecret(e.to_string()))?;
    mac.update(message);

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signs a command for the current time.
pub fn sign_command_now(secret: &DeviceSecret) -> Result<String, DeviceApiError> {
    sign_command(secret, Utc::now().timestamp())
}
