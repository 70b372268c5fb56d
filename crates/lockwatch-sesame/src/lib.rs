//! SESAME cloud API client for lockwatch.
//!
//! Implements [`lockwatch_core::DeviceApi`] on top of the CANDY HOUSE
//! web API:
//! - `GET  {base}/{device_id}` for lock state and battery
//! - `POST {base}/{device_id}/cmd` for signed lock commands
//!
//! # Panic-Free Guarantees
//!
//! This crate follows the workspace panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - HTTP and decoding failures are mapped to `DeviceApiError`

mod client;
mod sign;

pub use client::{
    classify_status, ClientBuildError, SesameClient, SesameConfig, DEFAULT_BASE_URL,
    DEFAULT_REQUEST_TIMEOUT, HISTORY_TAG,
};
pub use sign::{sign_command, sign_command_now};
