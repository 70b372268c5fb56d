//! lockwatch Core - Shared types for smart lock monitoring
//!
//! This crate provides the domain types shared between the daemon
//! (lockwatchd) and its collaborators: the SESAME cloud client and the
//! Discord notifier. The collaborator seams themselves (`DeviceApi`,
//! `Notifier`) live in [`api`].
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod actuation;
pub mod api;
pub mod device;
pub mod error;
pub mod notify;
pub mod status;

// Re-exports for convenience
pub use actuation::{ActuationOutcome, ActuationReport, ActuationResult, SkipReason};
pub use api::{DeviceApi, DeviceApiError, Notifier, NotifierError};
pub use device::{Device, DeviceId, DeviceSecret};
pub use error::{DomainError, DomainResult};
pub use notify::{ActionEvent, AlertEntry, MessageHandle};
pub use status::{Battery, DeviceStatus, LockState};
