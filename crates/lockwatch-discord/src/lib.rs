//! lockwatch Discord - unlock alerts and "lock all" clicks over Discord
//!
//! - [`DiscordNotifier`] posts alerts and actuation reports through the
//!   REST API and implements [`lockwatch_core::Notifier`].
//! - [`Gateway`] keeps a Gateway WebSocket session open and turns
//!   "lock all" button clicks into [`lockwatch_core::ActionEvent`]s.
//! - [`render`] builds message payloads and report text.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Malformed gateway payloads are logged and skipped

mod gateway;
mod notifier;
pub mod render;
mod rest;

pub use gateway::{parse_interaction, Gateway, GatewayError, Interaction};
pub use notifier::DiscordNotifier;
pub use rest::{ClientBuildError, DiscordConfig, RestClient, DISCORD_API_BASE};

/// `custom_id` of the button attached to every unlock alert.
pub const LOCK_ALL_CUSTOM_ID: &str = "lock_all";
