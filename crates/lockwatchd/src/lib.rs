//! lockwatch daemon - lock state tracking, polling and remote locking
//!
//! This crate provides the core infrastructure for the lockwatch daemon:
//! - `tracker` - State tracker actor holding the last-known lock state per device
//! - `monitor` - Periodic poll loop raising edge-triggered unlock alerts
//! - `actuation` - Batch lock coordinator with per-device in-flight claims
//! - `dispatch` - Routes "lock all" clicks to the coordinator
//! - `config` - File and environment configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    lockwatchd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │    Monitor      │────▶│     TrackerActor            │   │
//! │  │  (poll loop)    │     │  (last-known lock states)   │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │ alerts                      │ mark_locked      │
//! │           ▼                             │                  │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │    Notifier     │────▶│   ActionDispatcher          │   │
//! │  │ (chat platform) │click│   └─ ActuationCoordinator   │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod actuation;
pub mod config;
pub mod dispatch;
pub mod fleet;
pub mod monitor;
pub mod tracker;
