//! Batch lock coordinator for "lock all" requests.
//!
//! Each request re-queries the fleet, sends lock commands concurrently to
//! every device that is still unlocked, and aggregates per-device results
//! into one [`ActuationReport`].
//!
//! A device may be the target of at most one running batch at a time.
//! A batch claims every device before re-querying it and holds the claims
//! until the tracker has recorded the outcome. Overlapping requests skip
//! devices already claimed by another batch instead of reading or locking
//! them a second time.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poisoned in-flight set is recovered, not propagated

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use lockwatch_core::{
    ActuationOutcome, ActuationReport, ActuationResult, Device, DeviceApi, DeviceApiError,
    DeviceId, LockState, SkipReason,
};
use tracing::{debug, error, info, warn};

use crate::fleet::{concurrency_for, fetch_statuses, log_fetch_error, with_timeout};
use crate::tracker::TrackerHandle;

// ============================================================================
// In-flight claims
// ============================================================================

/// Set of devices currently being actuated.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    devices: Arc<Mutex<HashSet<DeviceId>>>,
}

impl InFlight {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a device, or returns `None` if another batch holds it.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn try_claim(&self, device_id: &DeviceId) -> Option<Claim> {
        let mut set = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(device_id.clone()) {
            return None;
        }
        Some(Claim {
            devices: Arc::clone(&self.devices),
            device_id: device_id.clone(),
        })
    }

    /// Returns true if the device is currently claimed.
    pub fn contains(&self, device_id: &DeviceId) -> bool {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(device_id)
    }

    /// Number of devices currently claimed.
    pub fn len(&self) -> usize {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no device is claimed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive claim on one device; released on drop.
#[derive(Debug)]
pub struct Claim {
    devices: Arc<Mutex<HashSet<DeviceId>>>,
    device_id: DeviceId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.device_id);
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs batch lock requests against the fleet.
///
/// Cheap to clone; clones share the in-flight set.
#[derive(Clone)]
pub struct ActuationCoordinator {
    devices: Arc<[Device]>,
    api: Arc<dyn DeviceApi>,
    tracker: TrackerHandle,
    in_flight: InFlight,
    request_timeout: Duration,
}

impl ActuationCoordinator {
    /// Creates a coordinator over a fixed fleet.
    pub fn new(
        devices: Arc<[Device]>,
        api: Arc<dyn DeviceApi>,
        tracker: TrackerHandle,
        request_timeout: Duration,
    ) -> Self {
        Self {
            devices,
            api,
            tracker,
            in_flight: InFlight::new(),
            request_timeout,
        }
    }

    /// Returns the shared in-flight set.
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Locks every device that is currently unlocked.
    ///
    /// The report is returned only after every lock attempt has finished.
    /// Devices whose state cannot be determined are never targeted.
    pub async fn actuate(&self, correlation_id: &str) -> ActuationReport {
        let mut report = ActuationReport::new(correlation_id);

        let mut claimed = Vec::with_capacity(self.devices.len());
        for device in self.devices.iter() {
            match self.in_flight.try_claim(&device.id) {
                Some(claim) => claimed.push((device, claim)),
                None => {
                    info!(
                        correlation_id,
                        device_id = %device.id,
                        "Lock already in progress; skipping"
                    );
                    report
                        .results
                        .push(result_for(device, ActuationOutcome::Skipped(SkipReason::InFlight)));
                }
            }
        }

        let statuses = fetch_statuses(
            claimed.iter().map(|(device, _claim)| *device).collect::<Vec<_>>(),
            self.api.as_ref(),
            self.request_timeout,
        )
        .await;

        let mut targets = Vec::new();
        for (device, result) in statuses {
            match result {
                Ok(status) => match status.lock_state {
                    LockState::Unlocked => targets.push(device),
                    LockState::Locked => {
                        report.results.push(result_for(
                            device,
                            ActuationOutcome::Skipped(SkipReason::AlreadyLocked),
                        ));
                    }
                    LockState::Unknown => {
                        debug!(device_id = %device.id, "State unknown; not targeting");
                        report.unreachable.push(device.display_name().to_string());
                    }
                },
                Err(e) => {
                    log_fetch_error(device, &e);
                    report.unreachable.push(device.display_name().to_string());
                }
            }
        }

        if targets.is_empty() {
            info!(correlation_id, "Nothing to lock");
        } else {
            self.lock_targets(correlation_id, &targets, &mut report).await;
        }

        // Released only after mark_locked has been applied.
        drop(claimed);

        report
            .results
            .sort_by_key(|r| self.devices.iter().position(|d| d.id == r.device_id));

        info!(
            correlation_id,
            locked = report.locked().len(),
            failed = report.failed().len(),
            skipped = report.results.len() - report.commands_sent(),
            "Actuation batch complete"
        );
        report
    }

    async fn lock_targets(
        &self,
        correlation_id: &str,
        targets: &[&Device],
        report: &mut ActuationReport,
    ) {
        let api = self.api.as_ref();
        let timeout = self.request_timeout;
        let attempts: Vec<(&Device, Result<(), DeviceApiError>)> = stream::iter(targets.iter())
            .map(move |device| async move {
                (*device, with_timeout(timeout, api.lock(device)).await)
            })
            .buffered(concurrency_for(targets.len()))
            .boxed()
            .collect()
            .await;

        for (device, result) in attempts {
            let outcome = match result {
                Ok(()) => {
                    if let Err(e) = self.tracker.mark_locked(device.id.clone()).await {
                        error!(device_id = %device.id, error = %e, "State tracker unavailable");
                    }
                    info!(correlation_id, device_id = %device.id, "Device locked");
                    ActuationOutcome::Locked
                }
                Err(e) => {
                    warn!(correlation_id, device_id = %device.id, error = %e, "Lock command failed");
                    ActuationOutcome::Failed(e.to_string())
                }
            };
            report.results.push(result_for(device, outcome));
        }
    }
}

fn result_for(device: &Device, outcome: ActuationOutcome) -> ActuationResult {
    ActuationResult {
        device_id: device.id.clone(),
        device_name: device.display_name().to_string(),
        outcome,
    }
}
