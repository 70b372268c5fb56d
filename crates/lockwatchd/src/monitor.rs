//! Periodic lock state monitor.
//!
//! Each cycle polls every configured device, feeds the results through
//! the state tracker, and posts one alert for all devices that newly
//! transitioned into Unlocked.
//!
//! # Panic-Free Guarantees
//!
//! All code follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-device and notifier errors are logged, never propagated

use std::sync::Arc;
use std::time::Duration;

use lockwatch_core::{AlertEntry, Device, DeviceApi, DeviceId, MessageHandle, Notifier};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::fleet::{fetch_statuses, log_fetch_error};
use crate::tracker::TrackerHandle;

/// Timing and presentation settings for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Time between the start of consecutive cycles
    pub interval: Duration,

    /// Timeout applied to each status request
    pub request_timeout: Duration,

    /// Appended to every alert when set
    pub mention: Option<String>,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Devices whose status was fetched successfully
    pub observed: usize,

    /// Devices whose status fetch failed
    pub failed: usize,

    /// Devices that transitioned into Unlocked this cycle
    pub newly_unlocked: Vec<DeviceId>,

    /// The alert posted this cycle, if one was posted
    pub alert: Option<MessageHandle>,
}

/// Polls the fleet and raises edge-triggered unlock alerts.
pub struct Monitor {
    devices: Arc<[Device]>,
    api: Arc<dyn DeviceApi>,
    notifier: Arc<dyn Notifier>,
    tracker: TrackerHandle,
    settings: MonitorSettings,
}

impl Monitor {
    /// Creates a monitor over a fixed fleet.
    pub fn new(
        devices: Arc<[Device]>,
        api: Arc<dyn DeviceApi>,
        notifier: Arc<dyn Notifier>,
        tracker: TrackerHandle,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            devices,
            api,
            notifier,
            tracker,
            settings,
        }
    }

    /// Runs one poll cycle.
    ///
    /// All tracker updates complete before the alert decision is made.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let statuses = fetch_statuses(
            self.devices.iter(),
            self.api.as_ref(),
            self.settings.request_timeout,
        )
        .await;

        let mut entries = Vec::new();
        for (device, result) in statuses {
            let status = match result {
                Ok(status) => status,
                Err(e) => {
                    report.failed += 1;
                    log_fetch_error(device, &e);
                    continue;
                }
            };
            report.observed += 1;

            debug!(
                device_id = %device.id,
                state = %status.lock_state,
                battery = %status.battery,
                "Observed device"
            );

            match self
                .tracker
                .observe(device.id.clone(), status.lock_state, status.observed_at)
                .await
            {
                Ok(true) => {
                    report.newly_unlocked.push(device.id.clone());
                    entries.push(AlertEntry::for_device(device, status.battery));
                }
                Ok(false) => {}
                Err(e) => {
                    error!(device_id = %device.id, error = %e, "State tracker unavailable");
                }
            }
        }

        if entries.is_empty() {
            return report;
        }

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        info!(devices = ?names, "Unlocked devices detected");

        match self
            .notifier
            .send_alert(&entries, self.settings.mention.as_deref())
            .await
        {
            Ok(handle) => {
                info!(message = %handle, count = entries.len(), "Unlock alert sent");
                report.alert = Some(handle);
            }
            Err(e) => {
                warn!(error = %e, count = entries.len(), "Failed to send unlock alert; alert dropped");
            }
        }

        report
    }
}

/// Spawns the monitor loop.
///
/// The first cycle runs immediately. A cycle that overruns the interval
/// is followed by the next one right away; cycles never overlap.
/// Cancellation interrupts the wait and any in-flight status reads.
pub fn spawn_monitor_task(
    monitor: Monitor,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(monitor.settings.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            devices = monitor.devices.len(),
            interval_secs = monitor.settings.interval.as_secs(),
            "Monitor loop started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Monitor loop shutting down");
                    break;
                }

                _ = tick.tick() => {
                    tokio::select! {
                        biased;

                        _ = cancel_token.cancelled() => {
                            info!("Monitor loop shutting down mid-cycle");
                            break;
                        }

                        report = monitor.run_cycle() => log_cycle(&report),
                    }
                }
            }
        }

        debug!("Monitor task completed");
    })
}

fn log_cycle(report: &CycleReport) {
    if report.failed > 0 {
        warn!(
            observed = report.observed,
            failed = report.failed,
            newly_unlocked = report.newly_unlocked.len(),
            "Poll cycle completed with failures"
        );
    } else {
        debug!(
            observed = report.observed,
            newly_unlocked = report.newly_unlocked.len(),
            "Poll cycle completed"
        );
    }
}
