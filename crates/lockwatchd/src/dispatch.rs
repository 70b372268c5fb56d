//! Routes "lock all" actions to the actuation coordinator.
//!
//! Each action runs as its own task so a slow batch never delays the next
//! action. On shutdown the dispatcher stops accepting actions and waits
//! for every running batch to finish; lock commands already sent are not
//! abandoned.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Report delivery failures are logged, never propagated

use std::sync::Arc;

use lockwatch_core::{ActionEvent, ActuationReport, Notifier};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::actuation::ActuationCoordinator;

/// Consumes action events and spawns one actuation batch per event.
pub struct ActionDispatcher {
    coordinator: ActuationCoordinator,
    notifier: Arc<dyn Notifier>,
    tasks: TaskTracker,
}

impl ActionDispatcher {
    pub fn new(coordinator: ActuationCoordinator, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            coordinator,
            notifier,
            tasks: TaskTracker::new(),
        }
    }

    /// Runs until the event channel closes or `cancel_token` fires, then
    /// drains running batches.
    pub async fn run(self, mut events: mpsc::Receiver<ActionEvent>, cancel_token: CancellationToken) {
        info!("Action dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Action dispatcher shutting down");
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Action channel closed");
                        break;
                    };
                    self.spawn_action(event);
                }
            }
        }

        self.tasks.close();
        if !self.tasks.is_empty() {
            info!(running = self.tasks.len(), "Waiting for actuation batches to finish");
        }
        self.tasks.wait().await;
        debug!("Action dispatcher stopped");
    }

    fn spawn_action(&self, event: ActionEvent) {
        let coordinator = self.coordinator.clone();
        let notifier = Arc::clone(&self.notifier);
        self.tasks.spawn(async move {
            handle_action(&coordinator, notifier.as_ref(), &event).await;
        });
    }
}

/// Runs one actuation batch and reports the outcome to the requester.
pub async fn handle_action(
    coordinator: &ActuationCoordinator,
    notifier: &dyn Notifier,
    event: &ActionEvent,
) -> ActuationReport {
    info!(
        correlation_id = %event.correlation_id,
        actor = event.actor_label(),
        message = %event.message,
        "Lock-all requested"
    );

    let report = coordinator.actuate(&event.correlation_id).await;

    if let Err(e) = notifier.report_result(event, &report).await {
        warn!(
            correlation_id = %event.correlation_id,
            error = %e,
            "Failed to deliver actuation report"
        );
    }

    report
}
