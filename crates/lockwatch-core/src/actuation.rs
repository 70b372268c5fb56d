//! Results of a batch lock request.
//!
//! An [`ActuationReport`] is created per user interaction, handed to the
//! notifier for reporting, and then discarded.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DeviceId;

/// Why a device received no lock command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Device already reported Locked at re-query time.
    AlreadyLocked,

    /// Another batch is currently sending a command to this device.
    InFlight,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyLocked => write!(f, "already locked"),
            Self::InFlight => write!(f, "lock already in progress"),
        }
    }
}

/// Per-device outcome of a batch lock request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ActuationOutcome {
    /// Lock command accepted by the device API.
    Locked,

    /// Lock command failed or timed out.
    Failed(String),

    /// No command was sent.
    Skipped(SkipReason),
}

impl ActuationOutcome {
    /// Returns true if a lock command was attempted for this device.
    pub fn was_attempted(&self) -> bool {
        matches!(self, Self::Locked | Self::Failed(_))
    }
}

impl fmt::Display for ActuationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// Outcome for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationResult {
    pub device_id: DeviceId,
    pub device_name: String,
    pub outcome: ActuationOutcome,
}

/// Aggregated outcome of one batch lock request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationReport {
    /// Interaction that triggered this batch
    pub correlation_id: String,

    /// One entry per device whose state was known at re-query time
    pub results: Vec<ActuationResult>,

    /// Devices whose state could not be determined (never locked)
    pub unreachable: Vec<String>,
}

impl ActuationReport {
    /// Creates an empty report for an interaction.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::default()
        }
    }

    /// Returns true if no device needed a lock command.
    pub fn is_nothing_to_lock(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome == ActuationOutcome::Skipped(SkipReason::AlreadyLocked))
    }

    /// Display names of devices locked by this batch.
    pub fn locked(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, ActuationOutcome::Locked))
    }

    /// Display names and reasons of devices whose lock failed.
    pub fn failed(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                ActuationOutcome::Failed(reason) => Some((r.device_name.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Display names of devices skipped because another batch owns them.
    pub fn in_flight(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, ActuationOutcome::Skipped(SkipReason::InFlight)))
    }

    /// Looks up the outcome for a device.
    pub fn outcome_for(&self, device_id: &DeviceId) -> Option<&ActuationOutcome> {
        self.results
            .iter()
            .find(|r| &r.device_id == device_id)
            .map(|r| &r.outcome)
    }

    /// Number of lock commands actually sent.
    pub fn commands_sent(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.was_attempted()).count()
    }

    fn names_where(&self, pred: impl Fn(&ActuationOutcome) -> bool) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| pred(&r.outcome))
            .map(|r| r.device_name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, outcome: ActuationOutcome) -> ActuationResult {
        ActuationResult {
            device_id: DeviceId::new(id),
            device_name: id.to_uppercase(),
            outcome,
        }
    }

    #[test]
    fn test_nothing_to_lock() {
        let mut report = ActuationReport::new("evt-1");
        assert!(report.is_nothing_to_lock());

        report
            .results
            .push(result("a", ActuationOutcome::Skipped(SkipReason::AlreadyLocked)));
        assert!(report.is_nothing_to_lock());

        report
            .results
            .push(result("b", ActuationOutcome::Skipped(SkipReason::InFlight)));
        assert!(!report.is_nothing_to_lock());
    }

    #[test]
    fn test_report_partitions() {
        let report = ActuationReport {
            correlation_id: "evt-2".to_string(),
            results: vec![
                result("c", ActuationOutcome::Failed("device busy".to_string())),
                result("d", ActuationOutcome::Locked),
                result("e", ActuationOutcome::Skipped(SkipReason::InFlight)),
            ],
            unreachable: vec![],
        };

        assert_eq!(report.locked(), vec!["D"]);
        assert_eq!(report.failed(), vec![("C", "device busy")]);
        assert_eq!(report.in_flight(), vec!["E"]);
        assert_eq!(report.commands_sent(), 2);
        assert_eq!(
            report.outcome_for(&DeviceId::new("d")),
            Some(&ActuationOutcome::Locked)
        );
        assert!(report.outcome_for(&DeviceId::new("zzz")).is_none());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ActuationOutcome::Locked.to_string(), "locked");
        assert_eq!(
            ActuationOutcome::Failed("timed out".to_string()).to_string(),
            "failed (timed out)"
        );
        assert_eq!(
            ActuationOutcome::Skipped(SkipReason::AlreadyLocked).to_string(),
            "skipped (already locked)"
        );
    }
}
