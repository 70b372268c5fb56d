//! In-memory collaborators shared by the daemon integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lockwatch_core::{
    ActionEvent, ActuationReport, AlertEntry, Battery, Device, DeviceApi, DeviceApiError,
    DeviceId, DeviceSecret, DeviceStatus, LockState, MessageHandle, Notifier, NotifierError,
};
use tokio::sync::Notify;

// ============================================================================
// Fixtures
// ============================================================================

pub const SECRET: &str = "0102030405060708090a0b0c0d0e0f10";

pub fn device(id: &str) -> Device {
    Device::new(id, DeviceSecret::parse(SECRET).unwrap()).with_name(id.to_uppercase())
}

pub fn fleet(ids: &[&str]) -> Arc<[Device]> {
    ids.iter().map(|id| device(id)).collect::<Vec<_>>().into()
}

pub fn action(correlation_id: &str) -> ActionEvent {
    ActionEvent {
        correlation_id: correlation_id.to_string(),
        message: MessageHandle {
            channel_id: "100".to_string(),
            message_id: "1".to_string(),
        },
        reply_token: Some(format!("token-{correlation_id}")),
        actor: Some("tester".to_string()),
    }
}

// ============================================================================
// Fake device API
// ============================================================================

#[derive(Debug, Clone)]
enum StatusBehavior {
    State(LockState),
    Fail(DeviceApiError),
    Hang,
}

/// Scripted `DeviceApi` that behaves like a real lock: a successful lock
/// command flips the device to Locked.
#[derive(Default)]
pub struct FakeDeviceApi {
    statuses: Mutex<HashMap<DeviceId, StatusBehavior>>,
    lock_failures: Mutex<HashMap<DeviceId, DeviceApiError>>,
    lock_calls: Mutex<Vec<DeviceId>>,
    status_calls: AtomicUsize,
    lock_gate: Mutex<Option<Arc<Notify>>>,
    lock_started: Notify,
    status_gates: Mutex<HashMap<DeviceId, Arc<Notify>>>,
    status_held: Notify,
}

impl FakeDeviceApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_state(&self, id: &str, state: LockState) {
        self.statuses
            .lock()
            .unwrap()
            .insert(DeviceId::new(id), StatusBehavior::State(state));
    }

    pub fn fail_status(&self, id: &str, err: DeviceApiError) {
        self.statuses
            .lock()
            .unwrap()
            .insert(DeviceId::new(id), StatusBehavior::Fail(err));
    }

    /// Status reads for this device never complete.
    pub fn hang_status(&self, id: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(DeviceId::new(id), StatusBehavior::Hang);
    }

    pub fn fail_lock(&self, id: &str, err: DeviceApiError) {
        self.lock_failures
            .lock()
            .unwrap()
            .insert(DeviceId::new(id), err);
    }

    /// Lock commands block until the returned gate is notified.
    pub fn gate_locks(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.lock_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Resolves once a lock command has started.
    pub async fn lock_started(&self) {
        self.lock_started.notified().await;
    }

    /// The next status read of this device is taken immediately but not
    /// returned until the gate is notified.
    pub fn gate_status(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.status_gates
            .lock()
            .unwrap()
            .insert(DeviceId::new(id), Arc::clone(&gate));
        gate
    }

    /// Resolves once a gated status read is being held.
    pub async fn status_held(&self) {
        self.status_held.notified().await;
    }

    pub fn lock_calls(&self) -> Vec<DeviceId> {
        self.lock_calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceApi for FakeDeviceApi {
    async fn get_status(&self, device: &Device) -> Result<DeviceStatus, DeviceApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .statuses
            .lock()
            .unwrap()
            .get(&device.id)
            .cloned()
            .unwrap_or(StatusBehavior::Fail(DeviceApiError::NotFound));

        let result = match behavior {
            StatusBehavior::State(state) => {
                Ok(DeviceStatus::new(device.id.clone(), state, Battery::percent(80)))
            }
            StatusBehavior::Fail(err) => Err(err),
            StatusBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DeviceApiError::Timeout)
            }
        };

        let gate = self.status_gates.lock().unwrap().remove(&device.id);
        if let Some(gate) = gate {
            self.status_held.notify_one();
            gate.notified().await;
        }
        result
    }

    async fn lock(&self, device: &Device) -> Result<(), DeviceApiError> {
        self.lock_calls.lock().unwrap().push(device.id.clone());
        self.lock_started.notify_one();

        let gate = self.lock_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(err) = self.lock_failures.lock().unwrap().get(&device.id).cloned() {
            return Err(err);
        }
        self.set_state(device.id.as_str(), LockState::Locked);
        Ok(())
    }
}

// ============================================================================
// Fake notifier
// ============================================================================

/// Records alerts and reports instead of posting them.
#[derive(Default)]
pub struct FakeNotifier {
    alerts: Mutex<Vec<(Vec<AlertEntry>, Option<String>)>>,
    reports: Mutex<Vec<(ActionEvent, ActuationReport)>>,
    fail_alerts: Mutex<bool>,
    report_sent: Notify,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_alerts(&self, fail: bool) {
        *self.fail_alerts.lock().unwrap() = fail;
    }

    pub fn alerts(&self) -> Vec<Vec<AlertEntry>> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|(entries, _)| entries.clone())
            .collect()
    }

    pub fn alert_mentions(&self) -> Vec<Option<String>> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, mention)| mention.clone())
            .collect()
    }

    pub fn reports(&self) -> Vec<ActuationReport> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(_, report)| report.clone())
            .collect()
    }

    pub fn reported_events(&self) -> Vec<ActionEvent> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    pub async fn report_sent(&self) {
        self.report_sent.notified().await;
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_alert(
        &self,
        entries: &[AlertEntry],
        mention: Option<&str>,
    ) -> Result<MessageHandle, NotifierError> {
        if *self.fail_alerts.lock().unwrap() {
            return Err(NotifierError::Unavailable("scripted failure".to_string()));
        }
        let mut alerts = self.alerts.lock().unwrap();
        alerts.push((entries.to_vec(), mention.map(str::to_string)));
        Ok(MessageHandle {
            channel_id: "100".to_string(),
            message_id: alerts.len().to_string(),
        })
    }

    async fn report_result(
        &self,
        event: &ActionEvent,
        report: &ActuationReport,
    ) -> Result<(), NotifierError> {
        self.reports
            .lock()
            .unwrap()
            .push((event.clone(), report.clone()));
        self.report_sent.notify_one();
        Ok(())
    }
}
