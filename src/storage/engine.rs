use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::data::{Alert, Vital};

/// Persistence boundary used by the ingestion service and the alert worker
///
/// Implementations synchronize internally. Every data operation observes the
/// caller's cancellation token and fails once the store has been closed.
pub trait VitalStore: Send + Sync {
    fn add_vital(&self, vital: Vital, cancel: &CancellationToken) -> Result<Vital, StorageError>;

    fn add_alert(&self, alert: Alert, cancel: &CancellationToken) -> Result<Alert, StorageError>;

    fn list_alerts(&self, cancel: &CancellationToken) -> Result<Vec<Alert>, StorageError>;

    fn list_vitals(&self, cancel: &CancellationToken) -> Result<Vec<Vital>, StorageError>;

    /// Shut the store down; later calls fail with `StorageError::Closed`
    fn close(&self);
}

#[derive(Default)]
struct StoreState {
    closed: bool,
    vital_seq: u64,
    alert_seq: u64,
    vitals: Vec<Vital>,
    alerts: Vec<Alert>,
}

/// In-memory store holding vitals and alerts for the process lifetime
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` under the lock after the cancellation and closed checks
    fn with_open<T>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&mut StoreState) -> T,
    ) -> Result<T, StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let mut state = self.state.lock();

        // The token may have fired while we waited on the lock
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if state.closed {
            return Err(StorageError::Closed);
        }

        Ok(f(&mut state))
    }
}

impl VitalStore for MemoryStore {
    fn add_vital(
        &self,
        mut vital: Vital,
        cancel: &CancellationToken,
    ) -> Result<Vital, StorageError> {
        self.with_open(cancel, |state| {
            if vital.id == 0 {
                state.vital_seq += 1;
                vital.id = state.vital_seq;
            }
            if vital.received_at.is_none() {
                vital.received_at = Some(Utc::now());
            }
            state.vitals.push(vital.clone());
            vital
        })
    }

    fn add_alert(
        &self,
        mut alert: Alert,
        cancel: &CancellationToken,
    ) -> Result<Alert, StorageError> {
        self.with_open(cancel, |state| {
            if alert.id == 0 {
                state.alert_seq += 1;
                alert.id = state.alert_seq;
            }
            state.alerts.push(alert.clone());
            alert
        })
    }

    fn list_alerts(&self, cancel: &CancellationToken) -> Result<Vec<Alert>, StorageError> {
        self.with_open(cancel, |state| state.alerts.clone())
    }

    fn list_vitals(&self, cancel: &CancellationToken) -> Result<Vec<Vital>, StorageError> {
        self.with_open(cancel, |state| state.vitals.clone())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.vitals = Vec::new();
        state.alerts = Vec::new();
    }
}

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("store is closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,
}
