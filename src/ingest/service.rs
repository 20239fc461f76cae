use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::bus::{BusError, EventBus};
use crate::data::{Alert, Event, Vital};
use crate::storage::{StorageError, VitalStore};

/// Validates, stores and publishes incoming vitals
pub struct VitalService {
    store: Arc<dyn VitalStore>,
    bus: EventBus,
}

impl VitalService {
    pub fn new(store: Arc<dyn VitalStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Store a reading and hand it to the alerting pipeline
    ///
    /// Storing and publishing are not atomic: when publishing fails the
    /// vital stays stored and is returned inside the error.
    pub async fn ingest_vital(
        &self,
        patient_id: &str,
        systolic: i32,
        diastolic: i32,
        taken_at: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<Vital, IngestError> {
        let patient_id = patient_id.trim();
        if patient_id.is_empty() {
            return Err(IngestError::InvalidVital("patient_id is required".into()));
        }
        if systolic <= 0 || diastolic <= 0 {
            return Err(IngestError::InvalidVital(
                "systolic and diastolic must be positive".into(),
            ));
        }
        let taken_at =
            taken_at.ok_or_else(|| IngestError::InvalidVital("taken_at is required".into()))?;

        let vital = Vital::new(patient_id, systolic, diastolic, taken_at)
            .with_received_at(Utc::now());
        let stored = self.store.add_vital(vital, cancel)?;

        tracing::debug!(
            vital_id = stored.id,
            patient_id = %stored.patient_id,
            systolic = stored.systolic,
            diastolic = stored.diastolic,
            "Vital stored"
        );

        if let Err(source) = self
            .bus
            .publish(Event::vital_received(stored.clone()), cancel)
            .await
        {
            tracing::warn!(
                vital_id = stored.id,
                error = %source,
                "Failed to publish vital"
            );
            return Err(IngestError::Publish {
                vital: Box::new(stored),
                source,
            });
        }

        Ok(stored)
    }

    /// Alerts for `patient_id`, or all alerts when the filter is blank
    pub fn list_alerts(
        &self,
        patient_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Alert>, IngestError> {
        let alerts = self.store.list_alerts(cancel)?;
        Ok(filter_by_patient(alerts, patient_id, |a| &a.patient_id))
    }

    /// Vitals for `patient_id`, or all vitals when the filter is blank
    pub fn list_vitals(
        &self,
        patient_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vital>, IngestError> {
        let vitals = self.store.list_vitals(cancel)?;
        Ok(filter_by_patient(vitals, patient_id, |v| &v.patient_id))
    }
}

fn filter_by_patient<T>(items: Vec<T>, patient_id: &str, key: impl Fn(&T) -> &String) -> Vec<T> {
    let patient_id = patient_id.trim();
    if patient_id.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| key(item) == patient_id)
        .collect()
}

/// Ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid vital: {0}")]
    InvalidVital(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("vital {} stored but not published: {source}", .vital.id)]
    Publish {
        vital: Box<Vital>,
        source: BusError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::data::{alert_reason, EventKind};
    use crate::storage::MemoryStore;

    fn service() -> (VitalService, Arc<MemoryStore>, EventBus) {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new();
        let service = VitalService::new(Arc::clone(&store) as Arc<dyn VitalStore>, bus.clone());
        (service, store, bus)
    }

    #[tokio::test]
    async fn test_ingest_publishes_event() {
        let (service, store, bus) = service();
        let cancel = CancellationToken::new();
        let (mut events, _unsub) = bus.subscribe(1);

        let taken_at = Utc::now() - Duration::minutes(2);
        let stored = service
            .ingest_vital(" patient-1 ", 120, 80, Some(taken_at), &cancel)
            .await
            .unwrap();

        assert_ne!(stored.id, 0);
        assert_eq!(stored.patient_id, "patient-1");
        assert!(stored.received_at.is_some());

        let vitals = store.list_vitals(&cancel).unwrap();
        assert_eq!(vitals.len(), 1);
        assert_eq!(vitals[0].patient_id, "patient-1");

        let event = tokio::time::timeout(std::time::Duration::from_millis(500), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::VitalReceived);
        assert_eq!(event.vital.id, stored.id);
    }

    #[tokio::test]
    async fn test_ingest_validates_input() {
        let (service, store, _bus) = service();
        let cancel = CancellationToken::new();
        let now = Some(Utc::now());

        for (patient, systolic, diastolic, taken_at) in [
            ("", 120, 80, now),
            ("   ", 120, 80, now),
            ("patient-1", -1, 80, now),
            ("patient-1", 120, 0, now),
            ("patient-1", 120, 80, None),
        ] {
            let result = service
                .ingest_vital(patient, systolic, diastolic, taken_at, &cancel)
                .await;
            assert!(matches!(result, Err(IngestError::InvalidVital(_))));
        }

        assert!(store.list_vitals(&cancel).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_vital_stored() {
        let (service, store, bus) = service();
        let cancel = CancellationToken::new();
        bus.close();

        let result = service
            .ingest_vital("patient-1", 200, 130, Some(Utc::now()), &cancel)
            .await;

        match result {
            Err(IngestError::Publish { vital, source }) => {
                assert_eq!(source, BusError::Closed);
                assert_eq!(vital.patient_id, "patient-1");
            }
            other => panic!("expected publish error, got {:?}", other),
        }
        assert_eq!(store.list_vitals(&cancel).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure() {
        let (service, store, _bus) = service();
        let cancel = CancellationToken::new();
        store.close();

        let result = service
            .ingest_vital("patient-1", 120, 80, Some(Utc::now()), &cancel)
            .await;
        assert!(matches!(
            result,
            Err(IngestError::Storage(StorageError::Closed))
        ));
    }

    #[test]
    fn test_list_alerts_filters_by_patient() {
        let (service, store, _bus) = service();
        let cancel = CancellationToken::new();

        for patient in ["patient-1", "patient-2", "patient-1"] {
            let v = Vital::new(patient, 200, 130, Utc::now());
            store
                .add_alert(Alert::from_vital(&v, alert_reason(&v)), &cancel)
                .unwrap();
        }

        assert_eq!(service.list_alerts("patient-1", &cancel).unwrap().len(), 2);
        assert_eq!(service.list_alerts(" patient-2 ", &cancel).unwrap().len(), 1);
        assert_eq!(service.list_alerts("", &cancel).unwrap().len(), 3);
        assert!(service.list_alerts("nobody", &cancel).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_vitals_filters_by_patient() {
        let (service, _store, _bus) = service();
        let cancel = CancellationToken::new();

        service
            .ingest_vital("a", 120, 80, Some(Utc::now()), &cancel)
            .await
            .unwrap();
        service
            .ingest_vital("b", 120, 80, Some(Utc::now()), &cancel)
            .await
            .unwrap();

        assert_eq!(service.list_vitals("a", &cancel).unwrap().len(), 1);
        assert_eq!(service.list_vitals("", &cancel).unwrap().len(), 2);
    }
}
