//! Background alert worker

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, Subscription, Unsubscribe};
use crate::data::{alert_reason, Alert, Event, EventKind};
use crate::notify::NotificationQueue;
use crate::storage::VitalStore;

/// Sole consumer of the event bus
///
/// Stores an alert for every abnormal vital and queues a patient
/// notification for it. Failures are logged and the event dropped.
pub struct AlertWorker {
    subscription: Subscription,
    unsubscribe: Unsubscribe,
    store: Arc<dyn VitalStore>,
    queue: Option<Arc<NotificationQueue>>,
}

impl AlertWorker {
    /// Subscribe to `bus` with an inbox of `buffer_size` events
    pub fn new(
        bus: &EventBus,
        store: Arc<dyn VitalStore>,
        buffer_size: usize,
        queue: Option<Arc<NotificationQueue>>,
    ) -> Self {
        let (subscription, unsubscribe) = bus.subscribe(buffer_size);
        Self {
            subscription,
            unsubscribe,
            store,
            queue,
        }
    }

    /// Start the background worker
    pub fn start(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Consume events until `shutdown` fires or the subscription ends
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("Alert worker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = self.subscription.recv() => match event {
                    Some(event) => self.handle_event(event, &shutdown),
                    None => {
                        tracing::info!("Alert worker subscription ended");
                        break;
                    }
                },
            }
        }

        self.unsubscribe.cancel();
        tracing::info!("Alert worker stopped");
    }

    fn handle_event(&self, event: Event, cancel: &CancellationToken) {
        if event.kind != EventKind::VitalReceived {
            return;
        }
        let vital = event.vital;
        if !vital.is_abnormal() {
            return;
        }

        let reason = alert_reason(&vital);
        let alert = Alert::from_vital(&vital, reason.clone());

        let stored = match self.store.add_alert(alert, cancel) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(
                    vital_id = vital.id,
                    patient_id = %vital.patient_id,
                    error = %e,
                    "Failed to store alert"
                );
                return;
            }
        };

        tracing::warn!(
            alert_id = stored.id,
            patient_id = %vital.patient_id,
            "Alert raised: {}",
            reason
        );

        if let Some(queue) = &self.queue {
            let content = format!("Alert: {}. Please retake your vitals.", reason);
            queue.enqueue(vital.patient_id, content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::time;

    use crate::data::{AlertStatus, Vital};
    use crate::notify::MessageStatus;
    use crate::storage::{MemoryStore, StorageError};

    struct Pipeline {
        bus: EventBus,
        store: Arc<MemoryStore>,
        queue: Arc<NotificationQueue>,
        shutdown: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start_pipeline() -> Pipeline {
        let bus = EventBus::new();
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(NotificationQueue::new(Duration::ZERO, Duration::ZERO));
        let shutdown = CancellationToken::new();
        let worker = AlertWorker::new(
            &bus,
            Arc::clone(&store) as Arc<dyn VitalStore>,
            8,
            Some(Arc::clone(&queue)),
        );
        let handle = worker.start(shutdown.clone());

        Pipeline {
            bus,
            store,
            queue,
            shutdown,
            handle,
        }
    }

    async fn wait_for_alerts(store: &MemoryStore, count: usize) -> Vec<Alert> {
        let cancel = CancellationToken::new();
        let deadline = time::Instant::now() + Duration::from_millis(500);
        loop {
            let alerts = store.list_alerts(&cancel).unwrap();
            if alerts.len() >= count {
                return alerts;
            }
            assert!(time::Instant::now() < deadline, "timeout waiting for alerts");
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn vital(id: u64, patient: &str, systolic: i32, diastolic: i32) -> Vital {
        Vital::new(patient, systolic, diastolic, Utc::now())
            .with_id(id)
            .with_received_at(Utc::now())
    }

    #[tokio::test]
    async fn test_abnormal_vital_raises_alert() {
        let pipeline = start_pipeline();
        let abnormal = vital(2, "p1", 200, 130);

        pipeline
            .bus
            .publish(Event::vital_received(abnormal.clone()), &pipeline.shutdown)
            .await
            .unwrap();

        let alerts = wait_for_alerts(&pipeline.store, 1).await;
        assert_eq!(alerts.len(), 1);
        assert_ne!(alerts[0].id, 0);
        assert_eq!(alerts[0].vital_id, abnormal.id);
        assert_eq!(alerts[0].patient_id, "p1");
        assert_eq!(alerts[0].status, AlertStatus::Active);
        assert_eq!(alerts[0].reason, "abnormal blood pressure 200/130");

        let messages = pipeline.queue.list_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].patient_id, "p1");
        assert_eq!(
            messages[0].content,
            "Alert: abnormal blood pressure 200/130. Please retake your vitals."
        );
        assert_eq!(messages[0].status, MessageStatus::Queued);

        pipeline.shutdown.cancel();
        pipeline.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_normal_vital_is_ignored() {
        let pipeline = start_pipeline();
        let cancel = CancellationToken::new();

        // Sentinel abnormal vital published last proves the normal one was consumed
        for v in [vital(1, "p1", 120, 80), vital(2, "p1", 180, 120), vital(3, "p2", 181, 80)] {
            pipeline
                .bus
                .publish(Event::vital_received(v), &cancel)
                .await
                .unwrap();
        }

        let alerts = wait_for_alerts(&pipeline.store, 1).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].vital_id, 3);
        assert_eq!(pipeline.queue.list_messages().len(), 1);

        pipeline.shutdown.cancel();
        pipeline.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_drops_event() {
        let pipeline = start_pipeline();
        let cancel = CancellationToken::new();

        pipeline.store.close();
        pipeline
            .bus
            .publish(Event::vital_received(vital(1, "p1", 200, 130)), &cancel)
            .await
            .unwrap();

        // Worker keeps running after the failure
        time::sleep(Duration::from_millis(50)).await;
        assert!(!pipeline.handle.is_finished());
        assert!(pipeline.queue.list_messages().is_empty());
        assert_eq!(
            pipeline.store.list_alerts(&cancel),
            Err(StorageError::Closed)
        );

        pipeline.shutdown.cancel();
        pipeline.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_without_queue_only_stores() {
        let bus = EventBus::new();
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let handle = AlertWorker::new(&bus, Arc::clone(&store) as Arc<dyn VitalStore>, 4, None)
            .start(shutdown.clone());

        bus.publish(Event::vital_received(vital(5, "p9", 190, 90)), &shutdown)
            .await
            .unwrap();

        let alerts = wait_for_alerts(&store, 1).await;
        assert_eq!(alerts[0].patient_id, "p9");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_exits_when_bus_closes() {
        let pipeline = start_pipeline();

        pipeline.bus.close();

        time::timeout(Duration::from_secs(1), pipeline.handle)
            .await
            .expect("worker did not exit on bus close")
            .unwrap();
    }

    #[tokio::test]
    async fn test_alerts_events_accepted_before_close() {
        let bus = EventBus::new();
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let worker = AlertWorker::new(&bus, Arc::clone(&store) as Arc<dyn VitalStore>, 8, None);

        for id in 1..=3 {
            bus.publish(Event::vital_received(vital(id, "p1", 200, 130)), &cancel)
                .await
                .unwrap();
        }
        bus.close();

        time::timeout(Duration::from_secs(1), worker.start(cancel.clone()))
            .await
            .expect("worker did not exit after draining")
            .unwrap();

        let alerts = store.list_alerts(&cancel).unwrap();
        let vital_ids: Vec<_> = alerts.iter().map(|a| a.vital_id).collect();
        assert_eq!(vital_ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_releases_subscription_on_shutdown() {
        let pipeline = start_pipeline();
        assert!(pipeline.bus.has_subscriber());

        pipeline.shutdown.cancel();
        pipeline.handle.await.unwrap();

        assert!(!pipeline.bus.has_subscriber());
    }

    #[tokio::test]
    async fn test_second_worker_exits_immediately() {
        let pipeline = start_pipeline();
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();

        let second = AlertWorker::new(&pipeline.bus, store as Arc<dyn VitalStore>, 4, None)
            .start(shutdown.clone());
        time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second worker should see an ended subscription")
            .unwrap();

        // The first worker still owns the subscription
        assert!(pipeline.bus.has_subscriber());

        pipeline.shutdown.cancel();
        pipeline.handle.await.unwrap();
    }
}
