//! VitalWatch: Vital-Sign Alerting Pipeline
//!
//! Ingests blood-pressure readings, raises alerts for abnormal ones and
//! drives a simulated outbound notification queue.
//!
//! # Pipeline
//!
//! - **Event Bus**: single-consumer hand-off of `VitalReceived` events with backpressure
//! - **Alert Worker**: stores an alert for every abnormal vital and queues a notification
//! - **Notification Queue**: FIFO of patient messages with status history and listeners
//! - **Queue Drainer**: sends queued messages one at a time with simulated latency
//!
//! A vital is abnormal when systolic > 180 or diastolic > 120.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chrono::Utc;
//! use tokio_util::sync::CancellationToken;
//! use vitalwatch::{AlertWorker, EventBus, MemoryStore, NotificationQueue, QueueDrainer, VitalService, VitalStore};
//!
//! # async fn demo() {
//! let shutdown = CancellationToken::new();
//! let store: Arc<dyn VitalStore> = Arc::new(MemoryStore::new());
//! let bus = EventBus::new();
//! let queue = Arc::new(NotificationQueue::new(Duration::from_secs(1), Duration::from_secs(3)));
//!
//! AlertWorker::new(&bus, Arc::clone(&store), 16, Some(Arc::clone(&queue)))
//!     .start(shutdown.child_token());
//! QueueDrainer::new(Arc::clone(&queue)).start(shutdown.child_token());
//!
//! let service = VitalService::new(store, bus);
//! service
//!     .ingest_vital("patient-1", 200, 130, Some(Utc::now()), &shutdown)
//!     .await
//!     .unwrap();
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod bus;
pub mod data;
pub mod ingest;
pub mod notify;
pub mod storage;

// Re-export commonly used types
pub use alerts::AlertWorker;
pub use bus::{BusError, EventBus, Subscription, Unsubscribe};
pub use data::{Alert, AlertStatus, Event, EventKind, Vital};
pub use ingest::{IngestError, VitalService};
pub use notify::{Message, MessageStatus, NotificationQueue, QueueDrainer};
pub use storage::{MemoryStore, StorageError, VitalStore};
