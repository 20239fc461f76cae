//! FIFO queue of outbound patient notifications
//!
//! Messages are appended to a history list and a pending list. The history is
//! append-only; only the status and sent time of an entry change, matched by
//! id. Listeners observe every status transition, in the order the
//! transitions happen.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Default tick for the cancellable delay wait
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Delivery status; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Queued,
    Processing,
    Sent,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Queued => "QUEUED",
            MessageStatus::Processing => "PROCESSING",
            MessageStatus::Sent => "SENT",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification addressed to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Queue-local sequence number, starting at 1
    pub id: u64,
    pub patient_id: String,
    pub content: String,
    pub status: MessageStatus,
    pub queued_at: DateTime<Utc>,
    /// Set exactly when `status` is `Sent`
    pub sent_at: Option<DateTime<Utc>>,
}

/// Callback invoked on every message transition
pub type MessageListener = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct QueueState {
    seq: u64,
    history: Vec<Message>,
    pending: VecDeque<Message>,
}

/// Notification queue with simulated transmission latency
pub struct NotificationQueue {
    state: Mutex<QueueState>,
    /// Held across a transition and its notification so listeners never
    /// observe a message out of order. Listeners must not call back into
    /// `enqueue`.
    transitions: Mutex<()>,
    listeners: RwLock<Vec<MessageListener>>,
    min_delay: Duration,
    max_delay: Duration,
    poll_interval: Duration,
}

impl NotificationQueue {
    /// Create a queue whose sends take between `min_delay` and `max_delay`
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };

        Self {
            state: Mutex::new(QueueState::default()),
            transitions: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            min_delay,
            max_delay,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the tick used while waiting out the send delay
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Append a new message and notify listeners
    pub fn enqueue(&self, patient_id: impl Into<String>, content: impl Into<String>) -> Message {
        let _ordered = self.transitions.lock();
        let message = {
            let mut state = self.state.lock();
            state.seq += 1;

            let message = Message {
                id: state.seq,
                patient_id: patient_id.into(),
                content: content.into(),
                status: MessageStatus::Queued,
                queued_at: Utc::now(),
                sent_at: None,
            };
            state.history.push(message.clone());
            state.pending.push_back(message.clone());
            message
        };

        tracing::debug!(
            message_id = message.id,
            patient_id = %message.patient_id,
            "Message queued"
        );
        self.notify(&message);
        message
    }

    /// Take the oldest pending message and simulate sending it
    ///
    /// Returns `None` straight away when nothing is pending. If `cancel` fires
    /// during the send delay, returns `None` and leaves the message in
    /// `Processing`.
    pub async fn process_next(&self, cancel: &CancellationToken) -> Option<Message> {
        let processing = {
            let _ordered = self.transitions.lock();
            let next = self.state.lock().pending.pop_front()?;
            let processing = self.advance(next.id, MessageStatus::Processing)?;
            self.notify(&processing);
            processing
        };

        let delay = self.sample_delay();
        if !self.wait(delay, cancel).await {
            tracing::debug!(
                message_id = processing.id,
                "Send cancelled, message left in processing"
            );
            return None;
        }

        let _ordered = self.transitions.lock();
        let sent = self.advance(processing.id, MessageStatus::Sent)?;
        self.notify(&sent);
        Some(sent)
    }

    /// Copy of the full history in enqueue order
    pub fn list_messages(&self) -> Vec<Message> {
        self.state.lock().history.clone()
    }

    /// Number of messages waiting to be processed
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Register a listener for message transitions
    pub fn add_listener(&self, listener: impl Fn(&Message) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Move a message forward to `status`, returning the updated copy
    fn advance(&self, id: u64, status: MessageStatus) -> Option<Message> {
        let mut state = self.state.lock();
        let message = state.history.iter_mut().find(|m| m.id == id)?;

        if status <= message.status {
            tracing::warn!(
                message_id = id,
                from = %message.status,
                to = %status,
                "Refusing backward message transition"
            );
            return None;
        }

        message.status = status;
        if status == MessageStatus::Sent {
            message.sent_at = Some(Utc::now());
        }
        Some(message.clone())
    }

    fn sample_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    /// Sleep for `delay` in short ticks; false if cancelled first
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + delay;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = (deadline - now).min(self.poll_interval);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = time::sleep(step) => {}
            }
        }
    }

    fn notify(&self, message: &Message) {
        let listeners: Vec<MessageListener> = self.listeners.read().clone();

        for listener in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*listener)(message))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(
                    message_id = message.id,
                    error = %reason,
                    "Message listener panicked"
                );
            }
        }
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(20))
    }
}
