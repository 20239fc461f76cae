use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::queue::NotificationQueue;

/// Default pause between polls of an empty queue
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Sequential worker that sends queued notifications one at a time
pub struct QueueDrainer {
    queue: Arc<NotificationQueue>,
    idle_interval: Duration,
}

impl QueueDrainer {
    pub fn new(queue: Arc<NotificationQueue>) -> Self {
        Self {
            queue,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }

    /// Set the pause used when the queue is empty
    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    /// Start the background worker
    pub fn start(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Drain the queue until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!("Queue drainer started");

        while !shutdown.is_cancelled() {
            match self.queue.process_next(&shutdown).await {
                Some(message) => {
                    tracing::info!(
                        message_id = message.id,
                        patient_id = %message.patient_id,
                        "Message sent: {}",
                        message.content
                    );
                }
                None if shutdown.is_cancelled() => break,
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = time::sleep(self.idle_interval) => {}
                    }
                }
            }
        }

        tracing::info!("Queue drainer stopped");
    }
}
