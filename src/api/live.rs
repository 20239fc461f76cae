//! Bridge from notification queue transitions to live dashboard viewers

use serde::Serialize;
use tokio::sync::broadcast;

use super::handlers::MessageResponse;
use crate::notify::{Message, NotificationQueue};

/// Frames buffered per viewer before it starts dropping updates
pub const LIVE_UPDATE_CAPACITY: usize = 100;

/// Frame pushed to live viewers
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveFrame {
    Connected,
    MessageUpdate { message: MessageResponse },
}

impl LiveFrame {
    /// JSON text of the frame
    pub fn encode(&self) -> Option<String> {
        serde_json::to_string(self)
            .map_err(|e| {
                tracing::warn!("Failed to encode live frame: {}", e);
                e
            })
            .ok()
    }
}

/// Fan-out of encoded frames to any number of viewers
///
/// Sending never waits on viewers; one that falls behind loses frames.
#[derive(Clone)]
pub struct LiveUpdates {
    tx: broadcast::Sender<String>,
}

impl LiveUpdates {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register as a listener on `queue`
    pub fn attach(&self, queue: &NotificationQueue) {
        let updates = self.clone();
        queue.add_listener(move |message: &Message| updates.publish_message(message));
    }

    /// Push a message update to current viewers
    pub fn publish_message(&self, message: &Message) {
        let frame = LiveFrame::MessageUpdate {
            message: MessageResponse::from(message),
        };
        if let Some(data) = frame.encode() {
            // No viewers connected is not an error
            let _ = self.tx.send(data);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for LiveUpdates {
    fn default() -> Self {
        Self::new(LIVE_UPDATE_CAPACITY)
    }
}
