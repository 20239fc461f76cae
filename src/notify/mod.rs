//! Outbound patient notifications
//!
//! `NotificationQueue` holds messages and their status history;
//! `QueueDrainer` advances them to sent one at a time.

pub mod drainer;
pub mod queue;

pub use drainer::QueueDrainer;
pub use queue::{Message, MessageListener, MessageStatus, NotificationQueue};
