//! In-process event bus carrying `VitalReceived` events to the alert consumer
//!
//! The bus holds a single subscriber slot. Publishing hands each event to
//! that subscriber's bounded inbox and waits for room, so a stalled consumer
//! pushes back on whoever is publishing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::data::Event;

#[derive(Clone)]
struct Slot {
    id: u64,
    tx: mpsc::Sender<Event>,
    closed: CancellationToken,
}

#[derive(Default)]
struct BusState {
    closed: bool,
    next_id: u64,
    slot: Option<Slot>,
}

struct BusInner {
    state: Mutex<BusState>,
    /// Fired once by `close` to release publishers blocked on a full inbox
    shutdown: CancellationToken,
}

/// Single-consumer event bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Hand `event` to the registered subscriber
    ///
    /// Waits until the subscriber's inbox accepts the event, `cancel` fires,
    /// or the bus closes. With no subscriber registered the event is dropped.
    pub async fn publish(&self, event: Event, cancel: &CancellationToken) -> Result<(), BusError> {
        let slot = {
            let state = self.inner.state.lock();
            if state.closed {
                return Err(BusError::Closed);
            }
            state.slot.clone()
        };

        let Some(slot) = slot else {
            tracing::debug!("No subscriber registered, dropping event");
            return Ok(());
        };

        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(BusError::Closed),
            _ = cancel.cancelled() => Err(BusError::Cancelled),
            // Subscriber went away while we were waiting for room
            _ = slot.closed.cancelled() => Ok(()),
            permit = slot.tx.reserve() => {
                if let Ok(permit) = permit {
                    permit.send(event);
                }
                Ok(())
            }
        }
    }

    /// Register the consumer with an inbox of `buffer_size` events (at least 1)
    ///
    /// When a subscriber is already registered or the bus is closed, the
    /// returned subscription is already ended and yields nothing.
    pub fn subscribe(&self, buffer_size: usize) -> (Subscription, Unsubscribe) {
        let mut state = self.inner.state.lock();

        if state.closed {
            tracing::warn!("Subscribe on closed event bus");
            return (Subscription::ended(), Unsubscribe::noop());
        }
        if state.slot.is_some() {
            tracing::warn!("Event bus already has a subscriber");
            return (Subscription::ended(), Unsubscribe::noop());
        }

        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let closed = CancellationToken::new();

        state.next_id += 1;
        let id = state.next_id;
        state.slot = Some(Slot {
            id,
            tx,
            closed: closed.clone(),
        });

        (
            Subscription::new(rx, closed.clone()),
            Unsubscribe {
                bus: Some(Arc::clone(&self.inner)),
                id,
                closed,
            },
        )
    }

    /// Close the bus and end the active subscription. Idempotent.
    pub fn close(&self) {
        let slot = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.slot.take()
        };

        self.inner.shutdown.cancel();
        if let Some(slot) = slot {
            slot.closed.cancel();
        }

        tracing::info!("Event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Whether a subscriber currently holds the slot
    pub fn has_subscriber(&self) -> bool {
        self.inner.state.lock().slot.is_some()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound side of a subscription
///
/// Ends when the subscription is cancelled or the bus closes. Events already
/// accepted into the inbox are still yielded before the end.
pub struct Subscription {
    rx: mpsc::Receiver<Event>,
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
    closing: bool,
    done: bool,
}

impl Subscription {
    fn new(rx: mpsc::Receiver<Event>, closed: CancellationToken) -> Self {
        Self {
            rx,
            closed: Box::pin(closed.cancelled_owned()),
            closing: false,
            done: false,
        }
    }

    fn ended() -> Self {
        let (_, rx) = mpsc::channel(1);
        let closed = CancellationToken::new();
        closed.cancel();
        Self::new(rx, closed)
    }

    /// Next event, or `None` once the subscription has ended
    pub async fn recv(&mut self) -> Option<Event> {
        self.next().await
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        // Refuse further sends, then drain what is buffered
        if !this.closing && this.closed.as_mut().poll(cx).is_ready() {
            this.closing = true;
            this.rx.close();
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Deregisters a subscription. Idempotent.
#[derive(Clone)]
pub struct Unsubscribe {
    bus: Option<Arc<BusInner>>,
    id: u64,
    closed: CancellationToken,
}

impl Unsubscribe {
    fn noop() -> Self {
        Self {
            bus: None,
            id: 0,
            closed: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        if let Some(bus) = &self.bus {
            let mut state = bus.state.lock();
            if state.slot.as_ref().map(|s| s.id) == Some(self.id) {
                state.slot = None;
            }
        }
        self.closed.cancel();
    }
}

/// Event bus errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("event bus is closed")]
    Closed,

    #[error("publish cancelled")]
    Cancelled,
}
