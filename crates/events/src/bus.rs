//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes committed events to consumers (projections, workers).
//! It is intentionally lightweight:
//!
//! - **Transport-agnostic**: in-memory channels today, a broker later.
//! - **At-least-once delivery**: consumers must be idempotent.
//! - **No persistence**: the event store is the source of truth; the bus is
//!   for distribution only.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of all events published to the bus
/// (broadcast semantics). Designed for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    rx: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(rx: Receiver<M>) -> Self {
        Self { rx }
    }

    /// Block until the next message arrives (or the bus is dropped).
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.rx.recv()
    }

    /// Block with a timeout; lets consumers poll for shutdown.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.rx.try_recv()
    }
}

/// Publish/subscribe bus for committed events.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug;

    /// Publish a message to all current subscribers.
    fn publish(&self, message: M) -> Result<(), Self::Error>;

    /// Create a new subscription receiving all future messages.
    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
