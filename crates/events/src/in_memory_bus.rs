//! Channel-backed bus used by the in-memory wiring and the test harnesses.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    Poisoned,
}

/// Broadcast bus over std mpsc channels.
///
/// Every subscriber gets its own copy of each committed envelope, so the
/// stock-levels and orders projections can consume the same stream
/// independently. Delivery is best-effort and at-least-once; the event store
/// stays the source of truth and the projections' cursors absorb redelivery.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?;

        // A send failure means the receiver is gone; prune it.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_message() {
        let bus: InMemoryEventBus<&'static str> = InMemoryEventBus::new();
        let stock_levels = bus.subscribe();
        let orders_view = bus.subscribe();

        bus.publish("stock.reserved").unwrap();
        bus.publish("order.placed").unwrap();

        assert_eq!(stock_levels.try_recv().unwrap(), "stock.reserved");
        assert_eq!(stock_levels.try_recv().unwrap(), "order.placed");
        assert_eq!(orders_view.try_recv().unwrap(), "stock.reserved");
        assert_eq!(orders_view.try_recv().unwrap(), "order.placed");
    }

    #[test]
    fn dropped_subscribers_do_not_block_publication() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let keeper = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(1).unwrap();
        bus.publish(2).unwrap();

        assert_eq!(keeper.try_recv().unwrap(), 1);
        assert_eq!(keeper.try_recv().unwrap(), 2);
    }
}
