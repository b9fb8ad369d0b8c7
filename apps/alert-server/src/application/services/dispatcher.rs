//! Notification Dispatcher
//!
//! Delivers fired-alert events to the owning connection's outbound queue.
//!
//! # Architecture
//!
//! Each attached connection owns a bounded `mpsc` queue. The WebSocket
//! session drains its receiver into the socket; the monitor loop pushes into
//! the sender with a non-blocking `try_send`, so one slow client can never
//! stall evaluation for the others.
//!
//! Every dispatch reports a `Delivery` liveness signal. `Closed` means the
//! session's receiver is gone and the connection should be reaped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::domain::alert::NotificationEvent;
use crate::domain::subscription::ConnectionId;

/// Default per-connection outbound queue depth.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Event enqueued for the connection.
    Delivered,
    /// Queue full; event discarded, connection still alive.
    Dropped,
    /// Connection is gone (receiver dropped or never attached).
    Closed,
}

impl Delivery {
    /// Check if the connection should be removed.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Routes events to per-connection outbound queues.
///
/// # Example
///
/// ```rust
/// use alert_server::application::services::{Delivery, NotificationDispatcher};
/// use alert_server::domain::alert::{AlertCondition, Direction, PriceSample, Ticker};
/// use alert_server::domain::subscription::ConnectionId;
///
/// let dispatcher = NotificationDispatcher::new(8);
/// let mut rx = dispatcher.attach(ConnectionId(1));
///
/// let condition = AlertCondition::parse("AAPL", 150.0, Direction::Above).unwrap();
/// let sample = PriceSample::live(Ticker::parse("AAPL").unwrap(), 155.0);
/// let delivery = dispatcher.dispatch(ConnectionId(1), condition.to_event(&sample));
///
/// assert_eq!(delivery, Delivery::Delivered);
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug)]
pub struct NotificationDispatcher {
    capacity: usize,
    outbound: RwLock<HashMap<ConnectionId, mpsc::Sender<NotificationEvent>>>,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl NotificationDispatcher {
    /// Create a dispatcher whose queues hold `capacity` events (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            outbound: RwLock::new(HashMap::new()),
        }
    }

    /// Open an outbound queue for `connection` and return its receiving end.
    ///
    /// Re-attaching replaces the previous queue, closing it.
    pub fn attach(&self, connection: ConnectionId) -> mpsc::Receiver<NotificationEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.outbound.write().insert(connection, tx);
        rx
    }

    /// Drop the outbound queue for `connection`. Idempotent.
    pub fn detach(&self, connection: ConnectionId) {
        self.outbound.write().remove(&connection);
    }

    /// Enqueue `event` for `connection` without blocking.
    pub fn dispatch(&self, connection: ConnectionId, event: NotificationEvent) -> Delivery {
        let Some(tx) = self.outbound.read().get(&connection).cloned() else {
            return Delivery::Closed;
        };

        match tx.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %connection,
                    ticker = %event.ticker,
                    "Outbound queue full, dropping alert"
                );
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Number of attached connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.outbound.read().len()
    }
}

/// Shared dispatcher reference.
pub type SharedDispatcher = Arc<NotificationDispatcher>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready, task};

    use super::*;
    use crate::domain::alert::{AlertCondition, Direction, PriceSample, Ticker};

    fn event(price: f64) -> NotificationEvent {
        let condition = AlertCondition::parse("AAPL", 150.0, Direction::Above).unwrap();
        condition.to_event(&PriceSample::live(Ticker::parse("AAPL").unwrap(), price))
    }

    #[tokio::test]
    async fn dispatch_reaches_attached_connection() {
        let dispatcher = NotificationDispatcher::new(4);
        let mut rx = dispatcher.attach(ConnectionId(1));

        assert_eq!(dispatcher.dispatch(ConnectionId(1), event(155.0)), Delivery::Delivered);

        let received = rx.recv().await.unwrap();
        assert!((received.price - 155.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dispatch_only_reaches_owner() {
        let dispatcher = NotificationDispatcher::new(4);
        let mut rx1 = dispatcher.attach(ConnectionId(1));
        let mut rx2 = dispatcher.attach(ConnectionId(2));

        dispatcher.dispatch(ConnectionId(2), event(155.0));

        assert_err!(rx1.try_recv());
        assert_ok!(rx2.try_recv());
    }

    #[test]
    fn dispatch_wakes_waiting_writer() {
        let dispatcher = NotificationDispatcher::new(4);
        let mut rx = dispatcher.attach(ConnectionId(1));
        let mut recv = task::spawn(rx.recv());
        assert_pending!(recv.poll());

        dispatcher.dispatch(ConnectionId(1), event(155.0));

        assert!(recv.is_woken());
        let received = assert_ready!(recv.poll());
        assert!(received.is_some_and(|e| (e.price - 155.0).abs() < f64::EPSILON));
    }

    #[test]
    fn detach_ends_waiting_writer() {
        let dispatcher = NotificationDispatcher::new(4);
        let mut rx = dispatcher.attach(ConnectionId(1));
        let mut recv = task::spawn(rx.recv());
        assert_pending!(recv.poll());

        dispatcher.detach(ConnectionId(1));

        assert!(recv.is_woken());
        assert!(assert_ready!(recv.poll()).is_none());
    }

    #[test]
    fn unknown_connection_is_closed() {
        let dispatcher = NotificationDispatcher::new(4);
        assert_eq!(dispatcher.dispatch(ConnectionId(7), event(155.0)), Delivery::Closed);
    }

    #[test]
    fn dropped_receiver_is_closed() {
        let dispatcher = NotificationDispatcher::new(4);
        let rx = dispatcher.attach(ConnectionId(1));
        drop(rx);

        let delivery = dispatcher.dispatch(ConnectionId(1), event(155.0));

        assert_eq!(delivery, Delivery::Closed);
        assert!(delivery.is_dead());
    }

    #[test]
    fn full_queue_drops_without_killing() {
        let dispatcher = NotificationDispatcher::new(1);
        let _rx = dispatcher.attach(ConnectionId(1));

        assert_eq!(dispatcher.dispatch(ConnectionId(1), event(155.0)), Delivery::Delivered);
        let delivery = dispatcher.dispatch(ConnectionId(1), event(156.0));

        assert_eq!(delivery, Delivery::Dropped);
        assert!(!delivery.is_dead());
    }

    #[test]
    fn detach_closes_queue() {
        let dispatcher = NotificationDispatcher::new(4);
        let mut rx = dispatcher.attach(ConnectionId(1));
        assert_eq!(dispatcher.connection_count(), 1);

        dispatcher.detach(ConnectionId(1));
        dispatcher.detach(ConnectionId(1));

        assert_eq!(dispatcher.connection_count(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn zero_capacity_clamped() {
        let dispatcher = NotificationDispatcher::new(0);
        let _rx = dispatcher.attach(ConnectionId(1));
        assert_eq!(dispatcher.dispatch(ConnectionId(1), event(155.0)), Delivery::Delivered);
    }
}
