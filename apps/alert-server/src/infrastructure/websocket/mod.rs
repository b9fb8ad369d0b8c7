//! WebSocket Alert Channel
//!
//! One WebSocket per client. The `AlertHub` owns the connection lifecycle:
//! it allocates connection ids, admits them to the registry and dispatcher,
//! applies decoded requests, and tears everything down on disconnect.
//!
//! # Protocol
//!
//! Client to server:
//! `{"type":"subscribe"|"unsubscribe","ticker":..,"threshold":..,"alertType":"above"|"below"}`
//!
//! Server to client:
//! `{"type":"alert","data":{"ticker":..,"price":..,"threshold":..,"alertType":..,"timestamp":..}}`

mod handler;
pub mod messages;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

pub use handler::ws_handler;
use messages::{Inbound, InboundError};

use crate::application::services::SharedDispatcher;
use crate::domain::alert::NotificationEvent;
use crate::domain::subscription::{ConnectionId, RegistryError, SubscriptionRegistry};
use crate::infrastructure::metrics::{self, IgnoredReason};

/// Default cap on conditions per connection.
pub const DEFAULT_MAX_CONDITIONS: usize = 100;

/// Connection lifecycle and request routing for WebSocket sessions.
pub struct AlertHub {
    registry: Arc<SubscriptionRegistry>,
    dispatcher: SharedDispatcher,
    next_id: AtomicU64,
    max_conditions: usize,
}

impl AlertHub {
    /// Create a hub over shared registry and dispatcher.
    #[must_use]
    pub const fn new(registry: Arc<SubscriptionRegistry>, dispatcher: SharedDispatcher) -> Self {
        Self {
            registry,
            dispatcher,
            next_id: AtomicU64::new(1),
            max_conditions: DEFAULT_MAX_CONDITIONS,
        }
    }

    /// Cap the conditions a single connection may hold.
    #[must_use]
    pub fn with_max_conditions(mut self, max_conditions: usize) -> Self {
        self.max_conditions = max_conditions;
        self
    }

    /// Admit a new connection.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if the allocated id is already present.
    pub fn connect(
        &self,
    ) -> Result<(ConnectionId, mpsc::Receiver<NotificationEvent>), RegistryError> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry.admit(id)?;
        let outbound = self.dispatcher.attach(id);

        self.publish_gauges();
        tracing::info!(connection_id = %id, "Client connected");
        Ok((id, outbound))
    }

    /// Tear down a connection. Idempotent.
    pub fn disconnect(&self, id: ConnectionId) {
        let dropped = self.registry.remove(id);
        self.dispatcher.detach(id);

        self.publish_gauges();
        tracing::info!(connection_id = %id, conditions = dropped, "Client disconnected");
    }

    /// Apply one inbound text frame. Undecodable frames are ignored.
    pub fn handle_text(&self, id: ConnectionId, text: &str) {
        match messages::decode(text) {
            Ok(Inbound::Subscribe(condition)) => {
                let added = match self.registry.subscribe_capped(
                    id,
                    condition.clone(),
                    self.max_conditions,
                ) {
                    Ok(added) => added,
                    Err(e) => {
                        ignore(id, IgnoredReason::OverLimit, &e);
                        return;
                    }
                };
                tracing::debug!(
                    connection_id = %id,
                    ticker = %condition.ticker(),
                    threshold = condition.threshold(),
                    direction = condition.direction().as_str(),
                    added,
                    "Subscribe"
                );
            }
            Ok(Inbound::Unsubscribe(condition)) => {
                let removed = self.registry.unsubscribe(id, &condition);
                tracing::debug!(
                    connection_id = %id,
                    ticker = %condition.ticker(),
                    threshold = condition.threshold(),
                    direction = condition.direction().as_str(),
                    removed,
                    "Unsubscribe"
                );
            }
            Err(e) => {
                let reason = match e {
                    InboundError::Malformed(_) => IgnoredReason::Malformed,
                    InboundError::Invalid(_) => IgnoredReason::Invalid,
                };
                ignore(id, reason, &e);
                return;
            }
        }
        self.publish_gauges();
    }

    /// Note an ignored binary frame.
    pub fn handle_binary(&self, id: ConnectionId) {
        ignore(id, IgnoredReason::Binary, &"binary frames are not supported");
    }

    /// Shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    fn publish_gauges(&self) {
        let stats = self.registry.stats();
        metrics::set_connections(stats.connection_count);
        metrics::set_conditions(stats.condition_count);
    }
}

fn ignore(id: ConnectionId, reason: IgnoredReason, error: &dyn std::fmt::Display) {
    metrics::record_inbound_ignored(reason);
    tracing::debug!(connection_id = %id, error = %error, "Ignoring inbound frame");
}

/// Shared hub reference.
pub type SharedHub = Arc<AlertHub>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::NotificationDispatcher;
    use crate::domain::alert::{AlertCondition, Direction};

    fn hub() -> AlertHub {
        AlertHub::new(
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(NotificationDispatcher::new(8)),
        )
    }

    const SUB_AAPL: &str = r#"{"type":"subscribe","ticker":"AAPL","threshold":150,"alertType":"above"}"#;
    const UNSUB_AAPL: &str =
        r#"{"type":"unsubscribe","ticker":"AAPL","threshold":150,"alertType":"above"}"#;

    #[test]
    fn connect_allocates_distinct_ids() {
        let hub = hub();
        let (a, _rx_a) = hub.connect().unwrap();
        let (b, _rx_b) = hub.connect().unwrap();

        assert_ne!(a, b);
        assert!(hub.registry().contains(a));
        assert!(hub.registry().contains(b));
        assert!(hub.registry().conditions(a).is_empty());
    }

    #[test]
    fn subscribe_then_unsubscribe() {
        let hub = hub();
        let (id, _rx) = hub.connect().unwrap();

        hub.handle_text(id, SUB_AAPL);
        hub.handle_text(id, SUB_AAPL);
        assert_eq!(
            hub.registry().conditions(id),
            vec![AlertCondition::parse("AAPL", 150.0, Direction::Above).unwrap()]
        );

        hub.handle_text(id, UNSUB_AAPL);
        assert!(hub.registry().conditions(id).is_empty());
    }

    #[test]
    fn garbage_leaves_state_untouched() {
        let hub = hub();
        let (id, _rx) = hub.connect().unwrap();
        hub.handle_text(id, SUB_AAPL);

        hub.handle_text(id, "{{{");
        hub.handle_text(id, r#"{"type":"hello"}"#);
        hub.handle_binary(id);

        assert!(hub.registry().contains(id));
        assert_eq!(hub.registry().conditions(id).len(), 1);
    }

    #[test]
    fn requests_after_disconnect_are_noops() {
        let hub = hub();
        let (id, mut rx) = hub.connect().unwrap();
        hub.handle_text(id, SUB_AAPL);

        hub.disconnect(id);
        hub.handle_text(id, SUB_AAPL);
        hub.disconnect(id);

        assert!(!hub.registry().contains(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn subscribes_past_limit_are_ignored() {
        let hub = hub().with_max_conditions(2);
        let (id, _rx) = hub.connect().unwrap();

        for ticker in ["AAPL", "MSFT", "TSLA", "NVDA"] {
            hub.handle_text(
                id,
                &format!(r#"{{"type":"subscribe","ticker":"{ticker}","threshold":1,"alertType":"above"}}"#),
            );
        }

        let tickers: Vec<_> = hub
            .registry()
            .conditions(id)
            .iter()
            .map(|c| c.ticker().to_string())
            .collect();
        assert_eq!(tickers, ["AAPL", "MSFT"]);
        assert!(hub.registry().contains(id));
    }

    #[test]
    fn condition_limit_is_per_connection() {
        let hub = hub().with_max_conditions(1);
        let (a, _rx_a) = hub.connect().unwrap();
        let (b, _rx_b) = hub.connect().unwrap();

        hub.handle_text(a, SUB_AAPL);
        hub.handle_text(b, SUB_AAPL);

        assert_eq!(hub.registry().conditions(a).len(), 1);
        assert_eq!(hub.registry().conditions(b).len(), 1);
    }

    #[test]
    fn subscriptions_are_per_connection() {
        let hub = hub();
        let (a, _rx_a) = hub.connect().unwrap();
        let (b, _rx_b) = hub.connect().unwrap();

        hub.handle_text(a, SUB_AAPL);
        hub.handle_text(b, UNSUB_AAPL);

        assert_eq!(hub.registry().conditions(a).len(), 1);
        assert!(hub.registry().conditions(b).is_empty());
    }
}
