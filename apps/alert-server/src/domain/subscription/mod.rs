//! Subscription Registry
//!
//! Tracks which live connections care about which alert conditions.
//!
//! # Design
//!
//! The registry maps each admitted connection to its `AlertSet`. Entries are
//! spread across a fixed number of shards keyed by connection id, so a
//! connection's writer (its own inbound message loop) only ever contends
//! with the monitor's snapshot reads on that one shard.
//!
//! Lifecycle of an entry: `Admitted -> (Subscribed)* -> Removed`. Mutations
//! against an unknown or removed connection are no-ops, since they can only
//! come from a race with disconnect.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;

use crate::domain::alert::{AlertCondition, Ticker};

// =============================================================================
// Types
// =============================================================================

/// Opaque identity of one live client channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Set of conditions for one connection. Structural duplicates collapse.
pub type AlertSet = HashSet<AlertCondition>;

/// Default shard count.
pub const DEFAULT_SHARDS: usize = 16;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The connection already has an entry.
    #[error("connection {0} is already admitted")]
    AlreadyAdmitted(ConnectionId),
    /// The connection already holds its maximum number of conditions.
    #[error("connection {connection} is at its limit of {limit} conditions")]
    ConditionLimit {
        /// The connection.
        connection: ConnectionId,
        /// Configured per-connection limit.
        limit: usize,
    },
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time copy of registry state for one tick.
///
/// Each connection's conditions are sorted so iteration order is stable.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: Vec<(ConnectionId, Vec<AlertCondition>)>,
}

impl RegistrySnapshot {
    /// Iterate connections and their conditions.
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &[AlertCondition])> {
        self.entries
            .iter()
            .map(|(connection, conditions)| (*connection, conditions.as_slice()))
    }

    /// Get the conditions captured for one connection.
    #[must_use]
    pub fn conditions(&self, connection: ConnectionId) -> Option<&[AlertCondition]> {
        self.entries
            .iter()
            .find(|(id, _)| *id == connection)
            .map(|(_, conditions)| conditions.as_slice())
    }

    /// Distinct tickers across every captured condition, sorted.
    #[must_use]
    pub fn distinct_tickers(&self) -> Vec<Ticker> {
        let mut tickers: Vec<Ticker> = self
            .entries
            .iter()
            .flat_map(|(_, conditions)| conditions.iter().map(|c| c.ticker().clone()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        tickers.sort();
        tickers
    }

    /// Number of connections captured.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of conditions captured across all connections.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.entries.iter().map(|(_, c)| c.len()).sum()
    }

    /// Check if the snapshot holds no conditions at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.condition_count() == 0
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Concurrent mapping from connection to its alert conditions.
///
/// # Example
///
/// ```rust
/// use alert_server::domain::alert::{AlertCondition, Direction};
/// use alert_server::domain::subscription::{ConnectionId, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
/// let conn = ConnectionId(1);
/// registry.admit(conn).unwrap();
///
/// let condition = AlertCondition::parse("AAPL", 150.0, Direction::Above).unwrap();
/// registry.subscribe(conn, condition.clone());
/// registry.subscribe(conn, condition.clone());
/// assert_eq!(registry.conditions(conn).len(), 1);
///
/// registry.unsubscribe(conn, &condition);
/// assert!(registry.conditions(conn).is_empty());
///
/// registry.remove(conn);
/// assert!(!registry.contains(conn));
/// ```
pub struct SubscriptionRegistry {
    shards: Box<[RwLock<HashMap<ConnectionId, AlertSet>>]>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Create a registry with the default shard count.
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create a registry with `shards` shards (at least one).
    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    /// Create an empty alert set for a new connection.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyAdmitted` if the connection already
    /// has an entry.
    pub fn admit(&self, connection: ConnectionId) -> Result<(), RegistryError> {
        let mut shard = self.shard(connection).write();
        if shard.contains_key(&connection) {
            return Err(RegistryError::AlreadyAdmitted(connection));
        }
        shard.insert(connection, AlertSet::new());
        Ok(())
    }

    /// Add a condition to a connection's set.
    ///
    /// Returns `true` if the set changed. Duplicates and unknown
    /// connections are no-ops.
    pub fn subscribe(&self, connection: ConnectionId, condition: AlertCondition) -> bool {
        self.subscribe_capped(connection, condition, usize::MAX)
            .unwrap_or(false)
    }

    /// Add a condition unless the connection already holds `limit` others.
    ///
    /// Re-subscribing an existing condition at the limit is a no-op, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ConditionLimit` if the set is full.
    pub fn subscribe_capped(
        &self,
        connection: ConnectionId,
        condition: AlertCondition,
        limit: usize,
    ) -> Result<bool, RegistryError> {
        let mut shard = self.shard(connection).write();
        let Some(set) = shard.get_mut(&connection) else {
            return Ok(false);
        };
        if set.len() >= limit && !set.contains(&condition) {
            return Err(RegistryError::ConditionLimit { connection, limit });
        }
        Ok(set.insert(condition))
    }

    /// Remove the structurally matching condition from a connection's set.
    ///
    /// Returns `true` if a condition was removed.
    pub fn unsubscribe(&self, connection: ConnectionId, condition: &AlertCondition) -> bool {
        self.shard(connection)
            .write()
            .get_mut(&connection)
            .is_some_and(|set| set.remove(condition))
    }

    /// Delete a connection's entire set. Idempotent.
    ///
    /// Returns the number of conditions dropped with it.
    pub fn remove(&self, connection: ConnectionId) -> usize {
        self.shard(connection)
            .write()
            .remove(&connection)
            .map_or(0, |set| set.len())
    }

    /// Check if a connection is admitted.
    #[must_use]
    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.shard(connection).read().contains_key(&connection)
    }

    /// Get a sorted copy of one connection's conditions.
    #[must_use]
    pub fn conditions(&self, connection: ConnectionId) -> Vec<AlertCondition> {
        self.shard(connection)
            .read()
            .get(&connection)
            .map(sorted)
            .unwrap_or_default()
    }

    /// Copy every connection's conditions.
    ///
    /// Each shard is copied under its own read lock, so a single
    /// subscribe/unsubscribe is either fully in or fully out of the
    /// snapshot. Entries from different shards may be copied at slightly
    /// different instants.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut entries = Vec::new();
        for shard in &*self.shards {
            let guard = shard.read();
            entries.extend(guard.iter().map(|(id, set)| (*id, sorted(set))));
        }
        entries.sort_by_key(|(id, _)| *id);
        RegistrySnapshot { entries }
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for shard in &*self.shards {
            let guard = shard.read();
            stats.connection_count += guard.len();
            stats.condition_count += guard.values().map(HashSet::len).sum::<usize>();
        }
        stats
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard(&self, connection: ConnectionId) -> &RwLock<HashMap<ConnectionId, AlertSet>> {
        &self.shards[(connection.0 % self.shards.len() as u64) as usize]
    }
}

fn sorted(set: &AlertSet) -> Vec<AlertCondition> {
    let mut conditions: Vec<_> = set.iter().cloned().collect();
    conditions.sort();
    conditions
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of admitted connections.
    pub connection_count: usize,
    /// Number of conditions across all connections.
    pub condition_count: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::Direction;

    fn cond(ticker: &str, threshold: f64, direction: Direction) -> AlertCondition {
        AlertCondition::parse(ticker, threshold, direction).unwrap()
    }

    #[test]
    fn admit_creates_empty_set() {
        let registry = SubscriptionRegistry::new();

        registry.admit(ConnectionId(1)).unwrap();

        assert!(registry.contains(ConnectionId(1)));
        assert!(registry.conditions(ConnectionId(1)).is_empty());
    }

    #[test]
    fn admit_twice_is_an_error() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();

        let result = registry.admit(ConnectionId(1));

        assert_eq!(result, Err(RegistryError::AlreadyAdmitted(ConnectionId(1))));
    }

    #[test]
    fn subscribe_duplicate_yields_one_entry() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();

        assert!(registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above)));
        assert!(!registry.subscribe(ConnectionId(1), cond("aapl", 150.0, Direction::Above)));

        assert_eq!(registry.conditions(ConnectionId(1)).len(), 1);
    }

    #[test]
    fn subscribe_unknown_connection_is_noop() {
        let registry = SubscriptionRegistry::new();

        assert!(!registry.subscribe(ConnectionId(9), cond("AAPL", 150.0, Direction::Above)));

        assert!(!registry.contains(ConnectionId(9)));
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn capped_subscribe_rejects_past_limit() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();

        assert_eq!(
            registry.subscribe_capped(ConnectionId(1), cond("AAPL", 1.0, Direction::Above), 2),
            Ok(true)
        );
        assert_eq!(
            registry.subscribe_capped(ConnectionId(1), cond("MSFT", 1.0, Direction::Above), 2),
            Ok(true)
        );
        assert_eq!(
            registry.subscribe_capped(ConnectionId(1), cond("TSLA", 1.0, Direction::Above), 2),
            Err(RegistryError::ConditionLimit {
                connection: ConnectionId(1),
                limit: 2
            })
        );
        // Already present, so not counted against the limit.
        assert_eq!(
            registry.subscribe_capped(ConnectionId(1), cond("AAPL", 1.0, Direction::Above), 2),
            Ok(false)
        );

        registry.unsubscribe(ConnectionId(1), &cond("MSFT", 1.0, Direction::Above));
        assert_eq!(
            registry.subscribe_capped(ConnectionId(1), cond("TSLA", 1.0, Direction::Above), 2),
            Ok(true)
        );
        assert_eq!(registry.conditions(ConnectionId(1)).len(), 2);
    }

    #[test]
    fn unsubscribe_missing_condition_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));

        assert!(!registry.unsubscribe(ConnectionId(1), &cond("AAPL", 150.0, Direction::Below)));
        assert!(!registry.unsubscribe(ConnectionId(2), &cond("AAPL", 150.0, Direction::Above)));

        assert_eq!(registry.conditions(ConnectionId(1)).len(), 1);
    }

    #[test]
    fn unsubscribe_matches_structurally() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));

        assert!(registry.unsubscribe(ConnectionId(1), &cond(" aapl", 150.0, Direction::Above)));

        assert!(registry.conditions(ConnectionId(1)).is_empty());
        // The set itself survives until the connection is removed.
        assert!(registry.contains(ConnectionId(1)));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));

        assert_eq!(registry.remove(ConnectionId(1)), 1);
        assert_eq!(registry.remove(ConnectionId(1)), 0);
        assert!(!registry.contains(ConnectionId(1)));
    }

    #[test]
    fn subscribe_after_remove_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.remove(ConnectionId(1));

        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));

        assert!(!registry.contains(ConnectionId(1)));
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));

        let snapshot = registry.snapshot();
        registry.subscribe(ConnectionId(1), cond("MSFT", 300.0, Direction::Below));
        registry.remove(ConnectionId(1));

        assert_eq!(snapshot.connection_count(), 1);
        assert_eq!(snapshot.conditions(ConnectionId(1)).unwrap().len(), 1);
    }

    #[test]
    fn snapshot_after_remove_excludes_connection() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.admit(ConnectionId(2)).unwrap();
        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));
        registry.subscribe(ConnectionId(2), cond("AAPL", 150.0, Direction::Above));

        registry.remove(ConnectionId(1));
        let snapshot = registry.snapshot();

        assert!(snapshot.conditions(ConnectionId(1)).is_none());
        assert!(snapshot.conditions(ConnectionId(2)).is_some());
    }

    #[test]
    fn snapshot_distinct_tickers_deduplicates() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.admit(ConnectionId(2)).unwrap();
        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));
        registry.subscribe(ConnectionId(1), cond("AAPL", 140.0, Direction::Below));
        registry.subscribe(ConnectionId(2), cond("MSFT", 300.0, Direction::Above));

        let tickers = registry.snapshot().distinct_tickers();

        let names: Vec<_> = tickers.iter().map(Ticker::as_str).collect();
        assert_eq!(names, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn snapshot_conditions_are_sorted() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();
        registry.subscribe(ConnectionId(1), cond("MSFT", 300.0, Direction::Above));
        registry.subscribe(ConnectionId(1), cond("AAPL", 160.0, Direction::Above));
        registry.subscribe(ConnectionId(1), cond("AAPL", 150.0, Direction::Above));

        let snapshot = registry.snapshot();
        let conditions = snapshot.conditions(ConnectionId(1)).unwrap();

        assert_eq!(conditions[0], cond("AAPL", 150.0, Direction::Above));
        assert_eq!(conditions[1], cond("AAPL", 160.0, Direction::Above));
        assert_eq!(conditions[2], cond("MSFT", 300.0, Direction::Above));
    }

    #[test]
    fn empty_snapshot() {
        let registry = SubscriptionRegistry::new();
        registry.admit(ConnectionId(1)).unwrap();

        let snapshot = registry.snapshot();

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.connection_count(), 1);
        assert!(snapshot.distinct_tickers().is_empty());
    }

    #[test]
    fn zero_shards_clamped_to_one() {
        let registry = SubscriptionRegistry::with_shards(0);
        registry.admit(ConnectionId(42)).unwrap();
        assert!(registry.contains(ConnectionId(42)));
    }

    #[test]
    fn stats_are_accurate() {
        let registry = SubscriptionRegistry::with_shards(4);
        for id in 0..6 {
            registry.admit(ConnectionId(id)).unwrap();
            registry.subscribe(ConnectionId(id), cond("AAPL", 150.0, Direction::Above));
        }
        registry.subscribe(ConnectionId(0), cond("MSFT", 300.0, Direction::Above));

        let stats = registry.stats();

        assert_eq!(stats.connection_count, 6);
        assert_eq!(stats.condition_count, 7);
    }

    #[test]
    fn thread_safety_concurrent_subscriptions() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.admit(ConnectionId(i)).unwrap();
                #[allow(clippy::cast_precision_loss)]
                let threshold = i as f64;
                r.subscribe(ConnectionId(i), cond("SHARED", 100.0, Direction::Above));
                r.subscribe(ConnectionId(i), cond(&format!("SYM{i}"), threshold, Direction::Below));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.connection_count(), 10);
        assert_eq!(snapshot.condition_count(), 20);
        // SYM0..SYM9 + SHARED
        assert_eq!(snapshot.distinct_tickers().len(), 11);
    }

    #[test]
    fn thread_safety_concurrent_removals() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        for i in 0..10u64 {
            registry.admit(ConnectionId(i)).unwrap();
            registry.subscribe(ConnectionId(i), cond("SHARED", 100.0, Direction::Above));
        }

        let mut handles = vec![];
        for i in 0..10u64 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.remove(ConnectionId(i));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.stats(), RegistryStats::default());
    }
}
