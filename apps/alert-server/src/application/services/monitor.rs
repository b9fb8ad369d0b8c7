//! Alert Monitor
//!
//! The recurring scheduler that drives alert evaluation. Once per period it:
//!
//! 1. snapshots the registry,
//! 2. collects the distinct tickers across all conditions,
//! 3. samples each ticker once, with at most `fetch_concurrency` fetches
//!    in flight,
//! 4. evaluates every connection's conditions against those samples and
//!    dispatches fired alerts,
//! 5. reaps connections whose outbound queue turned out to be closed.
//!
//! Ticks never overlap: each tick is awaited inline and missed periods are
//! skipped. A condition that stays true fires again on every tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::dispatcher::{Delivery, SharedDispatcher};
use super::resilient_price::ResilientPriceSource;
use crate::domain::alert::{PriceSample, Ticker, evaluate};
use crate::domain::subscription::{ConnectionId, SubscriptionRegistry};
use crate::infrastructure::metrics;

/// Default tick period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default cap on upstream fetches in flight during one tick.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Monitor loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Tick period.
    pub interval: Duration,
    /// Evaluate stale and synthetic samples as if they were live.
    pub notify_on_fallback: bool,
    /// Upstream fetches allowed in flight at once.
    pub fetch_concurrency: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            notify_on_fallback: false,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

// =============================================================================
// Tick Report
// =============================================================================

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Connections in the snapshot.
    pub connections: usize,
    /// Conditions in the snapshot.
    pub conditions: usize,
    /// Distinct tickers sampled.
    pub tickers: usize,
    /// Samples fetched live.
    pub live_samples: usize,
    /// Samples that fell back to stale or synthetic prices.
    pub fallback_samples: usize,
    /// Alerts enqueued.
    pub alerts_delivered: usize,
    /// Alerts discarded because a queue was full.
    pub alerts_dropped: usize,
    /// Connections removed after a closed delivery.
    pub connections_reaped: usize,
}

// =============================================================================
// Monitor State
// =============================================================================

/// Progress of the monitor loop, read by the health endpoint.
#[derive(Debug, Default)]
pub struct MonitorState {
    ticks_completed: AtomicU64,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
    last_report: RwLock<Option<TickReport>>,
}

impl MonitorState {
    fn record(&self, report: TickReport) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.write() = Some(Utc::now());
        *self.last_report.write() = Some(report);
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn ticks_completed(&self) -> u64 {
        self.ticks_completed.load(Ordering::Relaxed)
    }

    /// When the last tick completed.
    #[must_use]
    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        *self.last_tick_at.read()
    }

    /// Report of the last completed tick.
    #[must_use]
    pub fn last_report(&self) -> Option<TickReport> {
        self.last_report.read().clone()
    }
}

// =============================================================================
// Alert Monitor
// =============================================================================

/// Periodic price sampler and alert evaluator.
pub struct AlertMonitor {
    registry: Arc<SubscriptionRegistry>,
    dispatcher: SharedDispatcher,
    prices: Arc<ResilientPriceSource>,
    config: MonitorConfig,
    state: Arc<MonitorState>,
}

impl AlertMonitor {
    /// Create a new monitor.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        dispatcher: SharedDispatcher,
        prices: Arc<ResilientPriceSource>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            prices,
            config,
            state: Arc::new(MonitorState::default()),
        }
    }

    /// Get the shared monitor state.
    #[must_use]
    pub fn state(&self) -> Arc<MonitorState> {
        Arc::clone(&self.state)
    }

    /// Tick once per period until cancelled.
    ///
    /// The first tick happens one period after start. A tick in progress
    /// when cancellation arrives runs to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.config.interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_ms = period.as_millis(), "Alert monitor started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Alert monitor stopped");
    }

    /// Run a single evaluation cycle.
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let snapshot = self.registry.snapshot();
        let tickers = snapshot.distinct_tickers();

        let mut report = TickReport {
            connections: snapshot.connection_count(),
            conditions: snapshot.condition_count(),
            tickers: tickers.len(),
            ..TickReport::default()
        };

        let samples = self.sample_all(&tickers).await;
        self.prices.retain(&tickers);
        for sample in samples.values() {
            if sample.origin.is_fallback() {
                report.fallback_samples += 1;
            } else {
                report.live_samples += 1;
            }
        }

        let mut dead = Vec::new();
        for (connection, conditions) in snapshot.iter() {
            // Conditions are sorted by ticker, so each chunk shares one sample.
            'connection: for group in conditions.chunk_by(|a, b| a.ticker() == b.ticker()) {
                let Some(sample) = samples.get(group[0].ticker()) else {
                    continue;
                };
                if sample.origin.is_fallback() && !self.config.notify_on_fallback {
                    continue;
                }

                for condition in evaluate(sample, group) {
                    match self.dispatcher.dispatch(connection, condition.to_event(sample)) {
                        Delivery::Delivered => report.alerts_delivered += 1,
                        Delivery::Dropped => report.alerts_dropped += 1,
                        Delivery::Closed => {
                            dead.push(connection);
                            break 'connection;
                        }
                    }
                }
            }
        }

        for connection in dead {
            self.reap(connection);
            report.connections_reaped += 1;
        }

        let elapsed = started.elapsed();
        metrics::record_tick(&report, elapsed);
        tracing::debug!(
            connections = report.connections,
            conditions = report.conditions,
            tickers = report.tickers,
            fallback = report.fallback_samples,
            delivered = report.alerts_delivered,
            dropped = report.alerts_dropped,
            reaped = report.connections_reaped,
            elapsed_ms = elapsed.as_millis(),
            "Monitor tick complete"
        );

        self.state.record(report.clone());
        report
    }

    fn sample_all<'a>(
        &'a self,
        tickers: &'a [Ticker],
    ) -> futures::future::BoxFuture<'a, HashMap<Ticker, PriceSample>> {
        Box::pin(
            stream::iter(tickers)
                .map(|ticker| self.prices.sample(ticker))
                .buffer_unordered(self.config.fetch_concurrency.max(1))
                .map(|sample| (sample.ticker.clone(), sample))
                .collect(),
        )
    }

    fn reap(&self, connection: ConnectionId) {
        let dropped = self.registry.remove(connection);
        self.dispatcher.detach(connection);
        metrics::record_connection_reaped();
        tracing::info!(
            connection_id = %connection,
            conditions = dropped,
            "Removed dead connection"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
