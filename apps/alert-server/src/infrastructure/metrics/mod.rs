//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Connections**: Live WebSocket sessions and registered conditions
//! - **Monitor**: Tick counts, tick latency, price fetch outcomes
//! - **Delivery**: Alerts delivered, dropped, and dead connections reaped
//! - **Inbound**: Client frames that were ignored
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before `init_metrics` is a no-op, so library code and tests can call the
//! recording functions unconditionally.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::services::TickReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Connection gauges
    describe_gauge!(
        "alert_server_connections",
        "Number of open WebSocket connections"
    );
    describe_gauge!(
        "alert_server_conditions",
        "Number of registered alert conditions"
    );

    // Monitor
    describe_counter!(
        "alert_server_ticks_total",
        "Total completed monitor ticks"
    );
    describe_histogram!(
        "alert_server_tick_duration_seconds",
        "Wall time of one monitor tick"
    );
    describe_counter!(
        "alert_server_price_fetches_total",
        "Total price lookups by outcome"
    );

    // Delivery
    describe_counter!(
        "alert_server_alerts_delivered_total",
        "Total alerts enqueued for clients"
    );
    describe_counter!(
        "alert_server_alerts_dropped_total",
        "Total alerts dropped due to full outbound queues"
    );
    describe_counter!(
        "alert_server_connections_reaped_total",
        "Total connections removed after a failed delivery"
    );

    // Inbound
    describe_counter!(
        "alert_server_inbound_ignored_total",
        "Total client frames ignored by reason"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a price lookup.
#[derive(Debug, Clone, Copy)]
pub enum FetchOutcome {
    /// Fresh upstream price.
    Live,
    /// Stale or synthetic fallback.
    Fallback,
}

impl FetchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fallback => "fallback",
        }
    }
}

/// Reason label for an ignored inbound frame.
#[derive(Debug, Clone, Copy)]
pub enum IgnoredReason {
    /// Not valid JSON or not a known message shape.
    Malformed,
    /// Well-formed but carried an unusable ticker or threshold.
    Invalid,
    /// Binary frame.
    Binary,
    /// Subscribe past the per-connection condition limit.
    OverLimit,
}

impl IgnoredReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Invalid => "invalid",
            Self::Binary => "binary",
            Self::OverLimit => "over_limit",
        }
    }
}

/// Record a price lookup outcome.
pub fn record_price_fetch(outcome: FetchOutcome) {
    counter!(
        "alert_server_price_fetches_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a completed monitor tick.
pub fn record_tick(report: &TickReport, duration: Duration) {
    counter!("alert_server_ticks_total").increment(1);
    histogram!("alert_server_tick_duration_seconds").record(duration.as_secs_f64());
    counter!("alert_server_alerts_delivered_total").increment(report.alerts_delivered as u64);
    counter!("alert_server_alerts_dropped_total").increment(report.alerts_dropped as u64);
}

/// Record a dead connection removal.
pub fn record_connection_reaped() {
    counter!("alert_server_connections_reaped_total").increment(1);
}

/// Record an ignored inbound frame.
pub fn record_inbound_ignored(reason: IgnoredReason) {
    counter!(
        "alert_server_inbound_ignored_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the open connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_connections(count: usize) {
    gauge!("alert_server_connections").set(count as f64);
}

/// Update the registered condition count.
#[allow(clippy::cast_precision_loss)]
pub fn set_conditions(count: usize) {
    gauge!("alert_server_conditions").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
