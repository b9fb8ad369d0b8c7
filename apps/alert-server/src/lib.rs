#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Stock Alert Server - Real-Time Price Alert Engine
//!
//! Browsers open a WebSocket, register price conditions
//! ("notify me when AAPL goes above 150"), and receive a push each time a
//! periodic price sample satisfies one of their conditions.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Alert types and subscription tracking
//!   - `alert`: Tickers, conditions, samples, the firing rule
//!   - `subscription`: Sharded per-connection registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `PriceSource` interface
//!   - `services`: Resilient sampling, dispatch, the monitor loop
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `price`: Yahoo Finance and simulated price sources
//!   - `websocket`: Alert channel sessions and wire codec
//!   - `http`: Public router and dashboard REST endpoints
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!  Browser ──subscribe──► AlertHub ──► SubscriptionRegistry
//!                                            │ snapshot
//!  PriceSource ◄──fetch── AlertMonitor ◄─────┘   (every period)
//!                              │ fired conditions
//!                              ▼
//!  Browser ◄──alert── session writer ◄── NotificationDispatcher
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Alert types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::alert::{
    AlertCondition, ConditionError, Direction, NotificationEvent, PriceOrigin, PriceSample, Ticker,
};
pub use domain::subscription::{ConnectionId, RegistrySnapshot, SubscriptionRegistry};

// Application
pub use application::ports::{PriceSource, PriceSourceError};
pub use application::services::{
    AlertMonitor, Delivery, MonitorConfig, MonitorState, NotificationDispatcher,
    ResilientPriceSource, TickReport,
};

// Infrastructure config
pub use infrastructure::config::{AlertServerConfig, ConfigError, PriceSourceKind};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::http::{AppState, DashboardClient, HttpServer, HttpServerError};
pub use infrastructure::websocket::AlertHub;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
