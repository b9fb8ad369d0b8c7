//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ResilientPriceSource`: Never-failing price lookup with fallbacks
//! - `NotificationDispatcher`: Per-connection outbound alert queues
//! - `AlertMonitor`: Periodic sampling, evaluation, and dead-connection reaping

mod dispatcher;
mod monitor;
mod resilient_price;

pub use dispatcher::{DEFAULT_OUTBOUND_CAPACITY, Delivery, NotificationDispatcher, SharedDispatcher};
pub use monitor::{
    AlertMonitor, DEFAULT_FETCH_CONCURRENCY, DEFAULT_INTERVAL, MonitorConfig, MonitorState,
    TickReport,
};
pub use resilient_price::{ResilientPriceSource, synthetic_price};
