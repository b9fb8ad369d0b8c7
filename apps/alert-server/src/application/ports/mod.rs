//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceSource`: Interface for fetching the current price of a ticker

mod price_source;

#[cfg(test)]
pub use price_source::MockPriceSource;
pub use price_source::{PriceSource, PriceSourceError};
