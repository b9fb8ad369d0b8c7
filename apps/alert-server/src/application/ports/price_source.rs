//! Price Source Port (Driven Port)
//!
//! Interface for fetching a best-effort current price for a ticker.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::alert::Ticker;

/// Price source error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriceSourceError {
    /// Transport-level failure.
    #[error("price source network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Upstream answered with a non-success status.
    #[error("price source returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Upstream payload could not be decoded.
    #[error("malformed price payload: {message}")]
    Malformed {
        /// Error details.
        message: String,
    },

    /// Upstream has no price for this ticker.
    #[error("no price available for {ticker}")]
    NoPrice {
        /// The ticker.
        ticker: String,
    },

    /// Configured upstream base URL is unusable.
    #[error("invalid price source URL: {url}")]
    InvalidBaseUrl {
        /// The configured URL.
        url: String,
    },

    /// Fetch did not complete in time.
    #[error("price fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Port for fetching current prices.
///
/// Implementations perform one independent fetch per call; callers may
/// run calls for different tickers concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the current price for `ticker`.
    async fn fetch_price(&self, ticker: &Ticker) -> Result<f64, PriceSourceError>;

    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;
}
