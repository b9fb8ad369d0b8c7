//! Resilient Price Source
//!
//! Wraps an upstream `PriceSource` so a price lookup never fails. Each
//! fetch is bounded by a timeout; on any failure the last live price seen
//! for the ticker is reused (`Stale`), or a deterministic price derived from
//! the ticker text is produced (`Synthetic`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::domain::alert::{PriceOrigin, PriceSample, Ticker};
use crate::infrastructure::metrics;

/// Price source that always yields a usable sample.
pub struct ResilientPriceSource {
    upstream: Arc<dyn PriceSource>,
    fetch_timeout: Duration,
    last_live: RwLock<HashMap<Ticker, f64>>,
}

impl ResilientPriceSource {
    /// Wrap `upstream`, bounding each fetch by `fetch_timeout`.
    #[must_use]
    pub fn new(upstream: Arc<dyn PriceSource>, fetch_timeout: Duration) -> Self {
        Self {
            upstream,
            fetch_timeout,
            last_live: RwLock::new(HashMap::new()),
        }
    }

    /// Get a sample for `ticker`, degrading to a fallback on failure.
    pub async fn sample(&self, ticker: &Ticker) -> PriceSample {
        match self.fetch_live(ticker).await {
            Ok(price) => {
                self.last_live.write().insert(ticker.clone(), price);
                metrics::record_price_fetch(metrics::FetchOutcome::Live);
                PriceSample::live(ticker.clone(), price)
            }
            Err(e) => {
                tracing::warn!(
                    ticker = %ticker,
                    source = self.upstream.name(),
                    error = %e,
                    "Price fetch failed, using fallback"
                );
                metrics::record_price_fetch(metrics::FetchOutcome::Fallback);
                self.fallback(ticker)
            }
        }
    }

    /// Forget fallback history for tickers outside `active`.
    pub fn retain(&self, active: &[Ticker]) {
        let active: HashSet<&Ticker> = active.iter().collect();
        self.last_live.write().retain(|ticker, _| active.contains(ticker));
    }

    async fn fetch_live(&self, ticker: &Ticker) -> Result<f64, PriceSourceError> {
        let price = tokio::time::timeout(self.fetch_timeout, self.upstream.fetch_price(ticker))
            .await
            .map_err(|_| PriceSourceError::Timeout(self.fetch_timeout))??;

        if price.is_finite() {
            Ok(price)
        } else {
            Err(PriceSourceError::Malformed {
                message: format!("non-finite price {price}"),
            })
        }
    }

    fn fallback(&self, ticker: &Ticker) -> PriceSample {
        let (price, origin) = self.last_live.read().get(ticker).map_or_else(
            || (synthetic_price(ticker), PriceOrigin::Synthetic),
            |price| (*price, PriceOrigin::Stale),
        );

        PriceSample {
            ticker: ticker.clone(),
            price,
            observed_at: Utc::now(),
            origin,
        }
    }
}

/// Deterministic placeholder price in `[100, 200)` derived from the ticker.
#[must_use]
pub fn synthetic_price(ticker: &Ticker) -> f64 {
    // FNV-1a keeps the value stable across processes and platforms.
    let hash = ticker
        .as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    #[allow(clippy::cast_precision_loss)]
    let cents = (hash % 10_000) as f64;
    100.0 + cents / 100.0
}

// =============================================================================
// Tests
// =============================================================================
