//! Simulated price source.
//!
//! Each ticker starts at its synthetic base price and then takes a bounded
//! random step on every fetch. Useful when running without network access.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::application::services::synthetic_price;
use crate::domain::alert::Ticker;

/// Largest relative move per fetch.
const MAX_STEP: f64 = 0.02;

/// Prices never walk below this floor.
const PRICE_FLOOR: f64 = 0.01;

/// Tickers tracked before an existing walk is dropped to make room.
const MAX_TRACKED: usize = 4096;

/// Random-walk price source.
#[derive(Debug)]
pub struct SimulatedPriceSource {
    prices: Mutex<HashMap<Ticker, f64>>,
    capacity: usize,
}

impl Default for SimulatedPriceSource {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED)
    }
}

impl SimulatedPriceSource {
    /// Create a new simulated source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that tracks at most `capacity` tickers.
    ///
    /// A dropped ticker restarts from its base price on the next fetch.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn step(&self, ticker: &Ticker) -> f64 {
        let drift = rand::rng().random_range(-MAX_STEP..=MAX_STEP);
        let mut prices = self.prices.lock();
        if prices.len() >= self.capacity && !prices.contains_key(ticker) {
            let evicted = prices.keys().next().cloned();
            if let Some(evicted) = evicted {
                prices.remove(&evicted);
            }
        }
        let price = prices
            .entry(ticker.clone())
            .or_insert_with(|| synthetic_price(ticker));
        *price = (*price * (1.0 + drift)).max(PRICE_FLOOR);
        *price
    }
}

#[async_trait]
impl PriceSource for SimulatedPriceSource {
    async fn fetch_price(&self, ticker: &Ticker) -> Result<f64, PriceSourceError> {
        Ok(self.step(ticker))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
