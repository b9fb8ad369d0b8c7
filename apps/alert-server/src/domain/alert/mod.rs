//! Alert Condition Types
//!
//! Domain types for price alerts: the condition a client registers, the
//! price sample the monitor observes, and the event pushed back when a
//! condition fires.
//!
//! # Firing Rule
//!
//! A condition fires when the sampled price is strictly beyond its
//! threshold in the configured direction. A price equal to the threshold
//! never fires.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Ticker
// =============================================================================

/// Longest accepted ticker symbol.
pub const MAX_TICKER_LEN: usize = 16;

/// Normalized ticker symbol.
///
/// Trimmed, uppercased, non-empty, and limited to the characters exchange
/// symbols use (`A-Z`, `0-9`, `.`, `-`, `^`, `=`), so it is always safe as a
/// single URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Parse and normalize a ticker.
    ///
    /// # Errors
    ///
    /// Returns `ConditionError::EmptyTicker` if nothing is left after
    /// trimming, or `ConditionError::InvalidTicker` if the symbol is too long
    /// or contains other characters.
    pub fn parse(raw: &str) -> Result<Self, ConditionError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ConditionError::EmptyTicker);
        }
        let symbol_char =
            |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=');
        if normalized.len() > MAX_TICKER_LEN || !normalized.chars().all(symbol_char) {
            return Err(ConditionError::InvalidTicker(normalized));
        }
        Ok(Self(normalized))
    }

    /// Get the ticker text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Which side of the threshold triggers an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fires when price rises strictly above the threshold.
    Above,
    /// Fires when price falls strictly below the threshold.
    Below,
}

impl Direction {
    /// Check whether `price` satisfies this direction against `threshold`.
    #[must_use]
    pub fn fires(self, price: f64, threshold: f64) -> bool {
        match self {
            Self::Above => price > threshold,
            Self::Below => price < threshold,
        }
    }

    /// Get the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

// =============================================================================
// Alert Condition
// =============================================================================

/// A (ticker, threshold, direction) triple a client wants monitored.
///
/// Immutable once built. Equality and hashing are structural over all three
/// fields, which is what subscription de-duplication and removal key on.
#[derive(Debug, Clone)]
pub struct AlertCondition {
    ticker: Ticker,
    threshold: f64,
    direction: Direction,
}

impl AlertCondition {
    /// Create a new condition.
    ///
    /// `-0.0` is normalized to `0.0`.
    ///
    /// # Errors
    ///
    /// Returns `ConditionError::NonFiniteThreshold` for NaN or infinite
    /// thresholds.
    pub fn new(ticker: Ticker, threshold: f64, direction: Direction) -> Result<Self, ConditionError> {
        if !threshold.is_finite() {
            return Err(ConditionError::NonFiniteThreshold(threshold));
        }
        let threshold = if threshold == 0.0 { 0.0 } else { threshold };
        Ok(Self {
            ticker,
            threshold,
            direction,
        })
    }

    /// Parse a condition from raw wire values.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker is blank or the threshold is not finite.
    pub fn parse(ticker: &str, threshold: f64, direction: Direction) -> Result<Self, ConditionError> {
        Self::new(Ticker::parse(ticker)?, threshold, direction)
    }

    /// Get the ticker.
    #[must_use]
    pub const fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Get the threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Get the direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Check whether this condition fires against `sample`.
    ///
    /// A sample for a different ticker never fires.
    #[must_use]
    pub fn fires(&self, sample: &PriceSample) -> bool {
        self.ticker == sample.ticker && self.direction.fires(sample.price, self.threshold)
    }

    /// Build the notification for a sample this condition fired on.
    #[must_use]
    pub fn to_event(&self, sample: &PriceSample) -> NotificationEvent {
        NotificationEvent {
            ticker: self.ticker.clone(),
            price: sample.price,
            threshold: self.threshold,
            direction: self.direction,
            observed_at: sample.observed_at,
        }
    }
}

impl PartialEq for AlertCondition {
    fn eq(&self, other: &Self) -> bool {
        self.ticker == other.ticker
            && self.direction == other.direction
            && self.threshold.to_bits() == other.threshold.to_bits()
    }
}

// Thresholds are finite with -0.0 folded into 0.0, so bitwise equality is
// numeric equality.
impl Eq for AlertCondition {}

impl Hash for AlertCondition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ticker.hash(state);
        self.threshold.to_bits().hash(state);
        self.direction.hash(state);
    }
}

impl PartialOrd for AlertCondition {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AlertCondition {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ticker
            .cmp(&other.ticker)
            .then(self.direction.cmp(&other.direction))
            .then(self.threshold.total_cmp(&other.threshold))
    }
}

/// Condition construction error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    /// Ticker is blank after trimming.
    #[error("ticker cannot be empty")]
    EmptyTicker,
    /// Ticker is too long or has characters outside a symbol's alphabet.
    #[error("invalid ticker symbol: {0:?}")]
    InvalidTicker(String),
    /// Threshold is NaN or infinite.
    #[error("threshold must be finite, got {0}")]
    NonFiniteThreshold(f64),
}

// =============================================================================
// Price Sample
// =============================================================================

/// Where a sampled price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceOrigin {
    /// Fetched from the upstream provider this tick.
    Live,
    /// Last live price seen, reused because the upstream failed.
    Stale,
    /// Derived from the ticker text; no live price has ever been seen.
    Synthetic,
}

impl PriceOrigin {
    /// Check if this sample is a fallback rather than a live price.
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        !matches!(self, Self::Live)
    }
}

/// One price observation for a ticker, produced fresh each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    /// Sampled ticker.
    pub ticker: Ticker,
    /// Observed price.
    pub price: f64,
    /// Observation time.
    pub observed_at: DateTime<Utc>,
    /// Provenance of the price.
    pub origin: PriceOrigin,
}

impl PriceSample {
    /// Create a live sample observed now.
    #[must_use]
    pub fn live(ticker: Ticker, price: f64) -> Self {
        Self {
            ticker,
            price,
            observed_at: Utc::now(),
            origin: PriceOrigin::Live,
        }
    }
}

// =============================================================================
// Notification Event
// =============================================================================

/// A fired alert, delivered once per (connection, condition, tick).
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    /// Ticker that crossed.
    pub ticker: Ticker,
    /// Price that triggered the alert.
    pub price: f64,
    /// Condition threshold.
    pub threshold: f64,
    /// Condition direction.
    pub direction: Direction,
    /// When the triggering price was observed.
    pub observed_at: DateTime<Utc>,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Return the conditions that fire against `sample`.
///
/// Pure; conditions for other tickers are skipped.
pub fn evaluate<'a, I>(sample: &PriceSample, conditions: I) -> Vec<&'a AlertCondition>
where
    I: IntoIterator<Item = &'a AlertCondition>,
{
    conditions
        .into_iter()
        .filter(|condition| condition.fires(sample))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
