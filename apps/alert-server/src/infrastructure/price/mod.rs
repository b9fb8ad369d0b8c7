//! Price Source Adapters
//!
//! Implementations of the `PriceSource` port.
//!
//! - `YahooPriceSource`: Yahoo Finance chart API over HTTPS
//! - `SimulatedPriceSource`: In-process random walk

mod simulated;
mod yahoo;

use std::sync::Arc;
use std::time::Duration;

pub use simulated::SimulatedPriceSource;
pub use yahoo::YahooPriceSource;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::infrastructure::config::{PriceSourceKind, UpstreamSettings};

/// Build the configured price source.
///
/// # Errors
///
/// Returns an error if the upstream URL is invalid or the HTTP client
/// cannot be created.
pub fn from_settings(
    settings: &UpstreamSettings,
    fetch_timeout: Duration,
) -> Result<Arc<dyn PriceSource>, PriceSourceError> {
    Ok(match settings.price_source {
        PriceSourceKind::Yahoo => Arc::new(YahooPriceSource::new(
            &settings.price_source_url,
            fetch_timeout,
        )?),
        PriceSourceKind::Simulated => Arc::new(SimulatedPriceSource::new()),
    })
}
