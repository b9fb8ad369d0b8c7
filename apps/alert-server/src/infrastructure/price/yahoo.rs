//! Yahoo Finance price adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::domain::alert::Ticker;

/// Yahoo Finance price source.
///
/// Implements `PriceSource` using the public chart endpoint's
/// `regularMarketPrice`.
#[derive(Debug, Clone)]
pub struct YahooPriceSource {
    client: reqwest::Client,
    base_url: Url,
}

impl YahooPriceSource {
    /// Create a new adapter against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PriceSourceError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| PriceSourceError::InvalidBaseUrl {
                url: base_url.to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stock-alert-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PriceSourceError::Network {
                message: e.to_string(),
            })?;

        Ok(Self { client, base_url })
    }

    fn chart_url(&self, ticker: &Ticker) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", ticker.as_str()]);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("interval", "1m")
            .append_pair("range", "1d");
        url
    }
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    async fn fetch_price(&self, ticker: &Ticker) -> Result<f64, PriceSourceError> {
        let response = self
            .client
            .get(self.chart_url(ticker))
            .send()
            .await
            .map_err(|e| PriceSourceError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceSourceError::Status {
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| PriceSourceError::Malformed {
                message: e.to_string(),
            })?;

        chart
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.meta.regular_market_price)
            .ok_or_else(|| PriceSourceError::NoPrice {
                ticker: ticker.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "yahoo"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}
