//! Mock price history.

use axum::Json;
use axum::extract::Path;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;

const HISTORY_DAYS: i64 = 30;

/// One day of price history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    /// Day, ISO-8601.
    pub date: String,
    /// Price in `[100, 200)`.
    pub price: f64,
    /// Volume in `[0, 1_000_000)`.
    pub volume: u64,
}

pub(super) async fn stock_handler(Path(ticker): Path<String>) -> Json<Vec<HistoryPoint>> {
    tracing::debug!(ticker = %ticker, "Serving mock price history");
    Json(mock_history(Utc::now()))
}

/// Daily points ending at `now`, newest first.
fn mock_history(now: DateTime<Utc>) -> Vec<HistoryPoint> {
    let mut rng = rand::rng();
    (0..HISTORY_DAYS)
        .map(|day| HistoryPoint {
            date: (now - Duration::days(day)).to_rfc3339_opts(SecondsFormat::Millis, true),
            price: rng.random_range(100.0..200.0),
            volume: rng.random_range(0..1_000_000),
        })
        .collect()
}
