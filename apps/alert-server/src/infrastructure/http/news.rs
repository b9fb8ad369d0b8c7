//! News headlines scraped from the quote page.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use uuid::Uuid;

use super::{DashboardClient, error_response};
use crate::domain::alert::Ticker;

const NEWS_SOURCE: &str = "Yahoo Finance";

/// One scraped headline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    /// Random identifier.
    pub id: String,
    /// Headline.
    pub title: String,
    /// Teaser text.
    pub summary: String,
    /// Publisher label.
    pub source: String,
    /// Link to the ticker's news page.
    pub url: String,
    /// Scrape time, ISO-8601.
    pub published_at: String,
}

pub(super) async fn news_handler(
    State(dashboard): State<Arc<DashboardClient>>,
    Path(ticker): Path<String>,
) -> Response {
    match dashboard.fetch_news(&ticker).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => {
            tracing::warn!(ticker = %ticker, error = %e, "News fetch failed");
            error_response("Failed to fetch news")
        }
    }
}

impl DashboardClient {
    /// Fetch and scrape headlines for `ticker`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ticker` is not a valid symbol or the page cannot
    /// be fetched.
    pub async fn fetch_news(&self, ticker: &str) -> anyhow::Result<Vec<NewsItem>> {
        let ticker = Ticker::parse(ticker)?;
        let url = self.news_url(&["quote", ticker.as_str()])?;
        let html = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .text()
            .await
            .context("reading news page")?;

        let link = self.news_url(&["news", ticker.as_str()])?;
        parse_news(&html, link.as_str(), Utc::now())
    }

    fn news_url(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.news_base_url)
            .with_context(|| format!("news base URL {:?}", self.news_base_url))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("news base URL {:?} cannot take a path", self.news_base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Extract headlines that have both a title and a summary.
fn parse_news(html: &str, link: &str, now: DateTime<Utc>) -> anyhow::Result<Vec<NewsItem>> {
    let item_sel = selector("div#quoteNewsStream li")?;
    let title_sel = selector("h3")?;
    let summary_sel = selector("p")?;
    let published_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);

    let document = Html::parse_document(html);
    Ok(document
        .select(&item_sel)
        .filter_map(|item| {
            let title = text_of(item, &title_sel);
            let summary = text_of(item, &summary_sel);
            (!title.is_empty() && !summary.is_empty()).then(|| NewsItem {
                id: Uuid::new_v4().to_string(),
                title,
                summary,
                source: NEWS_SOURCE.to_string(),
                url: link.to_string(),
                published_at: published_at.clone(),
            })
        })
        .collect())
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e:?}"))
}

fn text_of(element: ElementRef<'_>, selector: &Selector) -> String {
    element
        .select(selector)
        .flat_map(|node| node.text())
        .collect::<String>()
        .trim()
        .to_string()
}
