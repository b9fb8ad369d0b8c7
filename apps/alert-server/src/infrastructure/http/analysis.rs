//! Model-generated market analysis.

use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::{DashboardClient, error_response};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    format: &'static str,
    stream: bool,
}

pub(super) async fn analysis_handler(
    State(dashboard): State<Arc<DashboardClient>>,
    Path(ticker): Path<String>,
) -> Response {
    match dashboard.generate_analysis(&ticker).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::warn!(ticker = %ticker, error = %e, "Analysis generation failed");
            error_response("Failed to generate analysis")
        }
    }
}

impl DashboardClient {
    /// Ask the model server for a JSON analysis of `ticker`.
    ///
    /// The model server's response body is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the model server is unreachable, answers with a
    /// failure status, or returns a non-JSON body.
    pub async fn generate_analysis(&self, ticker: &str) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}/api/generate", self.ollama_url);
        let request = GenerateRequest {
            model: &self.ollama_model,
            prompt: analysis_prompt(ticker),
            format: "json",
            stream: false,
        };

        self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("decoding model response")
    }
}

fn analysis_prompt(ticker: &str) -> String {
    format!(
        r#"Analyze the current market situation for {ticker} stock.
Provide a JSON response with the following structure:
{{
  "sentiment": "positive" | "negative" | "neutral",
  "summary": "brief market analysis",
  "keyPoints": ["point1", "point2", "point3"],
  "recommendation": "buy/sell/hold recommendation"
}}"#
    )
}
