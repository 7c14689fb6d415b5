//! Terminal web API client
//!
//! Serves both network ports of the sync engine:
//! - `GET  api/v1/candles?s=&i=&l=` closed candles, oldest first, live bar excluded
//! - `GET  api/v1/candle?s=&i=` the forming candle
//! - `POST api/v1/predict/trend?m=..` signal series for a candle list
//!
//! Paths are resolved below the configured base URL, so the API may be served
//! under a prefix (`http://host/terminal`).
//!
//! Candle payloads are handed back as raw JSON; decoding belongs to the engine.

use super::response::{ApiEnvelope, parse_envelope};
use crate::config::ApiEnvConfig;
use crate::domain::market::codec::WireCandle;
use crate::domain::market::granularity::Granularity;
use crate::domain::ports::{MarketDataClient, PredictionClient};
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct TerminalApiClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl TerminalApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            client: HttpClientFactory::create_client(timeout, max_retries),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &ApiEnvConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, endpoint: &str) -> Result<Option<T>> {
        debug!("TerminalApiClient: GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", endpoint))?;
        Self::read_envelope(response, endpoint).await
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<Option<T>> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", endpoint))?;

        if !status.is_success() {
            // Error bodies usually still carry the envelope; prefer its message
            let detail = serde_json::from_str::<ApiEnvelope>(&body)
                .ok()
                .map(|envelope| envelope.error)
                .filter(|error| !error.is_empty())
                .unwrap_or(body);
            anyhow::bail!("{} failed with status {}: {}", endpoint, status, detail);
        }
        parse_envelope(&body, endpoint)
    }
}

#[async_trait]
impl MarketDataClient for TerminalApiClient {
    async fn fetch_history(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Value> {
        let count = count.to_string();
        let url = build_url_with_query(
            &self.base_url,
            "api/v1/candles",
            &[
                ("s", symbol),
                ("i", granularity.api_code()),
                ("l", count.as_str()),
            ],
        )?;
        let result: Option<Value> = self.get(url, "candles").await?;
        Ok(result.unwrap_or(Value::Null))
    }

    async fn fetch_live_candle(&self, symbol: &str, granularity: Granularity) -> Result<Value> {
        let url = build_url_with_query(
            &self.base_url,
            "api/v1/candle",
            &[("s", symbol), ("i", granularity.api_code())],
        )?;
        let result: Option<Value> = self.get(url, "candle").await?;
        Ok(result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PredictionClient for TerminalApiClient {
    async fn fetch_signals(
        &self,
        candles: &[WireCandle],
        markers: &[String],
    ) -> Result<HashMap<String, Vec<f64>>> {
        let models = markers.join(",");
        let url = build_url_with_query(&self.base_url, "api/v1/predict/trend", &[("m", models)])?;
        let body = serde_json::to_vec(candles).context("Failed to serialize candle list")?;

        debug!(
            "TerminalApiClient: POST {} ({} candles)",
            url,
            candles.len()
        );
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to reach predict/trend")?;

        let result: Option<HashMap<String, Vec<f64>>> =
            Self::read_envelope(response, "predict/trend").await?;
        Ok(result.unwrap_or_default())
    }
}
