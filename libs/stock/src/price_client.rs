use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue},
};
use serde::Deserialize;
use tracing::debug;

use crate::error::LookupError;
use crate::lookup::QuoteProvider;
use crate::quote::RawQuote;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Alpaca market-data client.
#[derive(Clone)]
pub struct AlpacaProvider {
    client: Client,
    base_api: String,
}

impl AlpacaProvider {
    pub fn new(base_api: String, key_id: String, secret: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", HeaderValue::from_str(&key_id)?);
        headers.insert("APCA-API-SECRET-KEY", HeaderValue::from_str(&secret)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self { client, base_api })
    }

    pub fn from_env() -> Result<Self> {
        let base_api = std::env::var("APCA_API_BASE_URL")?;
        let key_id = std::env::var("APCA_API_KEY_ID")?;
        let secret = std::env::var("APCA_API_SECRET_KEY")?;
        Self::new(base_api, key_id, secret)
    }

    fn snapshot_url(&self, symbol: &str) -> String {
        format!(
            "{}/v2/stocks/{}/snapshot",
            self.base_api.trim_end_matches('/'),
            symbol
        )
    }
}

#[async_trait]
impl QuoteProvider for AlpacaProvider {
    async fn get_quote(&self, symbol: &str) -> Result<RawQuote, LookupError> {
        let res = self
            .client
            .get(self.snapshot_url(symbol))
            .query(&[("feed", "iex")])
            .send()
            .await
            .map_err(|e| LookupError::unavailable(symbol, e))?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::UNPROCESSABLE_ENTITY {
            debug!(symbol, %status, "provider rejected symbol");
            return Err(LookupError::InvalidSymbol(symbol.to_string()));
        }

        let snapshot: SnapshotResponse = res
            .error_for_status()
            .map_err(|e| LookupError::unavailable(symbol, e))?
            .json()
            .await
            .map_err(|e| LookupError::unavailable(symbol, e))?;

        snapshot
            .into_raw()
            .ok_or_else(|| LookupError::InvalidSymbol(symbol.to_string()))
    }

    fn name(&self) -> &str {
        "alpaca"
    }
}

//
// Match Alpaca API JSON
// https://docs.alpaca.markets/reference/stocksnapshotsingle
//
#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotResponse {
    #[serde(rename = "latestTrade")]
    pub latest_trade: Option<Trade>,

    #[serde(rename = "dailyBar")]
    pub daily_bar: Option<DailyBar>,

    #[serde(rename = "prevDailyBar")]
    pub prev_daily_bar: Option<DailyBar>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Trade {
    #[serde(rename = "p")]
    pub price: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DailyBar {
    #[serde(rename = "c")]
    pub close: f64,
}

impl SnapshotResponse {
    fn into_raw(self) -> Option<RawQuote> {
        let price = self
            .latest_trade
            .map(|t| t.price)
            .or(self.daily_bar.map(|b| b.close))?;
        let prior_close = self.prev_daily_bar?.close;

        Some(RawQuote { price, prior_close })
    }
}
