use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::{StreamExt, stream};
use tracing::{debug, instrument, warn};
use tracing_futures::Instrument;

use crate::error::LookupError;
use crate::quote::{Quote, RawQuote};
use crate::symbol::normalize_symbol;

const CONCURRENCY: usize = 8;

/// Source of latest price and prior close for a ticker.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<RawQuote, LookupError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub delay: Duration,
    /// Upper bound on a single provider call.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

pub type LookupResults = HashMap<String, Result<Quote, LookupError>>;

#[derive(Clone)]
pub struct PriceLookup {
    provider: Arc<dyn QuoteProvider>,
    policy: RetryPolicy,
}

impl PriceLookup {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetch and normalize one quote, retrying provider outages.
    #[instrument(name = "fetch_quote", skip(self), fields(provider = self.provider.name()))]
    pub async fn fetch(&self, symbol: &str) -> Result<Quote, LookupError> {
        let symbol = normalize_symbol(symbol)
            .ok_or_else(|| LookupError::InvalidSymbol(symbol.trim().to_uppercase()))?;

        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::time::timeout(self.policy.timeout, self.provider.get_quote(&symbol))
                .await
                .unwrap_or_else(|_| Err(LookupError::unavailable(&symbol, "request timed out")));

            match result {
                Ok(raw) => {
                    debug!(attempt, price = raw.price, prior_close = raw.prior_close, "quote fetched");
                    return Quote::from_raw(&symbol, raw, Utc::now())
                        .ok_or(LookupError::InvalidSymbol(symbol));
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(attempt, error = %e, "quote fetch failed, retrying");
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "quote fetch failed");
                    return Err(e);
                }
            }
        }
    }

    /// Fetch every distinct symbol once, with bounded concurrency.
    pub async fn fetch_many<I, S>(&self, symbols: I) -> LookupResults
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let distinct: BTreeSet<String> = symbols.into_iter().map(Into::into).collect();

        stream::iter(distinct)
            .map(|symbol| {
                let span = tracing::info_span!("lookup_symbol", symbol = %symbol);
                async move {
                    let result = self.fetch(&symbol).await;
                    (symbol, result)
                }
                .instrument(span)
            })
            .buffer_unordered(CONCURRENCY)
            .collect()
            .await
    }
}
