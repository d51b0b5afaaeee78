use chrono::{DateTime, Utc};

/// Price pair as reported by a market-data provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawQuote {
    pub price: f64,
    pub prior_close: f64,
}

/// Normalized price snapshot for one ticker. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub prior_close: f64,
    pub change: f64,
    pub percent_change: f64,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Returns `None` when the provider data cannot produce a percent change.
    pub fn from_raw(symbol: &str, raw: RawQuote, fetched_at: DateTime<Utc>) -> Option<Self> {
        if !raw.price.is_finite() || !raw.prior_close.is_finite() || raw.prior_close <= 0.0 {
            return None;
        }

        let change = raw.price - raw.prior_close;

        Some(Self {
            symbol: symbol.to_string(),
            price: raw.price,
            prior_close: raw.prior_close,
            change,
            percent_change: change / raw.prior_close * 100.0,
            fetched_at,
        })
    }

    pub fn is_up(&self) -> bool {
        self.change >= 0.0
    }
}
