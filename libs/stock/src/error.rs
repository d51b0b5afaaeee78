use thiserror::Error;

use crate::UserId;

/// Failure while turning a ticker into a [`Quote`](crate::Quote).
#[derive(Debug, Error)]
pub enum LookupError {
    /// The provider does not know the symbol or has no usable price for it.
    #[error("symbol not found: {0}")]
    InvalidSymbol(String),

    /// Network or provider failure that survived the retry budget.
    #[error("provider unavailable for {symbol}: {reason}")]
    ProviderUnavailable { symbol: String, reason: String },
}

impl LookupError {
    pub fn unavailable(symbol: &str, reason: impl ToString) -> Self {
        LookupError::ProviderUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Only provider outages are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LookupError::ProviderUnavailable { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user {0} has never interacted with the bot")]
    NotFound(UserId),

    #[error("notification interval must be between 1 and 24 hours, got {0}")]
    InvalidInterval(u32),

    #[error("malformed ticker symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("sending to user {user_id} failed: {reason}")]
pub struct TransportError {
    pub user_id: UserId,
    pub reason: String,
}

impl TransportError {
    pub fn new(user_id: UserId, reason: impl ToString) -> Self {
        Self {
            user_id,
            reason: reason.to_string(),
        }
    }
}
