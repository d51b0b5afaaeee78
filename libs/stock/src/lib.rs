mod command;
mod error;
mod format;
mod lookup;
mod preference;
mod price_client;
mod quote;
mod scheduler;
mod subscription_store;
mod symbol;
mod transport;

pub mod backend;

#[cfg(test)]
mod testing;

/// Chat platform user identifier.
pub type UserId = u64;

pub use command::{CheckTarget, Command, CommandError, CommandHandler};
pub use error::{LookupError, StoreError, TransportError};
pub use format::Formatter;
pub use lookup::{LookupResults, PriceLookup, QuoteProvider, RetryPolicy};
pub use preference::{
    DEFAULT_INTERVAL_HOURS, MAX_FREQUENCY_HOURS, MIN_FREQUENCY_HOURS, UserPreference,
};
pub use price_client::AlpacaProvider;
pub use quote::{Quote, RawQuote};
pub use scheduler::{NotificationScheduler, TickReport};
pub use subscription_store::SubscriptionStore;
pub use symbol::{DEFAULT_TICKERS, normalize_symbol, split_symbols};
pub use transport::MessageSender;
