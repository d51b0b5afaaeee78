use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::UserId;
use crate::error::{LookupError, StoreError};
use crate::format::Formatter;
use crate::lookup::PriceLookup;
use crate::preference::{MAX_FREQUENCY_HOURS, MIN_FREQUENCY_HOURS};
use crate::subscription_store::SubscriptionStore;
use crate::symbol::{normalize_symbol, split_symbols};

const CHECK_COOLDOWN: Duration = Duration::from_secs(3);

const HELP_TEXT: &str = "\
/subscribe SYMBOL - Subscribe to a stock (e.g., /subscribe AAPL)
/unsubscribe SYMBOL - Unsubscribe from a stock
/check SYMBOL|all - Check current stock price
/list - List all your subscribed stocks
/frequency HOURS - Set notification frequency (1-24)
/updatestocks SYMBOL1 SYMBOL2 ... - Update the default stock list
/help - Show this help message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckTarget {
    All,
    Symbol(String),
}

/// A parsed inbound command. Symbols are already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Subscribe(String),
    Unsubscribe(String),
    Check(CheckTarget),
    List,
    Frequency(u32),
    UpdateStocks(Vec<String>),
}

/// Display text is the reply sent back to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Unknown command /{0}. Send /help to see what I can do.")]
    Unknown(String),
}

fn invalid(msg: impl Into<String>) -> CommandError {
    CommandError::InvalidInput(msg.into())
}

impl Command {
    /// Parse a full text line such as `/subscribe aapl`.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let mut parts = text.split_whitespace();
        let head = parts
            .next()
            .ok_or_else(|| invalid("Please send a command. Send /help to see what I can do."))?;

        // "/check@SomeBot" addresses a specific bot in group chats
        let name = head.strip_prefix('/').unwrap_or(head);
        let name = name.split('@').next().unwrap_or(name);

        Self::from_args(name, parts)
    }

    /// Build a command from its name and raw arguments. Arguments may
    /// themselves contain comma or space separated symbols.
    pub fn from_args<I, S>(name: &str, args: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args
            .into_iter()
            .flat_map(|a| split_symbols(a.as_ref()))
            .collect();

        match name.to_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "help" => Ok(Command::Help),
            "list" => Ok(Command::List),
            "subscribe" => one_symbol(&args, "/subscribe AAPL").map(Command::Subscribe),
            "unsubscribe" => one_symbol(&args, "/unsubscribe AAPL").map(Command::Unsubscribe),
            "check" => match args.first() {
                None => Ok(Command::Check(CheckTarget::All)),
                Some(a) if a.eq_ignore_ascii_case("all") => Ok(Command::Check(CheckTarget::All)),
                Some(_) => {
                    one_symbol(&args, "/check AAPL").map(|s| Command::Check(CheckTarget::Symbol(s)))
                }
            },
            "frequency" => parse_hours(args.first()).map(Command::Frequency),
            "updatestocks" => parse_symbol_list(&args).map(Command::UpdateStocks),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn one_symbol(args: &[String], example: &str) -> Result<String, CommandError> {
    let raw = match args {
        [] => return Err(invalid(format!("Please provide a stock symbol. Example: {example}"))),
        [raw] => raw,
        _ => {
            return Err(invalid(format!(
                "Please provide one stock symbol at a time. Example: {example}"
            )));
        }
    };

    normalize_symbol(raw).ok_or_else(|| {
        invalid(format!(
            "\"{raw}\" is not a valid stock symbol. Example: {example}"
        ))
    })
}

fn parse_hours(arg: Option<&String>) -> Result<u32, CommandError> {
    let raw = arg.ok_or_else(|| invalid("Please provide frequency in hours. Example: /frequency 2"))?;

    let hours: f64 = raw
        .parse()
        .ok()
        .filter(|h: &f64| h.is_finite())
        .ok_or_else(|| invalid("Please provide a valid number of hours."))?;

    if hours.fract() != 0.0 {
        return Err(invalid("Frequency must be a whole number of hours."));
    }
    if hours < f64::from(MIN_FREQUENCY_HOURS) || hours > f64::from(MAX_FREQUENCY_HOURS) {
        return Err(invalid(format!(
            "Frequency must be between {MIN_FREQUENCY_HOURS} and {MAX_FREQUENCY_HOURS} hours."
        )));
    }

    Ok(hours as u32)
}

fn parse_symbol_list(args: &[String]) -> Result<Vec<String>, CommandError> {
    if args.is_empty() {
        return Err(invalid(
            "Please provide at least one stock symbol. Example: /updatestocks AAPL MSFT GOOGL",
        ));
    }

    let mut symbols: Vec<String> = Vec::with_capacity(args.len());
    let mut malformed: Vec<&str> = Vec::new();

    for raw in args {
        match normalize_symbol(raw) {
            Some(s) if !symbols.contains(&s) => symbols.push(s),
            Some(_) => {}
            None => malformed.push(raw),
        }
    }

    if !malformed.is_empty() {
        return Err(invalid(format!(
            "The following symbols are invalid: {}\nPlease provide valid stock symbols.",
            malformed.join(", ")
        )));
    }

    Ok(symbols)
}

fn hours_label(hours: u32) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}

/// Turns commands into store and lookup calls plus a reply string.
/// Every failure becomes a reply; nothing here returns an error.
pub struct CommandHandler {
    store: Arc<SubscriptionStore>,
    lookup: Arc<PriceLookup>,
    formatter: Formatter,
    check_cooldown: Duration,
    last_check: Mutex<HashMap<UserId, Instant>>,
}

impl CommandHandler {
    pub fn new(store: Arc<SubscriptionStore>, lookup: Arc<PriceLookup>) -> Self {
        Self {
            store,
            lookup,
            formatter: Formatter::default(),
            check_cooldown: CHECK_COOLDOWN,
            last_check: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_check_cooldown(mut self, cooldown: Duration) -> Self {
        self.check_cooldown = cooldown;
        self
    }

    pub async fn handle(&self, user_id: UserId, text: &str) -> String {
        match Command::parse(text) {
            Ok(cmd) => self.execute(user_id, cmd).await,
            Err(e) => {
                debug!(user_id, text, error = %e, "rejected command");
                e.to_string()
            }
        }
    }

    pub async fn handle_args<I, S>(&self, user_id: UserId, name: &str, args: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match Command::from_args(name, args) {
            Ok(cmd) => self.execute(user_id, cmd).await,
            Err(e) => {
                debug!(user_id, name, error = %e, "rejected command");
                e.to_string()
            }
        }
    }

    #[instrument(name = "command", skip(self))]
    pub async fn execute(&self, user_id: UserId, cmd: Command) -> String {
        let result = match cmd {
            Command::Start => self.start(user_id).await,
            Command::Help => Ok(format!("Here's what I can do:\n\n{HELP_TEXT}")),
            Command::Subscribe(symbol) => self.subscribe(user_id, symbol).await,
            Command::Unsubscribe(symbol) => self.unsubscribe(user_id, symbol).await,
            Command::Check(target) => self.check(user_id, target).await,
            Command::List => self.list(user_id).await,
            Command::Frequency(hours) => self.frequency(user_id, hours).await,
            Command::UpdateStocks(symbols) => self.update_stocks(user_id, symbols).await,
        };

        result.unwrap_or_else(|e| {
            error!(user_id, error = %e, "command failed");
            "Something went wrong while saving your settings. Please try again later.".to_string()
        })
    }

    async fn start(&self, user_id: UserId) -> Result<String, StoreError> {
        let pref = self.store.get_or_create(user_id).await?;
        info!(user_id, "start");

        Ok(format!(
            "👋 Welcome to the Stock Price Notification Bot!\n\n\
             I'll keep you posted on the stocks you follow. Here are my commands:\n\n\
             {HELP_TEXT}\n\n\
             You're subscribed to {} stocks and receive updates every {}.",
            pref.tickers.len(),
            hours_label(pref.interval_hours)
        ))
    }

    async fn subscribe(&self, user_id: UserId, symbol: String) -> Result<String, StoreError> {
        let pref = self.store.get_or_create(user_id).await?;
        if pref.tickers.contains(&symbol) {
            return Ok(format!("You're already subscribed to {symbol}"));
        }

        match self.lookup.fetch(&symbol).await {
            Ok(_) => {}
            Err(LookupError::InvalidSymbol(_)) => {
                return Ok(format!("Invalid stock symbol: {symbol}"));
            }
            Err(e @ LookupError::ProviderUnavailable { .. }) => {
                warn!(user_id, error = %e, "could not validate symbol");
                return Ok(format!(
                    "Could not verify {symbol} right now. Please try again later."
                ));
            }
        }

        if self.store.add_ticker(user_id, &symbol).await? {
            info!(user_id, symbol = %symbol, "subscribed");
            Ok(format!("Successfully subscribed to {symbol}"))
        } else {
            Ok(format!("You're already subscribed to {symbol}"))
        }
    }

    async fn unsubscribe(&self, user_id: UserId, symbol: String) -> Result<String, StoreError> {
        if self.store.remove_ticker(user_id, &symbol).await? {
            info!(user_id, symbol = %symbol, "unsubscribed");
            Ok(format!("Successfully unsubscribed from {symbol}"))
        } else {
            Ok(format!("You're not subscribed to {symbol}"))
        }
    }

    async fn check(&self, user_id: UserId, target: CheckTarget) -> Result<String, StoreError> {
        if self.throttled(user_id) {
            return Ok("Please wait a moment before using another command.".to_string());
        }

        let symbol = match target {
            CheckTarget::Symbol(symbol) => symbol,
            CheckTarget::All => return self.check_all(user_id).await,
        };

        Ok(match self.lookup.fetch(&symbol).await {
            Ok(quote) => self.formatter.quote(&quote),
            Err(LookupError::InvalidSymbol(_)) => format!("Symbol not found: {symbol}"),
            Err(LookupError::ProviderUnavailable { .. }) => {
                format!("Could not fetch data for {symbol}. Please try again later.")
            }
        })
    }

    async fn check_all(&self, user_id: UserId) -> Result<String, StoreError> {
        let pref = self.store.get_or_create(user_id).await?;
        if pref.tickers.is_empty() {
            return Ok("You're not subscribed to any stocks.".to_string());
        }

        let results = self.lookup.fetch_many(pref.tickers.iter().cloned()).await;
        if results.values().all(Result::is_err) {
            return Ok("Could not fetch data for your stocks. Please try again later.".to_string());
        }

        Ok(self.formatter.digest(
            "Current Stock Prices",
            &pref.tickers,
            &results,
            chrono::Utc::now(),
        ))
    }

    async fn list(&self, user_id: UserId) -> Result<String, StoreError> {
        let pref = self.store.get_or_create(user_id).await?;
        if pref.tickers.is_empty() {
            return Ok("You're not subscribed to any stocks.".to_string());
        }

        let mut msg = String::from("Your subscribed stocks:\n\n");
        for symbol in &pref.tickers {
            msg.push_str(&format!("• {symbol}\n"));
        }
        msg.push_str(&format!(
            "\nUpdates every {}.",
            hours_label(pref.interval_hours)
        ));

        Ok(msg)
    }

    async fn frequency(&self, user_id: UserId, hours: u32) -> Result<String, StoreError> {
        self.store.set_interval(user_id, hours).await?;
        info!(user_id, hours, "frequency changed");

        Ok(format!(
            "Notification frequency set to {}.",
            hours_label(hours)
        ))
    }

    async fn update_stocks(
        &self,
        user_id: UserId,
        symbols: Vec<String>,
    ) -> Result<String, StoreError> {
        let results = self.lookup.fetch_many(symbols.iter().cloned()).await;

        let mut unknown: Vec<&str> = Vec::new();
        let mut unverified: Vec<&str> = Vec::new();
        for symbol in &symbols {
            match results.get(symbol) {
                Some(Ok(_)) => {}
                Some(Err(LookupError::ProviderUnavailable { .. })) => unverified.push(symbol),
                Some(Err(LookupError::InvalidSymbol(_))) | None => unknown.push(symbol),
            }
        }

        if !unknown.is_empty() {
            return Ok(format!(
                "The following symbols are invalid: {}\nPlease provide valid stock symbols.",
                unknown.join(", ")
            ));
        }
        if !unverified.is_empty() {
            return Ok(format!(
                "Could not verify {} right now. Please try again later.",
                unverified.join(", ")
            ));
        }

        self.store.get_or_create(user_id).await?;
        self.store.set_default_tickers(&symbols).await?;
        let users = self.store.add_tickers_to_all(&symbols).await?;
        info!(user_id, tickers = %symbols.join(","), users, "default stocks updated");

        Ok(format!(
            "Default stocks list updated successfully.\nNew default stocks: {}",
            symbols.join(", ")
        ))
    }

    /// True when the user ran /check within the cooldown window.
    fn throttled(&self, user_id: UserId) -> bool {
        if self.check_cooldown.is_zero() {
            return false;
        }

        let now = Instant::now();
        let mut last = self
            .last_check
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(prev) = last.get(&user_id)
            && now.duration_since(*prev) < self.check_cooldown
        {
            return true;
        }

        last.retain(|_, at| now.duration_since(*at) < self.check_cooldown);
        last.insert(user_id, now);
        false
    }
}
