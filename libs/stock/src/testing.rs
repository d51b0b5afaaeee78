//! Fakes for the external collaborators, shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::UserId;
use crate::error::{LookupError, TransportError};
use crate::lookup::QuoteProvider;
use crate::quote::RawQuote;
use crate::transport::MessageSender;

#[derive(Default)]
pub struct FakeProvider {
    quotes: HashMap<String, RawQuote>,
    outages: HashSet<String>,
    failures_left: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, symbol: &str, price: f64, prior_close: f64) -> Self {
        self.quotes
            .insert(symbol.to_string(), RawQuote { price, prior_close });
        self
    }

    pub fn with_outage(mut self, symbol: &str) -> Self {
        self.outages.insert(symbol.to_string());
        self
    }

    pub fn with_failures_before_success(self, symbol: &str, failures: u32) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(symbol.to_string(), failures);
        self
    }

    pub fn calls(&self, symbol: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl QuoteProvider for FakeProvider {
    async fn get_quote(&self, symbol: &str) -> Result<RawQuote, LookupError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default() += 1;

        if self.outages.contains(symbol) {
            return Err(LookupError::unavailable(symbol, "connection refused"));
        }

        if let Some(left) = self.failures_left.lock().unwrap().get_mut(symbol)
            && *left > 0
        {
            *left -= 1;
            return Err(LookupError::unavailable(symbol, "503 Service Unavailable"));
        }

        self.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| LookupError::InvalidSymbol(symbol.to_string()))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
pub struct RecordingSender {
    failing: HashSet<UserId>,
    sent: Mutex<Vec<(UserId, String)>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, user_id: UserId) -> Self {
        self.failing.insert(user_id);
        self
    }

    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: UserId) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == user_id)
            .map(|(_, text)| text.clone())
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), TransportError> {
        if self.failing.contains(&user_id) {
            return Err(TransportError::new(user_id, "recipient blocks direct messages"));
        }
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }
}
