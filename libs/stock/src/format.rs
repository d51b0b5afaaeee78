use std::fmt::Write;

use chrono::{DateTime, Utc};
use chrono_tz::{America::New_York, Tz};

use crate::lookup::LookupResults;
use crate::quote::Quote;

/// Renders quotes as plain chat text, stamping times in one display zone.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    tz: Tz,
}

impl Default for Formatter {
    fn default() -> Self {
        Self { tz: New_York }
    }
}

impl Formatter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn quote(&self, q: &Quote) -> String {
        let (emoji, sign) = if q.is_up() { ("📈", "+") } else { ("📉", "") };

        format!(
            "{emoji} {}\nPrice: USD {:.2}\nChange: {sign}{:.2} ({sign}{:.2}%)\n",
            q.symbol, q.price, q.change, q.percent_change
        )
    }

    pub fn unavailable(&self, symbol: &str) -> String {
        format!("⚠️ {symbol}: unavailable\n")
    }

    /// One block per symbol, in the order given. Symbols missing from
    /// `results` or whose lookup failed are shown as unavailable.
    pub fn digest<'a, I>(&self, title: &str, symbols: I, results: &LookupResults, now: DateTime<Utc>) -> String
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut out = format!(
            "📊 {title} ({})\n\n",
            now.with_timezone(&self.tz).format("%Y-%m-%d %H:%M %Z")
        );

        for symbol in symbols {
            let block = match results.get(symbol) {
                Some(Ok(q)) => self.quote(q),
                _ => self.unavailable(symbol),
            };
            let _ = writeln!(out, "{block}");
        }

        out
    }
}
