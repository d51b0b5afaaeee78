/// Tickers a new user is subscribed to until the list is replaced.
pub const DEFAULT_TICKERS: &[&str] = &[
    "AAPL", "MSFT", "AMZN", "GOOGL", "TSLA", "META", "NVDA", "INTC",
];

const MAX_SYMBOL_LEN: usize = 10;

/// Trim and uppercase a raw ticker, rejecting anything that cannot be a symbol.
///
/// Accepts 1 to 10 characters starting with a letter, followed by letters,
/// digits, `.` or `-` (e.g. `BRK.B`, `RDS-A`).
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();

    let mut chars = symbol.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() || symbol.len() > MAX_SYMBOL_LEN {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        return None;
    }

    Some(symbol)
}

/// Split a comma or whitespace separated list, e.g. `"tsla, msft NVDA"`.
pub fn split_symbols(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_symbol("  aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("brk.b"), Some("BRK.B".to_string()));
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("   "), None);
        assert_eq!(normalize_symbol("1ABC"), None);
        assert_eq!(normalize_symbol("AA PL"), None);
        assert_eq!(normalize_symbol("$TSLA"), None);
        assert_eq!(normalize_symbol("ABCDEFGHIJK"), None);
    }

    #[test]
    fn splits_mixed_separators() {
        assert_eq!(split_symbols("tsla, msft  NVDA,"), vec!["tsla", "msft", "NVDA"]);
        assert!(split_symbols(" , ").is_empty());
    }
}
