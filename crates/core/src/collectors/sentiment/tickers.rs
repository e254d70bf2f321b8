//! Ticker mentions in free text.

use std::collections::{BTreeSet, HashSet};

use regex::Regex;

use crate::errors::{Error, Result};

/// Uppercase words that look like tickers but almost never are.
const DEFAULT_BLACKLIST: &[&str] = &[
    "I", "A", "THE", "AND", "OR", "BUT", "FOR", "TO", "AT", "BY", "UP", "DOWN", "IN", "OUT",
    "ON", "OFF", "ALL", "NEW", "OLD", "BUY", "SELL", "HOLD", "LONG", "SHORT", "PUT", "CALL",
    "DD", "ETF", "IPO", "CEO", "CFO", "COO", "USA", "USD", "GDP", "EPS", "PE", "PEG", "RSI",
    "MACD", "EMA", "SMA", "ATH", "LOL", "IMO", "TLDR", "YOLO", "FOMO", "FUD", "HODL", "WSB",
    "SEC", "FDA", "NYSE", "NASDAQ", "SP", "DOW", "QQQ", "SPY", "VOO", "VTI", "IT", "IS", "MY",
    "WE", "AM", "OK", "US", "EU", "AI", "EV", "PM", "EOD", "ITM", "OTM", "IV",
];

const CONTEXT_SUFFIXES: &[&str] = &["stock", "shares", "calls", "puts"];
const CONTEXT_PREFIXES: &[&str] = &["buying", "selling", "holding"];

/// Finds ticker mentions.
///
/// A candidate (1-5 capital letters, not blacklisted, longer than one letter)
/// counts when it is written as a cashtag (`$NVDA`), appears more than once,
/// or sits in a trading phrase such as "NVDA calls" or "buying NVDA".
pub struct TickerExtractor {
    candidate: Regex,
    blacklist: HashSet<String>,
}

impl TickerExtractor {
    pub fn new() -> Result<Self> {
        Self::with_blacklist(DEFAULT_BLACKLIST.iter().map(|s| s.to_string()))
    }

    pub fn with_blacklist(words: impl IntoIterator<Item = String>) -> Result<Self> {
        let candidate = Regex::new(r"\b[A-Z]{1,5}\b")
            .map_err(|e| Error::Config(format!("ticker pattern: {}", e)))?;
        Ok(Self {
            candidate,
            blacklist: words.into_iter().map(|w| w.to_ascii_uppercase()).collect(),
        })
    }

    /// Distinct tickers in `text`, sorted.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut found = BTreeSet::new();

        for m in self.candidate.find_iter(text) {
            let ticker = m.as_str();
            if ticker.len() < 2 || self.blacklist.contains(ticker) || found.contains(ticker) {
                continue;
            }

            let cashtag = m.start() > 0 && text[..m.start()].ends_with('$');
            let repeated = self
                .candidate
                .find_iter(text)
                .filter(|o| o.as_str() == ticker)
                .count()
                > 1;
            let t = ticker.to_lowercase();
            let in_phrase = CONTEXT_SUFFIXES
                .iter()
                .any(|s| lower.contains(&format!("{} {}", t, s)))
                || CONTEXT_PREFIXES
                    .iter()
                    .any(|p| lower.contains(&format!("{} {}", p, t)));

            if cashtag || repeated || in_phrase {
                found.insert(ticker.to_string());
            }
        }

        found.into_iter().collect()
    }
}
