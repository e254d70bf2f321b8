//! Lexicon-based sentiment scoring tuned for trading forums.

use std::collections::HashMap;

use regex::Regex;

use crate::errors::{Error, Result};

/// Normalizes a raw valence sum into (-1, 1).
const NORMALIZATION_ALPHA: f64 = 15.0;
/// A negator flips and damps the next sentiment word.
const NEGATION_SCALAR: f64 = -0.74;
/// How many tokens back a negator still applies.
const NEGATION_WINDOW: usize = 3;

const LEXICON: &[(&str, f64)] = &[
    // bullish
    ("bullish", 2.5), ("moon", 3.0), ("mooning", 3.0), ("squeeze", 2.5), ("breakout", 2.0),
    ("rally", 2.0), ("pump", 2.0), ("tendies", 2.5), ("lambo", 2.5), ("gains", 2.0),
    ("gain", 1.5), ("profit", 1.5), ("profits", 1.5), ("green", 1.5), ("calls", 1.5),
    ("rocket", 2.5), ("🚀", 2.5), ("undervalued", 2.0), ("oversold", 1.5), ("beat", 1.5),
    ("strong", 1.5), ("growth", 1.5), ("upgrade", 2.0), ("buy", 1.0), ("great", 2.0),
    ("good", 1.5), ("love", 2.0), ("amazing", 2.5), ("win", 2.0), ("winning", 2.0),
    ("hodl", 0.5), ("dd", 0.5),
    // bearish
    ("bearish", -2.5), ("crash", -3.0), ("crashing", -3.0), ("dump", -3.0),
    ("dumping", -3.0), ("tank", -2.5), ("tanking", -2.5), ("drill", -2.5),
    ("drilling", -2.5), ("puts", -1.5), ("short", -1.5), ("red", -1.5), ("loss", -2.0),
    ("losses", -2.0), ("bagholder", -2.5), ("bagholding", -2.5), ("overvalued", -2.0),
    ("overbought", -1.5), ("📉", -2.0), ("bleeding", -2.5), ("bloodbath", -3.0),
    ("miss", -1.5), ("missed", -1.5), ("weak", -1.5), ("downgrade", -2.0), ("sell", -1.0),
    ("bad", -2.0), ("terrible", -2.5), ("fraud", -3.0), ("bankrupt", -3.0),
    ("bankruptcy", -3.0), ("scam", -3.0), ("theta", -0.5), ("fd", -0.5),
];

const PHRASES: &[(&str, f64)] = &[
    ("to the moon", 3.0),
    ("diamond hands", 2.5),
    ("rug pull", -3.0),
    ("paper hands", -2.0),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "neither", "nor", "hardly", "barely", "isn't", "isnt", "aren't",
    "wasn't", "don't", "dont", "doesn't", "won't", "can't", "cant",
];

const BOT_OR_META: &[&str] = &[
    r"(?i)\*\*User Report\*\*",
    r"(?i)I am a bot",
    r"(?i)This is an automated",
    r"(?i)beep boop",
    r"(?i)^(Daily|Weekend) Discussion",
    r"(?i)^What Are Your Moves",
    r"(?i)^Rate My Portfolio",
];

pub struct SentimentAnalyzer {
    words: HashMap<&'static str, f64>,
    negators: Vec<&'static str>,
    filters: Vec<Regex>,
}

impl SentimentAnalyzer {
    pub fn new() -> Result<Self> {
        let filters = BOT_OR_META
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::Config(format!("filter pattern: {}", e))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            words: LEXICON.iter().copied().collect(),
            negators: NEGATORS.to_vec(),
            filters,
        })
    }

    /// Automated or pinned housekeeping posts carry no opinion.
    pub fn is_noise(&self, text: &str) -> bool {
        self.filters.iter().any(|re| re.is_match(text.trim_start()))
    }

    /// Compound score in (-1, 1).
    pub fn score(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let mut total: f64 = PHRASES
            .iter()
            .map(|(phrase, v)| lower.matches(phrase).count() as f64 * v)
            .sum();

        let tokens: Vec<&str> = lower
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ';' | ':' | '(' | ')' | '"'))
            .filter(|t| !t.is_empty())
            .collect();

        for (i, token) in tokens.iter().enumerate() {
            let Some(&valence) = self.words.get(token.trim_start_matches('$')) else {
                continue;
            };
            let start = i.saturating_sub(NEGATION_WINDOW);
            let negated = tokens[start..i]
                .iter()
                .any(|t| self.negators.iter().any(|n| n == t) || t.ends_with("n't"));
            total += if negated { valence * NEGATION_SCALAR } else { valence };
        }

        if total == 0.0 {
            0.0
        } else {
            total / (total * total + NORMALIZATION_ALPHA).sqrt()
        }
    }
}
