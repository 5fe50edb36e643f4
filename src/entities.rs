//! Entity resolution: free text → canonical ticker symbols
//!
//! Two recognition paths run and are merged in first-mention order:
//! uppercase symbol-pattern tokens and case-insensitive company-name
//! dictionary lookups. Common words are excluded even when they look like
//! tickers; unknown ticker-shaped tokens are passed through as candidates
//! for the data provider to validate.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

lazy_static! {
    /// Uppercase alphanumeric token, letter-first, up to 20 chars
    static ref SYMBOL_PATTERN: Regex =
        Regex::new(r"\b[A-Z][A-Z0-9]{0,19}\b").expect("symbol pattern is valid");

    /// Common company names → canonical ticker symbols
    static ref NAME_DICTIONARY: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("apple", "AAPL");
        m.insert("microsoft", "MSFT");
        m.insert("google", "GOOGL");
        m.insert("alphabet", "GOOGL");
        m.insert("amazon", "AMZN");
        m.insert("tesla", "TSLA");
        m.insert("meta", "META");
        m.insert("facebook", "META");
        m.insert("netflix", "NFLX");
        m.insert("nvidia", "NVDA");
        m.insert("amd", "AMD");
        m.insert("intel", "INTC");
        m.insert("ibm", "IBM");
        m.insert("oracle", "ORCL");
        m.insert("salesforce", "CRM");
        m.insert("adobe", "ADBE");
        m.insert("paypal", "PYPL");
        m.insert("visa", "V");
        m.insert("mastercard", "MA");
        m.insert("jpmorgan", "JPM");
        m.insert("goldman", "GS");
        m.insert("morgan stanley", "MS");
        m.insert("bank of america", "BAC");
        m.insert("wells fargo", "WFC");
        m.insert("coca cola", "KO");
        m.insert("pepsi", "PEP");
        m.insert("walmart", "WMT");
        m.insert("target", "TGT");
        m.insert("home depot", "HD");
        m.insert("disney", "DIS");
        m.insert("boeing", "BA");
        m.insert("caterpillar", "CAT");
        m.insert("general electric", "GE");
        m.insert("ford", "F");
        m.insert("general motors", "GM");
        m
    };
}

/// Uppercase tokens never treated as tickers, even though they match the
/// symbol pattern. The exact boundary is an implementation choice.
const STOP_WORDS: &[&str] = &[
    "AN", "AND", "ARE", "AS", "AT", "BE", "BUY", "BY", "CAN", "DO", "FOR", "GET", "GO", "HOW",
    "IF", "IN", "IS", "IT", "ME", "MY", "NO", "NOT", "NOW", "OF", "OK", "ON", "OR", "PLEASE",
    "SELL", "SHOW", "SO", "TELL", "THE", "TO", "UP", "US", "VS", "WE", "WHAT", "WHY", "WITH",
    "YOU",
];

/// Tickers recognized beyond the name dictionary
const EXTRA_SYMBOLS: &[&str] = &[
    "ABNB", "AVGO", "COST", "CSCO", "CVX", "JNJ", "NKE", "PFE", "PLTR", "QCOM", "SBUX", "SHOP",
    "SMCI", "TXN", "UBER", "UNH", "XOM",
];

/// Maps free text to canonical company identifiers
pub struct EntityResolver {
    known_symbols: HashSet<String>,
}

impl EntityResolver {
    pub fn new() -> Self {
        let known_symbols = NAME_DICTIONARY
            .values()
            .chain(EXTRA_SYMBOLS.iter())
            .map(|s| (*s).to_string())
            .collect();

        Self { known_symbols }
    }

    /// Resolver over a caller-supplied symbol universe
    pub fn with_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Extract canonical entities, duplicates removed, first-mention order.
    /// Zero matches yields an empty sequence, never an error.
    pub fn resolve(&self, text: &str) -> Vec<String> {
        let mut candidates: Vec<(usize, String)> = Vec::new();

        for m in SYMBOL_PATTERN.find_iter(text) {
            let token = m.as_str();
            if token.len() == 1 {
                // Single letters (F, V, ...) only when curated
                if !self.known_symbols.contains(token) {
                    continue;
                }
            } else if STOP_WORDS.contains(&token) {
                continue;
            }
            candidates.push((m.start(), token.to_string()));
        }

        let lower = text.to_lowercase();
        for (name, ticker) in NAME_DICTIONARY.iter() {
            if let Some(pos) = lower.find(name) {
                candidates.push((pos, (*ticker).to_string()));
            }
        }

        candidates.sort_by_key(|(pos, _)| *pos);

        let mut entities = Vec::new();
        for (_, ticker) in candidates {
            if !entities.contains(&ticker) {
                entities.push(ticker);
            }
        }

        entities
    }

    pub fn known_symbols(&self) -> impl Iterator<Item = &str> {
        self.known_symbols.iter().map(String::as_str)
    }
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new()
    }
}
