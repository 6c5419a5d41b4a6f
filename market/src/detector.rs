//! Infers a market code from a raw symbol string.
//
//  This module is deliberately pure: no async, no IO, no shared mutable
//  state. Identical input always yields identical output.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::UNKNOWN_MARKET;

/// Confidence assigned per rule kind: an exact suffix is definitive, a
/// numeric code pattern is strong, a broad regex is only a guess.
const SUFFIX_CONFIDENCE: f64 = 1.0;
const NUMERIC_CONFIDENCE: f64 = 0.8;
const PATTERN_CONFIDENCE: f64 = 0.5;

static US_TICKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z.]{0,5}$").expect("hard-coded regex"));

#[derive(Debug, Clone)]
enum RuleMatcher {
    /// Exact exchange suffix, e.g. ".HK".
    Suffix(&'static str),
    /// All-digit symbol whose length falls in the given inclusive range.
    NumericLen { min: usize, max: usize },
    /// Broad fallback pattern.
    Pattern(&'static Lazy<Regex>),
}

#[derive(Debug, Clone)]
struct DetectRule {
    market: &'static str,
    matcher: RuleMatcher,
    confidence: f64,
}

impl DetectRule {
    fn matches(&self, symbol: &str) -> bool {
        match &self.matcher {
            RuleMatcher::Suffix(suffix) => symbol.ends_with(suffix),
            RuleMatcher::NumericLen { min, max } => {
                symbol.len() >= *min
                    && symbol.len() <= *max
                    && symbol.chars().all(|c| c.is_ascii_digit())
            }
            RuleMatcher::Pattern(re) => re.is_match(symbol),
        }
    }
}

/// Ordered rule table mapping symbols to market codes. First match wins.
///
/// This is the single holder of detection rules in the system; call sites
/// must not keep their own pattern tables.
pub struct MarketDetector {
    rules: Vec<DetectRule>,
}

impl Default for MarketDetector {
    fn default() -> Self {
        Self {
            rules: vec![
                rule("HK", RuleMatcher::Suffix(".HK"), SUFFIX_CONFIDENCE),
                rule("CN", RuleMatcher::Suffix(".SS"), SUFFIX_CONFIDENCE),
                rule("CN", RuleMatcher::Suffix(".SZ"), SUFFIX_CONFIDENCE),
                rule("JP", RuleMatcher::Suffix(".T"), SUFFIX_CONFIDENCE),
                rule("UK", RuleMatcher::Suffix(".L"), SUFFIX_CONFIDENCE),
                // Bare numeric codes: 6 digits is a mainland-China code,
                // shorter ones are Hong Kong board lots.
                rule(
                    "CN",
                    RuleMatcher::NumericLen { min: 6, max: 6 },
                    NUMERIC_CONFIDENCE,
                ),
                rule(
                    "HK",
                    RuleMatcher::NumericLen { min: 1, max: 5 },
                    NUMERIC_CONFIDENCE,
                ),
                rule("US", RuleMatcher::Pattern(&US_TICKER_RE), PATTERN_CONFIDENCE),
            ],
        }
    }
}

impl MarketDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect the market for one symbol.
    ///
    /// Never errors: an unmatched symbol resolves to `UNKNOWN` with
    /// confidence 0.0 and the caller decides what that means.
    pub fn detect(&self, symbol: &str) -> (String, f64) {
        let normalized = symbol.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return (UNKNOWN_MARKET.to_string(), 0.0);
        }

        for r in &self.rules {
            if r.matches(&normalized) {
                return (r.market.to_string(), r.confidence);
            }
        }

        (UNKNOWN_MARKET.to_string(), 0.0)
    }

    /// Batch form of `detect`, keyed by the raw input symbol.
    ///
    /// Defined to equal element-wise `detect`; batching exists only so a
    /// large symbol list makes one call, never to change results.
    pub fn detect_batch(&self, symbols: &[String]) -> HashMap<String, String> {
        symbols
            .iter()
            .map(|s| (s.clone(), self.detect(s).0))
            .collect()
    }
}


fn rule(market: &'static str, matcher: RuleMatcher, confidence: f64) -> DetectRule {
    DetectRule {
        market,
        matcher,
        confidence,
    }
}
