//! Price text parsing shared by the learner and the network harvester.

use regex::Regex;
use std::ops::RangeInclusive;

use crate::error::{ProbeError, ProbeResult};

pub const MIN_PLAUSIBLE_PRICE: f64 = 1.0;
pub const MAX_PLAUSIBLE_PRICE: f64 = 1_000_000.0;

/// Accepted price shapes, tried in priority order
const PRICE_PATTERNS: &[&str] = &[
    r"\$\s*([\d,]+\.?\d*)",
    r"(?i)total[:\s]+\$\s*([\d,]+\.?\d*)",
    r"(?i)price[:\s]+\$\s*([\d,]+\.?\d*)",
    // bare amounts only count with cents
    r"([\d,]+\.\d{2})",
];

const CURRENCY_AMOUNT: &str = r"\$\s*([\d,]+\.?\d*)";

/// Parses displayed prices and rejects implausible values
#[derive(Debug, Clone)]
pub struct PriceParser {
    patterns: Vec<Regex>,
    currency_amount: Regex,
    range: RangeInclusive<f64>,
}

impl PriceParser {
    pub fn new() -> ProbeResult<Self> {
        Self::with_range(MIN_PLAUSIBLE_PRICE, MAX_PLAUSIBLE_PRICE)
    }

    pub fn with_range(min: f64, max: f64) -> ProbeResult<Self> {
        if !(min <= max) {
            return Err(ProbeError::config(format!("Empty price range [{}, {}]", min, max)));
        }

        let compile = |p: &str| Regex::new(p).map_err(|e| ProbeError::config(format!("Invalid price pattern: {}", e)));

        Ok(Self {
            patterns: PRICE_PATTERNS.iter().map(|p| compile(p)).collect::<ProbeResult<_>>()?,
            currency_amount: compile(CURRENCY_AMOUNT)?,
            range: min..=max,
        })
    }

    pub fn is_plausible(&self, price: f64) -> bool {
        self.range.contains(&price)
    }

    /// First plausible price in `text`, trying each accepted shape in order
    pub fn parse(&self, text: &str) -> Option<f64> {
        if text.trim().is_empty() {
            return None;
        }

        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .filter_map(|m| parse_amount(m.as_str()))
                .find(|price| self.is_plausible(*price))
        })
    }

    /// Every plausible `$`-prefixed amount in `text`, in order of appearance
    pub fn currency_amounts(&self, text: &str) -> Vec<f64> {
        self.currency_amount
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| parse_amount(m.as_str()))
            .filter(|price| self.is_plausible(*price))
            .collect()
    }

    /// A field value like `"$1,299.00"` or `"€45"`; the whole string must be numeric once
    /// currency symbols and separators are removed
    pub fn parse_field_string(&self, value: &str) -> Option<f64> {
        let cleaned: String = value
            .chars()
            .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
            .collect();

        cleaned
            .parse::<f64>()
            .ok()
            .filter(|price| price.is_finite() && self.is_plausible(*price))
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}
