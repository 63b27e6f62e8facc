//! Price-field harvesting from response bodies.
//!
//! JSON bodies are folded with an explicit work stack so depth and array
//! width are bounded by [`TreeLimits`] instead of the call stack.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::CaptureConfig;
use crate::pricing::PriceParser;

/// Key fragments naming a price-like field
pub const PRICE_KEY_TOKENS: &[&str] = &["price", "total", "cost", "amount"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    pub max_depth: usize,
    /// Only the first N elements of each array are visited
    pub max_sequence_items: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for TreeLimits {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_sequence_items: config.max_sequence_items,
        }
    }
}

/// Prices pulled from one body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "prices")]
pub enum HarvestedPrices {
    /// Path such as `cart.items.[0].unit_cost` to value
    #[serde(rename = "json")]
    Fields(BTreeMap<String, f64>),
    /// Body was not JSON; currency amounts found in the raw text
    #[serde(rename = "text")]
    Text(Vec<f64>),
}

impl HarvestedPrices {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fields(fields) => fields.is_empty(),
            Self::Text(amounts) => amounts.is_empty(),
        }
    }

    /// `(path, value)` pairs; text amounts are labelled by position
    pub fn points(&self) -> Vec<(String, f64)> {
        match self {
            Self::Fields(fields) => fields.iter().map(|(path, value)| (path.clone(), *value)).collect(),
            Self::Text(amounts) => amounts
                .iter()
                .enumerate()
                .map(|(i, value)| (format!("text[{}]", i), *value))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceHarvester {
    parser: PriceParser,
    limits: TreeLimits,
}

impl PriceHarvester {
    pub fn new(parser: PriceParser, limits: TreeLimits) -> Self {
        Self { parser, limits }
    }

    pub fn harvest_body(&self, body: &str) -> HarvestedPrices {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => HarvestedPrices::Fields(self.harvest_value(&value)),
            Err(e) => {
                debug!("Body is not JSON ({}), scanning text", e);
                HarvestedPrices::Text(self.parser.currency_amounts(body))
            }
        }
    }

    /// Flat path → value map of every price-named field within the limits
    pub fn harvest_value(&self, root: &Value) -> BTreeMap<String, f64> {
        let mut fields = BTreeMap::new();
        let mut stack: Vec<(String, &Value, usize)> = vec![(String::new(), root, 0)];

        while let Some((prefix, node, depth)) = stack.pop() {
            if depth > self.limits.max_depth {
                debug!("Harvest depth limit reached at '{}'", prefix);
                continue;
            }

            match node {
                Value::Object(map) => {
                    for (key, child) in map {
                        let path = format!("{}{}", prefix, key);

                        if is_price_key(key) {
                            if let Some(value) = self.field_value(child) {
                                fields.insert(path.clone(), value);
                            }
                        }

                        if child.is_object() || child.is_array() {
                            stack.push((format!("{}.", path), child, depth + 1));
                        }
                    }
                }
                Value::Array(items) => {
                    if items.len() > self.limits.max_sequence_items {
                        debug!(
                            "Visiting {}/{} elements under '{}'",
                            self.limits.max_sequence_items,
                            items.len(),
                            prefix
                        );
                    }
                    for (i, item) in items.iter().take(self.limits.max_sequence_items).enumerate() {
                        stack.push((format!("{}[{}].", prefix, i), item, depth + 1));
                    }
                }
                Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
            }
        }

        fields
    }

    fn field_value(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            Value::String(s) => self.parser.parse_field_string(s),
            _ => None,
        }
    }
}

fn is_price_key(key: &str) -> bool {
    let key = key.to_lowercase();
    PRICE_KEY_TOKENS.iter().any(|token| key.contains(token))
}
