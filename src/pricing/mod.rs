//! Price parsing and the additive pricing model.

pub mod learner;
pub mod parser;
pub mod probe;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use learner::{ControlOutcome, LearningPass, Measurement, PriceLearner, UnmeasuredReason};
pub use parser::PriceParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    /// Base plus the sum of selected option deltas
    Computed,
}

/// Learned additive pricing model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingModel {
    pub base_price: Option<f64>,
    pub price_type: PriceType,
    /// Keyed by `group.label`
    pub option_deltas: BTreeMap<String, f64>,
    /// Never populated; option interactions are not modelled
    pub dependencies: Vec<String>,
    /// Fraction of probed controls that produced a delta
    pub confidence: f64,
}

impl PricingModel {
    pub fn empty() -> Self {
        Self {
            base_price: None,
            price_type: PriceType::Computed,
            option_deltas: BTreeMap::new(),
            dependencies: Vec::new(),
            confidence: 0.0,
        }
    }

    /// Price predicted for a set of selected option keys
    pub fn estimate<'a>(&self, selected: impl IntoIterator<Item = &'a str>) -> Option<f64> {
        let base = self.base_price?;
        Some(
            selected
                .into_iter()
                .filter_map(|key| self.option_deltas.get(key))
                .fold(base, |total, delta| total + delta),
        )
    }
}

impl Default for PricingModel {
    fn default() -> Self {
        Self::empty()
    }
}
