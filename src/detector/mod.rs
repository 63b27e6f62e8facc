//! Extraction-mode detection.
//!
//! Decides whether a configurator page can be read from its rendered markup
//! (static) or needs a live browser (dynamic). Six sub-detectors produce
//! capped scores which are combined with fixed weights; the result is a pure
//! function of `(url, text, markup)`.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::debug;

pub mod patterns;
pub mod static_options;

use crate::error::ProbeResult;
use patterns::{PatternSet, SPA_SHELL_MARKER, SPA_SHELL_MAX_LEN};
use static_options::{has_price_element, StaticOptionScan};

/// Raw sub-detector scores are capped at this value
pub const MAX_SIGNAL_SCORE: u8 = 5;

/// Confidence at or above which a page is routed to dynamic extraction
pub const DYNAMIC_THRESHOLD: f64 = 0.5;

pub const FRAMEWORK_WEIGHT: f64 = 0.25;
pub const SPA_WEIGHT: f64 = 0.20;
pub const DYNAMIC_PRICING_WEIGHT: f64 = 0.25;
pub const PRICE_WITHOUT_OPTIONS_WEIGHT: f64 = 0.50;
pub const KNOWN_PLATFORM_WEIGHT: f64 = 0.15;

const SPA_MIN_SCORE: u8 = 2;
const DYNAMIC_PRICING_MIN_SCORE: u8 = 2;

/// Extraction strategy for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Static,
    Dynamic,
}

/// Per-page signal measurements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSignals {
    pub framework_score: u8,
    pub spa_score: u8,
    pub dynamic_pricing_score: u8,
    pub static_options_found: bool,
    pub price_element_found: bool,
    pub known_platform: bool,
}

/// A signal that contributed to the confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTag {
    Framework(u8),
    SpaPattern,
    DynamicPricing(u8),
    PriceWithoutStaticOptions,
    KnownPlatform,
}

impl fmt::Display for SignalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framework(score) => write!(f, "js_framework({})", score),
            Self::SpaPattern => f.write_str("spa_detected"),
            Self::DynamicPricing(score) => write!(f, "dynamic_pricing({})", score),
            Self::PriceWithoutStaticOptions => f.write_str("price_without_static_options"),
            Self::KnownPlatform => f.write_str("known_platform"),
        }
    }
}

impl Serialize for SignalTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Routing decision for one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub is_dynamic: bool,
    pub confidence: f64,
    pub mode: ExtractionMode,
    pub signals: DetectionSignals,
    /// Fired signals in evaluation order
    pub reasons: Vec<SignalTag>,
}

impl DetectionResult {
    fn from_signals(signals: DetectionSignals) -> Self {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if signals.framework_score >= 1 {
            score += FRAMEWORK_WEIGHT;
            reasons.push(SignalTag::Framework(signals.framework_score));
        }

        if signals.spa_score >= SPA_MIN_SCORE {
            score += SPA_WEIGHT;
            reasons.push(SignalTag::SpaPattern);
        }

        if signals.dynamic_pricing_score >= DYNAMIC_PRICING_MIN_SCORE {
            score += DYNAMIC_PRICING_WEIGHT;
            reasons.push(SignalTag::DynamicPricing(signals.dynamic_pricing_score));
        }

        // A visible price with nothing statically selectable is the dominant signal
        if signals.price_element_found && !signals.static_options_found {
            score += PRICE_WITHOUT_OPTIONS_WEIGHT;
            reasons.push(SignalTag::PriceWithoutStaticOptions);
        }

        if signals.known_platform {
            score += KNOWN_PLATFORM_WEIGHT;
            reasons.push(SignalTag::KnownPlatform);
        }

        let confidence: f64 = f64::min(score, 1.0);
        let is_dynamic = confidence >= DYNAMIC_THRESHOLD;

        Self {
            is_dynamic,
            confidence,
            mode: if is_dynamic { ExtractionMode::Dynamic } else { ExtractionMode::Static },
            signals,
            reasons,
        }
    }
}

/// True when the page should be opened in a browser
pub fn should_use_browser(result: &DetectionResult) -> bool {
    result.is_dynamic && result.confidence >= DYNAMIC_THRESHOLD
}

/// Extraction-mode detector
#[derive(Debug, Clone)]
pub struct ExtractionModeDetector {
    patterns: PatternSet,
}

impl ExtractionModeDetector {
    /// Create a detector over the built-in signal tables
    pub fn new() -> ProbeResult<Self> {
        Ok(Self::with_patterns(PatternSet::compile()?))
    }

    /// Create a detector over a replacement set of tables
    pub fn with_patterns(patterns: PatternSet) -> Self {
        Self { patterns }
    }

    /// Classify a page. Never fails; no signal at all yields static mode with zero confidence.
    pub fn detect(&self, url: &str, text: &str, markup: Option<&str>) -> DetectionResult {
        let text_lower = text.to_lowercase();
        let markup_lower = markup.map(str::to_lowercase).unwrap_or_default();

        let scan = StaticOptionScan::scan(text, &self.patterns);

        let signals = DetectionSignals {
            framework_score: self.framework_score(&text_lower, &markup_lower),
            spa_score: self.spa_score(&markup_lower),
            dynamic_pricing_score: self.dynamic_pricing_score(&text_lower, &markup_lower),
            static_options_found: scan.options_found(),
            price_element_found: has_price_element(text, &self.patterns),
            known_platform: self.is_known_platform(url, &text_lower),
        };

        debug!(
            url,
            framework = signals.framework_score,
            spa = signals.spa_score,
            dynamic_pricing = signals.dynamic_pricing_score,
            static_options = scan.total_options(),
            price_element = signals.price_element_found,
            known_platform = signals.known_platform,
            "Detection signals"
        );

        DetectionResult::from_signals(signals)
    }

    fn framework_score(&self, text: &str, markup: &str) -> u8 {
        let mut score = self
            .patterns
            .frameworks
            .iter()
            .filter(|token| text.contains(token.as_str()) || markup.contains(token.as_str()))
            .count();

        for group in &self.patterns.framework_markup_hints {
            if group.iter().any(|hint| markup.contains(hint.as_str())) {
                score += 2;
            }
        }

        cap(score)
    }

    fn spa_score(&self, markup: &str) -> u8 {
        let mut score = 2 * self
            .patterns
            .spa_indicators
            .iter()
            .filter(|re| re.is_match(markup))
            .count();

        if !markup.is_empty() && markup.len() < SPA_SHELL_MAX_LEN && markup.contains(SPA_SHELL_MARKER) {
            score += 1;
        }

        cap(score)
    }

    fn dynamic_pricing_score(&self, text: &str, markup: &str) -> u8 {
        let matches = |re: &regex::Regex| re.is_match(text) || re.is_match(markup);

        let keywords = self.patterns.dynamic_price_keywords.iter().filter(|re| matches(re)).count();
        let endpoints = self.patterns.pricing_api_endpoints.iter().filter(|re| matches(re)).count();

        cap(keywords + 2 * endpoints)
    }

    fn is_known_platform(&self, url: &str, text: &str) -> bool {
        let url_lower = url.to_lowercase();
        self.patterns
            .known_platforms
            .iter()
            .any(|platform| url_lower.contains(platform.as_str()) || text.contains(platform.as_str()))
    }
}

fn cap(score: usize) -> u8 {
    score.min(MAX_SIGNAL_SCORE as usize) as u8
}
