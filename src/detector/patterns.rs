//! Literal signal tables for the extraction-mode detector.
//!
//! Tables are plain data; [`PatternSet`] compiles them once so the scoring
//! code never holds a regex literal of its own.

use regex::Regex;

use crate::error::{ProbeError, ProbeResult};

/// Front-end framework tokens matched as substrings of text or markup
pub const JS_FRAMEWORKS: &[&str] = &[
    "react", "vue", "angular", "svelte", "next.js", "gatsby", "nuxt", "ember",
];

/// Markup-only framework hints worth an extra +2 each (any token in a group)
pub const FRAMEWORK_MARKUP_HINTS: &[&[&str]] = &[
    &["react", "reactdom"],
    &["vue", "v-bind", "v-model"],
];

/// Single-page-app boot markers, matched against markup
pub const SPA_INDICATORS: &[&str] = &[
    r#"<div\s+id=["']root["']"#,
    r#"<div\s+id=["']app["']"#,
    r"__next_data__",
    r"__nuxt__",
    r"window\.__initial_state__",
];

/// Markup shorter than this that carries a root container counts as an SPA shell
pub const SPA_SHELL_MAX_LEN: usize = 1000;
pub const SPA_SHELL_MARKER: &str = "<div id=";

/// Price-calculation keywords (+1 each)
pub const DYNAMIC_PRICE_KEYWORDS: &[&str] = &[
    r"data-price",
    r"price-calculator",
    r"dynamic-price",
    r"price-update",
    r"calculatetotal",
    r"updateprice",
];

/// Pricing API endpoint paths (+2 each)
pub const PRICING_API_ENDPOINTS: &[&str] = &[r"/api/price", r"/calculate", r"/quote", r"graphql"];

/// Commerce platforms and configurator vendors
pub const KNOWN_PLATFORMS: &[&str] = &[
    "shopify",
    "woocommerce",
    "magento",
    "threekit",
    "zakeke",
    "customcat",
    "infinite-options",
    "product-builder",
];

/// `![Walnut (+$50)](img.png)`: image caption annotated with a price delta
pub const IMAGE_OPTION: &str = r"!\[(?:Image \d+:?\s*)?([^\]]+?)\s*\(\+?\$[\d,]+\)\]\([^\)]+\)";

/// `- [x] Heated seats (+$300)`: selected/unselected list item with a price delta
pub const CHECKBOX_OPTION: &str = r"(?m)^-\s*\[x?\]\s*(.+?)\s*\(\+?\$[\d,]+\)";

/// `Frame Color:` (or `frame color:` once normalized) on its own line
pub const CATEGORY_HEADING: &str = r"(?m)^([a-z][^:\n]*?):[ \t]*\*?[ \t\r]*$";

/// Any of these anywhere in the text means a price is shown
pub const PRICE_ELEMENT: &[&str] = &[
    r"\$[\d,]+(?:\.\d{2})?",
    r"(?i)price:?\s*\$",
    r"(?i)total:?\s*\$",
    r"(?i)from\s+\$[\d,]+",
];

/// Compiled form of the tables above
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub frameworks: Vec<String>,
    pub framework_markup_hints: Vec<Vec<String>>,
    pub spa_indicators: Vec<Regex>,
    pub dynamic_price_keywords: Vec<Regex>,
    pub pricing_api_endpoints: Vec<Regex>,
    pub known_platforms: Vec<String>,
    pub image_option: Regex,
    pub checkbox_option: Regex,
    pub category_heading: Regex,
    pub price_element: Vec<Regex>,
}

impl PatternSet {
    /// Compile the built-in tables
    pub fn compile() -> ProbeResult<Self> {
        Ok(Self {
            frameworks: owned(JS_FRAMEWORKS),
            framework_markup_hints: FRAMEWORK_MARKUP_HINTS.iter().map(|group| owned(group)).collect(),
            spa_indicators: compile_all(SPA_INDICATORS, true)?,
            dynamic_price_keywords: compile_all(DYNAMIC_PRICE_KEYWORDS, true)?,
            pricing_api_endpoints: compile_all(PRICING_API_ENDPOINTS, true)?,
            known_platforms: owned(KNOWN_PLATFORMS),
            image_option: compile(IMAGE_OPTION, false)?,
            checkbox_option: compile(CHECKBOX_OPTION, false)?,
            category_heading: compile(CATEGORY_HEADING, true)?,
            price_element: compile_all(PRICE_ELEMENT, false)?,
        })
    }
}

fn owned(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

fn compile(pattern: &str, case_insensitive: bool) -> ProbeResult<Regex> {
    let source = if case_insensitive {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };

    Regex::new(&source).map_err(|e| ProbeError::config(format!("Invalid pattern '{}': {}", pattern, e)))
}

fn compile_all(patterns: &[&str], case_insensitive: bool) -> ProbeResult<Vec<Regex>> {
    patterns.iter().map(|p| compile(p, case_insensitive)).collect()
}
