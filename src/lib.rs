//! PriceScout - extraction-mode detection and price-delta learning for product configurators
//!
//! This library provides:
//! - A heuristic detector deciding whether a page needs a live browser
//! - A passive network observer that harvests prices from pricing API responses
//! - A learner that toggles configurator controls and records per-option price deltas

pub mod browser;
pub mod capture;
pub mod config;
pub mod core;
pub mod detector;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod pricing;

// Re-export main types for convenience
pub use crate::config::AppConfig;
pub use crate::core::{ConfiguratorProbe, PageInput, ProbeReport, ProbeSession};
pub use crate::detector::{should_use_browser, DetectionResult, ExtractionMode, ExtractionModeDetector};
pub use crate::error::{ProbeError, ProbeResult};
pub use crate::pricing::{PriceLearner, PricingModel};
