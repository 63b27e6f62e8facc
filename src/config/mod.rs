use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub use crate::logging::LoggingConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub learner: LearnerConfig,
    pub capture: CaptureConfig,
    pub browser: BrowserConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
}

/// Price-delta learner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Upper bound on controls probed per pass
    pub max_controls: usize,
    /// Wait after every simulated UI action
    pub settle_ms: u64,
    /// Per driver call; `None` disables the guard
    pub step_timeout_ms: Option<u64>,
    pub min_plausible_price: f64,
    pub max_plausible_price: f64,
    /// Structural selectors tried in order before the full-text fallback
    pub price_selectors: Vec<String>,
}

/// Network capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Read and harvest pricing bodies; exchanges are recorded either way
    pub harvest_prices: bool,
    /// Elements visited per JSON array while harvesting
    pub max_sequence_items: usize,
    pub max_depth: usize,
}

/// Browser session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub navigation_timeout_ms: u64,
    /// Wait after navigation for client-side scripts to attach
    pub initial_settle_ms: u64,
    pub user_agent: String,
}

/// Page fetcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            max_controls: 15,
            settle_ms: 1000,
            step_timeout_ms: Some(10_000),
            min_plausible_price: 1.0,
            max_plausible_price: 1_000_000.0,
            price_selectors: [
                "[class*=\"price\"]",
                "[id*=\"price\"]",
                "[class*=\"total\"]",
                "[id*=\"total\"]",
                "[data-price]",
                ".product-price",
                "#product-price",
                ".price-value",
                ".total-price",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl LearnerConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            harvest_prices: true,
            max_sequence_items: 5,
            max_depth: 32,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_ms: 30_000,
            initial_settle_ms: 1500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform config directory, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = get_config_path();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path).await?
        } else {
            info!("No configuration file found, using defaults");
            Self::default()
        };

        ConfigOverrides::apply(&mut config)?;
        Ok(config)
    }

    /// Load configuration from specific file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid configuration file {}: {}", path.display(), e))?;

        config.validate()?;

        info!("Configuration loaded from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to a file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.learner.max_controls == 0 {
            return Err(anyhow::anyhow!("Learner max_controls must be > 0"));
        }

        if self.learner.price_selectors.is_empty() {
            return Err(anyhow::anyhow!("At least one price selector must be configured"));
        }

        if !(self.learner.min_plausible_price < self.learner.max_plausible_price) {
            return Err(anyhow::anyhow!(
                "Learner price range is empty: [{}, {}]",
                self.learner.min_plausible_price,
                self.learner.max_plausible_price
            ));
        }

        if self.learner.step_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!("Learner step_timeout_ms must be > 0 when set"));
        }

        if self.capture.max_sequence_items == 0 || self.capture.max_depth == 0 {
            return Err(anyhow::anyhow!("Capture max_sequence_items and max_depth must be > 0"));
        }

        if self.fetch.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Fetch request_timeout_seconds must be > 0"));
        }

        Ok(())
    }
}

/// Get the configuration file path
pub fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "pricescout", "pricescout")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides, then re-validate the result
    pub fn apply(config: &mut AppConfig) -> Result<()> {
        Self::apply_from(config, |key| std::env::var(key).ok())
    }

    fn apply_from(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(settle) = lookup("PRICESCOUT_SETTLE_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.learner.settle_ms = settle;
        }

        if let Some(max) = lookup("PRICESCOUT_MAX_CONTROLS").and_then(|v| v.parse::<usize>().ok()) {
            config.learner.max_controls = max;
        }

        if let Some(timeout) = lookup("PRICESCOUT_STEP_TIMEOUT_MS") {
            // "0" or "off" disables the guard
            config.learner.step_timeout_ms = match timeout.as_str() {
                "0" | "off" => None,
                value => value.parse::<u64>().ok().or(config.learner.step_timeout_ms),
            };
        }

        if let Some(headless) = lookup("PRICESCOUT_HEADLESS") {
            config.browser.headless = headless.to_lowercase() != "false";
        }

        if let Some(level) = lookup("PRICESCOUT_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learner.max_controls, 15);
        assert_eq!(config.capture.max_sequence_items, 5);
        assert_eq!(config.learner.settle_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.learner.max_controls = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.learner.min_plausible_price = 10.0;
        config.learner.max_plausible_price = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.learner.price_selectors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PRICESCOUT_SETTLE_MS", "250"),
            ("PRICESCOUT_MAX_CONTROLS", "4"),
            ("PRICESCOUT_STEP_TIMEOUT_MS", "off"),
            ("PRICESCOUT_HEADLESS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        ConfigOverrides::apply_from(&mut config, |key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.learner.settle_ms, 250);
        assert_eq!(config.learner.max_controls, 4);
        assert_eq!(config.learner.step_timeout_ms, None);
        assert!(!config.browser.headless);
    }

    #[test]
    fn test_env_overrides_are_validated() {
        let mut config = AppConfig::default();
        let result = ConfigOverrides::apply_from(&mut config, |key| {
            (key == "PRICESCOUT_MAX_CONTROLS").then(|| "0".to_string())
        });

        assert!(result.is_err());
        assert_eq!(config.learner.max_controls, 0);
    }

    #[tokio::test]
    async fn test_file_round_trip_with_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[learner]\nsettle_ms = 40\n\n[capture]\nmax_sequence_items = 8\n")
            .await
            .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.learner.settle_ms, 40);
        assert_eq!(config.learner.max_controls, 15);
        assert_eq!(config.capture.max_sequence_items, 8);

        let saved = dir.path().join("nested").join("saved.toml");
        config.save_to_file(&saved).await.unwrap();
        let reloaded = AppConfig::load_from_file(&saved).await.unwrap();
        assert_eq!(reloaded.learner.settle_ms, 40);
    }
}
