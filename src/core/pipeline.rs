use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::session::ProbeSession;
use crate::browser::{ControlDiscovery, ControlFilter, PageDriver, SettleClock, TokioClock};
use crate::capture::CaptureSummary;
use crate::config::{AppConfig, BrowserConfig};
use crate::detector::{should_use_browser, DetectionResult, ExtractionModeDetector};
use crate::error::{ProbeError, ProbeResult};
use crate::logging::LogContext;
use crate::pricing::learner::{LearningPass, Measurement, PRICE_EPSILON};
use crate::pricing::PriceLearner;
use crate::pricing::probe::guarded;
use crate::{log_info, log_warn};

/// What the page-normalization collaborator hands over
#[derive(Debug, Clone, Copy)]
pub struct PageInput<'a> {
    pub url: &'a str,
    /// Normalized lowercase page text
    pub text: &'a str,
    pub markup: Option<&'a str>,
}

impl<'a> PageInput<'a> {
    pub fn new(url: &'a str, text: &'a str) -> Self {
        Self { url, text, markup: None }
    }

    pub fn with_markup(mut self, markup: &'a str) -> Self {
        self.markup = Some(markup);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    StaticMode,
    AlreadyVisited,
}

/// Agreement between learned prices and prices seen on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceCrossCheck {
    pub base_price_corroborated: bool,
    pub corroborated_samples: usize,
    pub total_samples: usize,
    /// Harvest paths (`url#path`) that matched at least one sample
    pub matching_paths: Vec<String>,
}

impl PriceCrossCheck {
    pub fn compute(pass: &LearningPass, capture: &CaptureSummary) -> Self {
        let harvested = capture.price_points();
        let matches = |sample: f64| -> Vec<&str> {
            harvested
                .iter()
                .filter(|(_, value)| (value - sample).abs() < PRICE_EPSILON)
                .map(|(path, _)| path.as_str())
                .collect()
        };

        let mut samples: Vec<f64> = pass.model.base_price.into_iter().collect();
        for outcome in &pass.outcomes {
            if let Measurement::Measured { price_before, price_after, .. } = outcome.measurement {
                samples.push(price_before);
                samples.push(price_after);
            }
        }

        let base_price_corroborated = pass.model.base_price.map_or(false, |base| !matches(base).is_empty());

        let mut corroborated_samples = 0;
        let mut matching_paths: Vec<String> = Vec::new();
        for sample in &samples {
            let found = matches(*sample);
            if !found.is_empty() {
                corroborated_samples += 1;
            }
            matching_paths.extend(found.into_iter().map(str::to_string));
        }
        matching_paths.sort();
        matching_paths.dedup();

        Self {
            base_price_corroborated,
            corroborated_samples,
            total_samples: samples.len(),
            matching_paths,
        }
    }
}

/// Everything learned about one page
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub session_id: String,
    pub url: String,
    pub detection: DetectionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    pub controls_discovered: usize,
    pub controls_probed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning: Option<LearningPass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_check: Option<PriceCrossCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ProbeReport {
    fn new(session: &ProbeSession, url: &str, detection: DetectionResult) -> Self {
        Self {
            session_id: session.id().to_string(),
            url: url.to_string(),
            detection,
            skipped: None,
            controls_discovered: 0,
            controls_probed: 0,
            learning: None,
            capture: None,
            cross_check: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Detect, then learn prices through a live page when the page needs it
pub struct ConfiguratorProbe {
    detector: ExtractionModeDetector,
    filter: ControlFilter,
    learner: PriceLearner,
    browser: BrowserConfig,
    clock: Arc<dyn SettleClock>,
}

impl ConfiguratorProbe {
    pub fn new(config: &AppConfig) -> ProbeResult<Self> {
        Ok(Self {
            detector: ExtractionModeDetector::new()?,
            filter: ControlFilter::default(),
            learner: PriceLearner::new(&config.learner)?,
            browser: config.browser.clone(),
            clock: Arc::new(TokioClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn SettleClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_filter(mut self, filter: ControlFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn detect(&self, page: PageInput<'_>) -> DetectionResult {
        self.detector.detect(page.url, page.text, page.markup)
    }

    /// Never fails; driver trouble is reported in [`ProbeReport::error`]
    pub async fn probe_page<D, C>(
        &self,
        session: &ProbeSession,
        driver: &D,
        discovery: &C,
        page: PageInput<'_>,
    ) -> ProbeReport
    where
        D: PageDriver,
        C: ControlDiscovery<D>,
    {
        let started = Instant::now();
        let detection = self.detect(page);
        let mut report = ProbeReport::new(session, page.url, detection);

        if !should_use_browser(&report.detection) {
            debug!("{} is static ({:.2}); no browser pass", page.url, report.detection.confidence);
            report.skipped = Some(SkipReason::StaticMode);
        } else if !session.mark_visited(page.url) {
            debug!("{} already probed in session {}", page.url, session.id());
            report.skipped = Some(SkipReason::AlreadyVisited);
        } else if let Err(e) = self.run_browser_pass(session, driver, discovery, page.url, &mut report).await {
            let context = LogContext::new("pipeline", "probe_page")
                .with_session_id(session.id().to_string())
                .with_url(page.url)
                .with_error_category(e.category());
            log_warn!(context, "Browser pass failed: {}", e);
            report.error = Some(e.to_string());
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn run_browser_pass<D, C>(
        &self,
        session: &ProbeSession,
        driver: &D,
        discovery: &C,
        url: &str,
        report: &mut ProbeReport,
    ) -> ProbeResult<()>
    where
        D: PageDriver,
        C: ControlDiscovery<D>,
    {
        let navigation_timeout = Duration::from_millis(self.browser.navigation_timeout_ms);
        guarded(Some(navigation_timeout), "navigate", driver.navigate(url))
            .await
            .map_err(|e| match e {
                ProbeError::StepTimeout { .. } => ProbeError::Navigation { url: url.to_string() },
                other => other,
            })?;
        self.clock.settle(Duration::from_millis(self.browser.initial_settle_ms)).await;

        let discovered = discovery.discover(driver).await?;
        report.controls_discovered = discovered.len();

        let controls = self.filter.apply(discovered);
        if controls.is_empty() {
            warn!("No usable controls on {}", url);
        }

        let pass = self.learner.learn_with_report(driver, self.clock.as_ref(), &controls).await;
        report.controls_probed = pass.considered;

        let capture = session.capture().summary().await;
        let cross_check = PriceCrossCheck::compute(&pass, &capture);

        let context = LogContext::new("pipeline", "probe_page")
            .with_session_id(session.id().to_string())
            .with_url(url)
            .with_number_field("options", pass.model.option_deltas.len() as i64)
            .with_number_field("pricing_exchanges", capture.pricing_exchanges as i64);
        log_info!(context, "Learned pricing model (confidence {:.2})", pass.model.confidence);

        if pass.model.base_price.is_some() && !cross_check.base_price_corroborated && !capture.prices_found.is_empty() {
            info!("Base price for {} not seen in any captured response", url);
        }

        report.learning = Some(pass);
        report.capture = Some(capture);
        report.cross_check = Some(cross_check);
        Ok(())
    }
}
