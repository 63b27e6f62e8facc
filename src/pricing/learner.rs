//! Price-delta learning.
//!
//! Toggles each control in turn against the single shared page and records
//! how the displayed price moves. Every control is returned to the state it
//! was found in before the next one is touched; later measurements assume
//! earlier controls were left exactly as found.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::parser::PriceParser;
use super::probe::{guarded, PriceProbe};
use super::PricingModel;
use crate::browser::{Control, PageDriver, SettleClock};
use crate::config::LearnerConfig;
use crate::error::ProbeResult;
use crate::logging::{LogContext, PerformanceLogger};

/// Prices closer than this are treated as equal
pub const PRICE_EPSILON: f64 = 0.01;

/// Why a control has no delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmeasuredReason {
    StateUnreadable,
    ClickFailed,
    NoPriceBefore,
    NoPriceAfter,
    /// A click left the control in the same state (checked radio, disabled input)
    ToggleIneffective,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Measurement {
    Measured { price_before: f64, price_after: f64, delta: f64 },
    Unmeasured { reason: UnmeasuredReason },
}

/// What happened to one control during a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlOutcome {
    pub key: String,
    pub measurement: Measurement,
    /// `price_before - base_price` when a control that started deselected saw a
    /// different starting price; an earlier control was not reset
    pub baseline_drift: Option<f64>,
    /// The control could not be put back into its starting state
    pub reset_failed: bool,
}

impl ControlOutcome {
    pub fn delta(&self) -> Option<f64> {
        match self.measurement {
            Measurement::Measured { delta, .. } => Some(delta),
            Measurement::Unmeasured { .. } => None,
        }
    }
}

/// Model plus per-control diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct LearningPass {
    pub model: PricingModel,
    pub outcomes: Vec<ControlOutcome>,
    pub considered: usize,
}

/// Builds an additive pricing model by probing controls one at a time
#[derive(Debug, Clone)]
pub struct PriceLearner {
    config: LearnerConfig,
    parser: PriceParser,
}

impl PriceLearner {
    pub fn new(config: &LearnerConfig) -> ProbeResult<Self> {
        let parser = PriceParser::with_range(config.min_plausible_price, config.max_plausible_price)?;
        Ok(Self {
            config: config.clone(),
            parser,
        })
    }

    pub async fn learn<D: PageDriver>(
        &self,
        driver: &D,
        clock: &dyn SettleClock,
        controls: &[Control<D::Handle>],
    ) -> PricingModel {
        self.learn_with_report(driver, clock, controls).await.model
    }

    /// Learn a model and keep the per-control outcomes
    pub async fn learn_with_report<D: PageDriver>(
        &self,
        driver: &D,
        clock: &dyn SettleClock,
        controls: &[Control<D::Handle>],
    ) -> LearningPass {
        let context = LogContext::new("learner", "learn_pricing_model")
            .with_number_field("controls", controls.len() as i64);
        let perf = PerformanceLogger::new(context);

        let probe = self.probe(driver);
        let mut model = PricingModel::empty();

        let Some(base_price) = probe.read_price().await else {
            warn!("Could not detect base price; skipping {} controls", controls.len());
            perf.finish_with_status("Price learning aborted", "no_base_price");
            return LearningPass {
                model,
                outcomes: Vec::new(),
                considered: 0,
            };
        };

        info!("Base price: ${:.2}", base_price);
        model.base_price = Some(base_price);

        let considered = controls.len().min(self.config.max_controls);
        let mut outcomes = Vec::with_capacity(considered);

        for control in &controls[..considered] {
            let outcome = self.measure(driver, clock, &probe, control, base_price).await;

            match &outcome.measurement {
                Measurement::Measured { delta, .. } => {
                    if delta.abs() >= PRICE_EPSILON {
                        info!("{}: ${:+.2}", outcome.key, delta);
                    }
                    model.option_deltas.insert(outcome.key.clone(), *delta);
                }
                Measurement::Unmeasured { reason } => {
                    warn!("{}: not measured ({:?})", outcome.key, reason);
                }
            }

            outcomes.push(outcome);
        }

        let measured = outcomes.iter().filter(|o| o.delta().is_some()).count();
        model.confidence = if considered > 0 {
            measured as f64 / considered as f64
        } else {
            0.0
        };

        info!("Learned {}/{} option deltas", measured, considered);
        perf.finish("Price learning complete");

        LearningPass {
            model,
            outcomes,
            considered,
        }
    }

    fn probe<'a, D: PageDriver>(&'a self, driver: &'a D) -> PriceProbe<'a, D> {
        PriceProbe::new(driver, &self.parser, &self.config.price_selectors, self.config.step_timeout())
    }

    fn settle_interval(&self) -> Duration {
        self.config.settle_interval()
    }

    async fn measure<D: PageDriver>(
        &self,
        driver: &D,
        clock: &dyn SettleClock,
        probe: &PriceProbe<'_, D>,
        control: &Control<D::Handle>,
        base_price: f64,
    ) -> ControlOutcome {
        let key = control.key();
        let unmeasured = |reason| ControlOutcome {
            key: key.clone(),
            measurement: Measurement::Unmeasured { reason },
            baseline_drift: None,
            reset_failed: false,
        };

        let initially_selected = match self.is_selected(driver, control).await {
            Ok(selected) => selected,
            Err(e) => {
                debug!("{}: cannot read state: {}", key, e);
                return unmeasured(UnmeasuredReason::StateUnreadable);
            }
        };

        let measurement = self
            .toggle_and_sample(driver, clock, probe, control, initially_selected)
            .await;
        let reset_failed = !self.restore(driver, clock, control, initially_selected).await;

        let measurement = match measurement {
            Ok(measurement) => measurement,
            Err(reason) => Measurement::Unmeasured { reason },
        };

        let baseline_drift = match measurement {
            Measurement::Measured { price_before, .. }
                if !initially_selected && (price_before - base_price).abs() >= PRICE_EPSILON =>
            {
                warn!(
                    "{}: starting price ${:.2} differs from base ${:.2}; an earlier control may not have reset",
                    key, price_before, base_price
                );
                Some(price_before - base_price)
            }
            _ => None,
        };

        ControlOutcome {
            key,
            measurement,
            baseline_drift,
            reset_failed,
        }
    }

    /// Deselect if needed, sample, select, sample
    async fn toggle_and_sample<D: PageDriver>(
        &self,
        driver: &D,
        clock: &dyn SettleClock,
        probe: &PriceProbe<'_, D>,
        control: &Control<D::Handle>,
        initially_selected: bool,
    ) -> Result<Measurement, UnmeasuredReason> {
        if initially_selected {
            self.click(driver, clock, control).await.map_err(|_| UnmeasuredReason::ClickFailed)?;
            self.expect_state(driver, control, false).await?;
        }

        let price_before = probe.read_price().await;

        self.click(driver, clock, control).await.map_err(|_| UnmeasuredReason::ClickFailed)?;
        self.expect_state(driver, control, true).await?;

        let price_after = probe.read_price().await;

        let price_before = price_before.ok_or(UnmeasuredReason::NoPriceBefore)?;
        let price_after = price_after.ok_or(UnmeasuredReason::NoPriceAfter)?;

        Ok(Measurement::Measured {
            price_before,
            price_after,
            delta: price_after - price_before,
        })
    }

    /// Put the control back the way it was found. Returns false if it could not be confirmed.
    async fn restore<D: PageDriver>(
        &self,
        driver: &D,
        clock: &dyn SettleClock,
        control: &Control<D::Handle>,
        initially_selected: bool,
    ) -> bool {
        let key = control.key();

        match self.is_selected(driver, control).await {
            Ok(selected) if selected == initially_selected => return true,
            Ok(_) => {}
            Err(e) => {
                warn!("{}: cannot read state before reset: {}", key, e);
                return false;
            }
        }

        if let Err(e) = self.click(driver, clock, control).await {
            warn!("{}: reset click failed: {}", key, e);
            return false;
        }

        match self.is_selected(driver, control).await {
            Ok(selected) if selected == initially_selected => true,
            Ok(_) => {
                warn!("{}: still altered after reset; later deltas may be skewed", key);
                false
            }
            Err(e) => {
                warn!("{}: cannot confirm reset: {}", key, e);
                false
            }
        }
    }

    async fn expect_state<D: PageDriver>(
        &self,
        driver: &D,
        control: &Control<D::Handle>,
        selected: bool,
    ) -> Result<(), UnmeasuredReason> {
        match self.is_selected(driver, control).await {
            Ok(state) if state == selected => Ok(()),
            Ok(_) => {
                debug!("{}: click did not change state", control.key());
                Err(UnmeasuredReason::ToggleIneffective)
            }
            Err(_) => Err(UnmeasuredReason::StateUnreadable),
        }
    }

    async fn is_selected<D: PageDriver>(&self, driver: &D, control: &Control<D::Handle>) -> ProbeResult<bool> {
        guarded(self.config.step_timeout(), "read_state", driver.is_selected(&control.handle)).await
    }

    /// Click, then wait the full settle interval
    async fn click<D: PageDriver>(
        &self,
        driver: &D,
        clock: &dyn SettleClock,
        control: &Control<D::Handle>,
    ) -> ProbeResult<()> {
        guarded(self.config.step_timeout(), "click", driver.click(&control.handle))
            .await
            .map_err(|e| {
                debug!("{}: click failed: {}", control.key(), e);
                e
            })?;
        clock.settle(self.settle_interval()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakePage, RecordingClock, PRICE_SELECTOR};
    use crate::pricing::PriceType;
    use crate::browser::ControlType;

    fn config() -> LearnerConfig {
        LearnerConfig {
            settle_ms: 250,
            price_selectors: vec![PRICE_SELECTOR.to_string()],
            ..Default::default()
        }
    }

    fn learner() -> PriceLearner {
        PriceLearner::new(&config()).unwrap()
    }

    const HITCH: (&str, &str, ControlType) = ("Extras", "Tow hitch", ControlType::Checkbox);
    const RACK: (&str, &str, ControlType) = ("Extras", "Roof rack", ControlType::Checkbox);

    #[tokio::test]
    async fn test_single_control_delta_and_reset() {
        let page = FakePage::additive(&[HITCH], 100.0, vec![25.0]);
        let clock = RecordingClock::default();

        let model = learner().learn(&page, &clock, &page.controls()).await;

        assert_eq!(model.base_price, Some(100.0));
        assert_eq!(model.price_type, PriceType::Computed);
        assert_eq!(model.option_deltas.get("Extras.Tow hitch"), Some(&25.0));
        assert_eq!(model.confidence, 1.0);
        assert!(model.dependencies.is_empty());
        // left exactly as found
        assert_eq!(page.selected(), vec![false]);
        assert_eq!(page.clicks(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_initially_selected_control_is_normalized_then_restored() {
        let page = FakePage::additive(&[HITCH], 100.0, vec![25.0]).with_selected(0);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(pass.model.base_price, Some(125.0));
        assert_eq!(pass.outcomes[0].delta(), Some(25.0));
        assert_eq!(pass.outcomes[0].baseline_drift, None);
        assert!(!pass.outcomes[0].reset_failed);
        assert_eq!(page.selected(), vec![true]);
    }

    #[tokio::test]
    async fn test_every_action_waits_the_settle_interval() {
        let page = FakePage::additive(&[HITCH, RACK], 100.0, vec![25.0, 40.0]);
        let clock = RecordingClock::default();

        learner().learn(&page, &clock, &page.controls()).await;

        // select + reset for each control
        assert_eq!(clock.settles(), 4);
        assert_eq!(clock.total(), Duration::from_millis(1000));
        assert_eq!(page.clicks().len(), clock.settles());
    }

    #[tokio::test]
    async fn test_missing_base_price_aborts_pass() {
        let page = FakePage::additive(&[HITCH, RACK], 100.0, vec![25.0, 40.0]).without_price();
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(pass.model.base_price, None);
        assert_eq!(pass.model.confidence, 0.0);
        assert!(pass.model.option_deltas.is_empty());
        assert!(pass.outcomes.is_empty());
        assert!(page.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_price_leaves_key_absent_and_continues() {
        let page = FakePage::additive(&[HITCH, RACK], 100.0, vec![25.0, 40.0]).with_price_hidden_while_selected(0);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert!(!pass.model.option_deltas.contains_key("Extras.Tow hitch"));
        assert_eq!(pass.model.option_deltas.get("Extras.Roof rack"), Some(&40.0));
        assert_eq!(
            pass.outcomes[0].measurement,
            Measurement::Unmeasured { reason: UnmeasuredReason::NoPriceAfter }
        );
        assert_eq!(pass.model.confidence, 0.5);
        assert_eq!(page.selected(), vec![false, false]);
    }

    #[tokio::test]
    async fn test_detached_control_is_unmeasured() {
        let page = FakePage::additive(&[HITCH, RACK], 100.0, vec![25.0, 40.0]).with_detached(0);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(
            pass.outcomes[0].measurement,
            Measurement::Unmeasured { reason: UnmeasuredReason::ClickFailed }
        );
        assert_eq!(pass.outcomes[1].delta(), Some(40.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_click_times_out() {
        let page = FakePage::additive(&[HITCH, RACK], 100.0, vec![25.0, 40.0]).with_hanging_click(0);
        let clock = RecordingClock::default();
        let learner = PriceLearner::new(&LearnerConfig {
            step_timeout_ms: Some(500),
            ..config()
        })
        .unwrap();

        let pass = learner.learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(pass.outcomes[0].delta(), None);
        assert_eq!(pass.outcomes[1].delta(), Some(40.0));
        assert_eq!(pass.model.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_control_budget_bounds_round_trips() {
        let specs: Vec<(String, String)> = (0..20).map(|i| ("Opt".to_string(), format!("Option {}", i))).collect();
        let spec_refs: Vec<(&str, &str, ControlType)> = specs
            .iter()
            .map(|(g, l)| (g.as_str(), l.as_str(), ControlType::Checkbox))
            .collect();
        let page = FakePage::additive(&spec_refs, 100.0, vec![5.0; 20]);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(pass.considered, 15);
        assert_eq!(pass.model.option_deltas.len(), 15);
        assert_eq!(pass.model.confidence, 1.0);
        assert!(page.clicks().iter().all(|i| *i < 15));
    }

    #[tokio::test]
    async fn test_no_controls_gives_zero_confidence() {
        let page = FakePage::additive(&[], 100.0, vec![]);
        let clock = RecordingClock::default();

        let model = learner().learn(&page, &clock, &page.controls()).await;
        assert_eq!(model.base_price, Some(100.0));
        assert_eq!(model.confidence, 0.0);
    }

    /// Bundle discount: B costs 30 alone but only 10 on top of A
    fn bundled_page() -> FakePage {
        FakePage::new(&[HITCH, RACK], |selected| {
            let mut price = 100.0;
            if selected[0] {
                price += 20.0;
            }
            if selected[1] {
                price += if selected[0] { 10.0 } else { 30.0 };
            }
            price
        })
    }

    #[tokio::test]
    async fn test_later_delta_independent_of_earlier_measurement() {
        let clock = RecordingClock::default();

        let page = bundled_page();
        let both = learner().learn(&page, &clock, &page.controls()).await;

        let page = bundled_page();
        let only_b = learner().learn(&page, &clock, &page.controls()[1..]).await;

        assert_eq!(both.option_deltas.get("Extras.Roof rack"), Some(&30.0));
        assert_eq!(both.option_deltas.get("Extras.Roof rack"), only_b.option_deltas.get("Extras.Roof rack"));
    }

    #[tokio::test]
    async fn test_failed_reset_skews_next_delta_detectably() {
        let page = bundled_page().with_stuck_once_selected(0);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(pass.outcomes[0].delta(), Some(20.0));
        assert!(pass.outcomes[0].reset_failed);
        // B measured on top of a stuck A: the additive assumption breaks
        assert_eq!(pass.outcomes[1].delta(), Some(10.0));
        assert_ne!(pass.outcomes[1].delta(), Some(30.0));
        assert_eq!(pass.outcomes[1].baseline_drift, Some(20.0));
        assert_eq!(page.selected(), vec![true, false]);
    }

    const RED: (&str, &str, ControlType) = ("Paint", "Red", ControlType::Radio);
    const BLUE: (&str, &str, ControlType) = ("Paint", "Blue", ControlType::Radio);

    #[tokio::test]
    async fn test_checked_radio_cannot_be_measured() {
        let page = FakePage::additive(&[RED], 100.0, vec![25.0]).with_selected(0);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(pass.model.base_price, Some(125.0));
        assert_eq!(
            pass.outcomes[0].measurement,
            Measurement::Unmeasured { reason: UnmeasuredReason::ToggleIneffective }
        );
        assert!(!pass.outcomes[0].reset_failed);
        assert!(pass.model.option_deltas.is_empty());
        assert_eq!(pass.model.confidence, 0.0);
        assert_eq!(page.selected(), vec![true]);
    }

    #[tokio::test]
    async fn test_disabled_control_is_not_a_zero_delta() {
        let page = FakePage::additive(&[HITCH, RACK], 100.0, vec![25.0, 40.0]).with_disabled(0);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert!(!pass.model.option_deltas.contains_key("Extras.Tow hitch"));
        assert_eq!(
            pass.outcomes[0].measurement,
            Measurement::Unmeasured { reason: UnmeasuredReason::ToggleIneffective }
        );
        assert_eq!(pass.outcomes[1].delta(), Some(40.0));
        assert_eq!(pass.model.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_radio_group_deltas_are_relative_to_sibling() {
        let page = FakePage::additive(&[RED, BLUE], 100.0, vec![0.0, 50.0]).with_selected(1);
        let clock = RecordingClock::default();

        let pass = learner().learn_with_report(&page, &clock, &page.controls()).await;

        assert_eq!(pass.model.base_price, Some(150.0));
        // choosing Red drops Blue; clicking Red again cannot unchoose it
        assert_eq!(pass.outcomes[0].delta(), Some(-50.0));
        assert!(pass.outcomes[0].reset_failed);
        assert_eq!(pass.outcomes[1].baseline_drift, Some(-50.0));
        assert_eq!(pass.outcomes[1].delta(), Some(50.0));
        assert_eq!(page.selected(), vec![false, true]);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ControlOutcome {
            key: "Extras.Tow hitch".to_string(),
            measurement: Measurement::Unmeasured { reason: UnmeasuredReason::NoPriceBefore },
            baseline_drift: None,
            reset_failed: false,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["measurement"]["status"], "unmeasured");
        assert_eq!(json["measurement"]["reason"], "no_price_before");

        let reason = serde_json::to_value(UnmeasuredReason::ToggleIneffective).unwrap();
        assert_eq!(reason, "toggle_ineffective");
    }
}
