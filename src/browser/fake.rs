//! Scripted in-memory page for tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Control, ControlDiscovery, ControlType, PageDriver, SettleClock};
use crate::error::{ProbeError, ProbeResult};

pub(crate) const PRICE_SELECTOR: &str = "[class*=\"price\"]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeHandle {
    Control(usize),
    PriceLabel,
}

type PricingFn = Box<dyn Fn(&[bool]) -> f64 + Send + Sync>;

#[derive(Default)]
struct FakeState {
    selected: Vec<bool>,
    clicks: Vec<usize>,
    navigations: Vec<String>,
    stuck: HashSet<usize>,
    detached: HashSet<usize>,
    disabled: HashSet<usize>,
    hanging: HashSet<usize>,
    price_hidden_while_selected: HashSet<usize>,
    price_only_in_body: bool,
    no_price: bool,
}

/// Page whose price is an arbitrary function of which controls are selected
pub(crate) struct FakePage {
    specs: Vec<(String, String, ControlType)>,
    pricing: PricingFn,
    state: Mutex<FakeState>,
}

impl FakePage {
    pub(crate) fn new(
        specs: &[(&str, &str, ControlType)],
        pricing: impl Fn(&[bool]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            specs: specs
                .iter()
                .map(|(group, label, kind)| (group.to_string(), label.to_string(), *kind))
                .collect(),
            pricing: Box::new(pricing),
            state: Mutex::new(FakeState {
                selected: vec![false; specs.len()],
                ..Default::default()
            }),
        }
    }

    /// Additive page: `base + Σ deltas[i]` over selected controls
    pub(crate) fn additive(specs: &[(&str, &str, ControlType)], base: f64, deltas: Vec<f64>) -> Self {
        Self::new(specs, move |selected| {
            base + selected
                .iter()
                .zip(&deltas)
                .filter(|(on, _)| **on)
                .map(|(_, delta)| delta)
                .sum::<f64>()
        })
    }

    fn edit(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub(crate) fn with_selected(self, index: usize) -> Self {
        self.edit(|s| s.selected[index] = true)
    }

    /// Clicks stop having any effect once the control is selected
    pub(crate) fn with_stuck_once_selected(self, index: usize) -> Self {
        self.edit(|s| {
            s.stuck.insert(index);
        })
    }

    pub(crate) fn with_detached(self, index: usize) -> Self {
        self.edit(|s| {
            s.detached.insert(index);
        })
    }

    /// Clicks succeed but never change the control
    pub(crate) fn with_disabled(self, index: usize) -> Self {
        self.edit(|s| {
            s.disabled.insert(index);
        })
    }

    /// Clicking the control never completes
    pub(crate) fn with_hanging_click(self, index: usize) -> Self {
        self.edit(|s| {
            s.hanging.insert(index);
        })
    }

    pub(crate) fn with_price_hidden_while_selected(self, index: usize) -> Self {
        self.edit(|s| {
            s.price_hidden_while_selected.insert(index);
        })
    }

    pub(crate) fn with_price_only_in_body(self) -> Self {
        self.edit(|s| s.price_only_in_body = true)
    }

    pub(crate) fn without_price(self) -> Self {
        self.edit(|s| s.no_price = true)
    }

    pub(crate) fn controls(&self) -> Vec<Control<FakeHandle>> {
        self.specs
            .iter()
            .enumerate()
            .map(|(i, (group, label, kind))| Control::new(group.clone(), label.clone(), *kind, FakeHandle::Control(i)))
            .collect()
    }

    pub(crate) fn selected(&self) -> Vec<bool> {
        self.state.lock().unwrap().selected.clone()
    }

    pub(crate) fn clicks(&self) -> Vec<usize> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    fn current_price(&self) -> Option<f64> {
        let state = self.state.lock().unwrap();
        let hidden = state
            .price_hidden_while_selected
            .iter()
            .any(|i| state.selected[*i]);

        if state.no_price || hidden {
            None
        } else {
            Some((self.pricing)(&state.selected))
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    type Handle = FakeHandle;

    async fn navigate(&self, url: &str) -> ProbeResult<()> {
        self.state.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> ProbeResult<Vec<FakeHandle>> {
        let in_dom = !self.state.lock().unwrap().price_only_in_body;
        if selector == PRICE_SELECTOR && in_dom {
            Ok(vec![FakeHandle::PriceLabel])
        } else {
            Ok(Vec::new())
        }
    }

    async fn inner_text(&self, handle: &FakeHandle) -> ProbeResult<String> {
        match handle {
            FakeHandle::PriceLabel => Ok(self
                .current_price()
                .map(|price| format!("${:.2}", price))
                .unwrap_or_else(|| "Price on request".to_string())),
            FakeHandle::Control(i) => Ok(self.specs[*i].1.clone()),
        }
    }

    async fn body_text(&self) -> ProbeResult<String> {
        let price = self
            .current_price()
            .map(|price| format!("Total: ${:.2}", price))
            .unwrap_or_default();
        Ok(format!("Build your own\n{}\nQty 1", price))
    }

    async fn is_selected(&self, handle: &FakeHandle) -> ProbeResult<bool> {
        match handle {
            FakeHandle::Control(i) => Ok(self.state.lock().unwrap().selected[*i]),
            FakeHandle::PriceLabel => Ok(false),
        }
    }

    async fn click(&self, handle: &FakeHandle) -> ProbeResult<()> {
        let index = match handle {
            FakeHandle::Control(i) => *i,
            FakeHandle::PriceLabel => return Ok(()),
        };

        let hangs = {
            let mut state = self.state.lock().unwrap();
            if state.detached.contains(&index) {
                return Err(ProbeError::ElementDetached { label: self.specs[index].1.clone() });
            }
            state.clicks.push(index);
            if !state.hanging.contains(&index) && !state.disabled.contains(&index) {
                let stuck = state.stuck.contains(&index) && state.selected[index];
                let (group, _, kind) = &self.specs[index];
                if *kind == ControlType::Radio {
                    // checking a radio unchecks its group; a checked radio ignores clicks
                    for (other, (other_group, _, other_kind)) in self.specs.iter().enumerate() {
                        if *other_kind == ControlType::Radio && other_group == group {
                            state.selected[other] = other == index;
                        }
                    }
                } else if !stuck {
                    state.selected[index] = !state.selected[index];
                }
            }
            state.hanging.contains(&index)
        };

        if hangs {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Hands back the page's own controls
pub(crate) struct FakeDiscovery;

#[async_trait]
impl ControlDiscovery<FakePage> for FakeDiscovery {
    async fn discover(&self, driver: &FakePage) -> ProbeResult<Vec<Control<FakeHandle>>> {
        Ok(driver.controls())
    }
}

/// Instantaneous clock that counts settle waits
#[derive(Default)]
pub(crate) struct RecordingClock {
    settles: AtomicUsize,
    total_ms: AtomicUsize,
}

impl RecordingClock {
    pub(crate) fn settles(&self) -> usize {
        self.settles.load(Ordering::SeqCst)
    }

    pub(crate) fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms.load(Ordering::SeqCst) as u64)
    }
}

#[async_trait]
impl SettleClock for RecordingClock {
    async fn settle(&self, duration: Duration) {
        self.settles.fetch_add(1, Ordering::SeqCst);
        self.total_ms.fetch_add(duration.as_millis() as usize, Ordering::SeqCst);
    }
}
