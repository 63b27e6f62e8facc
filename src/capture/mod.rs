//! Passive network observer.
//!
//! Drivers hand each response to a [`CaptureSink`]. The sink classifies and
//! harvests on the caller's task and pushes the result onto an unbounded
//! channel, so observing never waits on the learner. [`NetworkCapture`]
//! drains the channel when a summary is requested.

pub mod classifier;
pub mod harvest;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

pub use classifier::ExchangeClassifier;
pub use harvest::{HarvestedPrices, PriceHarvester, TreeLimits};

use crate::config::CaptureConfig;
use crate::error::ProbeResult;
use crate::pricing::PriceParser;

/// One observed response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkExchange {
    pub url: String,
    pub status: u16,
    pub content_type: String,
}

impl NetworkExchange {
    pub fn new(url: impl Into<String>, status: u16, content_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: content_type.into(),
        }
    }
}

/// Prices harvested from one pricing-classified response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingExchange {
    pub url: String,
    #[serde(flatten)]
    pub prices: HarvestedPrices,
}

#[derive(Debug)]
struct Observation {
    exchange: NetworkExchange,
    classified: bool,
    harvest: Option<PricingExchange>,
}

/// Clonable handle given to whatever produces response events
#[derive(Debug, Clone)]
pub struct CaptureSink {
    sender: mpsc::UnboundedSender<Observation>,
    classifier: Arc<ExchangeClassifier>,
    harvester: Arc<PriceHarvester>,
    harvest_prices: bool,
}

impl CaptureSink {
    /// Whether the body of this response should be read and passed to [`observe`](Self::observe)
    pub fn wants_body(&self, url: &str, content_type: &str) -> bool {
        self.harvest_prices && self.classifier.is_pricing(url, content_type)
    }

    /// Record a response. `body` is `None` when it was not read or could not be read.
    pub fn observe(&self, exchange: NetworkExchange, body: Option<&str>) {
        let classified = self.classifier.is_pricing(&exchange.url, &exchange.content_type);
        let harvest = match body {
            Some(body) if classified && self.harvest_prices => {
                let prices = self.harvester.harvest_body(body);
                debug!("Harvested {} price points from {}", prices.points().len(), exchange.url);
                Some(PricingExchange {
                    url: exchange.url.clone(),
                    prices,
                })
            }
            _ => None,
        };

        let observation = Observation {
            exchange,
            classified,
            harvest,
        };

        if self.sender.send(observation).is_err() {
            debug!("Capture closed; dropping exchange");
        }
    }
}

#[derive(Debug, Default)]
struct CaptureLog {
    exchanges: Vec<NetworkExchange>,
    pricing_exchanges: usize,
    harvests: Vec<PricingExchange>,
}

struct Accumulator {
    receiver: mpsc::UnboundedReceiver<Observation>,
    log: CaptureLog,
}

impl Accumulator {
    fn drain(&mut self) {
        while let Ok(observation) = self.receiver.try_recv() {
            if observation.classified {
                self.log.pricing_exchanges += 1;
            }
            if let Some(harvest) = observation.harvest {
                self.log.harvests.push(harvest);
            }
            self.log.exchanges.push(observation.exchange);
        }
    }
}

/// Per-session exchange log
pub struct NetworkCapture {
    sink: CaptureSink,
    accumulator: Mutex<Accumulator>,
}

/// Capture totals plus every non-empty harvest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSummary {
    pub total_exchanges: usize,
    pub pricing_exchanges: usize,
    pub prices_found: Vec<PricingExchange>,
}

impl CaptureSummary {
    /// Every harvested value as `(url#path, value)`
    pub fn price_points(&self) -> Vec<(String, f64)> {
        self.prices_found
            .iter()
            .flat_map(|exchange| {
                exchange
                    .prices
                    .points()
                    .into_iter()
                    .map(move |(path, value)| (format!("{}#{}", exchange.url, path), value))
            })
            .collect()
    }
}

impl NetworkCapture {
    pub fn new(config: &CaptureConfig) -> ProbeResult<Self> {
        let harvester = PriceHarvester::new(PriceParser::new()?, TreeLimits::from(config));
        Ok(Self::with_parts(ExchangeClassifier::default(), harvester, config.harvest_prices))
    }

    pub fn with_parts(classifier: ExchangeClassifier, harvester: PriceHarvester, harvest_prices: bool) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        if !harvest_prices {
            warn!("Price harvesting disabled; only exchange metadata will be recorded");
        }

        Self {
            sink: CaptureSink {
                sender,
                classifier: Arc::new(classifier),
                harvester: Arc::new(harvester),
                harvest_prices,
            },
            accumulator: Mutex::new(Accumulator {
                receiver,
                log: CaptureLog::default(),
            }),
        }
    }

    pub fn sink(&self) -> CaptureSink {
        self.sink.clone()
    }

    pub async fn summary(&self) -> CaptureSummary {
        let mut accumulator = self.accumulator.lock().await;
        accumulator.drain();

        let log = &accumulator.log;
        CaptureSummary {
            total_exchanges: log.exchanges.len(),
            pricing_exchanges: log.pricing_exchanges,
            prices_found: log.harvests.iter().filter(|h| !h.prices.is_empty()).cloned().collect(),
        }
    }

    /// Every exchange observed so far, in arrival order
    pub async fn exchanges(&self) -> Vec<NetworkExchange> {
        let mut accumulator = self.accumulator.lock().await;
        accumulator.drain();
        accumulator.log.exchanges.clone()
    }
}
