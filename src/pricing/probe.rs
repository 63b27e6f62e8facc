use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::parser::PriceParser;
use crate::browser::PageDriver;
use crate::error::{ProbeError, ProbeResult};

/// Run one driver call under the optional per-step timeout
pub(crate) async fn guarded<T, F>(limit: Option<Duration>, step: &str, call: F) -> ProbeResult<T>
where
    F: Future<Output = ProbeResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| ProbeError::StepTimeout {
            step: step.to_string(),
            timeout_ms: limit.as_millis() as u64,
        })?,
        None => call.await,
    }
}

/// Reads the live price off a page
pub struct PriceProbe<'a, D: PageDriver> {
    driver: &'a D,
    parser: &'a PriceParser,
    selectors: &'a [String],
    step_timeout: Option<Duration>,
}

impl<'a, D: PageDriver> PriceProbe<'a, D> {
    pub fn new(driver: &'a D, parser: &'a PriceParser, selectors: &'a [String], step_timeout: Option<Duration>) -> Self {
        Self {
            driver,
            parser,
            selectors,
            step_timeout,
        }
    }

    /// First plausible price from the selector list, else from the whole page text
    pub async fn read_price(&self) -> Option<f64> {
        for selector in self.selectors {
            let elements = match guarded(self.step_timeout, "query_price", self.driver.query_all(selector)).await {
                Ok(elements) => elements,
                Err(e) => {
                    debug!("Price selector {} failed: {}", selector, e);
                    continue;
                }
            };

            for element in &elements {
                match guarded(self.step_timeout, "read_price_text", self.driver.inner_text(element)).await {
                    Ok(text) => {
                        if let Some(price) = self.parser.parse(&text) {
                            debug!("Price {:.2} read via {}", price, selector);
                            return Some(price);
                        }
                    }
                    Err(e) => debug!("Reading text under {} failed: {}", selector, e),
                }
            }
        }

        match guarded(self.step_timeout, "read_body_text", self.driver.body_text()).await {
            Ok(text) => {
                let price = self.parser.parse(&text);
                if let Some(price) = price {
                    debug!("Price {:.2} read from page text", price);
                }
                price
            }
            Err(e) => {
                debug!("Reading page text failed: {}", e);
                None
            }
        }
    }
}
