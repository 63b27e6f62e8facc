//! Live page driver over Playwright.

use async_trait::async_trait;
use futures::StreamExt;
use playwright::api::{page, Browser, BrowserContext, ElementHandle, Page, Response};
use playwright::Playwright;
use serde::Deserialize;
use std::fmt::Display;
use tracing::{debug, info, warn};

use super::{Control, ControlDiscovery, ControlType, PageDriver};
use crate::capture::{CaptureSink, NetworkExchange};
use crate::config::BrowserConfig;
use crate::error::{ProbeError, ProbeResult};

fn driver_error(e: impl Display) -> ProbeError {
    ProbeError::driver(e.to_string())
}

/// One chromium page for the whole session
pub struct PlaywrightDriver {
    _playwright: Playwright,
    browser: Browser,
    _context: BrowserContext,
    page: Page,
    config: BrowserConfig,
}

// Playwright handles are driven from one task at a time
unsafe impl Send for PlaywrightDriver {}
unsafe impl Sync for PlaywrightDriver {}

impl PlaywrightDriver {
    pub async fn launch(config: &BrowserConfig) -> ProbeResult<Self> {
        debug!("Launching chromium (headless: {})", config.headless);

        let playwright = Playwright::initialize().await.map_err(driver_error)?;
        playwright.install_chromium().map_err(driver_error)?;

        let browser = playwright
            .chromium()
            .launcher()
            .headless(config.headless)
            .launch()
            .await
            .map_err(driver_error)?;

        let context = browser
            .context_builder()
            .user_agent(&config.user_agent)
            .viewport(Some(playwright::api::Viewport {
                width: 1920,
                height: 1080,
            }))
            .build()
            .await
            .map_err(driver_error)?;

        let page = context.new_page().await.map_err(driver_error)?;
        page.set_default_timeout(config.navigation_timeout_ms as u32);

        info!("Browser page ready");
        Ok(Self {
            _playwright: playwright,
            browser,
            _context: context,
            page,
            config: config.clone(),
        })
    }

    /// Forward every response on this page to `sink`. Each response is handled on its own task.
    pub fn attach_capture(&self, sink: CaptureSink) -> ProbeResult<()> {
        let mut events = self.page.subscribe_event().map_err(driver_error)?;

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let response = match event {
                    Ok(page::Event::Response(response)) => response,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("Response stream lagged: {}", e);
                        continue;
                    }
                };

                let sink = sink.clone();
                tokio::spawn(async move {
                    if let Err(e) = forward_response(&sink, response).await {
                        debug!("Dropped response: {}", e);
                    }
                });
            }
        });

        Ok(())
    }

    pub async fn close(self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
    }
}

async fn forward_response(sink: &CaptureSink, response: Response) -> ProbeResult<()> {
    let url = response.url().map_err(driver_error)?;
    let status = response.status().map_err(driver_error)?;
    let content_type = response
        .headers()
        .map_err(driver_error)?
        .get("content-type")
        .cloned()
        .unwrap_or_default();

    let body = if sink.wants_body(&url, &content_type) {
        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!("Body of {} unreadable: {}", url, e);
                None
            }
        }
    } else {
        None
    };

    let status = u16::try_from(status).unwrap_or_default();
    sink.observe(NetworkExchange::new(url, status, content_type), body.as_deref());
    Ok(())
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    type Handle = ElementHandle;

    async fn navigate(&self, url: &str) -> ProbeResult<()> {
        self.page
            .goto_builder(url)
            .timeout(self.config.navigation_timeout_ms as f64)
            .goto()
            .await
            .map_err(|e| {
                debug!("goto {} failed: {}", url, e);
                ProbeError::Navigation { url: url.to_string() }
            })?;
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> ProbeResult<Vec<ElementHandle>> {
        self.page.query_selector_all(selector).await.map_err(driver_error)
    }

    async fn inner_text(&self, handle: &ElementHandle) -> ProbeResult<String> {
        handle.inner_text().await.map_err(driver_error)
    }

    async fn body_text(&self) -> ProbeResult<String> {
        self.page
            .evaluate::<(), String>("document.body ? document.body.innerText : ''", ())
            .await
            .map_err(driver_error)
    }

    async fn is_selected(&self, handle: &ElementHandle) -> ProbeResult<bool> {
        handle.is_checked().await.map_err(driver_error)
    }

    async fn click(&self, handle: &ElementHandle) -> ProbeResult<()> {
        handle.click_builder().click().await.map_err(driver_error)
    }
}

const INPUT_SELECTOR: &str = "input[type=checkbox], input[type=radio]";

/// Labels and groups for every checkbox/radio input, in document order
const DESCRIBE_INPUTS: &str = r#"
(() => Array.from(document.querySelectorAll('input[type=checkbox], input[type=radio]')).map((el) => {
    const text = (node) => (node ? (node.innerText || node.textContent || '').trim() : '');
    const byFor = el.id ? document.querySelector(`label[for="${CSS.escape(el.id)}"]`) : null;
    const label = text(byFor) || text(el.closest('label')) || el.getAttribute('aria-label') || el.value || '';
    const fieldset = el.closest('fieldset');
    const legend = fieldset ? text(fieldset.querySelector('legend')) : '';
    return { kind: el.type, label: label.split('\n')[0].trim(), group: legend || el.name || 'Options' };
}))()
"#;

#[derive(Debug, Deserialize)]
struct InputDescription {
    kind: String,
    label: String,
    group: String,
}

/// Enumerates checkbox and radio inputs as controls
#[derive(Debug, Clone, Copy, Default)]
pub struct InputDiscovery;

#[async_trait]
impl ControlDiscovery<PlaywrightDriver> for InputDiscovery {
    async fn discover(&self, driver: &PlaywrightDriver) -> ProbeResult<Vec<Control<ElementHandle>>> {
        let descriptions: Vec<InputDescription> = driver
            .page
            .evaluate::<(), Vec<InputDescription>>(DESCRIBE_INPUTS, ())
            .await
            .map_err(driver_error)?;
        let handles = driver.query_all(INPUT_SELECTOR).await?;

        if descriptions.len() != handles.len() {
            warn!(
                "Input count changed during discovery ({} described, {} found)",
                descriptions.len(),
                handles.len()
            );
        }

        let controls: Vec<_> = descriptions
            .into_iter()
            .zip(handles)
            .map(|(description, handle)| {
                let control_type = match description.kind.as_str() {
                    "checkbox" => ControlType::Checkbox,
                    "radio" => ControlType::Radio,
                    _ => ControlType::Other,
                };
                Control::new(description.group, description.label, control_type, handle)
            })
            .collect();

        info!("Discovered {} input controls", controls.len());
        Ok(controls)
    }
}
