//! Plain HTTP page fetch that feeds the detector.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use scraper::{Html, Node, Selector};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::error::{ProbeError, ProbeResult};

/// Elements whose text is never visible
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, Serialize)]
pub struct FetchedPage {
    pub url: String,
    /// After redirects
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    #[serde(skip_serializing)]
    pub markup: String,
    /// Lowercase visible text, one line per text block
    #[serde(skip_serializing)]
    pub text: String,
    pub fetch_ms: u64,
}

pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(config: &FetchConfig) -> ProbeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> ProbeResult<FetchedPage> {
        let started = Instant::now();
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpRequest {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let markup = response.text().await?;
        let text = visible_text(&markup)?;

        let fetch_ms = started.elapsed().as_millis() as u64;
        info!("Fetched {} ({} bytes, {}ms)", final_url, markup.len(), fetch_ms);

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            content_type,
            markup,
            text,
            fetch_ms,
        })
    }
}

/// Lowercase visible body text with blank lines dropped
pub fn visible_text(markup: &str) -> ProbeResult<String> {
    let document = Html::parse_document(markup);
    let body = Selector::parse("body").map_err(|e| ProbeError::parse(format!("Invalid selector: {}", e)))?;

    let Some(root) = document.select(&body).next() else {
        debug!("No <body>; using whole document");
        return Ok(normalize(document.root_element().text()));
    };

    let blocks = root.descendants().filter_map(|node| {
        let Node::Text(text) = node.value() else {
            return None;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map_or(false, |element| INVISIBLE_ELEMENTS.contains(&element.name()));
        if hidden {
            None
        } else {
            Some(&**text)
        }
    });

    Ok(normalize(blocks))
}

fn normalize<'a>(blocks: impl Iterator<Item = &'a str>) -> String {
    blocks
        .map(|block| block.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_skips_scripts() {
        let markup = r#"<html><head><title>Builder</title></head><body>
            <h1>Build Your   Truck</h1>
            <script>window.__STATE__ = {"price": 1}</script>
            <div class="price">Total: <span>$1,299.00</span></div>
            <style>.price{color:red}</style>
        </body></html>"#;

        let text = visible_text(markup).unwrap();
        assert_eq!(text, "build your truck\ntotal:\n$1,299.00");
    }

    #[test]
    fn test_fetched_option_list_routes_static() {
        let markup = "<html><body><h3>Comfort:</h3>\n<p>- [x] Heated seats (+$300)</p>\
                      <p class=\"price\">$4,999</p></body></html>";
        let text = visible_text(markup).unwrap();

        let detection = crate::detector::ExtractionModeDetector::new()
            .unwrap()
            .detect("https://example.com/van", &text, Some(markup));
        assert!(detection.signals.static_options_found);
        assert_eq!(detection.mode, crate::detector::ExtractionMode::Static);
    }

    #[test]
    fn test_fetcher_builds_from_defaults() {
        assert!(PageFetcher::new(&FetchConfig::default()).is_ok());
    }
}
