use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::capture::NetworkCapture;
use crate::config::CaptureConfig;
use crate::error::ProbeResult;

/// State shared by every pass over one browser session
pub struct ProbeSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    capture: NetworkCapture,
    visited: DashSet<String>,
}

impl ProbeSession {
    pub fn new(config: &CaptureConfig) -> ProbeResult<Self> {
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            capture: NetworkCapture::new(config)?,
            visited: DashSet::new(),
        };
        info!("Probe session {} started", session.id);
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn capture(&self) -> &NetworkCapture {
        &self.capture
    }

    /// Record a page as visited. Returns false if it already was.
    pub fn mark_visited(&self, url: &str) -> bool {
        self.visited.insert(visit_key(url))
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(&visit_key(url))
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Fragments never select a different page
fn visit_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.trim().to_string(),
    }
}
