//! Browser-driver boundary.
//!
//! The core never owns a browser session or DOM identity. It consumes a
//! [`PageDriver`] capability set, borrows [`Control`]s produced by a
//! [`ControlDiscovery`] collaborator, and waits through a [`SettleClock`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod controls;
#[cfg(feature = "browser")]
pub mod playwright;
#[cfg(test)]
pub(crate) mod fake;

pub use controls::ControlFilter;

use crate::error::ProbeResult;

/// Kind of interactive element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Checkbox,
    Radio,
    Select,
    Other,
}

/// An interactive page element whose state may affect price.
///
/// `handle` belongs to the driver; the core only passes it back.
#[derive(Debug, Clone)]
pub struct Control<H> {
    pub label: String,
    pub group: String,
    pub control_type: ControlType,
    pub handle: H,
}

impl<H> Control<H> {
    pub fn new(group: impl Into<String>, label: impl Into<String>, control_type: ControlType, handle: H) -> Self {
        Self {
            label: label.into(),
            group: group.into(),
            control_type,
            handle,
        }
    }

    /// Key used in `PricingModel::option_deltas`
    pub fn key(&self) -> String {
        format!("{}.{}", self.group, self.label)
    }
}

/// Capabilities the core needs from a live page
#[async_trait]
pub trait PageDriver: Send + Sync {
    type Handle: Send + Sync;

    async fn navigate(&self, url: &str) -> ProbeResult<()>;

    /// All elements matching a CSS selector, in document order
    async fn query_all(&self, selector: &str) -> ProbeResult<Vec<Self::Handle>>;

    async fn inner_text(&self, handle: &Self::Handle) -> ProbeResult<String>;

    /// Visible text of the whole page
    async fn body_text(&self) -> ProbeResult<String>;

    /// Whether the control currently reads as selected
    async fn is_selected(&self, handle: &Self::Handle) -> ProbeResult<bool>;

    async fn click(&self, handle: &Self::Handle) -> ProbeResult<()>;
}

/// External page-analysis collaborator that enumerates controls
#[async_trait]
pub trait ControlDiscovery<D: PageDriver>: Send + Sync {
    async fn discover(&self, driver: &D) -> ProbeResult<Vec<Control<D::Handle>>>;
}

/// Waits out client-side re-render after a simulated UI action
#[async_trait]
pub trait SettleClock: Send + Sync {
    async fn settle(&self, duration: Duration);
}

/// Real-time settle waits on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl SettleClock for TokioClock {
    async fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
