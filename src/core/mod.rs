//! Session context and the end-to-end probe for one configurator page.

pub mod pipeline;
pub mod session;

pub use pipeline::{ConfiguratorProbe, PageInput, PriceCrossCheck, ProbeReport, SkipReason};
pub use session::ProbeSession;
