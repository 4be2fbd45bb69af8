//! Hub status and statistics

pub mod metrics;

pub use metrics::{HubMetrics, HubStats, HubStatus};
