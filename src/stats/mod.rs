//! Hub and session statistics

pub mod metrics;

pub use metrics::{HubStats, HubStatsSnapshot, SessionStats};
