//! Rule-Based Risk Engine
//!
//! Maps the latest temperature, vibration and current values of a machine
//! to a coarse risk tier, and tallies tiers for the dashboard.

mod rules;
mod summary;

pub use rules::{classify, RiskLevel, RiskThresholds, DANGER, WATCH};
pub use summary::RiskSummary;
