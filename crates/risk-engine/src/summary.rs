//! Dashboard Tally

use crate::RiskLevel;
use serde::Serialize;

/// Per-tier machine counts for the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskSummary {
    pub total: usize,
    pub failure_count: usize,
    pub warning_count: usize,
    pub normal_count: usize,
}

impl RiskSummary {
    /// Count one machine; `Unknown` is reported as normal
    pub fn record(&mut self, level: RiskLevel) {
        self.total += 1;
        match level {
            RiskLevel::Danger => self.failure_count += 1,
            RiskLevel::Watch => self.warning_count += 1,
            RiskLevel::Normal | RiskLevel::Unknown => self.normal_count += 1,
        }
    }
}

impl FromIterator<RiskLevel> for RiskSummary {
    fn from_iter<I: IntoIterator<Item = RiskLevel>>(iter: I) -> Self {
        let mut summary = Self::default();
        for level in iter {
            summary.record(level);
        }
        summary
    }
}
