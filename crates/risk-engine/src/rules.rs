//! Risk Rules

use serde::{Deserialize, Serialize};

/// Risk tier of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// No sensor values available
    Unknown,
    Normal,
    Watch,
    Danger,
}

impl RiskLevel {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "Unknown",
            RiskLevel::Normal => "Normal",
            RiskLevel::Watch => "Watch",
            RiskLevel::Danger => "Danger",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bounds a value must strictly exceed to enter a tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    /// Air temperature (K)
    pub temperature: f64,
    /// Rotational speed (RPM)
    pub vibration: f64,
    /// Torque (Nm)
    pub current: f64,
}

impl RiskThresholds {
    fn exceeded_by(
        &self,
        temperature: Option<f64>,
        vibration: Option<f64>,
        current: Option<f64>,
    ) -> bool {
        temperature.is_some_and(|t| t > self.temperature)
            || vibration.is_some_and(|v| v > self.vibration)
            || current.is_some_and(|c| c > self.current)
    }
}

pub const DANGER: RiskThresholds = RiskThresholds {
    temperature: 315.0,
    vibration: 2200.0,
    current: 85.0,
};

pub const WATCH: RiskThresholds = RiskThresholds {
    temperature: 305.0,
    vibration: 1600.0,
    current: 65.0,
};

/// Classify the latest sensor values.
///
/// `vibration` is fed from rotational speed and `current` from torque. A
/// missing value never triggers its own rule but does not mask the others.
pub fn classify(
    temperature: Option<f64>,
    vibration: Option<f64>,
    current: Option<f64>,
) -> RiskLevel {
    if temperature.is_none() && vibration.is_none() && current.is_none() {
        return RiskLevel::Unknown;
    }

    if DANGER.exceeded_by(temperature, vibration, current) {
        RiskLevel::Danger
    } else if WATCH.exceeded_by(temperature, vibration, current) {
        RiskLevel::Watch
    } else {
        RiskLevel::Normal
    }
}
