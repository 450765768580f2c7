//! Device and environment signals consumed by the policy engine.
//!
//! Each signal is a small closed category. Sources that cannot report a
//! signal deliver `None`; the engine substitutes the lowest-information
//! default (see [`PolicyInputs`](super::PolicyInputs)).

use serde::{Deserialize, Serialize};

/// Battery charge category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryLevel {
    Critical,
    Low,
    Medium,
    High,
    Full,
}

/// Charge percentage below which the battery is critical.
pub const BATTERY_CRITICAL_BELOW: f32 = 10.0;
/// Charge percentage below which the battery is low.
pub const BATTERY_LOW_BELOW: f32 = 20.0;
/// Charge percentage below which the battery is medium.
pub const BATTERY_MEDIUM_BELOW: f32 = 60.0;
/// Charge percentage below which the battery is high (full at or above).
pub const BATTERY_HIGH_BELOW: f32 = 90.0;

impl BatteryLevel {
    pub const ALL: [BatteryLevel; 5] = [
        BatteryLevel::Critical,
        BatteryLevel::Low,
        BatteryLevel::Medium,
        BatteryLevel::High,
        BatteryLevel::Full,
    ];

    /// Classify a raw battery reading.
    ///
    /// A charging device is never treated as critical or low. Returns `None`
    /// when the percentage is missing or out of range.
    pub fn from_reading(percent: Option<f32>, charging: bool) -> Option<Self> {
        let percent = percent.filter(|p| p.is_finite() && (0.0..=100.0).contains(p))?;

        let level = if percent < BATTERY_CRITICAL_BELOW {
            BatteryLevel::Critical
        } else if percent < BATTERY_LOW_BELOW {
            BatteryLevel::Low
        } else if percent < BATTERY_MEDIUM_BELOW {
            BatteryLevel::Medium
        } else if percent < BATTERY_HIGH_BELOW {
            BatteryLevel::High
        } else {
            BatteryLevel::Full
        };

        if charging && level < BatteryLevel::Medium {
            Some(BatteryLevel::Medium)
        } else {
            Some(level)
        }
    }
}

/// Device thermal pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalState {
    Normal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    pub const ALL: [ThermalState; 4] = [
        ThermalState::Normal,
        ThermalState::Fair,
        ThermalState::Serious,
        ThermalState::Critical,
    ];
}

/// Application lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Foreground,
    Background,
    Suspended,
}

impl AppState {
    pub const ALL: [AppState; 3] = [AppState::Foreground, AppState::Background, AppState::Suspended];
}

/// Observed network quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl NetworkQuality {
    pub const ALL: [NetworkQuality; 4] = [
        NetworkQuality::Poor,
        NetworkQuality::Fair,
        NetworkQuality::Good,
        NetworkQuality::Excellent,
    ];

    /// Classify a bandwidth estimate in kbit/s.
    pub fn from_bandwidth_kbps(kbps: f64) -> Self {
        if kbps < 150.0 {
            NetworkQuality::Poor
        } else if kbps < 1_000.0 {
            NetworkQuality::Fair
        } else if kbps < 10_000.0 {
            NetworkQuality::Good
        } else {
            NetworkQuality::Excellent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkQuality::Poor => "poor",
            NetworkQuality::Fair => "fair",
            NetworkQuality::Good => "good",
            NetworkQuality::Excellent => "excellent",
        }
    }
}

impl std::fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether traffic on the current connection costs the user money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkCost {
    #[default]
    Free,
    Metered,
}

/// A raw reading from the battery/thermal source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerReading {
    /// Charge percentage (0-100), if known.
    pub battery_percent: Option<f32>,
    #[serde(default)]
    pub charging: bool,
    pub thermal: Option<ThermalState>,
}

impl PowerReading {
    pub fn battery_level(&self) -> Option<BatteryLevel> {
        BatteryLevel::from_reading(self.battery_percent, self.charging)
    }
}
