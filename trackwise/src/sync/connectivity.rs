//! Connectivity readings delivered to the sync pipeline.

use serde::{Deserialize, Serialize};

use crate::policy::{NetworkCost, NetworkQuality};

/// Link type reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    #[default]
    None,
    Wifi,
    Cellular,
    Other,
}

/// Snapshot of the current network link.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub kind: ConnectionKind,
    /// Quality reported by the platform, if any.
    #[serde(default)]
    pub quality: Option<NetworkQuality>,
    #[serde(default)]
    pub cost: NetworkCost,
    /// Platform estimate of link bandwidth, used to seed the monitor.
    #[serde(default)]
    pub bandwidth_kbps: Option<f64>,
}

impl ConnectivityState {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn online(kind: ConnectionKind, quality: NetworkQuality) -> Self {
        Self {
            kind,
            quality: Some(quality),
            cost: match kind {
                ConnectionKind::Cellular => NetworkCost::Metered,
                _ => NetworkCost::Free,
            },
            bandwidth_kbps: None,
        }
    }

    pub fn with_cost(mut self, cost: NetworkCost) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_bandwidth_kbps(mut self, kbps: f64) -> Self {
        self.bandwidth_kbps = Some(kbps);
        self
    }

    pub fn is_online(&self) -> bool {
        self.kind != ConnectionKind::None
    }

    pub fn is_metered(&self) -> bool {
        self.cost == NetworkCost::Metered
    }
}
