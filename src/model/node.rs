//! Node-level data consumed by the instance monitors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node-wide status flags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node freeze timestamp, `None` when not frozen.
    #[serde(default)]
    pub frozen_at: Option<DateTime<Utc>>,
}

impl NodeStatus {
    pub fn is_frozen(&self) -> bool {
        self.frozen_at.is_some()
    }
}

/// State of the node monitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMonitorState {
    #[default]
    Zero,
    Idle,
    Rejoin,
    Draining,
    DrainFailed,
    Drained,
    Shutting,
    Maintenance,
    Upgrade,
}

impl NodeMonitorState {
    /// Only idle nodes may be ranked for HA placement.
    pub fn is_rankable(&self) -> bool {
        matches!(self, NodeMonitorState::Idle)
    }
}

/// Node monitor row as published by the node daemon.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMonitor {
    pub state: NodeMonitorState,
}

/// Node load statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Higher is better.
    pub score: u64,
    #[serde(default)]
    pub load_15m: f64,
}

/// Node configuration keys relevant to instance orchestration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Overrides the monitor's ready period when set.
    #[serde(default, with = "crate::config::secs_opt")]
    pub ready_period: Option<Duration>,
}
