//! # Instance configuration
//!
//! Declared intent for one object. The snapshot is immutable and replaced
//! wholesale when the object configuration changes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::ObjectPath;

/// How many instances of an object may run at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// One active instance.
    #[default]
    Failover,
    /// `flex_target` concurrently active instances.
    Flex,
}

/// Ordering of candidate nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicy {
    #[default]
    NodesOrder,
    Spread,
    Score,
    Shift,
    LoadAvg,
}

/// Whether the monitor starts the object on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrateMode {
    /// Only act on operator-set global expectations.
    #[default]
    No,
    /// Start the object on the HA leader whenever it is not started.
    Ha,
}

/// Action taken when a monitored resource exhausted its restart budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorAction {
    #[default]
    None,
    Crash,
    Reboot,
    #[serde(rename = "freezestop")]
    FreezeStop,
    Switch,
}

impl MonitorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorAction::None => "none",
            MonitorAction::Crash => "crash",
            MonitorAction::Reboot => "reboot",
            MonitorAction::FreezeStop => "freezestop",
            MonitorAction::Switch => "switch",
        }
    }
}

/// Per-resource restart settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Restart budget; `0` disables automatic restarts.
    #[serde(default)]
    pub restart: u32,
    /// Minimum delay between two restarts of this resource.
    #[serde(default, with = "crate::config::secs")]
    pub restart_delay: Duration,
    #[serde(default)]
    pub is_standby: bool,
    #[serde(default)]
    pub is_disabled: bool,
}

/// Configuration snapshot of one object as seen by one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub path: ObjectPath,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub placement: PlacementPolicy,
    #[serde(default)]
    pub orchestrate: OrchestrateMode,
    #[serde(default = "one")]
    pub flex_min: usize,
    #[serde(default = "one")]
    pub flex_max: usize,
    #[serde(default = "one")]
    pub flex_target: usize,
    /// Nodes allowed to run an instance, in declared order.
    pub scope: Vec<String>,
    #[serde(default)]
    pub monitor_action: MonitorAction,
    /// Command run before the monitor action, whitespace separated.
    #[serde(default)]
    pub pre_monitor_action: Option<String>,
    /// Refuse failover takeover while a dropped peer was up.
    #[serde(default)]
    pub stonith: bool,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceConfig>,
}

fn one() -> usize {
    1
}

fn default_priority() -> u32 {
    50
}

impl InstanceConfig {
    /// A failover service with the given scope and default settings.
    pub fn new(path: ObjectPath, scope: Vec<String>) -> Self {
        Self {
            path,
            topology: Topology::Failover,
            placement: PlacementPolicy::NodesOrder,
            orchestrate: OrchestrateMode::No,
            flex_min: 1,
            flex_max: 1,
            flex_target: 1,
            scope,
            monitor_action: MonitorAction::None,
            pre_monitor_action: None,
            stonith: false,
            priority: default_priority(),
            resources: BTreeMap::new(),
        }
    }

    /// Number of instances that should run.
    pub fn leader_count(&self) -> usize {
        match self.topology {
            Topology::Failover => 1,
            Topology::Flex => self.flex_target,
        }
    }

    pub fn is_failover(&self) -> bool {
        self.topology == Topology::Failover
    }

    pub fn in_scope(&self, node: &str) -> bool {
        self.scope.iter().any(|n| n == node)
    }

    /// Checks the flex bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.topology == Topology::Flex
            && !(self.flex_min <= self.flex_target && self.flex_target <= self.flex_max)
        {
            return Err(format!(
                "flex bounds violated: min={} target={} max={}",
                self.flex_min, self.flex_target, self.flex_max
            ));
        }
        if self.scope.is_empty() {
            return Err("empty scope".to_string());
        }
        Ok(())
    }
}
