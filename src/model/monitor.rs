//! # Instance monitor row
//!
//! The monitor's own view of one instance, replicated cluster-wide through the
//! bus. The local monitor owns its row; peer rows are read-only projections.
//!
//! ## State enumeration
//! ```text
//! Idle ─┬─► Starting ──────► Started | StartFailed
//!       ├─► Stopping ──────► Stopped | StopFailed
//!       ├─► Freezing ──────► Frozen | FreezeFailed
//!       ├─► Unfreezing ────► Unfrozen | UnfreezeFailed
//!       ├─► Thawing ───────► Thawed | ThawFailed
//!       ├─► Provisioning ──► Provisioned | ProvisionFailed
//!       ├─► Unprovisioning ► Unprovisioned | UnprovisionFailed
//!       ├─► Deleting ──────► Deleted | DeleteFailed
//!       ├─► Shutting ──────► Shutdown | ShutdownFailed
//!       ├─► WaitLeader | WaitNonLeader | WaitPriors | WaitChildren
//!       └─► Ready | Running | Restarted
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RequestError;

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RequestError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(RequestError::Unknown {
                        what: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Current orchestration state of one instance.
    pub enum MonitorState {
        #[default]
        Idle => "idle",
        Starting => "starting",
        Started => "started",
        StartFailed => "start failed",
        Stopping => "stopping",
        Stopped => "stopped",
        StopFailed => "stop failed",
        Freezing => "freezing",
        Frozen => "frozen",
        FreezeFailed => "freeze failed",
        Unfreezing => "unfreezing",
        Unfrozen => "unfrozen",
        UnfreezeFailed => "unfreeze failed",
        Thawing => "thawing",
        Thawed => "thawed",
        ThawFailed => "thaw failed",
        Provisioning => "provisioning",
        Provisioned => "provisioned",
        ProvisionFailed => "provision failed",
        Unprovisioning => "unprovisioning",
        Unprovisioned => "unprovisioned",
        UnprovisionFailed => "unprovision failed",
        Deleting => "deleting",
        Deleted => "deleted",
        DeleteFailed => "delete failed",
        Shutting => "shutting",
        Shutdown => "shutdown",
        ShutdownFailed => "shutdown failed",
        WaitChildren => "wait children",
        WaitPriors => "wait priors",
        WaitLeader => "wait leader",
        WaitNonLeader => "wait non-leader",
        Restarted => "restarted",
        Ready => "ready",
        Running => "running",
        BootFailed => "boot failed",
    }
}

impl MonitorState {
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            MonitorState::StartFailed
                | MonitorState::StopFailed
                | MonitorState::FreezeFailed
                | MonitorState::UnfreezeFailed
                | MonitorState::ThawFailed
                | MonitorState::ProvisionFailed
                | MonitorState::UnprovisionFailed
                | MonitorState::DeleteFailed
                | MonitorState::ShutdownFailed
                | MonitorState::BootFailed
        )
    }

    /// An action with external side effects is in flight.
    pub fn is_doing(&self) -> bool {
        matches!(
            self,
            MonitorState::Starting
                | MonitorState::Stopping
                | MonitorState::Freezing
                | MonitorState::Unfreezing
                | MonitorState::Thawing
                | MonitorState::Provisioning
                | MonitorState::Unprovisioning
                | MonitorState::Deleting
                | MonitorState::Shutting
                | MonitorState::Running
        )
    }

    /// The instance start failed on this node; excluded from leader ranking.
    pub fn is_start_failed(&self) -> bool {
        matches!(self, MonitorState::StartFailed | MonitorState::BootFailed)
    }
}

string_enum! {
    /// Per-node intent flag.
    pub enum LocalExpect {
        #[default]
        None => "none",
        Started => "started",
        Shutdown => "shutdown",
    }
}

string_enum! {
    /// Cluster-wide converged operator intent.
    pub enum GlobalExpect {
        #[default]
        None => "none",
        Aborted => "aborted",
        Deleted => "deleted",
        Frozen => "frozen",
        Thawed => "thawed",
        Placed => "placed",
        PlacedAt => "placed@",
        Provisioned => "provisioned",
        Purged => "purged",
        Restarted => "restarted",
        Started => "started",
        Stopped => "stopped",
        Unprovisioned => "unprovisioned",
    }
}

impl GlobalExpect {
    pub fn is_none(&self) -> bool {
        *self == GlobalExpect::None
    }
}

/// Extra arguments of a global expectation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalExpectOptions {
    /// Destination nodes of a `placed@` expectation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination: Vec<String>,
}

/// Restart bookkeeping of one resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartMonitor {
    /// Remaining automatic restarts in the current episode.
    pub remaining: u32,
    #[serde(default)]
    pub last_at: Option<DateTime<Utc>>,
    /// A delayed restart is armed.
    #[serde(default)]
    pub pending: bool,
}

/// Per-resource monitor data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMonitor {
    pub restart: RestartMonitor,
}

/// The replicated monitor row of one instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceMonitor {
    pub state: MonitorState,
    pub state_updated: DateTime<Utc>,

    pub local_expect: LocalExpect,
    pub local_expect_updated: DateTime<Utc>,

    pub global_expect: GlobalExpect,
    pub global_expect_updated: DateTime<Utc>,
    #[serde(default)]
    pub global_expect_options: GlobalExpectOptions,

    pub is_leader: bool,
    pub is_ha_leader: bool,

    /// Identifies the orchestration driven by the current global expectation.
    #[serde(default)]
    pub orchestration_id: Option<Uuid>,
    #[serde(default)]
    pub orchestration_is_done: bool,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceMonitor>,

    pub session_id: Uuid,
    #[serde(default)]
    pub monitor_action_executed_at: Option<DateTime<Utc>>,

    /// Peers observed dropping while their instance was up.
    #[serde(default)]
    pub peer_drops: BTreeMap<String, DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl InstanceMonitor {
    /// True when this row reports the orchestration `id` reached locally.
    pub fn is_done_with(&self, id: Option<Uuid>) -> bool {
        self.orchestration_is_done && id.is_some() && self.orchestration_id == id
    }
}

/// Operator request to change an instance monitor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorUpdate {
    #[serde(default)]
    pub state: Option<MonitorState>,
    #[serde(default)]
    pub local_expect: Option<LocalExpect>,
    #[serde(default)]
    pub global_expect: Option<GlobalExpect>,
    #[serde(default)]
    pub global_expect_options: Option<GlobalExpectOptions>,
    /// Caller-chosen orchestration id, generated when absent.
    #[serde(default)]
    pub orchestration_id: Option<Uuid>,
}

impl MonitorUpdate {
    pub fn global_expect(ge: GlobalExpect) -> Self {
        Self {
            global_expect: Some(ge),
            ..Default::default()
        }
    }

    pub fn placed_at(destination: Vec<String>) -> Self {
        Self {
            global_expect: Some(GlobalExpect::PlacedAt),
            global_expect_options: Some(GlobalExpectOptions { destination }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_forms_round_trip_through_from_str() {
        for st in [
            MonitorState::Idle,
            MonitorState::WaitNonLeader,
            MonitorState::StartFailed,
        ] {
            assert_eq!(st.as_str().parse::<MonitorState>().unwrap(), st);
        }
        assert_eq!("placed@".parse::<GlobalExpect>().unwrap(), GlobalExpect::PlacedAt);
    }

    #[test]
    fn unknown_global_expect_is_rejected() {
        let err = "sideways".parse::<GlobalExpect>().unwrap_err();
        assert_eq!(err.as_label(), "request_unknown");
    }

    #[test]
    fn failed_and_doing_are_disjoint() {
        let all = [
            MonitorState::Starting,
            MonitorState::StartFailed,
            MonitorState::Stopping,
            MonitorState::StopFailed,
            MonitorState::Ready,
            MonitorState::Running,
        ];
        for st in all {
            assert!(!(st.is_failed() && st.is_doing()), "{st}");
        }
    }

    #[test]
    fn done_requires_matching_orchestration() {
        let id = Uuid::new_v4();
        let m = InstanceMonitor {
            orchestration_id: Some(id),
            orchestration_is_done: true,
            ..Default::default()
        };
        assert!(m.is_done_with(Some(id)));
        assert!(!m.is_done_with(Some(Uuid::new_v4())));
        assert!(!m.is_done_with(None));
    }
}
