//! # Instance status
//!
//! Observed reality for one `(object, node)` pair, produced by the external
//! `status -r` action and consumed read-only by the monitor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability of an instance or a resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Avail {
    Up,
    Down,
    Warn,
    #[serde(rename = "stdby up")]
    StandbyUp,
    #[serde(rename = "stdby down")]
    StandbyDown,
    #[serde(rename = "n/a")]
    NotApplicable,
    #[default]
    Undef,
}

impl Avail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Avail::Up => "up",
            Avail::Down => "down",
            Avail::Warn => "warn",
            Avail::StandbyUp => "stdby up",
            Avail::StandbyDown => "stdby down",
            Avail::NotApplicable => "n/a",
            Avail::Undef => "undef",
        }
    }

    /// Up or standby-up: nothing to restart.
    pub fn is_up_like(&self) -> bool {
        matches!(self, Avail::Up | Avail::StandbyUp)
    }

    /// Not applicable or not evaluated yet.
    pub fn is_na(&self) -> bool {
        matches!(self, Avail::NotApplicable | Avail::Undef)
    }
}

/// Provisioned state of an instance or a resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provisioned {
    True,
    False,
    Mixed,
    #[serde(rename = "n/a")]
    NotApplicable,
    #[default]
    Undef,
}

impl Provisioned {
    pub fn is_provisioned(&self) -> bool {
        matches!(self, Provisioned::True | Provisioned::NotApplicable)
    }

    /// Aggregate several provisioned states, ignoring not-applicable ones.
    pub fn aggregate<I: IntoIterator<Item = Provisioned>>(states: I) -> Provisioned {
        let mut acc = Provisioned::NotApplicable;
        for state in states {
            acc = match (acc, state) {
                (_, Provisioned::NotApplicable) => acc,
                (Provisioned::NotApplicable, s) => s,
                (a, s) if a == s => a,
                _ => Provisioned::Mixed,
            };
        }
        acc
    }
}

/// A file owned by a resource, synchronized from peers when it differs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFile {
    /// Absolute path of the file on the node.
    pub name: String,
    /// Hex encoded sha256 of the content.
    pub checksum: String,
    pub mtime: DateTime<Utc>,
}

/// Status of one resource of an instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub status: Avail,
    #[serde(default)]
    pub provisioned: Provisioned,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ResourceFile>,
}

/// Observed status of one instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub avail: Avail,
    #[serde(default)]
    pub overall: Avail,
    #[serde(default)]
    pub provisioned: Provisioned,
    /// Freeze timestamp, `None` when not frozen.
    #[serde(default)]
    pub frozen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceStatus>,
    /// Resources with an action currently in flight.
    #[serde(default)]
    pub running: Vec<String>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl InstanceStatus {
    pub fn is_frozen(&self) -> bool {
        self.frozen_at.is_some()
    }

    pub fn is_up(&self) -> bool {
        self.avail == Avail::Up
    }

    /// Up or warn: some resources are running.
    pub fn is_started(&self) -> bool {
        matches!(self.avail, Avail::Up | Avail::Warn)
    }

    /// Down, standby or not applicable: no primary resource is running.
    pub fn is_stopped(&self) -> bool {
        matches!(
            self.avail,
            Avail::Down | Avail::StandbyUp | Avail::StandbyDown | Avail::NotApplicable
        )
    }

    pub fn resource_file(&self, rid: &str, name: &str) -> Option<&ResourceFile> {
        self.resources
            .get(rid)?
            .files
            .iter()
            .find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioned_aggregate() {
        use Provisioned::*;
        assert_eq!(Provisioned::aggregate([True, True]), True);
        assert_eq!(Provisioned::aggregate([True, NotApplicable, True]), True);
        assert_eq!(Provisioned::aggregate([True, False]), Mixed);
        assert_eq!(Provisioned::aggregate([False]), False);
        assert_eq!(Provisioned::aggregate([]), NotApplicable);
    }

    #[test]
    fn avail_wire_names() {
        let s = serde_json::to_string(&Avail::StandbyUp).unwrap();
        assert_eq!(s, "\"stdby up\"");
        let a: Avail = serde_json::from_str("\"n/a\"").unwrap();
        assert_eq!(a, Avail::NotApplicable);
    }

    #[test]
    fn stopped_and_started_are_exclusive() {
        for avail in [Avail::Up, Avail::Down, Avail::Warn, Avail::StandbyUp, Avail::NotApplicable] {
            let st = InstanceStatus {
                avail,
                ..Default::default()
            };
            assert!(!(st.is_started() && st.is_stopped()), "{avail:?}");
        }
    }
}
