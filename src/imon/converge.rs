//! Global expectation convergence.
//!
//! The newest `global_expect_updated` across the known rows wins. A peer row
//! strictly newer than the local one is adopted; equal or older rows are
//! ignored, so replays never change the local expectation.
//!
//! A peer that cleared its expectation keeps the orchestration stamp: adopting
//! it only advances the local clock and drops an older local expectation.

use super::worker::MonitorActor;
use crate::model::{GlobalExpect, GlobalExpectOptions};

impl MonitorActor {
    pub(super) fn converge_global_expect_from_remote(&mut self) {
        let local = self.state.global_expect_updated;
        let newest = self
            .instance_monitor
            .iter()
            .filter(|(_, m)| m.global_expect_updated > local)
            .max_by(|(_, a), (_, b)| {
                a.global_expect_updated
                    .cmp(&b.global_expect_updated)
                    .then_with(|| (!a.global_expect.is_none()).cmp(&!b.global_expect.is_none()))
            });
        let Some((node, peer)) = newest else {
            return;
        };
        let (node, peer) = (node.clone(), std::sync::Arc::clone(peer));

        self.state.global_expect_updated = peer.global_expect_updated;
        self.state.orchestration_id = peer.orchestration_id;
        if peer.global_expect.is_none() {
            if !self.state.global_expect.is_none() {
                tracing::debug!(peer = %node, "drop global expect {}, cleared by peer", self.state.global_expect);
            }
            self.state.global_expect = GlobalExpect::None;
            self.state.global_expect_options = GlobalExpectOptions::default();
            self.state.orchestration_is_done = true;
        } else {
            tracing::info!(peer = %node, "adopt global expect {}", peer.global_expect);
            self.state.global_expect = peer.global_expect;
            self.state.global_expect_options = peer.global_expect_options.clone();
            self.state.orchestration_is_done = false;
            self.cancel_ready();
        }
    }

    /// No peer row carries a newer expectation than the local one.
    pub(super) fn is_converged_global_expect(&self) -> bool {
        self.instance_monitor
            .values()
            .all(|m| m.global_expect_updated <= self.state.global_expect_updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceMonitor;
    use crate::testing::Harness;
    use chrono::{TimeDelta, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn peer(ge: GlobalExpect, at: chrono::DateTime<chrono::Utc>) -> Arc<InstanceMonitor> {
        Arc::new(InstanceMonitor {
            global_expect: ge,
            global_expect_updated: at,
            orchestration_id: Some(Uuid::new_v4()),
            ..Default::default()
        })
    }

    #[test]
    fn adopts_strictly_newer_peer_expectation() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        let at = Utc::now();
        let row = peer(GlobalExpect::Stopped, at);
        n1.instance_monitor.insert("n2".into(), Arc::clone(&row));
        assert!(!n1.is_converged_global_expect());

        n1.converge_global_expect_from_remote();
        assert_eq!(n1.state.global_expect, GlobalExpect::Stopped);
        assert_eq!(n1.state.global_expect_updated, at);
        assert_eq!(n1.state.orchestration_id, row.orchestration_id);
        assert!(n1.is_converged_global_expect());
    }

    #[test]
    fn replaying_an_update_is_idempotent() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        let at = Utc::now();
        n1.instance_monitor
            .insert("n2".into(), peer(GlobalExpect::Frozen, at));
        n1.converge_global_expect_from_remote();

        n1.state.global_expect = GlobalExpect::Thawed;
        n1.state.global_expect_updated = at + TimeDelta::seconds(1);
        for _ in 0..2 {
            n1.instance_monitor
                .insert("n2".into(), peer(GlobalExpect::Frozen, at));
            n1.converge_global_expect_from_remote();
            assert_eq!(n1.state.global_expect, GlobalExpect::Thawed);
        }
    }

    #[test]
    fn newest_of_several_peers_wins() {
        let h = Harness::new(&["n1", "n2", "n3"]);
        let mut n1 = h.actor("n1", h.failover_config());
        let at = Utc::now();
        n1.instance_monitor
            .insert("n2".into(), peer(GlobalExpect::Started, at));
        n1.instance_monitor.insert(
            "n3".into(),
            peer(GlobalExpect::Stopped, at + TimeDelta::seconds(2)),
        );
        n1.converge_global_expect_from_remote();
        assert_eq!(n1.state.global_expect, GlobalExpect::Stopped);
    }

    #[test]
    fn cleared_peer_only_advances_the_clock() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        let at = Utc::now();
        n1.instance_monitor
            .insert("n2".into(), peer(GlobalExpect::None, at));
        n1.converge_global_expect_from_remote();
        assert!(n1.state.global_expect.is_none());
        assert_eq!(n1.state.global_expect_updated, at);
        assert!(n1.is_converged_global_expect());
    }
}
