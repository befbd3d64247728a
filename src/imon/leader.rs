//! Leadership of the local instance.
//!
//! - **Leader**: top `N` of the placement ranking over scope nodes with a
//!   known instance status whose monitor did not start-fail.
//! - **HA leader**: same ranking, additionally excluding frozen nodes, frozen
//!   instances and nodes whose node monitor is not rankable.

use std::collections::HashMap;

use super::worker::MonitorActor;
use crate::placement;

impl MonitorActor {
    pub(super) fn update_is_leader(&mut self) {
        let n = self.config.leader_count();
        let leaders = self.ranked(&self.leader_candidates());
        let ha_leaders = self.ranked(&self.ha_leader_candidates());
        self.state.is_leader = placement::top(&leaders, n)
            .iter()
            .any(|node| node.as_str() == &*self.localhost);
        self.state.is_ha_leader = placement::top(&ha_leaders, n)
            .iter()
            .any(|node| node.as_str() == &*self.localhost);
    }

    pub(super) fn leader_candidates(&self) -> Vec<String> {
        self.config
            .scope
            .iter()
            .filter(|node| self.instance_status.contains_key(node.as_str()))
            .filter(|node| {
                !self
                    .monitor_of(node)
                    .is_some_and(|m| m.state.is_start_failed())
            })
            .cloned()
            .collect()
    }

    pub(super) fn ha_leader_candidates(&self) -> Vec<String> {
        self.leader_candidates()
            .into_iter()
            .filter(|node| {
                !self
                    .node_status
                    .get(node)
                    .is_some_and(|s| s.is_frozen())
            })
            .filter(|node| {
                !self
                    .instance_status
                    .get(node)
                    .is_some_and(|s| s.is_frozen())
            })
            .filter(|node| {
                self.node_monitor
                    .get(node)
                    .is_some_and(|m| m.state.is_rankable())
            })
            .collect()
    }

    /// Orders `candidates` by the object placement policy.
    pub(super) fn ranked(&self, candidates: &[String]) -> Vec<String> {
        let scores: HashMap<String, u64> = self
            .node_stats
            .iter()
            .map(|(node, stats)| (node.clone(), stats.score))
            .collect();
        placement::rank(
            self.config.placement,
            &self.path,
            &self.config.scope,
            candidates,
            &scores,
        )
    }

    /// The node acting first in provision and unprovision orchestrations.
    ///
    /// Lowest-sorted node flagged leader, else the lowest-sorted scope node.
    pub(super) fn provisioning_leader(&self) -> Option<String> {
        self.config
            .scope
            .iter()
            .filter(|node| self.monitor_of(node).is_some_and(|m| m.is_leader))
            .min()
            .or_else(|| self.config.scope.iter().min())
            .cloned()
    }

    pub(super) fn is_provisioning_leader(&self) -> bool {
        self.provisioning_leader().as_deref() == Some(&*self.localhost)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        InstanceMonitor, MonitorState, NodeMonitor, NodeMonitorState, NodeStatus, Topology,
    };
    use crate::testing::{Harness, status_down};
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn first_ranked_node_leads_a_failover() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        let mut n2 = h.actor("n2", h.failover_config());
        for actor in [&mut n1, &mut n2] {
            h.seed_cluster(actor, &["n1", "n2"]);
            actor.update_is_leader();
        }
        assert!(n1.state.is_leader && n1.state.is_ha_leader);
        assert!(!n2.state.is_leader && !n2.state.is_ha_leader);
    }

    #[test]
    fn start_failed_node_loses_leadership() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n2 = h.actor("n2", h.failover_config());
        h.seed_cluster(&mut n2, &["n1", "n2"]);
        n2.instance_monitor.insert(
            "n1".into(),
            Arc::new(InstanceMonitor {
                state: MonitorState::StartFailed,
                ..Default::default()
            }),
        );
        n2.update_is_leader();
        assert!(n2.state.is_leader);
    }

    #[test]
    fn frozen_or_draining_nodes_are_not_ha_leaders() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        n1.node_status.insert(
            "n1".into(),
            Arc::new(NodeStatus {
                frozen_at: Some(Utc::now()),
            }),
        );
        n1.update_is_leader();
        assert!(n1.state.is_leader);
        assert!(!n1.state.is_ha_leader);

        let mut n2 = h.actor("n2", h.failover_config());
        h.seed_cluster(&mut n2, &["n1", "n2"]);
        n2.node_monitor.insert(
            "n1".into(),
            Arc::new(NodeMonitor {
                state: NodeMonitorState::Draining,
            }),
        );
        n2.update_is_leader();
        assert!(!n2.state.is_leader);
        assert!(n2.state.is_ha_leader);
    }

    #[test]
    fn flex_target_leaders() {
        let h = Harness::new(&["n1", "n2", "n3"]);
        let mut cfg = (*h.failover_config()).clone();
        cfg.topology = Topology::Flex;
        cfg.flex_min = 1;
        cfg.flex_target = 2;
        cfg.flex_max = 3;
        let cfg = Arc::new(cfg);
        let mut n2 = h.actor("n2", Arc::clone(&cfg));
        let mut n3 = h.actor("n3", cfg);
        for actor in [&mut n2, &mut n3] {
            h.seed_cluster(actor, &["n1", "n2", "n3"]);
            actor.update_is_leader();
        }
        assert!(n2.state.is_leader);
        assert!(!n3.state.is_leader);
    }

    #[test]
    fn unknown_instance_status_is_not_a_candidate() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n2 = h.actor("n2", h.failover_config());
        h.seed_cluster(&mut n2, &["n1", "n2"]);
        n2.instance_status.remove("n1");
        n2.update_is_leader();
        assert!(n2.state.is_leader);
        n2.instance_status
            .insert("n1".into(), Arc::new(status_down()));
        n2.update_is_leader();
        assert!(!n2.state.is_leader);
    }

    #[test]
    fn provisioning_leader_falls_back_to_lowest_scope_node() {
        let h = Harness::new(&["n2", "n1"]);
        let n2 = h.actor("n2", h.failover_config());
        assert_eq!(n2.provisioning_leader().as_deref(), Some("n1"));
    }
}
