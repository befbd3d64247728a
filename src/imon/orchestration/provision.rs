//! Provisioned and unprovisioned.
//!
//! The provisioning leader provisions first and non-leaders wait for it.
//! Unprovisioning runs the other way round: non-leaders first, the leader last.

use crate::action::ActionSpec;
use crate::imon::worker::{After, MonitorActor};
use crate::model::{MonitorState, Provisioned};

impl MonitorActor {
    pub(super) fn orchestrate_provisioned(&mut self) {
        let Some(st) = self.local_status() else {
            return;
        };
        if st.provisioned.is_provisioned() {
            if !self.state.state.is_doing() {
                self.done_and_idle();
            }
            return;
        }
        if !matches!(
            self.state.state,
            MonitorState::Idle | MonitorState::WaitLeader
        ) {
            return;
        }

        let leader = self.is_provisioning_leader();
        if !leader {
            let leader_done = self
                .provisioning_leader()
                .and_then(|node| self.instance_status.get(&node))
                .is_some_and(|s| s.provisioned.is_provisioned());
            if !leader_done {
                self.state.state = MonitorState::WaitLeader;
                return;
            }
        }
        let mut spec = ActionSpec::object(&self.path, "provision");
        if leader {
            spec = spec.leader();
        }
        let spec = spec.local().with_timeout(self.ctx.config.action_timeout());
        self.queue_action(
            spec,
            MonitorState::Provisioning,
            MonitorState::Provisioned,
            MonitorState::ProvisionFailed,
            After::Nothing,
        );
    }

    pub(super) fn orchestrate_unprovisioned(&mut self) {
        if self.unprovision_path() {
            self.done_and_idle();
        }
    }

    /// Returns true once the local instance is unprovisioned.
    pub(super) fn unprovision_path(&mut self) -> bool {
        let Some(st) = self.local_status() else {
            return false;
        };
        let unprovisioned = !matches!(st.provisioned, Provisioned::True | Provisioned::Mixed);
        if self.state.state.is_doing() {
            return false;
        }
        if unprovisioned {
            return true;
        }
        if !matches!(
            self.state.state,
            MonitorState::Idle | MonitorState::WaitNonLeader
        ) {
            return false;
        }

        let leader = self.is_provisioning_leader();
        if leader {
            let waiting: Vec<&String> = self
                .config
                .scope
                .iter()
                .filter(|node| node.as_str() != &*self.localhost)
                .filter(|node| {
                    self.instance_status
                        .get(node.as_str())
                        .is_some_and(|s| matches!(s.provisioned, Provisioned::True | Provisioned::Mixed))
                })
                .collect();
            if !waiting.is_empty() {
                if self.state.state != MonitorState::WaitNonLeader {
                    tracing::info!(?waiting, "wait for non-leaders to unprovision");
                }
                self.state.state = MonitorState::WaitNonLeader;
                return false;
            }
        }
        let mut spec = ActionSpec::object(&self.path, "unprovision");
        if leader {
            spec = spec.leader();
        }
        let spec = spec.local().with_timeout(self.ctx.config.action_timeout());
        self.queue_action(
            spec,
            MonitorState::Unprovisioning,
            MonitorState::Unprovisioned,
            MonitorState::UnprovisionFailed,
            After::Nothing,
        );
        false
    }
}
