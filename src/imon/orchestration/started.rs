//! Started: unfreeze everywhere, start on the leaders after the ready window.

use crate::action::ActionSpec;
use crate::imon::worker::MonitorActor;
use crate::model::{GlobalExpect, LocalExpect, MonitorState};

impl MonitorActor {
    pub(super) async fn orchestrate_started(&mut self) {
        let object = self.object_status();
        if self.is_object_started(&object) {
            self.cancel_ready();
            if !self.state.state.is_doing() {
                self.done_and_idle();
            }
            return;
        }
        self.start_path().await;
    }

    /// Whether this node should run the instance for the current expectation.
    pub(in crate::imon) fn is_start_target(&self) -> bool {
        match self.state.global_expect {
            GlobalExpect::None => self.state.is_ha_leader,
            GlobalExpect::Placed | GlobalExpect::PlacedAt => self.is_target_node(&self.localhost),
            _ => self.state.is_leader,
        }
    }

    /// Placement target of a `placed` or `placed@` expectation.
    pub(super) fn is_target_node(&self, node: &str) -> bool {
        match self.state.global_expect {
            GlobalExpect::PlacedAt => self
                .state
                .global_expect_options
                .destination
                .iter()
                .any(|n| n == node),
            _ => self.monitor_of(node).is_some_and(|m| m.is_leader),
        }
    }

    /// A start succeeded and the status did not catch up yet.
    pub(super) fn awaits_started_status(&self) -> bool {
        self.state.local_expect == LocalExpect::Started && !self.local_is_started()
    }

    /// Unfreeze, then arm the ready window on a start target.
    pub(super) async fn start_path(&mut self) {
        if self.local_status().is_none() {
            return;
        }
        match self.state.state {
            MonitorState::Idle | MonitorState::Unfrozen => {}
            MonitorState::Ready => {
                if !self.is_start_target() || self.local_is_started() {
                    self.cancel_ready();
                }
                return;
            }
            _ => return,
        }

        if self.local_is_frozen() {
            if self.state.state == MonitorState::Unfrozen {
                return;
            }
            let spec = ActionSpec::object(&self.path, "unfreeze")
                .local()
                .with_timeout(self.ctx.config.action_timeout());
            let ok = self
                .do_transition_action(
                    spec,
                    MonitorState::Unfreezing,
                    MonitorState::Unfrozen,
                    MonitorState::UnfreezeFailed,
                )
                .await;
            if !ok {
                return;
            }
        }

        if !self.is_start_target() || self.local_is_started() || self.awaits_started_status() {
            if self.state.state == MonitorState::Unfrozen && !self.local_is_frozen() {
                self.state.state = MonitorState::Idle;
            }
            return;
        }
        self.arm_ready();
    }
}
