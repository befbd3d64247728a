//! Frozen and thawed.

use crate::action::ActionSpec;
use crate::imon::worker::MonitorActor;
use crate::model::MonitorState;

impl MonitorActor {
    pub(super) async fn orchestrate_frozen(&mut self) {
        let Some(st) = self.local_status() else {
            return;
        };
        if st.is_frozen() {
            if !self.state.state.is_doing() {
                self.done_and_idle();
            }
            return;
        }
        if self.state.state != MonitorState::Idle {
            return;
        }
        let spec = ActionSpec::object(&self.path, "freeze")
            .local()
            .with_timeout(self.ctx.config.action_timeout());
        self.do_transition_action(
            spec,
            MonitorState::Freezing,
            MonitorState::Frozen,
            MonitorState::FreezeFailed,
        )
        .await;
    }

    pub(super) async fn orchestrate_thawed(&mut self) {
        let Some(st) = self.local_status() else {
            return;
        };
        if !st.is_frozen() {
            if !self.state.state.is_doing() {
                self.done_and_idle();
            }
            return;
        }
        if self.state.state != MonitorState::Idle {
            return;
        }
        let spec = ActionSpec::object(&self.path, "unfreeze")
            .local()
            .with_timeout(self.ctx.config.action_timeout());
        self.do_transition_action(
            spec,
            MonitorState::Thawing,
            MonitorState::Thawed,
            MonitorState::ThawFailed,
        )
        .await;
    }
}
