//! Stopped: freeze then stop everywhere.

use crate::action::ActionSpec;
use crate::imon::worker::MonitorActor;
use crate::model::MonitorState;

impl MonitorActor {
    pub(super) async fn orchestrate_stopped(&mut self) {
        if self.stop_path(true).await {
            self.done_and_idle();
        }
    }

    /// Freezes (when asked) then stops the local instance.
    ///
    /// Returns true once the local instance is stopped, and frozen when asked.
    pub(super) async fn stop_path(&mut self, freeze: bool) -> bool {
        let Some(st) = self.local_status() else {
            return false;
        };
        let (stopped, frozen) = (st.is_stopped(), st.is_frozen());
        self.cancel_ready();
        if self.state.state.is_doing() {
            return false;
        }
        if stopped && (frozen || !freeze) {
            return true;
        }

        match self.state.state {
            MonitorState::Idle | MonitorState::Frozen | MonitorState::WaitNonLeader => {}
            _ => return false,
        }
        if freeze && !frozen && self.state.state != MonitorState::Frozen {
            let spec = ActionSpec::object(&self.path, "freeze")
                .local()
                .with_timeout(self.ctx.config.action_timeout());
            let ok = self
                .do_transition_action(
                    spec,
                    MonitorState::Freezing,
                    MonitorState::Frozen,
                    MonitorState::FreezeFailed,
                )
                .await;
            if !ok {
                return false;
            }
        }
        if stopped {
            return true;
        }
        self.queue_stop();
        false
    }
}
