//! Purged and deleted.

use crate::action::ActionSpec;
use crate::imon::worker::{After, MonitorActor};
use crate::model::MonitorState;

impl MonitorActor {
    /// Stop, unprovision, then delete.
    pub(super) async fn orchestrate_purged(&mut self) {
        if self.state.state == MonitorState::Deleted {
            self.done_and_idle();
            return;
        }
        if !self.stop_path(false).await {
            return;
        }
        if self.state.state == MonitorState::Stopped {
            self.state.state = MonitorState::Idle;
        }
        if !self.unprovision_path() {
            return;
        }
        if self.state.state == MonitorState::Unprovisioned {
            self.state.state = MonitorState::Idle;
        }
        self.queue_delete();
    }

    pub(super) fn orchestrate_deleted(&mut self) {
        match self.state.state {
            MonitorState::Deleted => self.done_and_idle(),
            MonitorState::Idle => self.queue_delete(),
            _ => {}
        }
    }

    fn queue_delete(&mut self) {
        if self.state.state != MonitorState::Idle {
            return;
        }
        let spec = ActionSpec::object(&self.path, "delete")
            .with_timeout(self.ctx.config.action_timeout());
        self.queue_action(
            spec,
            MonitorState::Deleting,
            MonitorState::Deleted,
            MonitorState::DeleteFailed,
            After::Nothing,
        );
    }
}
