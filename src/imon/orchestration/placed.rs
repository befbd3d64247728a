//! Placed and placed@: start on the targets, stop elsewhere.
//!
//! A failover target waits in `WaitNonLeader` until every other instance is
//! stopped, so two instances never run at once.

use crate::imon::worker::MonitorActor;
use crate::model::MonitorState;

impl MonitorActor {
    pub(super) async fn orchestrate_placed(&mut self) {
        if !self.is_target_node(&self.localhost) {
            if self.stop_path(false).await {
                self.done_and_idle();
            }
            return;
        }

        if self.local_is_started() {
            self.cancel_ready();
            if !self.state.state.is_doing() {
                self.done_and_idle();
            }
            return;
        }
        if self.config.is_failover() {
            let others_running = self
                .config
                .scope
                .iter()
                .filter(|node| node.as_str() != &*self.localhost)
                .filter(|node| !self.is_target_node(node))
                .any(|node| {
                    self.instance_status
                        .get(node.as_str())
                        .is_some_and(|s| !s.is_stopped())
                });
            if others_running {
                if matches!(
                    self.state.state,
                    MonitorState::Idle | MonitorState::WaitNonLeader
                ) {
                    self.state.state = MonitorState::WaitNonLeader;
                }
                return;
            }
        }
        if self.state.state == MonitorState::WaitNonLeader {
            self.state.state = MonitorState::Idle;
        }
        self.start_path().await;
    }
}
