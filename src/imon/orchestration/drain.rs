//! Node drain: shut the local instance down while the node monitor drains.

use crate::action::ActionSpec;
use crate::imon::worker::{After, MonitorActor};
use crate::model::{LocalExpect, MonitorState, NodeMonitorState};

impl MonitorActor {
    /// Returns true while the drain owns the instance.
    pub(super) async fn orchestrate_drain(&mut self) -> bool {
        let node_state = self
            .node_monitor
            .get(&*self.localhost)
            .map(|m| m.state);
        let shut = matches!(
            self.state.state,
            MonitorState::Shutting | MonitorState::Shutdown | MonitorState::ShutdownFailed
        );
        match node_state {
            Some(NodeMonitorState::Draining) => {
                if shut || self.state.state.is_doing() {
                    return true;
                }
                self.cancel_ready();
                let spec = ActionSpec::object(&self.path, "shutdown")
                    .local()
                    .with_timeout(self.ctx.config.stop_timeout());
                self.queue_action(
                    spec,
                    MonitorState::Shutting,
                    MonitorState::Shutdown,
                    MonitorState::ShutdownFailed,
                    After::LocalExpect(LocalExpect::Shutdown),
                );
                true
            }
            Some(NodeMonitorState::Idle) => {
                if self.state.local_expect == LocalExpect::Shutdown
                    || matches!(
                        self.state.state,
                        MonitorState::Shutdown | MonitorState::ShutdownFailed
                    )
                {
                    tracing::info!("node drain is over, back to idle");
                    self.state.local_expect = LocalExpect::None;
                    self.state.state = MonitorState::Idle;
                }
                false
            }
            Some(_) => shut,
            None => false,
        }
    }
}
