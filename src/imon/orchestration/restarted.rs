//! Restarted: rolling restart in placement order.
//!
//! Nodes ranked before the local one restart first. Each node stops then
//! starts its instance; an instance that is not up is left alone.

use crate::action::ActionSpec;
use crate::imon::worker::{After, MonitorActor};
use crate::model::{LocalExpect, MonitorState};

impl MonitorActor {
    pub(super) async fn orchestrate_restarted(&mut self) {
        if self.state.state == MonitorState::Restarted {
            self.done_and_idle();
            return;
        }
        if self.state.orchestration_is_done {
            return;
        }
        if !matches!(
            self.state.state,
            MonitorState::Idle | MonitorState::WaitPriors | MonitorState::Stopped
        ) {
            return;
        }

        let priors = self.restart_priors();
        if !priors.is_empty() {
            if self.state.state != MonitorState::WaitPriors {
                tracing::info!(?priors, "wait for prior nodes to restart");
            }
            self.state.state = MonitorState::WaitPriors;
            return;
        }

        match self.state.state {
            MonitorState::Stopped => {
                let spec = ActionSpec::object(&self.path, "start")
                    .local()
                    .with_timeout(self.ctx.config.start_timeout());
                self.queue_action(
                    spec,
                    MonitorState::Starting,
                    MonitorState::Restarted,
                    MonitorState::StartFailed,
                    After::LocalExpect(LocalExpect::Started),
                );
            }
            _ if self.local_is_started() => self.queue_stop(),
            _ => self.done_and_idle(),
        }
    }

    /// Nodes ranked before the local one that did not restart yet.
    fn restart_priors(&self) -> Vec<String> {
        let id = self.state.orchestration_id;
        let ranked = self.ranked(&self.leader_candidates());
        ranked
            .into_iter()
            .take_while(|node| node.as_str() != &*self.localhost)
            .filter(|node| {
                self.monitor_of(node).is_some_and(|m| {
                    m.state != MonitorState::Restarted && !m.is_done_with(id)
                })
            })
            .collect()
    }
}
