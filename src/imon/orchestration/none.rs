//! No global expectation: settle leftovers and run HA orchestration.

use crate::imon::worker::MonitorActor;
use crate::model::{Avail, MonitorState, OrchestrateMode};

impl MonitorActor {
    pub(super) async fn orchestrate_none(&mut self) {
        let object = self.object_status();
        if self.state.state.is_start_failed() && object.avail == Avail::Up {
            tracing::info!("object is up, clear {}", self.state.state);
            self.state.state = MonitorState::Idle;
        }
        self.settle_idle();

        if self.config.orchestrate != OrchestrateMode::Ha {
            self.cancel_ready();
            return;
        }
        if self.local_is_frozen() || self.node_is_frozen() {
            self.cancel_ready();
            return;
        }

        let started_here = self.local_is_started();
        if !self.is_object_started(&object) {
            if self.state.state == MonitorState::Ready {
                if !self.state.is_ha_leader || started_here {
                    self.cancel_ready();
                }
                return;
            }
            if self.state.is_ha_leader
                && !started_here
                && self.state.state == MonitorState::Idle
                && !self.awaits_started_status()
            {
                tracing::info!("object is not started, HA start");
                self.arm_ready();
            }
            return;
        }

        self.cancel_ready();
        if !self.config.is_failover()
            && object.up_instances > self.config.flex_target
            && started_here
            && !self.state.is_ha_leader
            && self.state.state == MonitorState::Idle
        {
            tracing::info!(
                up = object.up_instances,
                target = self.config.flex_target,
                "too many flex instances up, stop the local one"
            );
            self.queue_stop();
        }
    }

    /// Returns success markers of past orchestrations to `Idle`.
    fn settle_idle(&mut self) {
        let st = self.state.state;
        if st.is_doing()
            || st.is_failed()
            || matches!(
                st,
                MonitorState::Idle | MonitorState::Ready | MonitorState::Shutdown
            )
        {
            return;
        }
        if st == MonitorState::Stopped && self.local_is_started() {
            return;
        }
        self.state.state = MonitorState::Idle;
    }
}
