//! # Orchestration state machine.
//!
//! [`MonitorActor::orchestrate`] runs once per loop pass, after leadership is
//! refreshed. It does nothing while a peer holds a newer global expectation.
//! Otherwise it dispatches on the global expectation:
//!
//! ```text
//! node draining ─► shutdown (suppresses everything else)
//! GlobalExpect
//!   None          ─► clear start failures, HA auto start / flex surplus stop
//!   Aborted       ─► done, clear
//!   Frozen/Thawed ─► freeze / unfreeze
//!   Started       ─► unfreeze ─► Ready ─► start (leaders)
//!   Stopped       ─► freeze ─► stop
//!   Placed(At)    ─► targets start, others stop
//!   (Un)provisioned ─► leader first / non-leaders first
//!   Purged        ─► stop ─► unprovision ─► delete
//!   Deleted       ─► delete
//!   Restarted     ─► wait priors ─► stop ─► start
//! then
//!   all in-scope rows done ─► clear the expectation
//!   resource restart engine
//! ```
//!
//! Each handler moves the local row only; completion is published through
//! `orchestration_is_done` and an `ObjectOrchestrationEnd` event.

mod drain;
mod freeze;
mod none;
mod placed;
mod provision;
mod purge;
mod restarted;
mod started;
mod stopped;


use std::sync::Arc;

use super::worker::MonitorActor;
use crate::events::{Event, Payload};
use crate::model::{GlobalExpect, GlobalExpectOptions, MonitorState};

impl MonitorActor {
    pub(in crate::imon) async fn orchestrate(&mut self) {
        if !self.is_converged_global_expect() {
            tracing::debug!("wait for global expect convergence");
            return;
        }
        if self.orchestrate_drain().await {
            return;
        }

        match self.state.global_expect {
            GlobalExpect::None => self.orchestrate_none().await,
            GlobalExpect::Aborted => self.orchestrate_aborted(),
            GlobalExpect::Frozen => self.orchestrate_frozen().await,
            GlobalExpect::Thawed => self.orchestrate_thawed().await,
            GlobalExpect::Started => self.orchestrate_started().await,
            GlobalExpect::Stopped => self.orchestrate_stopped().await,
            GlobalExpect::Placed | GlobalExpect::PlacedAt => self.orchestrate_placed().await,
            GlobalExpect::Provisioned => self.orchestrate_provisioned(),
            GlobalExpect::Unprovisioned => self.orchestrate_unprovisioned(),
            GlobalExpect::Purged => self.orchestrate_purged().await,
            GlobalExpect::Deleted => self.orchestrate_deleted(),
            GlobalExpect::Restarted => self.orchestrate_restarted().await,
        }

        self.clear_if_all_done();
        self.orchestrate_resource_restart().await;
    }

    fn orchestrate_aborted(&mut self) {
        self.cancel_ready();
        if !self.state.state.is_doing() && !self.state.state.is_failed() {
            self.state.state = MonitorState::Idle;
        }
        self.done();
        self.clear_global_expect();
    }

    /// Marks the current orchestration reached on this node.
    ///
    /// Publishes `ObjectOrchestrationEnd` once per orchestration.
    fn done(&mut self) {
        if self.state.orchestration_is_done {
            return;
        }
        self.state.orchestration_is_done = true;
        tracing::info!(
            orchestration_id = ?self.state.orchestration_id,
            "orchestration {} done",
            self.state.global_expect
        );
        self.ctx.bus.publish(
            Event::new(Payload::ObjectOrchestrationEnd {
                id: self.state.orchestration_id,
                global_expect: self.state.global_expect,
                error: None,
            })
            .with_path(self.path.clone())
            .with_node(Arc::clone(&self.localhost)),
        );
    }

    fn done_and_idle(&mut self) {
        self.clear_pending();
        self.state.state = MonitorState::Idle;
        self.done();
    }

    /// Drops the expectation, keeping its stamp and orchestration id.
    fn clear_global_expect(&mut self) {
        if self.state.global_expect.is_none() {
            return;
        }
        tracing::info!("clear global expect {}", self.state.global_expect);
        self.state.global_expect = GlobalExpect::None;
        self.state.global_expect_options = GlobalExpectOptions::default();
    }

    /// Clears the expectation once every known in-scope row is done with it.
    fn clear_if_all_done(&mut self) {
        if self.state.global_expect.is_none() || !self.state.orchestration_is_done {
            return;
        }
        let id = self.state.orchestration_id;
        let all_done = self
            .config
            .scope
            .iter()
            .filter_map(|node| self.instance_monitor.get(node))
            .all(|m| m.is_done_with(id));
        if all_done {
            self.clear_global_expect();
        }
    }

    fn local_is_frozen(&self) -> bool {
        self.local_status().is_some_and(|s| s.is_frozen())
    }

    fn local_is_started(&self) -> bool {
        self.local_status().is_some_and(|s| s.is_started())
    }

    fn node_is_frozen(&self) -> bool {
        self.node_status
            .get(&*self.localhost)
            .is_some_and(|s| s.is_frozen())
    }
}
