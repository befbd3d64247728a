//! Action primitives of the monitor.
//!
//! Two ways to drive an external action:
//!
//! - [`MonitorActor::do_transition_action`] runs it inline and returns the
//!   outcome. Used for short steps whose result decides the next step in the
//!   same pass (freeze before stop, unfreeze before start).
//! - [`MonitorActor::queue_action`] runs it on a background task which posts
//!   [`Command::ActionDone`] back to the inbox. The row is only ever changed by
//!   the actor itself.
//!
//! The `Ready` settle window is a pending step: a child token plus a sleep
//! posting [`Command::ReadyElapsed`] with its generation. Cancelling the token
//! or bumping the generation discards it.

use std::sync::Arc;

use tokio::select;
use tracing::Instrument;

use super::worker::{After, Command, MonitorActor, Pending};
use crate::action::ActionSpec;
use crate::events::{Event, Payload};
use crate::model::{LocalExpect, MonitorAction, MonitorState};

impl MonitorActor {
    /// Sets `doing`, publishes it, awaits the action, then sets `success` or
    /// `failure`.
    pub(super) async fn do_transition_action(
        &mut self,
        spec: ActionSpec,
        doing: MonitorState,
        success: MonitorState,
        failure: MonitorState,
    ) -> bool {
        self.state.state = doing;
        self.update_if_change();
        match self.ctx.executor.action(&spec, &self.token).await {
            Ok(()) => {
                self.state.state = success;
                true
            }
            Err(err) => {
                tracing::warn!(label = err.as_label(), "action failed: {err}");
                self.state.state = failure;
                false
            }
        }
    }

    /// Sets `doing` and runs the action in the background.
    ///
    /// `after` is applied only when the action succeeds.
    pub(super) fn queue_action(
        &mut self,
        spec: ActionSpec,
        doing: MonitorState,
        success: MonitorState,
        failure: MonitorState,
        after: After,
    ) {
        self.state.state = doing;
        let executor = Arc::clone(&self.ctx.executor);
        let tx = self.cmd_tx.clone();
        let token = self.token.child_token();
        tokio::spawn(
            async move {
                let cmd = match executor.action(&spec, &token).await {
                    Ok(()) => Command::ActionDone {
                        doing,
                        next: success,
                        after,
                    },
                    Err(err) => {
                        tracing::warn!(label = err.as_label(), "action failed: {err}");
                        Command::ActionDone {
                            doing,
                            next: failure,
                            after: After::Nothing,
                        }
                    }
                };
                let _ = tx.send(cmd);
            }
            .in_current_span(),
        );
    }

    pub(super) fn on_action_done(&mut self, doing: MonitorState, next: MonitorState, after: After) {
        if self.state.state != doing {
            tracing::debug!(
                "drop stale {} completion, state is {}",
                doing,
                self.state.state
            );
            return;
        }
        self.state.state = next;
        if let After::LocalExpect(local_expect) = after {
            self.state.local_expect = local_expect;
        }
    }

    /// Enters `Ready` and arms the settle window.
    pub(super) fn arm_ready(&mut self) {
        let period = self
            .node_config
            .as_ref()
            .and_then(|c| c.ready_period)
            .unwrap_or(self.ctx.config.ready_period);
        self.clear_pending();
        self.pending_seq += 1;
        let generation = self.pending_seq;
        let token = self.token.child_token();
        self.pending = Some(Pending {
            generation,
            token: token.clone(),
        });
        self.state.state = MonitorState::Ready;
        tracing::debug!(?period, "ready window armed");

        let tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(period) => {
                    let _ = tx.send(Command::ReadyElapsed { generation });
                }
            }
        });
    }

    pub(super) fn on_ready_elapsed(&mut self, generation: u64) {
        match &self.pending {
            Some(p) if p.generation == generation => self.pending = None,
            _ => return,
        }
        if self.state.state != MonitorState::Ready {
            return;
        }
        let started = self.local_status().is_some_and(|s| s.is_started());
        if !self.is_start_target() || !self.is_converged_global_expect() || started {
            tracing::debug!("ready window elapsed, start no longer wanted");
            self.state.state = MonitorState::Idle;
            return;
        }
        self.queue_start();
    }

    /// `start --local`, then `LocalExpect::Started`.
    pub(super) fn queue_start(&mut self) {
        let spec = ActionSpec::object(&self.path, "start")
            .local()
            .with_timeout(self.ctx.config.start_timeout());
        self.queue_action(
            spec,
            MonitorState::Starting,
            MonitorState::Idle,
            MonitorState::StartFailed,
            After::LocalExpect(LocalExpect::Started),
        );
    }

    /// `stop --local`, then `LocalExpect::None`.
    pub(super) fn queue_stop(&mut self) {
        let spec = ActionSpec::object(&self.path, "stop")
            .local()
            .with_timeout(self.ctx.config.stop_timeout());
        self.queue_action(
            spec,
            MonitorState::Stopping,
            MonitorState::Stopped,
            MonitorState::StopFailed,
            After::LocalExpect(LocalExpect::None),
        );
    }

    /// Cancels the pending step, if any.
    pub(super) fn clear_pending(&mut self) {
        if let Some(p) = self.pending.take() {
            p.token.cancel();
        }
    }

    /// Leaves the settle window.
    pub(super) fn cancel_ready(&mut self) {
        self.clear_pending();
        if self.state.state == MonitorState::Ready {
            tracing::debug!("ready window canceled");
            self.state.state = MonitorState::Idle;
        }
    }

    /// `status -r` in the background.
    pub(super) fn refresh_status(&self) {
        let executor = Arc::clone(&self.ctx.executor);
        let token = self.token.child_token();
        let spec = ActionSpec::object(&self.path, "status")
            .arg("-r")
            .with_timeout(self.ctx.config.action_timeout());
        tokio::spawn(
            async move {
                if let Err(err) = executor.action(&spec, &token).await {
                    tracing::warn!(label = err.as_label(), "status refresh failed: {err}");
                }
            }
            .in_current_span(),
        );
    }

    /// Runs the configured monitor action after a restart budget ran out.
    pub(super) async fn do_monitor_action(&mut self, rid: &str) {
        let action = self.config.monitor_action;
        self.ctx.bus.publish(
            Event::new(Payload::InstanceMonitorAction {
                action,
                rid: rid.to_string(),
            })
            .with_path(self.path.clone())
            .with_node(Arc::clone(&self.localhost)),
        );
        if action == MonitorAction::None {
            tracing::info!(rid, "restart budget exhausted, no monitor action configured");
            return;
        }
        tracing::warn!(rid, "restart budget exhausted, monitor action {}", action.as_str());

        if let Some(cmd) = &self.config.pre_monitor_action
            && let Some(spec) = ActionSpec::raw("pre monitor action", cmd)
        {
            let spec = spec.with_timeout(self.ctx.config.action_timeout());
            if let Err(err) = self.ctx.executor.action(&spec, &self.token).await {
                tracing::warn!(label = err.as_label(), "pre monitor action failed: {err}");
            }
        }

        match action {
            MonitorAction::None => {}
            MonitorAction::Crash | MonitorAction::Reboot => {
                if let Err(err) = self.ctx.executor.system(action).await {
                    tracing::error!(label = err.as_label(), "monitor action failed: {err}");
                }
            }
            MonitorAction::FreezeStop => {
                let freeze = ActionSpec::object(&self.path, "freeze")
                    .local()
                    .with_timeout(self.ctx.config.action_timeout());
                self.do_transition_action(
                    freeze,
                    MonitorState::Freezing,
                    MonitorState::Frozen,
                    MonitorState::FreezeFailed,
                )
                .await;
                self.queue_stop();
            }
            MonitorAction::Switch => {
                let stop = ActionSpec::object(&self.path, "stop")
                    .local()
                    .with_timeout(self.ctx.config.stop_timeout());
                self.do_transition_action(
                    stop,
                    MonitorState::Stopping,
                    MonitorState::StartFailed,
                    MonitorState::StopFailed,
                )
                .await;
                self.state.local_expect = LocalExpect::None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn queued_action_posts_its_outcome() {
        let h = Harness::new(&["n1"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.queue_start();
        assert_eq!(n1.state.state, MonitorState::Starting);

        let cmd = n1.next_command().await;
        match cmd {
            Command::ActionDone { doing, next, after } => {
                n1.on_action_done(doing, next, after);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(n1.state.state, MonitorState::Idle);
        assert_eq!(n1.state.local_expect, LocalExpect::Started);
        assert_eq!(h.executor("n1").calls(), vec!["svc/web start --local"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_action_lands_in_failed_state() {
        let h = Harness::new(&["n1"]);
        h.executor("n1").fail("stop");
        let mut n1 = h.actor("n1", h.failover_config());
        n1.state.local_expect = LocalExpect::Started;
        n1.queue_stop();
        if let Command::ActionDone { doing, next, after } = n1.next_command().await {
            n1.on_action_done(doing, next, after);
        }
        assert_eq!(n1.state.state, MonitorState::StopFailed);
        assert_eq!(n1.state.local_expect, LocalExpect::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_is_ignored() {
        let h = Harness::new(&["n1"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.state.state = MonitorState::Idle;
        n1.on_action_done(
            MonitorState::Starting,
            MonitorState::StartFailed,
            After::Nothing,
        );
        assert_eq!(n1.state.state, MonitorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_ready_window_never_fires() {
        let h = Harness::new(&["n1"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.arm_ready();
        assert_eq!(n1.state.state, MonitorState::Ready);
        n1.cancel_ready();
        assert_eq!(n1.state.state, MonitorState::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(n1.try_next_command().is_none());
        assert!(h.executor("n1").calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_discards_the_older_window() {
        let h = Harness::new(&["n1"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.arm_ready();
        let first = n1.pending_seq;
        n1.arm_ready();
        n1.on_ready_elapsed(first);
        assert_eq!(n1.state.state, MonitorState::Ready);
        assert!(n1.pending.is_some());
    }

    #[tokio::test]
    async fn switch_stops_and_marks_start_failed() {
        let h = Harness::new(&["n1"]);
        let mut cfg = (*h.failover_config()).clone();
        cfg.monitor_action = MonitorAction::Switch;
        cfg.pre_monitor_action = Some("/usr/bin/logger exhausted".into());
        let mut n1 = h.actor("n1", Arc::new(cfg));
        n1.state.local_expect = LocalExpect::Started;

        n1.do_monitor_action("app#1").await;
        assert_eq!(n1.state.state, MonitorState::StartFailed);
        assert_eq!(n1.state.local_expect, LocalExpect::None);
        assert_eq!(
            h.executor("n1").calls(),
            vec!["/usr/bin/logger exhausted", "svc/web stop --local"]
        );
    }

    #[tokio::test]
    async fn crash_goes_to_the_system_hook() {
        let h = Harness::new(&["n1"]);
        let mut cfg = (*h.failover_config()).clone();
        cfg.monitor_action = MonitorAction::Crash;
        let mut n1 = h.actor("n1", Arc::new(cfg));
        n1.do_monitor_action("app#1").await;
        assert_eq!(h.executor("n1").system_calls(), vec![MonitorAction::Crash]);
        assert!(h.executor("n1").calls().is_empty());
    }
}
