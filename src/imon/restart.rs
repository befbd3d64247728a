//! # Resource restart engine.
//!
//! Keeps monitored resources of a started instance up by restarting them with
//! a budget per episode:
//!
//! ```text
//! resource up / n/a / disabled ─► budget reset, timer canceled
//! resource down, started intent
//!   ├─ timer pending             ─► skip
//!   ├─ status older than restart ─► skip until refreshed
//!   ├─ monitor action done       ─► skip until the next reset
//!   ├─ budget exhausted          ─► monitor action (once)
//!   └─ budget left               ─► budget - 1, arm batch timer
//!                                     └─► start --rid a,b (Running)
//! ```
//!
//! Resources due at the same deadline share one timer and one action call.
//! The deadline of a batch is the latest per-resource minimum delay, computed
//! from the last restart of the resource and the configured backoff.
//!
//! A due batch is dropped when a peer holds a newer global expectation.
//!
//! The engine is gated: while the node or the instance is frozen, the node
//! monitor is not idle, the instance is not provisioned or the monitor is
//! busy, every timer is canceled and budgets are left as they are.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::select;

use super::worker::{After, Command, MonitorActor, RestartBatch};
use crate::action::ActionSpec;
use crate::model::{Avail, LocalExpect, MonitorState, NodeMonitorState, ResourceConfig};

impl MonitorActor {
    pub(super) async fn orchestrate_resource_restart(&mut self) {
        if self.path.is_cluster() || !self.path.kind.has_restartable_resources() {
            return;
        }
        if let Some(reason) = self.restart_gate() {
            self.cancel_restart_timers(reason);
            return;
        }
        let Some(local) = self.instance_status.get(&*self.localhost).cloned() else {
            return;
        };

        let monitored: Vec<(String, ResourceConfig)> = self
            .config
            .resources
            .iter()
            .filter(|(_, rc)| rc.restart > 0)
            .map(|(rid, rc)| (rid.clone(), rc.clone()))
            .collect();

        let mut todo = Vec::new();
        let mut todo_standby = Vec::new();
        for (rid, rc) in monitored {
            let status = local
                .resources
                .get(&rid)
                .map(|r| r.status)
                .unwrap_or(Avail::Undef);
            if rc.is_disabled || status.is_na() || status.is_up_like() {
                self.reset_restart(&rid, rc.restart);
                continue;
            }
            let Some(rm) = self.state.resources.get(&rid) else {
                continue;
            };
            if rm.restart.pending {
                continue;
            }
            if rm.restart.last_at.is_some_and(|at| local.updated_at <= at) {
                tracing::debug!(rid, "status predates the last restart, wait for a refresh");
                continue;
            }
            if rc.is_standby {
                todo_standby.push((rid, rc));
            } else if self.state.local_expect == LocalExpect::Started {
                todo.push((rid, rc));
            }
        }

        if todo.is_empty() && todo_standby.is_empty() {
            return;
        }
        if self.state.monitor_action_executed_at.is_some() {
            tracing::debug!("monitor action already executed, skip resource restarts");
            return;
        }

        let exhausted = todo
            .iter()
            .chain(todo_standby.iter())
            .find(|(rid, _)| {
                self.state
                    .resources
                    .get(rid)
                    .is_some_and(|rm| rm.restart.remaining == 0)
            })
            .map(|(rid, _)| rid.clone());
        if let Some(rid) = exhausted {
            self.state.monitor_action_executed_at = Some(Utc::now());
            self.do_monitor_action(&rid).await;
            return;
        }

        self.schedule_restart(todo, false);
        self.schedule_restart(todo_standby, true);
    }

    /// Why resources must not be restarted now, if anything.
    fn restart_gate(&self) -> Option<&'static str> {
        let local = &*self.localhost;
        if self.node_status.get(local).is_some_and(|s| s.is_frozen()) {
            return Some("node frozen");
        }
        if self.node_monitor.get(local).map(|m| m.state) != Some(NodeMonitorState::Idle) {
            return Some("node monitor not idle");
        }
        let Some(st) = self.local_status() else {
            return Some("no local status");
        };
        if st.is_frozen() {
            return Some("instance frozen");
        }
        if !st.provisioned.is_provisioned() {
            return Some("instance not provisioned");
        }
        if !matches!(
            self.state.state,
            MonitorState::Idle | MonitorState::StartFailed
        ) {
            return Some("monitor busy");
        }
        None
    }

    fn reset_restart(&mut self, rid: &str, restart: u32) {
        let Some(rm) = self.state.resources.get_mut(rid) else {
            return;
        };
        let was_pending = rm.restart.pending;
        if rm.restart.remaining != restart {
            tracing::info!(rid, "resource is up, reset restart budget to {restart}");
        }
        rm.restart.remaining = restart;
        rm.restart.pending = false;
        if was_pending {
            self.cancel_restart_timer(rid);
        }
    }

    fn schedule_restart(&mut self, rids: Vec<(String, ResourceConfig)>, standby: bool) {
        if rids.is_empty() {
            return;
        }
        let now = Utc::now();
        let backoff = self.ctx.config.restart_backoff;
        let mut due = now;
        let mut batch = Vec::with_capacity(rids.len());
        for (rid, rc) in rids {
            let Some(rm) = self.state.resources.get_mut(&rid) else {
                continue;
            };
            let attempt = rc.restart.saturating_sub(rm.restart.remaining);
            let delay = backoff.with_first(rc.restart_delay).next(attempt);
            if let Some(last) = rm.restart.last_at {
                let min = TimeDelta::from_std(delay)
                    .ok()
                    .and_then(|d| last.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                due = due.max(min);
            }
            rm.restart.remaining -= 1;
            rm.restart.pending = true;
            batch.push(rid);
        }

        let wait = (due - now).to_std().unwrap_or_default();
        self.batch_seq += 1;
        let id = self.batch_seq;
        let token = self.token.child_token();
        tracing::info!(rids = ?batch, standby, ?wait, "schedule resource restart");
        self.restart_batches.insert(
            id,
            RestartBatch {
                rids: batch,
                standby,
                token: token.clone(),
            },
        );

        let tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    let _ = tx.send(Command::RestartDue { batch: id });
                }
            }
        });
    }

    pub(super) fn on_restart_due(&mut self, batch: u64) {
        let Some(batch) = self.restart_batches.remove(&batch) else {
            return;
        };
        let now = Utc::now();
        for rid in &batch.rids {
            if let Some(rm) = self.state.resources.get_mut(rid) {
                rm.restart.pending = false;
                rm.restart.last_at = Some(now);
            }
        }
        if batch.rids.is_empty() {
            return;
        }
        if let Some(reason) = self.restart_gate() {
            tracing::debug!(rids = ?batch.rids, "skip due resource restart: {reason}");
            return;
        }
        if !self.is_converged_global_expect() {
            tracing::debug!(rids = ?batch.rids, "skip due resource restart: global expect not converged");
            return;
        }
        let verb = if batch.standby { "startstandby" } else { "start" };
        let spec = ActionSpec::object(&self.path, verb)
            .rids(&batch.rids)
            .with_timeout(self.ctx.config.start_timeout());
        self.queue_action(
            spec,
            MonitorState::Running,
            MonitorState::Idle,
            MonitorState::StartFailed,
            After::Nothing,
        );
    }

    /// Removes `rid` from its batch; a batch left empty is canceled.
    pub(super) fn cancel_restart_timer(&mut self, rid: &str) {
        let mut emptied = Vec::new();
        for (id, batch) in self.restart_batches.iter_mut() {
            batch.rids.retain(|r| r != rid);
            if batch.rids.is_empty() {
                batch.token.cancel();
                emptied.push(*id);
            }
        }
        for id in emptied {
            self.restart_batches.remove(&id);
        }
    }

    fn cancel_restart_timers(&mut self, reason: &str) {
        if self.restart_batches.is_empty() {
            return;
        }
        tracing::debug!("cancel resource restarts: {reason}");
        for (_, batch) in self.restart_batches.drain() {
            batch.token.cancel();
        }
        for rm in self.state.resources.values_mut() {
            rm.restart.pending = false;
        }
    }
}
