//! # Monitor actor: event loop and publication.
//!
//! One [`MonitorActor`] owns the local monitor row of one `(object, node)`.
//! It is the only writer of that row; everything else it knows about the
//! cluster is a read-only projection rebuilt from bus events.
//!
//! ## Loop
//! ```text
//! select! {
//!   token.cancelled()  ─► exit
//!   sub.next()         ─► update caches ─┐
//!                         (lag: resync) ─┤
//!   cmd_rx.recv()      ─► continuation ──┤
//! }                                      ▼
//!                          update_is_leader()
//!                          orchestrate()
//!                          update_if_change() ─► store + bus (if dirty)
//! ```
//!
//! ## Rules
//! - Background actions never touch the row; they post a [`Command`] back.
//! - Publication is skipped when the row content did not change.
//! - `*_updated` stamps are strictly increasing per field.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::action::Executor;
use crate::config::Config;
use crate::events::{Bus, Delivery, Event, EventKind, Filter, Payload, Subscription};
use crate::filesync::Fetcher;
use crate::model::{
    InstanceConfig, InstanceMonitor, InstanceStatus, LocalExpect, MonitorState, NodeConfig,
    NodeMonitor, NodeStats, NodeStatus, ObjectPath, ResourceMonitor, RestartMonitor,
};
use crate::store::Store;

/// Shared collaborators of every monitor of a daemon.
#[derive(Clone)]
pub struct Context {
    pub bus: Bus,
    pub store: Arc<Store>,
    pub executor: Arc<dyn Executor>,
    pub fetcher: Arc<dyn Fetcher>,
    pub config: Arc<Config>,
    /// Local node name.
    pub localhost: Arc<str>,
}

/// Self-addressed continuation posted by background work.
#[derive(Debug)]
pub(crate) enum Command {
    /// A queued action finished.
    ActionDone {
        doing: MonitorState,
        next: MonitorState,
        after: After,
    },
    /// The ready window of generation `generation` elapsed.
    ReadyElapsed { generation: u64 },
    /// A delayed resource restart batch is due.
    RestartDue { batch: u64 },
    FetchDone { rid: String, name: String },
}

/// Row change applied when a queued action succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum After {
    Nothing,
    LocalExpect(LocalExpect),
}

/// Cancelable deferred step (the ready window).
pub(crate) struct Pending {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
}

/// Resources sharing one delayed restart timer.
pub(crate) struct RestartBatch {
    pub(crate) rids: Vec<String>,
    pub(crate) standby: bool,
    pub(crate) token: CancellationToken,
}

/// Single-owner actor driving one instance.
pub struct MonitorActor {
    pub(crate) path: ObjectPath,
    pub(crate) localhost: Arc<str>,
    pub(crate) ctx: Context,
    pub(crate) token: CancellationToken,
    sub: Subscription,
    pub(crate) cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,

    pub(crate) config: Arc<InstanceConfig>,
    pub(crate) instance_status: BTreeMap<String, Arc<InstanceStatus>>,
    /// Peer rows only; the local row is `state`.
    pub(crate) instance_monitor: BTreeMap<String, Arc<InstanceMonitor>>,
    pub(crate) node_status: HashMap<String, Arc<NodeStatus>>,
    pub(crate) node_monitor: HashMap<String, Arc<NodeMonitor>>,
    pub(crate) node_stats: HashMap<String, Arc<NodeStats>>,
    pub(crate) node_config: Option<Arc<NodeConfig>>,

    pub(crate) state: InstanceMonitor,
    published: Option<InstanceMonitor>,

    pub(crate) pending: Option<Pending>,
    pub(crate) pending_seq: u64,
    pub(crate) restart_batches: HashMap<u64, RestartBatch>,
    pub(crate) batch_seq: u64,
    pub(crate) fetching: HashSet<(String, String)>,
}

impl MonitorActor {
    /// Creates the actor and subscribes it to the bus.
    ///
    /// Events published after this call are delivered to the actor.
    pub fn new(ctx: Context, config: Arc<InstanceConfig>, token: CancellationToken) -> Self {
        let path = config.path.clone();
        let localhost = Arc::clone(&ctx.localhost);
        let sub = ctx.bus.subscribe("imon", Self::filter(&path, &localhost));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut actor = Self {
            path,
            localhost,
            ctx,
            token,
            sub,
            cmd_tx,
            cmd_rx,
            config,
            instance_status: BTreeMap::new(),
            instance_monitor: BTreeMap::new(),
            node_status: HashMap::new(),
            node_monitor: HashMap::new(),
            node_stats: HashMap::new(),
            node_config: None,
            state: InstanceMonitor {
                session_id: Uuid::new_v4(),
                ..Default::default()
            },
            published: None,
            pending: None,
            pending_seq: 0,
            restart_batches: HashMap::new(),
            batch_seq: 0,
            fetching: HashSet::new(),
        };
        actor.init_resource_monitors();
        actor.warm_start();
        actor
    }

    fn filter(path: &ObjectPath, localhost: &str) -> Filter {
        Filter::new()
            .with_path(EventKind::InstanceStatusUpdated, path)
            .with_path(EventKind::InstanceStatusDeleted, path)
            .with_path_node(EventKind::InstanceConfigUpdated, path, localhost)
            .with_path(EventKind::InstanceMonitorUpdated, path)
            .with_path(EventKind::InstanceMonitorDeleted, path)
            .with_path_node(EventKind::SetInstanceMonitor, path, localhost)
            .with(EventKind::NodeStatusUpdated)
            .with(EventKind::NodeMonitorUpdated)
            .with(EventKind::NodeStatsUpdated)
            .with_node(EventKind::NodeConfigUpdated, localhost)
            .with(EventKind::PeerDropped)
    }

    /// Seeds the caches from the store and the bus retained values.
    fn warm_start(&mut self) {
        self.instance_status = self.known_statuses();
        self.instance_monitor = self.known_monitors();
        self.apply_retained_node_events();
    }

    /// Rebuilds the caches after the subscription dropped events.
    ///
    /// Status changes go through the regular handler so stonith flags and
    /// local expectations follow. Operator requests lost in the gap are not
    /// recovered; their effect reaches this node through the peer rows.
    pub(super) fn resync(&mut self) {
        let statuses = self.known_statuses();
        self.instance_status
            .retain(|node, _| statuses.contains_key(node));
        for (node, st) in statuses {
            let cached = self
                .instance_status
                .get(&node)
                .is_some_and(|cur| Arc::ptr_eq(cur, &st));
            if !cached {
                self.on_instance_status_updated(&node, &st);
            }
        }
        if let Some(cfg) = self.known_config() {
            self.on_config_updated(&cfg);
        }
        self.instance_monitor = self.known_monitors();
        self.apply_retained_node_events();
        self.converge_global_expect_from_remote();
    }

    /// Retained events of `kind` labeled with the monitored object.
    fn retained(&self, kind: EventKind) -> Vec<Arc<Event>> {
        let mut events = self.ctx.bus.last_all(kind);
        events.retain(|ev| ev.path.as_ref() == Some(&self.path));
        events
    }

    /// Store statuses of the object, replaced by fresher retained updates.
    fn known_statuses(&self) -> BTreeMap<String, Arc<InstanceStatus>> {
        let mut rows = self.ctx.store.status.get_by_path(&self.path);
        for ev in self.retained(EventKind::InstanceStatusUpdated) {
            if let (Some(node), Payload::InstanceStatusUpdated(st)) =
                (ev.node.as_deref(), &ev.payload)
                && rows
                    .get(node)
                    .is_none_or(|cur| st.updated_at > cur.updated_at)
            {
                rows.insert(node.to_string(), Arc::clone(st));
            }
        }
        rows
    }

    /// Peer rows from the store, replaced by fresher retained updates.
    fn known_monitors(&self) -> BTreeMap<String, Arc<InstanceMonitor>> {
        let mut rows = self.ctx.store.monitor.get_by_path(&self.path);
        for ev in self.retained(EventKind::InstanceMonitorUpdated) {
            if let (Some(node), Payload::InstanceMonitorUpdated(mon)) =
                (ev.node.as_deref(), &ev.payload)
                && rows
                    .get(node)
                    .is_none_or(|cur| mon.updated_at > cur.updated_at)
            {
                rows.insert(node.to_string(), Arc::clone(mon));
            }
        }
        rows.remove(&*self.localhost);
        rows
    }

    fn known_config(&self) -> Option<Arc<InstanceConfig>> {
        if let Some(cfg) = self.ctx.store.config.get(&self.path, &self.localhost) {
            return Some(cfg);
        }
        let ev = self.ctx.bus.last(
            EventKind::InstanceConfigUpdated,
            Some(&self.path),
            Some(&self.localhost),
        )?;
        match &ev.payload {
            Payload::InstanceConfigUpdated(cfg) => Some(Arc::clone(cfg)),
            _ => None,
        }
    }

    fn apply_retained_node_events(&mut self) {
        for kind in [
            EventKind::NodeStatusUpdated,
            EventKind::NodeMonitorUpdated,
            EventKind::NodeStatsUpdated,
        ] {
            for ev in self.ctx.bus.last_all(kind) {
                self.apply_node_event(&ev);
            }
        }
        if let Some(ev) =
            self.ctx
                .bus
                .last(EventKind::NodeConfigUpdated, None, Some(&self.localhost))
        {
            self.apply_node_event(&ev);
        }
    }

    /// Runs until the token is cancelled or the bus closes.
    ///
    /// On exit the local row is removed from the store and its deletion is
    /// published.
    pub async fn run(mut self) {
        tracing::info!("monitor started");
        if !self.instance_status.contains_key(&*self.localhost) {
            self.refresh_status();
        }
        self.converge_global_expect_from_remote();
        self.cycle().await;

        loop {
            select! {
                _ = self.token.cancelled() => break,
                ev = self.sub.next() => match ev {
                    Some(Delivery::Event(ev)) => self.on_event(&ev).await,
                    Some(Delivery::Lagged(skipped)) => {
                        tracing::warn!(skipped, "events lost, resync from the store");
                        self.resync();
                        self.cycle().await;
                    }
                    None => break,
                },
                Some(cmd) = self.cmd_rx.recv() => self.on_command(cmd).await,
            }
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.clear_pending();
        for (_, batch) in self.restart_batches.drain() {
            batch.token.cancel();
        }
        self.ctx.store.monitor.unset(&self.path, &self.localhost);
        self.ctx.bus.publish(Event::instance_monitor_deleted(
            self.path.clone(),
            Arc::clone(&self.localhost),
        ));
        tracing::info!("monitor stopped");
    }

    /// One reconciliation pass.
    pub(super) async fn cycle(&mut self) {
        self.update_is_leader();
        self.orchestrate().await;
        self.update_if_change();
    }

    pub(super) async fn on_event(&mut self, ev: &Event) {
        let Some(node) = ev.node.as_deref() else {
            return;
        };
        let is_local = node == &*self.localhost;
        match &ev.payload {
            Payload::InstanceStatusUpdated(st) => self.on_instance_status_updated(node, st),
            Payload::InstanceStatusDeleted => {
                self.instance_status.remove(node);
            }
            Payload::InstanceConfigUpdated(cfg) if is_local => self.on_config_updated(cfg),
            Payload::InstanceMonitorUpdated(mon) if !is_local => {
                self.instance_monitor
                    .insert(node.to_string(), Arc::clone(mon));
                self.converge_global_expect_from_remote();
            }
            Payload::InstanceMonitorDeleted if !is_local => {
                self.instance_monitor.remove(node);
            }
            Payload::NodeStatusUpdated(_)
            | Payload::NodeMonitorUpdated(_)
            | Payload::NodeStatsUpdated(_)
            | Payload::NodeConfigUpdated(_) => self.apply_node_event(ev),
            Payload::PeerDropped => self.on_peer_dropped(node),
            Payload::SetInstanceMonitor(update) if is_local => {
                let update = Arc::clone(update);
                self.on_set_instance_monitor(&update);
            }
            _ => return,
        }
        self.cycle().await;
    }

    pub(super) async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::ActionDone { doing, next, after } => self.on_action_done(doing, next, after),
            Command::ReadyElapsed { generation } => self.on_ready_elapsed(generation),
            Command::RestartDue { batch } => self.on_restart_due(batch),
            Command::FetchDone { rid, name } => {
                self.fetching.remove(&(rid, name));
                return;
            }
        }
        self.cycle().await;
    }

    fn apply_node_event(&mut self, ev: &Event) {
        let Some(node) = ev.node.as_deref() else {
            return;
        };
        match &ev.payload {
            Payload::NodeStatusUpdated(st) => {
                self.node_status.insert(node.to_string(), Arc::clone(st));
            }
            Payload::NodeMonitorUpdated(mon) => {
                self.node_monitor.insert(node.to_string(), Arc::clone(mon));
            }
            Payload::NodeStatsUpdated(stats) => {
                self.node_stats.insert(node.to_string(), Arc::clone(stats));
            }
            Payload::NodeConfigUpdated(cfg) if node == &*self.localhost => {
                self.node_config = Some(Arc::clone(cfg));
            }
            _ => {}
        }
    }

    /// (Re)initializes restart bookkeeping from the current config.
    ///
    /// Budgets of resources whose configured count changed are reset, entries
    /// of resources no longer monitored are dropped.
    pub(super) fn init_resource_monitors(&mut self) {
        let configured: BTreeMap<String, u32> = self
            .config
            .resources
            .iter()
            .filter(|(_, rc)| rc.restart > 0)
            .map(|(rid, rc)| (rid.clone(), rc.restart))
            .collect();

        let stale: Vec<String> = self
            .state
            .resources
            .keys()
            .filter(|rid| !configured.contains_key(rid.as_str()))
            .cloned()
            .collect();
        for rid in stale {
            self.cancel_restart_timer(&rid);
            self.state.resources.remove(&rid);
        }
        for (rid, restart) in configured {
            self.state
                .resources
                .entry(rid)
                .or_insert_with(|| ResourceMonitor {
                    restart: RestartMonitor {
                        remaining: restart,
                        ..Default::default()
                    },
                });
        }
        self.state.monitor_action_executed_at = None;
    }

    /// Publishes the local row if its content changed since the last publication.
    pub(super) fn update_if_change(&mut self) {
        if let Some(prev) = &self.published {
            if same_content(prev, &self.state) {
                return;
            }
        }
        let prev = self.published.take().unwrap_or_default();
        if prev.state != self.state.state {
            self.state.state_updated = stamp(self.state.state_updated);
            tracing::info!("state {} -> {}", prev.state, self.state.state);
        }
        if prev.local_expect != self.state.local_expect {
            self.state.local_expect_updated = stamp(self.state.local_expect_updated);
            tracing::info!(
                "local expect {} -> {}",
                prev.local_expect,
                self.state.local_expect
            );
        }
        if prev.global_expect != self.state.global_expect {
            tracing::info!(
                "global expect {} -> {}",
                prev.global_expect,
                self.state.global_expect
            );
        }
        if prev.is_leader != self.state.is_leader || prev.is_ha_leader != self.state.is_ha_leader {
            tracing::info!(
                is_leader = self.state.is_leader,
                is_ha_leader = self.state.is_ha_leader,
                "leadership changed"
            );
        }
        self.state.updated_at = stamp(self.state.updated_at);
        self.ctx
            .store
            .monitor
            .set(&self.path, &self.localhost, self.state.clone());
        self.ctx.bus.publish(Event::instance_monitor(
            self.path.clone(),
            Arc::clone(&self.localhost),
            self.state.clone(),
        ));
        self.published = Some(self.state.clone());
    }

    /// The cached status of the local instance.
    pub(super) fn local_status(&self) -> Option<&InstanceStatus> {
        self.instance_status.get(&*self.localhost).map(Arc::as_ref)
    }

    /// The row of `node`, local included.
    pub(super) fn monitor_of(&self, node: &str) -> Option<&InstanceMonitor> {
        if node == &*self.localhost {
            Some(&self.state)
        } else {
            self.instance_monitor.get(node).map(Arc::as_ref)
        }
    }
}

#[cfg(test)]
impl MonitorActor {
    pub(crate) async fn next_command(&mut self) -> Command {
        self.cmd_rx.recv().await.expect("command channel open")
    }

    pub(crate) fn try_next_command(&mut self) -> Option<Command> {
        self.cmd_rx.try_recv().ok()
    }

    /// Applies queued commands until the inbox stays empty.
    pub(crate) async fn drain_commands(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.on_command(cmd).await;
        }
    }
}

/// Equality ignoring the stamps `update_if_change` maintains.
fn same_content(published: &InstanceMonitor, current: &InstanceMonitor) -> bool {
    let mut current = current.clone();
    current.updated_at = published.updated_at;
    current.state_updated = published.state_updated;
    current.local_expect_updated = published.local_expect_updated;
    *published == current
}

/// Returns `now`, or `prev + 1µs` when the clock did not move past `prev`.
pub(crate) fn stamp(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    let floor = prev + TimeDelta::microseconds(1);
    if now > floor { now } else { floor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GlobalExpect;

    #[test]
    fn stamp_is_strictly_increasing() {
        let far = Utc::now() + TimeDelta::hours(1);
        assert!(stamp(far) > far);
        let a = stamp(DateTime::<Utc>::default());
        assert!(stamp(a) > a);
    }

    #[tokio::test]
    async fn unchanged_row_is_not_republished() {
        let h = crate::testing::Harness::new(&["n1"]);
        let mut actor = h.actor("n1", h.failover_config());
        let mut sub = h.bus.subscribe(
            "test",
            Filter::new().with(EventKind::InstanceMonitorUpdated),
        );

        actor.update_if_change();
        actor.update_if_change();
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());

        actor.state.state = MonitorState::Ready;
        actor.update_if_change();
        let ev = sub.try_recv().unwrap();
        match &ev.payload {
            Payload::InstanceMonitorUpdated(m) => {
                assert_eq!(m.state, MonitorState::Ready);
                assert!(m.state_updated > DateTime::<Utc>::default());
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(h.store.monitor.get(&actor.path, "n1").is_some());
    }

    #[tokio::test]
    async fn lagged_subscription_resyncs_from_store_and_retained_events() {
        let h = crate::testing::Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        h.seed_cluster(&mut n1, &["n1", "n2"]);

        let id = Uuid::new_v4();
        h.bus.publish(Event::instance_monitor(
            h.path.clone(),
            "n2",
            InstanceMonitor {
                global_expect: GlobalExpect::Stopped,
                global_expect_updated: Utc::now(),
                orchestration_id: Some(id),
                ..Default::default()
            },
        ));
        h.publish_status("n2", crate::testing::status_up());
        for _ in 0..1100 {
            h.bus.publish(Event::node_stats("n3", NodeStats::default()));
        }

        match n1.sub.next().await {
            Some(Delivery::Lagged(skipped)) => assert!(skipped > 0),
            other => panic!("expected a lag, got {other:?}"),
        }
        n1.resync();
        assert!(n1.instance_monitor.contains_key("n2"));
        assert_eq!(n1.state.global_expect, GlobalExpect::Stopped);
        assert_eq!(n1.state.orchestration_id, Some(id));
        assert!(n1.instance_status["n2"].is_up());
        assert!(n1.node_stats.contains_key("n3"));
    }
}
