//! # Monitor set: event-driven instance monitor lifecycle.
//!
//! [`MonitorSet`] subscribes to the instance configs of the local node and
//! keeps exactly one [`MonitorActor`] per object whose scope includes it:
//! - `InstanceConfigUpdated`, local node in scope → spawn the monitor (once)
//! - `InstanceConfigUpdated`, local node out of scope → stop the monitor
//! - `InstanceConfigDeleted` → stop the monitor
//!
//! ## Architecture
//! ```text
//! Bus → MonitorSet listener
//!         ├─► ConfigUpdated(cfg) ─► in scope ? ensure_running(cfg) : stop(path)
//!         └─► ConfigDeleted      ─► stop(path)
//!
//! stop(path): cancel token ─► join ─► (monitor unsets its row, publishes deletion)
//! ```
//!
//! ## Rules
//! - The set owns the handles (JoinHandle + CancellationToken).
//! - Config changes of a running monitor are applied by the monitor itself.
//! - A monitor that exited on its own is respawned on the next config event.
//! - Lost config events trigger a reconcile against the store and the bus
//!   retained configs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::events::{Delivery, Event, EventKind, Filter, Payload};
use crate::imon::{Context, MonitorActor};
use crate::model::{InstanceConfig, ObjectPath};

/// Handle to a running monitor.
struct Handle {
    join: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Registry of the instance monitors of the local node.
pub struct MonitorSet {
    monitors: RwLock<BTreeMap<ObjectPath, Handle>>,
    ctx: Context,
    runtime_token: CancellationToken,
}

impl MonitorSet {
    pub fn new(ctx: Context, runtime_token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            monitors: RwLock::new(BTreeMap::new()),
            ctx,
            runtime_token,
        })
    }

    /// Spawns the listener managing monitor lifecycles.
    ///
    /// Configs already in the store are applied first. The listener exits on
    /// runtime cancellation, after stopping every monitor.
    pub fn spawn_listener(self: Arc<Self>) -> JoinHandle<()> {
        let localhost = Arc::clone(&self.ctx.localhost);
        let mut sub = self.ctx.bus.subscribe(
            "monitor-set",
            Filter::new()
                .with_node(EventKind::InstanceConfigUpdated, &localhost)
                .with_node(EventKind::InstanceConfigDeleted, &localhost),
        );
        let rt = self.runtime_token.clone();

        tokio::spawn(async move {
            for (_, cfg) in self.ctx.store.config.get_by_node(&localhost) {
                self.apply_config(cfg).await;
            }
            loop {
                tokio::select! {
                    _ = rt.cancelled() => break,
                    ev = sub.next() => match ev {
                        Some(Delivery::Event(ev)) => self.handle_event(&ev).await,
                        Some(Delivery::Lagged(_)) => self.reconcile().await,
                        None => break,
                    },
                }
            }
            self.shutdown().await;
        })
    }

    /// Configs of the local node known to the store or retained by the bus.
    fn known_configs(&self) -> BTreeMap<ObjectPath, Arc<InstanceConfig>> {
        let mut configs = self.ctx.store.config.get_by_node(&self.ctx.localhost);
        for ev in self.ctx.bus.last_all(EventKind::InstanceConfigUpdated) {
            if ev.node.as_deref() != Some(&*self.ctx.localhost) {
                continue;
            }
            if let Payload::InstanceConfigUpdated(cfg) = &ev.payload {
                configs.insert(cfg.path.clone(), Arc::clone(cfg));
            }
        }
        configs
    }

    /// Brings the set in line with the known configs after lost events.
    async fn reconcile(&self) {
        tracing::warn!("config events lost, reconcile monitors");
        let configs = self.known_configs();
        for path in self.list().await {
            if !configs.contains_key(&path) {
                self.stop(&path).await;
            }
        }
        for (_, cfg) in configs {
            self.apply_config(cfg).await;
        }
    }

    async fn handle_event(&self, ev: &Event) {
        match &ev.payload {
            Payload::InstanceConfigUpdated(cfg) => self.apply_config(Arc::clone(cfg)).await,
            Payload::InstanceConfigDeleted => {
                if let Some(path) = &ev.path {
                    self.stop(path).await;
                }
            }
            _ => {}
        }
    }

    async fn apply_config(&self, cfg: Arc<InstanceConfig>) {
        if cfg.in_scope(&self.ctx.localhost) {
            self.ensure_running(cfg).await;
        } else {
            self.stop(&cfg.path).await;
        }
    }

    /// Returns the paths of the registered monitors, sorted.
    pub async fn list(&self) -> Vec<ObjectPath> {
        self.monitors.read().await.keys().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.monitors.read().await.is_empty()
    }

    /// Paths of the monitors whose task did not finish yet.
    pub async fn running(&self) -> Vec<String> {
        self.monitors
            .read()
            .await
            .iter()
            .filter(|(_, h)| !h.join.is_finished())
            .map(|(path, _)| path.to_string())
            .collect()
    }

    /// Cancels every monitor and waits for them: cancel all → join each.
    ///
    /// Handles leave the set only once joined, so a caller timing this out
    /// can list the stuck monitors with [`MonitorSet::running`].
    pub async fn shutdown(&self) {
        let mut monitors = self.monitors.write().await;
        for h in monitors.values() {
            h.cancel.cancel();
        }
        while let Some((path, mut h)) = monitors.pop_first() {
            if let Err(err) = (&mut h.join).await {
                tracing::error!(path = %path, "monitor task failed: {err}");
            }
        }
    }

    async fn ensure_running(&self, cfg: Arc<InstanceConfig>) {
        let mut monitors = self.monitors.write().await;
        if let Some(h) = monitors.get(&cfg.path) {
            if !h.join.is_finished() {
                return;
            }
            tracing::warn!(path = %cfg.path, "monitor exited, respawn");
        }

        let path = cfg.path.clone();
        let cancel = self.runtime_token.child_token();
        let actor = MonitorActor::new(self.ctx.clone(), cfg, cancel.clone());
        let span = tracing::info_span!("imon", path = %path, node = %self.ctx.localhost);
        let join = tokio::spawn(actor.run().instrument(span));
        monitors.insert(path, Handle { join, cancel });
    }

    async fn stop(&self, path: &ObjectPath) {
        let Some(h) = self.monitors.write().await.remove(path) else {
            return;
        };
        h.cancel.cancel();
        if let Err(err) = h.join.await {
            tracing::error!(path = %path, "monitor task failed: {err}");
        }
    }
}
