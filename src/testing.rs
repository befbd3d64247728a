//! Test doubles shared by the unit tests.
//!
//! [`Harness`] wires monitors to one bus and one store, with a
//! [`RecordingExecutor`] per node. Successful object actions on the harness
//! object publish the status they would produce (`start` brings the instance
//! up, `freeze` freezes it, ...), so monitors running on the same bus see the
//! effect of each other's actions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionSpec, Executor};
use crate::config::Config;
use crate::error::{ActionError, FetchError};
use crate::events::{Bus, Event, Subscription};
use crate::filesync::{FetchRequest, FetchedFile, Fetcher};
use crate::imon::{Context, MonitorActor};
use crate::model::{
    Avail, InstanceConfig, InstanceStatus, MonitorAction, NodeMonitor, NodeMonitorState,
    ObjectPath, Provisioned,
};
use crate::store::Store;

pub(crate) fn status_down() -> InstanceStatus {
    InstanceStatus {
        avail: Avail::Down,
        overall: Avail::Down,
        provisioned: Provisioned::True,
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub(crate) fn status_up() -> InstanceStatus {
    InstanceStatus {
        avail: Avail::Up,
        overall: Avail::Up,
        ..status_down()
    }
}

/// Executor recording every call.
pub(crate) struct RecordingExecutor {
    node: String,
    path: ObjectPath,
    bus: Bus,
    store: Arc<Store>,
    calls: Mutex<Vec<String>>,
    system: Mutex<Vec<MonitorAction>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingExecutor {
    /// `svc/web start --local` style lines, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls without the `status -r` refreshes.
    pub(crate) fn actions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.ends_with("status -r"))
            .collect()
    }

    pub(crate) fn system_calls(&self) -> Vec<MonitorAction> {
        self.system
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes actions titled `verb` fail.
    pub(crate) fn fail(&self, verb: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(verb.to_string());
    }

    fn simulate(&self, spec: &ActionSpec) {
        if spec.raw || spec.args.first() != Some(&self.path.to_string()) {
            return;
        }
        if spec.args.iter().any(|a| a == "--rid") {
            return;
        }
        let mut st = self
            .store
            .status
            .get(&self.path, &self.node)
            .map(|s| (*s).clone())
            .unwrap_or_else(status_down);
        match spec.title.as_str() {
            "start" => st.avail = Avail::Up,
            "stop" | "shutdown" => st.avail = Avail::Down,
            "freeze" => st.frozen_at = Some(Utc::now()),
            "unfreeze" => st.frozen_at = None,
            "provision" => st.provisioned = Provisioned::True,
            "unprovision" => st.provisioned = Provisioned::False,
            "status" => {}
            _ => return,
        }
        st.overall = st.avail;
        st.updated_at = Utc::now();
        self.store.status.set(&self.path, &self.node, st.clone());
        self.bus
            .publish(Event::instance_status(self.path.clone(), self.node.as_str(), st));
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn action(&self, spec: &ActionSpec, token: &CancellationToken) -> Result<(), ActionError> {
        if token.is_cancelled() {
            return Err(ActionError::Canceled {
                title: spec.title.clone(),
            });
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.args.join(" "));
        let fails = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&spec.title);
        if fails {
            return Err(ActionError::Exit {
                title: spec.title.clone(),
                code: Some(1),
            });
        }
        self.simulate(spec);
        Ok(())
    }

    async fn system(&self, action: MonitorAction) -> Result<(), ActionError> {
        self.system
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
        Ok(())
    }
}

/// Fetcher recording requests and answering 404.
#[derive(Default)]
pub(crate) struct RecordingFetcher {
    requests: Mutex<Vec<FetchRequest>>,
}

impl RecordingFetcher {
    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req.clone());
        Err(FetchError::Status { status: 404 })
    }
}

/// A small cluster sharing one bus and one store.
pub(crate) struct Harness {
    pub(crate) bus: Bus,
    pub(crate) store: Arc<Store>,
    pub(crate) fetcher: Arc<RecordingFetcher>,
    pub(crate) config: Arc<Config>,
    pub(crate) path: ObjectPath,
    pub(crate) token: CancellationToken,
    scope: Vec<String>,
    executors: HashMap<String, Arc<RecordingExecutor>>,
}

impl Harness {
    pub(crate) fn new(scope: &[&str]) -> Self {
        let bus = Bus::new(1024);
        let store = Arc::new(Store::new());
        let path = ObjectPath::svc("web");
        let executors = scope
            .iter()
            .map(|node| {
                let exec = RecordingExecutor {
                    node: node.to_string(),
                    path: path.clone(),
                    bus: bus.clone(),
                    store: Arc::clone(&store),
                    calls: Mutex::default(),
                    system: Mutex::default(),
                    failing: Mutex::default(),
                };
                (node.to_string(), Arc::new(exec))
            })
            .collect();
        Self {
            bus,
            store,
            fetcher: Arc::new(RecordingFetcher::default()),
            config: Arc::new(Config {
                hostname: Some(scope.first().copied().unwrap_or("n1").to_string()),
                ..Config::default()
            }),
            path,
            token: CancellationToken::new(),
            scope: scope.iter().map(|s| s.to_string()).collect(),
            executors,
        }
    }

    pub(crate) fn executor(&self, node: &str) -> Arc<RecordingExecutor> {
        Arc::clone(&self.executors[node])
    }

    pub(crate) fn context(&self, node: &str) -> Context {
        Context {
            bus: self.bus.clone(),
            store: Arc::clone(&self.store),
            executor: self.executor(node),
            fetcher: self.fetcher.clone(),
            config: Arc::clone(&self.config),
            localhost: Arc::from(node),
        }
    }

    /// A failover service over the harness scope.
    pub(crate) fn failover_config(&self) -> Arc<InstanceConfig> {
        Arc::new(InstanceConfig::new(self.path.clone(), self.scope.clone()))
    }

    pub(crate) fn actor(&self, node: &str, cfg: Arc<InstanceConfig>) -> MonitorActor {
        MonitorActor::new(self.context(node), cfg, self.token.child_token())
    }

    /// Fills the actor caches: every node known, down and idle.
    pub(crate) fn seed_cluster(&self, actor: &mut MonitorActor, nodes: &[&str]) {
        for node in nodes {
            actor
                .instance_status
                .insert(node.to_string(), Arc::new(status_down()));
            actor.node_monitor.insert(
                node.to_string(),
                Arc::new(NodeMonitor {
                    state: NodeMonitorState::Idle,
                }),
            );
        }
    }

    /// Publishes the instance status of `node` to the store and the bus.
    pub(crate) fn publish_status(&self, node: &str, st: InstanceStatus) {
        self.store.status.set(&self.path, node, st.clone());
        self.bus
            .publish(Event::instance_status(self.path.clone(), node, st));
    }

    pub(crate) fn publish_node_monitor(&self, node: &str, state: NodeMonitorState) {
        self.bus
            .publish(Event::node_monitor(node, NodeMonitor { state }));
    }

    /// Seeds statuses and node monitors, then starts one monitor per node.
    pub(crate) fn spawn_cluster(&self, cfg: &Arc<InstanceConfig>) -> Vec<JoinHandle<()>> {
        for node in &self.scope {
            self.publish_status(node, status_down());
            self.publish_node_monitor(node, NodeMonitorState::Idle);
        }
        self.scope
            .iter()
            .map(|node| {
                let actor = self.actor(node, Arc::clone(cfg));
                tokio::spawn(actor.run())
            })
            .collect()
    }

    /// Waits until `pred` accepts an event, failing after a minute of
    /// (possibly paused) time.
    pub(crate) async fn wait_for<F>(&self, sub: &mut Subscription, mut pred: F) -> Arc<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let wait = async {
            loop {
                let Some(ev) = sub.recv().await else {
                    panic!("bus closed");
                };
                if pred(&ev) {
                    return ev;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(60), wait)
            .await
            .expect("event not seen in time")
    }

    pub(crate) async fn shutdown(&self, handles: Vec<JoinHandle<()>>) {
        self.token.cancel();
        for h in handles {
            let _ = h.await;
        }
    }
}
