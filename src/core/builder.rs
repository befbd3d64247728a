use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{daemon::Daemon, registry::MonitorSet};
use crate::{
    action::{CommandExecutor, Executor},
    config::Config,
    error::RuntimeError,
    events::Bus,
    filesync::{Fetcher, HttpFetcher},
    imon::Context,
    store::Store,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Daemon`].
///
/// Collaborators left unset get their production implementation:
/// [`CommandExecutor`] for actions, [`HttpFetcher`] for peer files.
pub struct DaemonBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    executor: Option<Arc<dyn Executor>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    store: Option<Arc<Store>>,
}

impl DaemonBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            executor: None,
            fetcher: None,
            store: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive every bus event through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the action executor.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replaces the peer file fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Shares an existing store with the daemon.
    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the daemon.
    ///
    /// Must be called inside a tokio runtime: subscriber workers are spawned
    /// here. Fails when the local hostname can not be resolved or the default
    /// fetcher can not be built.
    pub fn build(self) -> Result<Daemon, RuntimeError> {
        let localhost: Arc<str> = Arc::from(self.cfg.local_node()?);
        let executor = match self.executor {
            Some(e) => e,
            None => Arc::new(CommandExecutor::new(&self.cfg)),
        };
        let fetcher = match self.fetcher {
            Some(f) => f,
            None => Arc::new(HttpFetcher::new(&self.cfg.fetch)?),
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, Some(bus.clone())));
        let runtime_token = CancellationToken::new();
        let cfg = Arc::new(self.cfg);

        let ctx = Context {
            bus,
            store: self.store.unwrap_or_default(),
            executor,
            fetcher,
            config: Arc::clone(&cfg),
            localhost,
        };
        let monitors = MonitorSet::new(ctx.clone(), runtime_token.clone());

        Ok(Daemon::new_internal(cfg, ctx, subs, monitors, runtime_token))
    }
}
