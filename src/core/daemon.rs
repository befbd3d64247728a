//! # Daemon: monitor set, fan-out delivery and graceful shutdown.
//!
//! The [`Daemon`] owns the event bus, the shared [`Store`], a
//! [`SubscriberSet`] and the [`MonitorSet`] of the local node.
//!
//! ## Key responsibilities
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - run one instance monitor per local object (see [`MonitorSet`])
//! - handle OS termination signals (SIGINT/SIGTERM/Ctrl-C)
//! - stop monitors within [`Config::grace`]
//!
//! ## High-level architecture
//! ```text
//! run():
//!   subscriber_listener(): Bus.subscribe_all() ─► SubscriberSet::emit(&Event)
//!   MonitorSet::spawn_listener():
//!       InstanceConfigUpdated(local) ─► MonitorActor::run()  (child token, span path/node)
//!
//! Feeders (status, node data, operator requests) ── publish ──► Bus
//!
//! Shutdown path:
//!   signal or Daemon::shutdown()
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► runtime_token.cancel()        → monitors exit, rows unset
//!     └─► executor.close()
//!     └─► wait for the monitor set within cfg.grace:
//!            ├─ Ok      → Bus.publish(AllStoppedWithin)
//!            └─ timeout → Bus.publish(GraceExceeded{stuck})
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use imon::{Config, Daemon, Subscribe};
//! #[cfg(feature = "logging")]
//! use imon::LogWriter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::load("/etc/imon.toml")?;
//!
//!     let mut subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!     #[cfg(feature = "logging")]
//!     subs.push(Arc::new(LogWriter));
//!
//!     let daemon = Daemon::builder(cfg).with_subscribers(subs).build()?;
//!     daemon.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::{builder::DaemonBuilder, registry::MonitorSet, shutdown};
use crate::{
    config::Config,
    error::RuntimeError,
    events::{Bus, Event, Payload},
    imon::Context,
    store::Store,
    subscribers::SubscriberSet,
};

/// Runs the instance monitors of the local node.
pub struct Daemon {
    cfg: Arc<Config>,
    ctx: Context,
    subs: Arc<SubscriberSet>,
    monitors: Arc<MonitorSet>,
    runtime_token: CancellationToken,
}

impl Daemon {
    /// Creates a builder for configuring the daemon.
    pub fn builder(cfg: Config) -> DaemonBuilder {
        DaemonBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: Arc<Config>,
        ctx: Context,
        subs: Arc<SubscriberSet>,
        monitors: Arc<MonitorSet>,
        runtime_token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            ctx,
            subs,
            monitors,
            runtime_token,
        }
    }

    /// The bus feeders publish cluster data and operator requests to.
    pub fn bus(&self) -> &Bus {
        &self.ctx.bus
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.ctx.store
    }

    pub fn localhost(&self) -> &str {
        &self.ctx.localhost
    }

    pub fn monitors(&self) -> &Arc<MonitorSet> {
        &self.monitors
    }

    /// Requests a graceful shutdown; [`Daemon::run`] returns once monitors stopped.
    pub fn shutdown(&self) {
        self.runtime_token.cancel();
    }

    /// Runs until a termination signal or [`Daemon::shutdown`], then stops
    /// every monitor within the grace period.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        tracing::info!(node = %self.ctx.localhost, "daemon started");
        self.subscriber_listener();
        let listener = Arc::clone(&self.monitors).spawn_listener();

        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => match res {
                Ok(signal) => tracing::info!(signal, "shutdown requested"),
                Err(err) => tracing::error!("signal registration failed: {err}"),
            },
            _ = self.runtime_token.cancelled() => tracing::info!("shutdown requested"),
        }

        self.ctx.bus.publish(Event::new(Payload::ShutdownRequested));
        self.runtime_token.cancel();
        self.ctx.executor.close();
        self.wait_all_with_grace(listener).await
    }

    /// Forwards every bus event to the subscriber set (fire-and-forget).
    fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.ctx.bus.subscribe_all();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Waits for the monitor set listener, which stops every monitor on
    /// cancellation.
    ///
    /// Publishes `AllStoppedWithin` on success, or `GraceExceeded` on timeout
    /// and returns [`RuntimeError::GraceExceeded`] with the stuck monitors.
    async fn wait_all_with_grace(
        &self,
        listener: tokio::task::JoinHandle<()>,
    ) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        match tokio::time::timeout(grace, listener).await {
            Ok(_) => {
                tracing::info!("all monitors stopped");
                self.ctx.bus.publish(Event::new(Payload::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.monitors.running().await;
                tracing::error!(?stuck, "shutdown grace {grace:?} exceeded");
                self.ctx.bus.publish(Event::new(Payload::GraceExceeded {
                    stuck: stuck.clone(),
                }));
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}
