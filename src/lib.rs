//! # imon
//!
//! **imon** runs one *instance monitor* per clustered object on each node.
//! Every monitor drives its local instance toward a cluster-wide **global
//! expectation** (started, stopped, placed, purged, ...) that converges across
//! nodes by timestamp, elects leaders through a placement policy, and restarts
//! failed resources within a budget.
//!
//! Monitors share nothing. Each publishes its own row on the [`Bus`] and
//! rebuilds its view of the peers from their publications; external actions
//! (`start`, `stop`, `freeze`, ...) go through an [`Executor`].
//!
//! ## Architecture
//! ```text
//!   status feeder    node feeder     operator API         peers (heartbeat)
//!        │                │                │                     │
//!        ▼                ▼                ▼                     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Bus (broadcast, last-value retention)             │
//! └──────┬───────────────────┬──────────────────────┬─────────────────┘
//!        ▼                   ▼                      ▼
//!   MonitorSet        MonitorActor svc/a     MonitorActor svc/b ...
//!  (config events)          │                      │
//!                           │ cycle():             │
//!                           │   update_is_leader   │
//!                           │   orchestrate        │
//!                           │   update_if_change ──┼──► Store + Bus
//!                           ▼                      ▼
//!                      Executor (child processes, concurrency cap)
//!
//!   Bus ──► Daemon subscriber listener ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ## Monitor row
//! ```text
//! GlobalExpect (cluster intent, converged by global_expect_updated)
//!   └─► LocalExpect (what this node keeps running)
//!         └─► State (idle, ready, starting, stop failed, ...)
//! ```
//!
//! ## Features
//! | Area              | Description                                             | Key types / traits                    |
//! |-------------------|---------------------------------------------------------|---------------------------------------|
//! | **Runtime**       | Discover local objects, run monitors, graceful shutdown | [`Daemon`], [`MonitorSet`]            |
//! | **Monitor**       | Per-instance orchestration state machine                | [`MonitorActor`], [`Context`]         |
//! | **Actions**       | External commands with timeouts and a concurrency cap   | [`Executor`], [`CommandExecutor`]     |
//! | **Data**          | Statuses, configs, monitor rows                         | [`Store`], [`InstanceMonitor`]        |
//! | **Subscriber API**| Observe every bus event                                 | [`Subscribe`], [`SubscriberSet`]      |
//! | **Errors**        | Typed errors with stable labels                         | [`ActionError`], [`RequestError`]     |
//! | **Configuration** | TOML runtime settings                                   | [`Config`]                            |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use imon::{Config, Daemon, Event, InstanceConfig, MonitorUpdate, ObjectPath, GlobalExpect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::from_toml_str("hostname = \"n1\"")?;
//!     let daemon = Arc::new(Daemon::builder(cfg).build()?);
//!
//!     let path = ObjectPath::svc("web");
//!     let scope = vec!["n1".to_string(), "n2".to_string()];
//!     daemon
//!         .bus()
//!         .publish(Event::instance_config(path.clone(), "n1", InstanceConfig::new(path.clone(), scope)));
//!     daemon.bus().publish(Event::set_instance_monitor(
//!         path,
//!         "n1",
//!         MonitorUpdate::global_expect(GlobalExpect::Started),
//!     ));
//!
//!     daemon.run().await?;
//!     Ok(())
//! }
//! ```

mod action;
mod config;
mod core;
mod error;
pub mod events;
mod filesync;
mod imon;
mod model;
pub mod placement;
mod policies;
mod store;
mod subscribers;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use action::{ActionSpec, CommandExecutor, Executor};
pub use config::{Config, FetchConfig};
pub use self::core::{Daemon, DaemonBuilder, MonitorSet};
pub use error::{ActionError, ConfigError, FetchError, RequestError, RuntimeError};
pub use events::{Bus, Delivery, Event, EventKind, Filter, Payload, Subscription};
pub use filesync::{FetchRequest, FetchedFile, Fetcher, HttpFetcher, install, sync_file};
pub use imon::{Context, MonitorActor};
pub use model::{
    Avail, GlobalExpect, GlobalExpectOptions, InstanceConfig, InstanceMonitor, InstanceStatus,
    Kind, LocalExpect, MonitorAction, MonitorState, MonitorUpdate, NodeConfig, NodeMonitor,
    NodeMonitorState, NodeStats, NodeStatus, ObjectPath, ObjectStatus, OrchestrateMode,
    PlacementPolicy, Provisioned, ResourceConfig, ResourceFile, ResourceMonitor, ResourceStatus,
    RestartMonitor, Topology,
};
pub use policies::BackoffPolicy;
pub use store::{Store, Table};
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in logger subscriber, enabled by default.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
