//! # Instance monitor.
//!
//! One [`MonitorActor`] per `(object, local node)` drives the local instance
//! toward the cluster-wide global expectation. Monitors never share memory:
//! each one publishes its own row on the bus and rebuilds its view of the
//! peers from their publications.
//!
//! ## Contents
//! - `worker` actor loop, caches, publication of the local row
//! - `converge` adoption of the newest peer global expectation
//! - `leader` leader and HA-leader election through the placement policy
//! - `request` validation of operator requests
//! - `handlers` status, config and peer-drop bookkeeping, file sync trigger
//! - `orchestration` the state machine, one handler per global expectation
//! - `restart` resource restart engine and monitor actions
//! - `action` inline and queued actions, the ready window
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use imon::{CommandExecutor, Config, Context, HttpFetcher, InstanceConfig, MonitorActor, ObjectPath, Store};
//! use imon::events::Bus;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::default());
//! let ctx = Context {
//!     bus: Bus::new(config.bus_capacity_clamped()),
//!     store: Arc::new(Store::new()),
//!     executor: Arc::new(CommandExecutor::new(&config)),
//!     fetcher: Arc::new(HttpFetcher::new(&config.fetch)?),
//!     config: Arc::clone(&config),
//!     localhost: Arc::from("n1"),
//! };
//! let cfg = InstanceConfig::new(ObjectPath::svc("web"), vec!["n1".into(), "n2".into()]);
//! let actor = MonitorActor::new(ctx, Arc::new(cfg), CancellationToken::new());
//! tokio::spawn(actor.run());
//! # Ok(())
//! # }
//! ```

mod action;
mod converge;
mod handlers;
mod leader;
mod orchestration;
mod request;
mod restart;
mod worker;

pub use worker::{Context, MonitorActor};
