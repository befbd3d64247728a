//! Bus events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to cluster data and monitor publications.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`Payload`] event classification, labels and data
//! - [`Bus`] wrapper over `tokio::sync::broadcast` with last-value retention
//! - [`Filter`], [`Subscription`], [`Delivery`] label-based filtered consumption
//!   and lag reports
//!
//! ## Quick reference
//! - **Publishers**: instance monitors (their own row, orchestration ends,
//!   monitor actions), external feeders (statuses, configs, node data),
//!   the operator API (`SetInstanceMonitor`), `SubscriberSet` workers.
//! - **Consumers**: one [`Subscription`] per instance monitor, the
//!   `MonitorSet` discovery loop, the daemon's `SubscriberSet` listener.

mod bus;
mod event;

pub use bus::{Bus, Delivery, Filter, Subscription};
pub use event::{Event, EventKind, Payload};
