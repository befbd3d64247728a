//! # Event subscribers for the monitor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   InstanceMonitor ── publish(Event) ──► Bus ──► Daemon listener
//!                                                    │
//!                                               SubscriberSet::emit
//!                                                    │
//!                                         ┌──────────┼──────────┐
//!                                         ▼          ▼          ▼
//!                                     LogWriter    Audit     Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
