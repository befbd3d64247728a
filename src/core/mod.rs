//! Daemon runtime: monitor lifecycle and shutdown.
//!
//! The public API of this module is [`Daemon`] (built with [`DaemonBuilder`])
//! and the [`MonitorSet`] it drives.
//!
//! Internal modules:
//! - [`registry`]: one instance monitor per local object, driven by config events;
//! - [`daemon`]: subscriber fan-out, signals, grace-bounded shutdown;
//! - [`builder`]: default collaborators and wiring;
//! - [`shutdown`]: cross-platform termination signals.

mod builder;
mod daemon;
mod registry;
mod shutdown;

pub use builder::DaemonBuilder;
pub use daemon::Daemon;
pub use registry::MonitorSet;
