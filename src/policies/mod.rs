//! Restart delay policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how resource restart delays evolve (first / factor / max)
//!
//! ## Quick wiring
//! ```text
//! ResourceConfig { restart, restart_delay }
//!      └─► imon restart engine uses:
//!           - restart as the budget of the episode
//!           - backoff.with_first(restart_delay).next(attempt) as the minimum
//!             delay between two restarts of the resource
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=0s, factor=1.0 (constant), max=5min.

mod backoff;

pub use backoff::BackoffPolicy;
