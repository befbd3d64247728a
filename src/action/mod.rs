//! External actions.
//!
//! ## Contents
//! - [`ActionSpec`] argv builder (`[path, verb, flags..]`)
//! - [`Executor`] trait implemented by [`CommandExecutor`] (child processes,
//!   concurrency cap, timeouts) and by test doubles

mod executor;
mod spec;

pub use executor::{CommandExecutor, Executor};
pub use spec::ActionSpec;
