//! Error types used by the monitor runtime.
//!
//! This module defines the error enums of the crate:
//!
//! - [`ActionError`]: an external lifecycle action failed.
//! - [`RequestError`]: an operator request was refused.
//! - [`FetchError`]: a resource file could not be fetched from a peer.
//! - [`ConfigError`]: runtime configuration could not be loaded.
//! - [`RuntimeError`]: the daemon could not be built or did not stop cleanly.
//!
//! All types provide `as_label` (stable snake_case label for logs).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by external actions.
///
/// An action is an external command such as `svc/web start --local`. Failures
/// move the monitor to an explicit `*Failed` state; they are never retried
/// without a new expectation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ActionError {
    /// The command exited with a non-zero status.
    #[error("{title}: exit code {code:?}")]
    Exit {
        title: String,
        /// `None` when the process was killed by a signal.
        code: Option<i32>,
    },

    /// The command could not be spawned.
    #[error("{title}: spawn failed: {error}")]
    Spawn { title: String, error: String },

    /// The command exceeded its timeout and was killed.
    #[error("{title}: timed out after {timeout:?}")]
    Timeout { title: String, timeout: Duration },

    /// The action was canceled before it could run.
    #[error("{title}: canceled")]
    Canceled { title: String },

    /// The concurrency limiter is closed (runtime shutting down).
    #[error("{title}: executor closed")]
    Closed { title: String },
}

impl ActionError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use imon::ActionError;
    ///
    /// let err = ActionError::Exit { title: "start".into(), code: Some(1) };
    /// assert_eq!(err.as_label(), "action_exit");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ActionError::Exit { .. } => "action_exit",
            ActionError::Spawn { .. } => "action_spawn",
            ActionError::Timeout { .. } => "action_timeout",
            ActionError::Canceled { .. } => "action_canceled",
            ActionError::Closed { .. } => "action_closed",
        }
    }
}

/// # Errors returned for refused operator requests.
///
/// A refused request never mutates the monitor state.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// A string did not map to a known enum value.
    #[error("unknown {what}: {value:?}")]
    Unknown { what: &'static str, value: String },

    /// The object cannot be orchestrated to the requested target.
    #[error("not orchestrateable: {reason}")]
    NotOrchestrateable { reason: String },

    #[error("already started")]
    AlreadyStarted,

    /// `placed@` without destination and no candidate qualifies.
    #[error("no destination node could be selected")]
    NoDestination,

    #[error("destination {node} is not in the object scope")]
    DestinationNotInScope { node: String },

    /// A peer already set a different, more recent global expectation.
    #[error("global expect is already {global_expect} on node {node}")]
    Superseded { node: String, global_expect: String },

    /// Operators may only reset the monitor state to idle.
    #[error("can not set state {state}")]
    InvalidState { state: String },

    #[error("can not set local expect {local_expect}")]
    InvalidLocalExpect { local_expect: String },
}

impl RequestError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RequestError::Unknown { .. } => "request_unknown",
            RequestError::NotOrchestrateable { .. } => "request_not_orchestrateable",
            RequestError::AlreadyStarted => "request_already_started",
            RequestError::NoDestination => "request_no_destination",
            RequestError::DestinationNotInScope { .. } => "request_destination_not_in_scope",
            RequestError::Superseded { .. } => "request_superseded",
            RequestError::InvalidState { .. } => "request_invalid_state",
            RequestError::InvalidLocalExpect { .. } => "request_invalid_local_expect",
        }
    }
}

/// # Errors produced while synchronizing resource files from a peer.
///
/// These are logged and skipped; the next status event retries.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(String),

    #[error("peer answered {status}")]
    Status { status: u16 },

    #[error("bad header {name}: {value:?}")]
    Header { name: &'static str, value: String },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FetchError::Http(_) => "fetch_http",
            FetchError::Status { .. } => "fetch_status",
            FetchError::Header { .. } => "fetch_header",
            FetchError::Checksum { .. } => "fetch_checksum",
            FetchError::Io(_) => "fetch_io",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e.to_string())
    }
}

/// # Errors produced while loading the runtime configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid: {0}")]
    Invalid(String),

    /// No hostname in config, `$HOSTNAME` or `/etc/hostname`.
    #[error("can not determine the local hostname")]
    MissingHostname,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid(_) => "config_invalid",
            ConfigError::MissingHostname => "config_missing_hostname",
        }
    }
}

/// # Errors produced by the daemon runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The peer file fetcher could not be built.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Shutdown grace period was exceeded; some monitors remained stuck.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        grace: Duration,
        /// Paths of the monitors that did not exit in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(e) => e.as_label(),
            RuntimeError::Fetch(e) => e.as_label(),
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
