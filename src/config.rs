//! # Runtime configuration.
//!
//! Provides [`Config`] centralized settings for the monitor runtime.
//!
//! Config is used in three places:
//! 1. **Daemon creation**: bus capacity, action concurrency, shutdown grace
//! 2. **Monitor creation**: ready period and action timeouts
//! 3. **Executor creation**: command prefix and concurrency limit
//!
//! ## Sentinel values
//! - `max_concurrent_actions = 0` → unlimited (no semaphore created)
//! - `*_timeout = 0s` → no timeout
//!
//! ## TOML
//! Durations are expressed in seconds:
//! ```toml
//! hostname = "n1"
//! command = ["om"]
//! max_concurrent_actions = 25
//! ready_period = 5
//! stop_timeout = 120
//!
//! [restart_backoff]
//! factor = 2.0
//! max = 300
//!
//! [fetch]
//! port = 1215
//! token = "secret"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::BackoffPolicy;

/// Global configuration for the monitor runtime.
///
/// ## Field semantics
/// - `hostname`: local node name (`None` = resolve from the environment)
/// - `command`: argv prefix of every action (`[<prefix>.., <path>, <verb>, ..]`)
/// - `max_concurrent_actions`: cap on running actions (`0` = unlimited)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `ready_period`: settle window before a failover start
/// - `start_timeout`/`stop_timeout`/`action_timeout`: per-action kill deadline (`0s` = none)
/// - `grace`: maximum wait for monitors to exit on shutdown
/// - `restart_backoff`: growth of resource restart delays
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hostname: Option<String>,
    pub command: Vec<String>,
    pub max_concurrent_actions: usize,
    pub bus_capacity: usize,
    #[serde(with = "secs")]
    pub ready_period: Duration,
    #[serde(with = "secs")]
    pub start_timeout: Duration,
    #[serde(with = "secs")]
    pub stop_timeout: Duration,
    #[serde(with = "secs")]
    pub action_timeout: Duration,
    #[serde(with = "secs")]
    pub grace: Duration,
    pub restart_backoff: BackoffPolicy,
    pub fetch: FetchConfig,
}

/// Peer file transfer settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub port: u16,
    /// Bearer token presented to peers.
    pub token: Option<String>,
    pub accept_invalid_certs: bool,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            port: 1215,
            token: None,
            accept_invalid_certs: false,
            timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Parses a TOML document, filling absent keys with defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::Invalid("command is empty".into()));
        }
        if self.restart_backoff.factor < 1.0 {
            return Err(ConfigError::Invalid("restart_backoff.factor < 1.0".into()));
        }
        Ok(())
    }

    /// Returns the local node name.
    ///
    /// Resolution order: `hostname` key, `$HOSTNAME`, `/etc/hostname`.
    pub fn local_node(&self) -> Result<String, ConfigError> {
        let from_env = || std::env::var("HOSTNAME").ok();
        let from_file = || std::fs::read_to_string("/etc/hostname").ok();
        self.hostname
            .clone()
            .or_else(from_env)
            .or_else(from_file)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingHostname)
    }

    /// Returns the action concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited (no semaphore)
    /// - `Some(n)` → at most `n` concurrent actions
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent_actions == 0 {
            None
        } else {
            Some(self.max_concurrent_actions)
        }
    }

    #[inline]
    pub fn start_timeout(&self) -> Option<Duration> {
        non_zero(self.start_timeout)
    }

    #[inline]
    pub fn stop_timeout(&self) -> Option<Duration> {
        non_zero(self.stop_timeout)
    }

    #[inline]
    pub fn action_timeout(&self) -> Option<Duration> {
        non_zero(self.action_timeout)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d == Duration::ZERO { None } else { Some(d) }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `command = ["om"]`
    /// - `max_concurrent_actions = 25`
    /// - `bus_capacity = 1024`
    /// - `ready_period = 5s`
    /// - `stop_timeout = 0s`, `start_timeout = 0s`, `action_timeout = 0s` (no timeout)
    /// - `grace = 60s`
    /// - `restart_backoff = BackoffPolicy::default()` (constant delay)
    fn default() -> Self {
        Self {
            hostname: None,
            command: vec!["om".to_string()],
            max_concurrent_actions: 25,
            bus_capacity: 1024,
            ready_period: Duration::from_secs(5),
            start_timeout: Duration::ZERO,
            stop_timeout: Duration::ZERO,
            action_timeout: Duration::ZERO,
            grace: Duration::from_secs(60),
            restart_backoff: BackoffPolicy::default(),
            fetch: FetchConfig::default(),
        }
    }
}

/// Serde adapter: `Duration` as fractional seconds.
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let v = f64::deserialize(d)?;
        Duration::try_from_secs_f64(v).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter: `Option<Duration>` as fractional seconds.
pub(crate) mod secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|v| Duration::try_from_secs_f64(v).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.concurrency_limit(), Some(25));
        assert_eq!(cfg.stop_timeout(), None);
        assert_eq!(cfg.ready_period, Duration::from_secs(5));
    }

    #[test]
    fn parses_toml_with_partial_keys() {
        let cfg = Config::from_toml_str(
            r#"
            hostname = "n1"
            max_concurrent_actions = 0
            ready_period = 0.5
            stop_timeout = 120

            [restart_backoff]
            factor = 2.0

            [fetch]
            token = "s3cr3t"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.local_node().unwrap(), "n1");
        assert_eq!(cfg.concurrency_limit(), None);
        assert_eq!(cfg.ready_period, Duration::from_millis(500));
        assert_eq!(cfg.stop_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(cfg.restart_backoff.factor, 2.0);
        assert_eq!(cfg.fetch.port, 1215);
        assert_eq!(cfg.fetch.token.as_deref(), Some("s3cr3t"));
        assert_eq!(cfg.command, vec!["om".to_string()]);
    }

    #[test]
    fn rejects_empty_command() {
        let err = Config::from_toml_str("command = []").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn rejects_shrinking_backoff() {
        let err = Config::from_toml_str("[restart_backoff]\nfactor = 0.5").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }
}
