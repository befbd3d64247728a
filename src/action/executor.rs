//! # Action executor.
//!
//! [`Executor`] is the seam between the monitors and the outside world: every
//! lifecycle action (start, stop, freeze, provision, ...) and every node-level
//! monitor action (crash, reboot) goes through it.
//!
//! [`CommandExecutor`] runs actions as child processes:
//! ```text
//! action(spec)
//!   ├─► acquire semaphore permit (cancellable, optional)
//!   ├─► spawn [prefix.., args..] (raw specs skip the prefix)
//!   ├─► wait with optional timeout (child killed on expiry)
//!   └─► exit status 0 → Ok, else ActionError::Exit
//! ```
//!
//! ## Rules
//! - At most `max_concurrent_actions` commands run at once across all monitors.
//! - Cancellation is checked before the command is spawned, never after.
//! - A closed semaphore maps to [`ActionError::Closed`].

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::{process::Command, select, sync::Semaphore, time};
use tokio_util::sync::CancellationToken;

use super::ActionSpec;
use crate::config::Config;
use crate::error::ActionError;
use crate::model::MonitorAction;

/// Runs external actions on behalf of the monitors.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Runs one action to completion.
    async fn action(&self, spec: &ActionSpec, token: &CancellationToken)
    -> Result<(), ActionError>;

    /// Runs a node-level monitor action (`crash`, `reboot`).
    async fn system(&self, action: MonitorAction) -> Result<(), ActionError>;

    /// Refuses further actions. Called once on daemon shutdown.
    fn close(&self) {}
}

/// Child-process executor with a global concurrency cap.
pub struct CommandExecutor {
    prefix: Vec<String>,
    semaphore: Option<Arc<Semaphore>>,
    sysrq: PathBuf,
}

impl CommandExecutor {
    pub fn new(cfg: &Config) -> Self {
        Self {
            prefix: cfg.command.clone(),
            semaphore: cfg
                .concurrency_limit()
                .map(|n| Arc::new(Semaphore::new(n))),
            sysrq: PathBuf::from("/proc/sysrq-trigger"),
        }
    }

    /// Overrides the sysrq trigger file used by `crash` and `reboot`.
    pub fn with_sysrq(mut self, path: impl Into<PathBuf>) -> Self {
        self.sysrq = path.into();
        self
    }

    fn argv(&self, spec: &ActionSpec) -> Vec<String> {
        if spec.raw {
            spec.args.clone()
        } else {
            self.prefix.iter().chain(spec.args.iter()).cloned().collect()
        }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn action(
        &self,
        spec: &ActionSpec,
        token: &CancellationToken,
    ) -> Result<(), ActionError> {
        let title = spec.title.clone();
        if token.is_cancelled() {
            return Err(ActionError::Canceled { title });
        }
        let _permit = match &self.semaphore {
            Some(sem) => {
                let permit_future = sem.clone().acquire_owned();
                tokio::pin!(permit_future);
                select! {
                    res = &mut permit_future => match res {
                        Ok(permit) => Some(permit),
                        Err(_closed) => return Err(ActionError::Closed { title }),
                    },
                    _ = token.cancelled() => return Err(ActionError::Canceled { title }),
                }
            }
            None => None,
        };

        let argv = self.argv(spec);
        let Some((program, args)) = argv.split_first() else {
            return Err(ActionError::Spawn {
                title,
                error: "empty command".to_string(),
            });
        };
        tracing::info!(action = %title, argv = ?argv, "exec");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ActionError::Spawn {
                title: title.clone(),
                error: e.to_string(),
            })?;

        let output = match spec.timeout {
            Some(dur) => match time::timeout(dur, child.wait_with_output()).await {
                Ok(r) => r,
                Err(_elapsed) => return Err(ActionError::Timeout { title, timeout: dur }),
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| ActionError::Spawn {
            title: title.clone(),
            error: e.to_string(),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(action = %title, code = ?output.status.code(), stderr = %stderr.trim(), "exec failed");
            Err(ActionError::Exit {
                title,
                code: output.status.code(),
            })
        }
    }

    async fn system(&self, action: MonitorAction) -> Result<(), ActionError> {
        let key = match action {
            MonitorAction::Crash => "c",
            MonitorAction::Reboot => "b",
            other => {
                return Err(ActionError::Spawn {
                    title: other.as_str().to_string(),
                    error: "not a system action".to_string(),
                });
            }
        };
        tracing::warn!(action = action.as_str(), "system monitor action");
        tokio::fs::write(&self.sysrq, key)
            .await
            .map_err(|e| ActionError::Spawn {
                title: action.as_str().to_string(),
                error: e.to_string(),
            })
    }

    /// Closes the semaphore: queued and future actions fail with `Closed`.
    fn close(&self) {
        if let Some(sem) = &self.semaphore {
            sem.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn executor(command: &[&str]) -> CommandExecutor {
        let cfg = Config {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        };
        CommandExecutor::new(&cfg)
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let ex = executor(&["true"]);
        let spec = ActionSpec::object(&crate::model::ObjectPath::svc("web"), "start");
        ex.action(&spec, &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_exit_error() {
        let ex = executor(&["false"]);
        let spec = ActionSpec::object(&crate::model::ObjectPath::svc("web"), "stop");
        let err = ex.action(&spec, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "action_exit");
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let ex = executor(&["true"]);
        let spec = ActionSpec::raw("sleep", "sleep 5")
            .unwrap()
            .with_timeout(Some(Duration::from_millis(50)));
        let err = ex.action(&spec, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "action_timeout");
    }

    #[tokio::test]
    async fn cancelled_token_skips_spawn() {
        let ex = executor(&["/nonexistent/binary"]);
        let token = CancellationToken::new();
        token.cancel();
        let spec = ActionSpec::object(&crate::model::ObjectPath::svc("web"), "start");
        let err = ex.action(&spec, &token).await.unwrap_err();
        assert_eq!(err.as_label(), "action_canceled");
    }

    #[tokio::test]
    async fn closed_semaphore_is_reported() {
        let ex = executor(&["true"]);
        ex.close();
        let spec = ActionSpec::object(&crate::model::ObjectPath::svc("web"), "start");
        let err = ex.action(&spec, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "action_closed");
    }

    #[tokio::test]
    async fn system_writes_sysrq_key() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = dir.path().join("sysrq-trigger");
        let ex = executor(&["true"]).with_sysrq(&trigger);
        ex.system(MonitorAction::Reboot).await.unwrap();
        assert_eq!(std::fs::read_to_string(&trigger).unwrap(), "b");
        assert!(ex.system(MonitorAction::Switch).await.is_err());
    }
}
