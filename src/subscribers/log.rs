//! # Logging subscriber.
//!
//! [`LogWriter`] renders bus events as `tracing` records. Data churn
//! (status/config/stats updates) goes to `debug`, orchestration outcomes and
//! monitor actions to `info`/`warn`.
//!
//! ## Example
//! ```no_run
//! # use imon::{Config, Daemon, LogWriter};
//! # use std::sync::Arc;
//! # async fn demo(executor: Arc<dyn imon::Executor>) {
//! let daemon = Daemon::builder(Config::default())
//!     .with_executor(executor)
//!     .with_subscribers(vec![Arc::new(LogWriter)])
//!     .build();
//! # let _ = daemon;
//! # }
//! ```

use async_trait::async_trait;

use crate::events::{Event, Payload};
use crate::subscribers::Subscribe;

/// Bus event logger.
///
/// Enabled via the `logging` feature.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let path = e.path.as_ref().map(|p| p.to_string()).unwrap_or_default();
        let node = e.node.as_deref().unwrap_or("");
        match &e.payload {
            Payload::InstanceMonitorUpdated(m) => {
                tracing::debug!(
                    %path, node,
                    state = m.state.as_str(),
                    global_expect = m.global_expect.as_str(),
                    local_expect = m.local_expect.as_str(),
                    is_leader = m.is_leader,
                    "[imon-updated]"
                );
            }
            Payload::InstanceMonitorDeleted => tracing::debug!(%path, node, "[imon-deleted]"),
            Payload::InstanceMonitorAction { action, rid } => {
                tracing::warn!(%path, node, action = action.as_str(), rid, "[monitor-action]");
            }
            Payload::ObjectOrchestrationEnd {
                id,
                global_expect,
                error: Some(err),
            } => {
                tracing::warn!(%path, node, ?id, global_expect = global_expect.as_str(), err, "[orchestration-refused]");
            }
            Payload::ObjectOrchestrationEnd {
                id, global_expect, ..
            } => {
                tracing::info!(%path, node, ?id, global_expect = global_expect.as_str(), "[orchestration-end]");
            }
            Payload::SetInstanceMonitor(u) => {
                tracing::info!(%path, node, update = ?u, "[set-imon]");
            }
            Payload::PeerDropped => tracing::info!(node, "[peer-dropped]"),
            Payload::SubscriberPanicked { subscriber, info } => {
                tracing::error!(subscriber, info, "[subscriber-panicked]");
            }
            Payload::SubscriberOverflow { subscriber, reason } => {
                tracing::warn!(subscriber, reason, "[subscriber-overflow]");
            }
            Payload::ShutdownRequested => tracing::info!("[shutdown-requested]"),
            Payload::AllStoppedWithin => tracing::info!("[all-stopped-within-grace]"),
            Payload::GraceExceeded { stuck } => {
                tracing::error!(?stuck, "[grace-exceeded]");
            }
            other => tracing::debug!(%path, node, kind = ?other.kind(), "[data]"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
