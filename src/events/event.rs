//! # Events carried by the bus.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Instance data**: status/config/monitor updates and deletions of one instance
//! - **Node data**: node status/config/monitor/stats updates, peer drops
//! - **Commands**: operator requests addressed to one instance monitor
//! - **Runtime**: orchestration ends, monitor actions, subscriber and shutdown notices
//!
//! The [`Event`] struct carries the typed [`Payload`] plus its labels (object
//! path, node) used by subscriptions to filter.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) and a wall-clock
//! timestamp taken at construction, i.e. at publish time. Convergence logic
//! compares the timestamps embedded in the payloads, never receive times.
//!
//! ## Example
//! ```rust
//! use imon::{Event, EventKind, InstanceStatus, ObjectPath};
//!
//! let ev = Event::instance_status(ObjectPath::svc("web"), "n1", InstanceStatus::default());
//! assert_eq!(ev.kind(), EventKind::InstanceStatusUpdated);
//! assert_eq!(ev.node.as_deref(), Some("n1"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use uuid::Uuid;

use crate::model::{
    GlobalExpect, InstanceConfig, InstanceMonitor, InstanceStatus, MonitorAction, MonitorUpdate,
    NodeConfig, NodeMonitor, NodeStats, NodeStatus, ObjectPath,
};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of bus events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Instance data ===
    InstanceStatusUpdated,
    InstanceStatusDeleted,
    InstanceConfigUpdated,
    InstanceConfigDeleted,
    InstanceMonitorUpdated,
    InstanceMonitorDeleted,

    // === Node data ===
    NodeStatusUpdated,
    NodeConfigUpdated,
    NodeMonitorUpdated,
    NodeStatsUpdated,
    /// A peer node disconnected from the heartbeat mesh.
    PeerDropped,

    // === Commands ===
    /// Operator request to change an instance monitor.
    SetInstanceMonitor,

    // === Runtime ===
    /// A monitor action is about to run.
    InstanceMonitorAction,
    /// An orchestration reached its target, or a request was refused.
    ObjectOrchestrationEnd,
    SubscriberPanicked,
    SubscriberOverflow,
    ShutdownRequested,
    AllStoppedWithin,
    GraceExceeded,
}

impl EventKind {
    /// Updates are retained by the bus for warm starts.
    pub fn is_retained(&self) -> bool {
        matches!(
            self,
            EventKind::InstanceStatusUpdated
                | EventKind::InstanceConfigUpdated
                | EventKind::InstanceMonitorUpdated
                | EventKind::NodeStatusUpdated
                | EventKind::NodeConfigUpdated
                | EventKind::NodeMonitorUpdated
                | EventKind::NodeStatsUpdated
        )
    }

    /// The retained update kind a deletion invalidates.
    pub fn invalidates(&self) -> Option<EventKind> {
        match self {
            EventKind::InstanceStatusDeleted => Some(EventKind::InstanceStatusUpdated),
            EventKind::InstanceConfigDeleted => Some(EventKind::InstanceConfigUpdated),
            EventKind::InstanceMonitorDeleted => Some(EventKind::InstanceMonitorUpdated),
            _ => None,
        }
    }
}

/// Typed event payload.
#[derive(Clone, Debug)]
pub enum Payload {
    InstanceStatusUpdated(Arc<InstanceStatus>),
    InstanceStatusDeleted,
    InstanceConfigUpdated(Arc<InstanceConfig>),
    InstanceConfigDeleted,
    InstanceMonitorUpdated(Arc<InstanceMonitor>),
    InstanceMonitorDeleted,
    NodeStatusUpdated(Arc<NodeStatus>),
    NodeConfigUpdated(Arc<NodeConfig>),
    NodeMonitorUpdated(Arc<NodeMonitor>),
    NodeStatsUpdated(Arc<NodeStats>),
    PeerDropped,
    SetInstanceMonitor(Arc<MonitorUpdate>),
    InstanceMonitorAction {
        action: MonitorAction,
        rid: String,
    },
    ObjectOrchestrationEnd {
        id: Option<Uuid>,
        global_expect: GlobalExpect,
        error: Option<String>,
    },
    SubscriberPanicked {
        subscriber: &'static str,
        info: String,
    },
    SubscriberOverflow {
        subscriber: &'static str,
        reason: &'static str,
    },
    ShutdownRequested,
    AllStoppedWithin,
    GraceExceeded {
        stuck: Vec<String>,
    },
}

impl Payload {
    pub fn kind(&self) -> EventKind {
        match self {
            Payload::InstanceStatusUpdated(_) => EventKind::InstanceStatusUpdated,
            Payload::InstanceStatusDeleted => EventKind::InstanceStatusDeleted,
            Payload::InstanceConfigUpdated(_) => EventKind::InstanceConfigUpdated,
            Payload::InstanceConfigDeleted => EventKind::InstanceConfigDeleted,
            Payload::InstanceMonitorUpdated(_) => EventKind::InstanceMonitorUpdated,
            Payload::InstanceMonitorDeleted => EventKind::InstanceMonitorDeleted,
            Payload::NodeStatusUpdated(_) => EventKind::NodeStatusUpdated,
            Payload::NodeConfigUpdated(_) => EventKind::NodeConfigUpdated,
            Payload::NodeMonitorUpdated(_) => EventKind::NodeMonitorUpdated,
            Payload::NodeStatsUpdated(_) => EventKind::NodeStatsUpdated,
            Payload::PeerDropped => EventKind::PeerDropped,
            Payload::SetInstanceMonitor(_) => EventKind::SetInstanceMonitor,
            Payload::InstanceMonitorAction { .. } => EventKind::InstanceMonitorAction,
            Payload::ObjectOrchestrationEnd { .. } => EventKind::ObjectOrchestrationEnd,
            Payload::SubscriberPanicked { .. } => EventKind::SubscriberPanicked,
            Payload::SubscriberOverflow { .. } => EventKind::SubscriberOverflow,
            Payload::ShutdownRequested => EventKind::ShutdownRequested,
            Payload::AllStoppedWithin => EventKind::AllStoppedWithin,
            Payload::GraceExceeded { .. } => EventKind::GraceExceeded,
        }
    }
}

/// Bus event with labels.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (publish time)
/// - `path`/`node`: labels used for filtering and retention
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Object label, if applicable.
    pub path: Option<ObjectPath>,
    /// Node label, if applicable.
    pub node: Option<Arc<str>>,
    pub payload: Payload,
}

impl Event {
    /// Creates a new unlabeled event with current timestamp and next sequence number.
    pub fn new(payload: Payload) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            path: None,
            node: None,
            payload,
        }
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Attaches an object label.
    #[inline]
    pub fn with_path(mut self, path: ObjectPath) -> Self {
        self.path = Some(path);
        self
    }

    /// Attaches a node label.
    #[inline]
    pub fn with_node(mut self, node: impl Into<Arc<str>>) -> Self {
        self.node = Some(node.into());
        self
    }

    fn instance(path: ObjectPath, node: impl Into<Arc<str>>, payload: Payload) -> Self {
        Event::new(payload).with_path(path).with_node(node)
    }

    pub fn instance_status(path: ObjectPath, node: impl Into<Arc<str>>, st: InstanceStatus) -> Self {
        Self::instance(path, node, Payload::InstanceStatusUpdated(Arc::new(st)))
    }

    pub fn instance_status_deleted(path: ObjectPath, node: impl Into<Arc<str>>) -> Self {
        Self::instance(path, node, Payload::InstanceStatusDeleted)
    }

    pub fn instance_config(path: ObjectPath, node: impl Into<Arc<str>>, cfg: InstanceConfig) -> Self {
        Self::instance(path, node, Payload::InstanceConfigUpdated(Arc::new(cfg)))
    }

    pub fn instance_config_deleted(path: ObjectPath, node: impl Into<Arc<str>>) -> Self {
        Self::instance(path, node, Payload::InstanceConfigDeleted)
    }

    pub fn instance_monitor(
        path: ObjectPath,
        node: impl Into<Arc<str>>,
        mon: InstanceMonitor,
    ) -> Self {
        Self::instance(path, node, Payload::InstanceMonitorUpdated(Arc::new(mon)))
    }

    pub fn instance_monitor_deleted(path: ObjectPath, node: impl Into<Arc<str>>) -> Self {
        Self::instance(path, node, Payload::InstanceMonitorDeleted)
    }

    /// Operator request addressed to the monitor of `path` on `node`.
    pub fn set_instance_monitor(
        path: ObjectPath,
        node: impl Into<Arc<str>>,
        update: MonitorUpdate,
    ) -> Self {
        Self::instance(path, node, Payload::SetInstanceMonitor(Arc::new(update)))
    }

    pub fn node_status(node: impl Into<Arc<str>>, st: NodeStatus) -> Self {
        Event::new(Payload::NodeStatusUpdated(Arc::new(st))).with_node(node)
    }

    pub fn node_config(node: impl Into<Arc<str>>, cfg: NodeConfig) -> Self {
        Event::new(Payload::NodeConfigUpdated(Arc::new(cfg))).with_node(node)
    }

    pub fn node_monitor(node: impl Into<Arc<str>>, mon: NodeMonitor) -> Self {
        Event::new(Payload::NodeMonitorUpdated(Arc::new(mon))).with_node(node)
    }

    pub fn node_stats(node: impl Into<Arc<str>>, stats: NodeStats) -> Self {
        Event::new(Payload::NodeStatsUpdated(Arc::new(stats))).with_node(node)
    }

    pub fn peer_dropped(node: impl Into<Arc<str>>) -> Self {
        Event::new(Payload::PeerDropped).with_node(node)
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(Payload::SubscriberOverflow { subscriber, reason })
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(Payload::SubscriberPanicked { subscriber, info })
    }
}
