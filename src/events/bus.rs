//! # Event bus for cluster data and monitor publications.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from many sources (monitors, data feeders, the
//! operator API) and filtered, ordered subscriptions.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                       Subscribers (many):
//!   imon svc/a@n1 ──┐                    ┌──► Subscription(Filter: path=svc/a)
//!   imon svc/b@n1 ──┼──► Bus ───────────┼──► Subscription(Filter: path=svc/b)
//!   status feeder ──┤  (broadcast chan)  ├──► MonitorSet (config updates)
//!   operator api  ──┘        │           └──► SubscriberSet (LogWriter, ...)
//!                            ▼
//!                    retained last value
//!                  per (kind, path, node)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers skip the oldest items; [`Subscription::recv`]
//!   logs the gap and continues.
//! - **Retention**: the last update of each retained kind is kept per label set,
//!   so late subscribers can warm-start with [`Bus::last`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::event::{Event, EventKind};
use crate::model::ObjectPath;

type RetainKey = (EventKind, Option<ObjectPath>, Option<Arc<str>>);

/// Broadcast channel for bus events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery guarantee beyond the ring buffer.
/// - **Cloneable**: cheap to clone (`Arc`-backed sender and retention map).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Arc<Event>>,
    retained: Arc<RwLock<HashMap<RetainKey, Arc<Event>>>>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            retained: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// Retained kinds replace the previous value for the same labels; deletions
    /// drop the retained update they invalidate.
    pub fn publish(&self, ev: Event) {
        let ev = Arc::new(ev);
        let kind = ev.kind();
        {
            let mut retained = self.retained.write().unwrap_or_else(PoisonError::into_inner);
            if kind.is_retained() {
                retained.insert((kind, ev.path.clone(), ev.node.clone()), Arc::clone(&ev));
            } else if let Some(updated) = kind.invalidates() {
                retained.remove(&(updated, ev.path.clone(), ev.node.clone()));
            }
        }
        let _ = self.tx.send(ev);
    }

    /// Returns the last retained event of `kind` for the given labels.
    pub fn last(
        &self,
        kind: EventKind,
        path: Option<&ObjectPath>,
        node: Option<&str>,
    ) -> Option<Arc<Event>> {
        let key = (kind, path.cloned(), node.map(Arc::from));
        self.retained
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Returns every retained event of `kind`, whatever the labels.
    pub fn last_all(&self, kind: EventKind) -> Vec<Arc<Event>> {
        let mut out: Vec<Arc<Event>> = self
            .retained
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, ev)| Arc::clone(ev))
            .collect();
        out.sort_by_key(|ev| ev.seq);
        out
    }

    /// Creates an unfiltered receiver that observes subsequent events.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Arc<Event>> {
        self.tx.subscribe()
    }

    /// Creates a filtered subscription that observes subsequent events.
    pub fn subscribe(&self, name: &'static str, filter: Filter) -> Subscription {
        Subscription {
            name,
            filter,
            rx: self.tx.subscribe(),
        }
    }
}

/// One accepted `(kind, labels)` combination.
#[derive(Clone, Debug)]
struct Rule {
    kind: EventKind,
    path: Option<ObjectPath>,
    node: Option<Arc<str>>,
}

/// Set of rules; an event matches when any rule matches.
///
/// A rule label left unset matches any value of that label.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    rules: Vec<Rule>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts every event of `kind`.
    pub fn with(mut self, kind: EventKind) -> Self {
        self.rules.push(Rule {
            kind,
            path: None,
            node: None,
        });
        self
    }

    /// Accepts events of `kind` labeled with `path`.
    pub fn with_path(mut self, kind: EventKind, path: &ObjectPath) -> Self {
        self.rules.push(Rule {
            kind,
            path: Some(path.clone()),
            node: None,
        });
        self
    }

    /// Accepts events of `kind` labeled with `node`.
    pub fn with_node(mut self, kind: EventKind, node: &str) -> Self {
        self.rules.push(Rule {
            kind,
            path: None,
            node: Some(Arc::from(node)),
        });
        self
    }

    /// Accepts events of `kind` labeled with both `path` and `node`.
    pub fn with_path_node(mut self, kind: EventKind, path: &ObjectPath, node: &str) -> Self {
        self.rules.push(Rule {
            kind,
            path: Some(path.clone()),
            node: Some(Arc::from(node)),
        });
        self
    }

    pub fn matches(&self, ev: &Event) -> bool {
        let kind = ev.kind();
        self.rules.iter().any(|r| {
            r.kind == kind
                && r.path.as_ref().is_none_or(|p| ev.path.as_ref() == Some(p))
                && r.node.as_ref().is_none_or(|n| ev.node.as_ref() == Some(n))
        })
    }
}

/// Filtered, ordered view of the bus for one consumer.
pub struct Subscription {
    name: &'static str,
    filter: Filter,
    rx: broadcast::Receiver<Arc<Event>>,
}

/// One step of a [`Subscription`].
#[derive(Debug)]
pub enum Delivery {
    Event(Arc<Event>),
    /// The receiver fell behind and `skipped` events were dropped, matching
    /// or not. Consumers caching bus state must rebuild it from the store
    /// and the retained values.
    Lagged(u64),
}

impl Subscription {
    /// Waits for the next matching event, or reports a lag.
    ///
    /// `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if self.filter.matches(&ev) => return Some(Delivery::Event(ev)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(subscription = self.name, skipped, "bus subscription lagged");
                    return Some(Delivery::Lagged(skipped));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Waits for the next matching event, stepping over lags.
    ///
    /// For consumers that keep no state derived from past events.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        loop {
            match self.next().await? {
                Delivery::Event(ev) => return Some(ev),
                Delivery::Lagged(_) => continue,
            }
        }
    }

    /// Returns the next matching event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) if self.filter.matches(&ev) => return Some(ev),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(subscription = self.name, skipped, "bus subscription lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceStatus, NodeMonitor, NodeMonitorState};

    #[tokio::test]
    async fn filter_by_path_and_kind() {
        let bus = Bus::new(16);
        let web = ObjectPath::svc("web");
        let db = ObjectPath::svc("db");
        let mut sub = bus.subscribe(
            "test",
            Filter::new().with_path(EventKind::InstanceStatusUpdated, &web),
        );

        bus.publish(Event::instance_status(db.clone(), "n1", InstanceStatus::default()));
        bus.publish(Event::peer_dropped("n2"));
        bus.publish(Event::instance_status(web.clone(), "n1", InstanceStatus::default()));

        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.path.as_ref(), Some(&web));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn retains_last_update_per_labels() {
        let bus = Bus::new(4);
        bus.publish(Event::node_monitor("n1", NodeMonitor::default()));
        bus.publish(Event::node_monitor(
            "n1",
            NodeMonitor {
                state: NodeMonitorState::Idle,
            },
        ));
        bus.publish(Event::node_monitor("n2", NodeMonitor::default()));

        let last = bus.last(EventKind::NodeMonitorUpdated, None, Some("n1")).unwrap();
        match &last.payload {
            crate::events::Payload::NodeMonitorUpdated(m) => {
                assert_eq!(m.state, NodeMonitorState::Idle)
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(bus.last_all(EventKind::NodeMonitorUpdated).len(), 2);
    }

    #[test]
    fn deletion_drops_retained_update() {
        let bus = Bus::new(4);
        let web = ObjectPath::svc("web");
        bus.publish(Event::instance_status(web.clone(), "n1", InstanceStatus::default()));
        assert!(
            bus.last(EventKind::InstanceStatusUpdated, Some(&web), Some("n1"))
                .is_some()
        );
        bus.publish(Event::instance_status_deleted(web.clone(), "n1"));
        assert!(
            bus.last(EventKind::InstanceStatusUpdated, Some(&web), Some("n1"))
                .is_none()
        );
    }

    #[tokio::test]
    async fn lagged_subscription_skips_and_continues() {
        let bus = Bus::new(2);
        let mut sub = bus.subscribe("lag", Filter::new().with(EventKind::PeerDropped));
        for _ in 0..5 {
            bus.publish(Event::peer_dropped("n2"));
        }
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn next_reports_the_lag_before_resuming() {
        let bus = Bus::new(2);
        let mut sub = bus.subscribe("lag", Filter::new().with(EventKind::PeerDropped));
        for _ in 0..5 {
            bus.publish(Event::peer_dropped("n2"));
        }
        match sub.next().await {
            Some(Delivery::Lagged(skipped)) => assert_eq!(skipped, 3),
            other => panic!("expected a lag, got {other:?}"),
        }
        assert!(matches!(sub.next().await, Some(Delivery::Event(_))));
    }
}
