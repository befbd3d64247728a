//! Cache updates driven by instance status, config and peer-drop events.

use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;

use super::worker::{Command, MonitorActor};
use crate::filesync::{FetchRequest, sync_file};
use crate::model::{InstanceConfig, InstanceStatus, LocalExpect};

impl MonitorActor {
    pub(super) fn on_instance_status_updated(&mut self, node: &str, st: &Arc<InstanceStatus>) {
        self.instance_status.insert(node.to_string(), Arc::clone(st));

        if node == &*self.localhost {
            if st.is_up() {
                if self.state.local_expect == LocalExpect::None && !self.state.state.is_doing() {
                    tracing::info!("instance is up, set local expect started");
                    self.state.local_expect = LocalExpect::Started;
                }
                self.state.monitor_action_executed_at = None;
            }
            return;
        }

        if st.is_up() {
            if self.state.peer_drops.remove(node).is_some() {
                tracing::info!(peer = node, "dropped peer is up again, clear stonith flag");
            }
            self.sync_files_from(node);
        }
    }

    pub(super) fn on_config_updated(&mut self, cfg: &Arc<InstanceConfig>) {
        if **cfg == *self.config {
            return;
        }
        tracing::debug!("config updated");
        self.config = Arc::clone(cfg);
        self.init_resource_monitors();
    }

    pub(super) fn on_peer_dropped(&mut self, peer: &str) {
        if peer == &*self.localhost {
            return;
        }
        let was_up = self
            .instance_status
            .get(peer)
            .is_some_and(|s| s.is_up());
        if self.config.is_failover() && self.config.stonith && was_up {
            tracing::warn!(peer, "peer dropped while its instance was up");
            self.state.peer_drops.insert(peer.to_string(), Utc::now());
        }
        self.instance_status.remove(peer);
        self.instance_monitor.remove(peer);
    }

    /// Fetches resource files from an up peer while the local instance is not up.
    fn sync_files_from(&mut self, peer: &str) {
        let Some(local) = self.local_status() else {
            return;
        };
        if local.is_up() {
            return;
        }
        let Some(remote) = self.instance_status.get(peer) else {
            return;
        };

        let mut todo = Vec::new();
        for (rid, res) in &remote.resources {
            for file in &res.files {
                let same = local
                    .resource_file(rid, &file.name)
                    .is_some_and(|f| f.checksum == file.checksum);
                let key = (rid.clone(), file.name.clone());
                if same || self.fetching.contains(&key) {
                    continue;
                }
                todo.push((
                    key,
                    FetchRequest {
                        peer: peer.to_string(),
                        path: self.path.clone(),
                        rid: rid.clone(),
                        name: file.name.clone(),
                        checksum: file.checksum.clone(),
                    },
                ));
            }
        }

        for (key, req) in todo {
            self.fetching.insert(key);
            let fetcher = Arc::clone(&self.ctx.fetcher);
            let tx = self.cmd_tx.clone();
            tokio::spawn(
                async move {
                    match sync_file(fetcher.as_ref(), &req).await {
                        Ok(()) => tracing::info!(peer = %req.peer, rid = %req.rid, "installed {}", req.name),
                        Err(err) => tracing::warn!(
                            peer = %req.peer,
                            rid = %req.rid,
                            label = err.as_label(),
                            "fetch {} failed: {err}",
                            req.name
                        ),
                    }
                    let _ = tx.send(Command::FetchDone {
                        rid: req.rid,
                        name: req.name,
                    });
                }
                .in_current_span(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Avail, InstanceStatus, LocalExpect, MonitorState, ResourceFile, ResourceStatus};
    use crate::testing::{Harness, status_down, status_up};
    use chrono::Utc;
    use std::sync::Arc;

    fn with_file(mut st: InstanceStatus, checksum: &str) -> InstanceStatus {
        st.resources.insert(
            "fs#1".into(),
            ResourceStatus {
                status: st.avail,
                files: vec![ResourceFile {
                    name: "/etc/app.conf".into(),
                    checksum: checksum.into(),
                    mtime: Utc::now(),
                }],
                ..Default::default()
            },
        );
        st
    }

    #[test]
    fn stonith_flag_set_on_drop_and_cleared_when_up() {
        let h = Harness::new(&["n1", "n2"]);
        let mut cfg = (*h.failover_config()).clone();
        cfg.stonith = true;
        let mut n1 = h.actor("n1", Arc::new(cfg));
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        n1.instance_status.insert("n2".into(), Arc::new(status_up()));

        n1.on_peer_dropped("n2");
        assert!(n1.state.peer_drops.contains_key("n2"));
        assert!(!n1.instance_status.contains_key("n2"));

        n1.on_instance_status_updated("n2", &Arc::new(status_up()));
        assert!(n1.state.peer_drops.is_empty());
    }

    #[test]
    fn drop_of_a_down_peer_is_not_flagged() {
        let h = Harness::new(&["n1", "n2"]);
        let mut cfg = (*h.failover_config()).clone();
        cfg.stonith = true;
        let mut n1 = h.actor("n1", Arc::new(cfg));
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        n1.on_peer_dropped("n2");
        assert!(n1.state.peer_drops.is_empty());
    }

    #[test]
    fn local_up_sets_started_intent() {
        let h = Harness::new(&["n1"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.state.monitor_action_executed_at = Some(Utc::now());
        n1.on_instance_status_updated("n1", &Arc::new(status_up()));
        assert_eq!(n1.state.local_expect, LocalExpect::Started);
        assert!(n1.state.monitor_action_executed_at.is_none());

        n1.state.local_expect = LocalExpect::None;
        n1.state.state = MonitorState::Stopping;
        n1.on_instance_status_updated("n1", &Arc::new(status_up()));
        assert_eq!(n1.state.local_expect, LocalExpect::None);
    }

    #[tokio::test]
    async fn differing_files_are_fetched_once() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.instance_status
            .insert("n1".into(), Arc::new(with_file(status_down(), "aaaa")));

        let peer = Arc::new(with_file(status_up(), "bbbb"));
        n1.on_instance_status_updated("n2", &peer);
        n1.on_instance_status_updated("n2", &peer);
        assert_eq!(n1.fetching.len(), 1);

        n1.next_command().await;
        assert_eq!(h.fetcher.requests().len(), 1);
        assert_eq!(h.fetcher.requests()[0].name, "/etc/app.conf");
    }

    #[test]
    fn identical_files_are_not_fetched() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.instance_status
            .insert("n1".into(), Arc::new(with_file(status_down(), "aaaa")));
        let mut peer = with_file(status_up(), "aaaa");
        peer.avail = Avail::Up;
        n1.on_instance_status_updated("n2", &Arc::new(peer));
        assert!(n1.fetching.is_empty());
    }
}
