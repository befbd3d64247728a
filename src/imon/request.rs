//! Operator requests (`SetInstanceMonitor`).
//!
//! A request may carry a state reset, a local expectation and a global
//! expectation. Each part is validated on its own; a refused part is logged,
//! reported with an `ObjectOrchestrationEnd` carrying the error, and leaves
//! the row untouched.

use uuid::Uuid;

use super::worker::{MonitorActor, stamp};
use crate::error::RequestError;
use crate::events::{Event, Payload};
use crate::model::{
    Avail, GlobalExpect, GlobalExpectOptions, LocalExpect, MonitorState, MonitorUpdate,
    ObjectStatus, Provisioned,
};
use crate::placement;

impl MonitorActor {
    pub(super) fn on_set_instance_monitor(&mut self, update: &MonitorUpdate) {
        if let Some(state) = update.state
            && let Err(err) = self.set_state(state)
        {
            self.refuse(update, err);
        }
        if let Some(local_expect) = update.local_expect {
            match local_expect {
                LocalExpect::None | LocalExpect::Started => {
                    self.state.local_expect = local_expect;
                }
                LocalExpect::Shutdown => self.refuse(
                    update,
                    RequestError::InvalidLocalExpect {
                        local_expect: local_expect.to_string(),
                    },
                ),
            }
        }
        if let Some(global_expect) = update.global_expect {
            let options = update.global_expect_options.clone().unwrap_or_default();
            match self.validate_global_expect(global_expect, options) {
                Ok((global_expect, options)) => {
                    self.accept_global_expect(global_expect, options, update.orchestration_id)
                }
                Err(err) => self.refuse(update, err),
            }
        }
    }

    fn set_state(&mut self, state: MonitorState) -> Result<(), RequestError> {
        if state != MonitorState::Idle {
            return Err(RequestError::InvalidState {
                state: state.to_string(),
            });
        }
        self.clear_pending();
        self.state.state = MonitorState::Idle;
        Ok(())
    }

    /// Checks feasibility and fills in defaults (`placed@` destination).
    pub(super) fn validate_global_expect(
        &self,
        global_expect: GlobalExpect,
        mut options: GlobalExpectOptions,
    ) -> Result<(GlobalExpect, GlobalExpectOptions), RequestError> {
        let global_expect = match global_expect {
            GlobalExpect::None => GlobalExpect::Aborted,
            other => other,
        };

        for (node, peer) in &self.instance_monitor {
            if peer.global_expect == global_expect || peer.global_expect.is_none() {
                continue;
            }
            if peer.global_expect_updated > self.state.global_expect_updated {
                return Err(RequestError::Superseded {
                    node: node.clone(),
                    global_expect: peer.global_expect.to_string(),
                });
            }
        }

        match global_expect {
            GlobalExpect::Started => {
                let object = self.object_status();
                if matches!(object.provisioned, Provisioned::Mixed | Provisioned::False) {
                    return Err(RequestError::NotOrchestrateable {
                        reason: format!("provisioned state is {:?}", object.provisioned),
                    });
                }
                if self.config.is_failover() && object.avail == Avail::Warn {
                    return Err(RequestError::NotOrchestrateable {
                        reason: "failover object is warn".to_string(),
                    });
                }
                if self.is_object_started(&object) {
                    return Err(RequestError::AlreadyStarted);
                }
            }
            GlobalExpect::PlacedAt => {
                if options.destination.is_empty() {
                    let ranked = self.ranked(&self.ha_leader_candidates());
                    options.destination =
                        placement::top(&ranked, self.config.leader_count()).to_vec();
                    if options.destination.is_empty() {
                        return Err(RequestError::NoDestination);
                    }
                }
                if let Some(node) = options
                    .destination
                    .iter()
                    .find(|node| !self.config.in_scope(node))
                {
                    return Err(RequestError::DestinationNotInScope { node: node.clone() });
                }
            }
            _ => {}
        }
        Ok((global_expect, options))
    }

    fn accept_global_expect(
        &mut self,
        global_expect: GlobalExpect,
        options: GlobalExpectOptions,
        orchestration_id: Option<Uuid>,
    ) {
        let newest = self
            .instance_monitor
            .values()
            .map(|m| m.global_expect_updated)
            .fold(self.state.global_expect_updated, std::cmp::max);
        let id = orchestration_id.unwrap_or_else(Uuid::new_v4);
        tracing::info!(orchestration_id = %id, "set global expect {}", global_expect);

        self.cancel_ready();
        self.state.global_expect = global_expect;
        self.state.global_expect_options = options;
        self.state.global_expect_updated = stamp(newest);
        self.state.orchestration_id = Some(id);
        self.state.orchestration_is_done = false;
    }

    fn refuse(&self, update: &MonitorUpdate, err: RequestError) {
        tracing::warn!(label = err.as_label(), "refuse request: {err}");
        self.ctx.bus.publish(
            Event::new(Payload::ObjectOrchestrationEnd {
                id: update.orchestration_id,
                global_expect: update.global_expect.unwrap_or_default(),
                error: Some(err.to_string()),
            })
            .with_path(self.path.clone())
            .with_node(std::sync::Arc::clone(&self.localhost)),
        );
    }

    pub(super) fn object_status(&self) -> ObjectStatus {
        ObjectStatus::aggregate(
            &self.config,
            self.instance_status
                .iter()
                .filter(|(node, _)| self.config.in_scope(node))
                .map(|(_, st)| st.as_ref()),
        )
    }

    /// Failover: exactly one instance up. Flex: at least `flex_target` up.
    pub(super) fn is_object_started(&self, object: &ObjectStatus) -> bool {
        if self.config.is_failover() {
            object.avail == Avail::Up
        } else {
            object.up_instances >= self.config.flex_target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Filter};
    use crate::model::InstanceMonitor;
    use crate::testing::{Harness, status_down, status_up};
    use chrono::{TimeDelta, Utc};
    use std::sync::Arc;

    #[test]
    fn started_is_refused_when_already_started() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        n1.instance_status.insert("n2".into(), Arc::new(status_up()));
        let mut sub = h.bus.subscribe(
            "test",
            Filter::new().with(EventKind::ObjectOrchestrationEnd),
        );

        n1.on_set_instance_monitor(&MonitorUpdate::global_expect(GlobalExpect::Started));
        assert!(n1.state.global_expect.is_none());
        let ev = sub.try_recv().unwrap();
        match &ev.payload {
            Payload::ObjectOrchestrationEnd { error, .. } => {
                assert_eq!(error.as_deref(), Some("already started"))
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn started_is_refused_on_mixed_provisioning() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        let mut unprovisioned = status_down();
        unprovisioned.provisioned = Provisioned::False;
        n1.instance_status
            .insert("n2".into(), Arc::new(unprovisioned));
        let err = n1
            .validate_global_expect(GlobalExpect::Started, GlobalExpectOptions::default())
            .unwrap_err();
        assert_eq!(err.as_label(), "request_not_orchestrateable");
    }

    #[test]
    fn accepted_request_stamps_past_every_peer() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        let future = Utc::now() + TimeDelta::hours(1);
        n1.instance_monitor.insert(
            "n2".into(),
            Arc::new(InstanceMonitor {
                global_expect_updated: future,
                ..Default::default()
            }),
        );

        let id = Uuid::new_v4();
        n1.on_set_instance_monitor(&MonitorUpdate {
            global_expect: Some(GlobalExpect::Stopped),
            orchestration_id: Some(id),
            ..Default::default()
        });
        assert_eq!(n1.state.global_expect, GlobalExpect::Stopped);
        assert!(n1.state.global_expect_updated > future);
        assert_eq!(n1.state.orchestration_id, Some(id));
        assert!(!n1.state.orchestration_is_done);
    }

    #[test]
    fn fresher_competing_request_wins() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        n1.instance_monitor.insert(
            "n2".into(),
            Arc::new(InstanceMonitor {
                global_expect: GlobalExpect::Frozen,
                global_expect_updated: Utc::now(),
                ..Default::default()
            }),
        );
        let err = n1
            .validate_global_expect(GlobalExpect::Thawed, GlobalExpectOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            RequestError::Superseded {
                node: "n2".into(),
                global_expect: "frozen".into()
            }
        );
        assert!(
            n1.validate_global_expect(GlobalExpect::Frozen, GlobalExpectOptions::default())
                .is_ok()
        );
    }

    #[test]
    fn placed_at_picks_a_destination() {
        let h = Harness::new(&["n1", "n2"]);
        let mut n1 = h.actor("n1", h.failover_config());
        h.seed_cluster(&mut n1, &["n1", "n2"]);
        let (_, options) = n1
            .validate_global_expect(GlobalExpect::PlacedAt, GlobalExpectOptions::default())
            .unwrap();
        assert_eq!(options.destination, vec!["n1".to_string()]);

        let err = n1
            .validate_global_expect(
                GlobalExpect::PlacedAt,
                GlobalExpectOptions {
                    destination: vec!["n9".into()],
                },
            )
            .unwrap_err();
        assert_eq!(err.as_label(), "request_destination_not_in_scope");
    }

    #[test]
    fn placed_at_without_candidates_has_no_destination() {
        let h = Harness::new(&["n1", "n2"]);
        let n1 = h.actor("n1", h.failover_config());
        let err = n1
            .validate_global_expect(GlobalExpect::PlacedAt, GlobalExpectOptions::default())
            .unwrap_err();
        assert_eq!(err, RequestError::NoDestination);
    }

    #[test]
    fn operator_may_only_reset_state_to_idle() {
        let h = Harness::new(&["n1"]);
        let mut n1 = h.actor("n1", h.failover_config());
        n1.state.state = MonitorState::StartFailed;
        n1.on_set_instance_monitor(&MonitorUpdate {
            state: Some(MonitorState::Starting),
            local_expect: Some(LocalExpect::Shutdown),
            ..Default::default()
        });
        assert_eq!(n1.state.state, MonitorState::StartFailed);
        assert_eq!(n1.state.local_expect, LocalExpect::None);

        n1.on_set_instance_monitor(&MonitorUpdate {
            state: Some(MonitorState::Idle),
            local_expect: Some(LocalExpect::Started),
            ..Default::default()
        });
        assert_eq!(n1.state.state, MonitorState::Idle);
        assert_eq!(n1.state.local_expect, LocalExpect::Started);
    }
}
