//! Data model shared by the store, the bus and the monitors.
//!
//! ## Contents
//! - [`ObjectPath`] object addressing
//! - [`InstanceStatus`] observed reality of one instance
//! - [`InstanceConfig`] declared intent of one object
//! - [`InstanceMonitor`] replicated monitor row, with its state enums
//! - node-level rows ([`NodeStatus`], [`NodeMonitor`], [`NodeStats`], [`NodeConfig`])
//! - [`ObjectStatus`] cluster-wide aggregate computed from instance statuses

mod instance_config;
mod monitor;
mod node;
mod path;
mod status;

pub use instance_config::{
    InstanceConfig, MonitorAction, OrchestrateMode, PlacementPolicy, ResourceConfig, Topology,
};
pub use monitor::{
    GlobalExpect, GlobalExpectOptions, InstanceMonitor, LocalExpect, MonitorState, MonitorUpdate,
    ResourceMonitor, RestartMonitor,
};
pub use node::{NodeConfig, NodeMonitor, NodeMonitorState, NodeStats, NodeStatus};
pub use path::{Kind, ObjectPath};
pub use status::{Avail, InstanceStatus, Provisioned, ResourceFile, ResourceStatus};

/// Object-level aggregate of the known instance statuses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectStatus {
    pub avail: Avail,
    pub provisioned: Provisioned,
    pub up_instances: usize,
}

impl ObjectStatus {
    /// Aggregates instance statuses according to the object topology.
    pub fn aggregate<'a, I>(config: &InstanceConfig, statuses: I) -> Self
    where
        I: IntoIterator<Item = &'a InstanceStatus>,
    {
        let mut up = 0;
        let mut seen = 0;
        let mut all_na = true;
        let mut provisioned = Vec::new();
        for st in statuses {
            seen += 1;
            if st.avail == Avail::Up {
                up += 1;
            }
            if st.avail != Avail::NotApplicable {
                all_na = false;
            }
            provisioned.push(st.provisioned);
        }

        let avail = if seen == 0 {
            Avail::Undef
        } else if all_na {
            Avail::NotApplicable
        } else {
            match config.topology {
                Topology::Failover => match up {
                    0 => Avail::Down,
                    1 => Avail::Up,
                    _ => Avail::Warn,
                },
                Topology::Flex => match up {
                    0 => Avail::Down,
                    n if n < config.flex_min => Avail::Warn,
                    _ => Avail::Up,
                },
            }
        };

        Self {
            avail,
            provisioned: Provisioned::aggregate(provisioned),
            up_instances: up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(avail: Avail) -> InstanceStatus {
        InstanceStatus {
            avail,
            provisioned: Provisioned::True,
            ..Default::default()
        }
    }

    #[test]
    fn failover_with_two_up_is_warn() {
        let cfg = InstanceConfig::new(ObjectPath::svc("web"), vec!["n1".into(), "n2".into()]);
        let all = [st(Avail::Up), st(Avail::Up)];
        assert_eq!(ObjectStatus::aggregate(&cfg, &all).avail, Avail::Warn);
        let one = [st(Avail::Up), st(Avail::Down)];
        let agg = ObjectStatus::aggregate(&cfg, &one);
        assert_eq!(agg.avail, Avail::Up);
        assert_eq!(agg.up_instances, 1);
    }

    #[test]
    fn flex_below_min_is_warn() {
        let mut cfg = InstanceConfig::new(
            ObjectPath::svc("web"),
            vec!["n1".into(), "n2".into(), "n3".into()],
        );
        cfg.topology = Topology::Flex;
        cfg.flex_min = 2;
        cfg.flex_target = 2;
        cfg.flex_max = 3;
        let all = [st(Avail::Up), st(Avail::Down), st(Avail::Down)];
        assert_eq!(ObjectStatus::aggregate(&cfg, &all).avail, Avail::Warn);
    }

    #[test]
    fn no_status_is_undef() {
        let cfg = InstanceConfig::new(ObjectPath::svc("web"), vec!["n1".into()]);
        let none: [InstanceStatus; 0] = [];
        assert_eq!(ObjectStatus::aggregate(&cfg, &none).avail, Avail::Undef);
    }
}
