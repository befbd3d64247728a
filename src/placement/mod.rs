//! # Placement policies.
//!
//! Pure functions ordering candidate nodes. The first `N` nodes of a ranking
//! are the leaders of an object (`N = 1` for failover, `flex_target` for flex).
//!
//! | Policy       | Order                                              |
//! |--------------|----------------------------------------------------|
//! | `NodesOrder` | as declared in the object scope                    |
//! | `Spread`     | md5 of `path + node`, hex ascending                |
//! | `Score`      | node score descending, scope order on ties         |
//! | `Shift`      | scope order rotated left by `slice index mod len`  |
//! | `LoadAvg`    | recognized, not implemented: input order unchanged |
//!
//! ```rust
//! use imon::placement::rank;
//! use imon::{ObjectPath, PlacementPolicy};
//! use std::collections::HashMap;
//!
//! let scope = vec!["n1".to_string(), "n2".to_string(), "n3".to_string()];
//! let ranked = rank(
//!     PlacementPolicy::NodesOrder,
//!     &ObjectPath::svc("web"),
//!     &scope,
//!     &["n3".to_string(), "n1".to_string()],
//!     &HashMap::new(),
//! );
//! assert_eq!(ranked, ["n1", "n3"]);
//! ```

use std::collections::HashMap;

use md5::{Digest, Md5};

use crate::model::{ObjectPath, PlacementPolicy};

/// Orders `candidates` by `policy`.
///
/// Candidates outside `scope` are dropped. `scores` is only read by the
/// `Score` policy; missing nodes score zero.
pub fn rank(
    policy: PlacementPolicy,
    path: &ObjectPath,
    scope: &[String],
    candidates: &[String],
    scores: &HashMap<String, u64>,
) -> Vec<String> {
    let mut nodes: Vec<String> = scope
        .iter()
        .filter(|n| candidates.contains(n))
        .cloned()
        .collect();

    match policy {
        PlacementPolicy::NodesOrder => {}
        PlacementPolicy::Spread => {
            let prefix = path.to_string();
            nodes.sort_by_cached_key(|n| spread_key(&prefix, n));
        }
        PlacementPolicy::Score => {
            nodes.sort_by(|a, b| {
                let sa = scores.get(a).copied().unwrap_or(0);
                let sb = scores.get(b).copied().unwrap_or(0);
                sb.cmp(&sa)
            });
        }
        PlacementPolicy::Shift => {
            if !nodes.is_empty() {
                let shift = path.scaler_slice_index().unwrap_or(0) % nodes.len();
                nodes.rotate_left(shift);
            }
        }
        PlacementPolicy::LoadAvg => {
            tracing::debug!(%path, "placement policy load-avg is not implemented, keeping input order");
            return candidates
                .iter()
                .filter(|n| scope.contains(n))
                .cloned()
                .collect();
        }
    }
    nodes
}

/// The first `n` ranked nodes.
pub fn top(ranked: &[String], n: usize) -> &[String] {
    &ranked[..n.min(ranked.len())]
}

fn spread_key(path: &str, node: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(path.as_bytes());
    hasher.update(node.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nodes_order_follows_scope() {
        let scope = nodes(&["n2", "n1", "n3"]);
        let ranked = rank(
            PlacementPolicy::NodesOrder,
            &ObjectPath::svc("web"),
            &scope,
            &nodes(&["n1", "n2", "n3"]),
            &HashMap::new(),
        );
        assert_eq!(ranked, nodes(&["n2", "n1", "n3"]));
    }

    #[test]
    fn spread_is_stable_and_membership_independent() {
        let path = ObjectPath::svc("web");
        let scope = nodes(&["n1", "n2", "n3", "n4"]);
        let all = rank(PlacementPolicy::Spread, &path, &scope, &scope, &HashMap::new());
        let again = rank(PlacementPolicy::Spread, &path, &scope, &scope, &HashMap::new());
        assert_eq!(all, again);

        let without_n2 = rank(
            PlacementPolicy::Spread,
            &path,
            &scope,
            &nodes(&["n1", "n3", "n4"]),
            &HashMap::new(),
        );
        let expected: Vec<String> = all.into_iter().filter(|n| n != "n2").collect();
        assert_eq!(without_n2, expected);
    }

    #[test]
    fn spread_matches_md5_of_path_and_node() {
        assert_eq!(
            spread_key("svc/web", "n1"),
            hex::encode(Md5::digest(b"svc/webn1"))
        );
    }

    #[test]
    fn score_descending_with_scope_ties() {
        let scope = nodes(&["n1", "n2", "n3"]);
        let scores = HashMap::from([("n1".to_string(), 10), ("n3".to_string(), 90)]);
        let ranked = rank(
            PlacementPolicy::Score,
            &ObjectPath::svc("web"),
            &scope,
            &scope,
            &scores,
        );
        assert_eq!(ranked, nodes(&["n3", "n1", "n2"]));
    }

    #[test]
    fn shift_rotates_by_slice_index() {
        let scope = nodes(&["n1", "n2", "n3"]);
        let ranked = rank(
            PlacementPolicy::Shift,
            &ObjectPath::svc("4.web"),
            &scope,
            &scope,
            &HashMap::new(),
        );
        assert_eq!(ranked, nodes(&["n2", "n3", "n1"]));
    }

    #[test]
    fn load_avg_keeps_input_order() {
        let scope = nodes(&["n1", "n2", "n3"]);
        let ranked = rank(
            PlacementPolicy::LoadAvg,
            &ObjectPath::svc("web"),
            &scope,
            &nodes(&["n3", "n1"]),
            &HashMap::new(),
        );
        assert_eq!(ranked, nodes(&["n3", "n1"]));
    }

    #[test]
    fn top_n_is_bounded_by_candidates() {
        let ranked = nodes(&["n1", "n2"]);
        assert_eq!(top(&ranked, 1), &ranked[..1]);
        assert_eq!(top(&ranked, 5).len(), 2);
        assert!(top(&[], 1).is_empty());
    }

    #[test]
    fn leadership_exclusivity_for_every_policy() {
        let scope = nodes(&["a", "b", "c", "d", "e"]);
        let scores = HashMap::from([("c".to_string(), 5), ("e".to_string(), 3)]);
        for policy in [
            PlacementPolicy::NodesOrder,
            PlacementPolicy::Spread,
            PlacementPolicy::Score,
            PlacementPolicy::Shift,
        ] {
            for n in 0..=6 {
                let ranked = rank(policy, &ObjectPath::svc("2.web"), &scope, &scope, &scores);
                let leaders = top(&ranked, n);
                assert_eq!(leaders.len(), n.min(scope.len()));
                assert_eq!(leaders, &ranked[..leaders.len()]);
            }
        }
    }
}
