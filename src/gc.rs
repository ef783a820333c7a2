//! Expiration sweep over owned document trees.
//!
//! A leaf is collectible once its own expiration has passed. A dict or set
//! is collectible once every child is collectible and either its own
//! expiration has passed or, without an expiration, it lost its last child
//! in this sweep. Containers written empty stay. Collectible children are
//! dropped on the way up, so a surviving container comes back pruned.
//! Predicates and smart nodes are judged by their own expiration only.

use crate::node::{Dict, Node, Pair, Set, Value};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub documents_scanned: usize,
    pub documents_removed: usize,
    pub nodes_removed: usize,
}

/// Returns `None` when the whole node is collectible, otherwise the pruned node.
pub fn prune(node: Node, now: DateTime<Utc>, stats: &mut SweepStats) -> Option<Node> {
    let Node { value, meta } = node;
    let (value, before, after) = match value {
        Value::Dict(dict) => {
            let tag = dict.tag.clone();
            let before = dict.len();
            let kept: Vec<Pair> = dict
                .into_pairs()
                .into_iter()
                .filter_map(|Pair { key, value }| match prune(value, now, stats) {
                    Some(value) => Some(Pair { key, value }),
                    None => {
                        stats.nodes_removed += 1;
                        None
                    }
                })
                .collect();
            let after = kept.len();
            (Value::Dict(Dict::from_unique_pairs(tag, kept)), before, after)
        }
        Value::Set(set) => {
            let tag = set.tag.clone();
            let before = set.len();
            let kept: Vec<Node> = set
                .into_elements()
                .into_iter()
                .filter_map(|element| {
                    let survivor = prune(element, now, stats);
                    if survivor.is_none() {
                        stats.nodes_removed += 1;
                    }
                    survivor
                })
                .collect();
            let after = kept.len();
            (Value::Set(Set::from_unique_elements(tag, kept)), before, after)
        }
        other => {
            if meta.is_expired(now) {
                return None;
            }
            return Some(Node { value: other, meta });
        }
    };
    let collectible = after == 0
        && match meta.expires_at {
            Some(at) => at <= now,
            None => before > after,
        };
    if collectible {
        None
    } else {
        Some(Node { value, meta })
    }
}
