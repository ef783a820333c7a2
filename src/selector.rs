use crate::node::{Dict, Node, Value};
use std::mem;

/// Projects `source` through `selector`.
///
/// For each selector pair `(k, v)`:
/// - `v` not a dict: copy `source[k]` when it has the same variant as `v`;
/// - `v` an empty dict: copy the sub-dict `source[k]` when its tag matches;
/// - `v` a non-empty dict: project `source[k]` through `v`.
///
/// Missing keys and mismatched variants are dropped silently.
pub fn project(source: &Dict, selector: &Dict) -> Dict {
    let mut out = Dict::tagged(source.tag.clone());
    for sel in selector.iter() {
        let Some(found) = source.get(&sel.key) else {
            continue;
        };
        let projected = match (&sel.value.value, &found.value) {
            (Value::Dict(want), Value::Dict(have)) if want.is_empty() => {
                (want.tag == have.tag).then(|| found.clone())
            }
            (Value::Dict(want), Value::Dict(have)) => {
                Some(Node::dict(project(have, want)).with_meta(found.meta.clone()))
            }
            (Value::Dict(_), _) => None,
            (want, have) => {
                (mem::discriminant(want) == mem::discriminant(have)).then(|| found.clone())
            }
        };
        if let Some(node) = projected {
            out.insert(sel.key.clone(), node);
        }
    }
    out
}
