//! Directional update: `update(old, new)` folds a newer write into an
//! existing node. Leaves are last-writer-wins, containers merge
//! recursively and smart nodes apply their own rules.

use crate::error::{Result, SmartRecordError};
use crate::node::{Dict, Node, Pair, Predicate, Set, Value};
use std::mem;

pub fn update(old: Node, new: Node) -> Result<Node> {
    let meta = old.meta.combine(&new.meta);
    let value = update_value(old.value, new.value)?;
    Ok(Node { value, meta })
}

fn update_value(old: Value, new: Value) -> Result<Value> {
    match (old, new) {
        (Value::Dict(a), Value::Dict(b)) => Ok(Value::Dict(update_dict(a, b)?)),
        (Value::Set(a), Value::Set(b)) => Ok(Value::Set(update_set(a, b)?)),
        (Value::Predicate(a), Value::Predicate(b)) => {
            Ok(Value::Predicate(update_predicate(a, b)?))
        }
        (Value::Smart(mut a), Value::Smart(b)) => {
            if a.kind() != b.kind() {
                return Err(SmartRecordError::mismatch(a.kind(), b.kind()));
            }
            a.update(b)?;
            Ok(Value::Smart(a))
        }
        (a, b) if a.is_leaf() && mem::discriminant(&a) == mem::discriminant(&b) => Ok(b),
        (a, b) => Err(SmartRecordError::mismatch(a.kind(), b.kind())),
    }
}

/// Pairs present on one side are kept as-is, shared keys update recursively.
/// The old tag is kept.
pub fn update_dict(old: Dict, new: Dict) -> Result<Dict> {
    let tag = old.tag.clone();
    let mut pairs = old.into_pairs();
    for Pair { key, value } in new.into_pairs() {
        match pairs.iter_mut().find(|p| p.key == key) {
            Some(slot) => {
                slot.key.meta = slot.key.meta.combine(&key.meta);
                let prev = mem::replace(&mut slot.value, Node::bool(false));
                slot.value = update(prev, value)?;
            }
            None => pairs.push(Pair { key, value }),
        }
    }
    Ok(Dict::from_unique_pairs(tag, pairs))
}

pub fn update_set(old: Set, new: Set) -> Result<Set> {
    if old.tag != new.tag {
        return Err(SmartRecordError::mismatch(
            format!("set '{}'", old.tag),
            format!("set '{}'", new.tag),
        ));
    }
    let tag = old.tag.clone();
    let mut elements = old.into_elements();
    union_into(&mut elements, new.into_elements());
    Ok(Set::from_unique_elements(tag, elements))
}

fn update_predicate(old: Predicate, new: Predicate) -> Result<Predicate> {
    let mut positional = old.positional;
    union_into(&mut positional, new.positional);
    Ok(Predicate {
        tag: old.tag,
        positional,
        named: update_dict(old.named, new.named)?,
    })
}

/// Appends unseen elements; a re-sent element refreshes the existing one's expiration.
fn union_into(existing: &mut Vec<Node>, incoming: Vec<Node>) {
    for element in incoming {
        match existing.iter_mut().find(|e| **e == element) {
            Some(e) => e.meta = e.meta.combine(&element.meta),
            None => existing.push(element),
        }
    }
}
