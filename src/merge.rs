//! Symmetric join of two documents.
//!
//! Containers merge structurally and smart nodes apply their own merge.
//! Anything the algebra cannot reconcile (differing literals, differing
//! tags, mismatched kinds) is handed to a [`MergeContext`], so conflict
//! policy can change without touching the rules here.

use crate::error::{Result, SmartRecordError};
use crate::node::{Dict, Node, Pair, Predicate, Set, Value};

pub trait MergeContext {
    fn resolve(&self, a: &Node, b: &Node) -> Result<Node>;
}

/// Resolves every conflict in favor of the right-hand side.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl MergeContext for LastWriterWins {
    fn resolve(&self, _a: &Node, b: &Node) -> Result<Node> {
        Ok(b.clone())
    }
}

/// Refuses every conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectConflicts;

impl MergeContext for RejectConflicts {
    fn resolve(&self, a: &Node, b: &Node) -> Result<Node> {
        Err(SmartRecordError::mismatch(
            a.kind(),
            format!("conflicting {}", b.kind()),
        ))
    }
}

pub fn merge(a: &Node, b: &Node, ctx: &dyn MergeContext) -> Result<Node> {
    let meta = a.meta.combine(&b.meta);
    let value = match (&a.value, &b.value) {
        (Value::Smart(x), Value::Smart(y)) if x.kind() == y.kind() => x.merge(&**y, ctx)?,
        (Value::Smart(_), _) | (_, Value::Smart(_)) => return ctx.resolve(a, b),
        (Value::Dict(x), Value::Dict(y)) if x.tag == y.tag => Value::Dict(merge_dicts(x, y, ctx)?),
        (Value::Set(x), Value::Set(y)) if x.tag == y.tag => Value::Set(merge_sets(x, y)),
        (Value::Predicate(x), Value::Predicate(y)) if x.tag == y.tag => {
            Value::Predicate(merge_predicates(x, y, ctx)?)
        }
        (x, y) if x.is_leaf() && x == y => x.clone(),
        _ => return ctx.resolve(a, b),
    };
    Ok(Node { value, meta })
}

pub fn merge_dicts(a: &Dict, b: &Dict, ctx: &dyn MergeContext) -> Result<Dict> {
    let mut pairs = Vec::with_capacity(a.len() + b.len());
    for pair in a.iter() {
        let value = match b.get(&pair.key) {
            Some(other) => merge(&pair.value, other, ctx)?,
            None => pair.value.clone(),
        };
        pairs.push(Pair {
            key: pair.key.clone(),
            value,
        });
    }
    for pair in b.iter().filter(|p| !a.contains_key(&p.key)) {
        pairs.push(pair.clone());
    }
    Ok(Dict::from_unique_pairs(a.tag.clone(), pairs))
}

fn merge_sets(a: &Set, b: &Set) -> Set {
    let mut merged = a.clone();
    for element in b.iter() {
        merged.insert(element.clone());
    }
    merged
}

fn merge_predicates(a: &Predicate, b: &Predicate, ctx: &dyn MergeContext) -> Result<Predicate> {
    let mut positional = a.positional.clone();
    for arg in &b.positional {
        if !positional.contains(arg) {
            positional.push(arg.clone());
        }
    }
    Ok(Predicate {
        tag: a.tag.clone(),
        positional,
        named: merge_dicts(&a.named, &b.named, ctx)?,
    })
}
