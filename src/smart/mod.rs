//! Smart nodes: typed values with their own update and merge rules that
//! always reduce to a plain predicate.

pub mod cid;
pub mod multiaddress;
pub mod peer;
pub mod reachable;
pub mod record;
pub mod signed;

use crate::error::{Result, SmartRecordError};
use crate::grammar::{AssemblyContext, Grammar};
use crate::merge::MergeContext;
use crate::node::{Dict, Node, Predicate, Value};
use crate::update::update_dict;
use std::any::Any;
use std::fmt;

pub trait SmartClone {
    fn clone_box(&self) -> Box<dyn SmartNode>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: SmartNode + Clone> SmartClone for T {
    fn clone_box(&self) -> Box<dyn SmartNode> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub trait SmartNode: SmartClone + fmt::Debug + Send + Sync + 'static {
    fn kind(&self) -> &'static str;

    /// Canonical plain form. Must contain no smart nodes.
    fn disassemble(&self) -> Value;

    /// Folds a newer node of the same kind into `self`.
    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()>;

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value>;
}

impl Clone for Box<dyn SmartNode> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

pub(crate) fn downcast<T: SmartNode>(node: Box<dyn SmartNode>, expected: &str) -> Result<T> {
    let found = node.kind();
    node.into_any()
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| SmartRecordError::mismatch(expected, found))
}

pub(crate) fn downcast_ref<'a, T: SmartNode>(
    node: &'a dyn SmartNode,
    expected: &str,
) -> Result<&'a T> {
    node.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| SmartRecordError::mismatch(expected, node.kind()))
}

/// Hands an irreconcilable pair of smart nodes to the merge context.
pub(crate) fn resolve(
    a: &dyn SmartNode,
    b: &dyn SmartNode,
    ctx: &dyn MergeContext,
) -> Result<Value> {
    let left = Node::new(Value::Smart(a.clone_box()));
    let right = Node::new(Value::Smart(b.clone_box()));
    Ok(ctx.resolve(&left, &right)?.value)
}

pub(crate) fn update_user(user: &mut Dict, new: Dict) -> Result<()> {
    *user = update_dict(std::mem::take(user), new)?;
    Ok(())
}

/// The predicate a smart tag assembler was invoked on.
pub(crate) fn predicate_of<'a>(plain: &'a Node, tag: &str) -> Option<&'a Predicate> {
    match &plain.value {
        Value::Predicate(p) if p.tag == tag => Some(p),
        _ => None,
    }
}

pub(crate) fn malformed(tag: &str, reason: impl fmt::Display) -> SmartRecordError {
    SmartRecordError::Assembly(format!("{}: {}", tag, reason))
}

pub(crate) fn single_positional<'a>(p: &'a Predicate) -> Result<&'a Node> {
    match p.positional.as_slice() {
        [only] => Ok(only),
        args => Err(malformed(
            &p.tag,
            format!("expected one positional argument, got {}", args.len()),
        )),
    }
}

pub(crate) fn single_string(p: &Predicate) -> Result<String> {
    let arg = single_positional(p)?;
    arg.as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(&p.tag, format!("expected a string, got {}", arg.kind())))
}

/// Named arguments other than `reserved`, assembled as user fields.
pub(crate) fn user_fields(
    grammar: &Grammar,
    ctx: &AssemblyContext,
    named: &Dict,
    reserved: &[&str],
) -> Result<Dict> {
    let mut plain = named.clone();
    plain.tag.clear();
    plain.retain(|p| !p.key.as_str().is_some_and(|k| reserved.contains(&k)));
    grammar.assemble_dict(&plain, ctx)
}

/// Builds `tag(positional.., reserved.., user..)` in plain form.
pub(crate) fn plain_predicate(
    tag: &str,
    positional: Vec<Node>,
    reserved: Vec<(&str, Node)>,
    user: &Dict,
) -> Value {
    let mut p = Predicate::new(tag);
    p.positional = positional.iter().map(Node::disassemble).collect();
    for (name, value) in reserved {
        p.named.insert(name, value.disassemble());
    }
    for pair in user.disassemble().into_pairs() {
        p.named.insert(pair.key, pair.value);
    }
    Value::Predicate(p)
}
