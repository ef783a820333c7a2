//! Promotes plain documents into semantic ones.
//!
//! A [`Grammar`] is an ordered list of candidate assemblers. Leaf rules run
//! first, then the smart-tag registry (keyed by predicate tag), then the
//! generic containers, so a plain container survives unless a more specific
//! tag claims it. Containers recurse through the same grammar, which lets
//! smart tags appear at any depth.

use crate::error::{Result, SmartRecordError};
use crate::node::{Dict, Metadata, Node, Pair, Predicate, Set, Value};
use crate::smart::cid::CidAssembler;
use crate::smart::multiaddress::MultiaddressAssembler;
use crate::smart::peer::{PeerAssembler, PeerId};
use crate::smart::reachable::{ReachabilityProbe, ReachableAssembler};
use crate::smart::record::RecordAssembler;
use crate::smart::signed::{
    Keyring, SignAssembler, SignedAssembler, VerifiedAssembler, VerifyAssembler,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Expiration options applied to every node built in one assembly call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOptions {
    #[serde(default)]
    pub expires_in: Option<Duration>,
    #[serde(default)]
    pub no_expiration: bool,
}

impl MetadataOptions {
    pub fn expires_in(ttl: Duration) -> Self {
        Self {
            expires_in: Some(ttl),
            no_expiration: false,
        }
    }

    pub fn no_expiration() -> Self {
        Self {
            expires_in: None,
            no_expiration: true,
        }
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> Metadata {
        if self.no_expiration {
            return Metadata::default();
        }
        match self
            .expires_in
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl))
        {
            Some(at) => Metadata::expiring_at(at),
            None => Metadata::default(),
        }
    }
}

/// Per-call state threaded through every assembler.
#[derive(Debug, Clone, Default)]
pub struct AssemblyContext {
    pub meta: Metadata,
    pub writer: Option<PeerId>,
    pub deadline: Option<Instant>,
}

impl AssemblyContext {
    pub fn new(options: &MetadataOptions) -> Self {
        Self {
            meta: options.resolve(Utc::now()),
            writer: None,
            deadline: None,
        }
    }

    pub fn with_writer(mut self, writer: PeerId) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub(crate) fn stamp(&self, value: Value) -> Node {
        Node::new(value).with_meta(self.meta.clone())
    }
}

pub trait Assembler: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` declines the input so the next candidate is tried.
    /// An error aborts assembly: the input was recognized but malformed.
    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>>;
}

enum Candidate {
    Rule(Arc<dyn Assembler>),
    SmartTags,
}

pub struct Grammar {
    candidates: Vec<Candidate>,
    smart_tags: HashMap<String, Arc<dyn Assembler>>,
}

impl Grammar {
    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
            smart_tags: HashMap::new(),
        }
    }

    /// Leaves, the smart-tag slot and the generic containers, with no tags registered.
    pub fn plain() -> Self {
        let mut grammar = Self::empty();
        for kind in ["string", "bool", "blob", "int", "float"] {
            grammar.push(LeafAssembler(kind));
        }
        grammar.candidates.push(Candidate::SmartTags);
        grammar.push(DictAssembler);
        grammar.push(SetAssembler);
        grammar.push(PredicateAssembler);
        grammar
    }

    /// Every built-in smart tag except `reachable`, which needs a probe.
    pub fn standard() -> Self {
        let mut grammar = Self::plain();
        grammar.register("record", RecordAssembler);
        grammar.register("peer", PeerAssembler);
        grammar.register("cid", CidAssembler);
        grammar.register("multiaddress", MultiaddressAssembler);
        grammar.register("signed", SignedAssembler);
        grammar.install_keyring(None);
        grammar
    }

    pub fn with_keyring(mut self, keyring: Arc<dyn Keyring>) -> Self {
        self.install_keyring(Some(keyring));
        self
    }

    pub fn with_reachability(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.register("reachable", ReachableAssembler::new(probe));
        self
    }

    fn install_keyring(&mut self, keyring: Option<Arc<dyn Keyring>>) {
        self.register("sign", SignAssembler::new(keyring.clone()));
        self.register("verify", VerifyAssembler::new(keyring.clone()));
        self.register("verified", VerifiedAssembler::new(keyring));
    }

    pub fn push(&mut self, assembler: impl Assembler + 'static) {
        self.candidates.push(Candidate::Rule(Arc::new(assembler)));
    }

    /// Registers (or replaces) the assembler for predicates tagged `tag`.
    pub fn register(&mut self, tag: impl Into<String>, assembler: impl Assembler + 'static) {
        self.smart_tags.insert(tag.into(), Arc::new(assembler));
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.smart_tags.contains_key(tag)
    }

    pub fn assemble(&self, plain: &Node, options: &MetadataOptions) -> Result<Node> {
        self.assemble_in(plain, &AssemblyContext::new(options))
    }

    pub fn assemble_in(&self, plain: &Node, ctx: &AssemblyContext) -> Result<Node> {
        for candidate in &self.candidates {
            let assembled = match candidate {
                Candidate::Rule(rule) => rule.assemble(self, ctx, plain)?,
                Candidate::SmartTags => match &plain.value {
                    Value::Predicate(p) => match self.smart_tags.get(&p.tag) {
                        Some(rule) => rule.assemble(self, ctx, plain)?,
                        None => None,
                    },
                    _ => None,
                },
            };
            if let Some(node) = assembled {
                return Ok(node);
            }
        }
        Err(SmartRecordError::NoMatchingAssembler(plain.kind().to_string()))
    }

    pub fn assemble_dict(&self, plain: &Dict, ctx: &AssemblyContext) -> Result<Dict> {
        let mut pairs = Vec::with_capacity(plain.len());
        for pair in plain.iter() {
            pairs.push(Pair {
                key: self.assemble_in(&pair.key, ctx)?,
                value: self.assemble_in(&pair.value, ctx)?,
            });
        }
        Dict::try_from_pairs(plain.tag.clone(), pairs)
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::standard()
    }
}

struct LeafAssembler(&'static str);

impl Assembler for LeafAssembler {
    fn name(&self) -> &str {
        self.0
    }

    fn assemble(&self, _: &Grammar, ctx: &AssemblyContext, plain: &Node) -> Result<Option<Node>> {
        if !plain.value.is_leaf() || plain.kind() != self.0 {
            return Ok(None);
        }
        Ok(Some(ctx.stamp(plain.value.clone())))
    }
}

struct DictAssembler;

impl Assembler for DictAssembler {
    fn name(&self) -> &str {
        "dict"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Value::Dict(dict) = &plain.value else {
            return Ok(None);
        };
        let assembled = grammar.assemble_dict(dict, ctx)?;
        Ok(Some(ctx.stamp(Value::Dict(assembled))))
    }
}

struct SetAssembler;

impl Assembler for SetAssembler {
    fn name(&self) -> &str {
        "set"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Value::Set(set) = &plain.value else {
            return Ok(None);
        };
        let mut assembled = Set::tagged(set.tag.clone());
        for element in set.iter() {
            assembled.insert(grammar.assemble_in(element, ctx)?);
        }
        Ok(Some(ctx.stamp(Value::Set(assembled))))
    }
}

struct PredicateAssembler;

impl Assembler for PredicateAssembler {
    fn name(&self) -> &str {
        "predicate"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Value::Predicate(p) = &plain.value else {
            return Ok(None);
        };
        let positional = p
            .positional
            .iter()
            .map(|arg| grammar.assemble_in(arg, ctx))
            .collect::<Result<Vec<_>>>()?;
        let assembled = Predicate {
            tag: p.tag.clone(),
            positional,
            named: grammar.assemble_dict(&p.named, ctx)?,
        };
        Ok(Some(ctx.stamp(Value::Predicate(assembled))))
    }
}
