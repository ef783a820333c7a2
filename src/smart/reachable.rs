use super::multiaddress::Multiaddr;
use super::peer::PeerId;
use super::{
    SmartNode, downcast, downcast_ref, malformed, plain_predicate, predicate_of, resolve,
    update_user, user_fields,
};
use crate::error::Result;
use crate::grammar::{Assembler, AssemblyContext, Grammar};
use crate::merge::{MergeContext, merge_dicts};
use crate::node::{Dict, Node, Set, Value};
use crate::update::update_set;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

const RESERVED: &[&str] = &["check", "unverified"];

/// Network reachability checks. Implementations should return promptly once
/// `deadline` has passed; a missed deadline counts as unreachable.
pub trait ReachabilityProbe: Send + Sync {
    fn is_dialable(
        &self,
        peer: Option<&PeerId>,
        addr: &Multiaddr,
        deadline: Option<Instant>,
    ) -> bool;
    fn is_connected(
        &self,
        peer: Option<&PeerId>,
        addr: &Multiaddr,
        deadline: Option<Instant>,
    ) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    Dial,
    Connection,
}

impl CheckMode {
    fn name(self) -> &'static str {
        match self {
            CheckMode::Dial => "dial",
            CheckMode::Connection => "connection",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "dial" => Some(CheckMode::Dial),
            "connection" => Some(CheckMode::Connection),
            _ => None,
        }
    }
}

/// `reachable(addr.., check: "dial"|"connection", unverified: [..], ..user)`
///
/// Positional arguments are the candidates that passed the check. Every
/// other candidate is kept, as submitted, in the `unverified` set until a
/// later write verifies it.
#[derive(Debug, Clone)]
pub struct Reachable {
    pub verified: Set,
    pub unverified: Set,
    pub mode: CheckMode,
    pub user: Dict,
}

impl Reachable {
    /// Drops unverified candidates whose address has since verified.
    fn settle(&mut self) {
        let verified = &self.verified;
        self.unverified.retain(|candidate| {
            !normalized_address(candidate)
                .is_some_and(|addr| verified.contains(&Node::string(addr)))
        });
    }
}

impl SmartNode for Reachable {
    fn kind(&self) -> &'static str {
        "reachable"
    }

    fn disassemble(&self) -> Value {
        let mut reserved = vec![("check", Node::string(self.mode.name()))];
        if !self.unverified.is_empty() {
            reserved.push(("unverified", Node::set(self.unverified.clone())));
        }
        plain_predicate(
            "reachable",
            self.verified.iter().cloned().collect(),
            reserved,
            &self.user,
        )
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Reachable>(new, "reachable")?;
        self.verified = update_set(mem::take(&mut self.verified), new.verified)?;
        self.unverified = update_set(mem::take(&mut self.unverified), new.unverified)?;
        self.mode = new.mode;
        self.settle();
        update_user(&mut self.user, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let theirs = downcast_ref::<Reachable>(other, "reachable")?;
        if theirs.mode != self.mode {
            return resolve(self, other, ctx);
        }
        let mut merged = Reachable {
            verified: self.verified.clone(),
            unverified: self.unverified.clone(),
            mode: self.mode,
            user: merge_dicts(&self.user, &theirs.user, ctx)?,
        };
        for addr in theirs.verified.iter() {
            merged.verified.insert(addr.clone());
        }
        for candidate in theirs.unverified.iter() {
            merged.unverified.insert(candidate.clone());
        }
        merged.settle();
        Ok(Value::Smart(Box::new(merged)))
    }
}

pub struct ReachableAssembler {
    probe: Arc<dyn ReachabilityProbe>,
}

impl ReachableAssembler {
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        Self { probe }
    }

    /// One attempt per address, no retries.
    fn check(&self, ctx: &AssemblyContext, mode: CheckMode, addr: &Multiaddr) -> bool {
        if ctx.deadline_passed() {
            log::warn!("deadline passed before probing {}", addr);
            return false;
        }
        let peer = ctx.writer.as_ref();
        match mode {
            CheckMode::Dial => self.probe.is_dialable(peer, addr, ctx.deadline),
            CheckMode::Connection => self.probe.is_connected(peer, addr, ctx.deadline),
        }
    }
}

fn candidate_address(node: &Node) -> Option<&str> {
    if let Some(s) = node.as_str() {
        return Some(s);
    }
    match predicate_of(node, "multiaddress")?.positional.as_slice() {
        [only] => only.as_str(),
        _ => None,
    }
}

fn normalized_address(node: &Node) -> Option<String> {
    let addr = candidate_address(node)?.parse::<Multiaddr>().ok()?;
    Some(addr.to_string())
}

impl Assembler for ReachableAssembler {
    fn name(&self) -> &str {
        "reachable"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "reachable") else {
            return Ok(None);
        };
        let mode = match p.named.get_str("check") {
            None => CheckMode::Dial,
            Some(node) => node
                .as_str()
                .and_then(CheckMode::parse)
                .ok_or_else(|| malformed("reachable", "check must be \"dial\" or \"connection\""))?,
        };
        let retried: &[Node] = match p.named.get_str("unverified").map(|n| &n.value) {
            None => &[],
            Some(Value::Set(set)) => set.as_slice(),
            Some(other) => {
                return Err(malformed(
                    "reachable",
                    format!("unverified must be a set, got {}", other.kind()),
                ));
            }
        };

        let mut reachable = Reachable {
            verified: Set::new(),
            unverified: Set::new(),
            mode,
            user: user_fields(grammar, ctx, &p.named, RESERVED)?,
        };
        for candidate in p.positional.iter().chain(retried) {
            let addr = match candidate_address(candidate).map(str::parse::<Multiaddr>) {
                Some(Ok(addr)) => addr,
                Some(Err(e)) => {
                    log::warn!("keeping unparseable candidate unverified: {}", e);
                    reachable.unverified.insert(ctx.stamp(candidate.value.clone()));
                    continue;
                }
                None => {
                    log::warn!(
                        "keeping non-address candidate of kind {} unverified",
                        candidate.kind()
                    );
                    reachable.unverified.insert(ctx.stamp(candidate.value.clone()));
                    continue;
                }
            };
            if self.check(ctx, mode, &addr) {
                reachable.verified.insert(ctx.stamp(Value::String(addr.to_string())));
            } else {
                log::debug!("{} is not reachable ({})", addr, mode.name());
                reachable.unverified.insert(ctx.stamp(candidate.value.clone()));
            }
        }
        reachable.settle();
        Ok(Some(ctx.stamp(Value::Smart(Box::new(reachable)))))
    }
}
