use super::{
    SmartNode, downcast, downcast_ref, plain_predicate, predicate_of, resolve, single_string,
    update_user, user_fields,
};
use crate::error::{Result, SmartRecordError};
use crate::grammar::{Assembler, AssemblyContext, Grammar};
use crate::merge::{MergeContext, merge_dicts};
use crate::node::{Dict, Node, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a writing peer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = SmartRecordError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(SmartRecordError::Assembly(format!("invalid peer id {:?}", s)));
        }
        Ok(PeerId(s.to_string()))
    }
}

/// `peer(id, ..user)`
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub user: Dict,
}

impl SmartNode for Peer {
    fn kind(&self) -> &'static str {
        "peer"
    }

    fn disassemble(&self) -> Value {
        plain_predicate("peer", vec![Node::string(self.id.as_str())], vec![], &self.user)
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Peer>(new, "peer")?;
        if new.id != self.id {
            return Err(SmartRecordError::mismatch(
                format!("peer {}", self.id),
                format!("peer {}", new.id),
            ));
        }
        update_user(&mut self.user, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let other_peer = downcast_ref::<Peer>(other, "peer")?;
        if other_peer.id != self.id {
            return resolve(self, other, ctx);
        }
        Ok(Value::Smart(Box::new(Peer {
            id: self.id.clone(),
            user: merge_dicts(&self.user, &other_peer.user, ctx)?,
        })))
    }
}

pub struct PeerAssembler;

impl Assembler for PeerAssembler {
    fn name(&self) -> &str {
        "peer"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "peer") else {
            return Ok(None);
        };
        let id = single_string(p)?.parse::<PeerId>()?;
        let user = user_fields(grammar, ctx, &p.named, &[])?;
        Ok(Some(ctx.stamp(Value::Smart(Box::new(Peer { id, user })))))
    }
}
