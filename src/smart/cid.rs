use super::{
    SmartNode, downcast, downcast_ref, malformed, plain_predicate, predicate_of, resolve,
    single_string, update_user, user_fields,
};
use crate::canonical;
use crate::error::Result;
use crate::grammar::{Assembler, AssemblyContext, Grammar};
use crate::merge::{MergeContext, merge_dicts};
use crate::node::{Dict, Node, Value};

/// `cid(value, ..user)`: a content identifier.
#[derive(Debug, Clone)]
pub struct Cid {
    pub value: String,
    pub user: Dict,
}

impl Cid {
    /// Content id of the disassembled form of `node`.
    pub fn of(node: &Node) -> Self {
        Self {
            value: canonical::content_id(node),
            user: Dict::new(),
        }
    }

    fn is_valid(value: &str) -> bool {
        !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl SmartNode for Cid {
    fn kind(&self) -> &'static str {
        "cid"
    }

    fn disassemble(&self) -> Value {
        plain_predicate("cid", vec![Node::string(&self.value)], vec![], &self.user)
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Cid>(new, "cid")?;
        self.value = new.value;
        update_user(&mut self.user, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let theirs = downcast_ref::<Cid>(other, "cid")?;
        if theirs.value != self.value {
            return resolve(self, other, ctx);
        }
        Ok(Value::Smart(Box::new(Cid {
            value: self.value.clone(),
            user: merge_dicts(&self.user, &theirs.user, ctx)?,
        })))
    }
}

pub struct CidAssembler;

impl Assembler for CidAssembler {
    fn name(&self) -> &str {
        "cid"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "cid") else {
            return Ok(None);
        };
        let value = single_string(p)?;
        if !Cid::is_valid(&value) {
            return Err(malformed("cid", format!("invalid content id {:?}", value)));
        }
        let user = user_fields(grammar, ctx, &p.named, &[])?;
        Ok(Some(ctx.stamp(Value::Smart(Box::new(Cid { value, user })))))
    }
}
