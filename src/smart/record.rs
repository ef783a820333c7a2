use super::{
    SmartNode, downcast, downcast_ref, plain_predicate, predicate_of, resolve, single_string,
    update_user, user_fields,
};
use crate::error::{Result, SmartRecordError};
use crate::grammar::{Assembler, AssemblyContext, Grammar};
use crate::merge::{MergeContext, merge_dicts};
use crate::node::{Dict, Node, Value};

/// `record(key, ..user)`: a document that names the record key it belongs to.
///
/// The key is the record's identity, so updating a record with a different
/// key is a type mismatch rather than a rename.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: String,
    pub user: Dict,
}

impl SmartNode for Record {
    fn kind(&self) -> &'static str {
        "record"
    }

    fn disassemble(&self) -> Value {
        plain_predicate("record", vec![Node::string(&self.key)], vec![], &self.user)
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Record>(new, "record")?;
        if new.key != self.key {
            return Err(SmartRecordError::mismatch(
                format!("record {:?}", self.key),
                format!("record {:?}", new.key),
            ));
        }
        update_user(&mut self.user, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let theirs = downcast_ref::<Record>(other, "record")?;
        if theirs.key != self.key {
            return resolve(self, other, ctx);
        }
        Ok(Value::Smart(Box::new(Record {
            key: self.key.clone(),
            user: merge_dicts(&self.user, &theirs.user, ctx)?,
        })))
    }
}

pub struct RecordAssembler;

impl Assembler for RecordAssembler {
    fn name(&self) -> &str {
        "record"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "record") else {
            return Ok(None);
        };
        let key = single_string(p)?;
        let user = user_fields(grammar, ctx, &p.named, &[])?;
        Ok(Some(ctx.stamp(Value::Smart(Box::new(Record { key, user })))))
    }
}
