//! JSON wire form for plain documents.
//!
//! Numbers travel as decimal strings so arbitrary precision survives the
//! round trip. Metadata is not part of the wire form.

use crate::error::{Result, SmartRecordError};
use crate::node::{Dict, Node, Pair, Predicate, Set, Value};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireNode {
    String(String),
    Bool(bool),
    Blob(Vec<u8>),
    Int(String),
    Float(String),
    Dict {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        tag: String,
        pairs: Vec<(WireNode, WireNode)>,
    },
    Set {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        tag: String,
        elements: Vec<WireNode>,
    },
    Predicate {
        tag: String,
        #[serde(default)]
        positional: Vec<WireNode>,
        #[serde(default)]
        named: Vec<(WireNode, WireNode)>,
    },
}

/// Encodes the disassembled form of `node`.
pub fn marshal(node: &Node) -> Result<Vec<u8>> {
    let wire = to_wire(&node.disassemble().value);
    Ok(serde_json::to_vec(&wire)?)
}

pub fn unmarshal(bytes: &[u8]) -> Result<Node> {
    let wire: WireNode = serde_json::from_slice(bytes)?;
    from_wire(wire)
}

fn pairs_to_wire(dict: &Dict) -> Vec<(WireNode, WireNode)> {
    dict.iter()
        .map(|p| (to_wire(&p.key.value), to_wire(&p.value.value)))
        .collect()
}

fn to_wire(value: &Value) -> WireNode {
    match value {
        Value::String(s) => WireNode::String(s.clone()),
        Value::Bool(b) => WireNode::Bool(*b),
        Value::Blob(bytes) => WireNode::Blob(bytes.clone()),
        Value::Int(i) => WireNode::Int(i.to_string()),
        Value::Float(f) => WireNode::Float(f.to_string()),
        Value::Dict(d) => WireNode::Dict {
            tag: d.tag.clone(),
            pairs: pairs_to_wire(d),
        },
        Value::Set(s) => WireNode::Set {
            tag: s.tag.clone(),
            elements: s.iter().map(|e| to_wire(&e.value)).collect(),
        },
        Value::Predicate(p) => WireNode::Predicate {
            tag: p.tag.clone(),
            positional: p.positional.iter().map(|a| to_wire(&a.value)).collect(),
            named: pairs_to_wire(&p.named),
        },
        Value::Smart(s) => to_wire(&s.disassemble()),
    }
}

fn pairs_from_wire(tag: String, pairs: Vec<(WireNode, WireNode)>) -> Result<Dict> {
    let pairs = pairs
        .into_iter()
        .map(|(k, v)| {
            Ok(Pair {
                key: from_wire(k)?,
                value: from_wire(v)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Dict::try_from_pairs(tag, pairs)
}

fn from_wire(wire: WireNode) -> Result<Node> {
    let value = match wire {
        WireNode::String(s) => Value::String(s),
        WireNode::Bool(b) => Value::Bool(b),
        WireNode::Blob(bytes) => Value::Blob(bytes),
        WireNode::Int(s) => Value::Int(
            BigInt::from_str(&s)
                .map_err(|_| SmartRecordError::Protocol(format!("invalid int literal {:?}", s)))?,
        ),
        WireNode::Float(s) => Value::Float(
            BigDecimal::from_str(&s)
                .map_err(|_| SmartRecordError::Protocol(format!("invalid float literal {:?}", s)))?,
        ),
        WireNode::Dict { tag, pairs } => Value::Dict(pairs_from_wire(tag, pairs)?),
        WireNode::Set { tag, elements } => {
            let mut set = Set::tagged(tag);
            for element in elements {
                set.insert(from_wire(element)?);
            }
            Value::Set(set)
        }
        WireNode::Predicate {
            tag,
            positional,
            named,
        } => Value::Predicate(Predicate {
            tag,
            positional: positional
                .into_iter()
                .map(from_wire)
                .collect::<Result<Vec<_>>>()?,
            named: pairs_from_wire(String::new(), named)?,
        }),
    };
    Ok(Node::new(value))
}
