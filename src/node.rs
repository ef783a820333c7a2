use crate::error::{Result, SmartRecordError};
use crate::smart::SmartNode;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;

/// Per-node metadata. A node without an expiration never expires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub expires_at: Option<DateTime<Utc>>,
}

impl Metadata {
    pub fn expiring_at(at: DateTime<Utc>) -> Self {
        Self {
            expires_at: Some(at),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Later expiration wins; an absent incoming expiration keeps the existing one.
    pub fn combine(&self, incoming: &Metadata) -> Metadata {
        let expires_at = match (self.expires_at, incoming.expires_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
        Metadata { expires_at }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub value: Value,
    pub meta: Metadata,
}

#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Bool(bool),
    Blob(Vec<u8>),
    Int(BigInt),
    Float(BigDecimal),
    Dict(Dict),
    Set(Set),
    Predicate(Predicate),
    Smart(Box<dyn SmartNode>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Blob(_) => "blob",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Predicate(_) => "predicate",
            Value::Smart(s) => s.kind(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Value::String(_)
                | Value::Bool(_)
                | Value::Blob(_)
                | Value::Int(_)
                | Value::Float(_)
        )
    }

    /// Reduce to a tree made only of plain variants.
    pub fn disassemble(&self) -> Value {
        match self {
            Value::Dict(d) => Value::Dict(d.disassemble()),
            Value::Set(s) => Value::Set(s.disassemble()),
            Value::Predicate(p) => Value::Predicate(p.disassemble()),
            Value::Smart(s) => s.disassemble(),
            leaf => leaf.clone(),
        }
    }

    pub fn is_plain(&self) -> bool {
        match self {
            Value::Dict(d) => d.iter().all(|p| p.key.is_plain() && p.value.is_plain()),
            Value::Set(s) => s.iter().all(Node::is_plain),
            Value::Predicate(p) => {
                p.positional.iter().all(Node::is_plain)
                    && p.named.iter().all(|p| p.key.is_plain() && p.value.is_plain())
            }
            Value::Smart(_) => false,
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Smart(a), _) => a.disassemble() == *other,
            (_, Value::Smart(b)) => *self == b.disassemble(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Predicate(a), Value::Predicate(b)) => a == b,
            _ => false,
        }
    }
}

impl Node {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            meta: Metadata::default(),
        }
    }

    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(Value::String(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Self::new(Value::Bool(b))
    }

    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Value::Blob(bytes.into()))
    }

    pub fn int(i: impl Into<BigInt>) -> Self {
        Self::new(Value::Int(i.into()))
    }

    pub fn float(f: BigDecimal) -> Self {
        Self::new(Value::Float(f))
    }

    pub fn dict(d: Dict) -> Self {
        Self::new(Value::Dict(d))
    }

    pub fn set(s: Set) -> Self {
        Self::new(Value::Set(s))
    }

    pub fn predicate(p: Predicate) -> Self {
        Self::new(Value::Predicate(p))
    }

    pub fn smart(s: impl SmartNode) -> Self {
        Self::new(Value::Smart(Box::new(s)))
    }

    pub fn kind(&self) -> &'static str {
        self.value.kind()
    }

    pub fn is_plain(&self) -> bool {
        self.value.is_plain()
    }

    pub fn disassemble(&self) -> Node {
        Node {
            value: self.value.disassemble(),
            meta: self.meta.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match &self.value {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_dict(self) -> Result<Dict> {
        match self.value {
            Value::Dict(d) => Ok(d),
            other => Err(SmartRecordError::NotADict(other.kind().to_string())),
        }
    }

    pub fn smart_ref<T: SmartNode>(&self) -> Option<&T> {
        match &self.value {
            Value::Smart(s) => s.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::string(s)
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::string(s)
    }
}

impl From<Dict> for Node {
    fn from(d: Dict) -> Self {
        Node::dict(d)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub key: Node,
    pub value: Node,
}

/// Ordered key/value pairs with keys unique under structural equality.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    pub tag: String,
    pairs: Vec<Pair>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            pairs: Vec::new(),
        }
    }

    /// Builds a dict from pairs that must already be key-unique.
    pub fn try_from_pairs(tag: impl Into<String>, pairs: Vec<Pair>) -> Result<Self> {
        let mut dict = Self::tagged(tag);
        for pair in pairs {
            if dict.contains_key(&pair.key) {
                return Err(SmartRecordError::KeyViolation(format!("{}", pair.key)));
            }
            dict.pairs.push(pair);
        }
        Ok(dict)
    }

    pub(crate) fn from_unique_pairs(tag: String, pairs: Vec<Pair>) -> Self {
        debug_assert!(
            pairs
                .iter()
                .enumerate()
                .all(|(i, p)| pairs[i + 1..].iter().all(|q| q.key != p.key)),
            "duplicate dict key"
        );
        Self { tag, pairs }
    }

    /// Inserts or overwrites in place. Returns the previous value for the key.
    pub fn insert(&mut self, key: impl Into<Node>, value: impl Into<Node>) -> Option<Node> {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|p| p.key == key) {
            Some(pair) => Some(std::mem::replace(&mut pair.value, value)),
            None => {
                self.pairs.push(Pair { key, value });
                None
            }
        }
    }

    pub fn with(mut self, key: impl Into<Node>, value: impl Into<Node>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &Node) -> Option<&Node> {
        self.pairs.iter().find(|p| p.key == *key).map(|p| &p.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&Node> {
        self.pairs
            .iter()
            .find(|p| p.key.as_str() == Some(key))
            .map(|p| &p.value)
    }

    pub fn contains_key(&self, key: &Node) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &Node) -> Option<Node> {
        let pos = self.pairs.iter().position(|p| p.key == *key)?;
        Some(self.pairs.remove(pos).value)
    }

    pub fn remove_str(&mut self, key: &str) -> Option<Node> {
        let pos = self.pairs.iter().position(|p| p.key.as_str() == Some(key))?;
        Some(self.pairs.remove(pos).value)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pair> {
        self.pairs.iter()
    }

    pub fn into_pairs(self) -> Vec<Pair> {
        self.pairs
    }

    pub fn retain(&mut self, f: impl FnMut(&Pair) -> bool) {
        self.pairs.retain(f);
    }

    pub fn disassemble(&self) -> Dict {
        Dict {
            tag: self.tag.clone(),
            pairs: self
                .pairs
                .iter()
                .map(|p| Pair {
                    key: p.key.disassemble(),
                    value: p.value.disassemble(),
                })
                .collect(),
        }
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.pairs.len() == other.pairs.len()
            && self
                .pairs
                .iter()
                .all(|p| other.get(&p.key).is_some_and(|v| *v == p.value))
    }
}

/// Unordered elements, unique under structural equality.
#[derive(Debug, Clone, Default)]
pub struct Set {
    pub tag: String,
    elements: Vec<Node>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            elements: Vec::new(),
        }
    }

    pub(crate) fn from_unique_elements(tag: String, elements: Vec<Node>) -> Self {
        Self { tag, elements }
    }

    /// Duplicates are absorbed. Returns whether the element was new.
    pub fn insert(&mut self, element: impl Into<Node>) -> bool {
        let element = element.into();
        if self.contains(&element) {
            return false;
        }
        self.elements.push(element);
        true
    }

    pub fn with(mut self, element: impl Into<Node>) -> Self {
        self.insert(element);
        self
    }

    pub fn contains(&self, element: &Node) -> bool {
        self.elements.iter().any(|e| e == element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<Node> {
        self.elements
    }

    pub fn retain(&mut self, f: impl FnMut(&Node) -> bool) {
        self.elements.retain(f);
    }

    pub fn disassemble(&self) -> Set {
        Set {
            tag: self.tag.clone(),
            elements: self.elements.iter().map(Node::disassemble).collect(),
        }
    }
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.elements.len() == other.elements.len()
            && self.elements.iter().all(|e| other.contains(e))
    }
}

/// A tagged call-shaped value: `tag(positional.., name: value..)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub tag: String,
    pub positional: Vec<Node>,
    pub named: Dict,
}

impl Predicate {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            positional: Vec::new(),
            named: Dict::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<Node>) -> Self {
        self.positional.push(arg.into());
        self
    }

    pub fn named(mut self, key: impl Into<Node>, value: impl Into<Node>) -> Self {
        self.named.insert(key, value);
        self
    }

    pub fn disassemble(&self) -> Predicate {
        Predicate {
            tag: self.tag.clone(),
            positional: self.positional.iter().map(Node::disassemble).collect(),
            named: self.named.disassemble(),
        }
    }
}

impl From<Predicate> for Node {
    fn from(p: Predicate) -> Self {
        Node::predicate(p)
    }
}

impl From<Set> for Node {
    fn from(s: Set) -> Self {
        Node::set(s)
    }
}
