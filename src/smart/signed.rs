//! Signed statements.
//!
//! - `sign(statement)` is signed by the grammar's local keyring.
//! - `signed(statement, by:, signature:)` is taken at face value.
//! - `verify(signed(..))` becomes `verified(..)` when the signature checks
//!   out and otherwise stays an unverified `verify(..)` claim.
//! - `verified(..)` is re-checked; a bad signature fails assembly.

use super::peer::PeerId;
use super::{
    SmartNode, downcast, downcast_ref, malformed, plain_predicate, predicate_of, resolve,
    single_positional, update_user, user_fields,
};
use crate::canonical;
use crate::error::{Result, SmartRecordError};
use crate::grammar::{Assembler, AssemblyContext, Grammar};
use crate::merge::{MergeContext, merge_dicts};
use crate::node::{Dict, Node, Predicate, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

const RESERVED: &[&str] = &["by", "signature"];

/// Signing capability. Key management lives outside this crate.
pub trait Keyring: Send + Sync {
    fn local_peer(&self) -> PeerId;
    fn sign(&self, message: &[u8]) -> Vec<u8>;
    fn verify(&self, peer: &PeerId, message: &[u8], signature: &[u8]) -> bool;
}

/// Keyed SHA-256 over per-peer shared secrets. Only for tests and tooling:
/// anyone holding a peer's secret can sign as that peer.
#[derive(Debug, Clone)]
pub struct DigestKeyring {
    local: PeerId,
    secrets: HashMap<PeerId, Vec<u8>>,
}

impl DigestKeyring {
    pub fn new(local: PeerId, secret: impl Into<Vec<u8>>) -> Self {
        let mut secrets = HashMap::new();
        secrets.insert(local.clone(), secret.into());
        Self { local, secrets }
    }

    pub fn trust(mut self, peer: PeerId, secret: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(peer, secret.into());
        self
    }

    fn mac(secret: &[u8], message: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update((secret.len() as u64).to_be_bytes());
        hasher.update(secret);
        hasher.update(message);
        hasher.finalize().to_vec()
    }
}

impl Keyring for DigestKeyring {
    fn local_peer(&self) -> PeerId {
        self.local.clone()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let secret = self.secrets.get(&self.local).map(Vec::as_slice).unwrap_or_default();
        Self::mac(secret, message)
    }

    fn verify(&self, peer: &PeerId, message: &[u8], signature: &[u8]) -> bool {
        self.secrets
            .get(peer)
            .is_some_and(|secret| Self::mac(secret, message) == signature)
    }
}

/// A statement together with its signer and signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub by: PeerId,
    pub statement: Node,
    pub signature: Vec<u8>,
}

impl Signature {
    pub fn message(by: &PeerId, statement: &Node) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(by.as_str().len() as u64).to_be_bytes());
        bytes.extend_from_slice(by.as_str().as_bytes());
        bytes.extend_from_slice(&canonical::encode(statement));
        bytes
    }

    pub fn create(keyring: &dyn Keyring, statement: Node) -> Self {
        let by = keyring.local_peer();
        let signature = keyring.sign(&Self::message(&by, &statement));
        Self {
            by,
            statement,
            signature,
        }
    }

    pub fn verify(&self, keyring: &dyn Keyring) -> bool {
        keyring.verify(&self.by, &Self::message(&self.by, &self.statement), &self.signature)
    }

    /// Reads `tag(statement, by: "..", signature: blob, ..)`.
    fn parse(p: &Predicate) -> Result<Self> {
        let statement = single_positional(p)?.disassemble();
        let by = p
            .named
            .get_str("by")
            .and_then(Node::as_str)
            .ok_or_else(|| malformed(&p.tag, "missing string argument 'by'"))?
            .parse::<PeerId>()?;
        let signature = match p.named.get_str("signature").map(|n| &n.value) {
            Some(Value::Blob(bytes)) => bytes.clone(),
            _ => return Err(malformed(&p.tag, "missing blob argument 'signature'")),
        };
        Ok(Self {
            by,
            statement,
            signature,
        })
    }

    fn to_plain(&self, tag: &str, user: &Dict) -> Value {
        plain_predicate(
            tag,
            vec![self.statement.clone()],
            vec![
                ("by", Node::string(self.by.as_str())),
                ("signature", Node::blob(self.signature.clone())),
            ],
            user,
        )
    }
}

fn require(keyring: &Option<Arc<dyn Keyring>>) -> Result<&dyn Keyring> {
    keyring
        .as_deref()
        .ok_or_else(|| SmartRecordError::MissingCapability("keyring".to_string()))
}

/// The newer signature always wins; user fields are folded in.
fn update_signed(
    sig: &mut Signature,
    user: &mut Dict,
    new_sig: Signature,
    new_user: Dict,
) -> Result<()> {
    *sig = new_sig;
    update_user(user, new_user)
}

#[derive(Debug, Clone)]
pub struct Signed {
    pub sig: Signature,
    pub user: Dict,
}

impl SmartNode for Signed {
    fn kind(&self) -> &'static str {
        "signed"
    }

    fn disassemble(&self) -> Value {
        self.sig.to_plain("signed", &self.user)
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Signed>(new, "signed")?;
        update_signed(&mut self.sig, &mut self.user, new.sig, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let theirs = downcast_ref::<Signed>(other, "signed")?;
        if theirs.sig != self.sig {
            return resolve(self, other, ctx);
        }
        Ok(Value::Smart(Box::new(Signed {
            sig: self.sig.clone(),
            user: merge_dicts(&self.user, &theirs.user, ctx)?,
        })))
    }
}

/// A signed claim whose signature could not be verified.
#[derive(Debug, Clone)]
pub struct Verify {
    pub statement: Node,
    pub user: Dict,
}

impl SmartNode for Verify {
    fn kind(&self) -> &'static str {
        "verify"
    }

    fn disassemble(&self) -> Value {
        plain_predicate("verify", vec![self.statement.clone()], vec![], &self.user)
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Verify>(new, "verify")?;
        self.statement = new.statement;
        update_user(&mut self.user, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let theirs = downcast_ref::<Verify>(other, "verify")?;
        if theirs.statement != self.statement {
            return resolve(self, other, ctx);
        }
        Ok(Value::Smart(Box::new(Verify {
            statement: self.statement.clone(),
            user: merge_dicts(&self.user, &theirs.user, ctx)?,
        })))
    }
}

#[derive(Debug, Clone)]
pub struct Verified {
    pub sig: Signature,
    pub user: Dict,
}

impl SmartNode for Verified {
    fn kind(&self) -> &'static str {
        "verified"
    }

    fn disassemble(&self) -> Value {
        self.sig.to_plain("verified", &self.user)
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Verified>(new, "verified")?;
        update_signed(&mut self.sig, &mut self.user, new.sig, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let theirs = downcast_ref::<Verified>(other, "verified")?;
        if theirs.sig != self.sig {
            return resolve(self, other, ctx);
        }
        Ok(Value::Smart(Box::new(Verified {
            sig: self.sig.clone(),
            user: merge_dicts(&self.user, &theirs.user, ctx)?,
        })))
    }
}

pub struct SignAssembler {
    keyring: Option<Arc<dyn Keyring>>,
}

impl SignAssembler {
    pub fn new(keyring: Option<Arc<dyn Keyring>>) -> Self {
        Self { keyring }
    }
}

impl Assembler for SignAssembler {
    fn name(&self) -> &str {
        "sign"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "sign") else {
            return Ok(None);
        };
        let keyring = require(&self.keyring)?;
        let statement = single_positional(p)?.disassemble();
        let sig = Signature::create(keyring, statement);
        let user = user_fields(grammar, ctx, &p.named, RESERVED)?;
        log::debug!("signed statement as {}", sig.by);
        Ok(Some(ctx.stamp(Value::Smart(Box::new(Signed { sig, user })))))
    }
}

pub struct SignedAssembler;

impl Assembler for SignedAssembler {
    fn name(&self) -> &str {
        "signed"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "signed") else {
            return Ok(None);
        };
        let sig = Signature::parse(p)?;
        let user = user_fields(grammar, ctx, &p.named, RESERVED)?;
        Ok(Some(ctx.stamp(Value::Smart(Box::new(Signed { sig, user })))))
    }
}

pub struct VerifyAssembler {
    keyring: Option<Arc<dyn Keyring>>,
}

impl VerifyAssembler {
    pub fn new(keyring: Option<Arc<dyn Keyring>>) -> Self {
        Self { keyring }
    }
}

impl Assembler for VerifyAssembler {
    fn name(&self) -> &str {
        "verify"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "verify") else {
            return Ok(None);
        };
        let keyring = require(&self.keyring)?;
        let claim = single_positional(p)?;
        let signed = predicate_of(claim, "signed")
            .ok_or_else(|| malformed("verify", "expected a signed(..) statement"))?;
        let sig = Signature::parse(signed)?;
        let user = user_fields(grammar, ctx, &p.named, &[])?;
        let node: Box<dyn SmartNode> = if sig.verify(keyring) {
            Box::new(Verified { sig, user })
        } else {
            log::warn!("signature by {} did not verify, keeping claim unverified", sig.by);
            Box::new(Verify {
                statement: claim.disassemble(),
                user,
            })
        };
        Ok(Some(ctx.stamp(Value::Smart(node))))
    }
}

pub struct VerifiedAssembler {
    keyring: Option<Arc<dyn Keyring>>,
}

impl VerifiedAssembler {
    pub fn new(keyring: Option<Arc<dyn Keyring>>) -> Self {
        Self { keyring }
    }
}

impl Assembler for VerifiedAssembler {
    fn name(&self) -> &str {
        "verified"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "verified") else {
            return Ok(None);
        };
        let keyring = require(&self.keyring)?;
        let sig = Signature::parse(p)?;
        if !sig.verify(keyring) {
            return Err(SmartRecordError::InvalidSignature(sig.by.to_string()));
        }
        let user = user_fields(grammar, ctx, &p.named, RESERVED)?;
        Ok(Some(ctx.stamp(Value::Smart(Box::new(Verified { sig, user })))))
    }
}
