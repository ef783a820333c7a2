//! Request handling for whatever transport carries store operations.
//!
//! The transport delivers a [`Request`] together with the authenticated
//! identity of the sender; [`handle`] runs it against a [`Store`] and never
//! fails, turning errors into [`Status::Error`].

use crate::codec;
use crate::error::{Result, SmartRecordError};
use crate::grammar::MetadataOptions;
use crate::node::{Dict, Node};
use crate::smart::peer::PeerId;
use crate::store::{Store, UpdateOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Get,
    Update,
    Query,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub operation: Operation,
    pub key: Vec<u8>,
    #[serde(default)]
    pub value: Vec<u8>,
    /// Seconds until the written nodes expire; 0 means the store default.
    #[serde(default)]
    pub ttl: u64,
}

impl Request {
    pub fn get(key: &str) -> Self {
        Self::new(Operation::Get, key, Vec::new(), 0)
    }

    pub fn update(key: &str, doc: &Node, ttl: u64) -> Result<Self> {
        Ok(Self::new(Operation::Update, key, codec::marshal(doc)?, ttl))
    }

    pub fn query(key: &str, selector: &Dict) -> Result<Self> {
        let selector = Node::dict(selector.clone());
        Ok(Self::new(Operation::Query, key, codec::marshal(&selector)?, 0))
    }

    fn new(operation: Operation, key: &str, value: Vec<u8>, ttl: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            key: key.as_bytes().to_vec(),
            value,
            ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub status: Status,
    #[serde(default)]
    pub value: Vec<u8>,
}

impl Response {
    /// Decodes a GET/QUERY payload back into writer → document.
    pub fn documents(&self) -> Result<BTreeMap<PeerId, Dict>> {
        if let Status::Error(msg) = &self.status {
            return Err(SmartRecordError::Protocol(msg.clone()));
        }
        let by_writer = codec::unmarshal(&self.value)?.into_dict()?;
        let mut out = BTreeMap::new();
        for pair in by_writer.into_pairs() {
            let writer = pair
                .key
                .as_str()
                .ok_or_else(|| {
                    SmartRecordError::Protocol("writer key is not a string".to_string())
                })?
                .parse::<PeerId>()?;
            out.insert(writer, pair.value.into_dict()?);
        }
        Ok(out)
    }
}

/// Per-request deadline applied to assembly side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerOptions {
    pub timeout: Option<Duration>,
}

pub fn handle(store: &Store, writer: &PeerId, request: &Request) -> Response {
    handle_with(store, writer, request, HandlerOptions::default())
}

pub fn handle_with(
    store: &Store,
    writer: &PeerId,
    request: &Request,
    options: HandlerOptions,
) -> Response {
    let result = dispatch(store, writer, request, options);
    let (status, value) = match result {
        Ok(value) => (Status::Ok, value),
        Err(e) => {
            log::debug!("request {} from {} failed: {}", request.id, writer, e);
            (Status::Error(e.to_string()), Vec::new())
        }
    };
    Response {
        id: request.id,
        status,
        value,
    }
}

fn dispatch(
    store: &Store,
    writer: &PeerId,
    request: &Request,
    options: HandlerOptions,
) -> Result<Vec<u8>> {
    let key = std::str::from_utf8(&request.key)
        .map_err(|_| SmartRecordError::Protocol("key is not valid utf-8".to_string()))?;
    match request.operation {
        Operation::Get => encode_documents(store.get(key)),
        Operation::Query => {
            let selector = codec::unmarshal(&request.value)?.into_dict()?;
            encode_documents(store.query(key, &selector))
        }
        Operation::Update => {
            let doc = codec::unmarshal(&request.value)?;
            let metadata = match request.ttl {
                0 => MetadataOptions::default(),
                secs => MetadataOptions::expires_in(Duration::from_secs(secs)),
            };
            let update = UpdateOptions {
                metadata,
                deadline: options.timeout.map(|t| Instant::now() + t),
            };
            store.update_with(writer, key, doc, update)?;
            Ok(Vec::new())
        }
    }
}

fn encode_documents(docs: BTreeMap<PeerId, Dict>) -> Result<Vec<u8>> {
    let mut by_writer = Dict::new();
    for (writer, doc) in docs {
        by_writer.insert(writer.as_str(), doc);
    }
    codec::marshal(&Node::dict(by_writer))
}
