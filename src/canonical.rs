use crate::node::{Dict, Node, Value};
use sha2::{Digest, Sha256};

/// Deterministic bytes for the disassembled form of `node`.
///
/// Dict pairs and set elements are sorted by their own encodings, so two
/// structurally equal nodes always encode to the same bytes.
pub fn encode(node: &Node) -> Vec<u8> {
    let mut buf = Vec::new();
    write_value_canonical(&mut buf, &node.value);
    buf
}

pub fn digest(node: &Node) -> [u8; 32] {
    let digest = Sha256::digest(encode(node));
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn content_id(node: &Node) -> String {
    format!("sha256-{}", to_hex(&digest(node)))
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn write_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u64).to_be_bytes());
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_len(buf, bytes.len());
    buf.extend_from_slice(bytes);
}

fn write_sorted(buf: &mut Vec<u8>, mut items: Vec<Vec<u8>>) {
    items.sort();
    write_len(buf, items.len());
    for item in items {
        buf.extend_from_slice(&item);
    }
}

fn pair_encodings(dict: &Dict) -> Vec<Vec<u8>> {
    dict.iter()
        .map(|p| {
            let mut item = Vec::new();
            write_value_canonical(&mut item, &p.key.value);
            write_value_canonical(&mut item, &p.value.value);
            item
        })
        .collect()
}

fn write_value_canonical(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::String(v) => {
            buf.push(0x01);
            write_bytes(buf, v.as_bytes());
        }
        Value::Bool(v) => {
            buf.push(0x02);
            buf.push(if *v { 0x01 } else { 0x00 });
        }
        Value::Blob(v) => {
            buf.push(0x03);
            write_bytes(buf, v);
        }
        Value::Int(v) => {
            buf.push(0x04);
            write_bytes(buf, &v.to_signed_bytes_be());
        }
        Value::Float(v) => {
            buf.push(0x05);
            write_bytes(buf, v.normalized().to_string().as_bytes());
        }
        Value::Dict(d) => {
            buf.push(0x06);
            write_bytes(buf, d.tag.as_bytes());
            write_sorted(buf, pair_encodings(d));
        }
        Value::Set(s) => {
            buf.push(0x07);
            write_bytes(buf, s.tag.as_bytes());
            let items = s
                .iter()
                .map(|e| {
                    let mut item = Vec::new();
                    write_value_canonical(&mut item, &e.value);
                    item
                })
                .collect();
            write_sorted(buf, items);
        }
        Value::Predicate(p) => {
            buf.push(0x08);
            write_bytes(buf, p.tag.as_bytes());
            write_len(buf, p.positional.len());
            for arg in &p.positional {
                write_value_canonical(buf, &arg.value);
            }
            write_sorted(buf, pair_encodings(&p.named));
        }
        Value::Smart(s) => write_value_canonical(buf, &s.disassemble()),
    }
}
