use crate::node::{Dict, Node, Value};
use std::fmt::{self, Write};

const INDENT: &str = "  ";

/// Renders the disassembled form of `node` for diagnostics.
pub fn pretty_print<W: Write>(node: &Node, w: &mut W) -> fmt::Result {
    write_value(&node.value, w, 0)
}

pub fn to_pretty_string(node: &Node) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = pretty_print(node, &mut out);
    out
}

fn pad<W: Write>(w: &mut W, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        w.write_str(INDENT)?;
    }
    Ok(())
}

fn write_pairs<W: Write>(dict: &Dict, w: &mut W, depth: usize) -> fmt::Result {
    for pair in dict.iter() {
        pad(w, depth + 1)?;
        write_value(&pair.key.value, w, depth + 1)?;
        w.write_str(": ")?;
        write_value(&pair.value.value, w, depth + 1)?;
        w.write_str(",\n")?;
    }
    Ok(())
}

fn write_value<W: Write>(value: &Value, w: &mut W, depth: usize) -> fmt::Result {
    match value {
        Value::String(s) => write!(w, "{:?}", s),
        Value::Bool(b) => write!(w, "{}", b),
        Value::Blob(bytes) => write!(w, "0x{}", crate::canonical::to_hex(bytes)),
        Value::Int(i) => write!(w, "{}", i),
        Value::Float(f) => write!(w, "{}", f),
        Value::Dict(d) => {
            if d.is_empty() {
                return write!(w, "{}{{}}", d.tag);
            }
            writeln!(w, "{}{{", d.tag)?;
            write_pairs(d, w, depth)?;
            pad(w, depth)?;
            w.write_char('}')
        }
        Value::Set(s) => {
            if s.is_empty() {
                return write!(w, "{}[]", s.tag);
            }
            writeln!(w, "{}[", s.tag)?;
            for element in s.iter() {
                pad(w, depth + 1)?;
                write_value(&element.value, w, depth + 1)?;
                w.write_str(",\n")?;
            }
            pad(w, depth)?;
            w.write_char(']')
        }
        Value::Predicate(p) => {
            if p.positional.is_empty() && p.named.is_empty() {
                return write!(w, "{}()", p.tag);
            }
            writeln!(w, "{}(", p.tag)?;
            for arg in &p.positional {
                pad(w, depth + 1)?;
                write_value(&arg.value, w, depth + 1)?;
                w.write_str(",\n")?;
            }
            write_pairs(&p.named, w, depth)?;
            pad(w, depth)?;
            w.write_char(')')
        }
        Value::Smart(s) => write_value(&s.disassemble(), w, depth),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        pretty_print(self, f)
    }
}
