//! Content-addressed keys for sub-parts of a typed configuration.
//!
//! A key is the SHA-256 of a canonical encoding of the value at a dotted path.
//! It depends only on that value: changing `hyperparameters.max_depth` leaves
//! the key of `connection` untouched, so tasks that only read the connection
//! stay cached across a hyperparameter sweep.
//!
//! Canonical encoding (all lengths are u64 big-endian):
//!
//! | Tag | Value                                                     |
//! |-----|-----------------------------------------------------------|
//! | `S` | length, UTF-8 bytes                                       |
//! | `I` | i64 big-endian                                            |
//! | `F` | f64 bits big-endian (`-0.0` encoded as `0.0`)             |
//! | `B` | one byte, 0 or 1                                          |
//! | `E` | enum name, then token, each length-prefixed               |
//! | `N` | type name, field count, then name and value per field     |
//! | `L` | element count, then each element                          |

use crate::error::KeyError;
use crate::instantiate::{TypedNode, TypedValue};
use crate::path::{AttrPath, Segment};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Key of the value at one attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub path: String,
    pub digest: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest)
    }
}

/// What a path resolves to: the root node or a field value below it.
#[derive(Debug, Clone, Copy)]
pub enum Addressed<'a> {
    Node(&'a TypedNode),
    Value(&'a TypedValue),
}

/// Walk `path` from `root`.
pub fn resolve_path<'a>(root: &'a TypedNode, path: &AttrPath) -> Result<Addressed<'a>, KeyError> {
    let mut current = Addressed::Node(root);
    for segment in path.segments() {
        let invalid = || KeyError::InvalidPath {
            path: path.to_string(),
            segment: segment.to_string(),
        };
        current = match (current, segment) {
            (Addressed::Node(node) | Addressed::Value(TypedValue::Node(node)), segment) => {
                Addressed::Value(node.get(&segment.as_key()).ok_or_else(invalid)?)
            }
            (Addressed::Value(TypedValue::List(items)), Segment::Index(i)) => {
                Addressed::Value(items.get(*i).ok_or_else(invalid)?)
            }
            _ => return Err(invalid()),
        };
    }
    Ok(current)
}

/// Key for the sub-value at `dotted`; the empty path keys the whole tree.
pub fn key_for(root: &TypedNode, dotted: &str) -> Result<CacheKey, KeyError> {
    let path = AttrPath::parse(dotted).ok_or_else(|| KeyError::InvalidPath {
        path: dotted.to_string(),
        segment: String::new(),
    })?;
    let mut encoder = Encoder::default();
    match resolve_path(root, &path)? {
        Addressed::Node(node) => encoder.node(node),
        Addressed::Value(value) => encoder.value(value),
    }
    Ok(CacheKey {
        path: path.to_string(),
        digest: hex::encode(encoder.hasher.finalize()),
    })
}

/// Keys for several paths, sorted by path.
pub fn keys_for<S: AsRef<str>>(
    root: &TypedNode,
    paths: &[S],
) -> Result<BTreeMap<String, CacheKey>, KeyError> {
    paths
        .iter()
        .map(|p| key_for(root, p.as_ref()).map(|key| (p.as_ref().to_string(), key)))
        .collect()
}

#[derive(Default)]
struct Encoder {
    hasher: Sha256,
}

impl Encoder {
    fn tag(&mut self, tag: u8) {
        self.hasher.update([tag]);
    }

    fn count(&mut self, n: usize) {
        self.hasher.update((n as u64).to_be_bytes());
    }

    fn text(&mut self, s: &str) {
        self.count(s.len());
        self.hasher.update(s.as_bytes());
    }

    fn node(&mut self, node: &TypedNode) {
        self.tag(b'N');
        self.text(node.type_name());
        self.count(node.fields().count());
        for (name, value) in node.fields() {
            self.text(name);
            self.value(value);
        }
    }

    fn value(&mut self, value: &TypedValue) {
        match value {
            TypedValue::Str(s) => {
                self.tag(b'S');
                self.text(s);
            }
            TypedValue::Int(i) => {
                self.tag(b'I');
                self.hasher.update(i.to_be_bytes());
            }
            TypedValue::Float(f) => {
                self.tag(b'F');
                let f = if *f == 0.0 { 0.0 } else { *f };
                self.hasher.update(f.to_bits().to_be_bytes());
            }
            TypedValue::Bool(b) => {
                self.tag(b'B');
                self.hasher.update([u8::from(*b)]);
            }
            TypedValue::Enum { enum_name, token } => {
                self.tag(b'E');
                self.text(enum_name);
                self.text(token);
            }
            TypedValue::Node(node) => self.node(node),
            TypedValue::List(items) => {
                self.tag(b'L');
                self.count(items.len());
                for item in items {
                    self.value(item);
                }
            }
        }
    }
}
