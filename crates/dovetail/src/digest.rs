//! Document checksums.
//!
//! The digest walks the tree in field declaration order, never JSON key
//! order, so key shuffling and field filtering cannot change a row's
//! checksum. Each checked field feeds the hash as `name NUL tag value
//! NUL`; nested objects are bracketed with `{` and `}` frames, arrays
//! with `[` and `]`. A field that is disabled, resolves to NOCHECK, or
//! is absent or `null` in the document contributes nothing.

use dovetail_core::{ColumnType, Object, ObjectTree};

use serde_json::Value;
use sha2::{Digest as _, Sha256};
use tracing::trace;

/// SHA-256 over the document's checked fields.
pub fn digest(tree: &ObjectTree, document: &Value) -> [u8; 32] {
    let mut walk = Walk {
        tree,
        hasher: Sha256::new(),
        visited: None,
    };
    walk.object(tree.root(), document, "");
    walk.hasher.finalize().into()
}

/// Like [`digest`], also returning the field paths that contributed, in
/// visit order.
pub fn digest_traced(tree: &ObjectTree, document: &Value) -> ([u8; 32], Vec<String>) {
    let mut walk = Walk {
        tree,
        hasher: Sha256::new(),
        visited: Some(vec![]),
    };
    walk.object(tree.root(), document, "");
    let digest = walk.hasher.finalize().into();
    (digest, walk.visited.unwrap_or_default())
}

/// Attaches the hex digest as `_metadata.etag`, alongside any extra
/// metadata entries.
pub fn post_process_json(document: &mut Value, digest: [u8; 32], extra: &[(&str, Value)]) {
    let Some(map) = document.as_object_mut() else {
        return;
    };
    let mut metadata = serde_json::Map::new();
    metadata.insert("etag".to_string(), Value::String(hex(&digest)));
    for (key, value) in extra {
        metadata.insert((*key).to_string(), value.clone());
    }
    map.insert("_metadata".to_string(), Value::Object(metadata));
}

struct Walk<'a> {
    tree: &'a ObjectTree,
    hasher: Sha256,
    visited: Option<Vec<String>>,
}

impl Walk<'_> {
    fn object(&mut self, object: &Object, document: &Value, path: &str) {
        let Some(map) = document.as_object() else {
            return;
        };
        for field in &object.fields {
            let table_check = self.tree.source(field.source).caps().check;
            if field.disabled || !field.checked(table_check) {
                continue;
            }
            let Some(value) = map.get(&field.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let full = join_path(path, &field.name);
            trace!(field = %full, "digest");
            self.visit(&full);

            self.hasher.update(field.name.as_bytes());
            self.hasher.update([0]);
            match field.nested {
                Some(child_id) => {
                    let child = &self.tree[child_id];
                    let joined = self.tree.joined(child.root_source);
                    if joined.to_many {
                        self.hasher.update([b'[']);
                        if let Some(items) = value.as_array() {
                            match &joined.reduce_to_field {
                                Some(target) => self.reduced_items(child, target, items),
                                None => {
                                    for item in items {
                                        self.hasher.update([b'{']);
                                        self.object(child, item, &full);
                                        self.hasher.update([b'}']);
                                    }
                                }
                            }
                        }
                        self.hasher.update([b']']);
                    } else {
                        self.hasher.update([b'{']);
                        self.object(child, value, &full);
                        self.hasher.update([b'}']);
                    }
                }
                None => self.scalar(field.ty, value),
            }
        }
    }

    fn reduced_items(&mut self, child: &Object, target: &str, items: &[Value]) {
        let Some(reduced) = child.field(target) else {
            return;
        };
        for item in items {
            if item.is_null() {
                continue;
            }
            self.scalar(reduced.ty, item);
        }
    }

    fn scalar(&mut self, ty: ColumnType, value: &Value) {
        self.hasher.update([type_tag(ty)]);
        self.hasher.update(canonical(ty, value).as_bytes());
        self.hasher.update([0]);
    }

    fn visit(&mut self, path: &str) {
        if let Some(visited) = &mut self.visited {
            if !visited.iter().any(|p| p == path) {
                visited.push(path.to_string());
            }
        }
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn type_tag(ty: ColumnType) -> u8 {
    match ty {
        ColumnType::Integer => b'i',
        ColumnType::Double => b'd',
        ColumnType::String => b's',
        ColumnType::Binary => b'b',
        ColumnType::Boolean => b'o',
        ColumnType::Json => b'j',
        ColumnType::Geometry => b'g',
    }
}

/// Canonical text for one scalar: integers in decimal whether they
/// arrived as numbers or strings, doubles in their shortest round-trip
/// form, strings and Base64 raw, JSON compact with sorted keys.
fn canonical(ty: ColumnType, value: &Value) -> String {
    match (ty, value) {
        (ColumnType::Integer | ColumnType::Double, Value::Number(n)) => n.to_string(),
        (ColumnType::Integer, Value::String(s)) => s.clone(),
        (ColumnType::String | ColumnType::Binary, Value::String(s)) => s.clone(),
        (ColumnType::Boolean, Value::Bool(b)) => b.to_string(),
        _ => serde_json::to_string(value).expect("serializing an in-memory JSON value"),
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out
}
