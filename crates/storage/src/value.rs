//! The tagged union every key in a [`crate::Database`] maps to.

use emberkv_datastruct::{Quicklist, Set, Zset};

/// A key's value kind; stable for the key's lifetime (§3 of the
/// specification: "a key's value has exactly one kind for its
/// lifetime; type-changing writes fail unless the key is first
/// removed").
pub enum Value {
    String(Vec<u8>),
    Hash(emberkv_datastruct::Dict<String, Vec<u8>>),
    List(Quicklist<Vec<u8>>),
    Set(Set),
    Zset(Zset),
}

/// Human-readable kind name, as reported by the `TYPE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Hash,
    List,
    Set,
    Zset,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Hash(_) => ValueKind::Hash,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::Zset(_) => ValueKind::Zset,
        }
    }
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Hash => "hash",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::Zset => "zset",
        }
    }
}
