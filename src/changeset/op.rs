//! Op: one run of a changeset
//!
//! A changeset walks its input document from left to right. Each op covers a
//! run of `len` characters and either keeps them (optionally changing their
//! attributes), deletes them, or inserts `len` new characters taken from the
//! changeset's char bank.

use crate::error::Result;
use crate::pool::AttributePool;
use crate::AttribCode;
use serde::{Deserialize, Serialize};

/// What an op does to its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Copy characters from the input (`=`)
    Keep,
    /// Add characters from the char bank (`+`)
    Insert,
    /// Drop characters from the input (`-`)
    Delete,
}

impl OpKind {
    /// Wire opcode
    pub fn opcode(self) -> char {
        match self {
            OpKind::Keep => '=',
            OpKind::Insert => '+',
            OpKind::Delete => '-',
        }
    }

    /// Parse a wire opcode
    pub fn from_opcode(c: char) -> Option<Self> {
        match c {
            '=' => Some(OpKind::Keep),
            '+' => Some(OpKind::Insert),
            '-' => Some(OpKind::Delete),
            _ => None,
        }
    }
}

/// A run of `len` characters with a kind and attribute codes
///
/// On an insert the attributes describe the new text. On a keep they are a
/// mutation applied to the kept text, where an empty value removes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Op {
    pub kind: OpKind,
    pub len: usize,
    pub attribs: Vec<AttribCode>,
}

impl Op {
    pub fn new(kind: OpKind, len: usize, attribs: Vec<AttribCode>) -> Self {
        Self { kind, len, attribs }
    }

    pub fn keep(len: usize) -> Self {
        Self::new(OpKind::Keep, len, Vec::new())
    }

    pub fn insert(len: usize, attribs: Vec<AttribCode>) -> Self {
        Self::new(OpKind::Insert, len, attribs)
    }

    pub fn delete(len: usize) -> Self {
        Self::new(OpKind::Delete, len, Vec::new())
    }

    pub fn is_keep(&self) -> bool {
        self.kind == OpKind::Keep
    }

    pub fn is_insert(&self) -> bool {
        self.kind == OpKind::Insert
    }

    pub fn is_delete(&self) -> bool {
        self.kind == OpKind::Delete
    }

    /// Same op, different length
    pub(crate) fn with_len(&self, len: usize) -> Self {
        Self::new(self.kind, len, self.attribs.clone())
    }

    /// Value of attribute `key` on this op, or `""` if absent
    pub fn attribute_value<'p>(&self, key: &str, pool: &'p AttributePool) -> Result<&'p str> {
        for &code in &self.attribs {
            let (k, v) = pool.get(code)?;
            if k == key {
                return Ok(v.as_str());
            }
        }
        Ok("")
    }
}
