//! Changeset algebra
//!
//! A [`Changeset`] is an immutable description of an edit: a list of
//! keep/insert/delete runs over an input of exactly `old_len` characters,
//! producing exactly `new_len` characters, plus the literal text of every
//! insert (the char bank). Lengths count Unicode scalar values.
//!
//! The operations are pure functions over changesets and an
//! [`AttributePool`]:
//!
//! - [`compose`]: sequential combination (apply A then B == apply C)
//! - [`follow`]: operational transform of a concurrent edit
//! - [`apply_to_atext`] / [`apply_to_text`]
//! - [`invert`]: the backset that exactly undoes an edit
//! - [`character_range_follow`]: map a selection through an edit
//! - [`prepare_for_wire`] and the [`codec`] (`pack` / `unpack`)
//!
//! Malformed input (mismatched lengths, unknown attribute codes) aborts the
//! operation with an error and never produces a partial result.
//!
//! # Convergence
//!
//! ```
//! use textsync_core::{apply_to_text, compose, follow, make_splice, AttributePool};
//!
//! let mut pool = AttributePool::new();
//! let text = "hello";
//! let a = make_splice(5, 0, 0, "A", vec![]);
//! let b = make_splice(5, 5, 0, "B", vec![]);
//!
//! let ab = compose(&a, &follow(&a, &b, false, &pool).unwrap(), &mut pool).unwrap();
//! let ba = compose(&b, &follow(&b, &a, true, &pool).unwrap(), &mut pool).unwrap();
//! assert_eq!(apply_to_text(&ab, text).unwrap(), "AhelloB");
//! assert_eq!(apply_to_text(&ab, text).unwrap(), apply_to_text(&ba, text).unwrap());
//! ```

mod assembler;
mod atext;
mod attributes;
pub mod codec;
mod compose;
mod follow;
mod op;
mod wire;

pub(crate) use assembler::OpAssembler;
pub use atext::{apply_to_atext, apply_to_text, invert, AText};
pub use attributes::AttributeMap;
pub use compose::compose;
pub use follow::{character_range_follow, follow};
pub use op::{Op, OpKind};
pub use wire::{prepare_for_wire, WirePrep};

use crate::error::{Result, SyncError};
use crate::pool::AttributePool;
use crate::AttribCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An edit from a document of `old_len` characters to one of `new_len`
///
/// Constructed only through validating paths, so every `Changeset` value is
/// internally consistent: its keeps and deletes fit in `old_len`, the lengths
/// add up, and the char bank holds exactly the inserted characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Changeset {
    old_len: usize,
    new_len: usize,
    ops: Vec<Op>,
    char_bank: String,
}

impl Changeset {
    /// Build a changeset from raw parts, validating them
    ///
    /// The op list is taken as is (not canonicalized).
    pub fn new(old_len: usize, new_len: usize, ops: Vec<Op>, char_bank: String) -> Result<Self> {
        let overflow = || SyncError::malformed("op lengths overflow");
        let mut consumed = 0usize;
        let mut deleted = 0usize;
        let mut inserted = 0usize;
        for op in &ops {
            match op.kind {
                OpKind::Keep => consumed = consumed.checked_add(op.len).ok_or_else(overflow)?,
                OpKind::Delete => {
                    consumed = consumed.checked_add(op.len).ok_or_else(overflow)?;
                    deleted += op.len;
                }
                OpKind::Insert => inserted = inserted.checked_add(op.len).ok_or_else(overflow)?,
            }
        }
        if consumed > old_len {
            return Err(SyncError::malformed(format!(
                "ops consume {consumed} characters of a {old_len} character input"
            )));
        }
        // deleted <= consumed <= old_len
        let produced = (old_len - deleted).checked_add(inserted).ok_or_else(overflow)?;
        if produced != new_len {
            return Err(SyncError::LengthMismatch {
                expected: new_len,
                actual: produced,
            });
        }
        let bank_len = char_bank.chars().count();
        if bank_len != inserted {
            return Err(SyncError::malformed(format!(
                "char bank holds {bank_len} characters, inserts need {inserted}"
            )));
        }
        Ok(Self {
            old_len,
            new_len,
            ops,
            char_bank,
        })
    }

    /// Build from assembled (already canonical) ops
    pub(crate) fn from_assembled(
        old_len: usize,
        new_len: usize,
        assem: OpAssembler,
        char_bank: String,
    ) -> Result<Self> {
        Self::new(old_len, new_len, assem.finish(), char_bank)
    }

    /// The changeset that leaves a document of length `n` untouched
    pub fn identity(n: usize) -> Self {
        Self {
            old_len: n,
            new_len: n,
            ops: Vec::new(),
            char_bank: String::new(),
        }
    }

    /// Whether applying this changeset changes nothing
    pub fn is_identity(&self) -> bool {
        self.old_len == self.new_len
            && self.ops.iter().all(|op| op.is_keep() && op.attribs.is_empty())
    }

    pub fn old_len(&self) -> usize {
        self.old_len
    }

    pub fn new_len(&self) -> usize {
        self.new_len
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn char_bank(&self) -> &str {
        &self.char_bank
    }

    /// Count ops of the given kind
    pub fn count_ops(&self, kind: OpKind) -> usize {
        self.ops.iter().filter(|op| op.kind == kind).count()
    }

    /// Rewrite every attribute code with `f`; `None` drops the code
    pub fn map_attribs<F>(&self, mut f: F) -> Result<Changeset>
    where
        F: FnMut(AttribCode) -> Result<Option<AttribCode>>,
    {
        let mut ops = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            let mut attribs = Vec::with_capacity(op.attribs.len());
            for &code in &op.attribs {
                if let Some(mapped) = f(code)? {
                    attribs.push(mapped);
                }
            }
            ops.push(Op::new(op.kind, op.len, attribs));
        }
        Ok(Changeset {
            ops,
            ..self.clone()
        })
    }

    /// Translate attribute codes from `from`'s numbering into `to`'s
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownCode` if `from` does not know a code; `to`
    /// may already have interned some pairs by then.
    pub fn move_to_pool(&self, from: &AttributePool, to: &mut AttributePool) -> Result<Changeset> {
        self.map_attribs(|code| to.intern_from(from, code).map(Some))
    }
}

/// Replace `ndel` characters at `start` of a `old_len` document with `text`
///
/// `start` and `ndel` are clamped to the document.
///
/// # Example
///
/// ```
/// use textsync_core::{apply_to_text, make_splice};
///
/// let cs = make_splice(3, 1, 1, "xy", vec![]);
/// assert_eq!(apply_to_text(&cs, "abc").unwrap(), "axyc");
/// ```
pub fn make_splice(
    old_len: usize,
    start: usize,
    ndel: usize,
    text: &str,
    attribs: Vec<AttribCode>,
) -> Changeset {
    let start = start.min(old_len);
    let ndel = ndel.min(old_len - start);
    let ins = text.chars().count();
    let mut assem = OpAssembler::new();
    assem.push(Op::keep(start));
    assem.push(Op::delete(ndel));
    assem.push(Op::insert(ins, attribs));
    Changeset {
        old_len,
        new_len: old_len - ndel + ins,
        ops: assem.finish(),
        char_bank: text.to_string(),
    }
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::pack(self))
    }
}

impl FromStr for Changeset {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        codec::unpack(s)
    }
}

impl Serialize for Changeset {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&codec::pack(self))
    }
}

impl<'de> Deserialize<'de> for Changeset {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let packed = String::deserialize(deserializer)?;
        codec::unpack(&packed).map_err(serde::de::Error::custom)
    }
}
