//! Attributed text and applying changesets to it

use super::assembler::OpAssembler;
use super::attributes::AttributeMap;
use super::codec;
use super::compose::zip_compose;
use super::op::{Op, OpKind};
use super::Changeset;
use crate::error::{Result, SyncError};
use crate::pool::AttributePool;
use crate::AttribCode;
use serde::{Deserialize, Serialize};

/// Text plus its attribution: a run list of insert ops that covers every
/// character, each run carrying the attribute codes of its characters
///
/// The attribution is kept canonical (adjacent runs with equal attributes are
/// merged), so two equal documents compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireAText", into = "WireAText")]
pub struct AText {
    text: String,
    attribs: Vec<Op>,
}

impl AText {
    /// Plain text with no attributes
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.chars().count();
        let attribs = if len == 0 {
            Vec::new()
        } else {
            vec![Op::insert(len, Vec::new())]
        };
        Self { text, attribs }
    }

    /// Text with an explicit attribution
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MalformedChangeset` unless `attribs` is a list of
    /// inserts covering exactly the characters of `text`.
    pub fn with_attribs(text: impl Into<String>, attribs: Vec<Op>) -> Result<Self> {
        let text = text.into();
        if let Some(op) = attribs.iter().find(|op| !op.is_insert()) {
            return Err(SyncError::malformed(format!(
                "attribution contains a {:?} op",
                op.kind
            )));
        }
        let covered = attribs
            .iter()
            .try_fold(0usize, |sum, op| sum.checked_add(op.len))
            .ok_or_else(|| SyncError::malformed("attribution lengths overflow"))?;
        let len = text.chars().count();
        if covered != len {
            return Err(SyncError::malformed(format!(
                "attribution covers {covered} characters of a {len} character text"
            )));
        }
        let mut assem = OpAssembler::new();
        for op in attribs {
            assem.push(op);
        }
        Ok(Self {
            text,
            attribs: assem.finish(),
        })
    }

    /// Text with an attribution in its packed form, e.g. `*0+5*1+2`
    pub fn from_packed(text: impl Into<String>, attribs: &str) -> Result<Self> {
        Self::with_attribs(text, codec::decode_ops(attribs)?)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribs(&self) -> &[Op] {
        &self.attribs
    }

    /// The attribution in its packed form
    pub fn packed_attribs(&self) -> String {
        codec::encode_ops(&self.attribs)
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.attribs.iter().map(|op| op.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Translate the attribution from `from`'s numbering into `to`'s
    pub fn move_to_pool(&self, from: &AttributePool, to: &mut AttributePool) -> Result<AText> {
        let mut attribs = Vec::with_capacity(self.attribs.len());
        for op in &self.attribs {
            let codes = op
                .attribs
                .iter()
                .map(|&code| to.intern_from(from, code))
                .collect::<Result<Vec<_>>>()?;
            attribs.push(Op::insert(op.len, codes));
        }
        AText::with_attribs(self.text.clone(), attribs)
    }
}

/// Serialized form: `{"text": ..., "attribs": "*0+5"}`
#[derive(Serialize, Deserialize)]
struct WireAText {
    text: String,
    attribs: String,
}

impl TryFrom<WireAText> for AText {
    type Error = SyncError;

    fn try_from(wire: WireAText) -> Result<Self> {
        AText::from_packed(wire.text, &wire.attribs)
    }
}

impl From<AText> for WireAText {
    fn from(atext: AText) -> Self {
        let attribs = atext.packed_attribs();
        WireAText {
            text: atext.text,
            attribs,
        }
    }
}

fn check_old_len(cs: &Changeset, len: usize) -> Result<()> {
    if cs.old_len() != len {
        return Err(SyncError::LengthMismatch {
            expected: cs.old_len(),
            actual: len,
        });
    }
    Ok(())
}

/// Apply `cs` to plain text
///
/// # Errors
///
/// Returns `SyncError::LengthMismatch` if `text` is not `cs.old_len()`
/// characters long.
pub fn apply_to_text(cs: &Changeset, text: &str) -> Result<String> {
    check_old_len(cs, text.chars().count())?;
    let mut input = text.chars();
    let mut bank = cs.char_bank().chars();
    let mut out = String::with_capacity(text.len() + cs.char_bank().len());
    for op in cs.ops() {
        match op.kind {
            OpKind::Keep => out.extend(input.by_ref().take(op.len)),
            OpKind::Delete => input.by_ref().take(op.len).for_each(drop),
            OpKind::Insert => out.extend(bank.by_ref().take(op.len)),
        }
    }
    out.extend(input);
    Ok(out)
}

/// Apply `cs` to attributed text
///
/// Inserted text takes the insert's attributes; attribute changes on kept text
/// are applied, an empty value removing the key.
///
/// # Errors
///
/// Returns `SyncError::LengthMismatch` on a length mismatch and
/// `SyncError::UnknownCode` if `pool` lacks a code. `atext` is never
/// partially modified.
pub fn apply_to_atext(cs: &Changeset, atext: &AText, pool: &mut AttributePool) -> Result<AText> {
    let text = apply_to_text(cs, &atext.text)?;
    let attribs = zip_compose(&atext.attribs, cs.ops(), pool, |_| Ok(()))?.finish();
    Ok(AText { text, attribs })
}

/// Walks the attribution runs of a text
struct RunCursor<'a> {
    runs: std::slice::Iter<'a, Op>,
    current: Option<(usize, &'a [AttribCode])>,
}

impl<'a> RunCursor<'a> {
    fn new(runs: &'a [Op]) -> Self {
        Self {
            runs: runs.iter(),
            current: None,
        }
    }

    /// Visit the next `n` characters as `(len, attribs)` pieces
    fn take<F>(&mut self, mut n: usize, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &'a [AttribCode]) -> Result<()>,
    {
        while n > 0 {
            let (left, attribs) = match self.current.take() {
                Some(run) => run,
                None => {
                    let op = self
                        .runs
                        .next()
                        .ok_or_else(|| SyncError::malformed("changeset runs past the end of the text"))?;
                    (op.len, op.attribs.as_slice())
                }
            };
            let used = left.min(n);
            f(used, attribs)?;
            n -= used;
            if left > used {
                self.current = Some((left - used, attribs));
            }
        }
        Ok(())
    }
}

/// The backset of `cs`: the changeset that turns `apply(cs, atext)` back into
/// `atext`
///
/// Deleted text comes back with its original attributes, and attribute changes
/// made to kept text are reverted.
///
/// # Example
///
/// ```
/// use textsync_core::{apply_to_atext, invert, make_splice, AText, AttributePool};
///
/// let mut pool = AttributePool::new();
/// let before = AText::new("hello");
/// let cs = make_splice(5, 1, 3, "ipp", vec![]);
/// let after = apply_to_atext(&cs, &before, &mut pool).unwrap();
/// assert_eq!(after.text(), "hippo");
///
/// let backset = invert(&cs, &before, &mut pool).unwrap();
/// assert_eq!(apply_to_atext(&backset, &after, &mut pool).unwrap(), before);
/// ```
pub fn invert(cs: &Changeset, atext: &AText, pool: &mut AttributePool) -> Result<Changeset> {
    check_old_len(cs, atext.len())?;
    let mut runs = RunCursor::new(&atext.attribs);
    let mut text = atext.text.chars();
    let mut bank = String::new();
    let mut assem = OpAssembler::new();

    for op in cs.ops() {
        match op.kind {
            OpKind::Keep if op.attribs.is_empty() => {
                runs.take(op.len, |_, _| Ok(()))?;
                text.by_ref().take(op.len).for_each(drop);
                assem.push(Op::keep(op.len));
            }
            OpKind::Keep => {
                let changed = AttributeMap::from_codes(&op.attribs, pool)?;
                runs.take(op.len, |len, old| {
                    let old = AttributeMap::from_codes(old, pool)?;
                    let mut back = AttributeMap::new();
                    for (key, value) in changed.iter() {
                        let old_value = old.get(key).unwrap_or("");
                        if old_value != value {
                            back.set(key, old_value);
                        }
                    }
                    assem.push(Op::new(OpKind::Keep, len, back.to_codes(pool)));
                    Ok(())
                })?;
                text.by_ref().take(op.len).for_each(drop);
            }
            OpKind::Insert => assem.push(Op::delete(op.len)),
            OpKind::Delete => {
                runs.take(op.len, |len, attribs| {
                    bank.extend(text.by_ref().take(len));
                    assem.push(Op::insert(len, attribs.to_vec()));
                    Ok(())
                })?;
            }
        }
    }

    Changeset::from_assembled(cs.new_len(), cs.old_len(), assem, bank)
}
