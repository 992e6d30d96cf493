//! Sequential composition of changesets

use super::assembler::OpAssembler;
use super::attributes::compose_attribs;
use super::op::{Op, OpKind};
use super::Changeset;
use crate::error::{Result, SyncError};
use crate::pool::AttributePool;

/// What happens to the char banks while zipping two op lists
pub(crate) enum Bank {
    /// `n` characters inserted by the first list survive
    TakeFirst(usize),
    /// `n` characters inserted by the second list are emitted
    TakeSecond(usize),
    /// `n` characters inserted by the first list are deleted by the second
    SkipFirst(usize),
}

/// Walk `first` and `second` in lockstep, `second` applying to the output of
/// `first`, and assemble the combined ops
///
/// Also used to apply a changeset to an attribution, which is just an
/// insert-only op list.
pub(crate) fn zip_compose<F>(
    first: &[Op],
    second: &[Op],
    pool: &mut AttributePool,
    mut bank: F,
) -> Result<OpAssembler>
where
    F: FnMut(Bank) -> Result<()>,
{
    let mut iter1 = first.iter().cloned();
    let mut iter2 = second.iter().cloned();
    let mut op1 = iter1.next();
    let mut op2 = iter2.next();
    let mut assem = OpAssembler::new();

    loop {
        match (op1.take(), op2.take()) {
            (None, None) => break,
            // past the end of `first`: its implicit trailing keep
            (None, Some(b)) => {
                if b.is_insert() {
                    bank(Bank::TakeSecond(b.len))?;
                }
                assem.push(b);
                op2 = iter2.next();
            }
            // past the end of `second`
            (Some(a), None) => {
                if a.is_insert() {
                    bank(Bank::TakeFirst(a.len))?;
                }
                assem.push(a);
                op1 = iter1.next();
            }
            // `second` never sees characters `first` deleted
            (Some(a), Some(b)) if a.is_delete() => {
                assem.push(a);
                op1 = iter1.next();
                op2 = Some(b);
            }
            // nor does `first` see characters `second` inserts
            (Some(a), Some(b)) if b.is_insert() => {
                bank(Bank::TakeSecond(b.len))?;
                assem.push(b);
                op1 = Some(a);
                op2 = iter2.next();
            }
            (Some(mut a), Some(mut b)) => {
                let n = a.len.min(b.len);
                match (a.kind, b.kind) {
                    (OpKind::Insert, OpKind::Delete) => bank(Bank::SkipFirst(n))?,
                    (OpKind::Insert, _) => {
                        bank(Bank::TakeFirst(n))?;
                        let attribs = compose_attribs(&a.attribs, &b.attribs, false, pool)?;
                        assem.push(Op::insert(n, attribs));
                    }
                    (_, OpKind::Delete) => assem.push(b.with_len(n)),
                    _ => {
                        let attribs = compose_attribs(&a.attribs, &b.attribs, true, pool)?;
                        assem.push(Op::new(OpKind::Keep, n, attribs));
                    }
                }
                a.len -= n;
                b.len -= n;
                op1 = if a.len == 0 { iter1.next() } else { Some(a) };
                op2 = if b.len == 0 { iter2.next() } else { Some(b) };
            }
        }
    }
    Ok(assem)
}

/// Combine two sequential edits into one: applying the result equals applying
/// `a` and then `b`
///
/// # Errors
///
/// Returns `SyncError::LengthMismatch` if `a.new_len() != b.old_len()`, and
/// `SyncError::UnknownCode` if an attribute code is not in `pool`.
///
/// # Example
///
/// ```
/// use textsync_core::{apply_to_text, compose, make_splice, AttributePool};
///
/// let mut pool = AttributePool::new();
/// let typed_a = make_splice(0, 0, 0, "a", vec![]);
/// let typed_b = make_splice(1, 1, 0, "b", vec![]);
/// let both = compose(&typed_a, &typed_b, &mut pool).unwrap();
/// assert_eq!(both.to_string(), "Z:0>2+2$ab");
/// assert_eq!(apply_to_text(&both, "").unwrap(), "ab");
/// ```
pub fn compose(a: &Changeset, b: &Changeset, pool: &mut AttributePool) -> Result<Changeset> {
    if a.new_len() != b.old_len() {
        return Err(SyncError::LengthMismatch {
            expected: a.new_len(),
            actual: b.old_len(),
        });
    }

    let mut bank1 = a.char_bank().chars();
    let mut bank2 = b.char_bank().chars();
    let mut out = String::new();
    let assem = zip_compose(a.ops(), b.ops(), pool, |step| {
        match step {
            Bank::TakeFirst(n) => out.extend(bank1.by_ref().take(n)),
            Bank::TakeSecond(n) => out.extend(bank2.by_ref().take(n)),
            Bank::SkipFirst(n) => {
                bank1.by_ref().take(n).for_each(drop);
            }
        }
        Ok(())
    })?;

    Changeset::from_assembled(a.old_len(), b.new_len(), assem, out)
}
