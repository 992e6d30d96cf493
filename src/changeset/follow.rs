//! Operational transform
//!
//! [`follow`] rewrites a changeset made concurrently with another so that it
//! applies on top of it. [`character_range_follow`] does the same for a
//! selection.

use super::assembler::OpAssembler;
use super::attributes::follow_attribs;
use super::op::{Op, OpKind};
use super::Changeset;
use crate::error::{Result, SyncError};
use crate::pool::AttributePool;
use crate::AttribCode;
use std::str::Chars;

/// Rewrite `b` to apply after `a`, where both were made against the same text
///
/// Text that `a` inserted is kept, text that `a` deleted is no longer deleted
/// by the result, and attribute changes on the same characters are merged so
/// that the lexically smaller value wins.
///
/// When both insert at the same position the order is decided by, in turn:
/// an `("insertorder", "first")` attribute on exactly one of the inserts; an
/// insert starting with a newline going after one that does not; and finally
/// `reverse_insert_order` (true puts `b`'s insert first).
///
/// For any base text `T`,
/// `compose(a, follow(a, b, false))` and `compose(b, follow(b, a, true))`
/// produce the same text.
///
/// # Errors
///
/// Returns `SyncError::LengthMismatch` if `a.old_len() != b.old_len()`.
pub fn follow(
    a: &Changeset,
    b: &Changeset,
    reverse_insert_order: bool,
    pool: &AttributePool,
) -> Result<Changeset> {
    if a.old_len() != b.old_len() {
        return Err(SyncError::LengthMismatch {
            expected: a.old_len(),
            actual: b.old_len(),
        });
    }

    let insert_first = pool.lookup("insertorder", "first");
    let mut chars1 = a.char_bank().chars();
    let mut chars2 = b.char_bank().chars();
    let mut iter1 = a.ops().iter().cloned();
    let mut iter2 = b.ops().iter().cloned();
    let mut op1 = iter1.next();
    let mut op2 = iter2.next();

    let mut assem = OpAssembler::new();
    // position in `a`'s output and length of the result so far
    let mut old_pos = 0usize;
    let mut new_len = 0usize;
    let mut emit = |op: Op, assem: &mut OpAssembler| {
        match op.kind {
            OpKind::Keep => {
                old_pos += op.len;
                new_len += op.len;
            }
            OpKind::Delete => old_pos += op.len,
            OpKind::Insert => new_len += op.len,
        }
        assem.push(op);
    };

    loop {
        match (op1.take(), op2.take()) {
            (None, None) => break,
            // `a`'s insert goes first: step over it
            (Some(x), y)
                if x.is_insert()
                    && !matches!(&y, Some(y) if y.is_insert() && second_goes_first(
                        &x,
                        y,
                        peek(&chars1),
                        peek(&chars2),
                        insert_first,
                        reverse_insert_order,
                    )) =>
            {
                skip(&mut chars1, x.len);
                emit(Op::keep(x.len), &mut assem);
                op1 = iter1.next();
                op2 = y;
            }
            (x, Some(y)) if y.is_insert() => {
                skip(&mut chars2, y.len);
                emit(y, &mut assem);
                op1 = x;
                op2 = iter2.next();
            }
            // past the end of `b`: the rest of `a` is left alone
            (Some(_), None) => op1 = iter1.next(),
            (None, Some(y)) => {
                emit(y, &mut assem);
                op2 = iter2.next();
            }
            (Some(mut x), Some(mut y)) => {
                let n = x.len.min(y.len);
                match (x.kind, y.kind) {
                    // already gone
                    (OpKind::Delete, _) => {}
                    (_, OpKind::Delete) => emit(y.with_len(n), &mut assem),
                    _ => {
                        let attribs = follow_attribs(&x.attribs, &y.attribs, pool)?;
                        emit(Op::new(OpKind::Keep, n, attribs), &mut assem);
                    }
                }
                x.len -= n;
                y.len -= n;
                op1 = if x.len == 0 { iter1.next() } else { Some(x) };
                op2 = if y.len == 0 { iter2.next() } else { Some(y) };
            }
        }
    }

    let rest = a
        .new_len()
        .checked_sub(old_pos)
        .ok_or_else(|| SyncError::malformed("follow ran past the end of the first changeset"))?;
    Changeset::from_assembled(a.new_len(), new_len + rest, assem, b.char_bank().to_string())
}

/// Tie-break for two inserts at the same position
fn second_goes_first(
    first: &Op,
    second: &Op,
    first_char: Option<char>,
    second_char: Option<char>,
    insert_first: Option<AttribCode>,
    reverse_insert_order: bool,
) -> bool {
    let wants_first = |op: &Op| insert_first.is_some_and(|code| op.attribs.contains(&code));
    match (wants_first(first), wants_first(second)) {
        (true, false) => false,
        (false, true) => true,
        _ => match (first_char == Some('\n'), second_char == Some('\n')) {
            // keep lines together: text without a leading newline goes first
            (true, false) => true,
            (false, true) => false,
            _ => reverse_insert_order,
        },
    }
}

fn peek(chars: &Chars<'_>) -> Option<char> {
    chars.clone().next()
}

fn skip(chars: &mut Chars<'_>, n: usize) {
    chars.by_ref().take(n).for_each(drop);
}

/// Map the selection `[start, end)` through `cs`
///
/// An edit that covers the whole selection (including an insert at a
/// collapsed caret) collapses it to the edit's start when `insertions_after`
/// is set, or to the end of the inserted text otherwise.
///
/// # Example
///
/// ```
/// use textsync_core::{character_range_follow, make_splice};
///
/// // "abc", caret at 1, someone types "xy" at 0
/// let cs = make_splice(3, 0, 0, "xy", vec![]);
/// assert_eq!(character_range_follow(&cs, 1, 1, false), (3, 3));
/// ```
pub fn character_range_follow(
    cs: &Changeset,
    start: usize,
    end: usize,
    insertions_after: bool,
) -> (usize, usize) {
    let mut new_start = start as isize;
    let mut new_end = end as isize;
    let mut length_change_so_far = 0isize;

    for (splice_start, splice_end, inserted) in splices(cs) {
        let splice_start = splice_start as isize + length_change_so_far;
        let splice_end = splice_end as isize + length_change_so_far;
        let inserted = inserted as isize;
        let this_change = inserted - (splice_end - splice_start);

        if splice_start <= new_start && splice_end >= new_end {
            let at = if insertions_after {
                splice_start
            } else {
                splice_start + inserted
            };
            new_start = at;
            new_end = at;
        } else if splice_end <= new_start {
            new_start += this_change;
            new_end += this_change;
        } else if splice_start >= new_end {
            // after the selection
        } else if splice_start >= new_start && splice_end <= new_end {
            new_end += this_change;
        } else if splice_end < new_end {
            // overlaps the start
            new_start = splice_start + inserted;
            new_end += this_change;
        } else {
            // overlaps the end
            new_end = splice_start;
        }

        length_change_so_far += this_change;
    }

    (new_start.max(0) as usize, new_end.max(0) as usize)
}

/// `cs` as maximal `(start, end, inserted_len)` replacements, positions in the
/// old text
fn splices(cs: &Changeset) -> Vec<(usize, usize, usize)> {
    let mut out: Vec<(usize, usize, usize)> = Vec::new();
    let mut old_pos = 0;
    let mut in_splice = false;
    for op in cs.ops() {
        if op.is_keep() {
            old_pos += op.len;
            in_splice = false;
            continue;
        }
        if !in_splice {
            out.push((old_pos, old_pos, 0));
            in_splice = true;
        }
        if let Some(splice) = out.last_mut() {
            match op.kind {
                OpKind::Delete => {
                    old_pos += op.len;
                    splice.1 += op.len;
                }
                _ => splice.2 += op.len,
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{apply_to_text, compose};

    fn cs(s: &str) -> Changeset {
        s.parse().unwrap()
    }

    fn converge(text: &str, a: &str, b: &str) -> String {
        let mut pool = AttributePool::new();
        let (a, b) = (cs(a), cs(b));
        let ab = compose(&a, &follow(&a, &b, false, &pool).unwrap(), &mut pool).unwrap();
        let ba = compose(&b, &follow(&b, &a, true, &pool).unwrap(), &mut pool).unwrap();
        let left = apply_to_text(&ab, text).unwrap();
        assert_eq!(left, apply_to_text(&ba, text).unwrap());
        assert_eq!(ab, ba);
        left
    }

    #[test]
    fn test_follow_concurrent_inserts() {
        assert_eq!(converge("abc", "Z:3>1=1+1$x", "Z:3>1=2+1$y"), "axbyc");
        // same position: the first argument's insert wins with `false`
        assert_eq!(converge("abc", "Z:3>1=1+1$x", "Z:3>1=1+1$y"), "axybc");
    }

    #[test]
    fn test_follow_overlapping_deletes() {
        assert_eq!(converge("abcdef", "Z:6<3=1-3$", "Z:6<2=2-2$"), "aef");
        assert_eq!(converge("abcdef", "Z:6<2-2$", "Z:6>1=1+1$z"), "zcdef");
    }

    #[test]
    fn test_follow_newline_goes_after() {
        let pool = AttributePool::new();
        let a = cs("Z:2>1=1+1$\n");
        let b = cs("Z:2>1=1+1$x");
        // b's plain text goes before a's newline regardless of the flag
        assert_eq!(follow(&a, &b, false, &pool).unwrap().to_string(), "Z:3>1=1+1$x");
        assert_eq!(follow(&b, &a, false, &pool).unwrap().to_string(), "Z:3>1=2+1$\n");
    }

    #[test]
    fn test_follow_insertorder_first() {
        let mut pool = AttributePool::new();
        let first = pool.intern("insertorder", "first");
        let a = Changeset::new(0, 1, vec![Op::insert(1, vec![])], "a".into()).unwrap();
        let b = Changeset::new(0, 1, vec![Op::insert(1, vec![first])], "b".into()).unwrap();
        let b2 = follow(&a, &b, false, &pool).unwrap();
        let merged = compose(&a, &b2, &mut pool).unwrap();
        assert_eq!(apply_to_text(&merged, "").unwrap(), "ba");
    }

    #[test]
    fn test_follow_attributes() {
        let mut pool = AttributePool::new();
        let blue = pool.intern("color", "blue");
        let red = pool.intern("color", "red");
        let a = Changeset::new(3, 3, vec![Op::new(OpKind::Keep, 3, vec![blue])], String::new()).unwrap();
        let b = Changeset::new(3, 3, vec![Op::new(OpKind::Keep, 3, vec![red])], String::new()).unwrap();
        // blue < red: b's change is dropped after a, a's change survives b
        assert!(follow(&a, &b, false, &pool).unwrap().is_identity());
        assert_eq!(follow(&b, &a, true, &pool).unwrap().ops(), a.ops());
    }

    #[test]
    fn test_follow_length_mismatch() {
        let pool = AttributePool::new();
        assert!(matches!(
            follow(&cs("Z:1>0$"), &cs("Z:2>0$"), false, &pool),
            Err(SyncError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_character_range_follow() {
        let cases: &[(&str, (usize, usize), bool, (usize, usize))] = &[
            ("Z:z>9*0=1=4-3+9=1|1-4-4+1*0+a$123456789abcdefghijk", (7, 10), false, (14, 15)),
            ("Z:bc<6|x=b4|2-6$", (400, 407), false, (400, 401)),
            ("Z:4>0-3+3$abc", (0, 3), false, (3, 3)),
            ("Z:4>0-3+3$abc", (0, 3), true, (0, 0)),
            ("Z:5>1+1=1-3+3$abcd", (1, 4), false, (5, 5)),
            ("Z:5>1+1=1-3+3$abcd", (1, 4), true, (2, 2)),
            ("Z:5>1+1=1-3+3$abcd", (0, 6), false, (1, 7)),
            ("Z:5>1+1=1-3+3$abcd", (0, 3), false, (1, 2)),
            ("Z:5>1+1=1-3+3$abcd", (2, 5), false, (5, 6)),
            ("Z:2>1+1$a", (0, 0), false, (1, 1)),
            ("Z:2>1+1$a", (0, 0), true, (0, 0)),
        ];
        for (packed, (start, end), after, expected) in cases {
            assert_eq!(
                character_range_follow(&cs(packed), *start, *end, *after),
                *expected,
                "{packed} {start}..{end}"
            );
        }
    }
}
