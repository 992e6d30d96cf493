//! Wire codec for changesets
//!
//! The packed form is
//!
//! ```text
//! Z:<oldLen><'>' or '<'><|newLen - oldLen|><ops>$<charBank>
//! ```
//!
//! with every number written in lowercase base 36. Each op is a list of
//! `*<code>` attribute references followed by an opcode (`=`, `+` or `-`) and
//! a length, e.g. `*0*3+5`. A `|<n>` newline-count prefix written by other
//! implementations is accepted and ignored.
//!
//! This is the only place that deals with the string format; the algebra
//! works on [`Op`] lists.

use super::op::{Op, OpKind};
use super::Changeset;
use crate::error::{Result, SyncError};
use crate::AttribCode;

/// Encode a number in lowercase base 36
pub fn encode_num(mut n: usize) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let digit = (n % 36) as u32;
        digits.push(std::char::from_digit(digit, 36).unwrap_or('0'));
        n /= 36;
    }
    digits.iter().rev().collect()
}

/// Decode a base 36 number
pub fn decode_num(s: &str) -> Result<usize> {
    usize::from_str_radix(s, 36).map_err(|_| SyncError::malformed(format!("bad number {s:?}")))
}

/// Split a leading base 36 number off `s`
fn take_num(s: &str) -> Result<(usize, &str)> {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c.is_ascii_lowercase()))
        .unwrap_or(s.len());
    if end == 0 {
        return Err(SyncError::malformed(format!("expected a number at {s:?}")));
    }
    Ok((decode_num(&s[..end])?, &s[end..]))
}

/// Encode attribute codes as `*a*b...`
pub fn encode_attribs(attribs: &[AttribCode]) -> String {
    let mut out = String::new();
    for &code in attribs {
        out.push('*');
        out.push_str(&encode_num(code as usize));
    }
    out
}

/// Encode an op list (no header, no bank)
pub fn encode_ops(ops: &[Op]) -> String {
    let mut out = String::new();
    for op in ops {
        out.push_str(&encode_attribs(&op.attribs));
        out.push(op.kind.opcode());
        out.push_str(&encode_num(op.len));
    }
    out
}

/// Decode an op list (no header, no bank)
pub fn decode_ops(mut s: &str) -> Result<Vec<Op>> {
    let mut ops = Vec::new();
    let mut attribs = Vec::new();
    while let Some(c) = s.chars().next() {
        let rest = &s[c.len_utf8()..];
        match c {
            '*' => {
                let (code, rest) = take_num(rest)?;
                let code = AttribCode::try_from(code)
                    .map_err(|_| SyncError::malformed(format!("attribute code {code} too large")))?;
                attribs.push(code);
                s = rest;
            }
            '|' => {
                let (_lines, rest) = take_num(rest)?;
                s = rest;
            }
            _ => {
                let kind = OpKind::from_opcode(c)
                    .ok_or_else(|| SyncError::malformed(format!("unexpected character {c:?} in ops")))?;
                let (len, rest) = take_num(rest)?;
                ops.push(Op::new(kind, len, std::mem::take(&mut attribs)));
                s = rest;
            }
        }
    }
    if !attribs.is_empty() {
        return Err(SyncError::malformed("attributes without an op"));
    }
    Ok(ops)
}

/// Encode a changeset
pub fn pack(cs: &Changeset) -> String {
    let (sign, delta) = if cs.new_len() >= cs.old_len() {
        ('>', cs.new_len() - cs.old_len())
    } else {
        ('<', cs.old_len() - cs.new_len())
    };
    format!(
        "Z:{}{}{}{}${}",
        encode_num(cs.old_len()),
        sign,
        encode_num(delta),
        encode_ops(cs.ops()),
        cs.char_bank()
    )
}

/// Decode and validate a changeset
///
/// The op list is kept exactly as written, so `unpack(pack(cs)) == cs`.
pub fn unpack(s: &str) -> Result<Changeset> {
    let rest = s
        .strip_prefix("Z:")
        .ok_or_else(|| SyncError::malformed(format!("not a changeset: {s:?}")))?;
    let (old_len, rest) = take_num(rest)?;
    let sign = rest.chars().next();
    let (delta, rest) = take_num(rest.get(1..).unwrap_or(""))?;
    let new_len = match sign {
        Some('>') => old_len.checked_add(delta),
        Some('<') => old_len.checked_sub(delta),
        _ => None,
    }
    .ok_or_else(|| SyncError::malformed(format!("bad changeset header: {s:?}")))?;

    // ops never contain '$', so the first one starts the bank
    let (ops, bank) = match rest.find('$') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };
    Changeset::new(old_len, new_len, decode_ops(ops)?, bank.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(encode_num(0), "0");
        assert_eq!(encode_num(35), "z");
        assert_eq!(encode_num(36), "10");
        assert_eq!(decode_num("1c").unwrap(), 48);
        assert!(decode_num("").is_err());
    }

    #[test]
    fn test_unpack_fields() {
        let cs = unpack("Z:5>1|1=2*0*1+2-1$ab").unwrap();
        assert_eq!(cs.old_len(), 5);
        assert_eq!(cs.new_len(), 6);
        assert_eq!(
            cs.ops(),
            &[
                Op::keep(2),
                Op::insert(2, vec![0, 1]),
                Op::delete(1),
            ]
        );
        assert_eq!(cs.char_bank(), "ab");
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        for s in ["Z:0>0$", "Z:5<2=1-2$", "Z:3>4*0+4$$$$x", "Z:a>1=9*2*a=1+1$\n"] {
            let cs = unpack(s).unwrap();
            assert_eq!(pack(&cs), s);
            assert_eq!(unpack(&pack(&cs)).unwrap(), cs);
        }
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        assert!(unpack("hello").is_err());
        assert!(unpack("Z:5?1$").is_err());
        assert!(unpack("Z:1<2$").is_err());
        assert!(unpack("Z:1>0*0$").is_err());
        assert!(unpack("Z:1>1x1$a").is_err());
    }

    #[test]
    fn test_unpack_rejects_inconsistent_lengths() {
        // claims one inserted char but the bank has two
        assert!(unpack("Z:0>1+1$ab").is_err());
        // keeps more than the input has
        assert!(unpack("Z:2>0=3$").is_err());
    }

    #[test]
    fn test_unpack_rejects_overflowing_lengths() {
        let keeps = "Z:0>0=zzzzzzzzzzzz=zzzzzzzzzzzz=zzzzzzzzzzzz=zzzzzzzzzzzz$";
        assert!(matches!(unpack(keeps), Err(SyncError::MalformedChangeset(_))));
        let inserts = "Z:0>0+zzzzzzzzzzzz+zzzzzzzzzzzz+zzzzzzzzzzzz+zzzzzzzzzzzz$";
        assert!(unpack(inserts).is_err());
        // a single number too large for usize
        assert!(unpack("Z:0>0=zzzzzzzzzzzzzzzzzzzz$").is_err());
    }
}
