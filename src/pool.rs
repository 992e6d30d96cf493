//! AttributePool: interning table for text attributes
//!
//! Every attribute attached to a run of text is a `(key, value)` string pair,
//! e.g. `("author", "a.3f2c")` or `("bold", "true")`. Changesets never carry
//! the strings themselves; they carry small integer codes handed out by a pool.
//!
//! Codes are only meaningful relative to the pool that issued them. Peers
//! intern independently, so a changeset crossing the wire is always paired with
//! a (minimal) pool and rewritten into the receiver's numbering with
//! [`move_ops_to_new_pool`] or [`Changeset::move_to_pool`].
//!
//! # Example
//!
//! ```
//! use textsync_core::AttributePool;
//!
//! let mut pool = AttributePool::new();
//! let bold = pool.intern("bold", "true");
//! assert_eq!(pool.intern("bold", "true"), bold);
//! assert_eq!(pool.get(bold).unwrap(), &("bold".to_string(), "true".to_string()));
//! ```
//!
//! [`Changeset::move_to_pool`]: crate::Changeset::move_to_pool

use crate::changeset::codec;
use crate::error::{Result, SyncError};
use crate::AttribCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A `(key, value)` attribute pair
pub type Attribute = (String, String);

/// Bidirectional map between attribute pairs and integer codes
///
/// The pool only ever grows: once a code is handed out it keeps its meaning for
/// the lifetime of the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePool {
    /// code -> pair; the code is the index
    num_to_attrib: Vec<Attribute>,

    /// pair -> code
    attrib_to_num: HashMap<Attribute, AttribCode>,
}

impl AttributePool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the code for `(key, value)`, allocating the next one if absent
    pub fn intern(&mut self, key: &str, value: &str) -> AttribCode {
        if let Some(code) = self.lookup(key, value) {
            return code;
        }
        let code = self.num_to_attrib.len() as AttribCode;
        let pair = (key.to_string(), value.to_string());
        self.attrib_to_num.insert(pair.clone(), code);
        self.num_to_attrib.push(pair);
        code
    }

    /// Return the code for `(key, value)` without allocating
    pub fn lookup(&self, key: &str, value: &str) -> Option<AttribCode> {
        // HashMap<(String, String), _> can't be queried by (&str, &str)
        self.attrib_to_num
            .get(&(key.to_string(), value.to_string()))
            .copied()
    }

    /// Get the pair behind a code
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownCode` if the pool never issued `code`
    pub fn get(&self, code: AttribCode) -> Result<&Attribute> {
        self.num_to_attrib
            .get(code as usize)
            .ok_or(SyncError::UnknownCode(code))
    }

    /// Get the key behind a code
    pub fn key_of(&self, code: AttribCode) -> Result<&str> {
        self.get(code).map(|(key, _)| key.as_str())
    }

    /// Get the value behind a code
    pub fn value_of(&self, code: AttribCode) -> Result<&str> {
        self.get(code).map(|(_, value)| value.as_str())
    }

    /// Re-intern a code issued by `other` into this pool
    pub fn intern_from(&mut self, other: &AttributePool, code: AttribCode) -> Result<AttribCode> {
        let (key, value) = other.get(code)?;
        Ok(self.intern(key, value))
    }

    /// Number of interned pairs (also the next code to be issued)
    pub fn len(&self) -> usize {
        self.num_to_attrib.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.num_to_attrib.is_empty()
    }

    /// Iterate over `(code, pair)` in code order
    pub fn iter(&self) -> impl Iterator<Item = (AttribCode, &Attribute)> {
        self.num_to_attrib
            .iter()
            .enumerate()
            .map(|(code, pair)| (code as AttribCode, pair))
    }

    /// Wire form: an array of `[key, value]` pairs indexed by code
    pub fn to_jsonable(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.num_to_attrib
                .iter()
                .map(|(k, v)| serde_json::json!([k, v]))
                .collect(),
        )
    }

    /// Rebuild a pool from its wire form
    ///
    /// Accepts the array form produced by [`to_jsonable`](Self::to_jsonable)
    /// and the older `{"numToAttrib": {...}, "nextNum": n}` object form.
    pub fn from_jsonable(value: serde_json::Value) -> Result<Self> {
        let wire: WirePool = serde_json::from_value(value)?;
        Self::try_from(wire)
    }

    fn from_pairs(pairs: Vec<Attribute>) -> Result<Self> {
        let mut pool = AttributePool::new();
        for (code, (key, value)) in pairs.into_iter().enumerate() {
            if let Some(existing) = pool.lookup(&key, &value) {
                return Err(SyncError::MalformedPool(format!(
                    "attribute [{key:?}, {value:?}] appears as both {existing} and {code}"
                )));
            }
            pool.intern(&key, &value);
        }
        Ok(pool)
    }
}

/// Serialized shapes a pool may arrive in
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePool {
    Pairs(Vec<Attribute>),
    #[serde(rename_all = "camelCase")]
    Legacy {
        num_to_attrib: BTreeMap<String, Attribute>,
        next_num: usize,
    },
}

impl TryFrom<WirePool> for AttributePool {
    type Error = SyncError;

    fn try_from(wire: WirePool) -> Result<Self> {
        match wire {
            WirePool::Pairs(pairs) => AttributePool::from_pairs(pairs),
            WirePool::Legacy {
                num_to_attrib,
                next_num,
            } => {
                // codes are dense, so nextNum must match the entry count
                if next_num != num_to_attrib.len() {
                    return Err(SyncError::MalformedPool(format!(
                        "nextNum {next_num} does not match {} attributes",
                        num_to_attrib.len()
                    )));
                }
                let mut slots: Vec<Option<Attribute>> = vec![None; next_num];
                for (num, pair) in num_to_attrib {
                    let code: usize = num.parse().map_err(|_| {
                        SyncError::MalformedPool(format!("attribute number {num:?} is not an integer"))
                    })?;
                    let slot = slots.get_mut(code).ok_or_else(|| {
                        SyncError::MalformedPool(format!("attribute {code} >= nextNum {next_num}"))
                    })?;
                    *slot = Some(pair);
                }
                let pairs = slots
                    .into_iter()
                    .enumerate()
                    .map(|(code, slot)| {
                        slot.ok_or_else(|| SyncError::MalformedPool(format!("attribute {code} is missing")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                AttributePool::from_pairs(pairs)
            }
        }
    }
}

impl Serialize for AttributePool {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.num_to_attrib.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttributePool {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = WirePool::deserialize(deserializer)?;
        AttributePool::try_from(wire).map_err(serde::de::Error::custom)
    }
}

/// Rewrite the attribute codes in an encoded changeset or op string from
/// `from`'s numbering to `to`'s, interning pairs `to` does not have yet
///
/// Works on full changesets (`Z:...$bank`) as well as bare op strings such as
/// the attribution of an [`AText`](crate::AText). The order of codes within an
/// op is preserved.
///
/// # Errors
///
/// Fails with `SyncError::UnknownCode` if `from` does not know a code, and
/// with `SyncError::MalformedChangeset` if the input does not parse.
pub fn move_ops_to_new_pool(ops: &str, from: &AttributePool, to: &mut AttributePool) -> Result<String> {
    if ops.starts_with("Z:") {
        let cs = codec::unpack(ops)?;
        return Ok(codec::pack(&cs.move_to_pool(from, to)?));
    }
    let mut decoded = codec::decode_ops(ops)?;
    for op in &mut decoded {
        for code in &mut op.attribs {
            *code = to.intern_from(from, *code)?;
        }
    }
    Ok(codec::encode_ops(&decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intern_is_stable() {
        let mut pool = AttributePool::new();
        let a = pool.intern("author", "a1");
        let b = pool.intern("bold", "true");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(pool.intern("author", "a1"), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_unknown_code() {
        let pool = AttributePool::new();
        assert!(matches!(pool.get(7), Err(SyncError::UnknownCode(7))));
        assert_eq!(pool.lookup("bold", "true"), None);
    }

    #[test]
    fn test_jsonable_round_trip() {
        let mut pool = AttributePool::new();
        pool.intern("author", "a1");
        pool.intern("bold", "true");

        let value = pool.to_jsonable();
        assert_eq!(value, json!([["author", "a1"], ["bold", "true"]]));
        assert_eq!(AttributePool::from_jsonable(value).unwrap(), pool);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut pool = AttributePool::new();
        pool.intern("italic", "true");
        let encoded = serde_json::to_string(&pool).unwrap();
        let decoded: AttributePool = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, pool);
    }

    #[test]
    fn test_legacy_object_form() {
        let pool = AttributePool::from_jsonable(json!({
            "numToAttrib": {"0": ["author", "a1"], "1": ["bold", "true"]},
            "nextNum": 2,
        }))
        .unwrap();
        assert_eq!(pool.lookup("bold", "true"), Some(1));

        let gap = AttributePool::from_jsonable(json!({
            "numToAttrib": {"1": ["bold", "true"]},
            "nextNum": 2,
        }));
        assert!(matches!(gap, Err(SyncError::MalformedPool(_))));
    }

    #[test]
    fn test_legacy_next_num_must_match() {
        let huge = AttributePool::from_jsonable(json!({"numToAttrib": {}, "nextNum": u64::MAX}));
        assert!(matches!(huge, Err(SyncError::MalformedPool(_))));

        let short = AttributePool::from_jsonable(json!({
            "numToAttrib": {"0": ["author", "a1"], "1": ["bold", "true"]},
            "nextNum": 1,
        }));
        assert!(matches!(short, Err(SyncError::MalformedPool(_))));
    }

    #[test]
    fn test_duplicate_pairs_rejected() {
        let result = AttributePool::from_jsonable(json!([["a", "b"], ["a", "b"]]));
        assert!(matches!(result, Err(SyncError::MalformedPool(_))));
    }

    #[test]
    fn test_move_ops_to_new_pool() {
        let mut pool1 = AttributePool::new();
        pool1.intern("baz", "qux");
        pool1.intern("foo", "bar");

        let mut pool2 = AttributePool::new();
        pool2.intern("foo", "bar");
        pool2.intern("baz", "qux");

        assert_eq!(
            move_ops_to_new_pool("Z:1>2*1+1*0+1$ab", &pool1, &mut pool2).unwrap(),
            "Z:1>2*0+1*1+1$ab"
        );
        assert_eq!(
            move_ops_to_new_pool("*1+1*0+1", &pool1, &mut pool2).unwrap(),
            "*0+1*1+1"
        );
    }

    #[test]
    fn test_move_ops_interns_missing_pairs() {
        let mut wire = AttributePool::new();
        wire.intern("author", "remote");
        let mut local = AttributePool::new();
        local.intern("bold", "true");

        let moved = move_ops_to_new_pool("Z:0>2*0+2$hi", &wire, &mut local).unwrap();
        assert_eq!(moved, "Z:0>2*1+2$hi");
        assert_eq!(local.lookup("author", "remote"), Some(1));
    }

    #[test]
    fn test_move_ops_unknown_code_aborts() {
        let wire = AttributePool::new();
        let mut local = AttributePool::new();
        let result = move_ops_to_new_pool("*0+1", &wire, &mut local);
        assert!(matches!(result, Err(SyncError::UnknownCode(0))));
    }
}
