//! Attribute-set arithmetic used by compose, follow and invert
//!
//! An op's attribute list is decoded into an [`AttributeMap`] (one value per
//! key), combined, and re-encoded in key order so equal sets always encode the
//! same way.

use crate::error::Result;
use crate::pool::AttributePool;
use crate::AttribCode;
use std::collections::BTreeMap;

/// Key-ordered view of an attribute list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    entries: BTreeMap<String, String>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a list of codes
    pub fn from_codes(codes: &[AttribCode], pool: &AttributePool) -> Result<Self> {
        let mut map = Self::new();
        map.update(codes, pool, false)?;
        Ok(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply the pairs behind `codes` on top of this map
    ///
    /// With `empty_value_is_delete` a pair with an empty value removes its key
    /// instead of being stored.
    pub fn update(
        &mut self,
        codes: &[AttribCode],
        pool: &AttributePool,
        empty_value_is_delete: bool,
    ) -> Result<&mut Self> {
        for &code in codes {
            let (key, value) = pool.get(code)?;
            if empty_value_is_delete && value.is_empty() {
                self.entries.remove(key);
            } else {
                self.entries.insert(key.clone(), value.clone());
            }
        }
        Ok(self)
    }

    /// Encode as codes in key order, interning as needed
    pub fn to_codes(&self, pool: &mut AttributePool) -> Vec<AttribCode> {
        self.entries
            .iter()
            .map(|(key, value)| pool.intern(key, value))
            .collect()
    }
}

/// Combine the attributes of two ops that cover the same characters, `first`
/// applied before `second`
///
/// When the result is a mutation (keep over keep) an empty value is kept as an
/// explicit removal. Otherwise (keep over inserted text) it removes the key.
pub(crate) fn compose_attribs(
    first: &[AttribCode],
    second: &[AttribCode],
    result_is_mutation: bool,
    pool: &mut AttributePool,
) -> Result<Vec<AttribCode>> {
    if first.is_empty() && result_is_mutation {
        return Ok(second.to_vec());
    }
    if second.is_empty() {
        return Ok(first.to_vec());
    }
    let mut map = AttributeMap::from_codes(first, pool)?;
    map.update(second, pool, !result_is_mutation)?;
    Ok(map.to_codes(pool))
}

/// Rewrite `second`'s attribute changes to apply after `first`'s, both made to
/// the same text
///
/// When both set the same key the lexically smaller value wins, so the result
/// drops any change of `second`'s that loses against `first`.
pub(crate) fn follow_attribs(
    first: &[AttribCode],
    second: &[AttribCode],
    pool: &AttributePool,
) -> Result<Vec<AttribCode>> {
    if second.is_empty() {
        return Ok(Vec::new());
    }
    if first.is_empty() {
        return Ok(second.to_vec());
    }
    let first = first
        .iter()
        .map(|&code| pool.get(code))
        .collect::<Result<Vec<_>>>()?;
    let mut kept = Vec::with_capacity(second.len());
    for &code in second {
        let (key, value) = pool.get(code)?;
        let loses = first.iter().any(|(k, v)| k == key && v <= value);
        if !loses {
            kept.push(code);
        }
    }
    Ok(kept)
}
