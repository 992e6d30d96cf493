//! Preparing changesets for transmission

use super::Changeset;
use crate::error::Result;
use crate::pool::AttributePool;
use serde::{Deserialize, Serialize};

/// A changeset rewritten against a minimal pool holding only the attributes
/// it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePrep {
    pub translated: Changeset,
    pub pool: AttributePool,
}

/// Extract the pool entries `cs` uses into a fresh pool and renumber `cs`
/// against it
///
/// # Example
///
/// ```
/// use textsync_core::{prepare_for_wire, AttributePool, Changeset};
///
/// let mut pool = AttributePool::new();
/// pool.intern("bold", "true");
/// pool.intern("author", "a1");
///
/// let cs: Changeset = "Z:0>2*1+2$hi".parse().unwrap();
/// let prep = prepare_for_wire(&cs, &pool).unwrap();
/// assert_eq!(prep.translated.to_string(), "Z:0>2*0+2$hi");
/// assert_eq!(prep.pool.len(), 1);
/// ```
pub fn prepare_for_wire(cs: &Changeset, pool: &AttributePool) -> Result<WirePrep> {
    let mut wire = AttributePool::new();
    let translated = cs.move_to_pool(pool, &mut wire)?;
    Ok(WirePrep {
        translated,
        pool: wire,
    })
}
