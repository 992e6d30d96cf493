//! TextSync Core - Changeset engine for collaborative text editing
//!
//! This is the client-side core of a realtime text editor. It implements:
//! - Attribute pools (interned `(key, value)` formatting and authorship)
//! - The changeset algebra: compose, follow (OT), apply, invert
//! - A compact text wire format for changesets
//! - Client-side change tracking against a server (base/submitted/pending)
//! - A collaborative-aware undo stack
//!
//! # Examples
//!
//! ```rust
//! use textsync_core::{apply_to_text, compose, make_splice, AttributePool};
//!
//! let mut pool = AttributePool::new();
//! let insert = make_splice(5, 5, 0, " world", vec![]);
//! let shout = make_splice(11, 0, 1, "H", vec![]);
//!
//! let both = compose(&insert, &shout, &mut pool).unwrap();
//! assert_eq!(both.to_string(), "Z:5>6-1+1=4+6$H world");
//! assert_eq!(apply_to_text(&both, "hello").unwrap(), "Hello world");
//! ```

pub mod changeset;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod tracker;
pub mod undo;

// Re-exports for convenience
pub use changeset::{
    apply_to_atext, apply_to_text, character_range_follow, compose, follow, invert, make_splice,
    prepare_for_wire, AText, AttributeMap, Changeset, Op, OpKind, WirePrep,
};
pub use config::SessionConfig;
pub use error::{Result, SyncError};
pub use pool::{move_ops_to_new_pool, AttributePool};
pub use session::Session;
pub use tracker::{ChangesetTracker, DocumentView, NonUserChangeFlag, PreparedChangeset};
pub use undo::{Frame, Selection, UndoStack, UndoStep, UndoableEvent};

/// Index of an attribute in an [`AttributePool`]
pub type AttribCode = u32;
