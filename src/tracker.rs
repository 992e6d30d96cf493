//! ChangesetTracker: reconciles local edits with the server
//!
//! The tracker keeps three changesets apart:
//!
//! - `base_atext`: the last text the server confirmed
//! - the submitted changeset: sent to the server, not yet acknowledged
//! - the user changeset: local edits made since the last submission
//!
//! so that what the user sees is always `base + submitted + user`. Remote
//! edits are folded into the base and transformed past the in-flight and
//! pending local work, so no keystroke is lost or applied twice whatever
//! order acknowledgements and broadcasts arrive in.
//!
//! # Example
//!
//! ```
//! use textsync_core::{AText, AttributePool, Changeset, ChangesetTracker, DocumentView};
//!
//! #[derive(Default)]
//! struct Buffer(String);
//!
//! impl DocumentView for Buffer {
//!     fn set_document_attributed_text(&mut self, atext: &AText, _pool: &AttributePool) {
//!         self.0 = atext.text().to_string();
//!     }
//!     fn apply_changeset_to_document(&mut self, cs: &Changeset, _after: bool, _pool: &AttributePool) {
//!         self.0 = textsync_core::apply_to_text(cs, &self.0).unwrap();
//!     }
//! }
//!
//! let mut pool = AttributePool::new();
//! let mut view = Buffer::default();
//! let mut tracker = ChangesetTracker::new();
//! tracker.set_base_text("", &mut view, &mut pool).unwrap();
//!
//! tracker
//!     .compose_user_changeset(&textsync_core::make_splice(0, 0, 0, "hi", vec![]), &mut pool)
//!     .unwrap();
//! let outgoing = tracker.prepare_user_changeset(&mut pool).unwrap();
//! assert_eq!(outgoing.changeset.unwrap().to_string(), "Z:0>2+2$hi");
//! ```

use crate::changeset::{
    apply_to_atext, compose, follow, prepare_for_wire, AText, AttributeMap, Changeset, OpAssembler,
};
use crate::error::{Result, SyncError};
use crate::pool::AttributePool;
use crate::undo::Selection;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Callbacks from the tracker into the editor
///
/// All are invoked synchronously while the tracker's non-user-change flag is
/// set. Implementations must not call back into the tracker.
pub trait DocumentView {
    /// Replace the whole document
    fn set_document_attributed_text(&mut self, atext: &AText, pool: &AttributePool);

    /// Patch the document with a remote change or an undo/redo
    fn apply_changeset_to_document(
        &mut self,
        changeset: &Changeset,
        prefer_insertion_after_caret: bool,
        pool: &AttributePool,
    );

    /// Move the selection, after an undo or redo
    fn set_selection(&mut self, _selection: Selection) {}
}

/// Read-only view of the tracker's non-user-change flag
///
/// A view can hold one to tell its own programmatic edits apart from typing.
#[derive(Debug, Clone)]
pub struct NonUserChangeFlag(Rc<Cell<bool>>);

impl NonUserChangeFlag {
    pub fn is_set(&self) -> bool {
        self.0.get()
    }
}

/// Sets the flag for its lifetime; dropping it (also during unwinding) clears
/// the flag
struct NonUserChangeGuard {
    flag: Rc<Cell<bool>>,
}

impl NonUserChangeGuard {
    fn acquire(flag: &Rc<Cell<bool>>) -> Self {
        flag.set(true);
        Self { flag: Rc::clone(flag) }
    }
}

impl Drop for NonUserChangeGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Result of [`ChangesetTracker::prepare_user_changeset`]: the changeset to
/// send, renumbered against a minimal pool, or nothing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedChangeset {
    pub changeset: Option<Changeset>,
    pub apool: Option<AttributePool>,
}

impl PreparedChangeset {
    pub fn is_empty(&self) -> bool {
        self.changeset.is_none()
    }
}

/// Per-session reconciliation state
pub struct ChangesetTracker {
    base_atext: AText,
    submitted: Option<Changeset>,
    user_changeset: Changeset,
    tracking: bool,
    applying_non_user_changes: Rc<Cell<bool>>,
    change_callback: Option<Box<dyn FnMut()>>,
    notification_pending: bool,
    author_id: Option<String>,
}

impl fmt::Debug for ChangesetTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangesetTracker")
            .field("base_atext", &self.base_atext)
            .field("submitted", &self.submitted)
            .field("user_changeset", &self.user_changeset)
            .field("tracking", &self.tracking)
            .field("applying_non_user_changes", &self.applying_non_user_changes.get())
            .field("notification_pending", &self.notification_pending)
            .field("author_id", &self.author_id)
            .finish()
    }
}

impl Default for ChangesetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangesetTracker {
    /// Create an idle tracker over an empty document
    pub fn new() -> Self {
        Self {
            base_atext: AText::default(),
            submitted: None,
            user_changeset: Changeset::identity(0),
            tracking: false,
            applying_non_user_changes: Rc::new(Cell::new(false)),
            change_callback: None,
            notification_pending: false,
            author_id: None,
        }
    }

    /// Attribute all text this client submits to `author_id`
    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn author_id(&self) -> Option<&str> {
        self.author_id.as_deref()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Whether a view callback is currently running
    pub fn is_applying_non_user_changes(&self) -> bool {
        self.applying_non_user_changes.get()
    }

    pub fn non_user_change_flag(&self) -> NonUserChangeFlag {
        NonUserChangeFlag(Rc::clone(&self.applying_non_user_changes))
    }

    /// The server-confirmed text
    pub fn base_atext(&self) -> &AText {
        &self.base_atext
    }

    pub fn submitted_changeset(&self) -> Option<&Changeset> {
        self.submitted.as_ref()
    }

    pub fn user_changeset(&self) -> &Changeset {
        &self.user_changeset
    }

    /// The text the user currently sees: base, then submitted, then pending
    pub fn live_atext(&self, pool: &mut AttributePool) -> Result<AText> {
        let mut atext = self.base_atext.clone();
        if let Some(submitted) = &self.submitted {
            atext = apply_to_atext(submitted, &atext, pool)?;
        }
        apply_to_atext(&self.user_changeset, &atext, pool)
    }

    /// Length of the text the user currently sees
    pub fn live_len(&self) -> usize {
        self.user_changeset.new_len()
    }

    /// (Re)start tracking from plain text
    pub fn set_base_text<V>(&mut self, text: &str, view: &mut V, pool: &mut AttributePool) -> Result<()>
    where
        V: DocumentView + ?Sized,
    {
        self.set_base_attributed_text(AText::new(text), None, view, pool)
    }

    /// (Re)start tracking from attributed text
    ///
    /// `wire_pool` is the pool `atext`'s codes refer to, when it is not the
    /// local pool. Any submitted or pending changes are discarded and the
    /// view is replaced with the new text.
    pub fn set_base_attributed_text<V>(
        &mut self,
        atext: AText,
        wire_pool: Option<&AttributePool>,
        view: &mut V,
        pool: &mut AttributePool,
    ) -> Result<()>
    where
        V: DocumentView + ?Sized,
    {
        let atext = match wire_pool {
            Some(wire) => atext.move_to_pool(wire, pool)?,
            None => atext,
        };

        self.tracking = true;
        self.user_changeset = Changeset::identity(atext.len());
        self.base_atext = atext;
        self.submitted = None;
        debug!(len = self.base_atext.len(), "base text set");

        let _guard = NonUserChangeGuard::acquire(&self.applying_non_user_changes);
        view.set_document_attributed_text(&self.base_atext, pool);
        Ok(())
    }

    /// Record a local edit, relative to the text the user currently sees
    ///
    /// Ignored while not tracking, while a view callback is running, and for
    /// identity changesets.
    pub fn compose_user_changeset(&mut self, c: &Changeset, pool: &mut AttributePool) -> Result<()> {
        if !self.tracking || self.applying_non_user_changes.get() || c.is_identity() {
            trace!(
                tracking = self.tracking,
                non_user = self.applying_non_user_changes.get(),
                "user changeset ignored"
            );
            return Ok(());
        }
        self.user_changeset = compose(&self.user_changeset, c, pool)?;
        if self.change_callback.is_some() {
            self.notification_pending = true;
        }
        Ok(())
    }

    /// Apply a local edit that did not come from the view, such as an undo
    ///
    /// `c` is composed into the user changeset like typed text, then the view
    /// is patched and given `selection`, both under the non-user-change flag.
    /// Does nothing while not tracking or while a view callback is running.
    pub fn apply_local_changeset_to_view<V>(
        &mut self,
        c: &Changeset,
        selection: Option<Selection>,
        view: &mut V,
        pool: &mut AttributePool,
    ) -> Result<()>
    where
        V: DocumentView + ?Sized,
    {
        if !self.tracking || self.applying_non_user_changes.get() {
            return Ok(());
        }
        self.compose_user_changeset(c, pool)?;

        let _guard = NonUserChangeGuard::acquire(&self.applying_non_user_changes);
        if !c.is_identity() {
            view.apply_changeset_to_document(c, false, pool);
        }
        if let Some(selection) = selection {
            view.set_selection(selection);
        }
        Ok(())
    }

    /// Set (or clear) the callback fired when local changes become available
    pub fn set_user_change_notification_callback(&mut self, callback: Option<Box<dyn FnMut()>>) {
        self.change_callback = callback;
    }

    pub fn has_pending_notification(&self) -> bool {
        self.notification_pending
    }

    /// Fire the change callback if edits were composed since the last flush
    ///
    /// Meant to be called from the event loop after the current edit has been
    /// handled. Returns whether the callback ran.
    pub fn flush_user_change_notification(&mut self) -> bool {
        if !std::mem::take(&mut self.notification_pending) {
            return false;
        }
        match self.change_callback.as_mut() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Whether anything local is not yet confirmed by the server
    pub fn has_uncommitted_changes(&self) -> bool {
        self.submitted.is_some() || !self.user_changeset.is_identity()
    }

    /// Move pending edits into the submitted slot and return them for sending
    ///
    /// If an earlier submission was never acknowledged it is resent together
    /// with the newer edits. Returns an empty result when there is nothing to
    /// send.
    pub fn prepare_user_changeset(&mut self, pool: &mut AttributePool) -> Result<PreparedChangeset> {
        let to_submit = match &self.submitted {
            Some(submitted) => Some(compose(submitted, &self.user_changeset, pool)?),
            None => {
                let sanitized = self.sanitize_authorship(&self.user_changeset, pool)?;
                (!sanitized.is_identity()).then_some(sanitized)
            }
        };

        let Some(to_submit) = to_submit else {
            return Ok(PreparedChangeset::default());
        };
        let prep = prepare_for_wire(&to_submit, pool)?;

        debug!(
            old_len = to_submit.old_len(),
            new_len = to_submit.new_len(),
            resend = self.submitted.is_some(),
            "user changeset prepared"
        );
        self.user_changeset = Changeset::identity(to_submit.new_len());
        self.submitted = Some(to_submit);
        Ok(PreparedChangeset {
            changeset: Some(prep.translated),
            apool: Some(prep.pool),
        })
    }

    /// Rewrite the `author` of inserted text to this client's author
    fn sanitize_authorship(&self, cs: &Changeset, pool: &mut AttributePool) -> Result<Changeset> {
        let Some(author_id) = self.author_id.as_deref() else {
            return Ok(cs.clone());
        };
        let mut assem = OpAssembler::new();
        for op in cs.ops() {
            let mut op = op.clone();
            if op.is_insert() {
                let mut attribs = AttributeMap::from_codes(&op.attribs, pool)?;
                if matches!(attribs.get("author"), Some(old) if old != author_id) {
                    attribs.set("author", author_id);
                    op.attribs = attribs.to_codes(pool);
                }
            }
            assem.push(op);
        }
        Changeset::from_assembled(cs.old_len(), cs.new_len(), assem, cs.char_bank().to_string())
    }

    /// Fold the acknowledged submission into the base text
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ProtocolViolation` if nothing was submitted.
    pub fn apply_prepared_changeset_to_base(&mut self, pool: &mut AttributePool) -> Result<()> {
        let submitted = self.submitted.as_ref().ok_or_else(|| {
            SyncError::ProtocolViolation("no submitted changes to apply to the base text".to_string())
        })?;
        self.base_atext = apply_to_atext(submitted, &self.base_atext, pool)?;
        self.submitted = None;
        debug!(len = self.base_atext.len(), "submitted changeset acknowledged");
        Ok(())
    }

    /// Integrate a remote edit made against the base text
    ///
    /// The base advances by `c`, the submitted and pending changesets are
    /// transformed to apply after it, and the view receives `c` transformed
    /// past both. Returns that transformed change, or `None` when not
    /// tracking. On error nothing is modified.
    pub fn apply_changes_to_base<V>(
        &mut self,
        c: &Changeset,
        author: Option<&str>,
        wire_pool: Option<&AttributePool>,
        view: &mut V,
        pool: &mut AttributePool,
    ) -> Result<Option<Changeset>>
    where
        V: DocumentView + ?Sized,
    {
        if !self.tracking {
            return Ok(None);
        }
        let c = match wire_pool {
            Some(wire) => c.move_to_pool(wire, pool)?,
            None => c.clone(),
        };

        let base_atext = apply_to_atext(&c, &self.base_atext, pool)?;
        let (submitted, c2) = match &self.submitted {
            Some(old) => (
                Some(follow(&c, old, false, pool)?),
                follow(old, &c, true, pool)?,
            ),
            None => (None, c.clone()),
        };
        // local edits win ties, so remote inserts land after the caret
        let user_changeset = follow(&c2, &self.user_changeset, true, pool)?;
        let post_change = follow(&self.user_changeset, &c2, false, pool)?;

        self.base_atext = base_atext;
        self.submitted = submitted;
        self.user_changeset = user_changeset;
        debug!(
            author = author.unwrap_or(""),
            base_len = self.base_atext.len(),
            live_len = self.user_changeset.new_len(),
            "remote changeset applied"
        );

        let _guard = NonUserChangeGuard::acquire(&self.applying_non_user_changes);
        view.apply_changeset_to_document(&post_change, true, pool);
        Ok(Some(post_change))
    }
}
