//! UndoStack: per-user undo/redo that survives remote edits
//!
//! The stack records two kinds of frames in the order they happened:
//! local undoable events, each with the backset that reverts it, and
//! external (remote) changes. A backset is only valid against the text right
//! after its event, so before an event is undone every external change above
//! it is transformed past it with `follow`, moving the external change below
//! the event and leaving the event's backset valid against the current text.
//!
//! Consecutive external changes are always composed into one frame, and the
//! bottom of the stack is a sentinel event that is never undone.
//!
//! # Example
//!
//! ```
//! use textsync_core::{invert, make_splice, AText, AttributePool, UndoStack, UndoableEvent};
//!
//! let mut pool = AttributePool::new();
//! let mut stack = UndoStack::new();
//!
//! let doc = AText::new("");
//! let typed = make_splice(0, 0, 0, "hi", vec![]);
//! let backset = invert(&typed, &doc, &mut pool).unwrap();
//! stack
//!     .report_event(UndoableEvent::new("typing").with_backset(backset), &mut pool)
//!     .unwrap();
//!
//! stack
//!     .perform_undo(&mut pool, |step, _pool| {
//!         let step = step.expect("one event to undo");
//!         assert_eq!(step.backset.unwrap().to_string(), "Z:2<2-2$");
//!         Ok(Some(UndoableEvent::new("undo")))
//!     })
//!     .unwrap();
//! assert!(stack.can_redo());
//! ```

use crate::changeset::{character_range_follow, compose, follow, Changeset, OpKind};
use crate::error::{Result, SyncError};
use crate::pool::AttributePool;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Event type of the bottom sentinel
const BOTTOM: &str = "bottom";

/// A text selection in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
    /// Whether the caret is at `start` rather than `end`
    pub focus_at_start: bool,
}

impl Selection {
    pub fn new(start: usize, end: usize, focus_at_start: bool) -> Self {
        Self {
            start,
            end,
            focus_at_start,
        }
    }

    /// A collapsed selection
    pub fn caret(pos: usize) -> Self {
        Self::new(pos, pos, false)
    }
}

/// A local edit as reported to the undo stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoableEvent {
    /// Events of the same type may merge into one undo step
    pub event_type: String,
    /// Changeset that reverts the edit, against the text right after it
    pub backset: Option<Changeset>,
    pub selection: Option<Selection>,
}

impl UndoableEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            backset: None,
            selection: None,
        }
    }

    pub fn with_backset(mut self, backset: Changeset) -> Self {
        self.backset = Some(backset);
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// What to apply for one undo or redo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoStep {
    /// Changeset to apply to the current text
    pub backset: Option<Changeset>,
    /// Selection to restore afterwards
    pub selection: Option<Selection>,
}

/// One entry of the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(UndoableEvent),
    External(Changeset),
}

/// Undo/redo history for one session
#[derive(Debug, Clone)]
pub struct UndoStack {
    frames: Vec<Frame>,
    /// Number of `Frame::Event`s, the sentinel included
    num_events: usize,
    /// How many events from the top are undo entries that redo can pop
    undo_ptr: usize,
    non_undoable_events: Vec<String>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStack {
    /// Create an empty history; `clearauthorship` events are never recorded
    pub fn new() -> Self {
        Self::with_non_undoable_events(vec!["clearauthorship".to_string()])
    }

    /// Create an empty history that never records the given event types
    pub fn with_non_undoable_events(non_undoable_events: Vec<String>) -> Self {
        Self {
            frames: vec![Frame::Event(UndoableEvent::new(BOTTOM))],
            num_events: 1,
            undo_ptr: 0,
            non_undoable_events,
        }
    }

    /// Forget everything
    pub fn clear_history(&mut self) {
        self.frames.clear();
        self.frames.push(Frame::Event(UndoableEvent::new(BOTTOM)));
        self.num_events = 1;
        self.undo_ptr = 0;
        debug!("undo history cleared");
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of undoable events, the sentinel included
    pub fn num_events(&self) -> usize {
        self.num_events
    }

    pub fn can_undo(&self) -> bool {
        self.undo_ptr + 1 < self.num_events
    }

    pub fn can_redo(&self) -> bool {
        self.undo_ptr >= 2
    }

    /// Record a local edit
    ///
    /// An event without a backset (or with an identity one) only updates the
    /// selection of the top event. Otherwise the event is merged into the top
    /// event when both have the same type and [`merge_changesets`] allows it,
    /// or pushed as a new frame. Either way the redo history is dropped.
    ///
    /// [`merge_changesets`]: Self::merge_changesets
    pub fn report_event(&mut self, event: UndoableEvent, pool: &mut AttributePool) -> Result<()> {
        let top = self.expose(0, pool)?;
        let top = self.event_mut(top)?;

        let changes_text = matches!(&event.backset, Some(backset) if !backset.is_identity());
        if !changes_text {
            if event.selection.is_some() {
                top.selection = event.selection;
            }
            return Ok(());
        }

        let mut merged = false;
        if top.event_type == event.event_type {
            if let Some(merge) = Self::merge_changesets(event.backset.as_ref(), top.backset.as_ref(), pool)? {
                top.backset = Some(merge);
                if event.selection.is_some() {
                    top.selection = event.selection;
                }
                merged = true;
            }
        }
        if merged {
            trace!(event_type = %event.event_type, "event merged into top of undo stack");
        } else if self.non_undoable_events.contains(&event.event_type) {
            trace!(event_type = %event.event_type, "non-undoable event dropped");
        } else {
            debug!(event_type = %event.event_type, "event pushed onto undo stack");
            self.push_event(event);
        }
        self.undo_ptr = 0;
        Ok(())
    }

    /// Record a change made by someone else
    pub fn report_external_change(&mut self, changeset: &Changeset, pool: &mut AttributePool) -> Result<()> {
        if changeset.is_identity() {
            return Ok(());
        }
        match self.frames.last_mut() {
            Some(Frame::External(top)) => *top = compose(top, changeset, pool)?,
            _ => self.frames.push(Frame::External(changeset.clone())),
        }
        Ok(())
    }

    /// Merge the backset `newer` of an event into the backset `older` of the
    /// event before it, if they form one action
    ///
    /// They do when each is a single insertion run with no deletions and so
    /// is their composition, or likewise for a single deletion run. Returns
    /// `None` when they should stay separate steps.
    pub fn merge_changesets(
        newer: Option<&Changeset>,
        older: Option<&Changeset>,
        pool: &mut AttributePool,
    ) -> Result<Option<Changeset>> {
        let (newer, older) = match (newer, older) {
            (None, other) | (other, None) => return Ok(other.cloned()),
            (Some(newer), Some(older)) => (newer, older),
        };
        let single_run = |cs: &Changeset, run: OpKind, other: OpKind| {
            cs.count_ops(run) == 1 && cs.count_ops(other) == 0
        };
        for (run, other) in [(OpKind::Insert, OpKind::Delete), (OpKind::Delete, OpKind::Insert)] {
            if single_run(newer, run, other) && single_run(older, run, other) {
                let merge = compose(newer, older, pool)?;
                if single_run(&merge, run, other) {
                    return Ok(Some(merge));
                }
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// Undo the next event
    ///
    /// `apply` receives the step to apply to the current text, or `None` when
    /// there is nothing to undo, and is called exactly once. Given a step it
    /// must return the event describing the undo (whose backset redoes it),
    /// which is recorded instead of going through [`report_event`].
    ///
    /// [`report_event`]: Self::report_event
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ProtocolViolation` if `apply` returns no event for
    /// a step, and whatever `apply` itself returns.
    pub fn perform_undo<F>(&mut self, pool: &mut AttributePool, apply: F) -> Result<()>
    where
        F: FnOnce(Option<UndoStep>, &mut AttributePool) -> Result<Option<UndoableEvent>>,
    {
        if !self.can_undo() {
            trace!("nothing to undo");
            apply(None, pool)?;
            return Ok(());
        }
        let step = self.step_at(self.undo_ptr, pool)?;
        let undo_event = apply(Some(step), pool)?.ok_or_else(|| {
            SyncError::ProtocolViolation("undo must return the event that reverts it".to_string())
        })?;
        self.push_event(undo_event);
        self.undo_ptr += 2;
        debug!(undo_ptr = self.undo_ptr, "undo performed");
        Ok(())
    }

    /// Redo the last undone event
    ///
    /// `apply` receives the step, or `None` when there is nothing to redo;
    /// its returned event is ignored.
    pub fn perform_redo<F>(&mut self, pool: &mut AttributePool, apply: F) -> Result<()>
    where
        F: FnOnce(Option<UndoStep>, &mut AttributePool) -> Result<Option<UndoableEvent>>,
    {
        if !self.can_redo() {
            trace!("nothing to redo");
            apply(None, pool)?;
            return Ok(());
        }
        let step = self.step_at(0, pool)?;
        apply(Some(step), pool)?;
        self.pop_event(pool)?;
        self.undo_ptr -= 2;
        debug!(undo_ptr = self.undo_ptr, "redo performed");
        Ok(())
    }

    /// Backset of the `n`th event from the top with the selection of the one
    /// below it
    fn step_at(&mut self, n: usize, pool: &mut AttributePool) -> Result<UndoStep> {
        let idx = self.expose(n, pool)?;
        let backset = self.event_mut(idx)?.backset.clone();
        let idx = self.expose(n + 1, pool)?;
        let selection = self.event_mut(idx)?.selection;
        Ok(UndoStep { backset, selection })
    }

    fn push_event(&mut self, event: UndoableEvent) {
        self.frames.push(Frame::Event(event));
        self.num_events += 1;
    }

    fn pop_event(&mut self, pool: &mut AttributePool) -> Result<UndoableEvent> {
        self.expose(0, pool)?;
        match self.frames.pop() {
            Some(Frame::Event(event)) => {
                self.num_events -= 1;
                Ok(event)
            }
            _ => Err(SyncError::ProtocolViolation("top of undo stack is not an event".to_string())),
        }
    }

    fn event_mut(&mut self, idx: usize) -> Result<&mut UndoableEvent> {
        match self.frames.get_mut(idx) {
            Some(Frame::Event(event)) => Ok(event),
            _ => Err(SyncError::ProtocolViolation(format!("undo frame {idx} is not an event"))),
        }
    }

    /// Move every external change above the `n`th event from the top below
    /// it, transforming both, and return the event's index
    fn expose(&mut self, n: usize, pool: &mut AttributePool) -> Result<usize> {
        let target_of = |len: usize| {
            len.checked_sub(n + 1)
                .ok_or_else(|| SyncError::ProtocolViolation(format!("no undo event {n} from the top")))
        };
        let mut idx = self.frames.len() - 1;
        loop {
            // coalescing below shrinks the stack, so recompute every time
            let target = target_of(self.frames.len())?;
            let is_external = matches!(self.frames[idx], Frame::External(_));
            if !(idx > target || is_external) || (is_external && idx == 0) {
                return Ok(target);
            }
            if !is_external {
                idx -= 1;
                continue;
            }

            let (below, above) = self.frames.split_at_mut(idx);
            if let (Frame::Event(un), Frame::External(ex)) = (&mut below[idx - 1], &mut above[0]) {
                if let Some(backset) = &un.backset {
                    let new_backset = follow(ex, backset, false, pool)?;
                    let new_ex = follow(backset, ex, true, pool)?;
                    if let Some(sel) = &mut un.selection {
                        let (start, end) = character_range_follow(ex, sel.start, sel.end, false);
                        sel.start = start;
                        sel.end = end;
                        if start == end {
                            sel.focus_at_start = false;
                        }
                    }
                    un.backset = Some(new_backset);
                    *ex = new_ex;
                }
            }
            self.frames.swap(idx - 1, idx);

            if idx >= 2 {
                if let (Frame::External(older), Frame::External(newer)) = (&self.frames[idx - 2], &self.frames[idx - 1]) {
                    let combined = compose(older, newer, pool)?;
                    self.frames[idx - 1] = Frame::External(combined);
                    self.frames.remove(idx - 2);
                    idx -= 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{apply_to_atext, invert, make_splice, AText};

    /// A document with undo, the way an editor would drive the stack
    struct Editor {
        doc: AText,
        pool: AttributePool,
        stack: UndoStack,
    }

    impl Editor {
        fn new(text: &str) -> Self {
            Self {
                doc: AText::new(text),
                pool: AttributePool::new(),
                stack: UndoStack::new(),
            }
        }

        fn local(&mut self, event_type: &str, cs: Changeset) {
            let backset = invert(&cs, &self.doc, &mut self.pool).unwrap();
            self.doc = apply_to_atext(&cs, &self.doc, &mut self.pool).unwrap();
            let event = UndoableEvent::new(event_type).with_backset(backset);
            self.stack.report_event(event, &mut self.pool).unwrap();
        }

        fn type_at(&mut self, pos: usize, text: &str) {
            let cs = make_splice(self.doc.len(), pos, 0, text, vec![]);
            self.local("typing", cs);
        }

        fn remote(&mut self, cs: Changeset) {
            self.doc = apply_to_atext(&cs, &self.doc, &mut self.pool).unwrap();
            self.stack.report_external_change(&cs, &mut self.pool).unwrap();
        }

        /// Returns whether there was something to undo
        fn undo(&mut self) -> bool {
            let doc = &mut self.doc;
            let mut did = false;
            self.stack
                .perform_undo(&mut self.pool, |step, pool| {
                    let Some(step) = step else { return Ok(None) };
                    did = true;
                    let backset = step.backset.unwrap();
                    let redo = invert(&backset, doc, pool)?;
                    *doc = apply_to_atext(&backset, doc, pool)?;
                    Ok(Some(UndoableEvent::new("undo").with_backset(redo)))
                })
                .unwrap();
            did
        }

        fn redo(&mut self) -> bool {
            let doc = &mut self.doc;
            let mut did = false;
            self.stack
                .perform_redo(&mut self.pool, |step, pool| {
                    let Some(step) = step else { return Ok(None) };
                    did = true;
                    *doc = apply_to_atext(&step.backset.unwrap(), doc, pool)?;
                    Ok(None)
                })
                .unwrap();
            did
        }

        fn text(&self) -> &str {
            self.doc.text()
        }
    }

    #[test]
    fn test_typing_merges_into_one_step() {
        let mut editor = Editor::new("");
        editor.type_at(0, "a");
        editor.type_at(1, "b");
        editor.type_at(2, "c");
        assert_eq!(editor.stack.num_events(), 2);

        assert!(editor.undo());
        assert_eq!(editor.text(), "");
        assert!(!editor.undo());
    }

    #[test]
    fn test_backspace_is_a_separate_step() {
        let mut editor = Editor::new("");
        editor.type_at(0, "a");
        editor.type_at(1, "b");
        editor.type_at(2, "c");
        editor.local("backspace", make_splice(3, 2, 1, "", vec![]));
        assert_eq!(editor.text(), "ab");

        assert!(editor.undo());
        assert_eq!(editor.text(), "abc");
        assert!(editor.undo());
        assert_eq!(editor.text(), "");
    }

    #[test]
    fn test_non_adjacent_typing_not_merged() {
        let mut editor = Editor::new("xy");
        editor.type_at(0, "a");
        editor.type_at(3, "b");
        assert_eq!(editor.text(), "axyb");
        assert_eq!(editor.stack.num_events(), 3);
    }

    #[test]
    fn test_redo() {
        let mut editor = Editor::new("");
        editor.type_at(0, "hello");
        assert!(!editor.redo());

        assert!(editor.undo());
        assert_eq!(editor.text(), "");
        assert!(editor.redo());
        assert_eq!(editor.text(), "hello");
        assert!(!editor.redo());

        // undo still works after the redo
        assert!(editor.undo());
        assert_eq!(editor.text(), "");
    }

    #[test]
    fn test_new_event_drops_redo() {
        let mut editor = Editor::new("");
        editor.type_at(0, "a");
        editor.local("paste", make_splice(1, 1, 0, "bc", vec![]));
        assert!(editor.undo());
        editor.type_at(1, "z");
        assert!(!editor.stack.can_redo());
        assert_eq!(editor.text(), "az");
    }

    #[test]
    fn test_external_changes_coalesce() {
        let mut pool = AttributePool::new();
        let mut stack = UndoStack::new();
        let first = make_splice(0, 0, 0, "ab", vec![]);
        let second = make_splice(2, 1, 0, "x", vec![]);
        stack.report_external_change(&first, &mut pool).unwrap();
        stack.report_external_change(&second, &mut pool).unwrap();
        stack.report_external_change(&Changeset::identity(3), &mut pool).unwrap();

        let expected = compose(&first, &second, &mut pool).unwrap();
        assert_eq!(stack.frames().len(), 2);
        assert_eq!(stack.frames()[1], Frame::External(expected));
    }

    #[test]
    fn test_undo_across_remote_edit() {
        let mut editor = Editor::new("");
        editor.type_at(0, "hello");
        editor.remote(make_splice(5, 0, 0, "X", vec![]));
        assert_eq!(editor.text(), "Xhello");

        assert!(editor.undo());
        assert_eq!(editor.text(), "X");
        assert!(editor.redo());
        assert_eq!(editor.text(), "Xhello");
    }

    #[test]
    fn test_undo_across_several_remote_edits() {
        let mut editor = Editor::new("");
        editor.type_at(0, "ab");
        editor.remote(make_splice(2, 0, 0, "X", vec![]));
        editor.local("paste", make_splice(3, 3, 0, "c", vec![]));
        editor.remote(make_splice(4, 0, 0, "Y", vec![]));
        assert_eq!(editor.text(), "YXabc");

        assert!(editor.undo());
        assert_eq!(editor.text(), "YXab");
        assert!(editor.undo());
        assert_eq!(editor.text(), "YX");
        assert!(!editor.undo());

        // the two remote edits ended up in one frame below the events
        let externals = editor
            .stack
            .frames()
            .iter()
            .filter(|frame| matches!(frame, Frame::External(_)))
            .count();
        assert_eq!(externals, 1);
    }

    #[test]
    fn test_selection_follows_remote_edit() {
        let mut pool = AttributePool::new();
        let mut stack = UndoStack::new();
        let doc = AText::new("");
        let typed = make_splice(0, 0, 0, "hello", vec![]);
        let backset = invert(&typed, &doc, &mut pool).unwrap();
        stack
            .report_event(UndoableEvent::new("typing").with_backset(backset), &mut pool)
            .unwrap();
        stack
            .report_event(UndoableEvent::new("select").with_selection(Selection::new(1, 3, true)), &mut pool)
            .unwrap();
        stack.report_external_change(&make_splice(5, 0, 0, "XY", vec![]), &mut pool).unwrap();
        // a second event so the first one's selection is handed to its undo
        let typed = make_splice(7, 7, 0, "!", vec![]);
        let doc = AText::new("XYhello");
        let backset = invert(&typed, &doc, &mut pool).unwrap();
        stack
            .report_event(UndoableEvent::new("punctuation").with_backset(backset), &mut pool)
            .unwrap();

        stack
            .perform_undo(&mut pool, |step, _| {
                let step = step.unwrap();
                assert_eq!(step.selection, Some(Selection::new(3, 5, true)));
                Ok(Some(UndoableEvent::new("undo")))
            })
            .unwrap();
    }

    #[test]
    fn test_clearauthorship_not_recorded() {
        let mut editor = Editor::new("ab");
        editor.local("clearauthorship", make_splice(2, 0, 1, "", vec![]));
        assert_eq!(editor.stack.num_events(), 1);
        assert!(!editor.undo());
    }

    #[test]
    fn test_undo_must_return_event() {
        let mut editor = Editor::new("");
        editor.type_at(0, "a");
        let result = editor.stack.perform_undo(&mut editor.pool, |_, _| Ok(None));
        assert!(matches!(result, Err(SyncError::ProtocolViolation(_))));
    }

    #[test]
    fn test_clear_history() {
        let mut editor = Editor::new("");
        editor.type_at(0, "a");
        editor.remote(make_splice(1, 0, 0, "b", vec![]));
        editor.stack.clear_history();
        assert_eq!(editor.stack.frames().len(), 1);
        assert!(!editor.stack.can_undo());
        assert!(!editor.undo());
    }

    #[test]
    fn test_merge_changesets_rule() {
        let mut pool = AttributePool::new();
        let cs = |s: &str| -> Changeset { s.parse().unwrap() };
        // two adjacent single deletions
        let merged = UndoStack::merge_changesets(Some(&cs("Z:2<1=1-1$")), Some(&cs("Z:1<1-1$")), &mut pool).unwrap();
        assert_eq!(merged, Some(cs("Z:2<2-2$")));
        // an insertion never merges with a deletion
        assert_eq!(
            UndoStack::merge_changesets(Some(&cs("Z:1>1+1$a")), Some(&cs("Z:1<1-1$")), &mut pool).unwrap(),
            None
        );
        // separate runs
        assert_eq!(
            UndoStack::merge_changesets(Some(&cs("Z:3>1=2+1$a")), Some(&cs("Z:2>1+1$b")), &mut pool).unwrap(),
            None
        );
        assert_eq!(
            UndoStack::merge_changesets(None, Some(&cs("Z:1<1-1$")), &mut pool).unwrap(),
            Some(cs("Z:1<1-1$"))
        );
    }
}
