//! Session: one open document
//!
//! Bundles the attribute pool, the changeset tracker and the undo stack of a
//! single document so they are created, driven and dropped together. The
//! caller owns the event loop and the network: it feeds local edits and
//! server messages in, and sends whatever [`Session::prepare_outgoing`]
//! returns.

use crate::changeset::{invert, make_splice, Changeset};
use crate::config::SessionConfig;
use crate::error::{Result, SyncError};
use crate::pool::AttributePool;
use crate::protocol::{BaseDocument, Message, RemoteChanges, UserChanges};
use crate::tracker::{ChangesetTracker, DocumentView};
use crate::undo::{Selection, UndoStack, UndoStep, UndoableEvent};
use crate::AttribCode;
use tracing::{debug, info_span, warn, Span};
use uuid::Uuid;

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    pool: AttributePool,
    tracker: ChangesetTracker,
    undo: UndoStack,
    span: Span,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        let mut tracker = ChangesetTracker::new();
        if let Some(author) = &config.author_id {
            tracker = tracker.with_author(author.clone());
        }
        let undo = UndoStack::with_non_undoable_events(config.non_undoable_events.clone());
        let span = info_span!("session", id = %id, author = config.author_id.as_deref().unwrap_or(""));
        Self {
            id,
            config,
            pool: AttributePool::new(),
            tracker,
            undo,
            span,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pool(&self) -> &AttributePool {
        &self.pool
    }

    pub fn tracker(&self) -> &ChangesetTracker {
        &self.tracker
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    /// The text the user currently sees
    pub fn live_text(&mut self) -> Result<String> {
        Ok(self.tracker.live_atext(&mut self.pool)?.text().to_string())
    }

    /// Attribute codes to put on text typed by this session's author
    pub fn author_attribs(&mut self) -> Vec<AttribCode> {
        match &self.config.author_id {
            Some(author) => vec![self.pool.intern("author", author)],
            None => Vec::new(),
        }
    }

    /// A changeset replacing `ndel` characters at `start` of the live text
    /// with `text`, attributed to this session's author
    pub fn splice(&mut self, start: usize, ndel: usize, text: &str) -> Changeset {
        let attribs = if text.is_empty() {
            Vec::new()
        } else {
            self.author_attribs()
        };
        make_splice(self.tracker.live_len(), start, ndel, text, attribs)
    }

    /// Start (or restart) from a document sent by the server
    ///
    /// Pending local work and the undo history are discarded.
    pub fn load<V>(&mut self, doc: BaseDocument, view: &mut V) -> Result<()>
    where
        V: DocumentView + ?Sized,
    {
        let _enter = self.span.enter();
        self.tracker
            .set_base_attributed_text(doc.atext, Some(&doc.apool), view, &mut self.pool)?;
        self.undo.clear_history();
        debug!(len = self.tracker.base_atext().len(), "document loaded");
        Ok(())
    }

    /// Record an edit the user made in the view
    ///
    /// `cs` is relative to the live text. It goes to the tracker and, with its
    /// backset, to the undo stack under `event_type`. Ignored while the
    /// session is not tracking a document.
    pub fn local_edit(&mut self, cs: &Changeset, event_type: &str, selection: Option<Selection>) -> Result<()> {
        let _enter = self.span.enter();
        if !self.tracker.is_tracking() || self.tracker.is_applying_non_user_changes() {
            return Ok(());
        }
        let live = self.tracker.live_atext(&mut self.pool)?;
        let backset = invert(cs, &live, &mut self.pool)?;
        self.tracker.compose_user_changeset(cs, &mut self.pool)?;

        let mut event = UndoableEvent::new(event_type).with_backset(backset);
        event.selection = selection;
        self.undo.report_event(event, &mut self.pool)
    }

    /// Local edits to send, if any
    pub fn prepare_outgoing(&mut self) -> Result<Option<Message>> {
        let _enter = self.span.enter();
        let prepared = self.tracker.prepare_user_changeset(&mut self.pool)?;
        Ok(UserChanges::from_prepared(prepared).map(Message::UserChanges))
    }

    /// The server applied our last submission
    pub fn acknowledge(&mut self) -> Result<()> {
        let _enter = self.span.enter();
        self.tracker.apply_prepared_changeset_to_base(&mut self.pool)
    }

    /// Integrate someone else's edit
    pub fn receive_remote<V>(&mut self, changes: RemoteChanges, view: &mut V) -> Result<()>
    where
        V: DocumentView + ?Sized,
    {
        let _enter = self.span.enter();
        let applied = self.tracker.apply_changes_to_base(
            &changes.changeset,
            changes.author.as_deref(),
            Some(&changes.apool),
            view,
            &mut self.pool,
        )?;
        if let Some(post_change) = applied {
            self.undo.report_external_change(&post_change, &mut self.pool)?;
        }
        Ok(())
    }

    /// Dispatch a message from the server
    pub fn handle_message<V>(&mut self, message: Message, view: &mut V) -> Result<()>
    where
        V: DocumentView + ?Sized,
    {
        let result = match message {
            Message::ClientVars(doc) => self.load(doc, view),
            Message::AcceptCommit => self.acknowledge(),
            Message::NewChanges(changes) => self.receive_remote(changes, view),
            Message::UserChanges(_) => Err(SyncError::ProtocolViolation(
                "clients do not receive USER_CHANGES".to_string(),
            )),
        };
        if let Err(err) = &result {
            let _enter = self.span.enter();
            warn!(error = %err, desync = err.is_desync(), "message handling failed");
        }
        result
    }

    /// Undo the last local action; returns whether there was one
    pub fn undo<V>(&mut self, view: &mut V) -> Result<bool>
    where
        V: DocumentView + ?Sized,
    {
        let _enter = self.span.enter();
        let tracker = &mut self.tracker;
        let mut done = false;
        self.undo.perform_undo(&mut self.pool, |step, pool| {
            let Some(step) = step else { return Ok(None) };
            done = true;
            let redo = apply_step(tracker, step, view, pool)?;
            let mut event = UndoableEvent::new("undo");
            event.backset = redo;
            Ok(Some(event))
        })?;
        Ok(done)
    }

    /// Redo the last undone action; returns whether there was one
    pub fn redo<V>(&mut self, view: &mut V) -> Result<bool>
    where
        V: DocumentView + ?Sized,
    {
        let _enter = self.span.enter();
        let tracker = &mut self.tracker;
        let mut done = false;
        self.undo.perform_redo(&mut self.pool, |step, pool| {
            let Some(step) = step else { return Ok(None) };
            done = true;
            apply_step(tracker, step, view, pool)?;
            Ok(None)
        })?;
        Ok(done)
    }
}

/// Apply an undo/redo step as a local edit and return its backset
fn apply_step<V>(
    tracker: &mut ChangesetTracker,
    step: UndoStep,
    view: &mut V,
    pool: &mut AttributePool,
) -> Result<Option<Changeset>>
where
    V: DocumentView + ?Sized,
{
    let Some(cs) = step.backset else {
        tracker.apply_local_changeset_to_view(&Changeset::identity(tracker.live_len()), step.selection, view, pool)?;
        return Ok(None);
    };
    let live = tracker.live_atext(pool)?;
    let backset = invert(&cs, &live, pool)?;
    tracker.apply_local_changeset_to_view(&cs, step.selection, view, pool)?;
    Ok(Some(backset))
}
