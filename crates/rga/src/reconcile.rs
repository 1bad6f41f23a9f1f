//! Editor reconciliation: the layer that keeps a live, user-editable
//! editor widget and a [`Replica`] in sync in both directions, without
//! relying on an event-echo-ignore-list (the design this project's
//! predecessor abandoned after it proved impossible to keep correct under
//! lossy/reordered delivery — see spec.md §4.5).
//!
//! Instead, reconciliation always diffs the editor's current text against
//! a `lastText` snapshot and translates the diff into ops, both when
//! flushing the user's own pending edits and — critically — as the first
//! step of handling every incoming remote op, so a slow or batched local
//! editor never loses an edit to one arriving out from under it.

use std::sync::{Arc, Mutex, Weak};

use crate::bus::SinkId;
use crate::diff::{diff, Patch, PatchOp};
use crate::editor::{ChangeHandler, EditorHandle};
use crate::error::RgaError;
use crate::op::Op;
use crate::replica::{OpSink, Replica};
use crate::timestamp::{Timestamp, LEFT};

/// Walks an RGA's node list in lockstep with a [`Patch`], translating
/// `retain`/`delete`/`insert` into `remove`/`addRight` calls against a
/// single running cursor, starting from [`LEFT`] for every patch (the
/// diff it came from always spans the whole document).
struct PatchWalker<'a> {
    replica: &'a Replica,
    cursor: Timestamp,
}

impl<'a> PatchWalker<'a> {
    fn new(replica: &'a Replica) -> Self {
        PatchWalker {
            replica,
            cursor: LEFT,
        }
    }

    fn retain(&mut self, n: usize) -> Result<(), RgaError> {
        let mut counted = 0;
        while counted < n {
            let next = self.replica.next_node(self.cursor).ok_or_else(|| {
                RgaError::SyncDrift("retain walked past the end of the document".into())
            })?;
            let removed = self.replica.node_removed(next);
            self.cursor = next;
            if !removed {
                counted += 1;
            }
        }
        Ok(())
    }

    fn delete(&mut self, n: usize) -> Result<(), RgaError> {
        let mut removed_count = 0;
        while removed_count < n {
            let next = self.replica.next_node(self.cursor).ok_or_else(|| {
                RgaError::SyncDrift("delete walked past the end of the document".into())
            })?;
            let already_removed = self.replica.node_removed(next);
            self.cursor = next;
            if !already_removed {
                self.replica.remove(next)?;
                removed_count += 1;
            }
        }
        Ok(())
    }

    fn insert(&mut self, text: &str) -> Result<(), RgaError> {
        for ch in text.chars() {
            self.cursor = self.replica.add_right_after_any(self.cursor, ch)?;
        }
        Ok(())
    }
}

fn apply_patch(replica: &Replica, patch: Patch) -> Result<(), RgaError> {
    let mut walker = PatchWalker::new(replica);
    for op in patch.ops {
        match op {
            PatchOp::Retain(n) => walker.retain(n)?,
            PatchOp::Delete(n) => walker.delete(n)?,
            PatchOp::Insert(s) => walker.insert(&s)?,
        }
    }
    Ok(())
}

/// Owns the wiring between one [`Replica`] and one editor widget. Does
/// *not* subscribe to the replica's broadcast bus: it's the designated
/// target a tie/transport delivers inbound ops to instead of delivering
/// them straight to the replica (see `crate::replica::OpSink` and
/// spec.md §4.5's "replace the replica's inbound sink with onRemoteOp").
pub struct Reconciler<E: EditorHandle> {
    replica: Arc<Replica>,
    editor: Arc<E>,
    last_text: Mutex<String>,
    change_handler: ChangeHandler,
}

impl<E: EditorHandle + 'static> Reconciler<E> {
    pub fn new(replica: Arc<Replica>, editor: Arc<E>) -> Arc<Self> {
        let initial = replica.text();
        editor.set_value(&initial);
        Arc::new_cyclic(|weak: &Weak<Reconciler<E>>| {
            let weak_for_handler = weak.clone();
            let handler: ChangeHandler = Arc::new(move || {
                if let Some(reconciler) = weak_for_handler.upgrade() {
                    if let Err(err) = reconciler.take_user_edits() {
                        tracing::error!(?err, "reconciliation failed while flushing user edits");
                    }
                }
            });
            editor.set_change_handler(Some(handler.clone()));
            Reconciler {
                replica,
                editor,
                last_text: Mutex::new(initial),
                change_handler: handler,
            }
        })
    }

    fn with_editor_suppressed(&self, f: impl FnOnce()) {
        self.editor.set_change_handler(None);
        f();
        self.editor.set_change_handler(Some(self.change_handler.clone()));
    }

    /// Diff the editor's current text against `lastText` and translate
    /// the patch into ops against the replica. A no-op if nothing has
    /// changed since the last flush.
    pub fn take_user_edits(&self) -> Result<(), RgaError> {
        let current = self.editor.value();
        let mut last = self.last_text.lock().unwrap();
        if current == *last {
            return Ok(());
        }
        if *last != self.replica.text() {
            return Err(RgaError::SyncDrift(
                "lastText diverged from replica before applying user edits".into(),
            ));
        }
        let patch = diff(&last, &current);
        apply_patch(&self.replica, patch)?;
        if self.replica.text() != current {
            return Err(RgaError::SyncDrift(
                "lastText diverged from replica after applying user edits".into(),
            ));
        }
        *last = current;
        Ok(())
    }

    /// The five-step procedure from spec.md §4.5: flush pending local
    /// edits first, translate the remote op into an editor mutation
    /// against the *current* state (not the state the op was generated
    /// against), apply the op to the replica, then resynchronize
    /// `lastText`.
    pub fn on_remote_op(&self, op: Op, sender: SinkId) -> Result<(), RgaError> {
        self.take_user_edits()?;

        match op {
            Op::AddRight { after, id, atom } => {
                if !self.replica.contains(id) {
                    let pos = self.replica.row_col_after(after, id)?;
                    let editor = self.editor.clone();
                    let mut buf = [0u8; 4];
                    let text = atom.encode_utf8(&mut buf).to_string();
                    self.with_editor_suppressed(|| editor.insert(pos, &text));
                }
                // else: duplicate delivery of an already-integrated
                // insert — no editor mutation, but `apply` below still
                // runs (harmlessly, idempotently) to keep this path
                // uniform with the unknown/removed cases.
            }
            Op::Remove { target } => match self.replica.is_removed(target) {
                None => return Err(RgaError::UnknownReference(target)),
                Some(true) => {} // already removed: no-op translation
                Some(false) => {
                    let start = self.replica.row_col_before_node(target)?;
                    let end = self.replica.row_col_through_node(target)?;
                    let editor = self.editor.clone();
                    self.with_editor_suppressed(|| editor.remove(start, end));
                }
            },
        }

        self.replica.apply(op, Some(sender))?;

        let mut last = self.last_text.lock().unwrap();
        *last = self.editor.value();
        if *last != self.replica.text() {
            return Err(RgaError::SyncDrift(
                "lastText diverged from replica after applying a remote op".into(),
            ));
        }
        Ok(())
    }
}

impl<E: EditorHandle + 'static> OpSink for Reconciler<E> {
    fn receive(&self, op: Op, sender: SinkId) -> Result<(), RgaError> {
        self.on_remote_op(op, sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ManualQueue;
    use crate::editor::TerminalEditor;
    use crate::timestamp::TimestampClock;

    fn replica() -> Arc<Replica> {
        Arc::new(Replica::with_queue(0, Arc::new(ManualQueue::new())).unwrap())
    }

    #[test]
    fn typing_reaches_the_replica() {
        let replica = replica();
        let editor = TerminalEditor::new();
        let _reconciler = Reconciler::new(replica.clone(), editor.clone());

        editor.type_text("hello");

        assert_eq!(replica.text(), "hello");
    }

    #[test]
    fn remote_insert_appears_in_the_editor() {
        let replica = replica();
        let editor = TerminalEditor::new();
        let reconciler = Reconciler::new(replica.clone(), editor.clone());

        let mut foreign = TimestampClock::new(1).unwrap();
        let id = foreign.tick();
        reconciler
            .on_remote_op(
                Op::AddRight {
                    after: LEFT,
                    id,
                    atom: 'x',
                },
                999,
            )
            .unwrap();

        assert_eq!(editor.value(), "x");
        assert_eq!(replica.text(), "x");
    }

    #[test]
    fn remote_remove_disappears_from_the_editor() {
        let replica = replica();
        let editor = TerminalEditor::new();
        let reconciler = Reconciler::new(replica.clone(), editor.clone());

        editor.type_text("xy");
        let ops = replica.history();
        let x_id = ops[0].subject();

        let mut foreign = TimestampClock::new(1).unwrap();
        let _ = foreign.tick(); // keep the foreign clock ahead of nothing in particular
        reconciler
            .on_remote_op(Op::Remove { target: x_id }, 999)
            .unwrap();

        assert_eq!(editor.value(), "y");
        assert_eq!(replica.text(), "y");
    }

    #[test]
    fn duplicate_remote_insert_is_a_no_op() {
        let replica = replica();
        let editor = TerminalEditor::new();
        let reconciler = Reconciler::new(replica.clone(), editor.clone());

        let mut foreign = TimestampClock::new(1).unwrap();
        let id = foreign.tick();
        let op = Op::AddRight {
            after: LEFT,
            id,
            atom: 'x',
        };
        reconciler.on_remote_op(op, 999).unwrap();
        reconciler.on_remote_op(op, 999).unwrap();

        assert_eq!(editor.value(), "x");
    }

    /// spec.md §8 scenario 6 ("Slow editor reconciliation"): the RGA holds
    /// "HOME RUN"; the user deletes the space but the editor's change
    /// event hasn't fired yet; a remote `addRight` arrives anchored on
    /// that still-present (from the replica's point of view) space before
    /// the local deletion is flushed. `on_remote_op` must flush the
    /// pending deletion first, then translate the remote insert against
    /// the post-flush document, landing on `"HOME*RUN"` with no drift.
    #[test]
    fn slow_local_delete_is_flushed_before_a_remote_insert_anchored_on_it() {
        let replica = replica();
        let mut prev = LEFT;
        for ch in "HOME RUN".chars() {
            prev = replica.add_right(prev, ch).unwrap();
        }
        let space = {
            let history = replica.history();
            history[4].subject() // the space between "HOME" and "RUN"
        };

        let editor = TerminalEditor::new();
        let reconciler = Reconciler::new(replica.clone(), editor.clone());

        // The editor already reflects the deletion, but its change event
        // is still pending — simulated by mutating the buffer directly
        // without notifying the reconciler.
        editor.set_value("HOMERUN");

        let mut foreign = TimestampClock::new(1).unwrap();
        let remote_id = foreign.tick();
        reconciler
            .on_remote_op(
                Op::AddRight {
                    after: space,
                    id: remote_id,
                    atom: '*',
                },
                999,
            )
            .unwrap();

        assert_eq!(editor.value(), "HOME*RUN");
        assert_eq!(replica.text(), "HOME*RUN");

        // Draining the stale editor event (the one that would have fired
        // for the deletion already folded into `take_user_edits`) must be
        // a no-op: `current == lastText` by the time it runs.
        reconciler.take_user_edits().unwrap();
        assert_eq!(editor.value(), "HOME*RUN");
        assert_eq!(replica.text(), "HOME*RUN");
    }

    #[test]
    fn pending_local_edit_is_flushed_before_remote_op_is_translated() {
        let replica = replica();
        let editor = TerminalEditor::new();
        let reconciler = Reconciler::new(replica.clone(), editor.clone());

        // The widget's value changed but its change handler hasn't fired
        // yet (e.g. the host toolkit batches notification).
        editor.set_value("HOME RUN");

        let mut foreign = TimestampClock::new(1).unwrap();
        let id = foreign.tick();
        reconciler
            .on_remote_op(
                Op::AddRight {
                    after: LEFT,
                    id,
                    atom: '!',
                },
                999,
            )
            .unwrap();

        // take_user_edits ran first inside on_remote_op: "HOME RUN" is in
        // the replica, and the remote '!' was placed relative to the
        // *post*-flush document, not a stale pre-flush one.
        assert!(replica.text().ends_with("HOME RUN"));
        assert!(editor.value().starts_with('!'));
    }
}
