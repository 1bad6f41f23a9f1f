//! The RGA sequence itself: an index of [`Node`]s keyed by [`Timestamp`],
//! threaded into document order by `next` pointers, plus the
//! subscription bus every mutation broadcasts through.
//!
//! The downstream integration algorithm (`locate_predecessor`) is the
//! same shape as the teacher's `Rga::remote_insert`: walk forward from the
//! anchor while the existing successor's id outranks the new one, so that
//! siblings sharing an anchor always end up in strictly descending
//! timestamp order (see spec.md invariant 3) regardless of the order two
//! replicas apply a pair of concurrent inserts in.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::bus::{Sink, SinkId, SubscriptionBus, TaskQueue, TokioQueue};
use crate::error::RgaError;
use crate::node::Node;
use crate::op::Op;
use crate::timestamp::{ReplicaId, Timestamp, TimestampClock, LEFT};

/// A zero-indexed row/column position in the document's visible text,
/// counting `'\n'` as ending a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCol {
    pub row: usize,
    pub col: usize,
}

/// Something that can receive an op and fold it into its own state —
/// implemented by [`Replica`] (plain passthrough to [`Replica::apply`])
/// and, in `crate::reconcile`, by the editor reconciliation layer. Ties
/// and socket adapters deliver inbound ops through whichever `OpSink`
/// they're configured with, rather than always going straight to the
/// replica (see spec.md §4.5's "replace the replica's inbound sink").
pub trait OpSink: Send + Sync {
    fn receive(&self, op: Op, sender: SinkId) -> Result<(), RgaError>;
}

struct ReplicaState {
    head: Option<Timestamp>,
    nodes: HashMap<Timestamp, Node>,
}

pub struct Replica {
    id: ReplicaId,
    clock: Mutex<TimestampClock>,
    state: RwLock<ReplicaState>,
    bus: SubscriptionBus,
}

impl Replica {
    /// Construct a fresh, empty replica that schedules broadcast delivery
    /// onto the ambient tokio runtime.
    pub fn new(id: ReplicaId) -> Result<Self, RgaError> {
        Self::with_queue(id, Arc::new(TokioQueue::new()))
    }

    /// Construct a fresh, empty replica with an explicit task queue (tests
    /// typically pass a [`crate::bus::ManualQueue`]).
    pub fn with_queue(id: ReplicaId, queue: Arc<dyn TaskQueue>) -> Result<Self, RgaError> {
        let clock = TimestampClock::new(id).ok_or(RgaError::InvalidReplicaId(id))?;
        tracing::debug!(replica_id = id, "constructing replica");
        Ok(Replica {
            id,
            clock: Mutex::new(clock),
            state: RwLock::new(ReplicaState {
                head: None,
                nodes: HashMap::new(),
            }),
            bus: SubscriptionBus::new(queue),
        })
    }

    /// Rebuild a replica by replaying a recorded history (as returned by
    /// [`Replica::history`]) without broadcasting anything — this is
    /// bootstrap, not a live edit.
    pub fn from_history(
        id: ReplicaId,
        history: Vec<Op>,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<Self, RgaError> {
        let replica = Self::with_queue(id, queue)?;
        {
            let mut state = replica.state.write();
            for op in &history {
                match *op {
                    Op::AddRight { after, id, atom } => {
                        Self::integrate_add_right(replica.id, &mut state, after, id, atom)?
                    }
                    Op::Remove { target } => {
                        Self::integrate_remove(replica.id, &mut state, target)?
                    }
                }
            }
        }
        let mut clock = replica.clock.lock();
        for op in &history {
            clock.observe(op.subject());
            if let Op::AddRight { after, .. } = op {
                clock.observe(*after);
            }
        }
        Ok(replica)
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn on(&self, sink: Arc<dyn Sink>) -> SinkId {
        self.bus.on(sink)
    }

    pub fn off(&self, id: SinkId) {
        self.bus.off(id)
    }

    /// Insert `atom` immediately after `after` (use [`LEFT`] to prepend).
    /// Caller-facing: `after` must be present and not removed.
    pub fn add_right(&self, after: Timestamp, atom: char) -> Result<Timestamp, RgaError> {
        self.add_right_impl(after, atom, false)
    }

    /// Same as [`Replica::add_right`] but allows anchoring on an already
    /// removed node, matching the more permissive precondition downstream
    /// `addRight` integration is granted. Used internally by the editor
    /// reconciliation layer, whose patch-translation cursor can
    /// legitimately land on a node it just tombstoned in the same patch
    /// (a single-character replacement is `delete(1)` then `insert(1)`).
    pub(crate) fn add_right_after_any(
        &self,
        after: Timestamp,
        atom: char,
    ) -> Result<Timestamp, RgaError> {
        self.add_right_impl(after, atom, true)
    }

    fn add_right_impl(&self, after: Timestamp, atom: char, relaxed: bool) -> Result<Timestamp, RgaError> {
        let mut state = self.state.write();
        if !after.is_left() {
            match state.nodes.get(&after) {
                None => {
                    if relaxed {
                        tracing::warn!(replica_id = self.id, %after, "unknown reference: addRight anchor not present");
                        return Err(RgaError::UnknownReference(after));
                    }
                    tracing::warn!(replica_id = self.id, %after, "precondition violated: addRight anchor not present");
                    return Err(RgaError::PreconditionViolated(format!(
                        "addRight: anchor {after} not present"
                    )));
                }
                Some(node) if node.removed && !relaxed => {
                    tracing::warn!(replica_id = self.id, %after, "precondition violated: addRight anchor already removed");
                    return Err(RgaError::PreconditionViolated(format!(
                        "addRight: anchor {after} already removed"
                    )));
                }
                _ => {}
            }
        }
        let id = self.clock.lock().tick();
        Self::integrate_add_right(self.id, &mut state, after, id, atom)?;
        drop(state);
        self.bus.broadcast(Op::AddRight { after, id, atom }, None);
        Ok(id)
    }

    /// Tombstone `target`. Caller-facing: `target` must be present and not
    /// already removed — a second local `remove` of the same node is a
    /// precondition violation, not a no-op (see DESIGN.md Open Question 2).
    pub fn remove(&self, target: Timestamp) -> Result<(), RgaError> {
        let mut state = self.state.write();
        match state.nodes.get(&target) {
            None => {
                tracing::warn!(replica_id = self.id, %target, "precondition violated: remove target not present");
                return Err(RgaError::PreconditionViolated(format!(
                    "remove: target {target} not present"
                )));
            }
            Some(node) if node.removed => {
                tracing::warn!(replica_id = self.id, %target, "precondition violated: remove target already removed");
                return Err(RgaError::PreconditionViolated(format!(
                    "remove: target {target} already removed"
                )));
            }
            _ => {}
        }
        state.nodes.get_mut(&target).unwrap().removed = true;
        drop(state);
        self.bus.broadcast(Op::Remove { target }, None);
        Ok(())
    }

    /// Integrate a downstream op (from a peer or history replay) and
    /// rebroadcast it, excluding `sender` from the rebroadcast.
    pub fn apply(&self, op: Op, sender: Option<SinkId>) -> Result<(), RgaError> {
        {
            let mut state = self.state.write();
            match op {
                Op::AddRight { after, id, atom } => {
                    Self::integrate_add_right(self.id, &mut state, after, id, atom)?
                }
                Op::Remove { target } => Self::integrate_remove(self.id, &mut state, target)?,
            }
        }
        {
            let mut clock = self.clock.lock();
            clock.observe(op.subject());
            if let Op::AddRight { after, .. } = op {
                clock.observe(after);
            }
        }
        tracing::debug!(replica_id = self.id, ?op, "integrated downstream op");
        self.bus.broadcast(op, sender);
        Ok(())
    }

    fn integrate_add_right(
        replica_id: ReplicaId,
        state: &mut ReplicaState,
        after: Timestamp,
        id: Timestamp,
        atom: char,
    ) -> Result<(), RgaError> {
        if state.nodes.contains_key(&id) {
            // Duplicate delivery of an already-integrated insert: idempotent no-op.
            return Ok(());
        }
        let (cursor, stop) = Self::locate_predecessor(replica_id, state, after, id)?;
        if cursor.is_left() {
            state.head = Some(id);
        } else {
            state.nodes.get_mut(&cursor).expect("cursor indexed").next = Some(id);
        }
        state.nodes.insert(
            id,
            Node {
                atom,
                removed: false,
                next: stop,
            },
        );
        Ok(())
    }

    fn integrate_remove(
        replica_id: ReplicaId,
        state: &mut ReplicaState,
        target: Timestamp,
    ) -> Result<(), RgaError> {
        match state.nodes.get_mut(&target) {
            None => {
                tracing::warn!(replica_id, %target, "unknown reference: downstream remove target not present");
                Err(RgaError::UnknownReference(target))
            }
            Some(node) => {
                // Already tombstoned: idempotent no-op (downstream remove,
                // unlike the local API, tolerates this).
                node.removed = true;
                Ok(())
            }
        }
    }

    /// Walk forward from `after`, skipping past any existing successor
    /// that outranks `new_id`, to find the node `new_id` should be spliced
    /// in right after. Returns the landing predecessor and what its
    /// successor was before the splice (the new node's `next`).
    fn locate_predecessor(
        replica_id: ReplicaId,
        state: &ReplicaState,
        after: Timestamp,
        new_id: Timestamp,
    ) -> Result<(Timestamp, Option<Timestamp>), RgaError> {
        let mut cursor = after;
        let mut next = Self::successor_of(replica_id, state, after)?;
        while let Some(s) = next {
            if s < new_id {
                break;
            }
            cursor = s;
            next = state.nodes.get(&s).expect("walked node indexed").next;
        }
        Ok((cursor, next))
    }

    fn successor_of(
        replica_id: ReplicaId,
        state: &ReplicaState,
        after: Timestamp,
    ) -> Result<Option<Timestamp>, RgaError> {
        if after.is_left() {
            Ok(state.head)
        } else {
            state.nodes.get(&after).map(|n| n.next).ok_or_else(|| {
                tracing::warn!(replica_id, %after, "unknown reference: addRight anchor not present downstream");
                RgaError::UnknownReference(after)
            })
        }
    }

    /// The node immediately after `cursor` in document order (`cursor`
    /// may be [`LEFT`]), regardless of tombstone status. Used by the
    /// reconciliation layer's patch-translation walk.
    pub(crate) fn next_node(&self, cursor: Timestamp) -> Option<Timestamp> {
        let state = self.state.read();
        if cursor.is_left() {
            state.head
        } else {
            state.nodes.get(&cursor).and_then(|n| n.next)
        }
    }

    pub(crate) fn node_removed(&self, id: Timestamp) -> bool {
        self.state.read().nodes.get(&id).map(|n| n.removed).unwrap_or(false)
    }

    pub fn contains(&self, id: Timestamp) -> bool {
        self.state.read().nodes.contains_key(&id)
    }

    /// `None` if unknown, `Some(removed)` otherwise.
    pub fn is_removed(&self, id: Timestamp) -> Option<bool> {
        self.state.read().nodes.get(&id).map(|n| n.removed)
    }

    /// The visible text, in document order.
    pub fn text(&self) -> String {
        let state = self.state.read();
        let mut out = String::new();
        let mut cur = state.head;
        while let Some(id) = cur {
            let node = &state.nodes[&id];
            if !node.removed {
                out.push(node.atom);
            }
            cur = node.next;
        }
        out
    }

    /// A sequence of ops that, replayed in order on a fresh replica via
    /// [`Replica::from_history`], reconstructs identical visible state.
    pub fn history(&self) -> Vec<Op> {
        let state = self.state.read();
        let mut ops = Vec::new();
        let mut prev = LEFT;
        let mut cur = state.head;
        while let Some(id) = cur {
            let node = &state.nodes[&id];
            ops.push(Op::AddRight {
                after: prev,
                id,
                atom: node.atom,
            });
            if node.removed {
                ops.push(Op::Remove { target: id });
            }
            prev = id;
            cur = node.next;
        }
        ops
    }

    /// Row/column immediately before `stop_at` (used when translating a
    /// remote `remove`).
    pub fn row_col_before_node(&self, stop_at: Timestamp) -> Result<RowCol, RgaError> {
        let state = self.state.read();
        let mut row = 0usize;
        let mut col = 0usize;
        let mut cur = state.head;
        loop {
            match cur {
                None => return Err(RgaError::UnknownReference(stop_at)),
                Some(id) if id == stop_at => break,
                Some(id) => {
                    let node = &state.nodes[&id];
                    if !node.removed {
                        if node.atom == '\n' {
                            row += 1;
                            col = 0;
                        } else {
                            col += 1;
                        }
                    }
                    cur = node.next;
                }
            }
        }
        Ok(RowCol { row, col })
    }

    /// Row/column immediately after `through` (used when translating a
    /// remote `addRight` whose new node is `through`, i.e. already
    /// integrated).
    pub fn row_col_through_node(&self, through: Timestamp) -> Result<RowCol, RgaError> {
        if through.is_left() {
            return Ok(RowCol { row: 0, col: 0 });
        }
        let state = self.state.read();
        let mut row = 0usize;
        let mut col = 0usize;
        let mut cur = state.head;
        loop {
            let id = cur.ok_or(RgaError::UnknownReference(through))?;
            let node = state.nodes.get(&id).ok_or(RgaError::UnknownReference(through))?;
            if !node.removed {
                if node.atom == '\n' {
                    row += 1;
                    col = 0;
                } else {
                    col += 1;
                }
            }
            if id == through {
                break;
            }
            cur = node.next;
        }
        Ok(RowCol { row, col })
    }

    /// Row/column the node `new_id` will land at once spliced in after
    /// `after` — computed before integration, for translating a remote
    /// `addRight` into an editor mutation.
    pub fn row_col_after(&self, after: Timestamp, new_id: Timestamp) -> Result<RowCol, RgaError> {
        let located = {
            let state = self.state.read();
            Self::locate_predecessor(self.id, &state, after, new_id)?.0
        };
        self.row_col_through_node(located)
    }
}

impl OpSink for Replica {
    fn receive(&self, op: Op, sender: SinkId) -> Result<(), RgaError> {
        self.apply(op, Some(sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ManualQueue;

    fn replica(id: ReplicaId) -> Replica {
        Replica::with_queue(id, Arc::new(ManualQueue::new())).unwrap()
    }

    #[test]
    fn basic_typing_builds_text_in_order() {
        let r = replica(0);
        let a = r.add_right(LEFT, 'h').unwrap();
        let b = r.add_right(a, 'i').unwrap();
        let _ = r.add_right(b, '!').unwrap();
        assert_eq!(r.text(), "hi!");
    }

    #[test]
    fn remove_hides_the_character() {
        let r = replica(0);
        let a = r.add_right(LEFT, 'x').unwrap();
        r.remove(a).unwrap();
        assert_eq!(r.text(), "");
    }

    #[test]
    fn local_precondition_rejects_unknown_anchor() {
        let r = replica(0);
        let bogus = r.add_right(LEFT, 'z').unwrap();
        r.remove(bogus).unwrap();
        assert!(matches!(
            r.add_right(bogus, 'y'),
            Err(RgaError::PreconditionViolated(_))
        ));
    }

    #[test]
    fn repeated_local_remove_is_a_precondition_violation() {
        let r = replica(0);
        let a = r.add_right(LEFT, 'x').unwrap();
        r.remove(a).unwrap();
        assert!(matches!(r.remove(a), Err(RgaError::PreconditionViolated(_))));
    }

    #[test]
    fn downstream_remove_of_already_removed_is_idempotent() {
        let r = replica(0);
        let a = r.add_right(LEFT, 'x').unwrap();
        r.apply(Op::Remove { target: a }, None).unwrap();
        assert!(r.apply(Op::Remove { target: a }, None).is_ok());
    }

    #[test]
    fn downstream_remove_of_unknown_target_is_unknown_reference() {
        let r = replica(0);
        let mut foreign_clock = TimestampClock::new(9).unwrap();
        let bogus = foreign_clock.tick();
        assert!(matches!(
            r.apply(Op::Remove { target: bogus }, None),
            Err(RgaError::UnknownReference(_))
        ));
    }

    #[test]
    fn concurrent_inserts_at_same_anchor_converge() {
        // Two replicas both insert right after LEFT, concurrently.
        let mut clock_a = TimestampClock::new(0).unwrap();
        let mut clock_b = TimestampClock::new(1).unwrap();
        let id_a = clock_a.tick();
        let id_b = clock_b.tick();

        let r1 = replica(5);
        r1.apply(Op::AddRight { after: LEFT, id: id_a, atom: 'A' }, None)
            .unwrap();
        r1.apply(Op::AddRight { after: LEFT, id: id_b, atom: 'B' }, None)
            .unwrap();

        let r2 = replica(6);
        // Opposite arrival order.
        r2.apply(Op::AddRight { after: LEFT, id: id_b, atom: 'B' }, None)
            .unwrap();
        r2.apply(Op::AddRight { after: LEFT, id: id_a, atom: 'A' }, None)
            .unwrap();

        assert_eq!(r1.text(), r2.text());
    }

    #[test]
    fn history_round_trips_through_from_history() {
        let r = replica(0);
        let a = r.add_right(LEFT, 'a').unwrap();
        let b = r.add_right(a, 'b').unwrap();
        r.add_right(b, 'c').unwrap();
        r.remove(b).unwrap();

        let history = r.history();
        let rebuilt = Replica::from_history(0, history, Arc::new(ManualQueue::new())).unwrap();
        assert_eq!(rebuilt.text(), r.text());
    }
}
