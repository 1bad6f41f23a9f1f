//! Tying replicas together: wiring so that one replica's locally-applied
//! ops are forwarded into another's [`OpSink`], with the receiving side's
//! own broadcast excluding the link the op just arrived on (so a 3+ peer
//! mesh never bounces an op back the way it came).

use std::sync::{Arc, OnceLock};

use crate::bus::{Sink, SinkId};
use crate::error::RgaError;
use crate::op::Op;
use crate::replica::{OpSink, Replica};

struct Forward {
    target: Arc<dyn OpSink>,
    // The SinkId this forward's *return path* was registered under on
    // `target`'s own bus, so `target`'s subsequent broadcast can exclude
    // echoing the op straight back. Filled in once both directions of a
    // tie are registered (see `tie`).
    echo_id: OnceLock<SinkId>,
}

impl Sink for Forward {
    fn deliver(&self, op: Op) {
        let sender = *self
            .echo_id
            .get()
            .expect("tie fully wired before any broadcast can reach it");
        if let Err(err) = self.target.receive(op, sender) {
            tracing::warn!(?err, "dropped op while forwarding across a tie");
        }
    }
}

/// Tie two replicas directly together: each replica's locally-generated
/// ops are forwarded into the other. Requires both replicas to already
/// share identical history — `tie` does not perform an initial sync.
pub fn tie(a: &Arc<Replica>, b: &Arc<Replica>) {
    let fwd_a_to_b: Arc<Forward> = Arc::new(Forward {
        target: b.clone(),
        echo_id: OnceLock::new(),
    });
    let fwd_b_to_a: Arc<Forward> = Arc::new(Forward {
        target: a.clone(),
        echo_id: OnceLock::new(),
    });

    let id_on_a = a.on(fwd_a_to_b.clone() as Arc<dyn Sink>);
    let id_on_b = b.on(fwd_b_to_a.clone() as Arc<dyn Sink>);

    // When `b` integrates an op forwarded from `a`, it must broadcast with
    // sender = id_on_b (the slot `fwd_b_to_a` occupies on `b`'s bus) so it
    // doesn't re-forward the op straight back to `a`.
    let _ = fwd_a_to_b.echo_id.set(id_on_b);
    let _ = fwd_b_to_a.echo_id.set(id_on_a);
}

/// Tie a replica to an arbitrary inbound target (typically the replica
/// itself, or a [`crate::reconcile::Reconciler`] wrapping it) and an
/// outbound sink (typically a socket writer). Returns the `SinkId` the
/// outbound sink was registered under, so the caller can `off` it on
/// disconnect.
pub fn tie_outbound(replica: &Arc<Replica>, outbound: Arc<dyn Sink>) -> SinkId {
    replica.on(outbound)
}

/// Deliver an op that arrived from outside (e.g. over a socket) into
/// `target`, marking `sender` as the link it arrived on so `target`'s
/// rebroadcast doesn't reflect it back.
pub fn deliver_inbound(target: &Arc<dyn OpSink>, op: Op, sender: SinkId) -> Result<(), RgaError> {
    target.receive(op, sender)
}
