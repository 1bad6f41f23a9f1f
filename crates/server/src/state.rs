//! Server-wide state: the single central replica (id 0) and the counter
//! handing out client ids, as owned fields of a plain struct rather than
//! ad-hoc global statics (spec.md §9's "make them owned fields of a
//! `Server` structure" design note).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rga::{Replica, ReplicaId, TokioQueue, MAX_REPLICAS};

pub const CENTRAL_REPLICA_ID: ReplicaId = 0;

#[derive(Clone)]
pub struct ServerState {
    pub replica: Arc<Replica>,
    next_client_id: Arc<AtomicU32>,
}

impl ServerState {
    pub fn new() -> Self {
        let replica = Replica::with_queue(CENTRAL_REPLICA_ID, Arc::new(TokioQueue::new()))
            .expect("replica id 0 is always valid");
        tracing::info!("central replica constructed");
        ServerState {
            replica: Arc::new(replica),
            // Client ids start at 1: 0 is reserved for the central replica.
            next_client_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Mint the next unique positive client id, or `None` once the
    /// `[0, MAX_REPLICAS)` space `TimestampClock`/`Replica` enforce
    /// (spec.md §4.1) is exhausted — the server must refuse the
    /// connection rather than hand out an id a client's own replica
    /// construction would then reject.
    pub fn next_client_id(&self) -> Option<ReplicaId> {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        if id >= MAX_REPLICAS {
            None
        } else {
            Some(id)
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
