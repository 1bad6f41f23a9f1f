//! Wire messages exchanged between the central server replica and a
//! connected client, per the minimal transport spec: a one-shot
//! `welcome` handshake followed by a stream of `downstream` op messages.

use rga::{Op, ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};

/// An [`Op`] as it crosses the wire. `t` is spec.md §6's literal wire
/// field name for the predecessor/target timestamp; the new node's own
/// id and atom are nested under `w` for an insert. Mirrors `Op` one to
/// one — kept as a distinct type (rather than reusing `Op`'s own
/// `Serialize` derive directly as the outer message) so the wire schema
/// can evolve independently of the in-memory op representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownstreamMessage {
    #[serde(rename = "addRight")]
    AddRight {
        t: Timestamp,
        w: WireNode,
    },
    #[serde(rename = "remove")]
    Remove { t: Timestamp },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode {
    pub timestamp: Timestamp,
    pub atom: char,
}

impl From<Op> for DownstreamMessage {
    fn from(op: Op) -> Self {
        match op {
            Op::AddRight { after, id, atom } => DownstreamMessage::AddRight {
                t: after,
                w: WireNode { timestamp: id, atom },
            },
            Op::Remove { target } => DownstreamMessage::Remove { t: target },
        }
    }
}

impl From<DownstreamMessage> for Op {
    fn from(msg: DownstreamMessage) -> Self {
        match msg {
            DownstreamMessage::AddRight { t, w } => Op::AddRight {
                after: t,
                id: w.timestamp,
                atom: w.atom,
            },
            DownstreamMessage::Remove { t } => Op::Remove { target: t },
        }
    }
}

/// Sent once by the server immediately after a websocket upgrade: the
/// client's newly assigned id and the full history needed to bootstrap a
/// replica via `Replica::from_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub id: ReplicaId,
    pub history: Vec<Op>,
}
