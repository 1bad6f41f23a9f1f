//! The two operations an RGA sequence supports, and the form they take
//! once they leave the replica that created them.

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// An operation as broadcast to subscribers or replayed from history.
///
/// `AddRight` names the predecessor it was inserted after (`after`), the
/// timestamp minted for the new node (`id`), and the character it carries.
/// `Remove` names the timestamp of the node being tombstoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    AddRight {
        after: Timestamp,
        id: Timestamp,
        atom: char,
    },
    Remove {
        target: Timestamp,
    },
}

impl Op {
    /// The timestamp this op is "about" — the node it creates or removes.
    pub fn subject(&self) -> Timestamp {
        match self {
            Op::AddRight { id, .. } => *id,
            Op::Remove { target } => *target,
        }
    }
}
