//! Arena-style node storage. Each node is keyed by its own [`Timestamp`]
//! in the replica's index; the sequence order is carried by `next`
//! pointers that are themselves timestamps rather than references, so the
//! whole structure lives happily in a plain `HashMap` (see spec.md §9's
//! "represent the next pointer as a timestamp, not a reference" note).

use crate::timestamp::Timestamp;

#[derive(Debug, Clone)]
pub struct Node {
    pub atom: char,
    pub removed: bool,
    pub next: Option<Timestamp>,
}

impl Node {
    pub fn new(atom: char) -> Self {
        Node {
            atom,
            removed: false,
            next: None,
        }
    }
}
