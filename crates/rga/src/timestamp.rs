//! Totally ordered operation identifiers.
//!
//! A `Timestamp` packs a monotonically increasing per-replica counter and
//! a replica id into a single integer so that comparing two timestamps as
//! plain integers yields the order the RGA needs: higher counter wins,
//! and ties between timestamps minted in the same tick are broken by
//! replica id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of bits reserved for the replica id portion of a [`Timestamp`].
pub const REPLICA_BITS: u32 = 16;

/// Upper bound (exclusive) on valid replica ids, `2^REPLICA_BITS`.
pub const MAX_REPLICAS: u32 = 1 << REPLICA_BITS;

/// A replica identity, unique among the replicas sharing a document.
pub type ReplicaId = u32;

/// The sentinel identifying the implicit head of a sequence. No real node
/// ever carries this id; it only ever appears as an `after` anchor.
pub const LEFT: Timestamp = Timestamp(-1);

/// `(counter << REPLICA_BITS) | replica_id`, compared as a plain integer.
///
/// Widened to `i64` relative to the 32-bit layout a minimal implementation
/// would use, purely to give the counter more headroom over a long-lived
/// session; the ordering, uniqueness, and sentinel properties are
/// unaffected (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    fn new(counter: u64, replica_id: ReplicaId) -> Self {
        Timestamp(((counter as i64) << REPLICA_BITS) | replica_id as i64)
    }

    /// The replica that minted this timestamp. Meaningless for [`LEFT`].
    pub fn replica_id(self) -> ReplicaId {
        (self.0 & (MAX_REPLICAS as i64 - 1)) as ReplicaId
    }

    /// The counter value this timestamp was minted at.
    pub fn counter(self) -> u64 {
        (self.0 >> REPLICA_BITS) as u64
    }

    pub fn is_left(self) -> bool {
        self == LEFT
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_left() {
            write!(f, "LEFT")
        } else {
            write!(f, "{}@{}", self.counter(), self.replica_id())
        }
    }
}

/// Per-replica counter that mints new timestamps and advances whenever a
/// foreign timestamp with a higher counter is observed, so that every
/// subsequently minted timestamp still sorts after anything this replica
/// has seen.
#[derive(Debug)]
pub struct TimestampClock {
    replica_id: ReplicaId,
    counter: u64,
}

impl TimestampClock {
    pub fn new(replica_id: ReplicaId) -> Option<Self> {
        if replica_id >= MAX_REPLICAS {
            return None;
        }
        Some(TimestampClock {
            replica_id,
            counter: 0,
        })
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Mint a fresh, locally-unique timestamp and advance the counter.
    pub fn tick(&mut self) -> Timestamp {
        self.counter += 1;
        Timestamp::new(self.counter, self.replica_id)
    }

    /// Fold a timestamp observed from elsewhere into the local clock, so
    /// the next locally-minted timestamp still sorts after it.
    pub fn observe(&mut self, other: Timestamp) {
        if other.is_left() {
            return;
        }
        if other.counter() >= self.counter {
            self.counter = other.counter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_prefers_counter_over_replica_id() {
        let a = Timestamp::new(1, 9);
        let b = Timestamp::new(2, 0);
        assert!(a < b);
    }

    #[test]
    fn ordering_breaks_ties_on_replica_id() {
        let a = Timestamp::new(5, 1);
        let b = Timestamp::new(5, 2);
        assert!(a < b);
    }

    #[test]
    fn left_sorts_before_everything_real() {
        let a = Timestamp::new(0, 0);
        assert!(LEFT < a);
    }

    #[test]
    fn clock_advances_on_foreign_observation() {
        let mut clock = TimestampClock::new(0).unwrap();
        let minted = clock.tick();
        assert_eq!(minted.counter(), 1);
        clock.observe(Timestamp::new(10, 7));
        let next = clock.tick();
        assert_eq!(next.counter(), 11);
    }

    #[test]
    fn rejects_out_of_range_replica_id() {
        assert!(TimestampClock::new(MAX_REPLICAS).is_none());
    }
}
