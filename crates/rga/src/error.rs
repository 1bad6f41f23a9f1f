//! Error taxonomy for the RGA core.
//!
//! Mirrors the two-tier policy the sequence algorithm relies on: mistakes a
//! caller makes against the local API (`PreconditionViolated`) are
//! recoverable and the caller's fault; anything that indicates causality
//! was actually lost (`UnknownReference`, `SyncDrift`) is not.

use thiserror::Error;

use crate::timestamp::Timestamp;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RgaError {
    /// A local `addRight`/`remove` call violated its synchronous
    /// precondition (anchor not present, anchor already removed, or
    /// target already removed). Caller bug; safe to ignore the op and
    /// keep running.
    #[error("precondition violated: {0}")]
    PreconditionViolated(String),

    /// A downstream op named a timestamp this replica has never seen and
    /// cannot resolve. Indicates causality was lost upstream (e.g. a
    /// dropped or reordered-past-its-dependency message) and is treated as
    /// fatal for the affected replica.
    #[error("unknown reference: {0}")]
    UnknownReference(Timestamp),

    /// The reconciliation layer's invariant that `lastText` always equals
    /// `replica.text()` failed to hold. Indicates a bug in the
    /// reconciliation layer itself, not in caller usage.
    #[error("sync drift: {0}")]
    SyncDrift(String),

    /// A replica was constructed with a replica id outside the valid
    /// range.
    #[error("invalid replica id: {0}")]
    InvalidReplicaId(u32),
}
