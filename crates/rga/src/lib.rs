// Replicated Growable Array (RGA) core for a collaborative plain-text
// editor, plus the diffing and editor-reconciliation layers that make it
// usable behind a live text widget.
//
// Based on "Replicated Abstract Data Types: Building Blocks for
// Collaborative Applications" by Roh et al., 2011.

pub mod bus;
pub mod diff;
pub mod editor;
pub mod error;
pub mod node;
pub mod op;
pub mod reconcile;
pub mod replica;
pub mod timestamp;
pub mod transport;

pub use bus::{ManualQueue, Sink, SinkId, SubscriptionBus, TaskQueue, TokioQueue};
pub use diff::{diff as diff_text, Patch, PatchOp};
pub use editor::{ChangeHandler, EditorHandle, TerminalEditor};
pub use error::RgaError;
pub use op::Op;
pub use reconcile::Reconciler;
pub use replica::{OpSink, Replica, RowCol};
pub use timestamp::{ReplicaId, Timestamp, TimestampClock, LEFT, MAX_REPLICAS};
pub use transport::{deliver_inbound, tie, tie_outbound};
