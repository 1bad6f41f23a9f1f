//! Subscription bus: fan-out of locally-applied ops to interested sinks,
//! with the sender excluded from its own broadcast so a transport adapter
//! never gets an op echoed straight back to where it came from.
//!
//! Grounded on `Room::broadcast`/`Room::broadcast_except` in the teacher's
//! server crate, generalized from "room full of websocket clients" down to
//! "ordered list of sinks".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use parking_lot::RwLock;

use crate::op::Op;

pub type SinkId = u64;

/// Something that wants to be told about ops as they're applied.
pub trait Sink: Send + Sync {
    fn deliver(&self, op: Op);
}

/// A capability to run a unit of work "later" rather than inline with the
/// call that produced it, so a local mutation doesn't synchronously
/// re-enter its own subscribers. See spec.md §9's task queue design note.
pub trait TaskQueue: Send + Sync {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>);
}

/// A FIFO queue drained on demand. Used by tests that need full control
/// over delivery interleaving.
#[derive(Default)]
pub struct ManualQueue {
    tasks: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every currently-queued task, including ones newly scheduled by
    /// tasks that ran earlier in this drain.
    pub fn drain(&self) {
        loop {
            let next = self.tasks.lock().unwrap().pop_front();
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty()
    }
}

impl TaskQueue for ManualQueue {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>) {
        self.tasks.lock().unwrap().push_back(task);
    }
}

type BoxedTask = Box<dyn FnOnce() + Send>;

/// Schedules work onto the ambient tokio runtime, preserving FIFO order
/// (spec.md §9: "runs the task exactly once, in FIFO order, no sooner
/// than after the current task returns"). Spawning each scheduled task as
/// its own independent `tokio::spawn` would not do this — on a
/// multi-threaded runtime, two tasks spawned back to back can be picked
/// up by different worker threads and finish in either order, which
/// would let a broadcast to the same sink arrive out of the order it was
/// applied locally (spec.md §5's per-subscriber ordering contract).
/// Instead, one background task drains a FIFO channel and runs every
/// task serially. The drain task is spawned lazily, on the first call to
/// `schedule`, rather than in `new` — constructing a `Replica` (and thus
/// a `TokioQueue`) must not itself require an active tokio runtime; only
/// actually broadcasting something does.
pub struct TokioQueue {
    tx: tokio::sync::mpsc::UnboundedSender<BoxedTask>,
    rx: Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<BoxedTask>>>,
    started: AtomicBool,
}

impl TokioQueue {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<BoxedTask>();
        TokioQueue {
            tx,
            rx: Mutex::new(Some(rx)),
            started: AtomicBool::new(false),
        }
    }

    fn ensure_drain_task_started(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut rx) = self.rx.lock().unwrap().take() {
            tokio::spawn(async move {
                while let Some(task) = rx.recv().await {
                    task();
                }
            });
        }
    }
}

impl Default for TokioQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue for TokioQueue {
    fn schedule(&self, task: BoxedTask) {
        self.ensure_drain_task_started();
        // An error here means the drain task's receiver was dropped,
        // which only happens if the drain task itself panicked; there is
        // nothing left to deliver to in that case.
        let _ = self.tx.send(task);
    }
}

struct Subscriber {
    id: SinkId,
    sink: Arc<dyn Sink>,
}

pub struct SubscriptionBus {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
    queue: Arc<dyn TaskQueue>,
}

impl SubscriptionBus {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        SubscriptionBus {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
            queue,
        }
    }

    /// Register a sink, returning the id to later pass as `sender` when
    /// delivering ops that arrived through this same sink, and to `off`
    /// it when it goes away.
    pub fn on(&self, sink: Arc<dyn Sink>) -> SinkId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber { id, sink });
        id
    }

    pub fn off(&self, id: SinkId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    /// Deliver `op` to every subscriber except `sender` (if any). Delivery
    /// is scheduled onto the task queue rather than run inline.
    pub fn broadcast(&self, op: Op, sender: Option<SinkId>) {
        let targets: Vec<Arc<dyn Sink>> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| Some(s.id) != sender)
            .map(|s| s.sink.clone())
            .collect();
        for sink in targets {
            let op = op;
            self.queue.schedule(Box::new(move || sink.deliver(op)));
        }
    }
}
