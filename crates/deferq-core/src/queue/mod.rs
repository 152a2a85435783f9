//! Queue module: pending storage, owner index, flush engine, cancellation.
//!
//! A `TaskQueue` is a cheap, cloneable handle (`Rc`) so that tasks can hold
//! it and schedule or cancel work while the queue is flushing them. It is
//! `!Send`: the single-threaded discipline is the synchronization mechanism.
//! Use `driver::QueueDriver` to reach queues from other threads.

mod flush;
mod invoke;
mod record;
mod state;
mod storage;

pub use invoke::ErrorHandler;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::config::{GlobalOptions, QueueOptions};
use crate::domain::{DiagnosticContext, Method, Owner, OwnerKey, QueueId};
use crate::observability::QueueStats;
use record::TaskRecord;
use state::FlushPhase;
use storage::{Dedup, PendingTasks};

/// Identifies a scheduled call for `TaskQueue::cancel`.
///
/// The handle names the queue, the owner and the method; it does not pin a
/// particular record.
#[derive(Clone)]
pub struct TaskHandle {
    queue: QueueId,
    target: Option<Owner>,
    method: Method,
}

impl TaskHandle {
    pub fn queue_id(&self) -> QueueId {
        self.queue
    }

    pub fn target(&self) -> Option<&Owner> {
        self.target.as_ref()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("queue", &self.queue)
            .field("has_target", &self.target.is_some())
            .field("method", &self.method)
            .finish()
    }
}

/// Result of `TaskQueue::cancel`. Not finding anything is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed from the pending sequence.
    Pending,
    /// Neutralized inside the generation currently being flushed.
    InFlight,
    NotFound,
}

impl CancelOutcome {
    pub fn is_cancelled(self) -> bool {
        !matches!(self, CancelOutcome::NotFound)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: PendingTasks,
    phase: FlushPhase,
}

struct Inner {
    id: QueueId,
    name: String,
    options: QueueOptions,
    global: Rc<GlobalOptions>,
    state: RefCell<QueueState>,
}

/// Deferred-task batching queue.
///
/// Borrows of the internal state never outlive a single call, and are never
/// held while user code (tasks, hooks, `Target` methods) runs.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Rc<Inner>,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>, options: QueueOptions, global: Rc<GlobalOptions>) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: QueueId::generate(),
                name: name.into(),
                options,
                global,
                state: RefCell::new(QueueState::default()),
            }),
        }
    }

    pub fn id(&self) -> QueueId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Diagnostic context for the caller's location, with a backtrace when
    /// the global options ask for one.
    #[track_caller]
    pub fn context(&self) -> DiagnosticContext {
        DiagnosticContext::capture(self.inner.global.capture_backtraces)
    }

    /// Append unconditionally.
    pub fn push(
        &self,
        target: Option<Owner>,
        method: impl Into<Method>,
        args: Vec<Value>,
        context: DiagnosticContext,
    ) -> TaskHandle {
        let method = method.into();
        let handle = self.handle(target.clone(), method.clone());
        let offset = self
            .inner
            .state
            .borrow_mut()
            .pending
            .push(TaskRecord::new(target, method, args, context));
        trace!(queue = %self.name(), offset, "task pushed");
        handle
    }

    /// Append unless the same `(owner, method)` is already pending, in which
    /// case the pending record keeps its position and takes the new
    /// arguments and context.
    pub fn push_unique(
        &self,
        target: Option<Owner>,
        method: impl Into<Method>,
        args: Vec<Value>,
        context: DiagnosticContext,
    ) -> TaskHandle {
        let method = method.into();
        let handle = self.handle(target.clone(), method.clone());
        let key = self.owner_key(target.as_ref());
        let dedup = self
            .inner
            .state
            .borrow_mut()
            .pending
            .push_unique(TaskRecord::new(target, method, args, context), key);
        match dedup {
            Dedup::Appended(offset) => trace!(queue = %self.name(), offset, "unique task pushed"),
            Dedup::Replaced(offset) => trace!(queue = %self.name(), offset, "unique task replaced in place"),
        }
        handle
    }

    /// Cancel a scheduled call.
    ///
    /// Looks in the pending sequence first (owner index, then registration
    /// order) and removes the record. Otherwise neutralizes the first
    /// matching record of the generation being flushed, leaving the snapshot
    /// the same length.
    pub fn cancel(&self, handle: &TaskHandle) -> CancelOutcome {
        if handle.queue != self.inner.id {
            trace!(queue = %self.name(), foreign = %handle.queue, "cancel with a handle from another queue");
            return CancelOutcome::NotFound;
        }

        let key = self.owner_key(handle.target.as_ref());
        let mut state = self.inner.state.borrow_mut();
        let removed = state
            .pending
            .cancel(handle.target.as_ref(), &handle.method, key.as_ref());

        let outcome = if removed.is_some() {
            CancelOutcome::Pending
        } else if state.phase.neutralize(handle.target.as_ref(), &handle.method) {
            CancelOutcome::InFlight
        } else {
            CancelOutcome::NotFound
        };
        // Dropping the removed record may release the last owner reference;
        // do it outside the borrow.
        drop(state);
        drop(removed);

        trace!(queue = %self.name(), ?outcome, "cancel");
        outcome
    }

    /// Number of pending records (not counting a generation in flight).
    pub fn len(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().pending.is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.state.borrow().phase.is_flushing()
    }

    /// Whether `(target, method)` is pending.
    pub fn has_pending(&self, target: Option<&Owner>, method: &Method) -> bool {
        self.inner
            .state
            .borrow()
            .pending
            .position(target, method)
            .is_some()
    }

    /// Arguments of the first pending `(target, method)` record.
    pub fn pending_args(&self, target: Option<&Owner>, method: &Method) -> Option<Vec<Value>> {
        let state = self.inner.state.borrow();
        let offset = state.pending.position(target, method)?;
        state.pending.args(offset).map(<[Value]>::to_vec)
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.borrow();
        QueueStats {
            pending: state.pending.len(),
            in_flight: state.phase.in_flight(),
            indexed_owners: state.pending.indexed_owners(),
            flushing: state.phase.is_flushing(),
        }
    }

    fn handle(&self, target: Option<Owner>, method: Method) -> TaskHandle {
        TaskHandle {
            queue: self.inner.id,
            target,
            method,
        }
    }

    /// `Target::identity` is user code, so it is called before borrowing state.
    fn owner_key(&self, target: Option<&Owner>) -> Option<OwnerKey> {
        if !self.inner.global.use_owner_index {
            return None;
        }
        target.and_then(|t| t.identity())
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing;
