//! Flush engine: Idle -> Flushing -> Idle, one generation at a time.

use tracing::{debug, debug_span};

use super::invoke::{Invocation, InvokeError, Invoker};
use super::state::FlushPhase;
use super::TaskQueue;
use crate::error::QueueError;
use crate::observability::FlushStats;

/// Returns the queue to Idle when a pass ends, including early returns and
/// unwinding out of a panicking task. Unrun records are dropped with the
/// snapshot.
struct FlushGuard<'a> {
    queue: &'a TaskQueue,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.queue.inner.state.try_borrow_mut() {
            let snapshot = std::mem::take(&mut state.phase);
            drop(state);
            drop(snapshot);
        }
    }
}

impl TaskQueue {
    /// Drain the pending sequence.
    ///
    /// With `continue_if_more`, work scheduled during a pass is drained by
    /// further passes before returning. Without it, exactly one pass runs and
    /// new work stays pending.
    ///
    /// Without an error handler the first task failure aborts the pass and
    /// is returned; the rest of that generation is dropped. With a handler,
    /// failures are reported and the pass goes on. Calling `flush` from a
    /// task of the same queue returns `QueueError::AlreadyFlushing`.
    pub fn flush(&self, continue_if_more: bool) -> Result<FlushStats, QueueError> {
        let _span = debug_span!("flush", queue = %self.name()).entered();
        let mut stats = FlushStats::default();

        while self.flush_generation(&mut stats)? {
            if !continue_if_more {
                break;
            }
        }

        if stats.generations > 0 {
            debug!(
                generations = stats.generations,
                invoked = stats.invoked,
                skipped = stats.skipped,
                isolated_failures = stats.isolated_failures,
                "flush complete"
            );
        }
        Ok(stats)
    }

    /// One pass over one generation. Returns `false` if there was nothing to do.
    fn flush_generation(&self, stats: &mut FlushStats) -> Result<bool, QueueError> {
        let len = {
            let mut state = self.inner.state.borrow_mut();
            if state.phase.is_flushing() {
                return Err(QueueError::AlreadyFlushing {
                    queue: self.name().to_string(),
                });
            }
            if state.pending.is_empty() {
                return Ok(false);
            }
            let snapshot = state.pending.take();
            let len = snapshot.len();
            state.phase = FlushPhase::flushing(snapshot);
            len
        };
        let _guard = FlushGuard { queue: self };

        let invoker = Invoker::select(self.inner.global.on_error.as_ref());
        debug!(
            generation = stats.generations + 1,
            tasks = len,
            isolating = invoker.is_isolating(),
            "flushing generation"
        );

        if let Some(before) = &self.inner.options.before {
            before();
        }

        for offset in 0..len {
            let record = self.inner.state.borrow_mut().phase.claim(offset);
            let Some(record) = record else {
                debug!(offset, "skipping cancelled task");
                stats.skipped += 1;
                continue;
            };
            let Some(callback) = record.resolve() else {
                debug!(offset, method = ?record.method, "skipping unresolved task");
                stats.skipped += 1;
                continue;
            };

            let target = record.target.as_deref();
            match invoker.invoke(&callback, target, &record.args, &record.context) {
                Ok(Invocation::Completed) => stats.invoked += 1,
                Ok(Invocation::Isolated) => {
                    stats.invoked += 1;
                    stats.isolated_failures += 1;
                }
                Err(InvokeError::Task(source)) => {
                    return Err(QueueError::TaskFailed {
                        queue: self.name().to_string(),
                        source,
                        context: record.context,
                    });
                }
                Err(InvokeError::Handler(source)) => {
                    return Err(QueueError::HandlerFailed {
                        queue: self.name().to_string(),
                        source,
                    });
                }
            }
        }

        if let Some(after) = &self.inner.options.after {
            after();
        }

        stats.generations += 1;
        Ok(true)
    }
}
