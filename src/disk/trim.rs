//! The background trim/compaction task and its executor abstraction.
//!
//! Spec §4.5 / §9: "model as submitting a unit-of-work to an injected
//! executor abstraction... for single-threaded runtimes, fold the cleanup
//! into the next public op." We take the same shape the teacher uses to keep
//! I/O testable without an async runtime (`variants/disk_v2/io.rs`'s
//! `Filesystem` trait abstraction), applied here to task submission instead.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Accepts a cleanup closure for execution. The cache submits a unit of work
/// after any operation that may have pushed `size` past `max_size` or
/// `redundant_op_count` past its threshold (spec §4.5).
pub trait TrimExecutor: Send + Sync + 'static {
    fn submit(&self, task: Box<dyn FnOnce() + Send>);
}

/// A single-worker executor backed by OS threads, bounded so at most one
/// trim runs at a time — extra submissions while one is running are dropped,
/// since the task re-checks all conditions under the cache lock when it does
/// run (spec §4.5: "idempotent and coalescable").
#[derive(Default)]
pub struct ThreadTrimExecutor {
    running: Arc<AtomicBool>,
}

impl ThreadTrimExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrimExecutor for ThreadTrimExecutor {
    fn submit(&self, task: Box<dyn FnOnce() + Send>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let running = Arc::clone(&self.running);
        std::thread::spawn(move || {
            task();
            running.store(false, Ordering::Release);
        });
    }
}

/// Runs the submitted task synchronously on the calling thread. Useful for
/// tests and single-threaded hosts (spec §9).
pub struct InlineTrimExecutor;

impl TrimExecutor for InlineTrimExecutor {
    fn submit(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}
