// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The executor seam.
//!
//! The core never blocks internally; every backpressure-dropping swap
//! strategy and the publisher's async dispatch mode hand their deferred work
//! to an `Executor`. The core treats executors as opaque task sinks — no
//! coroutines, no queueing contract beyond "eventually runs `task`".

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A capability to run a boxed task, possibly on another thread.
///
/// Implementations must not assume tasks run in submission order; the
/// version-race cancellation built into the source/back/compute swap
/// strategies tolerates reordering and even task loss.
pub trait Executor: Send + Sync {
    /// Schedules `task` for execution. May run inline or be deferred.
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// The default executor: runs tasks synchronously on the calling thread.
///
/// Suitable for tests and single-threaded callers; under real contention an
/// inline executor defeats the point of deferring emissions, but it keeps
/// the backpressure-drop version-race logic exercised without requiring a
/// thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// Adapter that spawns tasks onto a `tokio` runtime handle.
#[cfg(feature = "tokio-executor")]
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio-executor")]
impl TokioExecutor {
    /// Wraps a runtime handle as an [`Executor`].
    #[must_use]
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

#[cfg(feature = "tokio-executor")]
impl Executor for TokioExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        self.handle.spawn_blocking(task);
    }
}

/// Compresses concurrent dispatch requests so that only the highest pending
/// version actually enters the executor.
///
/// Used by [`crate::publisher::Publisher`]'s async dispatch mode: many
/// threads may race to publish a new cache version, but only one dispatch
/// task per "wave" needs to run, and it should observe the latest version
/// available when it actually runs rather than the version that triggered it.
pub struct VersionedExecutor {
    pending: Arc<AtomicU64>,
    /// Gates entry into the executor: at most one dispatch task may be
    /// in flight at a time. Without this, every caller whose watermark CAS
    /// lands would also enqueue its own executor task, and concurrent tasks
    /// would race each other's `run()` rather than collapsing into one.
    busy: Arc<AtomicBool>,
    executor: Arc<dyn Executor>,
}

impl VersionedExecutor {
    /// Wraps `executor` with pending-version compression.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { pending: Arc::new(AtomicU64::new(0)), busy: Arc::new(AtomicBool::new(false)), executor }
    }

    /// Requests a dispatch for `version`. If another version is already
    /// pending or in flight, this call only needs to bump the watermark: the
    /// in-flight task re-reads the watermark before finishing and
    /// reschedules itself if it is stale.
    ///
    /// `run` is invoked with no arguments once this call wins the race to
    /// enter the executor; it returns the version it actually dispatched so
    /// the compression loop can detect staleness.
    pub fn request(&self, version: u64, run: impl Fn() -> u64 + Send + Sync + 'static) {
        let mut observed = self.pending.load(Ordering::Acquire);
        loop {
            if observed >= version {
                return;
            }
            match self.pending.compare_exchange_weak(
                observed,
                version,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }

        if self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            // A task is already draining and will observe this watermark bump
            // on its next iteration; no second task is needed.
            return;
        }

        let pending = Arc::clone(&self.pending);
        let busy = Arc::clone(&self.busy);
        self.executor.execute(Box::new(move || loop {
            let dispatched = run();
            let watermark = pending.load(Ordering::Acquire);
            if watermark <= dispatched {
                busy.store(false, Ordering::Release);
                // A racer may have bumped `pending` after the load above but
                // before `busy` cleared, and then lost the re-entry CAS below
                // because `busy` still read `true`. Re-check once more before
                // giving up the slot for good, or the bump is a lost wakeup.
                if pending.load(Ordering::Acquire) <= dispatched
                    || busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
                {
                    return;
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    struct CountingExecutor {
        inline: InlineExecutor,
        invocations: AtomicUsize,
    }

    impl Executor for CountingExecutor {
        fn execute(&self, task: Box<dyn FnOnce() + Send>) {
            self.invocations.fetch_add(1, Ordering::AcqRel);
            self.inline.execute(task);
        }
    }

    #[test]
    fn single_request_dispatches_once_with_its_version() {
        let executor = Arc::new(CountingExecutor { inline: InlineExecutor, invocations: AtomicUsize::new(0) });
        let versioned = VersionedExecutor::new(Arc::clone(&executor) as Arc<dyn Executor>);
        let seen = Arc::new(AtomicU64::new(0));
        let s = Arc::clone(&seen);
        versioned.request(5, move || {
            s.store(5, Ordering::Release);
            5
        });
        assert_eq!(executor.invocations.load(Ordering::Acquire), 1);
        assert_eq!(seen.load(Ordering::Acquire), 5);
    }

    #[test]
    fn concurrent_requests_collapse_to_one_in_flight_task() {
        // A blocking executor that holds the admitted task until every racing
        // `request` call has already returned, so the single admitted task is
        // forced to observe the highest version before it can exit. All 16
        // calls share the same `run` closure (reading a common piece of
        // external state, as `Publisher::deliver_latest` does), which is the
        // realistic shape: `run` must re-read fresh state each invocation,
        // not close over a value fixed at its own call site.
        struct BlockingExecutor {
            barrier: Arc<Barrier>,
        }
        impl Executor for BlockingExecutor {
            fn execute(&self, task: Box<dyn FnOnce() + Send>) {
                self.barrier.wait();
                task();
            }
        }

        // 16 racing threads, each waiting on the barrier after its own
        // `request` call returns; the one that won entry into the executor
        // waits on the same barrier from inside `BlockingExecutor::execute`
        // instead, before running its task.
        let barrier = Arc::new(Barrier::new(16));
        let executor = Arc::new(BlockingExecutor { barrier: Arc::clone(&barrier) });
        let versioned = Arc::new(VersionedExecutor::new(executor as Arc<dyn Executor>));
        let runs = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicU64::new(0));
        let run = {
            let runs = Arc::clone(&runs);
            let current = Arc::clone(&current);
            move || {
                runs.fetch_add(1, Ordering::AcqRel);
                current.load(Ordering::Acquire)
            }
        };

        std::thread::scope(|scope| {
            for version in 1..=16u64 {
                let versioned = Arc::clone(&versioned);
                let barrier = Arc::clone(&barrier);
                let current = Arc::clone(&current);
                let run = run.clone();
                scope.spawn(move || {
                    current.fetch_max(version, Ordering::AcqRel);
                    versioned.request(version, run);
                    barrier.wait();
                });
            }
        });

        // Exactly one `request` call won the `busy` CAS and actually entered
        // the executor; the rest only bumped the watermark.
        assert_eq!(runs.load(Ordering::Acquire), 1, "only one task should have entered the executor");
        assert_eq!(current.load(Ordering::Acquire), 16, "the admitted task must observe the highest requested version");
    }
}
