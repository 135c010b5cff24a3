// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The publisher: the outward-facing subscription surface of a
//! [`Path`](crate::path::Path) — what `Path::add`/`remove`/`contains` are
//! actually built on, distinct from the internal
//! [`crate::receivers::ReceiversManager`] edges use to subscribe to a parent.
//! A publisher's own subscriber count is a demand source in its own right:
//! its transitions drive the owning path's activator exactly as a child
//! edge's would (see [`crate::path::Path::from_parts`]).
//!
//! Subscribers are delivered each version of a cache's value at most once,
//! in strictly increasing version order per subscriber, using the same
//! copy-on-write array primitive as the receivers manager. Delivery can run
//! synchronously on the publishing thread or be deferred through a
//! [`VersionedExecutor`] (see [`Publisher::use_executor`]), which collapses a
//! burst of publishes down to the latest version actually worth delivering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::cow::CowArray;
use crate::executor::{Executor, VersionedExecutor};
use crate::versioned::Versioned;

/// A subscriber callback, handed the newly published value by reference.
pub type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscription<T> {
    callback: Subscriber<T>,
    /// Guards both the watermark check and the callback invocation as one
    /// critical section. A lock-free CAS on the watermark alone would admit
    /// two racing deliveries in increasing version order but let their
    /// callback invocations run in the opposite order; serializing the
    /// check-and-invoke under this lock keeps the two in lockstep, so the
    /// sequence of values this subscriber actually observes is the same
    /// strictly-increasing order the watermark admits.
    last_delivered: Mutex<u64>,
}

impl<T> Subscription<T> {
    fn new(callback: Subscriber<T>) -> Self {
        Self { callback, last_delivered: Mutex::new(0) }
    }

    /// Delivers `value` iff its version is newer than the last one this
    /// subscriber actually received. Returns whether delivery happened.
    fn deliver(&self, value: &Versioned<T>) -> bool {
        let incoming = value.version();
        let mut last = self.last_delivered.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if incoming <= *last {
            return false;
        }
        *last = incoming;
        if let Some(v) = value.value() {
            (self.callback)(v);
        }
        true
    }
}

type DemandHook = dyn Fn(bool) + Send + Sync;

/// The outward subscriber list for a path's published values.
///
/// Dispatch runs synchronously on the publishing thread until a caller
/// upgrades it to asynchronous delivery through [`Publisher::use_executor`]
/// (or constructs one directly with [`Publisher::new_async`]), at which
/// point publishes are compressed through a [`VersionedExecutor`] instead.
pub struct Publisher<T> {
    subscriptions: CowArray<Arc<Subscription<T>>>,
    executor: ArcSwapOption<VersionedExecutor>,
    /// Tracks the freshest value handed to [`Publisher::publish`], monotonic
    /// by version. Only meaningful once an executor is installed: the
    /// compressed dispatch task reads this at the moment it actually runs
    /// rather than closing over whichever call happened to enqueue it, so a
    /// version bump that arrives after the task already entered the executor
    /// is still the one actually delivered.
    latest: ArcSwap<Versioned<T>>,
    has_demand: AtomicBool,
    demand_hook: ArcSwapOption<DemandHook>,
}

impl<T: Send + Sync + 'static> Publisher<T> {
    /// Creates a publisher that delivers synchronously.
    #[must_use]
    pub fn new_sync() -> Self {
        Self {
            subscriptions: CowArray::default(),
            executor: ArcSwapOption::from(None),
            latest: ArcSwap::from_pointee(Versioned::default()),
            has_demand: AtomicBool::new(false),
            demand_hook: ArcSwapOption::from(None),
        }
    }

    /// Creates a publisher that defers delivery through `executor`,
    /// compressing concurrent publish bursts via [`VersionedExecutor`].
    #[must_use]
    pub fn new_async(executor: Arc<dyn Executor>) -> Self {
        Self {
            subscriptions: CowArray::default(),
            executor: ArcSwapOption::from(Some(Arc::new(VersionedExecutor::new(executor)))),
            latest: ArcSwap::from_pointee(Versioned::default()),
            has_demand: AtomicBool::new(false),
            demand_hook: ArcSwapOption::from(None),
        }
    }

    /// Switches this publisher to asynchronous dispatch through `executor`.
    /// A no-op if this publisher already has an executor installed — a
    /// `Path` may be asked for its publisher with an executor more than
    /// once, and only the first caller's executor should win.
    pub fn use_executor(&self, executor: Arc<dyn Executor>) {
        if self.executor.load().is_some() {
            return;
        }
        let _ = self.executor.compare_and_swap(&Option::<Arc<VersionedExecutor>>::None, Some(Arc::new(VersionedExecutor::new(executor))));
    }

    /// Binds `hook` to run on every demand transition this publisher's
    /// subscriber count makes: `true` the moment the first subscriber
    /// registers, `false` the moment the last one leaves. Bound once, at
    /// construction time, by [`crate::path::Path::from_parts`] — the same
    /// "wire a callback onto shared state right after building it" idiom as
    /// [`crate::cache::Cache::bind_dispatch`].
    pub(crate) fn bind_demand_hook(&self, hook: impl Fn(bool) + Send + Sync + 'static) {
        self.demand_hook.store(Some(Arc::new(hook)));
    }

    fn fire_demand_hook(&self, demand: bool) {
        if let Some(hook) = self.demand_hook.load_full() {
            hook(demand);
        }
    }

    /// Registers `callback` as a subscriber. Returns whether this was the
    /// first subscriber, i.e. whether this call transitioned the publisher
    /// from no demand to demand.
    pub fn subscribe(&self, callback: Subscriber<T>) -> bool {
        let subscription = Arc::new(Subscription::new(callback));
        self.subscriptions.push(subscription);
        let became_demand = !self.has_demand.swap(true, Ordering::AcqRel);
        if became_demand {
            self.fire_demand_hook(true);
        }
        became_demand
    }

    /// Removes the subscription whose callback is referentially equal to
    /// `callback`. Returns whether a matching subscription was found.
    pub fn unsubscribe(&self, callback: &Subscriber<T>) -> bool {
        let outcome = self.subscriptions.remove_first(|s| Arc::ptr_eq(&s.callback, callback));
        if outcome.removed && outcome.became_empty {
            self.has_demand.store(false, Ordering::Release);
            self.fire_demand_hook(false);
        }
        outcome.removed
    }

    /// Returns whether `callback` is currently registered as a subscriber.
    #[must_use]
    pub fn contains(&self, callback: &Subscriber<T>) -> bool {
        self.subscriptions.snapshot().iter().any(|s| Arc::ptr_eq(&s.callback, callback))
    }

    /// Returns the number of currently registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns whether there are no currently registered subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> {
    /// Publishes `value` to every current subscriber.
    ///
    /// With no executor installed this delivers inline before returning.
    /// Once an executor is installed, this only records `value` as the
    /// latest and requests a dispatch; the actual delivery may run on
    /// another thread and re-reads whatever is latest at the moment it
    /// runs, so a burst of rapid publishes collapses to delivering only the
    /// newest version once per subscriber rather than one stale snapshot
    /// per racing call.
    pub fn publish(self: Arc<Self>, value: Arc<Versioned<T>>) {
        match self.executor.load_full() {
            None => {
                for subscription in self.subscriptions.snapshot().iter() {
                    subscription.deliver(&value);
                }
            }
            Some(executor) => {
                let version = value.version();
                self.store_latest(value);
                let publisher = Arc::clone(&self);
                executor.request(version, move || publisher.deliver_latest());
            }
        }
    }

    /// Installs `value` as `latest` iff it is newer than what is currently
    /// recorded, retrying under contention. A stale arrival (delivered out of
    /// order relative to another publishing thread) is silently dropped.
    fn store_latest(&self, value: Arc<Versioned<T>>) {
        loop {
            let current = self.latest.load_full();
            if value.version() <= current.version() {
                return;
            }
            let prev = self.latest.compare_and_swap(&current, Arc::clone(&value));
            if Arc::ptr_eq(&prev, &current) {
                return;
            }
        }
    }

    /// Delivers whatever is currently `latest` to every subscriber. Returns
    /// the version delivered, so [`VersionedExecutor`]'s compression loop can
    /// detect whether a newer publish arrived while this ran.
    fn deliver_latest(&self) -> u64 {
        let current = self.latest.load_full();
        for subscription in self.subscriptions.snapshot().iter() {
            subscription.deliver(&current);
        }
        current.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InlineExecutor;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn sync_publish_delivers_each_version_once_per_subscriber() {
        let publisher: Arc<Publisher<i32>> = Arc::new(Publisher::new_sync());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let callback: Subscriber<i32> = Arc::new(move |v| s.lock().expect("lock").push(*v));
        publisher.subscribe(Arc::clone(&callback));

        Arc::clone(&publisher).publish(Arc::new(Versioned::default().new_value(1)));
        Arc::clone(&publisher).publish(Arc::new(Versioned::default().new_value(1).new_value(2)));
        // Replaying an already-delivered version is a no-op.
        Arc::clone(&publisher).publish(Arc::new(Versioned::at_version(99, 1)));

        assert_eq!(*seen.lock().expect("lock"), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_future_delivery() {
        let publisher: Arc<Publisher<i32>> = Arc::new(Publisher::new_sync());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let callback: Subscriber<i32> = Arc::new(move |_| {
            c.fetch_add(1, Ordering::AcqRel);
        });
        publisher.subscribe(Arc::clone(&callback));
        Arc::clone(&publisher).publish(Arc::new(Versioned::default().new_value(1)));
        assert!(publisher.unsubscribe(&callback));
        Arc::clone(&publisher).publish(Arc::new(Versioned::default().new_value(1).new_value(2)));
        assert_eq!(calls.load(Ordering::Acquire), 1);
    }

    #[test]
    fn async_publish_compresses_to_latest_version() {
        let publisher: Arc<Publisher<i32>> = Arc::new(Publisher::new_async(Arc::new(InlineExecutor)));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        publisher.subscribe(Arc::new(move |v| s.lock().expect("lock").push(*v)));
        Arc::clone(&publisher).publish(Arc::new(Versioned::default().new_value(10)));
        assert_eq!(*seen.lock().expect("lock"), vec![10]);
    }

    #[test]
    fn async_publish_delivers_newest_value_even_when_its_task_enqueues_first() {
        // A blocking executor models the race the inline executor can't: the
        // first `publish` wins the dispatch slot and is held until a second,
        // newer `publish` has already landed and updated `latest`.
        struct HoldUntil {
            released: Arc<std::sync::atomic::AtomicBool>,
        }
        impl Executor for HoldUntil {
            fn execute(&self, task: Box<dyn FnOnce() + Send>) {
                while !self.released.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }
                task();
            }
        }

        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let executor = Arc::new(HoldUntil { released: Arc::clone(&released) });
        let publisher: Arc<Publisher<i32>> = Arc::new(Publisher::new_async(executor));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        publisher.subscribe(Arc::new(move |v| s.lock().expect("lock").push(*v)));

        std::thread::scope(|scope| {
            let first = Arc::clone(&publisher);
            scope.spawn(move || {
                first.publish(Arc::new(Versioned::default().new_value(1)));
            });
            // Give the first publish a head start so it is the one that wins
            // entry into the (blocked) executor.
            std::thread::sleep(std::time::Duration::from_millis(10));
            Arc::clone(&publisher).publish(Arc::new(Versioned::default().new_value(1).new_value(2)));
            released.store(true, Ordering::Release);
        });

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![2],
            "the compressed dispatch must deliver the newest value, not a stale snapshot from whichever call enqueued it"
        );
    }
}
