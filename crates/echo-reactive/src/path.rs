// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `Path<T>`: a node in the dataflow DAG — one cache, one demand-tracking
//! receivers manager, one activator, and an optional externally-assigned
//! [`Ref`].
//!
//! Construction (`map`, `switch_map`, `join`, ...) lives in [`crate::propagator`];
//! this module owns the node's identity, lifecycle accessors, and the
//! observer/publisher surface applications actually call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;

use crate::activator::{ActivationOwner, Gsa};
use crate::cache::Cache;
use crate::error::ReactiveError;
use crate::executor::Executor;
use crate::publisher::{Publisher, Subscriber};
use crate::receivers::ReceiversManager;
use crate::state::StateValue;

/// An opaque, process-unique identifier an application can assign to a
/// [`Path`] to recover it from outside the dataflow graph.
///
/// Generated from a process-local monotonic counter folded with a one-time
/// startup salt, so ids are unique within a process and not trivially
/// guessable across process restarts. This crate does not depend on `uuid`;
/// the identity subsystem that would warrant one is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref(u128);

impl Ref {
    /// Mints a new, process-unique `Ref`.
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        static SALT: OnceLock<u64> = OnceLock::new();

        let salt = *SALT.get_or_init(|| {
            let addr = std::ptr::addr_of!(COUNTER) as u64;
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
            addr ^ nanos
        });
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self((u128::from(salt) << 64) | u128::from(counter))
    }
}

impl Default for Ref {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a freshly constructed [`Path`].
///
/// Mirrors the three options the path engine recognizes at construction
/// time: `initial_value` seeds the cache at version 1, `exclude_in` vetoes
/// inbound swaps, `exclude_out` vetoes outbound dispatch.
pub struct Builder<T> {
    initial_value: Option<T>,
    exclude_in: Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>,
    exclude_out: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
}

impl<T> Default for Builder<T> {
    fn default() -> Self {
        Self { initial_value: None, exclude_in: None, exclude_out: None }
    }
}

impl<T> Builder<T> {
    /// Creates a builder with no options set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the constructed cache with `value` at version 1.
    #[must_use]
    pub fn initial_value(mut self, value: T) -> Self {
        self.initial_value = Some(value);
        self
    }

    /// Sets the inbound-swap veto.
    #[must_use]
    pub fn exclude_in(mut self, f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.exclude_in = Some(Arc::new(f));
        self
    }

    /// Sets the outbound-dispatch veto.
    #[must_use]
    pub fn exclude_out(mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.exclude_out = Some(Arc::new(f));
        self
    }

    pub(crate) fn build_cache(self) -> Cache<T> {
        let mut cache = match self.initial_value {
            Some(initial) => Cache::with_initial(initial),
            None => Cache::new(),
        };
        if let Some(f) = self.exclude_in {
            cache.set_exclude_in(move |next, prev| f(next, prev));
        }
        if let Some(f) = self.exclude_out {
            cache.set_exclude_out(move |next| f(next));
        }
        cache
    }
}

/// The owner type bound to every `Path`'s [`Gsa`]. A tagged closure pair
/// rather than a virtual dispatch chain: `subscribe` drives the upward
/// activation edge (attach to the parent, pull its current value), `unsubscribe`
/// tears it back down.
pub(crate) struct PathActivation {
    subscribe: Box<dyn Fn(&dyn Fn() -> bool, &dyn Fn() -> bool) -> bool + Send + Sync>,
    unsubscribe: Box<dyn Fn() + Send + Sync>,
}

impl PathActivation {
    pub(crate) fn new(
        subscribe: impl Fn(&dyn Fn() -> bool, &dyn Fn() -> bool) -> bool + Send + Sync + 'static,
        unsubscribe: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self { subscribe: Box::new(subscribe), unsubscribe: Box::new(unsubscribe) }
    }
}

impl ActivationOwner for PathActivation {
    fn is_active(&self) -> bool {
        // A path's activator is always bound before any receiver can exist,
        // so there is never pre-existing demand at bind time.
        false
    }

    fn activate(&self, allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool) -> bool {
        (self.subscribe)(allow, on_set)
    }

    fn soft_deactivate(&self) {
        (self.unsubscribe)();
    }
}

/// Shared node state behind a [`Path`] handle.
pub(crate) struct PathInner<T> {
    pub(crate) cache: Arc<Cache<T>>,
    pub(crate) receivers: Arc<ReceiversManager>,
    pub(crate) publisher: Arc<Publisher<T>>,
    pub(crate) activator: Arc<Gsa<PathActivation>>,
    ref_id: ArcSwapOption<Ref>,
}

/// A node in the dataflow DAG: a versioned cache, a demand-tracking
/// receivers manager, and (for every node but a root input) a propagator
/// edge to its parent(s).
pub struct Path<T> {
    pub(crate) inner: Arc<PathInner<T>>,
}

impl<T> Clone for Path<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> PartialEq for Path<T> {
    /// Two handles compare equal iff they name the same node. `Path` has no
    /// structural equality; value comparison belongs to the cached `T`.
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Path<T> {}

impl<T: Clone + PartialEq + Send + Sync + 'static> Path<T> {
    /// Builds a root input path with no parent: its activator always
    /// succeeds immediately, since there is nothing upstream to subscribe to.
    #[must_use]
    pub fn input() -> Self {
        Self::input_with(Builder::new())
    }

    /// Builds a root input path from an explicit [`Builder`].
    #[must_use]
    pub fn input_with(builder: Builder<T>) -> Self {
        let cache = Arc::new(builder.build_cache());
        Self::from_parts(cache, PathActivation::new(|_allow, on_set| on_set(), || {}))
    }

    /// Wraps an existing [`PathInner`] back up as a `Path` handle. Used by
    /// [`crate::refs::resolve`] to hand back a live path recovered from the
    /// `Ref` table.
    pub(crate) fn from_inner(inner: Arc<PathInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn from_parts(cache: Arc<Cache<T>>, activation: PathActivation) -> Self {
        let receivers = Arc::new(ReceiversManager::new());
        let publisher = Arc::new(Publisher::new_sync());
        // The dispatch closure is stored inside `cache` itself; it must hold
        // only a `Weak` back-reference, or the cache would keep itself alive
        // forever through its own dispatcher.
        let cache_weak = Arc::downgrade(&cache);
        {
            let receivers = Arc::clone(&receivers);
            let publisher = Arc::clone(&publisher);
            cache.bind_dispatch(move || {
                receivers.dispatch();
                if let Some(cache) = cache_weak.upgrade() {
                    Arc::clone(&publisher).publish(cache.get());
                }
            });
        }
        let gsa = Arc::new(Gsa::new());
        let _ = gsa.set_owner(Arc::new(activation));
        // The publisher's subscriber count and this path's receiver-manager
        // demand (child edges using this path as their parent) are two
        // independent sources of the same activator's demand. A transition
        // to demand on either side always back-props; a transition to empty
        // only deactivates once the *other* side is confirmed empty too, or
        // a direct subscriber leaving would tear down a chain a downstream
        // child still needs (and vice versa).
        {
            let gsa = Arc::clone(&gsa);
            let receivers = Arc::clone(&receivers);
            publisher.bind_demand_hook(move |became_demand| {
                if became_demand {
                    let _ = gsa.back_prop();
                } else if !receivers.has_demand() {
                    let _ = gsa.deactivate();
                }
            });
        }
        Self { inner: Arc::new(PathInner { cache, receivers, publisher, activator: gsa, ref_id: ArcSwapOption::from(None) }) }
    }

    /// Returns the current value iff it satisfies `pred`.
    #[must_use]
    pub fn expect(&self, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        let current = self.inner.cache.live_get()?;
        pred(&current).then_some(current)
    }

    /// Returns the current value, or `None` if the cache is still default.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.inner.cache.live_get()
    }

    /// Registers a terminal observer: a callback handed this path's value by
    /// reference on every published version. Returns whether this was the
    /// first observer on this path (transitioning it into demand).
    pub fn add(&self, observer: Subscriber<T>) -> bool {
        self.inner.publisher.subscribe(observer)
    }

    /// Removes a previously registered observer.
    ///
    /// # Errors
    /// Returns [`ReactiveError::UnknownObserver`] if `observer` was never
    /// registered (or was already removed).
    pub fn remove(&self, observer: &Subscriber<T>) -> Result<(), ReactiveError> {
        if self.inner.publisher.unsubscribe(observer) {
            Ok(())
        } else {
            Err(ReactiveError::UnknownObserver)
        }
    }

    /// Returns whether `observer` is currently registered on this path.
    #[must_use]
    pub fn contains(&self, observer: &Subscriber<T>) -> bool {
        self.inner.publisher.contains(observer)
    }

    /// Returns this path's publisher. Passing `Some(executor)` switches it
    /// to asynchronous dispatch through that executor (a no-op if it is
    /// already running asynchronously); passing `None` leaves the current
    /// dispatch mode untouched, so a first caller can opt a path into async
    /// delivery and later callers just get the same shared publisher back.
    #[must_use]
    pub fn get_publisher(&self, executor: Option<Arc<dyn Executor>>) -> Arc<Publisher<T>> {
        if let Some(executor) = executor {
            self.inner.publisher.use_executor(executor);
        }
        Arc::clone(&self.inner.publisher)
    }

    /// Assigns `r` as this path's external identifier, registering it in the
    /// process-wide `Ref` table so it can later be recovered with
    /// [`crate::refs::resolve`].
    ///
    /// # Errors
    /// Returns [`ReactiveError::DuplicateRef`] if this path already has a
    /// `Ref` assigned, or if `r` already names a different, still-live path.
    pub fn assign(&self, r: Ref) -> Result<(), ReactiveError> {
        let prev = self.inner.ref_id.compare_and_swap(&Option::<Arc<Ref>>::None, Some(Arc::new(r)));
        if prev.is_some() {
            return Err(ReactiveError::DuplicateRef);
        }
        if let Err(err) = crate::refs::register(r, &self.inner) {
            self.inner.ref_id.store(None);
            return Err(err);
        }
        Ok(())
    }

    /// Clears this path's assigned `Ref`, if any, freeing it for reuse.
    pub fn de_reference(&self) {
        if let Some(r) = self.inner.ref_id.swap(None) {
            crate::refs::unregister(*r);
        }
    }

    /// Returns the `Ref` currently assigned to this path, if any.
    #[must_use]
    pub fn current_ref(&self) -> Option<Ref> {
        self.inner.ref_id.load_full().map(|r| *r)
    }

    /// Returns whether this path's activator is currently `ACTIVE`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.activator.state() == StateValue::Active
    }
}

impl<T> Path<T> {
    /// Returns a referentially comparable handle suitable for equality
    /// checks between two `Path` values pointing at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
