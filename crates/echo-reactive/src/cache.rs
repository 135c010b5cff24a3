// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `Cache<T>`: the versioned single-slot atomic store and its swap
//! strategies.
//!
//! A cache holds exactly one [`Versioned`] value at a time. All writes go
//! through compare-and-swap; a successful swap that is not vetoed by
//! `exclude_out` fires `dispatch` exactly once. Contention is silent and
//! retried by the derived strategies below — never surfaced as an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use tracing::trace;

use crate::error::ReactiveError;
use crate::executor::Executor;
use crate::versioned::Versioned;

type ExcludeIn<T> = dyn Fn(&T, &T) -> bool + Send + Sync;
type ExcludeOut<T> = dyn Fn(&T) -> bool + Send + Sync;
type OnSwapped<T> = dyn Fn(bool, Option<&T>, &T) + Send + Sync;
type DispatchFn = dyn Fn() + Send + Sync;

/// The versioned single-slot atomic store.
pub struct Cache<T> {
    local: ArcSwap<Versioned<T>>,
    exclude_in: Option<Arc<ExcludeIn<T>>>,
    exclude_out: Option<Arc<ExcludeOut<T>>>,
    dispatch: ArcSwapOption<DispatchFn>,
    on_swapped: Option<Arc<OnSwapped<T>>>,
    /// Version claim counter for the backpressure-drop strategies. Distinct
    /// from `local`'s published version: a claim may be taken by a thread
    /// whose swap never lands (e.g. it is superseded before it runs).
    claim: AtomicU64,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Cache<T> {
    /// Builds a cache with no initial value and no vetoes, ready for
    /// [`crate::path::Builder`] to wire up `dispatch` and optional hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: ArcSwap::from_pointee(Versioned::default()),
            exclude_in: None,
            exclude_out: None,
            dispatch: ArcSwapOption::from(None),
            on_swapped: None,
            claim: AtomicU64::new(0),
        }
    }

    /// Builds a cache seeded with `initial`, at version 1.
    #[must_use]
    pub fn with_initial(initial: T) -> Self {
        let cache = Self::new();
        cache.local.store(Arc::new(Versioned::default().new_value(initial)));
        cache
    }

    /// Sets the inbound-swap veto. Called only during construction/wiring.
    pub fn set_exclude_in(&mut self, f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) {
        self.exclude_in = Some(Arc::new(f));
    }

    /// Sets the outbound-dispatch veto. Called only during construction/wiring.
    pub fn set_exclude_out(&mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) {
        self.exclude_out = Some(Arc::new(f));
    }

    /// Sets the swap-observation hook. Called only during construction/wiring.
    pub fn set_on_swapped(&mut self, f: impl Fn(bool, Option<&T>, &T) + Send + Sync + 'static) {
        self.on_swapped = Some(Arc::new(f));
    }

    /// Binds (or rebinds) the dispatch callback fired after each successful,
    /// non-vetoed swap. A cache starts with no dispatcher; [`crate::path::Path`]
    /// binds this to its [`crate::receivers::ReceiversManager`] at wire-up.
    pub fn bind_dispatch(&self, dispatch: impl Fn() + Send + Sync + 'static) {
        self.dispatch.store(Some(Arc::new(dispatch)));
    }

    /// Returns the current versioned slot. Never fails; may be default.
    #[must_use]
    pub fn get(&self) -> Arc<Versioned<T>> {
        self.local.load_full()
    }

    fn veto_in(&self, next: &T, prev: &T) -> bool {
        self.exclude_in.as_ref().is_some_and(|f| f(next, prev))
    }

    fn veto_out(&self, next: &T) -> bool {
        self.exclude_out.as_ref().is_some_and(|f| f(next))
    }

    fn fire(&self, prev: &Arc<Versioned<T>>, next: &Arc<Versioned<T>>, ok: bool) {
        if let Some(hook) = &self.on_swapped {
            if let Some(nv) = next.value() {
                hook(ok, prev.value(), nv);
            }
        }
        if ok {
            if let Some(v) = next.value() {
                if self.veto_out(v) {
                    return;
                }
            }
            if let Some(dispatch) = self.dispatch.load_full() {
                dispatch();
            } else {
                trace!("cache swap succeeded with no dispatcher bound yet");
            }
        }
    }

    /// Attempts one compare-and-swap of `witness -> next`. Returns the
    /// installed value on success, or the actual current value on failure
    /// (the caller's new witness for a retry).
    fn try_swap(
        &self,
        witness: &Arc<Versioned<T>>,
        next: Versioned<T>,
    ) -> Result<Arc<Versioned<T>>, Arc<Versioned<T>>> {
        let next = Arc::new(next);
        let actual = self.local.compare_and_swap(witness, Arc::clone(&next));
        if Arc::ptr_eq(&actual, witness) {
            self.fire(witness, &next, true);
            Ok(next)
        } else {
            Err(actual)
        }
    }
}

impl<T: Clone> Cache<T> {
    /// Returns the current value, or `None` if the cache is still default.
    #[must_use]
    pub fn live_get(&self) -> Option<T> {
        self.get().value().cloned()
    }
}

impl<T: PartialEq> Cache<T> {
    /// Returns the current slot iff it is non-default and not vetoed by
    /// `exclude_out`.
    #[must_use]
    pub fn is_consumable(&self) -> Option<Arc<Versioned<T>>> {
        let current = self.get();
        if current.is_default() {
            return None;
        }
        if let Some(v) = current.value() {
            if self.veto_out(v) {
                return None;
            }
        }
        Some(current)
    }

    /// A single strong compare-and-swap: succeeds only if `expect` still
    /// matches the current slot by value and version, `set` differs from the
    /// current value, and `exclude_in` does not veto.
    pub fn compare_and_swap(&self, expect: &Versioned<T>, set: T) -> bool {
        let current = self.get();
        if current.as_ref() != expect {
            return false;
        }
        if let Some(cv) = current.value() {
            if *cv == set || self.veto_in(&set, cv) {
                return false;
            }
        }
        let next = current.new_value(set);
        self.try_swap(&current, next).is_ok()
    }

    /// An unconditional strong CAS against the last-observed slot. May
    /// spuriously fail if another writer landed first; callers that need a
    /// guaranteed write should retry via [`Cache::updater`].
    pub fn weak_set(&self, set: T) -> bool {
        let current = self.get();
        if let Some(cv) = current.value() {
            if *cv == set || self.veto_in(&set, cv) {
                return false;
            }
        }
        let next = current.new_value(set);
        self.try_swap(&current, next).is_ok()
    }
}

// ===========================================================================
// Derived swap-strategy factories.
// ===========================================================================

impl<T: Clone + PartialEq + Send + Sync + 'static> Cache<T> {
    /// A retrying updater bound to this cache.
    #[must_use]
    pub fn updater(self: Arc<Self>) -> Updater<T> {
        Updater { cache: self }
    }

    /// A non-contentious entry point for single-threaded producers. Fails
    /// loudly on an observed concurrent swap rather than retrying.
    #[must_use]
    pub fn source(self: Arc<Self>) -> Source<T> {
        Source { cache: self }
    }

    /// A backpressure-dropping entry point: the first claim is applied
    /// inline, later claims are deferred to `executor` and re-check their
    /// version before acting.
    #[must_use]
    pub fn source_with_delayer(self: Arc<Self>, executor: Arc<dyn Executor>) -> BackpressureSource<T> {
        BackpressureSource { cache: self, executor, always_defer: false }
    }

    /// Like [`Cache::source_with_delayer`], but every emission (including the
    /// first) is deferred to the executor.
    #[must_use]
    pub fn back_source(self: Arc<Self>, executor: Arc<dyn Executor>) -> BackpressureSource<T> {
        BackpressureSource { cache: self, executor, always_defer: true }
    }

    /// Like [`Cache::source_with_delayer`], but the payload is a `() -> T`
    /// computation evaluated only after it wins the version race.
    #[must_use]
    pub fn computable(self: Arc<Self>, executor: Option<Arc<dyn Executor>>) -> Computable<T> {
        Computable { cache: self, executor }
    }
}

/// A retrying updater: computes `next = u(prev)`, verifies it differs and
/// passes `exclude_in`, then CASes; retries on contention with a freshly
/// recomputed `next` until it either lands or the witness already matches.
pub struct Updater<T> {
    cache: Arc<Cache<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Updater<T> {
    /// Applies `u`, discarding the result. Returns whether a swap landed.
    pub fn up(&self, u: impl Fn(Option<&T>) -> T) -> bool {
        self.cas(u, |_, _| {})
    }

    /// Applies `u`; on success, calls `r(prev, next)` with the values that
    /// were actually installed. Returns whether a swap landed.
    pub fn cas(&self, u: impl Fn(Option<&T>) -> T, r: impl Fn(Option<&T>, &T)) -> bool {
        let mut witness = self.cache.get();
        loop {
            let next_val = u(witness.value());
            if let Some(pv) = witness.value() {
                if *pv == next_val || self.cache.veto_in(&next_val, pv) {
                    return false;
                }
            }
            let next = witness.new_value(next_val.clone());
            match self.cache.try_swap(&witness, next) {
                Ok(_) => {
                    r(witness.value(), &next_val);
                    return true;
                }
                Err(actual) => {
                    if let Some(av) = actual.value() {
                        if *av == next_val {
                            return false;
                        }
                    }
                    witness = actual;
                }
            }
        }
    }
}

/// A non-contentious entry point for single-threaded producers.
pub struct Source<T> {
    cache: Arc<Cache<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Source<T> {
    /// Pushes `value` with a single CAS attempt.
    ///
    /// # Errors
    /// Returns [`ReactiveError::ConcurrentSourceSwap`] if another writer
    /// landed a swap between this call's read and its CAS — `Source` is for
    /// single-threaded producers, so this indicates a usage bug, not
    /// ordinary contention.
    pub fn accept(&self, value: T) -> Result<bool, ReactiveError> {
        let current = self.cache.get();
        if let Some(cv) = current.value() {
            if *cv == value || self.cache.veto_in(&value, cv) {
                return Ok(false);
            }
        }
        let next = current.new_value(value);
        self.cache.try_swap(&current, next).map(|_| true).map_err(|_| ReactiveError::ConcurrentSourceSwap)
    }
}

/// Backpressure-dropping entry point: prefers the newest value under
/// contention, silently discarding superseded in-flight emissions.
pub struct BackpressureSource<T> {
    cache: Arc<Cache<T>>,
    executor: Arc<dyn Executor>,
    always_defer: bool,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> BackpressureSource<T> {
    /// Pushes `value`. Claims a version via an atomic fetch-add; the first
    /// claim ever taken by this cache is applied inline (unless this was
    /// built via [`Cache::back_source`], which always defers), subsequent
    /// claims are handed to the executor and re-check their claimed version
    /// before acting, aborting if a newer value has since claimed the slot.
    pub fn accept(&self, value: T) {
        let my_claim = self.cache.claim.fetch_add(1, Ordering::AcqRel) + 1;
        if my_claim == 1 && !self.always_defer {
            Self::apply(&self.cache, value, my_claim);
            return;
        }
        let cache = Arc::clone(&self.cache);
        self.executor.execute(Box::new(move || {
            if cache.claim.load(Ordering::Acquire) != my_claim {
                trace!(claim = my_claim, "dropping superseded backpressure emission");
                return;
            }
            Self::apply(&cache, value, my_claim);
        }));
    }

    fn apply(cache: &Arc<Cache<T>>, value: T, my_claim: u64) {
        let current = cache.get();
        if cache.claim.load(Ordering::Acquire) != my_claim {
            return;
        }
        if let Some(cv) = current.value() {
            if *cv == value || cache.veto_in(&value, cv) {
                return;
            }
        }
        let next = current.new_value(value);
        let _ = cache.try_swap(&current, next);
    }
}

/// Like [`BackpressureSource`], but the payload is computed lazily, only
/// after it wins the version race.
pub struct Computable<T> {
    cache: Arc<Cache<T>>,
    executor: Option<Arc<dyn Executor>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Computable<T> {
    /// Requests a recomputation. `compute` is evaluated lazily, either
    /// inline (first claim, no executor configured) or inside the executor
    /// task once it is confirmed to still be the newest claim.
    pub fn request(&self, compute: impl Fn() -> T + Send + Sync + 'static) {
        let my_claim = self.cache.claim.fetch_add(1, Ordering::AcqRel) + 1;
        let run = {
            let cache = Arc::clone(&self.cache);
            move || {
                if cache.claim.load(Ordering::Acquire) != my_claim {
                    return;
                }
                let value = compute();
                if cache.claim.load(Ordering::Acquire) != my_claim {
                    return;
                }
                BackpressureSource::apply(&cache, value, my_claim);
            }
        };
        match (&self.executor, my_claim) {
            (None, _) | (Some(_), 1) => run(),
            (Some(executor), _) => executor.execute(Box::new(run)),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Cache<T> {
    /// A 1:1 map edge: the child tracks the parent's version directly via
    /// [`Versioned::swap_type`] rather than minting its own. A lost race
    /// against a concurrent writer is dropped rather than retried — the next
    /// parent dispatch supersedes it.
    #[must_use]
    pub fn for_mapped<P: Send + Sync + 'static>(
        self: Arc<Self>,
        map: impl Fn(&P) -> T + Send + Sync + 'static,
    ) -> MappedEdge<P, T> {
        MappedEdge { cache: self, map: Arc::new(map) }
    }

    /// A map edge that mints its own versions, independent of the parent's,
    /// tracked by a separate monotonic cursor. Used where more than one
    /// upstream version can legitimately collapse into a single child write
    /// (switch-map's rebound target, nested maps).
    #[must_use]
    pub fn hierarchical_map<P: Send + Sync + 'static>(
        self: Arc<Self>,
        map: impl Fn(&P) -> T + Send + Sync + 'static,
    ) -> HierarchicalEdge<P, T> {
        HierarchicalEdge { cache: self, cursor: AtomicU64::new(0), compute: Arc::new(move |p, _prev| map(p)) }
    }

    /// Like [`Cache::hierarchical_map`], but the computation also sees the
    /// child's current value.
    #[must_use]
    pub fn hierarchical_updater<P: Send + Sync + 'static>(
        self: Arc<Self>,
        update: impl Fn(&P, Option<&T>) -> T + Send + Sync + 'static,
    ) -> HierarchicalEdge<P, T> {
        HierarchicalEdge { cache: self, cursor: AtomicU64::new(0), compute: Arc::new(update) }
    }

    /// A hierarchical edge that simply carries the parent's value across,
    /// re-versioned independently. Requires `T: Clone` for the copy (already
    /// required by this impl block).
    #[must_use]
    pub fn hierarchical_identity(self: Arc<Self>) -> HierarchicalEdge<T, T> {
        self.hierarchical_map(Clone::clone)
    }
}

impl<T: Clone + PartialEq + Default + Send + Sync + 'static> Cache<T> {
    /// A join edge: merges the child's current value (or `T::default()` if
    /// it has none yet) with an incoming parent value via `merge`, tracked by
    /// its own monotonic cursor independent of the parent's version. Two
    /// parent edges feeding the same join cache each get their own
    /// `JoinEdge`.
    #[must_use]
    pub fn join_receiver<P: Send + Sync + 'static>(
        self: Arc<Self>,
        merge: impl Fn(&T, &P) -> T + Send + Sync + 'static,
    ) -> JoinEdge<P, T> {
        JoinEdge { cache: self, cursor: AtomicU64::new(0), merge: Arc::new(merge) }
    }
}

/// A 1:1 map edge bound to a specific parent type `P`.
pub struct MappedEdge<P, T> {
    cache: Arc<Cache<T>>,
    map: Arc<dyn Fn(&P) -> T + Send + Sync>,
}

impl<P: Send + Sync + 'static, T: Clone + PartialEq + Send + Sync + 'static> MappedEdge<P, T> {
    /// Applies the map to `parent`'s value and installs it iff `parent` is
    /// newer than the child's current version. Returns whether a swap
    /// landed.
    pub fn accept(&self, parent: &Versioned<P>) -> bool {
        let current = self.cache.get();
        if parent.version() <= current.version() {
            return false;
        }
        let Some(pv) = parent.value() else {
            return false;
        };
        let mapped = (self.map)(pv);
        if let Some(cv) = current.value() {
            if *cv == mapped || self.cache.veto_in(&mapped, cv) {
                return false;
            }
        }
        let next = parent.swap_type(mapped);
        self.cache.try_swap(&current, next).is_ok()
    }
}

/// A map edge with its own independently-minted version cursor.
pub struct HierarchicalEdge<P, T> {
    cache: Arc<Cache<T>>,
    cursor: AtomicU64,
    compute: Arc<dyn Fn(&P, Option<&T>) -> T + Send + Sync>,
}

impl<P: Send + Sync + 'static, T: Clone + PartialEq + Send + Sync + 'static> HierarchicalEdge<P, T> {
    /// Computes and installs the child value for `parent`, retrying against
    /// concurrent writers until either it lands, a newer parent version has
    /// already superseded this one, or the computed value is unchanged (in
    /// which case only the cursor advances).
    pub fn accept(&self, parent: &Versioned<P>) -> bool {
        loop {
            let recorded = self.cursor.load(Ordering::Acquire);
            if parent.version() <= recorded {
                return false;
            }
            let Some(pv) = parent.value() else {
                return false;
            };
            let current = self.cache.get();
            let computed = (self.compute)(pv, current.value());
            if current.value().is_some_and(|cv| *cv == computed) {
                let _ = self.cursor.compare_exchange(recorded, parent.version(), Ordering::AcqRel, Ordering::Acquire);
                return false;
            }
            if let Some(cv) = current.value() {
                if self.cache.veto_in(&computed, cv) {
                    let _ = self.cursor.compare_exchange(recorded, parent.version(), Ordering::AcqRel, Ordering::Acquire);
                    return false;
                }
            }
            let next = current.new_value(computed);
            match self.cache.try_swap(&current, next) {
                Ok(_) => {
                    self.cursor.fetch_max(parent.version(), Ordering::AcqRel);
                    return true;
                }
                Err(_) => continue,
            }
        }
    }
}

/// A two-parent join edge: one instance per parent, both merging into the
/// same child cache under the shared [`JoinEdge::accept`] contract.
pub struct JoinEdge<P, T> {
    cache: Arc<Cache<T>>,
    cursor: AtomicU64,
    merge: Arc<dyn Fn(&T, &P) -> T + Send + Sync>,
}

impl<P: Send + Sync + 'static, T: Clone + PartialEq + Default + Send + Sync + 'static> JoinEdge<P, T> {
    /// Merges `parent`'s value into the child, retrying against concurrent
    /// writers (including the join's other parent edge) under the same
    /// cursor discipline as [`HierarchicalEdge::accept`].
    pub fn accept(&self, parent: &Versioned<P>) -> bool {
        loop {
            let recorded = self.cursor.load(Ordering::Acquire);
            if parent.version() <= recorded {
                return false;
            }
            let Some(pv) = parent.value() else {
                return false;
            };
            let current = self.cache.get();
            let base = current.value().cloned().unwrap_or_default();
            let merged = (self.merge)(&base, pv);
            if current.value().is_some_and(|cv| *cv == merged) {
                let _ = self.cursor.compare_exchange(recorded, parent.version(), Ordering::AcqRel, Ordering::Acquire);
                return false;
            }
            if let Some(cv) = current.value() {
                if self.cache.veto_in(&merged, cv) {
                    let _ = self.cursor.compare_exchange(recorded, parent.version(), Ordering::AcqRel, Ordering::Acquire);
                    return false;
                }
            }
            let next = current.new_value(merged);
            match self.cache.try_swap(&current, next) {
                Ok(_) => {
                    self.cursor.fetch_max(parent.version(), Ordering::AcqRel);
                    return true;
                }
                Err(_) => continue,
            }
        }
    }
}
