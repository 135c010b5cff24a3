// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Propagator wiring: the edges that connect a [`Path`] to its parent(s).
//!
//! Every edge follows the same activation choreography: a child's
//! `PathActivation::subscribe` registers a receiver on the parent (driving
//! the parent's own demand if it was the first), pulls the parent's current
//! consumable value as a seed, then completes the `onSet` CAS — in that
//! order, so that by the time a caller observes the child `ACTIVE`, the
//! parent-to-child edge is already fully wired (`backProp -> sysActivate ->
//! onStateChange(true)`).

use std::sync::Arc;

use crate::activator::Gsa;
use crate::cache::{BackpressureSource, Source};
use crate::executor::Executor;
use crate::path::{Builder, Path, PathActivation};
use crate::receivers::Receiver;
use crate::register::SysRegister;

/// Unwinds the thread currently delivering a switch-map push after its
/// mapper returned `None` for a value it is contractually required to
/// map. A deliberate panic (see `Path::try_switch_map`), not an ordinary
/// error path, so it is isolated here rather than disabling the lint crate-wide.
#[allow(clippy::panic)]
fn null_switch_map_target() -> ! {
    panic!("{}", crate::error::ReactiveError::NullSwitchMapTarget);
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Path<T> {
    /// A non-contentious source bound directly to this path's cache. For
    /// root input paths and any node a single-threaded producer drives
    /// directly.
    #[must_use]
    pub fn open_source(&self) -> Source<T> {
        Arc::clone(&self.inner.cache).source()
    }

    /// A backpressure-dropping source bound directly to this path's cache:
    /// the entry point for contended, high-frequency producers (the
    /// distilled spec's `In.Consume<T>` built as `CONT`). Under contention
    /// the newest value wins and superseded in-flight emissions are
    /// silently dropped rather than queued.
    #[must_use]
    pub fn open_contentious_source(&self, executor: Arc<dyn Executor>) -> BackpressureSource<T> {
        Arc::clone(&self.inner.cache).source_with_delayer(executor)
    }

    /// A 1:1 transform: the child's version tracks the parent's version
    /// directly (see [`crate::cache::Cache::for_mapped`]).
    #[must_use]
    pub fn map<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Path<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        self.open_map(f)
    }

    /// Crate-internal form of [`Path::map`], used by composite edges that
    /// need the child path without re-exporting the propagator's inner
    /// receiver type.
    pub(crate) fn open_map<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Path<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        self.open_map_with(Builder::new(), f)
    }

    /// Like [`Path::open_map`], but the child cache is built from an
    /// explicit [`Builder`] (e.g. to install an `exclude_in` veto on the
    /// mapped values).
    pub(crate) fn open_map_with<U>(&self, builder: Builder<U>, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Path<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        let child_cache = Arc::new(builder.build_cache());
        let edge = Arc::new(Arc::clone(&child_cache).for_mapped(f));
        let parent = Arc::clone(&self.inner);

        let receiver: Receiver = {
            let edge = Arc::clone(&edge);
            let parent = Arc::clone(&parent);
            Arc::new(move || {
                let _ = edge.accept(&parent.cache.get());
            })
        };

        let subscribe = {
            let edge = Arc::clone(&edge);
            let parent = Arc::clone(&parent);
            let receiver = Arc::clone(&receiver);
            move |_allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool| -> bool {
                if parent.receivers.add_receiver(Arc::clone(&receiver)) {
                    let _ = parent.activator.back_prop();
                }
                if let Some(seed) = parent.cache.is_consumable() {
                    let _ = edge.accept(&seed);
                }
                on_set()
            }
        };

        let unsubscribe = {
            let parent = Arc::clone(&parent);
            let receiver = Arc::clone(&receiver);
            move || {
                if let Ok(became_empty) = parent.receivers.non_cont_remove(|r| Arc::ptr_eq(r, &receiver)) {
                    // `parent.receivers` only tracks demand from edges like
                    // this one; `parent.publisher` may still hold direct
                    // observers added via `Path::add`, which must keep the
                    // parent active even after this edge's own demand drops.
                    if became_empty && parent.publisher.is_empty() {
                        let _ = parent.activator.deactivate();
                    }
                }
            }
        };

        Path::from_parts(child_cache, PathActivation::new(subscribe, unsubscribe))
    }

    /// Rewritable 1:N transform: each new value through `f` selects a fresh
    /// inner [`Path`], and only the most recently selected one is ever
    /// subscribed. Rebinding is linearized through a [`SysRegister`], so a
    /// slow activation of an older selection can never resurrect it once a
    /// newer one has been chosen.
    #[must_use]
    pub fn switch_map<U>(&self, f: impl Fn(&T) -> Path<U> + Send + Sync + 'static) -> Path<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        self.open_switch_map(move |t| Some(f(t)))
    }

    /// Like [`Path::switch_map`], but `f`'s contract is partial: returning
    /// `None` is a usage violation (the mapper is expected to be total), not
    /// an ordinary "no selection" outcome. Because the mapper runs on
    /// whatever thread is delivering the parent's push, there is no caller to
    /// hand a `Result` back to; consistent with this crate's propagation
    /// policy for usage violations raised mid-push (§7), a `None` unwinds the
    /// delivering thread with [`ReactiveError::NullSwitchMapTarget`].
    #[must_use]
    pub fn try_switch_map<U>(&self, f: impl Fn(&T) -> Option<Path<U>> + Send + Sync + 'static) -> Path<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        self.open_switch_map(f)
    }

    /// Crate-internal form of [`Path::switch_map`].
    pub(crate) fn open_switch_map<U>(&self, f: impl Fn(&T) -> Option<Path<U>> + Send + Sync + 'static) -> Path<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        let child_cache = Arc::new(crate::cache::Cache::new());
        let register: Arc<SysRegister<PathActivation>> = Arc::new(SysRegister::new());
        let parent = Arc::clone(&self.inner);
        let f = Arc::new(f);

        // Selects the inner path for one parent value and registers its
        // subscription, retiring whatever was selected before it. The
        // parent cache's own version is reused as the register's version:
        // every parent push is a distinct selection even if `f` happens to
        // return the same inner path as last time.
        let select: Arc<dyn Fn(&crate::versioned::Versioned<T>, bool) + Send + Sync> = {
            let child_cache = Arc::clone(&child_cache);
            let register = Arc::clone(&register);
            let parent = Arc::clone(&parent);
            let f = Arc::clone(&f);
            Arc::new(move |parent_value, should_activate| {
                let Some(pv) = parent_value.value() else {
                    return;
                };
                let version = parent_value.version();
                let Some(inner_path) = f(pv) else {
                    null_switch_map_target();
                };
                let edge = Arc::new(Arc::clone(&child_cache).hierarchical_identity());

                let receiver: Receiver = {
                    let edge = Arc::clone(&edge);
                    let inner = Arc::clone(&inner_path.inner);
                    Arc::new(move || {
                        if let Some(v) = inner.cache.is_consumable() {
                            let _ = edge.accept(&v);
                        }
                    })
                };

                let subscribe = {
                    let edge = Arc::clone(&edge);
                    let inner = Arc::clone(&inner_path.inner);
                    let receiver = Arc::clone(&receiver);
                    move |_allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool| -> bool {
                        if inner.receivers.add_receiver(Arc::clone(&receiver)) {
                            let _ = inner.activator.back_prop();
                        }
                        if let Some(seed) = inner.cache.is_consumable() {
                            let _ = edge.accept(&seed);
                        }
                        on_set()
                    }
                };

                let unsubscribe = {
                    let inner = Arc::clone(&inner_path.inner);
                    let receiver = Arc::clone(&receiver);
                    move || {
                        if let Ok(became_empty) = inner.receivers.non_cont_remove(|r| Arc::ptr_eq(r, &receiver)) {
                            // The selected inner path may itself carry direct
                            // observers; only tear it down once those are gone too.
                            if became_empty && inner.publisher.is_empty() {
                                let _ = inner.activator.deactivate();
                            }
                        }
                    }
                };

                let gsa = Arc::new(Gsa::new());
                let _ = gsa.set_owner(Arc::new(PathActivation::new(subscribe, unsubscribe)));

                let live_check = {
                    let parent = Arc::clone(&parent);
                    move || parent.cache.get().version()
                };
                register.register(version, live_check, gsa, should_activate);
            })
        };

        let parent_receiver: Receiver = {
            let select = Arc::clone(&select);
            let parent = Arc::clone(&parent);
            Arc::new(move || {
                let latest = parent.cache.get();
                select(&latest, true);
            })
        };

        let subscribe = {
            let parent = Arc::clone(&parent);
            let receiver = Arc::clone(&parent_receiver);
            let select = Arc::clone(&select);
            move |_allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool| -> bool {
                if parent.receivers.add_receiver(Arc::clone(&receiver)) {
                    let _ = parent.activator.back_prop();
                }
                if let Some(seed) = parent.cache.is_consumable() {
                    select(&seed, true);
                }
                on_set()
            }
        };

        let unsubscribe = {
            let parent = Arc::clone(&parent);
            let receiver = Arc::clone(&parent_receiver);
            let register = Arc::clone(&register);
            move || {
                if let Ok(became_empty) = parent.receivers.non_cont_remove(|r| Arc::ptr_eq(r, &receiver)) {
                    if became_empty && parent.publisher.is_empty() {
                        let _ = parent.activator.deactivate();
                    }
                }
                register.shut_off_current();
            }
        };

        Path::from_parts(child_cache, PathActivation::new(subscribe, unsubscribe))
    }

    /// Merges this path with `other` into a child path of a third type,
    /// recomputing the merged value independently for each parent's
    /// updates. `merge_self` folds this path's values in; `merge_other`
    /// folds `other`'s values in. Both start from `R::default()` until both
    /// parents have delivered at least once.
    #[must_use]
    pub fn join<U, R>(
        &self,
        other: &Path<U>,
        merge_self: impl Fn(&R, &T) -> R + Send + Sync + 'static,
        merge_other: impl Fn(&R, &U) -> R + Send + Sync + 'static,
    ) -> Path<R>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        R: Clone + PartialEq + Default + Send + Sync + 'static,
    {
        let child_cache = Arc::new(crate::cache::Cache::new());
        let left_edge = Arc::new(Arc::clone(&child_cache).join_receiver(merge_self));
        let right_edge = Arc::new(Arc::clone(&child_cache).join_receiver(merge_other));
        let left_parent = Arc::clone(&self.inner);
        let right_parent = Arc::clone(&other.inner);

        let left_receiver: Receiver = {
            let edge = Arc::clone(&left_edge);
            let parent = Arc::clone(&left_parent);
            Arc::new(move || {
                let _ = edge.accept(&parent.cache.get());
            })
        };
        let right_receiver: Receiver = {
            let edge = Arc::clone(&right_edge);
            let parent = Arc::clone(&right_parent);
            Arc::new(move || {
                let _ = edge.accept(&parent.cache.get());
            })
        };

        let subscribe = {
            let left_parent = Arc::clone(&left_parent);
            let right_parent = Arc::clone(&right_parent);
            let left_receiver = Arc::clone(&left_receiver);
            let right_receiver = Arc::clone(&right_receiver);
            let left_edge = Arc::clone(&left_edge);
            let right_edge = Arc::clone(&right_edge);
            move |_allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool| -> bool {
                if left_parent.receivers.add_receiver(Arc::clone(&left_receiver)) {
                    let _ = left_parent.activator.back_prop();
                }
                if right_parent.receivers.add_receiver(Arc::clone(&right_receiver)) {
                    let _ = right_parent.activator.back_prop();
                }
                if let Some(seed) = left_parent.cache.is_consumable() {
                    let _ = left_edge.accept(&seed);
                }
                if let Some(seed) = right_parent.cache.is_consumable() {
                    let _ = right_edge.accept(&seed);
                }
                on_set()
            }
        };

        let unsubscribe = {
            let left_parent = Arc::clone(&left_parent);
            let right_parent = Arc::clone(&right_parent);
            let left_receiver = Arc::clone(&left_receiver);
            let right_receiver = Arc::clone(&right_receiver);
            move || {
                if let Ok(became_empty) = left_parent.receivers.non_cont_remove(|r| Arc::ptr_eq(r, &left_receiver)) {
                    if became_empty && left_parent.publisher.is_empty() {
                        let _ = left_parent.activator.deactivate();
                    }
                }
                if let Ok(became_empty) = right_parent.receivers.non_cont_remove(|r| Arc::ptr_eq(r, &right_receiver)) {
                    if became_empty && right_parent.publisher.is_empty() {
                        let _ = right_parent.activator.deactivate();
                    }
                }
            }
        };

        Path::from_parts(child_cache, PathActivation::new(subscribe, unsubscribe))
    }
}
