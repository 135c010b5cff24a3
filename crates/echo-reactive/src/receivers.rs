// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The receivers manager: the edge-internal demand side of activation.
//!
//! A [`Path`](crate::path::Path) has zero or more *edges* registered against
//! it — a downstream map/switch-map/join edge subscribing to this path as
//! its parent, wired up in [`crate::propagator`]. This is a distinct demand
//! source from the path's own terminal [`crate::publisher::Publisher`]
//! subscribers: a path can have live children and no direct observers, or
//! direct observers and no children, or both. The manager tracks its edges
//! in a [`CowArray`] and exposes a single boolean signal, "is there demand
//! from a child edge", which [`crate::path::Path::from_parts`] combines with
//! the publisher's own demand signal to decide when to actually drive
//! [`crate::activator::Gsa::back_prop`] / `deactivate`. The dispatcher a
//! cache calls on every swap is bound here too: while the array is empty,
//! dispatch is a no-op; the moment it becomes non-empty, dispatch starts
//! fanning out to every registered receiver, and vice versa.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cow::CowArray;
use crate::error::ReactiveError;

/// A receiver callback: invoked with no arguments whenever its owning cache
/// swaps in a new, non-vetoed value. Receivers read the new value back out
/// of the cache themselves rather than being handed it directly, since by
/// the time a deferred receiver runs, a newer value may already have landed.
pub type Receiver = Arc<dyn Fn() + Send + Sync>;

/// Tracks the demand-side receiver set for a single path and exposes the
/// "has demand" signal the activation state machine depends on.
pub struct ReceiversManager {
    receivers: CowArray<Receiver>,
    has_demand: AtomicBool,
}

impl Default for ReceiversManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiversManager {
    /// Creates an empty manager with no demand.
    #[must_use]
    pub fn new() -> Self {
        Self { receivers: CowArray::default(), has_demand: AtomicBool::new(false) }
    }

    /// Returns whether at least one receiver is currently registered.
    #[must_use]
    pub fn has_demand(&self) -> bool {
        self.has_demand.load(Ordering::Acquire)
    }

    /// Registers `receiver` unconditionally. Returns whether this transitioned
    /// the manager from no-demand to demand (the caller should then drive
    /// `back_prop` on its activator).
    pub fn add_receiver(&self, receiver: Receiver) -> bool {
        self.receivers.push(receiver);
        !self.has_demand.swap(true, Ordering::AcqRel)
    }

    /// Registers `receiver` only if `guard` holds at the moment of
    /// insertion, evaluated against the array's current length.
    ///
    /// Used by join edges that must not accept a new receiver while an
    /// unrelated removal is mid-flight: `guard` typically checks an upstream
    /// activation state that must still be consistent.
    pub fn add_receiver_conditional(&self, receiver: Receiver, guard: impl Fn() -> bool) -> Result<bool, ReactiveError> {
        if !guard() {
            return Err(ReactiveError::UnknownObserver);
        }
        Ok(self.add_receiver(receiver))
    }

    /// Removes the first receiver for which `matches` returns true.
    ///
    /// This is the "non-contentious" removal path: it assumes at most one
    /// writer ever removes a given receiver and does not retry past a single
    /// observed race window beyond what `CowArray::remove_first` already
    /// guarantees. Returns whether this removal left the receiver set empty
    /// (the caller should then drive `deactivate`).
    ///
    /// # Errors
    /// Returns [`ReactiveError::UnknownObserver`] if no receiver matched.
    pub fn non_cont_remove(&self, matches: impl Fn(&Receiver) -> bool) -> Result<bool, ReactiveError> {
        let outcome = self.receivers.remove_first(matches);
        if !outcome.removed {
            return Err(ReactiveError::UnknownObserver);
        }
        if outcome.became_empty {
            self.has_demand.store(false, Ordering::Release);
        }
        Ok(outcome.became_empty)
    }

    /// Removes a receiver with up to 30 retries against concurrent array
    /// mutation before giving up.
    ///
    /// Named for the bound the original design hard-codes for this
    /// specific removal path (a receiver disconnecting while its cache is
    /// under heavy concurrent write load); [`CowArray::remove_first`] already
    /// retries internally on CAS contention, so this bound instead governs
    /// retries against the *predicate* racily failing to match (e.g. the
    /// receiver was already removed by another thread between this caller's
    /// decision to remove it and the call landing).
    ///
    /// # Errors
    /// Returns [`ReactiveError::ReceiverRemovalExhausted`] after 30 failed
    /// attempts to find a match.
    pub fn hard_remove_30_throw(&self, matches: impl Fn(&Receiver) -> bool) -> Result<bool, ReactiveError> {
        for _ in 0..30 {
            let outcome = self.receivers.remove_first(&matches);
            if outcome.removed {
                if outcome.became_empty {
                    self.has_demand.store(false, Ordering::Release);
                }
                return Ok(outcome.became_empty);
            }
        }
        Err(ReactiveError::ReceiverRemovalExhausted)
    }

    /// Fans out to every currently registered receiver. Bound as the
    /// `dispatch` callback on a [`crate::cache::Cache`] at wire-up time; a
    /// no-op while the receiver set is empty.
    pub fn dispatch(&self) {
        for receiver in self.receivers.snapshot().iter() {
            receiver();
        }
    }

    /// Returns whether any currently registered receiver matches `pred`.
    /// A plain read over the current snapshot; does not mutate the array or
    /// the demand signal.
    #[must_use]
    pub fn contains(&self, pred: impl Fn(&Receiver) -> bool) -> bool {
        self.receivers.snapshot().iter().any(pred)
    }

    /// Returns the number of currently registered receivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    /// Returns whether no receivers are currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}
