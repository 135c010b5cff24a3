// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The shuttable activator `Gsa`: a [`BinaryState`] plus an optional single
//! owner binding, with a terminal `OFF`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::SpinnerConfig;
use crate::error::ReactiveError;
use crate::state::{BinaryState, StateValue};

/// The behavior an owner of a [`Gsa`] must supply.
///
/// This is the tagged-variant stand-in for the original design's class
/// hierarchy (`Listener` / `Pathed` / `Collection` / `Stateful`): rather than
/// a virtual dispatch chain, each concrete owner (a map edge's propagator, a
/// switch-map's `PathedBinaryState`, ...) implements this trait directly.
pub trait ActivationOwner: Send + Sync {
    /// Whether the owner is already active at the moment it binds to a `Gsa`.
    fn is_active(&self) -> bool;
    /// Drives activation. `allow` must be polled before committing to the
    /// activation's effects; `on_set` performs the `QUEUEING -> ACTIVE` CAS.
    /// Returns whether activation completed.
    fn activate(&self, allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool) -> bool;
    /// Tears down the owner's subscription to its parent and notifies it of
    /// the deactivation. Called at most once per activation.
    fn soft_deactivate(&self);
}

/// A shuttable activator: wraps a [`BinaryState`] with an exclusive,
/// at-most-once owner binding.
pub struct Gsa<O: ActivationOwner> {
    state: BinaryState,
    owner: ArcSwapOption<O>,
}

impl<O: ActivationOwner> Default for Gsa<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ActivationOwner> Gsa<O> {
    /// Creates an unbound activator in `INIT`.
    #[must_use]
    pub fn new() -> Self {
        Self { state: BinaryState::new(), owner: ArcSwapOption::from(None) }
    }

    /// Returns the current activation state.
    #[must_use]
    pub fn state(&self) -> StateValue {
        self.state.get()
    }

    /// Binds `owner` as the exclusive owner of this activator.
    ///
    /// If the owner is already active, activation begins immediately
    /// (`INIT -> QUEUEING -> ACTIVE`); otherwise the activator settles into
    /// `INACTIVE` and waits for a future `back_prop`.
    ///
    /// # Errors
    /// Returns [`ReactiveError::DuplicateOwner`] if an owner is already bound.
    pub fn set_owner(&self, owner: Arc<O>) -> Result<(), ReactiveError> {
        let prev = self.owner.compare_and_swap(&Option::<Arc<O>>::None, Some(Arc::clone(&owner)));
        if prev.is_some() {
            return Err(ReactiveError::DuplicateOwner);
        }
        let active = owner.is_active();
        self.state.claim_owner(active, |allow, on_set| owner.activate(allow, on_set));
        Ok(())
    }

    /// Drives the `INACTIVE -> ACTIVE` edge for an already-bound owner whose
    /// activity state changed after binding (demand arriving later).
    #[must_use]
    pub fn back_prop(&self) -> Option<StateValue> {
        let owner = self.owner.load_full()?;
        self.state.back_prop(|allow, on_set| owner.activate(allow, on_set))
    }

    /// Deactivates this activator (`{ACTIVE, QUEUEING, INIT} -> INACTIVE`),
    /// running the bound owner's `soft_deactivate` iff it was `ACTIVE`.
    ///
    /// # Errors
    /// Propagates [`ReactiveError::ActivationTimeout`] from the bounded
    /// spin-wait described in [`BinaryState::deactivate`].
    pub fn deactivate(&self) -> Result<StateValue, ReactiveError> {
        let owner = self.owner.load_full();
        self.state.deactivate(
            || {
                if let Some(owner) = owner {
                    owner.soft_deactivate();
                }
            },
            SpinnerConfig::get(),
        )
    }

    /// Removes the current owner (CAS `owner -> None`), then shuts the
    /// activator off, running `soft_deactivate` iff it was `ACTIVE`.
    ///
    /// A no-op if `expected` is not the currently bound owner.
    pub fn remove_owner(&self, expected: &Arc<O>) {
        let current = self.owner.load_full();
        let matches = matches!(&current, Some(o) if Arc::ptr_eq(o, expected));
        if !matches {
            return;
        }
        let _ = self.owner.compare_and_swap(&current, None);
        self.shut_off();
    }

    /// Unconditionally shuts this activator off (terminal `OFF`), running
    /// the bound owner's `soft_deactivate` iff it was `ACTIVE`.
    pub fn shut_off(&self) {
        let owner = self.owner.load_full();
        self.state.shut_off(|| {
            if let Some(owner) = owner {
                owner.soft_deactivate();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Probe {
        active: AtomicBool,
        soft_deactivate_calls: AtomicUsize,
    }

    impl ActivationOwner for Probe {
        fn is_active(&self) -> bool {
            self.active.load(Ordering::Acquire)
        }
        fn activate(&self, _allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool) -> bool {
            on_set()
        }
        fn soft_deactivate(&self) {
            self.soft_deactivate_calls.fetch_add(1, Ordering::AcqRel);
        }
    }

    #[test]
    fn second_owner_binding_is_rejected() {
        let gsa: Gsa<Probe> = Gsa::new();
        let owner = Arc::new(Probe { active: AtomicBool::new(false), soft_deactivate_calls: AtomicUsize::new(0) });
        gsa.set_owner(Arc::clone(&owner)).expect("first bind succeeds");
        let other = Arc::new(Probe { active: AtomicBool::new(false), soft_deactivate_calls: AtomicUsize::new(0) });
        let err = gsa.set_owner(other).expect_err("second bind must fail");
        assert!(matches!(err, ReactiveError::DuplicateOwner));
    }

    #[test]
    fn binding_an_active_owner_activates_immediately() {
        let gsa: Gsa<Probe> = Gsa::new();
        let owner = Arc::new(Probe { active: AtomicBool::new(true), soft_deactivate_calls: AtomicUsize::new(0) });
        gsa.set_owner(owner).expect("bind succeeds");
        assert_eq!(gsa.state(), StateValue::Active);
    }

    #[test]
    fn shut_off_runs_soft_deactivate_once_from_active() {
        let gsa: Gsa<Probe> = Gsa::new();
        let owner = Arc::new(Probe { active: AtomicBool::new(true), soft_deactivate_calls: AtomicUsize::new(0) });
        gsa.set_owner(Arc::clone(&owner)).expect("bind succeeds");
        gsa.shut_off();
        assert_eq!(gsa.state(), StateValue::Off);
        assert_eq!(owner.soft_deactivate_calls.load(Ordering::Acquire), 1);
        gsa.shut_off();
        assert_eq!(owner.soft_deactivate_calls.load(Ordering::Acquire), 1, "soft_deactivate must not re-fire");
    }
}
