// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `BinaryState`: the small integer state machine behind every activator.
//!
//! ```text
//! INIT ─(claim owner, not active)───► INACTIVE
//! INIT ─(claim owner, active)──────► QUEUEING ─(onSet)──► ACTIVE
//! INACTIVE ─(backProp)─────────────► QUEUEING ─(onSet)──► ACTIVE
//! ACTIVE/QUEUEING ─(deactivate)────► INACTIVE (softDeactivate if was ACTIVE)
//! {any} ─(shutOff)─────────────────► OFF (softDeactivate if was ACTIVE)
//! ```
//!
//! `INIT` is a pre-owned latch, `QUEUEING` a transient activation-in-progress
//! gate, `ACTIVE` steady-on, `INACTIVE` steady-off, `OFF` a terminal
//! shut-off. All transitions are single atomic compare-exchanges; there is
//! no lock anywhere in this type.

use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use tracing::{trace, warn};

use crate::config::SpinnerConfig;
use crate::error::ReactiveError;

/// A state of [`BinaryState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StateValue {
    /// Pre-owned latch; no owner has been bound yet.
    Init = 0,
    /// Steady-off: owner bound, not activated (or deactivated).
    Inactive = 1,
    /// Transient activation-in-progress gate.
    Queueing = 2,
    /// Steady-on.
    Active = 3,
    /// Terminal shut-off. No further activation is possible.
    Off = 4,
}

impl StateValue {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Init,
            1 => Self::Inactive,
            2 => Self::Queueing,
            3 => Self::Active,
            _ => Self::Off,
        }
    }
}

/// The activation state machine.
#[derive(Debug)]
pub struct BinaryState {
    state: AtomicU8,
}

impl Default for BinaryState {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryState {
    /// Creates a new state machine in `INIT`.
    #[must_use]
    pub const fn new() -> Self {
        Self { state: AtomicU8::new(StateValue::Init as u8) }
    }

    /// Returns the current state. This is a plain acquire load: callers
    /// racing a concurrent transition may observe a state that is already
    /// stale by the time they act on it, which is expected of every
    /// lock-free read in this crate.
    #[must_use]
    pub fn get(&self) -> StateValue {
        StateValue::from_u8(self.state.load(Ordering::Acquire))
    }

    fn cas(&self, from: StateValue, to: StateValue) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `INIT -> INACTIVE` or `INIT -> QUEUEING -> ACTIVE` depending on
    /// `owner_active`, run once when a [`crate::activator::Gsa`] binds its
    /// owner.
    ///
    /// `activate` is called only when `owner_active` is true, after the
    /// `INIT -> QUEUEING` transition succeeds; it is given an `allow` gate
    /// (true while still `QUEUEING`) and an `on_set` callback (the
    /// `QUEUEING -> ACTIVE` CAS). Returns the resulting state.
    pub fn claim_owner(
        &self,
        owner_active: bool,
        activate: impl FnOnce(&dyn Fn() -> bool, &dyn Fn() -> bool) -> bool,
    ) -> StateValue {
        if !owner_active {
            if self.cas(StateValue::Init, StateValue::Inactive) {
                return StateValue::Inactive;
            }
            return self.get();
        }

        if self.cas(StateValue::Init, StateValue::Queueing) {
            let allow = || self.get() == StateValue::Queueing;
            let on_set = || self.cas(StateValue::Queueing, StateValue::Active);
            if activate(&allow, &on_set) {
                return StateValue::Active;
            }
        }
        self.get()
    }

    /// `INACTIVE -> QUEUEING -> ACTIVE`, the upward activation edge driven by
    /// demand (`backProp`). Returns `Some(ACTIVE)` if this call installed the
    /// activation, else `None` (either the state was not `INACTIVE`, or the
    /// activation callback declined to set `ACTIVE`).
    pub fn back_prop(
        &self,
        activate: impl FnOnce(&dyn Fn() -> bool, &dyn Fn() -> bool) -> bool,
    ) -> Option<StateValue> {
        if !self.cas(StateValue::Inactive, StateValue::Queueing) {
            return None;
        }
        let allow = || self.get() == StateValue::Queueing;
        let on_set = || self.cas(StateValue::Queueing, StateValue::Active);
        if activate(&allow, &on_set) {
            trace!("back-prop activated");
            Some(StateValue::Active)
        } else {
            None
        }
    }

    /// `{QUEUEING, ACTIVE, INIT} -> INACTIVE`. Calls `soft_deactivate` iff
    /// the observed previous state was `ACTIVE`.
    ///
    /// For a mapped edge whose previous state was `INACTIVE` (a concurrent
    /// `back_prop` may be mid-flight, about to land on `ACTIVE`), this spins
    /// up to `spinner.tries` tight iterations, then up to `spinner.max_rounds`
    /// parks of `spinner.park` each, waiting for that racing activation to
    /// settle. Exceeding the bound raises [`ReactiveError::ActivationTimeout`].
    pub fn deactivate(
        &self,
        soft_deactivate: impl FnOnce(),
        spinner: SpinnerConfig,
    ) -> Result<StateValue, ReactiveError> {
        for from in [StateValue::Active, StateValue::Queueing, StateValue::Init] {
            if self.cas(from, StateValue::Inactive) {
                if from == StateValue::Active {
                    soft_deactivate();
                }
                return Ok(StateValue::Inactive);
            }
        }

        // Observed state was already INACTIVE: a concurrent activation may
        // be mid-flight. Wait for it to settle rather than racing ahead.
        if self.get() == StateValue::Inactive {
            return Ok(StateValue::Inactive);
        }

        for _round in 0..spinner.max_rounds {
            for _ in 0..spinner.tries {
                match self.get() {
                    StateValue::Inactive => return Ok(StateValue::Inactive),
                    StateValue::Active | StateValue::Queueing => {
                        for from in [StateValue::Active, StateValue::Queueing] {
                            if self.cas(from, StateValue::Inactive) {
                                if from == StateValue::Active {
                                    soft_deactivate();
                                }
                                return Ok(StateValue::Inactive);
                            }
                        }
                    }
                    StateValue::Off | StateValue::Init => return Ok(self.get()),
                }
                std::hint::spin_loop();
            }
            thread::park_timeout(spinner.park);
        }

        Err(ReactiveError::ActivationTimeout)
    }

    /// Unconditional CAS loop to `OFF`. Calls `soft_deactivate` iff the
    /// observed previous state was `ACTIVE`.
    pub fn shut_off(&self, soft_deactivate: impl FnOnce()) {
        loop {
            let current = self.get();
            if current == StateValue::Off {
                return;
            }
            if self.cas(current, StateValue::Off) {
                if current == StateValue::Active {
                    soft_deactivate();
                }
                return;
            }
        }
    }
}
