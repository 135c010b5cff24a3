// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `SysRegister`: a versioned at-most-one activator slot.
//!
//! This is the linearization point of switch-map: only the newest mapping
//! is ever active, older mappings transition to `OFF`, and a slower, older
//! activation can never resurrect one that a newer registration superseded.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::activator::{ActivationOwner, Gsa};

struct Entry<O: ActivationOwner> {
    version: u64,
    activator: Option<Arc<Gsa<O>>>,
}

impl<O: ActivationOwner> Default for Entry<O> {
    fn default() -> Self {
        Self { version: 0, activator: None }
    }
}

/// A versioned slot holding at most one [`Gsa`] at a time.
pub struct SysRegister<O: ActivationOwner> {
    slot: ArcSwap<Entry<O>>,
}

impl<O: ActivationOwner> Default for SysRegister<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ActivationOwner> SysRegister<O> {
    /// Creates an empty register at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self { slot: ArcSwap::from_pointee(Entry::default()) }
    }

    /// Returns the version of the currently registered activator, if any.
    #[must_use]
    pub fn current_version(&self) -> u64 {
        self.slot.load().version
    }

    /// Registers `gsa` at `new_version`, retiring whatever was previously
    /// registered.
    ///
    /// `live_version_check` reports the *currently desired* version from the
    /// caller's perspective (e.g. the switch-map node's own cache version at
    /// the moment of the attempted registration); if it no longer agrees
    /// with `new_version` by the time this call lands, the registration is
    /// rejected (or, if it already landed, immediately retired).
    ///
    /// `should_activate` tells the register whether the owning node
    /// currently has demand; when true, the newly installed activator is
    /// synchronized (asked to activate) as part of this call.
    ///
    /// Returns `true` iff `gsa` became (and, at the moment this call
    /// returns, remains) the registered activator.
    pub fn register(
        &self,
        new_version: u64,
        live_version_check: impl Fn() -> u64,
        gsa: Arc<Gsa<O>>,
        should_activate: bool,
    ) -> bool {
        loop {
            let current = self.slot.load_full();
            if current.version >= new_version || live_version_check() != new_version {
                return false;
            }

            let successor = Arc::new(Entry { version: new_version, activator: Some(Arc::clone(&gsa)) });
            let prev = self.slot.compare_and_swap(&current, successor);
            if !Arc::ptr_eq(&prev, &current) {
                // Lost the race; re-read and retry while the guards still hold.
                continue;
            }

            if should_activate {
                let _ = gsa.back_prop();
            }
            if let Some(old) = &current.activator {
                old.shut_off();
            }

            if live_version_check() != new_version {
                gsa.shut_off();
                return false;
            }
            return true;
        }
    }

    /// Unconditionally retires whatever is currently registered, advancing
    /// the register one version past whatever it held. Used when the owning
    /// switch-map path itself loses all demand and the currently selected
    /// inner mapping must be torn down even though no newer one is waiting.
    pub fn shut_off_current(&self) {
        loop {
            let current = self.slot.load_full();
            if current.activator.is_none() {
                return;
            }
            let successor = Arc::new(Entry { version: current.version + 1, activator: None });
            let prev = self.slot.compare_and_swap(&current, successor);
            if Arc::ptr_eq(&prev, &current) {
                if let Some(old) = &current.activator {
                    old.shut_off();
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Probe {
        shut_off_calls: AtomicUsize,
    }

    impl ActivationOwner for Probe {
        fn is_active(&self) -> bool {
            false
        }
        fn activate(&self, _allow: &dyn Fn() -> bool, on_set: &dyn Fn() -> bool) -> bool {
            on_set()
        }
        fn soft_deactivate(&self) {
            self.shut_off_calls.fetch_add(1, Ordering::AcqRel);
        }
    }

    #[test]
    fn newer_registration_retires_older() {
        let register: SysRegister<Probe> = SysRegister::new();
        let desired = AtomicUsize::new(1);

        let first = Arc::new(Gsa::new());
        first.set_owner(Arc::new(Probe { shut_off_calls: AtomicUsize::new(0) })).expect("bind");
        assert!(register.register(1, || desired.load(Ordering::Acquire) as u64, Arc::clone(&first), true));

        desired.store(2, Ordering::Release);
        let second = Arc::new(Gsa::new());
        second.set_owner(Arc::new(Probe { shut_off_calls: AtomicUsize::new(0) })).expect("bind");
        assert!(register.register(2, || desired.load(Ordering::Acquire) as u64, Arc::clone(&second), true));

        assert_eq!(register.current_version(), 2);
    }

    #[test]
    fn stale_registration_is_rejected() {
        let register: SysRegister<Probe> = SysRegister::new();
        let desired = AtomicBool::new(false);
        let stale = Arc::new(Gsa::new());
        stale.set_owner(Arc::new(Probe { shut_off_calls: AtomicUsize::new(0) })).expect("bind");
        // live_version_check never agrees with new_version=1.
        let _ = desired;
        assert!(!register.register(1, || 0, stale, true));
    }
}
