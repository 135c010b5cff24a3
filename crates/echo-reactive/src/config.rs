// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Process-wide, init-once configuration: the bounded spin-wait parameters
//! and the debug flag.
//!
//! Both are process-wide singletons (§6, §9 of the design notes), but they
//! differ in freeze semantics: [`SpinnerConfig`] is frozen on first read or
//! first explicit install (whichever happens first), matching "injected once
//! at process init; after first use the config is frozen". The debug flag is
//! a plain `AtomicBool` that may be toggled any number of times — the design
//! notes only require it be "read once per call site", not that it be
//! immutable, so this crate resolves that open question in favor of a live
//! toggle rather than a second freeze-on-first-use cell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

/// Parameters for the bounded spin-wait used when [`crate::state::BinaryState::deactivate`]
/// races a concurrent activation of a mapped edge.
#[derive(Debug, Clone, Copy)]
pub struct SpinnerConfig {
    /// Tight-loop iterations attempted per round before parking.
    pub tries: u32,
    /// Duration parked between rounds once `tries` is exhausted.
    pub park: Duration,
    /// Number of park rounds attempted before raising [`crate::error::ReactiveError::ActivationTimeout`].
    pub max_rounds: u32,
}

impl Default for SpinnerConfig {
    /// The defaults named by the specification: ~3200 tight iterations,
    /// then up to 8 rounds of ~250ns parks.
    fn default() -> Self {
        Self { tries: 3200, park: Duration::from_nanos(250), max_rounds: 8 }
    }
}

static SPINNER_CONFIG: OnceLock<SpinnerConfig> = OnceLock::new();

impl SpinnerConfig {
    /// Installs the process-wide spinner configuration.
    ///
    /// Returns `Err(existing)` if a configuration was already installed
    /// (either explicitly, or implicitly via the first call to [`SpinnerConfig::get`]).
    pub fn install(cfg: Self) -> Result<(), Self> {
        SPINNER_CONFIG.set(cfg).map_err(|rejected| rejected)
    }

    /// Returns the process-wide spinner configuration, installing the
    /// [`Default`] if none has been installed yet. This first call freezes
    /// the configuration for the remainder of the process.
    #[must_use]
    pub fn get() -> Self {
        *SPINNER_CONFIG.get_or_init(Self::default)
    }
}

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Returns whether debug mode is enabled.
///
/// When enabled, nodes capture a construction-site backtrace and attach it
/// to usage/concurrency errors to aid diagnosis. No other observable
/// behavior depends on this flag.
#[must_use]
pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// Enables or disables debug mode.
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}
