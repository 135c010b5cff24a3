// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy.
//!
//! CAS contention, `exclude_in`/`exclude_out` vetoes, and map results equal
//! to the witness are *not* errors — they are the normal silent-drop
//! mechanism and surface as `false`/`None` return values. Only usage
//! violations, concurrency violations, and the bounded-spin timeout raise.

use thiserror::Error;

/// Errors raised by the reactive core.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A [`crate::activator::Gsa`] already has an owner bound.
    #[error("activator already has an owner")]
    DuplicateOwner,
    /// A [`crate::path::Ref`] is already assigned to a different path.
    #[error("ref is already assigned")]
    DuplicateRef,
    /// `Path::remove` was called with an observer that was never added.
    #[error("observer is not registered on this path")]
    UnknownObserver,
    /// A switch-map mapping function produced no target path (a usage error,
    /// not a normal "no match" outcome — the mapper's contract is total).
    #[error("switch-map mapper returned no path for the given input")]
    NullSwitchMapTarget,
    /// A non-contentious [`crate::cache::Source`] observed a concurrent swap.
    ///
    /// `Source` is for single-threaded producers; a racing writer is a usage
    /// bug, not ordinary contention.
    #[error("concurrent swap observed on a non-contentious source")]
    ConcurrentSourceSwap,
    /// `hard_remove_30_throw` exhausted its retry budget without observing
    /// a stable receivers array.
    #[error("receiver removal exceeded its retry budget")]
    ReceiverRemovalExhausted,
    /// The bounded spin-wait in `BinaryState::deactivate` (mapped-edge
    /// `INACTIVE -> ACTIVE` race) exhausted its configured rounds.
    #[error("timed out waiting for a concurrent activation to settle")]
    ActivationTimeout,
    /// Looking up a [`crate::path::Ref`] that has not been assigned to any path.
    #[error("ref is not assigned to any path")]
    RefNotFound,
}
