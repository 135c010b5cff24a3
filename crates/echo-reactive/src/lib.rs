// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! echo-reactive: a single-state, lock-free reactive dataflow core.
//!
//! Programs declare a DAG of value-holding [`Path`] nodes. Each path caches
//! exactly one logical value at a time; updates propagate atomically via
//! versioned compare-and-swap, and observers receive values only while a
//! demand path exists down to a live input. Contended writers never block:
//! under contention the newest value wins and older in-flight values are
//! silently dropped (see [`cache`] for the backpressure strategies this
//! implies).
//!
//! The crate has four load-bearing subsystems:
//! - [`cache`] — the versioned single-slot atomic store and its swap strategies.
//! - [`state`] / [`activator`] / [`register`] — the activation state machine.
//! - [`path`] / [`propagator`] — the path engine (map, switch-map, join edges).
//! - [`receivers`] / [`publisher`] — demand tracking and observer fan-out.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names,
    clippy::use_self
)]

/// Shuttable activators (`GSA`) and the single-owner binding contract.
pub mod activator;
/// The versioned single-slot atomic store and its derived swap strategies.
pub mod cache;
/// Copy-on-write array, the one shared-array primitive used by receivers and publishers.
pub mod cow;
/// Process-wide, init-once spinner/timeout configuration and the debug flag.
pub mod config;
/// Error taxonomy for usage and concurrency violations.
pub mod error;
/// The executor abstraction used by backpressure-dropping swap strategies.
pub mod executor;
/// Path nodes: builders, lifecycle, and the public graph-construction API.
pub mod path;
/// Fan-out side of a path: subscriber bookkeeping and dispatch.
pub mod publisher;
/// Propagator wiring between parent and child caches (map, switch-map, join).
pub mod propagator;
/// Demand tracking: the copy-on-write receiver array and dispatcher swap.
pub mod receivers;
/// The versioned at-most-one activator slot used to linearize switch-map rebinds.
pub mod register;
/// The process-wide `Ref -> Path` registry.
pub mod refs;
/// The `BinaryState` activation state machine.
pub mod state;
/// The versioned value type `V<T>`.
pub mod versioned;

pub use activator::{ActivationOwner, Gsa};
pub use cache::Cache;
pub use error::ReactiveError;
pub use path::{Builder, Path, Ref};
pub use state::{BinaryState, StateValue};
pub use versioned::Versioned;
