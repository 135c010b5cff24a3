// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Process-wide `Ref -> Path` registry.
//!
//! A [`Ref`] and the path it names form an injective pairing: at most one
//! live path may hold a given `Ref`. The registry stores only a type-erased
//! `Weak` handle, so resolving never keeps a path alive on its own, and a
//! dropped path's `Ref` becomes resolvable again (reusing the same `Ref`
//! value for a different path is still rejected while the original is live).

use std::any::Any;
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;

use crate::error::ReactiveError;
use crate::path::{Path, PathInner, Ref};

type ErasedInner = dyn Any + Send + Sync;

fn table() -> &'static ArcSwap<FxHashMap<Ref, Weak<ErasedInner>>> {
    static TABLE: OnceLock<ArcSwap<FxHashMap<Ref, Weak<ErasedInner>>>> = OnceLock::new();
    TABLE.get_or_init(|| ArcSwap::from_pointee(FxHashMap::default()))
}

/// Registers `r` for `inner`, failing if `r` already names a still-live path.
pub(crate) fn register<T: Send + Sync + 'static>(r: Ref, inner: &Arc<PathInner<T>>) -> Result<(), ReactiveError> {
    let erased: Weak<ErasedInner> = Arc::downgrade(inner);
    loop {
        let current = table().load_full();
        if current.get(&r).is_some_and(|existing| existing.upgrade().is_some()) {
            return Err(ReactiveError::DuplicateRef);
        }
        let mut next = (*current).clone();
        next.insert(r, erased.clone());
        let next = Arc::new(next);
        let prev = table().compare_and_swap(&current, next);
        if Arc::ptr_eq(&prev, &current) {
            return Ok(());
        }
    }
}

/// Removes `r` from the registry, if present.
pub(crate) fn unregister(r: Ref) {
    loop {
        let current = table().load_full();
        if !current.contains_key(&r) {
            return;
        }
        let mut next = (*current).clone();
        next.remove(&r);
        let next = Arc::new(next);
        let prev = table().compare_and_swap(&current, next);
        if Arc::ptr_eq(&prev, &current) {
            return;
        }
    }
}

/// Resolves `r` to the path it currently names.
///
/// # Errors
/// Returns [`ReactiveError::RefNotFound`] if `r` was never assigned, was
/// assigned to a path of a different element type, or names a path that has
/// since been dropped.
pub fn resolve<T: Clone + PartialEq + Send + Sync + 'static>(r: Ref) -> Result<Path<T>, ReactiveError> {
    let weak = table().load().get(&r).cloned().ok_or(ReactiveError::RefNotFound)?;
    let inner = weak.upgrade().ok_or(ReactiveError::RefNotFound)?;
    let inner = inner.downcast::<PathInner<T>>().map_err(|_| ReactiveError::RefNotFound)?;
    Ok(Path::from_inner(inner))
}
