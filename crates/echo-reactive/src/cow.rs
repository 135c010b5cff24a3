// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A copy-on-write array: the one shared-array primitive behind both the
//! receivers manager and the publisher's subscriber list.
//!
//! Reads are lock-free snapshot reads of the current `Arc<[T]>`. Writes
//! (`push`/`retain`) clone the current snapshot, mutate the clone, and swap
//! it in via CAS, retrying on contention. There is no mutex anywhere in this
//! type.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// A lock-free copy-on-write array of `T`.
pub struct CowArray<T> {
    inner: ArcSwap<Vec<T>>,
}

impl<T> Default for CowArray<T> {
    fn default() -> Self {
        Self { inner: ArcSwap::from_pointee(Vec::new()) }
    }
}

impl<T: Clone> CowArray<T> {
    /// Returns a snapshot of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.inner.load_full()
    }

    /// Returns the number of elements in the current snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Returns whether the current snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Appends `item`, retrying under contention. Returns the index it was
    /// inserted at (the length of the array immediately before this push won
    /// the race).
    pub fn push(&self, item: T) -> usize {
        loop {
            let current = self.inner.load_full();
            let mut next = (*current).clone();
            let index = next.len();
            next.push(item.clone());
            let next = Arc::new(next);
            let prev = self.inner.compare_and_swap(&current, next);
            if Arc::ptr_eq(&prev, &current) {
                return index;
            }
        }
    }

    /// Removes the first element matching `pred`, retrying under
    /// contention. Returns `true` if an element was removed, and whether the
    /// array became empty as a result (via `became_empty`).
    pub fn remove_first(&self, pred: impl Fn(&T) -> bool) -> RemoveOutcome {
        loop {
            let current = self.inner.load_full();
            let Some(pos) = current.iter().position(&pred) else {
                return RemoveOutcome { removed: false, became_empty: current.is_empty() };
            };
            let mut next = (*current).clone();
            next.remove(pos);
            let became_empty = next.is_empty();
            let next = Arc::new(next);
            let prev = self.inner.compare_and_swap(&current, next);
            if Arc::ptr_eq(&prev, &current) {
                return RemoveOutcome { removed: true, became_empty };
            }
        }
    }
}

/// Result of a [`CowArray::remove_first`] attempt.
#[derive(Debug, Clone, Copy)]
pub struct RemoveOutcome {
    /// Whether a matching element was found and removed.
    pub removed: bool,
    /// Whether the array is empty after the removal (or was already empty).
    pub became_empty: bool,
}
