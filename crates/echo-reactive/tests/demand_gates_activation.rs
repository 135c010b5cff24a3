// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

//! Scenario 6: demand gates activation through an entire chain. Subscribing
//! to the tail activates every intermediate node; unsubscribing deactivates
//! them all and releases the head's dispatch.

use std::sync::{Arc, Mutex};

use echo_reactive::publisher::Subscriber;
use echo_reactive::Path;

#[test]
fn subscribing_and_unsubscribing_gates_the_whole_chain() {
    let head: Path<i32> = Path::input();
    let mid = head.map(|x| x + 1);
    let tail = mid.map(|x| x * 2);

    assert!(!head.is_active());
    assert!(!mid.is_active());
    assert!(!tail.is_active());

    let observer: Subscriber<i32> = Arc::new(|_| {});
    tail.add(Arc::clone(&observer));

    assert!(head.is_active(), "demand must back-prop all the way to the head");
    assert!(mid.is_active());
    assert!(tail.is_active());

    tail.remove(&observer).expect("observer was registered");

    assert!(!tail.is_active());
    assert!(!mid.is_active());
    assert!(!head.is_active(), "the head must release its dispatch once all demand is gone");
}

#[test]
fn a_second_tail_observer_keeps_the_chain_active_after_the_first_leaves() {
    let head: Path<i32> = Path::input();
    let tail = head.map(|x| *x);

    let first: Subscriber<i32> = Arc::new(|_| {});
    let second: Subscriber<i32> = Arc::new(|_| {});
    tail.add(Arc::clone(&first));
    tail.add(Arc::clone(&second));

    tail.remove(&first).expect("first was registered");
    assert!(tail.is_active(), "the second observer still holds demand");
    assert!(head.is_active());

    tail.remove(&second).expect("second was registered");
    assert!(!tail.is_active());
    assert!(!head.is_active());
}

#[test]
fn reactivating_an_idle_mapped_path_redelivers_the_latest_parent_value_exactly_once() {
    // `activate . deactivate . activate` on an idle path equals a single
    // `activate` from the observer's perspective: a freshly (re)activated
    // subscriber is seeded from the parent's current consumable value
    // exactly once, even though no subscriber was present to observe
    // whatever the parent did while this path was idle.
    let input: Path<i32> = Path::input();
    let doubled = input.map(|x| x * 2);
    let source = input.open_source();
    source.accept(7).expect("single-threaded producer");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::clone(&seen);
    let first: Subscriber<i32> = Arc::new(move |v| collector.lock().unwrap().push(*v));

    doubled.add(Arc::clone(&first));
    assert!(doubled.is_active());
    doubled.remove(&first).expect("first was registered");
    assert!(!doubled.is_active());

    // While idle, `doubled` has no receiver wired onto `input`, so this push
    // is invisible to it until the next activation re-seeds from scratch.
    source.accept(21).expect("single-threaded producer");

    let collector = Arc::clone(&seen);
    let second: Subscriber<i32> = Arc::new(move |v| collector.lock().unwrap().push(*v));
    doubled.add(Arc::clone(&second));
    assert!(doubled.is_active());

    assert_eq!(*seen.lock().unwrap(), vec![14, 42], "each activation delivers the parent's current value exactly once");
}

#[test]
fn add_remove_add_returns_the_path_to_the_same_observed_state_as_a_single_add() {
    let head: Path<i32> = Path::input();
    let tail = head.map(|x| x + 1);

    let observer: Subscriber<i32> = Arc::new(|_| {});
    tail.add(Arc::clone(&observer));
    tail.remove(&observer).expect("observer was registered");
    tail.add(Arc::clone(&observer));

    assert!(tail.is_active());
    assert!(head.is_active());
    assert!(tail.contains(&observer));
    tail.remove(&observer).expect("observer is registered exactly once");
    assert!(!tail.is_active());
    assert!(!head.is_active());
}
