// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

//! Scenario 1 from the design notes: a single map edge delivers transformed
//! values to a terminal observer in the order they were pushed.

use std::sync::{Arc, Mutex};

use echo_reactive::Path;

#[test]
fn linear_map_delivers_in_order() {
    let input: Path<i32> = Path::input();
    let doubled = input.map(|x| x * 2);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::clone(&seen);
    doubled.add(Arc::new(move |v: &i32| collector.lock().unwrap().push(*v)));

    let source = input.open_source();
    for v in [1, 2, 3] {
        source.accept(v).expect("single-threaded producer");
    }

    assert_eq!(*seen.lock().unwrap(), vec![2, 4, 6]);
}

#[test]
fn chained_maps_both_become_active_on_demand() {
    let input: Path<i32> = Path::input();
    let once = input.map(|x| x + 1);
    let twice = once.map(|x| x * 10);

    assert!(!once.is_active());
    assert!(!twice.is_active());

    twice.add(Arc::new(|_: &i32| {}));
    assert!(once.is_active());
    assert!(twice.is_active());
}
