// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

//! Scenario 4: a two-parent join path merges updates from either side into a
//! single child value, dispatching once per contributing parent push with
//! the other component held steady.

use std::sync::{Arc, Mutex};

use echo_reactive::Path;

#[test]
fn join_merges_updates_from_either_parent_monotonically() {
    let x: Path<i32> = Path::input();
    let y: Path<i32> = Path::input();
    let joined: Path<(i32, i32)> = x.join(
        &y,
        |current: &(i32, i32), incoming: &i32| (*incoming, current.1),
        |current: &(i32, i32), incoming: &i32| (current.0, *incoming),
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::clone(&seen);
    joined.add(Arc::new(move |v: &(i32, i32)| collector.lock().unwrap().push(*v)));

    let x_source = x.open_source();
    let y_source = y.open_source();

    x_source.accept(1).expect("single-threaded producer");
    y_source.accept(2).expect("single-threaded producer");

    assert_eq!(joined.get(), Some((1, 2)));
    // Intermediate dispatches are monotonic: left lands first, then right
    // folds in without disturbing the already-settled left component.
    assert_eq!(*seen.lock().unwrap(), vec![(1, 0), (1, 2)]);
}

#[test]
fn join_starts_from_the_default_merge_seed() {
    let x: Path<i32> = Path::input();
    let y: Path<i32> = Path::input();
    let joined: Path<(i32, i32)> = x.join(
        &y,
        |current: &(i32, i32), incoming: &i32| (*incoming, current.1),
        |current: &(i32, i32), incoming: &i32| (current.0, *incoming),
    );
    joined.add(Arc::new(|_: &(i32, i32)| {}));
    assert_eq!(joined.get(), None, "no parent has pushed yet");

    y.open_source().accept(9).expect("single-threaded producer");
    assert_eq!(joined.get(), Some((0, 9)));
}
