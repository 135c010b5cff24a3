// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

//! Scenario 3: switch-map rebinds its inner path at runtime, and once a
//! newer selection wins the register, the old mapping is `OFF` — further
//! pushes on the retired source are not observed downstream.

use std::sync::{Arc, Mutex};

use echo_reactive::{Builder, Path};

#[test]
fn switch_map_reroutes_and_retires_old_mapping() {
    let a: Path<String> = Path::input_with(Builder::new().initial_value("a1".to_string()));
    let b: Path<String> = Path::input_with(Builder::new().initial_value("b1".to_string()));
    let selector: Path<bool> = Path::input();

    let a_for_select = a.clone();
    let b_for_select = b.clone();
    let routed = selector.switch_map(move |pick: &bool| if *pick { a_for_select.clone() } else { b_for_select.clone() });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::clone(&seen);
    routed.add(Arc::new(move |v: &String| collector.lock().unwrap().push(v.clone())));

    let selector_source = selector.open_source();
    selector_source.accept(true).expect("single-threaded producer");
    assert_eq!(seen.lock().unwrap().last(), Some(&"a1".to_string()));

    let a_source = a.open_source();
    a_source.accept("a2".to_string()).expect("single-threaded producer");
    assert_eq!(seen.lock().unwrap().last(), Some(&"a2".to_string()));

    selector_source.accept(false).expect("single-threaded producer");
    assert_eq!(seen.lock().unwrap().last(), Some(&"b1".to_string()));

    // `a` is no longer wired in: this push must not reach `routed`.
    a_source.accept("a3".to_string()).expect("single-threaded producer");
    assert_eq!(seen.lock().unwrap().last(), Some(&"b1".to_string()));
}

#[test]
fn repeated_selection_of_the_same_target_still_delivers_fresh_values() {
    let source: Path<i32> = Path::input();
    let selector: Path<i32> = Path::input();
    let src_for_select = source.clone();
    let routed = selector.switch_map(move |_: &i32| src_for_select.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::clone(&seen);
    routed.add(Arc::new(move |v: &i32| collector.lock().unwrap().push(*v)));

    let selector_source = selector.open_source();
    let producer = source.open_source();

    selector_source.accept(1).expect("single-threaded producer");
    producer.accept(10).expect("single-threaded producer");
    selector_source.accept(2).expect("single-threaded producer");
    producer.accept(20).expect("single-threaded producer");

    assert_eq!(*seen.lock().unwrap(), vec![10, 20]);
}
