//! Merged and combined-latest signals.

use parking_lot::Mutex;
use signals::{combine_latest, combine_latest3, merge, merge3, Observer, Signal, Violation};
use std::sync::Arc;

fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |v| sink.lock().push(v))
}

#[test]
fn test_combine_latest_waits_for_every_source() {
    let numbers = Signal::<i32>::retaining();
    let names = Signal::<String>::retaining();
    let observer = Observer::new();
    let (seen, callback) = recorder::<(i32, String)>();

    let combined = combine_latest(&numbers, &names);
    combined.subscribe(&observer, callback);

    numbers.fire(1);
    numbers.fire(2);
    assert!(seen.lock().is_empty());

    names.fire("a".to_string());
    numbers.fire(3);
    names.fire("b".to_string());

    assert_eq!(
        *seen.lock(),
        vec![
            (2, "a".to_string()),
            (3, "a".to_string()),
            (3, "b".to_string())
        ]
    );
}

#[test]
fn test_combine_latest_supports_subscribe_past() {
    let one = Signal::<i32>::retaining();
    let two = Signal::<i32>::retaining();
    let observer = Observer::new();
    let (seen, callback) = recorder::<(i32, i32)>();

    let combined = combine_latest(&one, &two);
    one.fire(1);
    two.fire(2);
    combined.subscribe_past(&observer, callback);

    assert_eq!(*seen.lock(), vec![(1, 2)]);
}

#[test]
fn test_combine_latest_requires_retaining_sources() {
    let retaining = Signal::<i32>::retaining();
    let plain = Signal::<i32>::new();
    let violations = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&violations);
    plain.set_violation_handler(move |v: &Violation| sink.lock().push(v.clone()));

    let _combined = combine_latest(&retaining, &plain);

    assert_eq!(*violations.lock(), vec![Violation::PastDataNotRetained]);
}

#[test]
fn test_combine_latest3_fires_per_upstream_fire() {
    let a = Signal::<i32>::retaining();
    let b = Signal::<bool>::retaining();
    let c = Signal::<&'static str>::retaining();
    let observer = Observer::new();
    let (seen, callback) = recorder::<(i32, bool, &'static str)>();

    let combined = combine_latest3(&a, &b, &c);
    combined.subscribe(&observer, callback);

    a.fire(1);
    b.fire(true);
    c.fire("x");
    a.fire(2);

    assert_eq!(*seen.lock(), vec![(1, true, "x"), (2, true, "x")]);
}

#[test]
fn test_merge_reports_missing_sources_as_none() {
    let one = Signal::<i32>::new();
    let two = Signal::<String>::new();
    let observer = Observer::new();
    let (seen, callback) = recorder::<(Option<i32>, Option<String>)>();

    let merged = merge(&one, &two);
    merged.subscribe(&observer, callback);

    one.fire(1);
    two.fire("b".to_string());
    one.fire(2);

    assert_eq!(
        *seen.lock(),
        vec![
            (Some(1), None),
            (Some(1), Some("b".to_string())),
            (Some(2), Some("b".to_string()))
        ]
    );
}

#[test]
fn test_merge_accepts_non_retaining_sources() {
    let one = Signal::<i32>::new();
    let two = Signal::<i32>::new();
    let violations = Arc::new(Mutex::new(0));
    for source in [&one, &two] {
        let sink = Arc::clone(&violations);
        source.set_violation_handler(move |_| *sink.lock() += 1);
    }

    let merged = merge(&one, &two);
    one.fire(1);

    assert_eq!(*violations.lock(), 0);
    assert_eq!(merged.last_data(), Some((Some(1), None)));
}

#[test]
fn test_merge3_mixes_retaining_and_plain_sources() {
    let a = Signal::<i32>::retaining();
    let b = Signal::<i32>::new();
    let c = Signal::<i32>::retaining();
    a.fire(1);
    b.fire(2);

    let merged = merge3(&a, &b, &c);
    assert_eq!(merged.last_data(), Some((Some(1), None, None)));

    b.fire(3);
    assert_eq!(merged.last_data(), Some((Some(1), Some(3), None)));
}

#[test]
fn test_dropping_derived_releases_upstream() {
    let one = Signal::<i32>::retaining();
    let two = Signal::<i32>::retaining();

    let combined = combine_latest(&one, &two);
    assert_eq!(one.observers().len(), 1);
    assert_eq!(two.observers().len(), 1);

    let output = combined.signal().clone();
    drop(combined);
    assert!(one.observers().is_empty());
    assert!(two.observers().is_empty());

    one.fire(1);
    two.fire(2);
    assert_eq!(output.fire_count(), 0);
}

#[test]
fn test_derived_signals_chain() {
    let a = Signal::<i32>::retaining();
    let b = Signal::<i32>::retaining();
    let c = Signal::<i32>::retaining();
    let observer = Observer::new();
    let (seen, callback) = recorder::<((i32, i32), i32)>();

    let ab = combine_latest(&a, &b);
    let abc = combine_latest(ab.signal(), &c);
    abc.subscribe(&observer, callback);

    a.fire(1);
    b.fire(2);
    c.fire(3);
    b.fire(20);

    assert_eq!(*seen.lock(), vec![((1, 2), 3), ((1, 20), 3)]);
}
