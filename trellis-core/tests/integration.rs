//! Integration Tests for the Reactive System
//!
//! These tests verify that observed objects, refs, computed cells, effects and
//! watchers work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::config::RuntimeConfig;
use trellis_core::reactive::{RawObject, Runtime, Value, WatchOptions};
use tracing::Level;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::WARN)
        .try_init();
}

/// Test that an effect re-runs once per changed write and never for a
/// same-value write.
#[test]
fn effect_tracks_property_reads() {
    init_tracing();
    let rt = Runtime::new();
    let state = rt.reactive_map([("count", 0)]);
    let runs = Rc::new(Cell::new(0));

    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let _effect = rt.effect(move || {
        let _ = state_clone.get("count");
        runs_clone.set(runs_clone.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    state.set("count", 1);
    assert_eq!(runs.get(), 2);

    // Same value: no trigger
    state.set("count", 1);
    assert_eq!(runs.get(), 2);

    // Unread key: no trigger
    state.set("other", 5);
    assert_eq!(runs.get(), 2);
}

/// Test that stopping an effect removes every subscription it held.
#[test]
fn stopped_effect_never_reruns() {
    let rt = Runtime::new();
    let state = rt.reactive_map([("a", 1), ("b", 2)]);
    let runs = Rc::new(Cell::new(0));

    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let effect = rt.effect(move || {
        let _ = state_clone.get("a");
        let _ = state_clone.get("b");
        runs_clone.set(runs_clone.get() + 1);
    });
    assert_eq!(effect.dependency_count(), 2);

    effect.stop();
    assert!(!effect.is_active());
    assert_eq!(effect.dependency_count(), 0);

    state.set("a", 10);
    state.set("b", 20);
    assert_eq!(runs.get(), 1);
}

/// Test that one raw object always yields the same wrapper.
#[test]
fn wrapper_identity_is_stable() {
    let rt = Runtime::new();
    let raw = RawObject::map();
    raw.insert("nested", Value::map([("x", 1)]));
    let other = RawObject::map();

    let first = rt.reactive_object(&raw);
    let second = rt.reactive_object(&raw);
    assert!(first.ptr_eq(&second));
    assert!(!first.ptr_eq(&rt.reactive_object(&other)));

    // Wrapping a wrapper returns it unchanged
    let rewrapped = rt.reactive(Value::from(&first));
    assert!(rewrapped.as_observed().is_some_and(|o| o.ptr_eq(&first)));

    // Nested reads wrap lazily but stably
    let a = first.get("nested").into_observed();
    let b = second.get("nested").into_observed();
    match (a, b) {
        (Some(a), Some(b)) => assert!(a.ptr_eq(&b)),
        _ => panic!("nested object was not wrapped"),
    }
}

/// Test that a computed getter runs only when read and only after changes.
#[test]
fn computed_is_lazy_and_cached() {
    let rt = Runtime::new();
    let count = rt.create_ref(2);
    let calls = Rc::new(Cell::new(0));

    let calls_clone = calls.clone();
    let count_clone = count.clone();
    let squared = rt.computed(move || {
        calls_clone.set(calls_clone.get() + 1);
        let n = count_clone.get().as_f64().unwrap_or(0.0);
        n * n
    });
    assert_eq!(calls.get(), 0);

    assert_eq!(squared.get(), 4.0);
    assert_eq!(squared.get(), 4.0);
    assert_eq!(calls.get(), 1);

    // A change marks it dirty but does not recompute eagerly
    count.set(3);
    assert_eq!(calls.get(), 1);
    assert_eq!(squared.get(), 9.0);
    assert_eq!(calls.get(), 2);
}

/// Test that effects observe computed cells through the chain.
#[test]
fn effect_depends_on_computed_chain() {
    let rt = Runtime::new();
    let state = rt.reactive_map([("first", "Ada"), ("last", "Lovelace")]);

    let s = state.clone();
    let full = rt.computed(move || format!("{} {}", s.get("first"), s.get("last")));
    let upper = {
        let full = full.clone();
        rt.computed(move || full.get().to_uppercase())
    };

    let log = Rc::new(RefCell::new(Vec::new()));
    let log_clone = log.clone();
    let _effect = rt.effect(move || log_clone.borrow_mut().push(upper.get()));

    state.set("first", "Augusta");
    assert_eq!(
        *log.borrow(),
        vec!["ADA LOVELACE".to_string(), "AUGUSTA LOVELACE".to_string()]
    );
}

/// Test that nested effects restore the outer effect as the tracking target.
#[test]
fn nested_effects_track_independently() {
    let rt = Runtime::new();
    let state = rt.reactive_map([("outer", 0), ("inner", 0)]);
    let outer_runs = Rc::new(Cell::new(0));
    let inner_runs = Rc::new(Cell::new(0));

    let (s, o, i) = (state.clone(), outer_runs.clone(), inner_runs.clone());
    let rt_clone = rt.clone();
    let _outer = rt.effect(move || {
        o.set(o.get() + 1);
        let (s2, i2) = (s.clone(), i.clone());
        // Created once; the graph keeps it subscribed after the handle drops
        if o.get() == 1 {
            let _inner = rt_clone.effect(move || {
                let _ = s2.get("inner");
                i2.set(i2.get() + 1);
            });
        }
        let _ = s.get("outer");
    });

    state.set("inner", 1);
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

    state.set("outer", 1);
    assert_eq!(outer_runs.get(), 2);
}

/// Test that list mutations trigger length and iteration readers.
#[test]
fn list_length_and_iteration_are_tracked() {
    let rt = Runtime::new();
    let list = rt.reactive_list([1, 2]);
    let lengths = Rc::new(RefCell::new(Vec::new()));

    let l = list.clone();
    let seen = lengths.clone();
    let _effect = rt.effect(move || seen.borrow_mut().push(l.len()));

    list.push(3);
    list.pop();
    list.set(0usize, 9);
    assert_eq!(*lengths.borrow(), vec![2, 3, 2]);
}

/// Test that watchers receive new and old values and stop cleanly.
#[test]
fn watch_reports_changes_until_stopped() {
    let rt = Runtime::new();
    let count = rt.create_ref(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let log_clone = log.clone();
    let handle = rt.watch(
        &count,
        move |new, old| log_clone.borrow_mut().push((new.clone(), old.clone())),
        WatchOptions::default(),
    );

    count.set(1);
    count.set(2);
    handle.stop();
    count.set(3);

    assert_eq!(
        *log.borrow(),
        vec![
            (Value::from(1), Value::from(0)),
            (Value::from(2), Value::from(1)),
        ]
    );
}

/// Test that batched mode coalesces watcher runs until the queue flushes.
#[test]
fn batched_watch_effect_coalesces_writes() {
    let rt = Runtime::with_config(RuntimeConfig::batched());
    let state = rt.reactive_map([("a", 0), ("b", 0)]);
    let runs = Rc::new(Cell::new(0));

    let (s, r) = (state.clone(), runs.clone());
    let _handle = rt.watch_effect(move || {
        let _ = s.get("a");
        let _ = s.get("b");
        r.set(r.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    state.set("a", 1);
    state.set("b", 1);
    assert_eq!(runs.get(), 1);

    rt.flush_jobs();
    assert_eq!(runs.get(), 2);
}

/// Test that the queue is flushed from async code by `next_tick`.
#[tokio::test]
async fn next_tick_runs_queued_effects() {
    init_tracing();
    let rt = Runtime::with_config(RuntimeConfig::batched());
    let count = rt.create_ref(0);
    let seen = Rc::new(Cell::new(0.0));

    let (c, s) = (count.clone(), seen.clone());
    let _handle = rt.watch_effect(move || s.set(c.get().as_f64().unwrap_or(-1.0)));

    count.set(7);
    assert_eq!(seen.get(), 0.0);

    rt.next_tick().await;
    assert_eq!(seen.get(), 7.0);
}

/// Test that readonly wrappers reject writes and do not track.
#[test]
fn readonly_rejects_writes() {
    init_tracing();
    let rt = Runtime::new();
    let raw = RawObject::map();
    raw.insert("x", 1);
    let view = rt.readonly(&raw);

    assert!(view.try_set("x", 2).is_err());
    view.set("x", 3);
    assert_eq!(view.get("x").as_f64(), Some(1.0));
}

/// Test that an immediate watcher fires even when the source starts null.
#[test]
fn immediate_watch_of_null_ref() {
    init_tracing();
    let rt = Runtime::new();
    let empty = rt.create_ref(Value::Null);
    let calls = Rc::new(Cell::new(0));

    let calls_clone = calls.clone();
    let _handle = rt.watch(
        &empty,
        move |_, _| calls_clone.set(calls_clone.get() + 1),
        WatchOptions::default().immediate(),
    );
    assert_eq!(calls.get(), 1);
}
