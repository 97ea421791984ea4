//! End-to-end propagation through reused pool threads.

use ctxcarry::prelude::*;
use ctxcarry::testing::{assert_absent, assert_no_context, assert_value};
use pretty_assertions::assert_eq;
use std::sync::mpsc;

fn single_worker() -> FixedThreadPool {
    FixedThreadPool::named("propagation", 1).unwrap()
}

fn string_slot(registry: &ContextRegistry, name: &str) -> ContextSlot<String> {
    ContextSlot::builder(name).register_in(registry)
}

/// Runs `f` on the pool's worker without any wrapping and returns its result.
fn run_raw<R: Send + 'static>(pool: &FixedThreadPool, f: impl FnOnce() -> R + Send + 'static) -> R {
    let (tx, rx) = mpsc::channel();
    pool.execute(Box::new(move || {
        let _ = tx.send(f());
    }))
    .unwrap();
    rx.recv().unwrap()
}

#[test]
fn later_parent_writes_do_not_reach_wrapped_task() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let pool = ContextPool::new(single_worker()).with_registry(&registry);

    slot.set("v1".to_string()).unwrap();
    let reader = slot.clone();
    let task = pool.wrap(move || reader.get());
    slot.set("v2".to_string()).unwrap();

    let handle = pool.submit(move || task.run()).unwrap();
    assert_eq!(handle.join().unwrap(), Some("v1".to_string()));
}

#[test]
fn two_submissions_see_their_own_submission_time_values() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let pool = ContextPool::new(single_worker()).with_registry(&registry);

    slot.set("init".to_string()).unwrap();
    let reader = slot.clone();
    let first = pool.submit(move || reader.get()).unwrap();

    slot.set("updated".to_string()).unwrap();
    let reader = slot.clone();
    let second = pool.submit(move || reader.get()).unwrap();

    assert_eq!(second.join().unwrap(), Some("updated".to_string()));
    assert_eq!(first.join().unwrap(), Some("init".to_string()));
}

#[test]
fn absence_travels_and_worker_state_is_restored_exactly() {
    let registry = ContextRegistry::new();
    let slot: ContextSlot<String> = ContextSlot::builder("with-default")
        .default_value("fallback".to_string())
        .register_in(&registry);
    let raw = single_worker();

    // The worker holds an explicit value equal to the default.
    let writer = slot.clone();
    run_raw(&raw, move || writer.set("fallback".to_string()).unwrap());

    slot.remove();
    let pool = ContextPool::new(&raw).with_registry(&registry);
    let reader = slot.clone();
    let seen = pool
        .submit(move || (reader.is_present(), reader.get()))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(seen, (false, Some("fallback".to_string())));

    // Present-with-default survived, not collapsed into absent.
    let reader = slot.clone();
    let after = run_raw(&raw, move || (reader.is_present(), reader.get()));
    assert_eq!(after, (true, Some("fallback".to_string())));
}

#[test]
fn absent_worker_state_stays_absent_after_wrapped_task() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let raw = single_worker();
    let pool = ContextPool::new(&raw).with_registry(&registry);

    slot.set("v1".to_string()).unwrap();
    let reader = slot.clone();
    let during = pool.submit(move || reader.get()).unwrap().join().unwrap();
    assert_eq!(during, Some("v1".to_string()));

    let reader = slot.clone();
    let later = run_raw(&raw, move || reader.is_present());
    assert!(!later, "install leaked into unrelated work");
}

#[test]
fn unwrapped_reuse_observes_leftovers_but_wrapped_reuse_does_not() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let raw = single_worker();

    let writer = slot.clone();
    run_raw(&raw, move || writer.set("leftover".to_string()).unwrap());

    let reader = slot.clone();
    assert_eq!(run_raw(&raw, move || reader.get()), Some("leftover".to_string()));

    slot.remove();
    let pool = ContextPool::new(&raw).with_registry(&registry);
    let reader = slot.clone();
    assert_eq!(pool.submit(move || reader.get()).unwrap().join().unwrap(), None);
}

#[test]
fn inner_error_is_returned_unchanged_and_state_restored() {
    #[derive(Debug, PartialEq)]
    struct Rejected(&'static str);

    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let raw = single_worker();
    let pool = ContextPool::new(&raw).with_registry(&registry);

    slot.set("submitted".to_string()).unwrap();
    let writer = slot.clone();
    let result = pool
        .submit(move || -> Result<(), Rejected> {
            writer.set("written-inside".to_string()).unwrap();
            Err(Rejected("bad input"))
        })
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(result, Err(Rejected("bad input")));

    let reader = slot.clone();
    assert!(!run_raw(&raw, move || reader.is_present()));
}

#[test]
fn panic_is_reported_with_payload_and_state_restored() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let raw = single_worker();
    let pool = ContextPool::new(&raw).with_registry(&registry);

    let writer = slot.clone();
    run_raw(&raw, move || writer.set("worker-own".to_string()).unwrap());

    slot.set("submitted".to_string()).unwrap();
    let err = pool
        .submit(|| -> u8 { panic!("inner work failed") })
        .unwrap()
        .join()
        .unwrap_err();
    assert!(err.is_panic());
    assert_eq!(err.to_string(), "Task panicked: inner work failed");

    let reader = slot.clone();
    assert_eq!(run_raw(&raw, move || reader.get()), Some("worker-own".to_string()));
}

#[test]
fn same_wrapper_runs_same_snapshot_twice() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let raw = single_worker();

    slot.set("frozen".to_string()).unwrap();
    let reader = slot.clone();
    let task = ContextTask::with_registry(&registry, move || reader.get());
    slot.set("changed".to_string()).unwrap();

    let first = {
        let task = task.clone();
        run_raw(&raw, move || task.run())
    };
    slot.remove();
    let second = std::thread::spawn(move || task.run()).join().unwrap();

    assert_eq!(first, Some("frozen".to_string()));
    assert_eq!(second, Some("frozen".to_string()));
}

#[test]
fn nested_wrap_restores_outer_install() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    let raw = single_worker();
    let pool = ContextPool::new(&raw).with_registry(&registry);

    slot.set("A".to_string()).unwrap();
    let outer_slot = slot.clone();
    let outer_registry = registry.clone();
    let (inner_seen, outer_after) = pool
        .submit(move || {
            outer_slot.set("B".to_string()).unwrap();
            let reader = outer_slot.clone();
            let inner = ContextTask::with_registry(&outer_registry, move || reader.get());
            outer_slot.set("A".to_string()).unwrap();

            let inner_seen = inner.run();
            (inner_seen, outer_slot.get())
        })
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(inner_seen, Some("B".to_string()));
    assert_eq!(outer_after, Some("A".to_string()));

    let registry_check = registry.clone();
    run_raw(&raw, move || assert_no_context(&registry_check));
}

#[test]
fn slot_registered_after_capture_is_untouched() {
    let registry = ContextRegistry::new();
    let early = string_slot(&registry, "early");
    early.set("captured".to_string()).unwrap();

    let reader = early.clone();
    let task = ContextTask::with_registry(&registry, move || reader.get());
    let late = string_slot(&registry, "late");

    let late_inside = late.clone();
    let seen = std::thread::spawn(move || {
        late_inside.set("worker-late".to_string()).unwrap();
        let seen = task.run();
        assert_value(&late_inside, &"worker-late".to_string());
        seen
    })
    .join()
    .unwrap();

    assert_eq!(seen, Some("captured".to_string()));
}

#[test]
fn run_cleared_hides_and_restores_everything() {
    let registry = ContextRegistry::new();
    let slot = string_slot(&registry, "context");
    slot.set("outer".to_string()).unwrap();

    let reader = slot.clone();
    let inside = ctxcarry::task::run_cleared_in(&registry, move || {
        assert_absent(&reader);
        reader.set("scratch".to_string()).unwrap();
        reader.get()
    });

    assert_eq!(inside, Some("scratch".to_string()));
    assert_value(&slot, &"outer".to_string());
}
