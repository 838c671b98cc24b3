//! Integration Tests for the Notification Engine
//!
//! These tests verify that signals, conditions and variables work together
//! correctly.

use std::cell::RefCell;
use std::rc::Rc;

use notify_core::gc::{GcProtector, ObjectId, RaisingGcProtector};
use notify_core::reactive::{Condition, Handler, ValueObject, Variable};
use notify_core::NotifyError;

fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, Handler<T>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let log_clone = log.clone();
    let handler = Handler::new(move |value: &T| log_clone.borrow_mut().push(value.clone()));
    (log, handler)
}

/// A combined readiness condition reports each flip exactly once.
#[test]
fn pilots_and_fuel() {
    let pilots: Variable<Option<String>> = Variable::new(None);
    let fuel: Variable<Option<i32>> = Variable::new(None);

    let ready = &pilots.is_true() & &fuel.predicate(|n| n.map_or(false, |n| n > 0));
    let (log, handler) = recorder();
    ready.store(handler).unwrap();
    assert_eq!(*log.borrow(), vec![false]);

    pilots.set(Some("Jen and Jim".into())).unwrap();
    fuel.set(Some(500)).unwrap();
    assert_eq!(*log.borrow(), vec![false, true]);

    fuel.set(Some(0)).unwrap();
    assert_eq!(*log.borrow(), vec![false, true, false]);
}

/// The readiness condition keeps working with no handle held on to it.
#[test]
fn anonymous_conditions_survive_while_observed() {
    let pilots = Variable::new(0);
    let fuel = Variable::new(0);
    let (log, handler) = recorder();

    (&pilots.is_true() & &fuel.is_true()).store(handler).unwrap();

    pilots.set(2).unwrap();
    fuel.set(100).unwrap();
    fuel.set(0).unwrap();

    assert_eq!(*log.borrow(), vec![false, true, false]);
    assert_eq!(pilots.changed().handler_count(), 1);
    assert_eq!(fuel.changed().handler_count(), 1);
}

/// A handler that sets an unrelated variable sees that variable's handlers
/// finish before its own emission returns.
#[test]
fn reentrant_mutation_runs_depth_first() {
    let x = Variable::new(0);
    let y = Variable::new(0);
    let events = Rc::new(RefCell::new(Vec::new()));

    {
        let events = events.clone();
        y.changed()
            .connect(Handler::new(move |v: &i32| events.borrow_mut().push(format!("y:{}", v))))
            .unwrap();
    }
    {
        let events = events.clone();
        let y = y.clone();
        x.changed()
            .connect(Handler::new(move |v: &i32| {
                events.borrow_mut().push(format!("x:{} start", v));
                y.set(v + 100).unwrap();
                events.borrow_mut().push(format!("x:{} end", v));
            }))
            .unwrap();
    }

    x.set(1).unwrap();
    x.set(2).unwrap();

    assert_eq!(
        *events.borrow(),
        vec!["x:1 start", "y:101", "x:1 end", "x:2 start", "y:102", "x:2 end"]
    );
    assert_eq!(x.changed().handler_count(), 1);
    assert_eq!(y.changed().handler_count(), 1);
}

/// Assigning an equal value never emits, for variables and conditions alike.
#[test]
fn no_op_writes_are_silent() {
    let v = Variable::new(vec![1, 2, 3]);
    let c = Condition::new(true);
    let (values, value_handler) = recorder();
    let (states, state_handler) = recorder();
    v.changed().connect(value_handler).unwrap();
    c.changed().connect(state_handler).unwrap();

    assert!(!v.set(vec![1, 2, 3]).unwrap());
    assert!(!c.set(true).unwrap());
    assert!(values.borrow().is_empty());
    assert!(states.borrow().is_empty());
}

/// `store` calls the handler with the current value before any change.
#[test]
fn store_reports_initial_then_changes() {
    let v = Variable::new("idle");
    let (log, handler) = recorder();

    let _blocked = v.changed().blocked();
    v.store(handler).unwrap();
    assert_eq!(*log.borrow(), vec!["idle"]);

    drop(_blocked);
    v.set("busy").unwrap();
    v.set("idle").unwrap();
    assert_eq!(*log.borrow(), vec!["idle", "busy", "idle"]);
}

/// Double negation follows the negated condition.
#[test]
fn double_negation_tracks_source() {
    let a = Condition::new(false);
    let twice = !!&a;
    let (log, handler) = recorder();
    twice.changed().connect(handler).unwrap();

    a.set(true).unwrap();
    a.set(false).unwrap();
    assert_eq!(*log.borrow(), vec![true, false]);
    assert_eq!(twice.state(), a.state());
}

/// Protecting N times needs N unprotects; one more fails on a strict
/// protector.
#[test]
fn protector_nesting() {
    let protector: Rc<dyn GcProtector> = Rc::new(RaisingGcProtector::new());
    let id = ObjectId::new();

    for _ in 0..3 {
        protector.protect(Some(&id));
    }
    for _ in 0..2 {
        protector.unprotect(Some(&id)).unwrap();
    }
    assert!(protector.is_protected(&id));

    protector.unprotect(Some(&id)).unwrap();
    assert!(!protector.is_protected(&id));

    assert_eq!(
        protector.unprotect(Some(&id)).unwrap_err(),
        NotifyError::Unprotection(id)
    );
}

/// Mutations inside a frozen block are reported as one change.
#[test]
fn frozen_changes_emit_once() {
    let v = Variable::new(0);
    let (log, handler) = recorder();
    v.changed().connect(handler).unwrap();

    v.with_changes_frozen(|| {
        for n in 1..=5 {
            v.set(n).unwrap();
        }
    })
    .unwrap();

    assert_eq!(*log.borrow(), vec![5]);
}
