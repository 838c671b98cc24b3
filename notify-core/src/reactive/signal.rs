//! Signal Implementation
//!
//! A Signal is an ordered list of handlers that can be emitted. Emission
//! calls every connected handler in connection order, synchronously.
//!
//! # Mutation During Emission
//!
//! Handlers may connect and disconnect handlers on the signal that is
//! currently emitting (including themselves). Emission works on a snapshot
//! taken when it starts:
//!
//! - a handler connected during an emission is not called by that emission;
//! - a handler disconnected before its turn is skipped;
//! - handlers that already ran are unaffected.
//!
//! # Blocking
//!
//! `block`/`unblock` form a nestable counter. While it is positive, `emit`
//! does nothing.
//!
//! # Failures
//!
//! A panicking handler stops the emission and unwinds to the emitter's
//! caller. The handler list is never borrowed while handlers run, so it is
//! left exactly as the handlers made it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::handler::{Handler, HandlerId};
use crate::error::{NotifyError, Result};

/// Handler-count transitions reported to the owner of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activity {
    /// The first handler was connected.
    Active,
    /// The last handler was disconnected.
    Idle,
}

struct Entry<T> {
    id: HandlerId,
    handler: Handler<T>,
    connected: Cell<bool>,
}

/// Decrements the emission depth even if a handler panics.
struct EmissionGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> EmissionGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for EmissionGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// An ordered collection of handlers receiving values of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let signal = Signal::new();
/// signal.connect(Handler::new(|n: &i32| println!("got {}", n)))?;
/// signal.emit(&5);
/// ```
pub struct Signal<T: 'static> {
    /// Connected handlers, in call order.
    entries: RefCell<Vec<Rc<Entry<T>>>>,

    /// Nesting count of `block` calls.
    blocked: Cell<usize>,

    /// Number of emissions currently on the stack.
    emitting: Cell<usize>,

    /// Told when the handler list becomes non-empty or empty.
    activity: Option<Box<dyn Fn(Activity)>>,
}

impl<T: 'static> Signal<T> {
    /// Create a signal with no handlers.
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            blocked: Cell::new(0),
            emitting: Cell::new(0),
            activity: None,
        }
    }

    /// Create a signal that reports handler-count transitions to `hook`.
    pub(crate) fn with_activity<F>(hook: F) -> Self
    where
        F: Fn(Activity) + 'static,
    {
        Self {
            activity: Some(Box::new(hook)),
            ..Self::new()
        }
    }

    /// Append `handler` to the handler list.
    ///
    /// Fails with [`NotifyError::InvalidHandler`] if the handler cannot be
    /// called the way its acceptance says. Connecting the same handler twice
    /// creates two independent entries.
    pub fn connect(&self, handler: Handler<T>) -> Result<HandlerId> {
        handler.validate()?;
        Ok(self.attach(handler))
    }

    /// Append a handler that is known to be valid.
    pub(crate) fn attach(&self, handler: Handler<T>) -> HandlerId {
        let id = HandlerId::new();
        let acceptance = handler.acceptance();
        let first = {
            let mut entries = self.entries.borrow_mut();
            entries.push(Rc::new(Entry {
                id,
                handler,
                connected: Cell::new(true),
            }));
            entries.len() == 1
        };

        trace!(handler = %id, ?acceptance, "connect");
        if first {
            self.report(Activity::Active);
        }
        id
    }

    /// Connect `handler` unless an equal handler is already connected.
    pub fn connect_safe(&self, handler: Handler<T>) -> Result<Option<HandlerId>> {
        if self.is_connected(&handler) {
            return Ok(None);
        }
        self.connect(handler).map(Some)
    }

    /// Remove one entry matching `handler`: the earliest connected one.
    ///
    /// Returns `false` if nothing matched.
    pub fn disconnect(&self, handler: &Handler<T>) -> bool {
        self.remove_first(|entry| entry.handler.same_as(handler))
    }

    /// Remove the entry created by the `connect` call that returned `id`.
    pub fn disconnect_id(&self, id: HandlerId) -> bool {
        self.remove_first(|entry| entry.id == id)
    }

    /// Remove every handler.
    pub fn disconnect_all(&self) {
        let removed: Vec<_> = self.entries.borrow_mut().drain(..).collect();
        if removed.is_empty() {
            return;
        }
        for entry in &removed {
            entry.connected.set(false);
        }
        trace!(count = removed.len(), "disconnect all");
        self.report(Activity::Idle);
    }

    fn remove_first<P>(&self, matches: P) -> bool
    where
        P: Fn(&Entry<T>) -> bool,
    {
        let (removed, now_empty) = {
            let mut entries = self.entries.borrow_mut();
            match entries.iter().position(|entry| matches(entry)) {
                Some(index) => {
                    let entry = entries.remove(index);
                    entry.connected.set(false);
                    (Some(entry), entries.is_empty())
                }
                None => (None, false),
            }
        };

        let Some(entry) = removed else {
            return false;
        };
        trace!(handler = %entry.id, "disconnect");
        drop(entry);

        if now_empty {
            self.report(Activity::Idle);
        }
        true
    }

    /// Call every connected handler with `value`.
    ///
    /// Returns `false` without calling anything if the signal is blocked.
    pub fn emit(&self, value: &T) -> bool {
        if self.is_blocked() {
            return false;
        }

        let snapshot: SmallVec<[Rc<Entry<T>>; 4]> =
            self.entries.borrow().iter().cloned().collect();
        trace!(handlers = snapshot.len(), depth = self.emitting.get(), "emit");

        let _guard = EmissionGuard::enter(&self.emitting);
        for entry in &snapshot {
            if entry.connected.get() {
                entry.handler.invoke(value);
            }
        }
        true
    }

    /// Suppress emission until the matching [`unblock`](Self::unblock).
    pub fn block(&self) {
        self.blocked.set(self.blocked.get() + 1);
    }

    /// Undo one [`block`](Self::block).
    ///
    /// Fails with [`NotifyError::State`] if the signal is not blocked.
    pub fn unblock(&self) -> Result<()> {
        match self.blocked.get() {
            0 => Err(NotifyError::state("cannot unblock a signal that is not blocked")),
            n => {
                self.blocked.set(n - 1);
                Ok(())
            }
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.get() > 0
    }

    /// Block the signal until the returned guard is dropped.
    pub fn blocked(&self) -> BlockGuard<'_, T> {
        self.block();
        BlockGuard { signal: self }
    }

    /// Whether a handler equal to `handler` is connected.
    pub fn is_connected(&self, handler: &Handler<T>) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|entry| entry.handler.same_as(handler))
    }

    pub fn has_handlers(&self) -> bool {
        !self.entries.borrow().is_empty()
    }

    pub fn handler_count(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether an emission of this signal is in progress.
    pub fn is_emitting(&self) -> bool {
        self.emitting.get() > 0
    }

    fn report(&self, activity: Activity) {
        if let Some(hook) = &self.activity {
            hook(activity);
        }
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handler_count", &self.handler_count())
            .field("blocked", &self.blocked.get())
            .field("emitting", &self.is_emitting())
            .finish()
    }
}

/// Keeps a signal blocked while alive. See [`Signal::blocked`].
pub struct BlockGuard<'a, T: 'static> {
    signal: &'a Signal<T>,
}

impl<T: 'static> Drop for BlockGuard<'_, T> {
    fn drop(&mut self) {
        let blocked = &self.signal.blocked;
        let count = blocked.get();
        debug_assert!(count > 0, "block guard dropped on an unblocked signal");
        if count == 0 {
            warn!("block guard dropped on an unblocked signal");
            return;
        }
        blocked.set(count - 1);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Handler<i32>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &str| {
            let log = log_clone.clone();
            let name = name.to_string();
            Handler::new(move |value: &i32| log.borrow_mut().push(format!("{}:{}", name, value)))
        };
        (log, make)
    }

    #[test]
    fn emission_follows_connection_order() {
        let (log, handler) = recorder();
        let signal = Signal::new();
        signal.connect(handler("a")).unwrap();
        signal.connect(handler("b")).unwrap();
        signal.connect(handler("c")).unwrap();

        assert!(signal.emit(&1));
        assert_eq!(*log.borrow(), vec!["a:1", "b:1", "c:1"]);
    }

    #[test]
    fn duplicate_connections_are_independent() {
        let (log, handler) = recorder();
        let signal = Signal::new();
        let h = handler("h");
        signal.connect(h.clone()).unwrap();
        signal.connect(h.clone()).unwrap();

        signal.emit(&1);
        assert_eq!(log.borrow().len(), 2);

        assert!(signal.disconnect(&h));
        signal.emit(&2);
        assert_eq!(log.borrow().len(), 3);

        assert!(signal.disconnect(&h));
        assert!(!signal.disconnect(&h));
        assert!(!signal.has_handlers());
    }

    #[test]
    fn disconnect_removes_earliest_match() {
        let (log, handler) = recorder();
        let signal = Signal::new();
        let h = handler("h");
        let first = signal.connect(h.clone()).unwrap();
        let second = signal.connect(h.clone()).unwrap();

        signal.disconnect(&h);
        assert!(!signal.disconnect_id(first));
        assert!(signal.disconnect_id(second));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn connect_safe_does_not_duplicate() {
        let (_, handler) = recorder();
        let signal = Signal::new();
        let h = handler("h");
        assert!(signal.connect_safe(h.clone()).unwrap().is_some());
        assert!(signal.connect_safe(h.clone()).unwrap().is_none());
        assert_eq!(signal.handler_count(), 1);
    }

    #[test]
    fn bound_arguments_distinguish_entries() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let h = Handler::with_bound(move |value: &i32, tag: &&'static str| {
            seen_clone.borrow_mut().push(format!("{}{}", tag, value));
        });

        let signal = Signal::new();
        signal.connect(h.bind("x")).unwrap();
        signal.connect(h.bind("y")).unwrap();
        signal.emit(&1);

        assert!(signal.disconnect(&h.bind("x")));
        signal.emit(&2);
        assert_eq!(*seen.borrow(), vec!["x1", "y1", "y2"]);
    }

    #[test]
    fn invalid_handlers_are_rejected() {
        let signal: Signal<i32> = Signal::new();
        let err = signal
            .connect(Handler::with_bound(|_: &i32, _: &u8| {}))
            .unwrap_err();
        assert!(matches!(err, NotifyError::InvalidHandler(_)));
        assert!(!signal.has_handlers());
    }

    #[test]
    fn blocking_nests() {
        let (log, handler) = recorder();
        let signal = Signal::new();
        signal.connect(handler("h")).unwrap();

        signal.block();
        signal.block();
        assert!(!signal.emit(&1));
        signal.unblock().unwrap();
        assert!(!signal.emit(&2));
        signal.unblock().unwrap();
        assert!(signal.emit(&3));

        assert_eq!(*log.borrow(), vec!["h:3"]);
    }

    #[test]
    fn unblock_below_zero_fails() {
        let signal: Signal<i32> = Signal::new();
        assert!(matches!(signal.unblock(), Err(NotifyError::State(_))));
    }

    #[test]
    fn block_guard_unblocks_on_drop() {
        let signal: Signal<i32> = Signal::new();
        {
            let _guard = signal.blocked();
            assert!(signal.is_blocked());
        }
        assert!(!signal.is_blocked());
    }

    #[test]
    fn block_guard_releases_only_its_own_block() {
        let signal: Signal<i32> = Signal::new();
        signal.block();
        {
            let _guard = signal.blocked();
        }
        assert!(signal.is_blocked());
        signal.unblock().unwrap();
        assert!(!signal.is_blocked());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "block guard dropped on an unblocked signal")]
    fn block_guard_detects_unbalanced_unblock() {
        let signal: Signal<i32> = Signal::new();
        let guard = signal.blocked();
        signal.unblock().unwrap();
        drop(guard);
    }

    #[test]
    fn handler_connected_during_emission_waits_for_next_emission() {
        let signal = Rc::new(Signal::new());
        let calls = Rc::new(Cell::new(0));

        let late = {
            let calls = calls.clone();
            Handler::new(move |_: &i32| calls.set(calls.get() + 1))
        };
        let connector = {
            let signal = Rc::downgrade(&signal);
            Handler::new(move |_: &i32| {
                if let Some(signal) = signal.upgrade() {
                    signal.connect(late.clone()).unwrap();
                }
            })
        };
        signal.connect(connector).unwrap();

        signal.emit(&1);
        assert_eq!(calls.get(), 0);
        assert_eq!(signal.handler_count(), 2);

        signal.emit(&2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn handler_disconnected_before_its_turn_is_skipped() {
        let (log, handler) = recorder();
        let signal = Rc::new(Signal::new());
        let victim = handler("victim");

        let disconnector = {
            let signal = Rc::downgrade(&signal);
            let victim = victim.clone();
            Handler::new(move |_: &i32| {
                if let Some(signal) = signal.upgrade() {
                    signal.disconnect(&victim);
                }
            })
        };
        signal.connect(handler("before")).unwrap();
        signal.connect(disconnector).unwrap();
        signal.connect(victim).unwrap();

        signal.emit(&1);
        assert_eq!(*log.borrow(), vec!["before:1"]);
        assert_eq!(signal.handler_count(), 2);
    }

    #[test]
    fn handler_can_disconnect_itself() {
        let signal = Rc::new(Signal::new());
        let calls = Rc::new(Cell::new(0));
        let id = Rc::new(Cell::new(None));

        let once = {
            let signal = Rc::downgrade(&signal);
            let calls = calls.clone();
            let id = id.clone();
            Handler::new(move |_: &i32| {
                calls.set(calls.get() + 1);
                if let (Some(signal), Some(id)) = (signal.upgrade(), id.get()) {
                    signal.disconnect_id(id);
                }
            })
        };
        id.set(Some(signal.connect(once).unwrap()));

        signal.emit(&1);
        signal.emit(&2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn panicking_handler_leaves_signal_consistent() {
        let (log, handler) = recorder();
        let signal = Signal::new();
        signal.connect(handler("a")).unwrap();
        signal
            .connect(Handler::new(|value: &i32| {
                if *value == 1 {
                    panic!("handler failure");
                }
            }))
            .unwrap();
        signal.connect(handler("c")).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| signal.emit(&1)));
        assert!(result.is_err());
        assert_eq!(*log.borrow(), vec!["a:1"]);
        assert_eq!(signal.handler_count(), 3);
        assert!(!signal.is_emitting());

        signal.emit(&2);
        assert_eq!(*log.borrow(), vec!["a:1", "a:2", "c:2"]);
    }

    #[test]
    fn activity_is_reported_on_transitions() {
        let reports = Rc::new(RefCell::new(Vec::new()));
        let reports_clone = reports.clone();
        let signal: Signal<i32> =
            Signal::with_activity(move |activity| reports_clone.borrow_mut().push(activity));

        let a = Handler::nullary(|| {});
        let b = Handler::nullary(|| {});
        signal.connect(a.clone()).unwrap();
        signal.connect(b.clone()).unwrap();
        signal.disconnect(&a);
        signal.disconnect(&b);
        signal.connect(a).unwrap();
        signal.disconnect_all();

        assert_eq!(
            *reports.borrow(),
            vec![Activity::Active, Activity::Idle, Activity::Active, Activity::Idle]
        );
    }
}
