//! Handler types for signals.
//!
//! A handler is a callable registered with a [`Signal`](super::Signal). How
//! it wants to be called is fixed when it is built (see [`Acceptance`]), so
//! the signal never has to inspect it at emission time.

use std::any::{self, Any, TypeId};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{NotifyError, Result};

/// Unique identifier for one connection of a handler to a signal.
///
/// Connecting the same handler twice yields two different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Generate a new unique handler ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Which of the emitted arguments a handler consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Called with no arguments.
    Nothing,
    /// Called with the emitted value.
    Value,
    /// Called with the emitted value and the arguments bound at connect time.
    ValueAndBound,
}

/// Arguments bound to a handler. Compared by value for handler identity.
trait BoundArgs {
    fn as_any(&self) -> &dyn Any;
    fn equals(&self, other: &dyn BoundArgs) -> bool;
}

impl<B: PartialEq + 'static> BoundArgs for B {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn BoundArgs) -> bool {
        other
            .as_any()
            .downcast_ref::<B>()
            .map_or(false, |other| other == self)
    }
}

/// A method called through a weak reference to its receiver.
trait WeakCall<T> {
    /// Returns `false` without calling anything if the receiver is gone.
    fn call(&self, value: &T) -> bool;
    fn is_alive(&self) -> bool;
    /// Receiver address and method address.
    fn key(&self) -> (usize, usize);
}

struct WeakMethod<O, T> {
    receiver: Weak<O>,
    method: fn(&O, &T),
}

impl<O, T> WeakCall<T> for WeakMethod<O, T> {
    fn call(&self, value: &T) -> bool {
        match self.receiver.upgrade() {
            Some(receiver) => {
                (self.method)(&receiver, value);
                true
            }
            None => false,
        }
    }

    fn is_alive(&self) -> bool {
        self.receiver.strong_count() > 0
    }

    fn key(&self) -> (usize, usize) {
        (
            Weak::as_ptr(&self.receiver) as *const () as usize,
            self.method as usize,
        )
    }
}

enum Callback<T> {
    Nothing(Rc<dyn Fn()>),
    Value(Rc<dyn Fn(&T)>),
    Bound {
        call: Rc<dyn Fn(&T, &dyn Any)>,
        expects: TypeId,
        expects_name: &'static str,
    },
    Method(Rc<dyn WeakCall<T>>),
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Nothing(f) => Self::Nothing(Rc::clone(f)),
            Self::Value(f) => Self::Value(Rc::clone(f)),
            Self::Bound {
                call,
                expects,
                expects_name,
            } => Self::Bound {
                call: Rc::clone(call),
                expects: *expects,
                expects_name: *expects_name,
            },
            Self::Method(m) => Self::Method(Rc::clone(m)),
        }
    }
}

fn same_allocation<A: ?Sized, B: ?Sized>(a: &Rc<A>, b: &Rc<B>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// A callable that can be connected to a [`Signal<T>`](super::Signal).
///
/// Handlers are cheap to clone; clones share the callable and are considered
/// the same handler by `disconnect`. Two handlers built from separate calls to
/// a constructor are different handlers even if the closures look alike.
///
/// # Example
///
/// ```rust,ignore
/// let log = Handler::new(|value: &i32| println!("now {}", value));
/// let id = signal.connect(log.clone())?;
/// signal.disconnect(&log);
/// ```
pub struct Handler<T> {
    callback: Callback<T>,
    bound: Option<Rc<dyn BoundArgs>>,
}

impl<T: 'static> Handler<T> {
    /// A handler that receives the emitted value.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        Self {
            callback: Callback::Value(Rc::new(f)),
            bound: None,
        }
    }

    /// A handler that ignores the emitted value.
    pub fn nullary<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            callback: Callback::Nothing(Rc::new(f)),
            bound: None,
        }
    }

    /// A handler that receives the emitted value and arguments of type `B`.
    ///
    /// The arguments are supplied with [`bind`](Self::bind) before connecting;
    /// connecting without them fails.
    pub fn with_bound<B, F>(f: F) -> Self
    where
        B: 'static,
        F: Fn(&T, &B) + 'static,
    {
        let call = move |value: &T, args: &dyn Any| {
            if let Some(args) = args.downcast_ref::<B>() {
                f(value, args);
            }
        };
        Self {
            callback: Callback::Bound {
                call: Rc::new(call),
                expects: TypeId::of::<B>(),
                expects_name: any::type_name::<B>(),
            },
            bound: None,
        }
    }

    /// A handler that calls `method` on `receiver` without keeping it alive.
    ///
    /// Once the receiver is dropped the handler is skipped on emission, and
    /// connecting it anywhere fails.
    pub fn weak_method<O: 'static>(receiver: &Rc<O>, method: fn(&O, &T)) -> Self {
        let call = WeakMethod {
            receiver: Rc::downgrade(receiver),
            method,
        };
        Self {
            callback: Callback::Method(Rc::new(call)),
            bound: None,
        }
    }
}

impl<T> Handler<T> {
    /// The same callable with `args` bound to it.
    ///
    /// Handlers with different bound arguments are different handlers.
    pub fn bind<B: PartialEq + 'static>(&self, args: B) -> Self {
        Self {
            callback: self.callback.clone(),
            bound: Some(Rc::new(args)),
        }
    }

    pub fn acceptance(&self) -> Acceptance {
        match self.callback {
            Callback::Nothing(_) => Acceptance::Nothing,
            Callback::Value(_) | Callback::Method(_) => Acceptance::Value,
            Callback::Bound { .. } => Acceptance::ValueAndBound,
        }
    }

    /// Whether the handler can still be called. Only weak methods can die.
    pub fn is_alive(&self) -> bool {
        match &self.callback {
            Callback::Method(m) => m.is_alive(),
            _ => true,
        }
    }

    /// Whether `self` and `other` are the same callable with equal bound
    /// arguments.
    pub fn same_as(&self, other: &Handler<T>) -> bool {
        let same_callback = match (&self.callback, &other.callback) {
            (Callback::Nothing(a), Callback::Nothing(b)) => same_allocation(a, b),
            (Callback::Value(a), Callback::Value(b)) => same_allocation(a, b),
            (Callback::Bound { call: a, .. }, Callback::Bound { call: b, .. }) => {
                same_allocation(a, b)
            }
            (Callback::Method(a), Callback::Method(b)) => a.key() == b.key(),
            _ => false,
        };

        same_callback
            && match (&self.bound, &other.bound) {
                (None, None) => true,
                (Some(a), Some(b)) => (**a).equals(&**b),
                _ => false,
            }
    }

    /// Check that the handler can be called the way its acceptance says.
    pub(crate) fn validate(&self) -> Result<()> {
        match (&self.callback, &self.bound) {
            (Callback::Bound { expects_name, .. }, None) => Err(NotifyError::invalid_handler(
                format!("handler expects bound arguments of type `{}`", expects_name),
            )),
            (
                Callback::Bound {
                    expects,
                    expects_name,
                    ..
                },
                Some(args),
            ) => {
                if Any::type_id(args.as_any()) == *expects {
                    Ok(())
                } else {
                    Err(NotifyError::invalid_handler(format!(
                        "bound arguments do not have the expected type `{}`",
                        expects_name
                    )))
                }
            }
            (_, Some(_)) => Err(NotifyError::invalid_handler(
                "handler does not accept bound arguments",
            )),
            (Callback::Method(m), None) if !m.is_alive() => Err(NotifyError::invalid_handler(
                "receiver of the weak method has been dropped",
            )),
            _ => Ok(()),
        }
    }

    /// Call the handler with `value`, plus bound arguments if it takes them.
    pub(crate) fn invoke(&self, value: &T) {
        match &self.callback {
            Callback::Nothing(f) => f(),
            Callback::Value(f) => f(value),
            Callback::Bound { call, .. } => {
                if let Some(args) = &self.bound {
                    call(value, args.as_any());
                }
            }
            Callback::Method(m) => {
                m.call(value);
            }
        }
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            bound: self.bound.clone(),
        }
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("acceptance", &self.acceptance())
            .field("bound", &self.bound.is_some())
            .field("alive", &self.is_alive())
            .finish()
    }
}
