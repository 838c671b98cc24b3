//! Reactive Primitives
//!
//! This module implements the notification engine: signals, conditions and
//! variables.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is an ordered list of handlers. Emitting a signal calls every
//! handler in connection order. Handlers may connect or disconnect handlers
//! (including themselves) while the signal is emitting; emission always works
//! on the list as it was when emission started, skipping handlers that were
//! disconnected before their turn.
//!
//! ## Value Objects
//!
//! A [`ValueObject`] holds a value and a `changed` signal that is emitted
//! exactly when the value changes. [`Condition`] holds a boolean;
//! [`Variable`] holds anything.
//!
//! ## Derived Values
//!
//! Conditions combine with `!`, `&`, `|` and `^`, and variables produce
//! conditions through [`Variable::predicate`]. Derived values are lazy: they
//! only listen to their terms while someone listens to them, and stay alive
//! on their own for exactly that long.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded and built on `Rc`. Internal links from
//! terms to derived values are weak; a derived value with handlers keeps
//! itself alive with a strong self-reference that is registered with the
//! active [`GcProtector`](crate::gc::GcProtector).

mod condition;
mod derived;
mod handler;
mod signal;
mod truthy;
mod value;
mod variable;

pub use condition::Condition;
pub use handler::{Acceptance, Handler, HandlerId};
pub use signal::{BlockGuard, Signal};
pub use truthy::Truthy;
pub use value::ValueObject;
pub use variable::Variable;
