//! Notify Core
//!
//! This crate provides an observer-pattern notification engine. It
//! implements:
//!
//! - Signals: ordered handler lists that are safe to modify while emitting
//! - Conditions: boolean value objects with logical combinators
//! - Variables: value objects that emit only on real changes
//! - GC protectors: bookkeeping for values that keep themselves alive
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: signals, handlers, conditions and variables
//! - `gc`: the protection protocol and the process-wide active protector
//! - `config`: protector selection from config files or the environment
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust,ignore
//! use notify_core::reactive::{Handler, ValueObject, Variable};
//!
//! let pilots = Variable::new(0);
//! let fuel = Variable::new(0);
//!
//! // A derived condition; nobody else holds on to it
//! let ready = &pilots.is_true() & &fuel.predicate(|f| *f > 0);
//! ready.store(Handler::new(|ok: &bool| println!("ready: {}", ok)))?;
//! // prints "ready: false"
//!
//! pilots.set(2)?;
//! fuel.set(100)?;
//! // prints "ready: true"
//! ```

pub mod config;
pub mod error;
pub mod gc;
pub mod reactive;

pub use error::{NotifyError, Result};
