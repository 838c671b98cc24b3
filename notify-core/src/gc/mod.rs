//! Garbage-Collection Protection
//!
//! Some objects in a notification graph have no owner the user can see.
//! `!(a & b)` builds two derived conditions, and if the user only connects a
//! handler to the outer one, nothing in user code refers to either. They must
//! still stay alive, because a change to `a` has to reach the handler.
//!
//! The protocol here keeps a count per protected object. A derived node
//! protects itself when it gains its first handler and unprotects itself when
//! it loses its last one. While protected it holds a strong anchor to itself;
//! the protector's count table is the bookkeeping that says so.
//!
//! # Variants
//!
//! - [`FastGcProtector`]: lenient; an unbalanced `unprotect` is ignored. This
//!   is the process default.
//! - [`RaisingGcProtector`]: strict; an unbalanced `unprotect` fails with
//!   [`NotifyError::Unprotection`](crate::NotifyError::Unprotection).
//! - [`DebugGcProtector`]: lenient, but logs every operation and remembers
//!   every violation so tests and debugging sessions can inspect them.
//!
//! Exactly one protector is active per process. It can only be replaced while
//! it has no outstanding protections.

mod active;
mod protector;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use active::{active_protector, set_active_protector};
pub use protector::{DebugGcProtector, FastGcProtector, GcProtector, RaisingGcProtector};

/// Identity of a protectable object.
///
/// Every condition and variable receives a fresh id when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything a [`GcProtector`] can keep track of.
pub trait Protectable {
    fn object_id(&self) -> ObjectId;
}

impl Protectable for ObjectId {
    fn object_id(&self) -> ObjectId {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert_eq!(a.object_id(), a);
        assert_eq!(format!("{}", a), format!("#{}", a.raw()));
    }
}
