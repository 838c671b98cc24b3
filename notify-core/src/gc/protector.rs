//! Protector implementations.

use std::fmt;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{ObjectId, Protectable};
use crate::error::{NotifyError, Result};

/// Reference-count bookkeeping for protected objects.
///
/// `protect` and `unprotect` nest: protecting an object N times requires
/// exactly N unprotects before it stops being protected.
pub trait GcProtector: Send + Sync + fmt::Debug {
    /// Increment the protection count of `id`, starting it at 1 if absent.
    fn protect_id(&self, id: ObjectId);

    /// Decrement the protection count of `id`, forgetting it at 0.
    fn unprotect_id(&self, id: ObjectId) -> Result<()>;

    /// Current protection count of `id` (0 if unprotected).
    fn protection_count(&self, id: ObjectId) -> usize;

    /// Sum of all outstanding protection counts.
    fn num_active_protections(&self) -> usize;

    /// Protected objects with their counts, in first-protection order.
    fn protected_objects(&self) -> Vec<(ObjectId, usize)>;
}

impl<'p> dyn GcProtector + 'p {
    /// Protect `object`. `None` is accepted and ignored.
    ///
    /// Returns `object` for convenience.
    pub fn protect<'a, P>(&self, object: Option<&'a P>) -> Option<&'a P>
    where
        P: Protectable + ?Sized,
    {
        if let Some(object) = object {
            self.protect_id(object.object_id());
        }
        object
    }

    /// Unprotect `object`. `None` is accepted and ignored.
    pub fn unprotect<'a, P>(&self, object: Option<&'a P>) -> Result<Option<&'a P>>
    where
        P: Protectable + ?Sized,
    {
        if let Some(object) = object {
            self.unprotect_id(object.object_id())?;
        }
        Ok(object)
    }

    /// Whether `object` currently has a positive protection count.
    pub fn is_protected<P>(&self, object: &P) -> bool
    where
        P: Protectable + ?Sized,
    {
        self.protection_count(object.object_id()) > 0
    }
}

#[derive(Debug, Default)]
struct CountTable {
    counts: IndexMap<ObjectId, usize>,
    total: usize,
}

/// Count table shared by every protector variant.
#[derive(Debug, Default)]
struct ProtectionTable {
    inner: Mutex<CountTable>,
}

impl ProtectionTable {
    fn increment(&self, id: ObjectId) -> usize {
        let mut table = self.inner.lock();
        table.total += 1;
        let count = table.counts.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns the remaining count, or `None` if `id` was not protected.
    fn decrement(&self, id: ObjectId) -> Option<usize> {
        let mut table = self.inner.lock();
        let remaining = {
            let count = table.counts.get_mut(&id)?;
            *count -= 1;
            *count
        };
        if remaining == 0 {
            table.counts.shift_remove(&id);
        }
        table.total -= 1;
        Some(remaining)
    }

    fn count(&self, id: ObjectId) -> usize {
        self.inner.lock().counts.get(&id).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.inner.lock().total
    }

    fn snapshot(&self) -> Vec<(ObjectId, usize)> {
        self.inner
            .lock()
            .counts
            .iter()
            .map(|(id, count)| (*id, *count))
            .collect()
    }
}

/// Lenient, low-overhead protector. Unbalanced unprotects are ignored.
#[derive(Debug, Default)]
pub struct FastGcProtector {
    table: ProtectionTable,
}

impl FastGcProtector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GcProtector for FastGcProtector {
    fn protect_id(&self, id: ObjectId) {
        self.table.increment(id);
    }

    fn unprotect_id(&self, id: ObjectId) -> Result<()> {
        if self.table.decrement(id).is_none() {
            trace!(object = %id, "ignoring unprotect of unprotected object");
        }
        Ok(())
    }

    fn protection_count(&self, id: ObjectId) -> usize {
        self.table.count(id)
    }

    fn num_active_protections(&self) -> usize {
        self.table.total()
    }

    fn protected_objects(&self) -> Vec<(ObjectId, usize)> {
        self.table.snapshot()
    }
}

/// Strict protector for diagnosing protocol misuse.
#[derive(Debug, Default)]
pub struct RaisingGcProtector {
    table: ProtectionTable,
}

impl RaisingGcProtector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GcProtector for RaisingGcProtector {
    fn protect_id(&self, id: ObjectId) {
        self.table.increment(id);
    }

    fn unprotect_id(&self, id: ObjectId) -> Result<()> {
        match self.table.decrement(id) {
            Some(_) => Ok(()),
            None => Err(NotifyError::Unprotection(id)),
        }
    }

    fn protection_count(&self, id: ObjectId) -> usize {
        self.table.count(id)
    }

    fn num_active_protections(&self) -> usize {
        self.table.total()
    }

    fn protected_objects(&self) -> Vec<(ObjectId, usize)> {
        self.table.snapshot()
    }
}

/// Lenient protector that logs everything and records violations.
#[derive(Debug, Default)]
pub struct DebugGcProtector {
    table: ProtectionTable,
    violations: Mutex<Vec<ObjectId>>,
}

impl DebugGcProtector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects that were unprotected more often than protected, in order.
    pub fn violations(&self) -> Vec<ObjectId> {
        self.violations.lock().clone()
    }
}

impl GcProtector for DebugGcProtector {
    fn protect_id(&self, id: ObjectId) {
        let count = self.table.increment(id);
        debug!(object = %id, count, "protect");
    }

    fn unprotect_id(&self, id: ObjectId) -> Result<()> {
        match self.table.decrement(id) {
            Some(count) => debug!(object = %id, count, "unprotect"),
            None => {
                warn!(object = %id, "unprotect of an object that is not protected");
                self.violations.lock().push(id);
            }
        }
        Ok(())
    }

    fn protection_count(&self, id: ObjectId) -> usize {
        self.table.count(id)
    }

    fn num_active_protections(&self) -> usize {
        self.table.total()
    }

    fn protected_objects(&self) -> Vec<(ObjectId, usize)> {
        self.table.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nesting(protector: &dyn GcProtector) {
        let id = ObjectId::new();
        for _ in 0..3 {
            protector.protect(Some(&id));
        }
        assert_eq!(protector.protection_count(id), 3);

        protector.unprotect(Some(&id)).unwrap();
        protector.unprotect(Some(&id)).unwrap();
        assert!(protector.is_protected(&id));

        protector.unprotect(Some(&id)).unwrap();
        assert!(!protector.is_protected(&id));
        assert_eq!(protector.num_active_protections(), 0);
    }

    #[test]
    fn all_variants_nest() {
        nesting(&FastGcProtector::new());
        nesting(&RaisingGcProtector::new());
        nesting(&DebugGcProtector::new());
    }

    #[test]
    fn none_is_a_no_op() {
        let protector: &dyn GcProtector = &RaisingGcProtector::new();
        assert!(protector.protect::<ObjectId>(None).is_none());
        assert!(protector.unprotect::<ObjectId>(None).unwrap().is_none());
        assert_eq!(protector.num_active_protections(), 0);
    }

    #[test]
    fn protect_returns_its_argument() {
        let protector: &dyn GcProtector = &FastGcProtector::new();
        let id = ObjectId::new();
        assert_eq!(protector.protect(Some(&id)), Some(&id));
        assert_eq!(protector.unprotect(Some(&id)).unwrap(), Some(&id));
    }

    #[test]
    fn raising_rejects_over_unprotect() {
        let protector: &dyn GcProtector = &RaisingGcProtector::new();
        let id = ObjectId::new();
        protector.protect(Some(&id));
        protector.unprotect(Some(&id)).unwrap();

        let err = protector.unprotect(Some(&id)).unwrap_err();
        assert_eq!(err, NotifyError::Unprotection(id));
        assert_eq!(protector.num_active_protections(), 0);
    }

    #[test]
    fn fast_ignores_over_unprotect() {
        let protector: &dyn GcProtector = &FastGcProtector::new();
        let id = ObjectId::new();
        assert!(protector.unprotect(Some(&id)).is_ok());
        assert_eq!(protector.protection_count(id), 0);
    }

    #[test]
    fn debug_records_violations() {
        let protector = DebugGcProtector::new();
        let id = ObjectId::new();
        protector.unprotect_id(id).unwrap();
        assert_eq!(protector.violations(), vec![id]);
    }

    #[test]
    fn counts_are_listed_in_protection_order() {
        let protector = FastGcProtector::new();
        let first = ObjectId::new();
        let second = ObjectId::new();

        protector.protect_id(second);
        protector.protect_id(first);
        protector.protect_id(second);

        assert_eq!(protector.protected_objects(), vec![(second, 2), (first, 1)]);
        assert_eq!(protector.num_active_protections(), 3);
    }
}
