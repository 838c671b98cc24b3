//! The process-wide active protector.
//!
//! A derived node protects itself with the protector that is active when it
//! gains its first handler, and unprotects through that same instance when it
//! loses its last one. Replacing the active protector is therefore only
//! allowed while it has no outstanding protections; otherwise nodes protected
//! by the old instance would outlive the switch unnoticed.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use super::protector::{FastGcProtector, GcProtector};
use crate::error::{NotifyError, Result};

static ACTIVE: OnceLock<RwLock<Arc<dyn GcProtector>>> = OnceLock::new();

fn slot() -> &'static RwLock<Arc<dyn GcProtector>> {
    ACTIVE.get_or_init(|| RwLock::new(Arc::new(FastGcProtector::new())))
}

/// The protector new derived nodes will use.
///
/// Starts out as a [`FastGcProtector`].
pub fn active_protector() -> Arc<dyn GcProtector> {
    Arc::clone(&slot().read())
}

/// Make `protector` the active protector.
///
/// Setting the instance that is already active is a no-op. Switching to a
/// different instance fails with [`NotifyError::State`] while the current one
/// has outstanding protections.
pub fn set_active_protector(protector: Arc<dyn GcProtector>) -> Result<()> {
    let mut current = slot().write();
    if same_instance(&current, &protector) {
        return Ok(());
    }

    let outstanding = current.num_active_protections();
    if outstanding > 0 {
        return Err(NotifyError::state(format!(
            "cannot switch GC protector: current one has {} active protections",
            outstanding
        )));
    }

    debug!(from = ?current, to = ?protector, "switching active GC protector");
    *current = protector;
    Ok(())
}

fn same_instance(a: &Arc<dyn GcProtector>, b: &Arc<dyn GcProtector>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
