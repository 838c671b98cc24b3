//! The contract shared by conditions and variables.

use super::handler::{Handler, HandlerId};
use super::signal::Signal;
use crate::error::Result;

/// A piece of state with a `changed` signal.
///
/// `changed` is emitted with the new value exactly when the value changes.
/// Setting a value equal to the current one never emits.
pub trait ValueObject {
    type Value: Clone + 'static;

    /// Signal emitted with the new value whenever the value changes.
    fn changed(&self) -> &Signal<Self::Value>;

    /// The current value.
    fn get(&self) -> Self::Value;

    /// Whether two values count as different for change detection.
    fn differs(&self, old: &Self::Value, new: &Self::Value) -> Result<bool>;

    /// Connect `handler` to `changed`, then call it once with the current
    /// value.
    ///
    /// The initial call is not an emission: it happens even if `changed` is
    /// blocked, and other handlers are not called.
    fn store(&self, handler: Handler<Self::Value>) -> Result<HandlerId> {
        let id = self.changed().connect(handler.clone())?;
        handler.invoke(&self.get());
        Ok(id)
    }

    /// Like [`store`](Self::store), but does nothing if an equal handler is
    /// already connected.
    fn store_safe(&self, handler: Handler<Self::Value>) -> Result<Option<HandlerId>> {
        let id = self.changed().connect_safe(handler.clone())?;
        if id.is_some() {
            handler.invoke(&self.get());
        }
        Ok(id)
    }

    /// Run `f` with `changed` blocked, then emit once if the value at the end
    /// differs from the value at the start.
    ///
    /// Intermediate values are never reported, and neither is a sequence of
    /// changes that ends where it started.
    fn with_changes_frozen<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        let before = self.get();
        let result = {
            let _blocked = self.changed().blocked();
            f()
        };

        let after = self.get();
        if self.differs(&before, &after)? {
            self.changed().emit(&after);
        }
        Ok(result)
    }
}
