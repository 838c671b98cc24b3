//! Derived Node Lifetime
//!
//! Derived conditions and variables compute their value from terms. They are
//! lazy: while nobody listens to a derived node it holds no registrations on
//! its terms and computes its value whenever asked. Connecting the first
//! handler *activates* it:
//!
//! 1. the cached value is refreshed from the terms;
//! 2. an internal listener is connected to every term's `changed` signal;
//! 3. the node protects itself with the protector active at that moment and
//!    anchors itself with a strong self-reference.
//!
//! Term listeners only hold weak references, so the anchor is the only thing
//! that keeps an anonymous active node alive. Disconnecting the last handler
//! *deactivates* the node in the opposite order, unprotecting it through the
//! same protector instance, and if no user handle remains it is dropped.
//!
//! Activation cascades: connecting to `a & b` connects listeners to `a` and
//! `b`, which activates them in turn if they are derived.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, error};

use super::handler::HandlerId;
use super::signal::Activity;
use crate::gc::{active_protector, GcProtector, ObjectId};

/// Something a derived node can listen to.
pub(crate) trait Observable {
    /// Call `listener` whenever the value changes.
    fn listen(&self, listener: Box<dyn Fn()>) -> HandlerId;

    fn unlisten(&self, id: HandlerId);
}

/// Terms of a derived node, as listenable handles.
pub(crate) type Terms = SmallVec<[Rc<dyn Observable>; 3]>;

/// A value computed from terms.
pub(crate) trait DerivedNode: 'static {
    fn dependencies(&self) -> &Dependencies;

    fn terms(&self) -> Terms;

    /// Recompute the cached value without emitting.
    fn refresh(&self);

    /// Recompute the cached value and emit `changed` if it changed.
    fn term_changed(&self);
}

/// Registration and protection state of a derived node.
pub(crate) struct Dependencies {
    id: ObjectId,

    /// The protector the node is protected with while active.
    protector: RefCell<Option<Arc<dyn GcProtector>>>,

    /// Listeners connected to terms while active.
    links: RefCell<SmallVec<[(Rc<dyn Observable>, HandlerId); 3]>>,

    /// Strong self-reference held while protected.
    anchor: RefCell<Option<Rc<dyn Any>>>,
}

impl Dependencies {
    pub(crate) fn new(id: ObjectId) -> Self {
        Self {
            id,
            protector: RefCell::new(None),
            links: RefCell::new(SmallVec::new()),
            anchor: RefCell::new(None),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.anchor.borrow().is_some()
    }

    /// Whether the protector recorded at activation counts the node.
    pub(crate) fn is_protected(&self) -> bool {
        self.protector
            .borrow()
            .as_ref()
            .map_or(false, |protector| protector.protection_count(self.id) > 0)
    }
}

/// Build the activity hook for the `changed` signal of the node behind
/// `weak`.
pub(crate) fn activity_hook<N: DerivedNode>(weak: Weak<N>) -> impl Fn(Activity) + 'static {
    move |activity| {
        if let Some(node) = weak.upgrade() {
            match activity {
                Activity::Active => activate(&node),
                Activity::Idle => deactivate(node.dependencies()),
            }
        }
    }
}

fn activate<N: DerivedNode>(node: &Rc<N>) {
    let deps = node.dependencies();
    if deps.is_active() {
        return;
    }

    node.refresh();

    let terms = node.terms();
    let count = terms.len();
    for term in terms {
        let weak = Rc::downgrade(node);
        let id = term.listen(Box::new(move || {
            if let Some(node) = weak.upgrade() {
                node.term_changed();
            }
        }));
        deps.links.borrow_mut().push((term, id));
    }

    let protector = active_protector();
    protector.protect_id(deps.id);
    *deps.protector.borrow_mut() = Some(protector);
    let anchor: Rc<dyn Any> = Rc::clone(node) as Rc<dyn Any>;
    *deps.anchor.borrow_mut() = Some(anchor);
    debug!(node = %deps.id, terms = count, "derived node active");
}

fn deactivate(deps: &Dependencies) {
    if !deps.is_active() {
        return;
    }

    let links = std::mem::take(&mut *deps.links.borrow_mut());
    for (term, id) in &links {
        term.unlisten(*id);
    }

    let protector = deps.protector.borrow_mut().take();
    if let Some(protector) = protector {
        if let Err(err) = protector.unprotect_id(deps.id) {
            error!(node = %deps.id, %err, "derived node protection out of balance");
        }
    }
    let anchor = deps.anchor.borrow_mut().take();
    debug!(node = %deps.id, "derived node idle");

    drop(links);
    drop(anchor);
}
