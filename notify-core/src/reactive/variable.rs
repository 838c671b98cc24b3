//! Variables
//!
//! A variable is a value object holding an arbitrary value. Setting it emits
//! `changed` only when the new value differs from the old one.
//!
//! Variables come in three flavours:
//!
//! - plain variables compare values with `PartialEq`;
//! - variables built with [`Variable::with_comparator`] use a fallible
//!   comparison, whose errors propagate out of `set`;
//! - restricted variables ([`Variable::restricted`]) reject values outside
//!   a domain and keep their previous value.
//!
//! Derived variables ([`Variable::map`], [`Condition::if_else_variable`])
//! follow other value objects and cannot be set.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::smallvec;
use tracing::warn;

use super::condition::{Condition, ConditionKind};
use super::derived::{self, Dependencies, DerivedNode, Observable, Terms};
use super::handler::{Handler, HandlerId};
use super::signal::Signal;
use super::truthy::Truthy;
use super::value::ValueObject;
use crate::error::{NotifyError, Result};
use crate::gc::{ObjectId, Protectable};

/// Equality used for change detection. `Ok(true)` means "equal".
type Comparator<T> = Rc<dyn Fn(&T, &T) -> Result<bool>>;

struct Restriction<T> {
    domain: String,
    accepts: Box<dyn Fn(&T) -> bool>,
}

impl<T> Restriction<T> {
    fn check(&self, value: &T) -> Result<()> {
        if (self.accepts)(value) {
            Ok(())
        } else {
            Err(NotifyError::TypeConstraint {
                domain: self.domain.clone(),
            })
        }
    }
}

enum VariableKind<T> {
    Settable {
        restriction: Option<Restriction<T>>,
    },
    Derived {
        compute: Box<dyn Fn() -> T>,
        terms: Terms,
    },
}

pub(crate) struct VariableNode<T: 'static> {
    id: ObjectId,
    value: RefCell<T>,
    changed: Signal<T>,
    comparator: Comparator<T>,
    kind: VariableKind<T>,
    deps: Dependencies,
}

impl<T: Clone + 'static> VariableNode<T> {
    fn is_derived(&self) -> bool {
        matches!(self.kind, VariableKind::Derived { .. })
    }

    fn get(&self) -> T {
        match &self.kind {
            VariableKind::Derived { compute, .. } if !self.deps.is_active() => compute(),
            _ => self.value.borrow().clone(),
        }
    }

    fn equal(&self, old: &T, new: &T) -> Result<bool> {
        (self.comparator)(old, new)
    }
}

impl<T: Clone + 'static> DerivedNode for VariableNode<T> {
    fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    fn terms(&self) -> Terms {
        match &self.kind {
            VariableKind::Derived { terms, .. } => terms.clone(),
            VariableKind::Settable { .. } => Terms::new(),
        }
    }

    fn refresh(&self) {
        if let VariableKind::Derived { compute, .. } = &self.kind {
            *self.value.borrow_mut() = compute();
        }
    }

    fn term_changed(&self) {
        let VariableKind::Derived { compute, .. } = &self.kind else {
            return;
        };

        let new = compute();
        let equal = {
            let current = self.value.borrow();
            match self.equal(&current, &new) {
                Ok(equal) => equal,
                Err(err) => {
                    warn!(variable = %self.id, %err, "comparison failed, treating value as changed");
                    false
                }
            }
        };

        if !equal {
            *self.value.borrow_mut() = new.clone();
            self.changed.emit(&new);
        }
    }
}

impl<T: Clone + 'static> Observable for VariableNode<T> {
    fn listen(&self, listener: Box<dyn Fn()>) -> HandlerId {
        self.changed.attach(Handler::nullary(listener))
    }

    fn unlisten(&self, id: HandlerId) {
        self.changed.disconnect_id(id);
    }
}

/// A value object holding a value of type `T`.
///
/// `Variable` is a shared handle: clones refer to the same variable.
///
/// # Example
///
/// ```rust,ignore
/// let name = Variable::new(String::new());
/// name.changed().connect(Handler::new(|n: &String| println!("Hello, {}!", n)))?;
///
/// name.set("Chuk".to_string())?; // prints "Hello, Chuk!"
/// name.set("Chuk".to_string())?; // equal value: nothing printed
/// ```
pub struct Variable<T: 'static>(Rc<VariableNode<T>>);

impl<T: Clone + 'static> Variable<T> {
    /// A variable comparing values with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_comparator(value, |old, new| Ok(old == new))
    }

    /// A variable comparing values with `comparator`.
    ///
    /// `comparator` returns `Ok(true)` when the values are equal. An error
    /// makes [`set`](Self::set) fail with that error and keep the old value.
    pub fn with_comparator<F>(value: T, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> Result<bool> + 'static,
    {
        Self::build(value, Rc::new(comparator), None)
    }

    /// A variable that only accepts values for which `accepts` is true.
    ///
    /// Out-of-domain values fail with [`NotifyError::TypeConstraint`], both
    /// here and in [`set`](Self::set).
    pub fn restricted<F>(value: T, domain: impl Into<String>, accepts: F) -> Result<Self>
    where
        T: PartialEq,
        F: Fn(&T) -> bool + 'static,
    {
        let restriction = Restriction {
            domain: domain.into(),
            accepts: Box::new(accepts),
        };
        restriction.check(&value)?;
        Ok(Self::build(
            value,
            Rc::new(|old: &T, new: &T| Ok(old == new)),
            Some(restriction),
        ))
    }

    fn build(value: T, comparator: Comparator<T>, restriction: Option<Restriction<T>>) -> Self {
        let id = ObjectId::new();
        Self(Rc::new(VariableNode {
            id,
            value: RefCell::new(value),
            changed: Signal::new(),
            comparator,
            kind: VariableKind::Settable { restriction },
            deps: Dependencies::new(id),
        }))
    }

    pub(crate) fn derive<F>(compute: F, terms: Terms) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + 'static,
    {
        let id = ObjectId::new();
        let initial = compute();
        let node = Rc::new_cyclic(|weak: &Weak<VariableNode<T>>| VariableNode {
            id,
            value: RefCell::new(initial),
            changed: Signal::with_activity(derived::activity_hook(weak.clone())),
            comparator: Rc::new(|old: &T, new: &T| Ok(old == new)),
            kind: VariableKind::Derived {
                compute: Box::new(compute),
                terms,
            },
            deps: Dependencies::new(id),
        });
        Self(node)
    }

    pub(crate) fn observable(&self) -> Rc<dyn Observable> {
        Rc::clone(&self.0) as Rc<dyn Observable>
    }

    /// A clone of the current value.
    pub fn get(&self) -> T {
        self.0.get()
    }

    /// Call `f` with a reference to the current value.
    ///
    /// The value is borrowed, not cloned, while `f` runs, so `f` must not set
    /// this variable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let node = &self.0;
        match &node.kind {
            VariableKind::Derived { compute, .. } if !node.deps.is_active() => f(&compute()),
            _ => f(&node.value.borrow()),
        }
    }

    /// Replace the value.
    ///
    /// Returns whether the value changed; `changed` is emitted only then.
    /// Fails with [`NotifyError::TypeConstraint`] for out-of-domain values,
    /// leaving the value intact, and with [`NotifyError::State`] on derived
    /// variables.
    pub fn set(&self, value: T) -> Result<bool> {
        let node = &self.0;
        match &node.kind {
            VariableKind::Derived { .. } => {
                return Err(NotifyError::state("cannot set a derived variable"));
            }
            VariableKind::Settable { restriction } => {
                if let Some(restriction) = restriction {
                    restriction.check(&value)?;
                }
            }
        }

        let equal = {
            let current = node.value.borrow();
            node.equal(&current, &value)?
        };
        if equal {
            return Ok(false);
        }

        *node.value.borrow_mut() = value.clone();
        node.changed.emit(&value);
        Ok(true)
    }

    /// Replace the value with `f` applied to the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<bool> {
        let value = self.with(f);
        self.set(value)
    }

    pub fn is_derived(&self) -> bool {
        self.0.is_derived()
    }

    /// Whether this variable currently listens to its terms.
    pub fn is_active(&self) -> bool {
        self.0.deps.is_active()
    }

    /// Whether the variable's protector counts it as protected.
    pub fn is_protected(&self) -> bool {
        self.0.deps.is_protected()
    }

    /// A condition that is true while `test` holds for the value.
    ///
    /// The test runs again on every change of the variable; the condition
    /// still emits only when its state flips.
    pub fn predicate<F>(&self, test: F) -> Condition
    where
        F: Fn(&T) -> bool + 'static,
    {
        let variable = self.clone();
        Condition::derive(ConditionKind::Predicate {
            term: self.observable(),
            test: Rc::new(move || variable.with(&test)),
        })
    }

    /// A condition that is true while the value is truthy.
    pub fn is_true(&self) -> Condition
    where
        T: Truthy,
    {
        self.predicate(|value: &T| value.is_truthy())
    }

    /// A derived variable holding `f` applied to this variable's value.
    pub fn map<U, F>(&self, f: F) -> Variable<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let variable = self.clone();
        Variable::derive(move || variable.with(&f), smallvec![self.observable()])
    }
}

impl<T: 'static> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Clone + 'static> ValueObject for Variable<T> {
    type Value = T;

    fn changed(&self) -> &Signal<T> {
        &self.0.changed
    }

    fn get(&self) -> T {
        self.0.get()
    }

    fn differs(&self, old: &T, new: &T) -> Result<bool> {
        self.0.equal(old, new).map(|equal| !equal)
    }
}

impl<T: 'static> Protectable for Variable<T> {
    fn object_id(&self) -> ObjectId {
        self.0.id
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.0.id)
            .field("value", &self.get())
            .field("derived", &self.is_derived())
            .field("handler_count", &self.0.changed.handler_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
