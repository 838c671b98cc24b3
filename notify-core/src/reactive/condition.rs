//! Conditions
//!
//! A condition is a boolean value object. Conditions can be combined with
//! the logical operators `!`, `&`, `|` and `^`; every combinator returns a
//! new derived condition that follows its terms. A derived condition
//! recomputes whenever a term emits, but emits `changed` only if its own
//! state flips.
//!
//! Recomputation is not glitch-free. A term's listeners run in connection
//! order, so a combinator may read another derived term before that term has
//! caught up: `a & !a` is never true once settled, yet it emits `true` and
//! then `false` when `a` becomes true.
//!
//! # Example
//!
//! ```rust,ignore
//! let door_open = Condition::new(false);
//! let alarm_armed = Condition::new(true);
//! let alarm = &door_open & &alarm_armed;
//!
//! alarm.store(Handler::new(|on: &bool| println!("alarm: {}", on)))?;
//! door_open.set(true)?; // prints "alarm: true"
//! ```

use std::cell::Cell;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use std::rc::{Rc, Weak};

use smallvec::smallvec;

use super::derived::{self, Dependencies, DerivedNode, Observable, Terms};
use super::handler::{Handler, HandlerId};
use super::signal::Signal;
use super::value::ValueObject;
use super::variable::Variable;
use crate::error::{NotifyError, Result};
use crate::gc::{ObjectId, Protectable};

/// How a condition's state is determined.
pub(crate) enum ConditionKind {
    /// Set directly with [`Condition::set`].
    Settable,
    /// Never changes.
    Constant,
    Not(Condition),
    And(Condition, Condition),
    Or(Condition, Condition),
    Xor(Condition, Condition),
    IfElse {
        selector: Condition,
        if_true: Condition,
        if_false: Condition,
    },
    /// A test of a variable's value.
    Predicate {
        term: Rc<dyn Observable>,
        test: Rc<dyn Fn() -> bool>,
    },
}

impl ConditionKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Settable => "settable",
            Self::Constant => "constant",
            Self::Not(_) => "not",
            Self::And(..) => "and",
            Self::Or(..) => "or",
            Self::Xor(..) => "xor",
            Self::IfElse { .. } => "if_else",
            Self::Predicate { .. } => "predicate",
        }
    }

    fn is_derived(&self) -> bool {
        !matches!(self, Self::Settable | Self::Constant)
    }
}

pub(crate) struct ConditionNode {
    id: ObjectId,
    state: Cell<bool>,
    changed: Signal<bool>,
    kind: ConditionKind,
    deps: Dependencies,
}

impl ConditionNode {
    /// State computed from the terms, ignoring the cache.
    fn compute(&self) -> bool {
        match &self.kind {
            ConditionKind::Settable | ConditionKind::Constant => self.state.get(),
            ConditionKind::Not(a) => !a.state(),
            ConditionKind::And(a, b) => a.state() && b.state(),
            ConditionKind::Or(a, b) => a.state() || b.state(),
            ConditionKind::Xor(a, b) => a.state() != b.state(),
            ConditionKind::IfElse {
                selector,
                if_true,
                if_false,
            } => {
                if selector.state() {
                    if_true.state()
                } else {
                    if_false.state()
                }
            }
            ConditionKind::Predicate { test, .. } => test(),
        }
    }

    fn state(&self) -> bool {
        if self.kind.is_derived() && !self.deps.is_active() {
            self.compute()
        } else {
            self.state.get()
        }
    }

    /// Store `state` and emit if it flipped.
    fn update(&self, state: bool) -> bool {
        if self.state.replace(state) == state {
            return false;
        }
        self.changed.emit(&state);
        true
    }
}

impl DerivedNode for ConditionNode {
    fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    fn terms(&self) -> Terms {
        match &self.kind {
            ConditionKind::Settable | ConditionKind::Constant => Terms::new(),
            ConditionKind::Not(a) => smallvec![a.observable()],
            ConditionKind::And(a, b) | ConditionKind::Or(a, b) | ConditionKind::Xor(a, b) => {
                smallvec![a.observable(), b.observable()]
            }
            ConditionKind::IfElse {
                selector,
                if_true,
                if_false,
            } => smallvec![
                selector.observable(),
                if_true.observable(),
                if_false.observable()
            ],
            ConditionKind::Predicate { term, .. } => smallvec![Rc::clone(term)],
        }
    }

    fn refresh(&self) {
        self.state.set(self.compute());
    }

    fn term_changed(&self) {
        self.update(self.compute());
    }
}

impl Observable for ConditionNode {
    fn listen(&self, listener: Box<dyn Fn()>) -> HandlerId {
        self.changed.attach(Handler::nullary(listener))
    }

    fn unlisten(&self, id: HandlerId) {
        self.changed.disconnect_id(id);
    }
}

/// A boolean value object.
///
/// `Condition` is a shared handle: clones refer to the same condition.
/// Dropping every handle to a derived condition does not stop it while a
/// handler is connected to it (directly or through conditions built on it).
#[derive(Clone)]
pub struct Condition(Rc<ConditionNode>);

impl Condition {
    /// A condition whose state is changed with [`set`](Self::set).
    pub fn new(state: bool) -> Self {
        Self::build(state, ConditionKind::Settable)
    }

    /// A condition that is always `state`.
    pub fn constant(state: bool) -> Self {
        Self::build(state, ConditionKind::Constant)
    }

    fn build(state: bool, kind: ConditionKind) -> Self {
        let id = ObjectId::new();
        Self(Rc::new(ConditionNode {
            id,
            state: Cell::new(state),
            changed: Signal::new(),
            kind,
            deps: Dependencies::new(id),
        }))
    }

    pub(crate) fn derive(kind: ConditionKind) -> Self {
        let id = ObjectId::new();
        let node = Rc::new_cyclic(|weak: &Weak<ConditionNode>| ConditionNode {
            id,
            state: Cell::new(false),
            changed: Signal::with_activity(derived::activity_hook(weak.clone())),
            kind,
            deps: Dependencies::new(id),
        });
        node.refresh();
        Self(node)
    }

    pub(crate) fn observable(&self) -> Rc<dyn Observable> {
        Rc::clone(&self.0) as Rc<dyn Observable>
    }

    pub fn state(&self) -> bool {
        self.0.state()
    }

    /// Set the state of a settable condition.
    ///
    /// Returns whether the state flipped; `changed` is emitted only then.
    /// Derived and constant conditions fail with [`NotifyError::State`].
    pub fn set(&self, state: bool) -> Result<bool> {
        match self.0.kind {
            ConditionKind::Settable => Ok(self.0.update(state)),
            ref kind => Err(NotifyError::state(format!(
                "cannot set the state of a {} condition",
                kind.name()
            ))),
        }
    }

    /// Whether the state is computed from other value objects.
    pub fn is_derived(&self) -> bool {
        self.0.kind.is_derived()
    }

    /// Whether this condition currently listens to its terms.
    ///
    /// Only derived conditions with at least one handler are active.
    pub fn is_active(&self) -> bool {
        self.0.deps.is_active()
    }

    /// Whether the condition's protector counts it as protected.
    pub fn is_protected(&self) -> bool {
        self.0.deps.is_protected()
    }

    /// A condition that is true when this one is false.
    pub fn negate(&self) -> Condition {
        Self::derive(ConditionKind::Not(self.clone()))
    }

    /// A condition that is true when both `self` and `other` are.
    pub fn and(&self, other: &Condition) -> Condition {
        Self::derive(ConditionKind::And(self.clone(), other.clone()))
    }

    /// A condition that is true when `self`, `other` or both are.
    pub fn or(&self, other: &Condition) -> Condition {
        Self::derive(ConditionKind::Or(self.clone(), other.clone()))
    }

    /// A condition that is true when exactly one of `self` and `other` is.
    pub fn xor(&self, other: &Condition) -> Condition {
        Self::derive(ConditionKind::Xor(self.clone(), other.clone()))
    }

    /// `if_true` if the condition is currently true, `if_false` otherwise.
    ///
    /// The result is a plain value and does not follow later changes. Use
    /// [`if_else_condition`](Self::if_else_condition) or
    /// [`if_else_variable`](Self::if_else_variable) for live selection.
    pub fn if_else<T>(&self, if_true: T, if_false: T) -> T {
        if self.state() {
            if_true
        } else {
            if_false
        }
    }

    /// A condition that follows `if_true` while this condition is true and
    /// `if_false` while it is false.
    pub fn if_else_condition(&self, if_true: &Condition, if_false: &Condition) -> Condition {
        Self::derive(ConditionKind::IfElse {
            selector: self.clone(),
            if_true: if_true.clone(),
            if_false: if_false.clone(),
        })
    }

    /// A variable that follows `if_true` while this condition is true and
    /// `if_false` while it is false.
    pub fn if_else_variable<T>(&self, if_true: &Variable<T>, if_false: &Variable<T>) -> Variable<T>
    where
        T: Clone + PartialEq + 'static,
    {
        let selector = self.clone();
        let (on_true, on_false) = (if_true.clone(), if_false.clone());
        Variable::derive(
            move || {
                if selector.state() {
                    on_true.get()
                } else {
                    on_false.get()
                }
            },
            smallvec![self.observable(), if_true.observable(), if_false.observable()],
        )
    }
}

impl ValueObject for Condition {
    type Value = bool;

    fn changed(&self) -> &Signal<bool> {
        &self.0.changed
    }

    fn get(&self) -> bool {
        self.state()
    }

    fn differs(&self, old: &bool, new: &bool) -> Result<bool> {
        Ok(old != new)
    }
}

impl Protectable for Condition {
    fn object_id(&self) -> ObjectId {
        self.0.id
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind.name())
            .field("state", &self.state())
            .field("active", &self.is_active())
            .field("handler_count", &self.0.changed.handler_count())
            .finish()
    }
}

impl Not for &Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        self.negate()
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        self.negate()
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $combinator:ident) => {
        impl $trait<&Condition> for &Condition {
            type Output = Condition;

            fn $method(self, other: &Condition) -> Condition {
                self.$combinator(other)
            }
        }

        impl $trait<Condition> for Condition {
            type Output = Condition;

            fn $method(self, other: Condition) -> Condition {
                self.$combinator(&other)
            }
        }
    };
}

binary_operator!(BitAnd, bitand, and);
binary_operator!(BitOr, bitor, or);
binary_operator!(BitXor, bitxor, xor);

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
