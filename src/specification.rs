// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The ambient context of a serialization pass.
//!
//! A [`SpecificationContext`] assigns ids to the instances written (or read) during one
//! pass, so an instance reachable through several paths is written once and referred to
//! by id afterwards. The context is ambient: code deep inside a pass finds it through
//! [`SpecificationContext::current`] rather than having it passed along.
//!
//! A [`SpecificationScope`] installs a context for as long as it lives. Scopes nest:
//!
//! ```rust
//! use typetx::specification::{SpecificationContext, SpecificationScope};
//!
//! assert!(SpecificationContext::current().is_none());
//! {
//!     let outer = SpecificationScope::new();
//!     assert!(outer.is_own());
//!     {
//!         // reuses the ambient context
//!         let inner = SpecificationScope::new();
//!         assert!(!inner.is_own());
//!         assert!(std::rc::Rc::ptr_eq(inner.context(), outer.context()));
//!     }
//!     assert!(!outer.context().borrow().is_disposed());
//!     assert!(SpecificationContext::current().is_some());
//! }
//! assert!(SpecificationContext::current().is_none());
//! ```
use crate::{HashMap, InstanceId, create_map};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

#[cfg(feature = "json")]
mod json;

type SharedContext = Rc<RefCell<SpecificationContext>>;

thread_local! {
    // one frame per live scope; the ambient context is the one of the last frame
    static FRAMES: RefCell<Vec<(u64, SharedContext)>> = const { RefCell::new(Vec::new()) };
    static NEXT_FRAME: Cell<u64> = const { Cell::new(0) };
}

/// Error returned when reading a specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// A JSON value does not have the shape required at its position.
    UnexpectedShape { expected: String, found: String },
    /// A complex value names neither its own type nor sits where one is implied.
    MissingType,
    /// A `$ref` names an id that was not defined before.
    UnknownReference(String),
    /// Two values define the same `$id`.
    DuplicateId(String),
    /// Numbers must be finite to be written.
    NonFiniteNumber,
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecError::UnexpectedShape { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            SpecError::MissingType => f.write_str("complex value without a type"),
            SpecError::UnknownReference(id) => write!(f, "reference to unknown id {id}"),
            SpecError::DuplicateId(id) => write!(f, "id {id} is defined twice"),
            SpecError::NonFiniteNumber => f.write_str("number is not finite"),
        }
    }
}

impl std::error::Error for SpecError {}

/// Maps instances to the ids they were given in one serialization pass.
#[derive(Debug, Default)]
pub struct SpecificationContext {
    ids: HashMap<InstanceId, String>,
    instances: HashMap<String, InstanceId>,
    next_id: u64,
    disposed: bool,
}

impl SpecificationContext {
    pub fn new() -> Self {
        Self {
            ids: create_map(),
            instances: create_map(),
            next_id: 0,
            disposed: false,
        }
    }

    /// The ambient context of this thread.
    pub fn current() -> Option<Rc<RefCell<SpecificationContext>>> {
        FRAMES.with(|frames| frames.borrow().last().map(|(_, context)| Rc::clone(context)))
    }

    /// Returns the id of `instance`, assigning the next free one if it has none.
    pub fn add(&mut self, instance: InstanceId) -> String {
        if let Some(id) = self.ids.get(&instance) {
            return id.clone();
        }
        let id = loop {
            self.next_id += 1;
            let candidate = self.next_id.to_string();
            if !self.instances.contains_key(&candidate) {
                break candidate;
            }
        };
        self.ids.insert(instance, id.clone());
        self.instances.insert(id.clone(), instance);
        id
    }

    /// Registers `instance` under an id chosen elsewhere, as read from a specification.
    pub fn register(&mut self, id: &str, instance: InstanceId) -> Result<(), SpecError> {
        if self.instances.contains_key(id) {
            return Err(SpecError::DuplicateId(id.to_owned()));
        }
        self.ids.insert(instance, id.to_owned());
        self.instances.insert(id.to_owned(), instance);
        Ok(())
    }

    pub fn id_of(&self, instance: InstanceId) -> Option<&str> {
        self.ids.get(&instance).map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<InstanceId> {
        self.instances.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Forgets every id.
    pub fn dispose(&mut self) {
        self.ids.clear();
        self.instances.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Keeps a [`SpecificationContext`] ambient while it lives.
///
/// Dropping the scope (or calling [`dispose`](SpecificationScope::dispose)) disposes the
/// context if the scope created it, and makes the context of the innermost scope still
/// alive ambient again. This happens on every exit path, including unwinding, and also
/// when scopes are dropped in another order than they were created in.
#[must_use = "the context is only ambient while the scope lives"]
pub struct SpecificationScope {
    context: Rc<RefCell<SpecificationContext>>,
    frame: u64,
    is_own: bool,
}

impl SpecificationScope {
    /// Reuses the ambient context, or creates and installs a new one.
    pub fn new() -> Self {
        match SpecificationContext::current() {
            Some(current) => Self::install(current, false),
            None => Self::install(Rc::new(RefCell::new(SpecificationContext::new())), true),
        }
    }

    /// Installs `context` as the ambient context.
    pub fn with_context(context: Rc<RefCell<SpecificationContext>>) -> Self {
        Self::install(context, false)
    }

    fn install(context: Rc<RefCell<SpecificationContext>>, is_own: bool) -> Self {
        let frame = NEXT_FRAME.with(|next| {
            next.set(next.get() + 1);
            next.get()
        });
        FRAMES.with(|frames| frames.borrow_mut().push((frame, Rc::clone(&context))));
        Self {
            context,
            frame,
            is_own,
        }
    }

    pub fn context(&self) -> &Rc<RefCell<SpecificationContext>> {
        &self.context
    }

    /// Whether the scope created its context.
    pub fn is_own(&self) -> bool {
        self.is_own
    }

    /// Same as dropping the scope.
    pub fn dispose(self) {}
}

impl Default for SpecificationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpecificationScope {
    fn drop(&mut self) {
        if self.is_own {
            // the context may still be borrowed while unwinding
            if let Ok(mut context) = self.context.try_borrow_mut() {
                context.dispose();
            }
        }
        // the thread local is gone while the thread shuts down
        let _ = FRAMES.try_with(|frames| {
            frames.borrow_mut().retain(|(frame, _)| *frame != self.frame);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_is(context: &Rc<RefCell<SpecificationContext>>) -> bool {
        SpecificationContext::current().is_some_and(|current| Rc::ptr_eq(&current, context))
    }

    #[test]
    fn ids_are_stable() {
        let mut context = SpecificationContext::new();
        let a = InstanceId::from_raw(4);
        let b = InstanceId::from_raw(9);
        let first = context.add(a);
        assert_eq!(context.add(a), first);
        let second = context.add(b);
        assert_ne!(first, second);
        assert_eq!(context.get(&second), Some(b));
        assert_eq!(context.id_of(a), Some(first.as_str()));
    }

    #[test]
    fn registered_ids_are_not_reused() {
        let mut context = SpecificationContext::new();
        context.register("1", InstanceId::from_raw(0)).unwrap();
        assert_eq!(
            context.register("1", InstanceId::from_raw(1)),
            Err(SpecError::DuplicateId("1".to_owned()))
        );
        assert_eq!(context.add(InstanceId::from_raw(1)), "2");
    }

    #[test]
    fn explicit_context_is_restored_over() {
        let outer = SpecificationScope::new();
        let own = Rc::clone(outer.context());
        let explicit = Rc::new(RefCell::new(SpecificationContext::new()));
        {
            let inner = SpecificationScope::with_context(Rc::clone(&explicit));
            assert!(!inner.is_own());
            assert!(current_is(&explicit));
        }
        assert!(current_is(&own));
        assert!(!explicit.borrow().is_disposed());
        drop(outer);
        assert!(own.borrow().is_disposed());
        assert!(SpecificationContext::current().is_none());
    }

    #[test]
    fn reusing_scope_leaves_context_alive() {
        let outer = SpecificationScope::new();
        let inner = SpecificationScope::new();
        inner.context().borrow_mut().add(InstanceId::from_raw(3));
        drop(inner);
        assert!(!outer.context().borrow().is_disposed());
        assert_eq!(outer.context().borrow().id_of(InstanceId::from_raw(3)), Some("1"));
        assert!(current_is(outer.context()));
    }

    #[test]
    fn dropping_out_of_order_leaves_no_disposed_context() {
        let first = SpecificationScope::new();
        let own = Rc::clone(first.context());
        let explicit = Rc::new(RefCell::new(SpecificationContext::new()));
        let second = SpecificationScope::with_context(Rc::clone(&explicit));

        drop(first);
        assert!(own.borrow().is_disposed());
        assert!(current_is(&explicit));

        drop(second);
        assert!(SpecificationContext::current().is_none());
        assert!(!explicit.borrow().is_disposed());

        let fresh = SpecificationScope::new();
        assert!(fresh.is_own());
        assert!(!Rc::ptr_eq(fresh.context(), &own));
        assert!(!fresh.context().borrow().is_disposed());
    }

    #[test]
    fn restored_when_unwinding() {
        let result = std::panic::catch_unwind(|| {
            let _scope = SpecificationScope::new();
            assert!(SpecificationContext::current().is_some());
            panic!("in the middle of a pass");
        });
        assert!(result.is_err());
        assert!(SpecificationContext::current().is_none());
    }

    #[quickcheck]
    fn nesting_restores_previous(depths: Vec<bool>) -> bool {
        // `true` pushes a fresh explicit context, `false` a reusing scope
        let mut scopes = Vec::new();
        let mut expected = Vec::new();
        for explicit in depths.iter().take(16) {
            let scope = if *explicit {
                SpecificationScope::with_context(Rc::new(RefCell::new(SpecificationContext::new())))
            } else {
                SpecificationScope::new()
            };
            expected.push(Rc::clone(scope.context()));
            scopes.push(scope);
        }
        let mut ok = true;
        while let Some(scope) = scopes.pop() {
            ok &= current_is(&expected.pop().unwrap());
            drop(scope);
        }
        ok && SpecificationContext::current().is_none()
    }
}
