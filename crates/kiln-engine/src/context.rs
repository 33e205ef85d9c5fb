//! Specification context
//!
//! Binds temporary identifiers (`_:N`) to the anonymous types built for them
//! while one root generic specification is being resolved. Contexts live on a
//! per-thread stack; a [`SpecificationScope`] guard pushes one on entry and
//! pops it when dropped, including on error paths.
//!
//! Type construction never yields, so a context is only ever observed by
//! the synchronous phase that created it.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::class::Type;
use crate::error::{KilnError, KilnResult};

/// Prefix marking temporary identifiers
pub const TEMPORARY_ID_PREFIX: &str = "_:";

/// Whether `id` is a temporary identifier
pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMPORARY_ID_PREFIX)
}

thread_local! {
    static ACTIVE: RefCell<Vec<Rc<SpecificationContext>>> = const { RefCell::new(Vec::new()) };
}

/// Temporary identifier bindings of one root resolution
#[derive(Debug, Default)]
pub struct SpecificationContext {
    bindings: RefCell<FxHashMap<String, Type>>,
}

impl SpecificationContext {
    /// Type bound to a temporary identifier
    pub fn get(&self, id: &str) -> Option<Type> {
        self.bindings.borrow().get(id).cloned()
    }

    /// Bind a temporary identifier.
    ///
    /// The first binding wins: returns `false` and leaves the existing
    /// binding in place when `id` is already bound.
    pub fn bind(&self, id: &str, ty: Type) -> bool {
        let mut bindings = self.bindings.borrow_mut();
        if bindings.contains_key(id) {
            return false;
        }
        bindings.insert(id.to_string(), ty);
        true
    }

    /// Number of bound identifiers
    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Context on top of this thread's stack
    pub fn current() -> Option<Rc<SpecificationContext>> {
        ACTIVE.with(|stack| stack.borrow().last().cloned())
    }

    /// Whether a context is active on this thread
    pub fn is_active() -> bool {
        ACTIVE.with(|stack| !stack.borrow().is_empty())
    }

    /// Resolve a temporary identifier against the active context
    pub fn lookup(id: &str) -> KilnResult<Type> {
        let context = Self::current().ok_or_else(|| {
            KilnError::invalid(
                "typeRef",
                format!(
                    "temporary id '{}' cannot occur outside of a specification",
                    id
                ),
            )
        })?;
        context.get(id).ok_or_else(|| {
            KilnError::invalid(
                "typeRef",
                format!("temporary id '{}' does not correspond to an existing type", id),
            )
        })
    }
}

/// Guard for an active specification context
pub struct SpecificationScope {
    context: Rc<SpecificationContext>,
    is_root: bool,
    // Tied to the thread whose stack it manipulates
    _not_send: PhantomData<*const ()>,
}

impl SpecificationScope {
    /// Join the active context, or push a fresh one when none is active.
    ///
    /// Nested generic specifications resolved inside one root share its
    /// context; only the root guard pops on drop.
    pub fn enter() -> Self {
        match SpecificationContext::current() {
            Some(context) => Self {
                context,
                is_root: false,
                _not_send: PhantomData,
            },
            None => Self::enter_new(),
        }
    }

    /// Push a fresh context even when one is already active
    pub fn enter_new() -> Self {
        let context = Rc::new(SpecificationContext::default());
        ACTIVE.with(|stack| stack.borrow_mut().push(context.clone()));
        Self {
            context,
            is_root: true,
            _not_send: PhantomData,
        }
    }

    /// The context this scope resolves against
    pub fn context(&self) -> &SpecificationContext {
        &self.context
    }

    /// Whether this guard owns (and will pop) its context
    pub fn is_root(&self) -> bool {
        self.is_root
    }
}

impl Drop for SpecificationScope {
    fn drop(&mut self) {
        if self.is_root {
            ACTIVE.with(|stack| {
                let mut stack = stack.borrow_mut();
                if let Some(top) = stack.pop() {
                    debug_assert!(Rc::ptr_eq(&top, &self.context));
                }
            });
        }
    }
}
