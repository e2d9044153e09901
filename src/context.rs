//! Stack-scoped, thread-local evaluation contexts.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::value::Value;

// The per-thread context stack. Strictly thread-local: a pushed context is
// never visible to any other thread.
thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// A key/value environment that parameterizes computation.
///
/// The context is the sole cache discriminator besides plug identity: the
/// same output plug computed under different contexts yields independent
/// cache entries. Contexts are pushed for the current thread with
/// [`Context::scoped`] and treated as immutable for the duration of any
/// evaluation they parameterize.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    frame: f64,
    variables: BTreeMap<String, Value>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            frame: 1.0,
            variables: BTreeMap::new(),
        }
    }
}

impl Context {
    /// A context with frame 1.0 and no variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current frame.
    pub fn frame(&self) -> f64 {
        self.frame
    }

    /// Set the current frame.
    pub fn set_frame(&mut self, frame: f64) {
        self.frame = frame;
    }

    /// Look up a named variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Bind a named variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// A clone of the calling thread's active context, or the default context
    /// if none is pushed.
    pub fn current() -> Context {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// Push a clone of this context as the calling thread's active context.
    ///
    /// The returned guard pops it again on drop, on all exit paths. The guard
    /// is not `Send`, so a scope can never migrate to another thread.
    pub fn scoped(&self) -> ContextScope {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        ContextScope {
            _not_send: PhantomData,
        }
    }

    /// A stable hash of the full context, used as the cache discriminator.
    ///
    /// BTreeMap iteration order makes the hash independent of insertion
    /// order; floats hash by bit pattern.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = std::hash::DefaultHasher::new();
        self.frame.to_bits().hash(&mut hasher);
        for (name, value) in &self.variables {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Guard for a pushed context; pops it when dropped.
pub struct ContextScope {
    // Raw pointer marker keeps the guard !Send and !Sync.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
