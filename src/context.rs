//! The execution context.
//!
//! A [`Context`] is handed to every command body. It carries values (the logger, whatever the
//! modifiers put in) and a cancellation signal. It is immutable. Adding a value or a new
//! cancellation scope creates a derived context and leaves the original one alone. Clones are
//! cheap and all of them observe the same values and cancellation.
//!
//! Cancellation is cooperative. Nothing is interrupted, the code holding the context is expected
//! to check [`is_cancelled`][Context::is_cancelled] (or block in [`wait`][Context::wait]) and
//! wind down by itself.
//!
//! # Examples
//!
//! ```rust
//! use cliboot::Context;
//!
//! struct RequestId(u64);
//!
//! let (ctx, cancel) = Context::background().with_cancel();
//! let ctx = ctx.with_value(RequestId(42));
//! assert_eq!(42, ctx.get::<RequestId>().unwrap().0);
//!
//! assert!(!ctx.is_cancelled());
//! cancel.cancel();
//! assert!(ctx.is_cancelled());
//! ```

use std::any::{Any, TypeId};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::mem;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Value {
    id: TypeId,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Value>>,
}

#[derive(Default)]
struct State {
    cancelled: bool,
    children: Vec<Weak<Canceller>>,
    hooks: Vec<Box<dyn FnOnce() + Send>>,
}

#[derive(Default)]
struct Canceller {
    state: Mutex<State>,
    wakeup: Condvar,
}

impl Canceller {
    fn child(self: &Arc<Self>) -> Arc<Self> {
        let child = Arc::new(Canceller::default());
        let mut state = self.state.lock();
        if state.cancelled {
            drop(state);
            child.cancel();
        } else {
            state.children.retain(|c| c.strong_count() > 0);
            state.children.push(Arc::downgrade(&child));
        }
        child
    }

    fn cancel(&self) {
        let (hooks, children) = {
            let mut state = self.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            self.wakeup.notify_all();
            (
                mem::take(&mut state.hooks),
                mem::take(&mut state.children),
            )
        };
        // Run outside of the lock, the hooks may inspect the context themselves.
        for hook in hooks {
            hook();
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        while !state.cancelled {
            self.wakeup.wait(&mut state);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.cancelled {
            if self.wakeup.wait_until(&mut state, deadline).timed_out() {
                return state.cancelled;
            }
        }
        true
    }

    fn on_cancel(&self, hook: Box<dyn FnOnce() + Send>) {
        let mut state = self.state.lock();
        if state.cancelled {
            drop(state);
            hook();
        } else {
            state.hooks.push(hook);
        }
    }
}

/// A handle to cancel the context created by [`Context::with_cancel`].
///
/// Cancelling is idempotent. Dropping the handle does *not* cancel anything.
#[derive(Clone)]
pub struct CancelHandle(Arc<Canceller>);

impl CancelHandle {
    /// Cancels the associated context and everything derived from it.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Was the associated context cancelled already (by this handle or by a parent)?
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

impl Debug for CancelHandle {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_tuple("CancelHandle")
            .field(&self.is_cancelled())
            .finish()
    }
}

/// A value-carrying, cancellable context propagated to command bodies.
///
/// Values are keyed by their type. Storing a value of a type that is already present shadows the
/// older one in the derived context, all other values stay visible.
#[derive(Clone)]
pub struct Context {
    values: Option<Arc<Value>>,
    cancel: Arc<Canceller>,
}

impl Context {
    /// An empty context that is never cancelled.
    pub fn background() -> Self {
        Context {
            values: None,
            cancel: Arc::new(Canceller::default()),
        }
    }

    /// Derives a context with one more value.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        let value = Value {
            id: TypeId::of::<T>(),
            value: Box::new(value),
            parent: self.values.clone(),
        };
        Context {
            values: Some(Arc::new(value)),
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Derives a context with its own cancellation scope.
    ///
    /// Cancelling through the returned handle cancels the new context (and anything derived from
    /// it), but not `self`. Cancellation of `self` propagates into the new context.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let cancel = self.cancel.child();
        let ctx = Context {
            values: self.values.clone(),
            cancel: Arc::clone(&cancel),
        };
        (ctx, CancelHandle(cancel))
    }

    /// Looks up a value by its type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        let id = TypeId::of::<T>();
        let mut current = self.values.as_deref();
        while let Some(value) = current {
            if value.id == id {
                return value.value.downcast_ref();
            }
            current = value.parent.as_deref();
        }
        None
    }

    /// Is a value of this type present?
    pub fn contains<T: Any>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Was the context cancelled?
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Blocks until the context is cancelled.
    ///
    /// On a context that has no cancellation scope (eg. [`background`][Context::background])
    /// this blocks forever.
    pub fn wait(&self) {
        self.cancel.wait();
    }

    /// Blocks until the context is cancelled or the timeout elapses.
    ///
    /// Returns if the context is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.cancel.wait_timeout(timeout)
    }

    /// Registers a hook to run once the context gets cancelled.
    ///
    /// If it is cancelled already, the hook runs right away in the current thread. Otherwise it
    /// runs in whatever thread performs the cancellation.
    pub fn on_cancel<F: FnOnce() + Send + 'static>(&self, hook: F) {
        self.cancel.on_cancel(Box::new(hook));
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Debug for Context {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let mut values = 0;
        let mut current = self.values.as_deref();
        while let Some(value) = current {
            values += 1;
            current = value.parent.as_deref();
        }
        fmt.debug_struct("Context")
            .field("values", &values)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
