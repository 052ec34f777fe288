//! The ordered teardown chain.
//!
//! The chain is composed of two named stages. The [`Internal`][Stage::Internal] one holds the
//! teardown of resources owned by the library itself (the signal bridge), the
//! [`Caller`][Stage::Caller] one holds whatever the user registered. The internal stage always
//! runs first, so nothing the user tears down can race with a signal arriving.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error, trace};
use parking_lot::Mutex;

use crate::options::CleanupFn;

/// Stage of the cleanup chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Stage {
    /// Teardown of the library-owned resources. Runs first.
    Internal,
    /// The procedures supplied by the caller. Run after the internal ones.
    Caller,
}

/// Builder of the [`CleanupChain`].
///
/// The stages can be filled in any order, the resulting chain orders them.
#[derive(Default)]
#[must_use = "The builder does nothing until built"]
pub struct Builder {
    internal: Vec<CleanupFn>,
    caller: Vec<CleanupFn>,
}

impl Builder {
    /// Appends a procedure to the internal stage.
    pub fn internal<F: FnOnce() + Send + 'static>(mut self, procedure: F) -> Self {
        self.internal.push(Box::new(procedure));
        self
    }

    /// Appends a procedure to the caller stage.
    pub fn caller<F: FnOnce() + Send + 'static>(mut self, procedure: F) -> Self {
        self.caller.push(Box::new(procedure));
        self
    }

    /// Appends already boxed procedures to the caller stage.
    pub fn callers<I: IntoIterator<Item = CleanupFn>>(mut self, procedures: I) -> Self {
        self.caller.extend(procedures);
        self
    }

    /// Finishes the chain.
    pub fn build(self) -> CleanupChain {
        let procedures = self
            .internal
            .into_iter()
            .map(|p| (Stage::Internal, p))
            .chain(self.caller.into_iter().map(|p| (Stage::Caller, p)))
            .collect();
        CleanupChain {
            procedures: Mutex::new(Some(procedures)),
        }
    }
}

/// A run-once sequence of teardown procedures.
pub struct CleanupChain {
    procedures: Mutex<Option<Vec<(Stage, CleanupFn)>>>,
}

impl CleanupChain {
    /// Starts building a new chain.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Runs all the procedures, in order.
    ///
    /// A panicking procedure is logged and the rest still runs. Only the first call does
    /// anything, the later ones return right away (or, if the first one is still in progress in
    /// another thread, once it finishes).
    ///
    /// # Warning
    ///
    /// A procedure must not call `run` on the very same chain, that would deadlock.
    pub fn run(&self) {
        let mut procedures = self.procedures.lock();
        let procedures = match procedures.take() {
            Some(procedures) => procedures,
            None => {
                trace!("Cleanup already done");
                return;
            }
        };
        debug!("Running {} cleanup procedures", procedures.len());
        for (stage, procedure) in procedures {
            if panic::catch_unwind(AssertUnwindSafe(procedure)).is_err() {
                error!("A cleanup procedure of the {:?} stage panicked", stage);
            }
        }
    }

    /// Did the chain run already?
    pub fn has_run(&self) -> bool {
        self.procedures.lock().is_none()
    }
}

impl Debug for CleanupChain {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let procedures = self.procedures.lock();
        let mut dbg = fmt.debug_struct("CleanupChain");
        match procedures.as_ref() {
            Some(procedures) => dbg.field("pending", &procedures.len()),
            None => dbg.field("pending", &0),
        };
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> CleanupFn) {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_rec = Arc::clone(&order);
        let rec = move |name: &'static str| -> CleanupFn {
            let order = Arc::clone(&order_rec);
            Box::new(move || order.lock().push(name))
        };
        (order, rec)
    }

    #[test]
    fn internal_first() {
        let (order, rec) = recorder();
        let chain = CleanupChain::builder()
            .callers(vec![rec("user1"), rec("user2")])
            .internal(rec("internal"))
            .build();
        chain.run();
        assert_eq!(vec!["internal", "user1", "user2"], *order.lock());
    }

    #[test]
    fn runs_once() {
        let (order, rec) = recorder();
        let chain = CleanupChain::builder()
            .internal(rec("internal"))
            .callers(vec![rec("user")])
            .build();
        assert!(!chain.has_run());
        chain.run();
        chain.run();
        assert!(chain.has_run());
        assert_eq!(vec!["internal", "user"], *order.lock());
    }

    #[test]
    fn panic_does_not_stop_the_rest() {
        let (order, rec) = recorder();
        let chain = CleanupChain::builder()
            .internal(rec("internal"))
            .caller(|| panic!("Broken cleanup"))
            .callers(vec![rec("after")])
            .build();
        chain.run();
        assert_eq!(vec!["internal", "after"], *order.lock());
    }

    #[test]
    fn empty() {
        let chain = CleanupChain::builder().build();
        assert!(format!("{:?}", chain).contains("pending: 0"));
        chain.run();
        assert!(chain.has_run());
    }
}
