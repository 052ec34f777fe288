//! The bridge between termination signals and context cancellation.
//!
//! There's exactly one [`SignalBridge`] per [`Cli`][crate::Cli]. It subscribes to `SIGINT` and
//! `SIGTERM` and runs a background thread that waits for one of them. When a signal arrives, it
//! cancels the context it guards. It is the only thing cancelling that context (apart from the
//! teardown itself).
//!
//! The bridge is set up once, when the [`Cli`][crate::Cli] is created. Every execution derives
//! its context from the guarded one, so no matter how many times commands run, there's only one
//! subscription to the signals.
//!
//! Only the first signal is turned into cancellation. Once the bridge is done (a signal arrived
//! or it was shut down), the signals get their default action back. A second `Ctrl+C` kills a
//! command that doesn't react to the cancellation, and a process past its teardown can be
//! terminated as usual.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::Error as IoError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use libc::c_int;
use log::{debug, error, trace};
use parking_lot::Mutex;
use signal_hook::flag;
use signal_hook::iterator::{Handle, Signals};

use crate::context::{CancelHandle, Context};

/// The signals translated into cancellation.
pub const TERM_SIGNALS: &[c_int] = &[libc::SIGINT, libc::SIGTERM];

/// The owned signal subscription with its watching thread.
///
/// Dropping it shuts it down (see [`shutdown`][SignalBridge::shutdown]).
pub struct SignalBridge {
    cancel: CancelHandle,
    handle: Handle,
    restore_default: Arc<AtomicBool>,
    bg_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SignalBridge {
    /// Subscribes to the termination signals and starts the watching thread.
    ///
    /// Returns a context derived from `parent` that gets cancelled on the first termination
    /// signal, together with the bridge owning the subscription.
    pub fn install(parent: &Context) -> Result<(Context, Self), IoError> {
        // While false, the signals are left to the bridge alone. Once set, they act as if no
        // handler was installed. These registrations stay for the rest of the process.
        let restore_default = Arc::new(AtomicBool::new(false));
        let restore_on_error = |e: IoError| {
            restore_default.store(true, Ordering::SeqCst);
            e
        };
        for signal in TERM_SIGNALS {
            flag::register_conditional_default(*signal, Arc::clone(&restore_default))
                .map_err(restore_on_error)?;
        }
        let mut signals = Signals::new(TERM_SIGNALS).map_err(restore_on_error)?;
        let handle = signals.handle();
        let (ctx, cancel) = parent.with_cancel();

        // If the context is cancelled through some other path, stop waiting for signals.
        let closer = handle.clone();
        ctx.on_cancel(move || closer.close());

        let bg_cancel = cancel.clone();
        let bg_restore = Arc::clone(&restore_default);
        let bg_thread = thread::Builder::new()
            .name("cliboot-signals".to_owned())
            .spawn(move || {
                debug!("Watching for termination signals");
                let signal = signals.forever().next();
                bg_restore.store(true, Ordering::SeqCst);
                if let Some(signal) = signal {
                    debug!("Received signal {}, cancelling", signal);
                    bg_cancel.cancel();
                }
                debug!("Terminating the signal watching thread");
            })
            .map_err(restore_on_error)?;

        let bridge = SignalBridge {
            cancel,
            handle,
            restore_default,
            bg_thread: Mutex::new(Some(bg_thread)),
        };
        Ok((ctx, bridge))
    }

    /// Is the watching thread still around?
    pub fn is_running(&self) -> bool {
        self.bg_thread.lock().is_some()
    }

    /// Cancels the guarded context, releases the subscription and waits for the thread.
    ///
    /// Once this returns, no signal can cancel anything anymore and the signals have their default
    /// action again. Calling it again does nothing.
    pub fn shutdown(&self) {
        let mut bg_thread = self.bg_thread.lock();
        if let Some(bg_thread) = bg_thread.take() {
            trace!("Shutting down the signal bridge");
            self.cancel.cancel();
            self.handle.close();
            if bg_thread.join().is_err() {
                error!("The signal watching thread panicked");
            }
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Debug for SignalBridge {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("SignalBridge")
            .field("running", &self.is_running())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("default_restored", &self.restore_default.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn shutdown_cancels_and_joins() {
        let parent = Context::background();
        let (ctx, bridge) = SignalBridge::install(&parent).unwrap();
        assert!(bridge.is_running());
        assert!(!ctx.is_cancelled());
        assert!(!bridge.restore_default.load(Ordering::SeqCst));

        bridge.shutdown();
        assert!(!bridge.is_running());
        assert!(ctx.is_cancelled());
        assert!(bridge.restore_default.load(Ordering::SeqCst));
        assert!(!parent.is_cancelled());

        // Idempotent
        bridge.shutdown();
        assert!(!bridge.is_running());
    }

    /// Cancelling the parent stops the watching thread without any signal.
    #[test]
    fn parent_cancel_stops_thread() {
        let (parent, cancel) = Context::background().with_cancel();
        let (ctx, bridge) = SignalBridge::install(&parent).unwrap();
        cancel.cancel();
        assert!(ctx.wait_timeout(Duration::from_secs(5)));
        // The thread is already on its way out, this only collects it
        bridge.shutdown();
        assert!(!bridge.is_running());
    }

    #[test]
    fn drop_shuts_down() {
        let (ctx, bridge) = SignalBridge::install(&Context::background()).unwrap();
        drop(bridge);
        assert!(ctx.is_cancelled());
    }
}
