//! Cancellable one-shot timers.
//!
//! All herder timeouts (trigger cadence, ballot bumping, deferred ballot
//! acceptance) run through [`OneshotTimer`]: a spawned task that races a
//! sleep against a cancellation channel. A cancelled or dropped timer
//! exits without side effect.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::sleep;

use kraal_fba::ValidationCallback;

/// A one-shot timer that fires a closure after a delay unless cancelled.
///
/// Dropping the timer cancels it.
pub struct OneshotTimer {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl OneshotTimer {
    /// Arm a timer. Must be called from within a tokio runtime.
    pub fn spawn<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => on_fire(),
                // Resolves on explicit cancel or when the handle is dropped.
                _ = cancel_rx => {}
            }
        });
        Self {
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Cancel the timer. The closure will not run.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for OneshotTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A validation callback that can be fired from more than one place but
/// runs at most once.
///
/// The deferred-accept registry needs this: the timer task fires the
/// callback on expiry, and the v-blocking rush fires it early. Whichever
/// path gets there first takes the callback; the other finds it gone.
#[derive(Clone)]
pub struct SharedCallback {
    inner: Arc<Mutex<Option<ValidationCallback>>>,
}

impl SharedCallback {
    pub fn new(cb: ValidationCallback) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(cb))),
        }
    }

    /// Invoke the callback with `outcome` if it has not run yet.
    pub fn fire(&self, outcome: bool) {
        let cb = self.inner.lock().take();
        if let Some(cb) = cb {
            cb(outcome);
        }
    }
}
