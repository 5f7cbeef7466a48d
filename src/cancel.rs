//! Cooperative cancellation shared by loaders, anti-join producers and writers

use crate::error::{KeydiffError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Clonable flag checked at every row step of every task in a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Box<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every child derived from it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Return `Err(Cancelled)` once the token (or an ancestor) has fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(KeydiffError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Token that fires when either this token or the child itself is cancelled.
    ///
    /// Used for fan-out groups: a failing task cancels its group without
    /// touching the caller's token, while a caller cancel still reaches it.
    pub fn child(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Arm a watchdog thread that cancels this token after `timeout`.
    ///
    /// The watchdog polls, so dropping the returned guard stops it promptly.
    pub fn cancel_after(&self, timeout: Duration) -> Watchdog {
        let token = self.clone();
        let deadline = Instant::now() + timeout;

        Watchdog::spawn("keydiff-deadline", move |disarmed| {
            while !disarmed.is_cancelled() {
                let now = Instant::now();
                if now >= deadline {
                    log::warn!("Deadline of {:?} reached, cancelling run", timeout);
                    token.cancel();
                    return;
                }
                thread::sleep((deadline - now).min(POLL_INTERVAL));
            }
        })
    }

    /// Run `action` once this token fires, then again on every poll until
    /// the returned guard is dropped.
    ///
    /// Reaches work that never returns to a `check()`, such as a query
    /// executing inside the store. Repeating covers an action that lands
    /// before the work it targets has started.
    pub fn on_cancel<F>(&self, action: F) -> Watchdog
    where
        F: Fn() + Send + 'static,
    {
        let token = self.clone();

        Watchdog::spawn("keydiff-cancel-watch", move |disarmed| {
            while !disarmed.is_cancelled() {
                if token.is_cancelled() {
                    action();
                }
                thread::sleep(POLL_INTERVAL);
            }
        })
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Background poller that stops and is joined when dropped.
///
/// Returned by [`CancellationToken::cancel_after`] and
/// [`CancellationToken::on_cancel`].
#[derive(Debug)]
pub struct Watchdog {
    disarmed: CancellationToken,
    handle: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let disarmed = CancellationToken::new();
        let stop = disarmed.clone();
        let handle = match thread::Builder::new().name(name.to_string()).spawn(move || body(stop)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Failed to spawn {} thread: {}", name, e);
                None
            }
        };
        Self { disarmed, handle }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarmed.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
