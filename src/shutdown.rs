//! Cooperative shutdown plumbing.
//!
//! A level-triggered flag behind a watch channel: the controller half is
//! driven by the signal handler, the token half is checked at every loop
//! and sleep boundary. The flag flips true exactly once and is never reset.

use std::time::Duration;

use tokio::sync::watch;

/// Sending half of the shutdown flag. Held by the signal handler.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Receiving half, cloned into every component with a suspension point.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected controller/token pair.
pub fn channel() -> (ShutdownController, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownToken { rx })
}

impl ShutdownController {
    /// Request shutdown. Idempotent; the flag never resets.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownToken {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// The request is checked, not consumed: every holder observes it, in
    /// any order, any number of times.
    pub async fn triggered(&mut self) {
        // A dropped controller only happens on process teardown; treat it
        // the same as a request.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns true if the full duration elapsed, false if interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}

/// Install a handler mapping SIGINT and SIGTERM to one shutdown request.
///
/// This should be called once at program startup.
pub fn wire_signals(controller: ShutdownController) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping...");
        controller.trigger();
    })
}
