//! Bounded exponential backoff around a frame acquirer.

use std::time::Duration;

use crate::shutdown::ShutdownToken;

use super::{CaptureError, FrameAcquirer};

/// Delay inserted after failed attempt `attempt` (0-based): 1, 2, 4, 8,
/// 16, ... seconds. No jitter; the series is bounded by the configured
/// attempt count rather than a delay cap.
pub fn backoff_delay(attempt: u32) -> Duration {
    // Shifts of 64+ would overflow; attempt counts never get near that.
    Duration::from_secs(1u64 << attempt.min(63))
}

/// Drives a [`FrameAcquirer`] through up to `max_attempts` attempts with
/// exponential backoff between failures.
pub struct RetryingAcquirer<A> {
    inner: A,
    max_attempts: u32,
}

impl<A: FrameAcquirer> RetryingAcquirer<A> {
    /// Wrap `inner` with a retry budget.
    ///
    /// An attempt count below 1 would return without ever invoking the
    /// acquirer, so it is clamped; config validation rejects it earlier.
    pub fn new(inner: A, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Attempt a capture up to the configured number of times.
    ///
    /// The first success is returned immediately. Between failed attempts
    /// the backoff sleep is interruptible: a pending shutdown request
    /// abandons the remaining attempts and returns the last failure. There
    /// is no sleep after the final attempt.
    pub async fn acquire_with_retry(
        &self,
        address: &str,
        shutdown: &mut ShutdownToken,
    ) -> Result<Vec<u8>, CaptureError> {
        let mut attempt = 0;
        loop {
            match self.inner.acquire(address).await {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        log::error!(
                            "failed to capture frame from {} after {} attempt(s)",
                            address,
                            attempt
                        );
                        return Err(e);
                    }

                    let delay = backoff_delay(attempt - 1);
                    log::info!(
                        "retry {}/{} for {} in {}s...",
                        attempt + 1,
                        self.max_attempts,
                        address,
                        delay.as_secs()
                    );
                    if !shutdown.sleep(delay).await {
                        log::debug!("shutdown requested during backoff for {}", address);
                        return Err(e);
                    }
                }
            }
        }
    }
}
