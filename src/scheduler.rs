//! The cycle state machine.
//!
//! One ordered pass over all configured sources per cycle, then a residual
//! sleep so consecutive cycle starts hold the configured interval. Sources
//! are processed strictly one at a time: deterministic memory and
//! connection usage on constrained hardware is traded against throughput,
//! and a slow source drifts the cadence rather than growing state.

use std::sync::Arc;

use tokio::time::Instant;

use crate::api::{ApiError, DetectionApi};
use crate::capture::{FrameAcquirer, RetryingAcquirer};
use crate::config::{RunConfig, SourceSpec};
use crate::shutdown::ShutdownToken;

/// Scheduler lifecycle. Transitions are monotonic: Idle → Running →
/// Stopping → Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Drives the capture/submit/report cycle until shutdown.
pub struct CycleScheduler<A, C> {
    config: Arc<RunConfig>,
    acquirer: RetryingAcquirer<A>,
    api: C,
    shutdown: ShutdownToken,
    state: SchedulerState,
}

impl<A: FrameAcquirer, C: DetectionApi> CycleScheduler<A, C> {
    pub fn new(config: Arc<RunConfig>, acquirer: A, api: C, shutdown: ShutdownToken) -> Self {
        let max_attempts = config.max_attempts;
        Self {
            config,
            acquirer: RetryingAcquirer::new(acquirer, max_attempts),
            api,
            shutdown,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run cycles until shutdown is requested.
    ///
    /// Shutdown is cooperative: the request is honored before each source
    /// and before the inter-cycle sleep, never mid-acquisition, so an
    /// in-flight capture runs to its own deadline at worst.
    pub async fn run(&mut self) {
        self.state = SchedulerState::Running;
        log::info!(
            "starting with {} source(s), interval {:.1}s, API {}",
            self.config.sources.len(),
            self.config.interval.as_secs_f64(),
            self.config.api_url
        );

        let config = Arc::clone(&self.config);
        let mut shutdown = self.shutdown.clone();

        'cycles: loop {
            let cycle_start = Instant::now();

            for source in &config.sources {
                if shutdown.is_triggered() {
                    log::info!("shutdown requested, abandoning cycle");
                    self.state = SchedulerState::Stopping;
                    break 'cycles;
                }
                self.process_source(source, &mut shutdown).await;
            }

            if shutdown.is_triggered() {
                self.state = SchedulerState::Stopping;
                break;
            }

            // Hold the cadence: sleep whatever the cycle left of the
            // interval. A cycle that ran long starts the next one
            // immediately; there is no catch-up for missed cycles.
            let elapsed = cycle_start.elapsed();
            let residual = config.interval.saturating_sub(elapsed);
            if !residual.is_zero() {
                log::debug!(
                    "cycle took {:.2}s, sleeping {:.2}s",
                    elapsed.as_secs_f64(),
                    residual.as_secs_f64()
                );
                if !shutdown.sleep(residual).await {
                    self.state = SchedulerState::Stopping;
                    break;
                }
            }
        }

        self.state = SchedulerState::Stopped;
        log::info!("scheduler stopped");
    }

    /// Capture one frame from `source` and forward it, or report the
    /// failure. No outcome here affects the rest of the cycle.
    async fn process_source(&self, source: &SourceSpec, shutdown: &mut ShutdownToken) {
        let label = source.display_name();
        log::debug!("processing source {}", label);

        let frame = match self
            .acquirer
            .acquire_with_retry(&source.address, shutdown)
            .await
        {
            Ok(frame) => frame,
            Err(e) => {
                let message = format!("Failed to capture frame from {}: {}", source.address, e);
                log::warn!("{}", message);
                if let Err(report_err) = self.api.report_failure(&source.id, &message).await {
                    // Best-effort channel; a failed report never aborts
                    // or retries the cycle.
                    log::warn!("could not report failure for {}: {}", source.id, report_err);
                }
                return;
            }
        };

        log::info!("captured frame from {}: {} bytes", label, frame.len());

        match self.api.submit(&source.id, frame).await {
            Ok(result) => {
                log::info!(
                    "detection complete for {}: {} object(s) in {:.0}ms",
                    label,
                    result.object_count(),
                    result.processing_time_ms
                );
            }
            Err(ApiError::AuthRejected) => {
                log::error!("authentication failed for {}. Check your API key.", label);
            }
            Err(e @ ApiError::UnknownSource { .. }) => {
                log::error!("{}", e);
            }
            Err(ApiError::TimedOut) => {
                log::warn!("detection request timed out for {}", label);
            }
            Err(e) => {
                log::warn!("detection failed for {}: {}", label, e);
            }
        }
    }
}
