//! Frame acquisition from video sources.
//!
//! One still frame per call, obtained by running ffmpeg against the source
//! address under a hard deadline. The acquirer trait keeps the scheduler
//! independent of the external tool, so tests can script outcomes and
//! delays without a real stream.

pub mod retry;

pub use retry::RetryingAcquirer;

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Hard deadline for one capture attempt.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// How much ffmpeg stderr to keep in failure messages.
const STDERR_SNIPPET_LEN: usize = 200;

/// Errors that can occur while acquiring a frame.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("ffmpeg not found. Please install ffmpeg.")]
    ToolMissing,

    #[error("capture process failed: {stderr}")]
    ProcessFailed {
        /// Leading portion of the process stderr output.
        stderr: String,
    },

    #[error("capture produced an empty frame")]
    EmptyFrame,

    #[error("capture timed out")]
    TimedOut,

    #[error("capture IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Obtains one still frame from a source address.
#[allow(async_fn_in_trait)]
pub trait FrameAcquirer {
    /// Attempt a single capture, bounded by the implementation's deadline.
    async fn acquire(&self, address: &str) -> Result<Vec<u8>, CaptureError>;
}

/// Captures a single JPEG frame by running ffmpeg against a stream address.
pub struct FfmpegAcquirer {
    timeout: Duration,
}

impl FfmpegAcquirer {
    pub fn new() -> Self {
        Self {
            timeout: CAPTURE_TIMEOUT,
        }
    }

    /// Create an acquirer with a custom capture deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for FfmpegAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAcquirer for FfmpegAcquirer {
    async fn acquire(&self, address: &str) -> Result<Vec<u8>, CaptureError> {
        // -rtsp_transport tcp: lossy UDP leaves ffmpeg waiting on a partial
        // frame on constrained links.
        // -frames:v 1 / image2pipe / mjpeg: exactly one JPEG on stdout.
        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-rtsp_transport",
            "tcp",
            "-i",
            address,
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-q:v",
            "2",
            "-y",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // The child must not outlive the deadline: dropping the wait future
        // below kills and reaps it.
        .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CaptureError::ToolMissing
            } else {
                CaptureError::Io(e)
            }
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!("frame capture timed out for {}", address);
                return Err(CaptureError::TimedOut);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.chars().take(STDERR_SNIPPET_LEN).collect();
            log::warn!("ffmpeg failed: {}", snippet);
            return Err(CaptureError::ProcessFailed { stderr: snippet });
        }

        if output.stdout.is_empty() {
            log::warn!("ffmpeg returned empty frame");
            return Err(CaptureError::EmptyFrame);
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_display() {
        assert_eq!(
            CaptureError::ToolMissing.to_string(),
            "ffmpeg not found. Please install ffmpeg."
        );
        assert_eq!(
            CaptureError::EmptyFrame.to_string(),
            "capture produced an empty frame"
        );
        assert_eq!(CaptureError::TimedOut.to_string(), "capture timed out");
    }

    #[test]
    fn process_failed_carries_stderr_snippet() {
        let err = CaptureError::ProcessFailed {
            stderr: "Connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("capture process failed"));
        assert!(msg.contains("Connection refused"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CaptureError::from(io);
        assert!(matches!(err, CaptureError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn default_timeout_is_ten_seconds() {
        assert_eq!(CAPTURE_TIMEOUT, Duration::from_secs(10));
        let acquirer = FfmpegAcquirer::new();
        assert_eq!(acquirer.timeout, CAPTURE_TIMEOUT);
    }

    #[test]
    fn with_timeout_overrides_deadline() {
        let acquirer = FfmpegAcquirer::with_timeout(Duration::from_millis(250));
        assert_eq!(acquirer.timeout, Duration::from_millis(250));
    }
}
