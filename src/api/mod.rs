//! Client for the remote vision detection service.
//!
//! Two operations: submitting a captured frame for detection, and
//! best-effort reporting of capture failures to the health endpoint.
//! Neither outcome is ever fatal to the agent.

use std::time::Duration;

use serde::Deserialize;

/// Header carrying the API credential.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Request timeout for detection submissions.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout for health reports.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection timeout shared by all requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How much of an error response body to keep in messages.
const BODY_SNIPPET_LEN: usize = 200;

/// Detection response for one submitted frame.
#[derive(Debug, Deserialize)]
pub struct DetectionResult {
    /// Per-object records; opaque to the agent, logged by count only.
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
    /// Server-side processing time.
    #[serde(default)]
    pub processing_time_ms: f64,
}

impl DetectionResult {
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

/// Errors that can occur talking to the detection service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication failed. Check your API key.")]
    AuthRejected,

    #[error("source {source_id} not registered with the detection service")]
    UnknownSource {
        /// Identifier the server did not recognize.
        source_id: String,
    },

    #[error("API error {status}: {body}")]
    Status {
        /// HTTP status code outside the handled classes.
        status: u16,
        /// Leading portion of the response body.
        body: String,
    },

    #[error("API request timed out")]
    TimedOut,

    #[error("failed to connect to API: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Classify a transport-layer failure into the error taxonomy.
fn classify_transport(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::TimedOut
    } else if error.is_connect() {
        ApiError::Connection(error)
    } else {
        ApiError::Http(error)
    }
}

/// Submission and health-report operations against the detection service.
///
/// The scheduler depends on this trait so its tests can record calls
/// without a live server.
#[allow(async_fn_in_trait)]
pub trait DetectionApi {
    /// Post one frame for detection.
    async fn submit(&self, source_id: &str, frame: Vec<u8>) -> Result<DetectionResult, ApiError>;

    /// Notify the health endpoint of a capture failure. Best effort.
    async fn report_failure(&self, source_id: &str, message: &str) -> Result<(), ApiError>;
}

/// HTTP client for the detection service.
pub struct ApiClient {
    base_url: String,
    api_key: String,
    submit_timeout: Duration,
    report_timeout: Duration,
    http_client: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the given base URL and credential.
    ///
    /// A trailing slash on the base URL is trimmed so endpoint paths join
    /// cleanly.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            submit_timeout: SUBMIT_TIMEOUT,
            report_timeout: REPORT_TIMEOUT,
            http_client,
        })
    }

    /// Override the per-request timeouts.
    ///
    /// Useful for testing against a mock server with scripted delays.
    pub fn with_timeouts(mut self, submit: Duration, report: Duration) -> Self {
        self.submit_timeout = submit;
        self.report_timeout = report;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl DetectionApi for ApiClient {
    async fn submit(&self, source_id: &str, frame: Vec<u8>) -> Result<DetectionResult, ApiError> {
        let url = format!("{}/api/vision/detect", self.base_url);

        let part = reqwest::multipart::Part::bytes(frame)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new()
            .part("frame", part)
            .text("camera_id", source_id.to_string());

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .timeout(self.submit_timeout)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthRejected);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::UnknownSource {
                source_id: source_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(BODY_SNIPPET_LEN).collect(),
            });
        }

        let result: DetectionResult = response.json().await?;
        Ok(result)
    }

    async fn report_failure(&self, source_id: &str, message: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/vision/health/report", self.base_url);

        let body = serde_json::json!({
            "camera_id": source_id,
            "error": message,
        });

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .timeout(self.report_timeout)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(BODY_SNIPPET_LEN).collect(),
            });
        }

        Ok(())
    }
}
