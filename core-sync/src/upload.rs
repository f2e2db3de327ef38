//! # Collector Upload
//!
//! Delivers a batch of samples to the collector in a single request.
//!
//! ## Wire format
//!
//! `POST <collector_url>` with a JSON array, one object per sample, in the
//! order the batch was read from the queue:
//!
//! ```json
//! [{"subjectId":"EMP001","latitude":48.85,"longitude":2.35,
//!   "accuracy":5.0,"capturedAtMillis":1700000000000,"speed":1.2}]
//! ```
//!
//! `speed` is omitted when unknown. Any 2xx response acknowledges the whole
//! batch; everything else, including transport errors, is a failure. The
//! client never retries, the engine owns backoff.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_store::Sample;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest body excerpt carried into a failure reason
const MAX_REASON_BODY: usize = 200;

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The collector acknowledged every sample in the batch
    Success,
    /// Nothing can be assumed delivered
    Failure { reason: String },
}

impl UploadOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        UploadOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success)
    }
}

/// Delivery seam used by the sync engine
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Deliver `batch` in one request
    ///
    /// Must not reorder, split or retry the batch.
    async fn upload(&self, batch: &[Sample]) -> UploadOutcome;
}

/// One element of the request body
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord<'a> {
    pub subject_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f32,
    pub captured_at_millis: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

impl<'a> From<&'a Sample> for UploadRecord<'a> {
    fn from(sample: &'a Sample) -> Self {
        Self {
            subject_id: &sample.subject_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            captured_at_millis: sample.captured_at_millis,
            speed: sample.speed,
        }
    }
}

/// [`UploadClient`] that posts to the collector over a host [`HttpClient`]
pub struct CollectorUploadClient {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
}

impl CollectorUploadClient {
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            token: None,
            timeout: core_runtime::config::DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    /// Send `Authorization: Bearer <token>` with every upload
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, batch: &[Sample]) -> bridge_traits::error::Result<HttpRequest> {
        let records: Vec<UploadRecord<'_>> = batch.iter().map(UploadRecord::from).collect();

        let mut request = HttpRequest::post(&self.endpoint)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(&records)?;
        if let Some(token) = &self.token {
            request = request.bearer_token(token);
        }
        Ok(request)
    }
}

#[async_trait]
impl UploadClient for CollectorUploadClient {
    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    async fn upload(&self, batch: &[Sample]) -> UploadOutcome {
        let request = match self.build_request(batch) {
            Ok(request) => request,
            Err(e) => return UploadOutcome::failure(format!("Failed to encode batch: {}", e)),
        };

        match self.http_client.execute(request).await {
            Ok(response) if response.is_success() => {
                debug!(status = response.status, "Collector acknowledged batch");
                UploadOutcome::Success
            }
            Ok(response) => {
                let body = response.text_lossy();
                warn!(status = response.status, "Collector rejected batch");
                UploadOutcome::failure(format!(
                    "HTTP {}: {}",
                    response.status,
                    excerpt(&body).trim()
                ))
            }
            Err(e) => {
                warn!(error = %e, "Upload request failed");
                UploadOutcome::failure(e.to_string())
            }
        }
    }
}

fn excerpt(body: &str) -> &str {
    if body.len() <= MAX_REASON_BODY {
        return body;
    }
    let cut = (0..=MAX_REASON_BODY)
        .rev()
        .find(|i| body.is_char_boundary(*i))
        .unwrap_or(0);
    &body[..cut]
}
