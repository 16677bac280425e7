use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{DetectionRequest, ErrorDetector};
use crate::error::DetectionError;

/// Bounds how long another detector may take.
pub struct TimeoutDetector {
    inner: Arc<dyn ErrorDetector>,
    timeout: Duration,
}

impl TimeoutDetector {
    pub fn new(inner: Arc<dyn ErrorDetector>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ErrorDetector for TimeoutDetector {
    async fn detect(&self, request: DetectionRequest) -> Result<Vec<String>, DetectionError> {
        tokio::time::timeout(self.timeout, self.inner.detect(request))
            .await
            .map_err(|_| DetectionError::Timeout(self.timeout))?
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}
