//! Pre-render error detection.
//!
//! The lifecycle controller hands every uploaded payload to an
//! [`ErrorDetector`] exactly once. The payload is moved into the request and
//! dropped when the call returns.

pub mod heuristic;
pub mod prompt;
pub mod timeout;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{DetectorConfig, DetectorKind};
use crate::error::DetectionError;
use crate::secrets;

pub use heuristic::HeuristicDetector;
pub use prompt::PromptDetector;
pub use timeout::TimeoutDetector;

/// What the detector gets to look at.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub content: Bytes,
    pub file_name: String,
    /// Extension including the dot.
    pub file_type: String,
    pub mime_type: String,
}

#[async_trait]
pub trait ErrorDetector: Send + Sync {
    /// Returns human-readable warnings; an empty list means nothing was found.
    async fn detect(&self, request: DetectionRequest) -> Result<Vec<String>, DetectionError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Builds the detector selected in the configuration.
pub fn build_detector(config: &DetectorConfig) -> Result<Arc<dyn ErrorDetector>, DetectionError> {
    let detector: Arc<dyn ErrorDetector> = match config.kind {
        DetectorKind::Heuristic => Arc::new(HeuristicDetector::new()),
        DetectorKind::Prompt => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                DetectionError::Unavailable("no endpoint configured".to_string())
            })?;
            let api_key = secrets::resolve_secret_optional(
                config.api_key.as_deref(),
                config.api_key_file.as_deref(),
                config.api_key_env.as_deref(),
            )?;
            Arc::new(PromptDetector::new(endpoint, config.model.clone(), api_key))
        }
    };

    Ok(match config.timeout_secs {
        Some(secs) => Arc::new(TimeoutDetector::new(detector, Duration::from_secs(secs))),
        None => detector,
    })
}
