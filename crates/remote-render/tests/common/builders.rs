//! Builders for test configurations and scripted detectors.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use remote_render::config::{Config, DetectorKind, FaultWindow};
use remote_render::{DetectionError, DetectionRequest, ErrorDetector};

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Defaults plus a fixed seed so renders are reproducible.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.render.seed = Some(7);
        config.events.capacity = 1024;
        Self { config }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.render.seed = Some(seed);
        self
    }

    pub fn fault_probability(mut self, probability: f64) -> Self {
        self.config.render.fault_probability = probability;
        self
    }

    pub fn fault_window(mut self, low: u8, high: u8) -> Self {
        self.config.render.fault_window = FaultWindow { low, high };
        self
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.render.tick_interval_ms = ms;
        self
    }

    pub fn allowed_extensions(mut self, extensions: &[&str]) -> Self {
        self.config.upload.allowed_extensions =
            extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.upload.max_file_size_mb = mb;
        self
    }

    pub fn prompt_detector(mut self, endpoint: &str) -> Self {
        self.config.detector.kind = DetectorKind::Prompt;
        self.config.detector.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    /// The config as JSON, as it would be written to disk.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.config).expect("config serializes")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What a scripted detector answers for a file.
#[derive(Debug, Clone)]
pub enum Outcome {
    Warnings(Vec<String>),
    Fail,
    Hang,
}

impl Outcome {
    pub fn clean() -> Self {
        Outcome::Warnings(Vec::new())
    }

    pub fn warnings(warnings: &[&str]) -> Self {
        Outcome::Warnings(warnings.iter().map(|w| w.to_string()).collect())
    }
}

/// Detector answering from a per-file script and counting its calls.
pub struct ScriptedDetector {
    default: Outcome,
    by_file: HashMap<String, Outcome>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(default: Outcome) -> Self {
        Self {
            default,
            by_file: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Overrides the answer for one file name.
    pub fn on(mut self, file_name: &str, outcome: Outcome) -> Self {
        self.by_file.insert(file_name.to_string(), outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ErrorDetector for ScriptedDetector {
    async fn detect(&self, request: DetectionRequest) -> Result<Vec<String>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .by_file
            .get(&request.file_name)
            .unwrap_or(&self.default)
            .clone();

        match outcome {
            Outcome::Warnings(warnings) => Ok(warnings),
            Outcome::Fail => Err(DetectionError::Unavailable("scripted failure".to_string())),
            Outcome::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
