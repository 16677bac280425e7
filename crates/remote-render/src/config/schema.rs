use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            upload: UploadConfig::default(),
            render: RenderConfig::default(),
            detector: DetectorConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".blend".to_string()]
}

fn default_max_file_size_mb() -> u64 {
    100
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

/// Settings of the simulated render backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_min_increment")]
    pub min_increment: u8,
    #[serde(default = "default_max_increment")]
    pub max_increment: u8,
    #[serde(default = "default_fault_probability")]
    pub fault_probability: f64,
    #[serde(default)]
    pub fault_window: FaultWindow,
    /// `{jobId}` is replaced with the job identifier.
    #[serde(default = "default_thumbnail_url_template")]
    pub thumbnail_url_template: String,
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// Fixed RNG seed; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_min_increment() -> u8 {
    5
}

fn default_max_increment() -> u8 {
    14
}

fn default_fault_probability() -> f64 {
    0.05
}

fn default_thumbnail_url_template() -> String {
    "https://picsum.photos/seed/{jobId}/400/300".to_string()
}

fn default_download_url() -> String {
    "#".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            min_increment: default_min_increment(),
            max_increment: default_max_increment(),
            fault_probability: default_fault_probability(),
            fault_window: FaultWindow::default(),
            thumbnail_url_template: default_thumbnail_url_template(),
            download_url: default_download_url(),
            seed: None,
        }
    }
}

/// Exclusive progress bounds inside which a render fault may be sampled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaultWindow {
    pub low: u8,
    pub high: u8,
}

impl FaultWindow {
    pub fn contains(&self, progress: u8) -> bool {
        progress > self.low && progress < self.high
    }
}

impl Default for FaultWindow {
    fn default() -> Self {
        Self { low: 30, high: 80 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Heuristic,
    Prompt,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    #[serde(default)]
    pub kind: DetectorKind,
    /// HTTP endpoint of the prompt service.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    100
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
