use std::path::{Path, PathBuf};

use crate::config::schema::{Config, DetectorKind};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Default location: `<platform config dir>/remote-render/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("remote-render").join("config.json"))
}

/// Loads the config for a process start.
///
/// Lookup order:
///
/// 1. `path`, when given. A missing file is an error.
/// 2. [`default_config_path`], when that file exists.
/// 3. Built-in defaults.
///
/// # Errors
///
/// Any [`ConfigError`] from reading, parsing or validating the chosen file.
///
/// # Examples
///
/// ```ignore
/// let config = load_config_or_default(args.config.as_deref())?;
/// let dashboard = Dashboard::from_config(&config)?;
/// ```
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_or(path, default_config_path())
}

fn load_config_or(explicit: Option<&Path>, fallback: Option<PathBuf>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    match fallback {
        Some(path) if path.is_file() => {
            log::info!("Loading config from {}", path.display());
            load_config(&path)
        }
        _ => {
            log::info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let upload = &config.upload;
    if upload.allowed_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "upload.allowedExtensions must not be empty".to_string(),
        });
    }
    if let Some(ext) = upload
        .allowed_extensions
        .iter()
        .find(|ext| !ext.starts_with('.') || ext.len() < 2)
    {
        return Err(ConfigError::Validation {
            message: format!("Extension '{}' must start with a dot", ext),
        });
    }
    if upload.max_file_size_mb == 0 {
        return Err(ConfigError::Validation {
            message: "upload.maxFileSizeMb must be positive".to_string(),
        });
    }

    let render = &config.render;
    if render.tick_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "render.tickIntervalMs must be positive".to_string(),
        });
    }
    if render.min_increment == 0 || render.min_increment > render.max_increment {
        return Err(ConfigError::Validation {
            message: format!(
                "Invalid progress increment range [{}, {}]",
                render.min_increment, render.max_increment
            ),
        });
    }
    if render.max_increment > 100 {
        return Err(ConfigError::Validation {
            message: "render.maxIncrement must not exceed 100".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&render.fault_probability) {
        return Err(ConfigError::Validation {
            message: format!(
                "render.faultProbability must be within [0, 1], got {}",
                render.fault_probability
            ),
        });
    }
    let window = render.fault_window;
    if window.low >= window.high || window.high > 100 {
        return Err(ConfigError::Validation {
            message: format!("Invalid fault window ({}, {})", window.low, window.high),
        });
    }

    if config.detector.kind == DetectorKind::Prompt
        && config
            .detector
            .endpoint
            .as_deref()
            .is_none_or(|e| e.trim().is_empty())
    {
        return Err(ConfigError::Validation {
            message: "detector.endpoint is required for the prompt detector".to_string(),
        });
    }

    if config.events.capacity == 0 {
        return Err(ConfigError::Validation {
            message: "events.capacity must be positive".to_string(),
        });
    }

    Ok(())
}
