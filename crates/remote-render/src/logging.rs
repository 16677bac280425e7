//! Logging setup, powered by tracing-subscriber.
//!
//! The store logs through the `log` macros; `tracing_log::LogTracer` routes
//! those records into the same subscriber as the async paths' spans.

use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// HTTP client crates are only interesting when something breaks.
const QUIET_TARGETS: &[(&str, &str)] = &[("hyper", "warn"), ("hyper_util", "warn"), ("reqwest", "warn")];

/// Builds the filter from `RUST_LOG` when set, the configured level otherwise.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    if let Ok(from_env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !from_env.trim().is_empty() {
            return EnvFilter::try_new(&from_env).map_err(|e| ConfigError::Validation {
                message: format!("Invalid RUST_LOG filter '{}': {}", from_env, e),
            });
        }
    }

    let mut directives = vec![level.to_string()];
    for (target, lvl) in QUIET_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }
    let filter = directives.join(",");

    EnvFilter::try_new(&filter).map_err(|e| ConfigError::Validation {
        message: format!("Invalid log level '{}': {}", level, e),
    })
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .boxed(),
    }
}

/// Installs the global subscriber.
///
/// Returns `Ok(false)` when another subscriber was installed first; that
/// one stays in place.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] if the configured level is not a valid
/// filter directive.
///
/// # Examples
///
/// ```ignore
/// let config = load_config_or_default(None)?;
/// init_logging(&config.logging)?;
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = build_env_filter(&config.level)?;

    // ok() in case a logger is already set
    tracing_log::LogTracer::init().ok();

    let subscriber = Registry::default().with(fmt_layer::<Registry>(config.format).with_filter(filter));
    let installed = tracing::subscriber::set_global_default(subscriber).is_ok();
    if installed {
        tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    }
    Ok(installed)
}
