use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum RemoteRenderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload rejected: {0}")]
    Upload(#[from] UploadError),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Rejections raised at the upload boundary, before a job exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("No file selected")]
    NoFile,

    #[error("File name is empty")]
    EmptyFileName,

    #[error("Invalid file type '{extension}'. Please upload a {allowed} file.")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("File is too large ({size} bytes). Maximum size is {max_mb}MB.")]
    TooLarge { size: u64, max_mb: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Cannot {operation} job {job_id} while it is {status}")]
    InvalidTransition {
        job_id: String,
        status: JobStatus,
        operation: &'static str,
    },

    #[error("No Tokio runtime available to run job tasks")]
    RuntimeUnavailable,
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Detector returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Failed to parse detector response: {0}")]
    ResponseParse(String),

    #[error("Detector credentials unavailable: {0}")]
    Credentials(#[from] crate::secrets::SecretError),

    #[error("Detector did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Detection unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unknown render handle: {0}")]
    UnknownHandle(String),

    #[error("Render backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, RemoteRenderError>;
