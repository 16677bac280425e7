//! Upload validation performed before a file reaches the lifecycle controller.

use bytes::Bytes;

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::sanitize;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// A file handed over by the presentation layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Extension including the dot, exactly as uploaded.
    pub fn file_type(&self) -> String {
        sanitize::file_extension(&self.file_name)
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// MIME type guessed from the name, `application/octet-stream` if unknown.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(sanitize::redact_file_name(&self.file_name))
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

/// Accepted extensions and size limit enforced by the caller of `submit`.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    allowed_extensions: Vec<String>,
    max_file_size_mb: u64,
}

impl UploadPolicy {
    pub fn new(allowed_extensions: &[String], max_file_size_mb: u64) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            max_file_size_mb,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.allowed_extensions, config.max_file_size_mb)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Checks the extension (case-insensitive) and the size.
    pub fn validate(&self, file: Option<&UploadedFile>) -> Result<(), UploadError> {
        let file = file.ok_or(UploadError::NoFile)?;
        if file.file_name.trim().is_empty() {
            return Err(UploadError::EmptyFileName);
        }

        let extension = file.file_type().to_lowercase();
        if !self.allowed_extensions.contains(&extension) {
            return Err(UploadError::UnsupportedExtension {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }

        if file.size() > self.max_file_size_bytes() {
            return Err(UploadError::TooLarge {
                size: file.size(),
                max_mb: self.max_file_size_mb,
            });
        }

        Ok(())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}
