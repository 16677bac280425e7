//! Offline detector that inspects the uploaded bytes directly.
//!
//! This is the default when no prompt endpoint is configured. It only looks
//! for problems that are visible in the raw file: an empty upload, a `.blend`
//! without a Blender header, and image files referenced by path instead of
//! being packed into the scene.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::bytes::Regex;

use super::{DetectionRequest, ErrorDetector};
use crate::error::DetectionError;
use crate::sanitize;

/// Upper bound on texture warnings reported for one file.
const MAX_TEXTURE_WARNINGS: usize = 20;

/// Headers a `.blend` may start with: plain, gzip and zstd compressed.
const BLEND_HEADERS: &[&[u8]] = &[b"BLENDER", &[0x1f, 0x8b], &[0x28, 0xb5, 0x2f, 0xfd]];

static TEXTURE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i-u)[A-Za-z0-9_\-./\\]+\.(?:png|jpe?g|tga|tiff?|exr|hdr)\b")
        .expect("texture pattern is valid")
});

pub struct HeuristicDetector;

impl HeuristicDetector {
    pub fn new() -> Self {
        Self
    }

    /// Runs every check against the payload, in a fixed order.
    pub fn inspect(&self, request: &DetectionRequest) -> Vec<String> {
        let content = request.content.as_ref();
        if content.is_empty() {
            return vec!["file is empty".to_string()];
        }

        let mut warnings = Vec::new();

        if request.file_type.eq_ignore_ascii_case(".blend")
            && !BLEND_HEADERS.iter().any(|h| content.starts_with(h))
        {
            warnings.push("file does not start with a Blender header; it may be corrupt".to_string());
        }

        let mut seen = HashSet::new();
        for found in TEXTURE_REF.find_iter(content) {
            let path = String::from_utf8_lossy(found.as_bytes());
            let name = sanitize::redact_file_name(&path);
            if seen.insert(name.to_lowercase()) {
                warnings.push(format!("missing texture: {}", name));
            }
            if seen.len() == MAX_TEXTURE_WARNINGS {
                break;
            }
        }

        warnings
    }
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ErrorDetector for HeuristicDetector {
    async fn detect(&self, request: DetectionRequest) -> Result<Vec<String>, DetectionError> {
        Ok(self.inspect(&request))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}
