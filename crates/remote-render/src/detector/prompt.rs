//! Detector backed by an LLM prompt endpoint.
//!
//! The file is sent as a base64 `data:` URI together with a fixed review
//! prompt; the endpoint answers with `{"errors": [...]}`.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DetectionRequest, ErrorDetector};
use crate::error::DetectionError;
use crate::sanitize;

/// Maximum length of an error body kept in the returned error.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const PROMPT_TEMPLATE: &str = "You are an expert in 3D rendering and can identify potential errors in 3D model files before rendering.

Analyze the following file and identify any potential rendering errors, such as missing textures, broken links, or other issues that could cause problems during rendering.

File Name: {fileName}
File Type: {fileType}

Provide a list of potential errors. If there are no potential errors, return an empty array.";

/// Encodes a payload as `data:<mime>;base64,<data>`.
pub fn to_data_uri(mime_type: &str, content: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(content)
    )
}

/// Fills the review prompt for one file.
pub fn render_prompt(file_name: &str, file_type: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{fileName}", file_name)
        .replace("{fileType}", file_type)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptInput<'a> {
    file_data_uri: String,
    file_name: &'a str,
    file_type: &'a str,
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: String,
    input: PromptInput<'a>,
}

#[derive(Debug, Deserialize)]
struct DetectOutput {
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectResponse {
    Direct(DetectOutput),
    Wrapped { output: DetectOutput },
}

/// Parses the endpoint answer. Accepts `{"errors": [...]}` and
/// `{"output": {"errors": [...]}}`; blank entries are dropped.
pub fn parse_response(body: &str) -> Result<Vec<String>, DetectionError> {
    let response: DetectResponse = serde_json::from_str(body)
        .map_err(|e| DetectionError::ResponseParse(e.to_string()))?;

    let output = match response {
        DetectResponse::Direct(output) => output,
        DetectResponse::Wrapped { output } => output,
    };

    Ok(output
        .errors
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect())
}

pub struct PromptDetector {
    client: Client,
    endpoint: String,
    model: Option<String>,
    api_key: Option<SecretString>,
}

impl PromptDetector {
    pub fn new(endpoint: String, model: Option<String>, api_key: Option<SecretString>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl ErrorDetector for PromptDetector {
    async fn detect(&self, request: DetectionRequest) -> Result<Vec<String>, DetectionError> {
        let body = PromptRequest {
            model: self.model.as_deref(),
            prompt: render_prompt(&request.file_name, &request.file_type),
            input: PromptInput {
                file_data_uri: to_data_uri(&request.mime_type, &request.content),
                file_name: &request.file_name,
                file_type: &request.file_type,
            },
        };

        debug!(
            endpoint = %self.endpoint,
            file_name = %sanitize::redact_file_name(&request.file_name),
            bytes = request.content.len(),
            "Sending detection prompt"
        );

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DetectionError::UnexpectedStatus {
                status: status.as_u16(),
                body: sanitize::truncate_for_log(&text, MAX_ERROR_BODY_LENGTH),
            });
        }

        parse_response(&text)
    }

    fn name(&self) -> &'static str {
        "prompt"
    }
}
