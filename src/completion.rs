//! Prompting the text completion service with a batch of card transcriptions.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CompletionError, ConfigError};
use crate::types::Field;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-001";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Marker the model is asked to put at the top of each block.
pub const RECORD_LABEL: &str = "Record";

pub trait CompletionService {
    fn name(&self) -> &str;

    fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Send one prompt. Failures are logged and reported as `None`.
pub fn request_completion(service: &dyn CompletionService, prompt: &str) -> Option<String> {
    match service.complete(prompt) {
        Ok(text) => {
            debug!(service = service.name(), chars = text.len(), "completion received");
            Some(text)
        }
        Err(e) => {
            warn!(service = service.name(), "Error generating content: {}", e);
            None
        }
    }
}

/// Join transcriptions with a blank line, numbering them when `tag_records` is set.
pub fn combine_transcriptions(texts: &[&str], tag_records: bool) -> String {
    if !tag_records {
        return texts.join("\n\n");
    }
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[{} {}]\n{}", RECORD_LABEL, i + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Batch text followed by one empty bolded line per field for the model to fill in.
pub fn build_prompt(batch_text: &str, fields: &[Field], tag_records: bool) -> String {
    let mut prompt = String::with_capacity(batch_text.len() + 512);
    prompt.push_str(batch_text);
    prompt.push('\n');
    prompt.push_str("Please provide the following details for all owner records:\n");
    if tag_records {
        prompt.push_str(&format!(
            "Write one block per record, in order, starting each block with **{}:** followed by the record number shown above.\n",
            RECORD_LABEL
        ));
        prompt.push_str(&format!("**{}:** \n", RECORD_LABEL));
    }
    for field in fields {
        prompt.push_str(&format!("**{}:** \n", field.label()));
    }
    prompt
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Google Gemini `generateContent`.
pub struct GeminiCompletion {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiCompletion {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            client: crate::ocr::build_client()?,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model)
    }

    fn request_body(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 8192,
            },
        }
    }
}

fn response_text(response: GenerateResponse) -> Result<String, CompletionError> {
    if let Some(error) = response.error {
        return Err(CompletionError::Api(error.message));
    }
    let text: String = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .ok_or(CompletionError::Empty)?;
    Ok(text.trim().to_string())
}

impl CompletionService for GeminiCompletion {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(self.url())
            .query(&[("key", &self.api_key)])
            .json(&Self::request_body(prompt))
            .send()
            .map_err(CompletionError::from_send)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CompletionError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
        response_text(parsed)
    }
}
