//! Text extraction backends.
//!
//! Each backend turns one image file into its full-page transcription. The
//! pipeline only sees [`extract_text`], which logs a failure and moves on.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ConfigError, OcrError};
use crate::types::ImageRef;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

pub trait TextExtractor {
    fn name(&self) -> &str;

    /// Full-page text of the image at `path`.
    fn run_ocr(&self, path: &Path) -> Result<String, OcrError>;
}

/// OCR one image. Failures are logged and reported as `None`.
pub fn extract_text(extractor: &dyn TextExtractor, image: &ImageRef) -> Option<String> {
    match extractor.run_ocr(image.path()) {
        Ok(text) if !text.trim().is_empty() => {
            debug!(image = %image.name, chars = text.len(), "OCR succeeded");
            Some(text.trim().to_string())
        }
        Ok(_) => {
            warn!(image = %image.name, backend = extractor.name(), "Failed to extract text from image: {}", OcrError::NoText);
            None
        }
        Err(e) => {
            warn!(image = %image.name, backend = extractor.name(), "Failed to extract text from image: {}", e);
            None
        }
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>, OcrError> {
    fs::read(path).map_err(OcrError::from_read)
}

pub(crate) fn build_client() -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

fn service_error(response: reqwest::blocking::Response, hint: &str) -> OcrError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    OcrError::Service {
        status,
        body: if body.is_empty() { hint.to_string() } else { body },
    }
}

/// How requests to Google Cloud are authorised.
#[derive(Debug, Clone)]
pub enum GoogleCredential {
    ApiKey(String),
    BearerToken(String),
}

#[derive(Debug, Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest {
    image: VisionImage,
    features: Vec<VisionFeature>,
}

#[derive(Debug, Serialize)]
struct VisionImage {
    content: String,
}

#[derive(Debug, Serialize)]
struct VisionFeature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
struct AnnotateImageResponse {
    #[serde(default, rename = "textAnnotations")]
    text_annotations: Vec<TextAnnotation>,
    error: Option<VisionStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct VisionStatus {
    #[serde(default)]
    message: String,
}

/// Google Cloud Vision `TEXT_DETECTION`.
pub struct VisionOcr {
    client: Client,
    credential: GoogleCredential,
    endpoint: String,
}

impl VisionOcr {
    pub fn new(credential: GoogleCredential) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client()?,
            credential,
            endpoint: VISION_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(bytes: &[u8]) -> AnnotateRequest {
        AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: VisionImage {
                    content: STANDARD.encode(bytes),
                },
                features: vec![VisionFeature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        }
    }
}

/// The first annotation is the whole-page text; the rest are single words.
fn top_annotation(response: AnnotateResponse) -> Result<String, OcrError> {
    let first = response.responses.into_iter().next().ok_or(OcrError::NoText)?;
    if let Some(err) = first.error.filter(|e| !e.message.is_empty()) {
        return Err(OcrError::Analysis(err.message));
    }
    first
        .text_annotations
        .into_iter()
        .next()
        .map(|a| a.description.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(OcrError::NoText)
}

impl TextExtractor for VisionOcr {
    fn name(&self) -> &str {
        "google-vision"
    }

    fn run_ocr(&self, path: &Path) -> Result<String, OcrError> {
        let bytes = read_image(path)?;
        let request = self.client.post(&self.endpoint).json(&Self::request_body(&bytes));
        let request = match &self.credential {
            GoogleCredential::ApiKey(key) => request.query(&[("key", key)]),
            GoogleCredential::BearerToken(token) => request.bearer_auth(token),
        };
        let response = request.send().map_err(OcrError::from_send)?;
        if !response.status().is_success() {
            return Err(service_error(response, "Invalid API key or credentials?"));
        }
        let parsed: AnnotateResponse = response
            .json()
            .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
        top_annotation(parsed)
    }
}

/// Azure Document Intelligence `prebuilt-read`.
pub struct AzureReadOcr {
    client: Client,
    key: String,
    endpoint: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl AzureReadOcr {
    pub fn new(key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client()?,
            key: key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 60,
        })
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/prebuilt-read:analyze?api-version=2024-11-30",
            self.endpoint
        )
    }
}

/// Collect the lines of every page from a finished `analyzeResult`.
fn read_result_lines(result: &serde_json::Value) -> Vec<&str> {
    result
        .get("pages")
        .and_then(|p| p.as_array())
        .into_iter()
        .flatten()
        .filter_map(|page| page.get("lines").and_then(|l| l.as_array()))
        .flatten()
        .map(|line| line.get("content").and_then(|c| c.as_str()).unwrap_or(""))
        .collect()
}

impl TextExtractor for AzureReadOcr {
    fn name(&self) -> &str {
        "azure-read"
    }

    fn run_ocr(&self, path: &Path) -> Result<String, OcrError> {
        let bytes = read_image(path)?;
        let response = self
            .client
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .map_err(OcrError::from_send)?;
        if !response.status().is_success() {
            return Err(service_error(response, "Invalid key or endpoint?"));
        }

        let result_url = response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| OcrError::InvalidResponse("No Operation-Location in response".to_string()))?
            .to_string();

        for _ in 0..self.max_polls {
            std::thread::sleep(self.poll_interval);
            let poll: serde_json::Value = self
                .client
                .get(&result_url)
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .send()
                .map_err(OcrError::from_send)?
                .json()
                .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
            match poll.get("status").and_then(|s| s.as_str()).unwrap_or("") {
                "succeeded" => {
                    let result = poll
                        .get("analyzeResult")
                        .ok_or_else(|| OcrError::InvalidResponse("No analyzeResult".to_string()))?;
                    return Ok(read_result_lines(result).join("\n"));
                }
                "failed" => {
                    let err = poll
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .unwrap_or("Unknown error");
                    return Err(OcrError::Analysis(err.to_string()));
                }
                _ => {}
            }
        }
        Err(OcrError::Timeout)
    }
}
