pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod excel;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod parser;
pub mod pipeline;
pub mod types;

use anyhow::Context;
use tracing::info;

use cli::{Cli, OcrBackendKind};
use completion::{CompletionService, GeminiCompletion};
use error::ConfigError;
use excel::XlsxSink;
use ocr::{AzureReadOcr, GoogleCredential, TextExtractor, VisionOcr};
use types::RunSummary;

fn build_extractor(cli: &Cli) -> Result<Box<dyn TextExtractor>, ConfigError> {
    match cli.ocr_backend {
        OcrBackendKind::Google => {
            let credential = match (&cli.vision_api_key, &cli.access_token) {
                (Some(key), _) => GoogleCredential::ApiKey(key.clone()),
                (None, Some(token)) => GoogleCredential::BearerToken(token.clone()),
                (None, None) => {
                    return Err(ConfigError::MissingCredential(
                        "GOOGLE_VISION_API_KEY or GOOGLE_ACCESS_TOKEN",
                    ))
                }
            };
            let mut vision = VisionOcr::new(credential)?;
            if let Some(endpoint) = &cli.vision_endpoint {
                vision = vision.with_endpoint(endpoint);
            }
            Ok(Box::new(vision))
        }
        OcrBackendKind::Azure => {
            let key = cli
                .azure_key
                .clone()
                .ok_or(ConfigError::MissingCredential("AZURE_OCR_KEY"))?;
            let endpoint = cli
                .azure_endpoint
                .clone()
                .ok_or(ConfigError::MissingCredential("AZURE_OCR_ENDPOINT"))?;
            Ok(Box::new(AzureReadOcr::new(key, endpoint)?))
        }
    }
}

fn build_completion(cli: &Cli) -> Result<GeminiCompletion, ConfigError> {
    let key = cli
        .gemini_api_key
        .clone()
        .ok_or(ConfigError::MissingCredential("GEMINI_API_KEY"))?;
    let mut gemini = GeminiCompletion::new(key)?;
    if let Some(model) = &cli.model {
        gemini = gemini.with_model(model);
    }
    if let Some(endpoint) = &cli.gemini_endpoint {
        gemini = gemini.with_endpoint(endpoint);
    }
    Ok(gemini)
}

/// Set everything up from the command line and process the image folder.
/// Only setup problems are errors; the run itself always completes.
pub fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let config = cli.pipeline_config()?;
    let images = input::list_images(&cli.image_dir)?;
    let extractor = build_extractor(cli).context("Could not initialise OCR backend")?;
    let gemini = build_completion(cli).context("Could not initialise completion service")?;

    let output = config::output_path(&cli.image_dir, cli.output.as_deref());
    info!(
        images = images.len(),
        batch_size = config.batch_size,
        ocr = extractor.name(),
        model = gemini.name(),
        output = %output.display(),
        "Starting run"
    );

    let mut sink = XlsxSink::new(&output);
    let summary = pipeline::run_pipeline(&images, &config, extractor.as_ref(), &gemini, &mut sink);
    info!(path = %sink.path().display(), "Final Excel file saved");
    Ok(summary)
}
