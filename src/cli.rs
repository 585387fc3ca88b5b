use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{PipelineConfig, DEFAULT_BATCH_SIZE, DEFAULT_COOLDOWN_EVERY, DEFAULT_COOLDOWN_SECS};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OcrBackendKind {
    /// Google Cloud Vision text detection
    Google,
    /// Azure Document Intelligence prebuilt-read
    Azure,
}

/// Scan business cards and forms into an Excel contact sheet.
#[derive(Debug, Parser)]
#[command(name = "card-scanner", version, about)]
pub struct Cli {
    /// Folder containing .png / .jpg / .jpeg images
    pub image_dir: PathBuf,

    /// Images per completion request
    #[arg(long, env = "CARD_SCANNER_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Seconds to pause for rate limiting (0 disables)
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub cooldown_secs: u64,

    /// Pause after this many batches' worth of images
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_EVERY)]
    pub cooldown_every: usize,

    #[arg(long, value_enum, default_value_t = OcrBackendKind::Google)]
    pub ocr_backend: OcrBackendKind,

    #[arg(long, env = "GOOGLE_VISION_API_KEY", hide_env_values = true)]
    pub vision_api_key: Option<String>,

    /// OAuth access token for Cloud Vision (used when no API key is given)
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = "GOOGLE_VISION_ENDPOINT")]
    pub vision_endpoint: Option<String>,

    #[arg(long, env = "AZURE_OCR_KEY", hide_env_values = true)]
    pub azure_key: Option<String>,

    #[arg(long, env = "AZURE_OCR_ENDPOINT")]
    pub azure_endpoint: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "GEMINI_ENDPOINT")]
    pub gemini_endpoint: Option<String>,

    /// Output workbook (default: <IMAGE_DIR>/extracted_details.xlsx)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Don't number records in the prompt; match answers by position only
    #[arg(long)]
    pub no_record_tags: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::new(
            self.batch_size,
            self.cooldown_every,
            Duration::from_secs(self.cooldown_secs),
            !self.no_record_tags,
        )
    }
}
