use std::path::PathBuf;
use thiserror::Error;

/// Per-image failure from a text extraction backend.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("File not found.")]
    FileNotFound,

    #[error("Could not read file: {0}")]
    Read(std::io::Error),

    #[error("Check your internet connection and try again.")]
    Connection,

    #[error("Network error.")]
    Network,

    #[error("OCR failed ({status}): {body}")]
    Service { status: u16, body: String },

    #[error("OCR analysis failed: {0}")]
    Analysis(String),

    #[error("Invalid JSON: {0}")]
    InvalidResponse(String),

    #[error("No text detected.")]
    NoText,

    #[error("OCR timed out. Try again.")]
    Timeout,
}

impl OcrError {
    pub(crate) fn from_read(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            OcrError::FileNotFound
        } else {
            OcrError::Read(e)
        }
    }

    pub(crate) fn from_send(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            OcrError::Connection
        } else {
            OcrError::Network
        }
    }
}

/// Per-batch failure from the text completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Check your internet connection and try again.")]
    Connection,

    #[error("Network error.")]
    Network,

    #[error("Completion failed ({status}): {body}")]
    Service { status: u16, body: String },

    #[error("Completion API error: {0}")]
    Api(String),

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    #[error("Completion service returned no candidates")]
    Empty,
}

impl CompletionError {
    pub(crate) fn from_send(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            CompletionError::Connection
        } else {
            CompletionError::Network
        }
    }
}

/// Failure to write the output workbook.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Please close the file in Excel first.")]
    Locked,

    #[error("Cannot write to file: {0}")]
    Write(String),

    #[error("Could not open Excel file: {0}")]
    Open(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),
}

impl From<rust_xlsxwriter::XlsxError> for SinkError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("being used") {
            SinkError::Locked
        } else {
            SinkError::Write(msg)
        }
    }
}

/// Startup failures: these abort the run before any image is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Batch size must be at least 1")]
    BatchSize,

    #[error("{0} not set in .env")]
    MissingCredential(&'static str),

    #[error("Could not build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Image folder not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Could not read image folder {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No .png, .jpg or .jpeg images in {}", .0.display())]
    Empty(PathBuf),
}
