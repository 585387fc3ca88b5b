use calamine::{open_workbook_auto, DataType, Reader};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::SinkError;
use crate::types::{Field, OutputRow};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

pub const SHEET_NAME: &str = "Contacts";

/// Output table header: serial, image name, then every field in order.
pub fn export_headers() -> Vec<&'static str> {
    let mut headers = vec!["Serial Number", "Image Name"];
    headers.extend(Field::ALL.iter().map(|f| f.label()));
    headers
}

/// Where batches of parsed rows go. Rows are only ever appended.
pub trait ProgressSink {
    fn append_batch(&mut self, rows: Vec<OutputRow>);

    /// Write everything appended so far to durable storage.
    fn persist(&mut self) -> Result<(), SinkError>;

    fn row_count(&self) -> usize;
}

/// Remove or replace characters that can corrupt Excel's sheet XML and cause "unreadable content".
/// Drops control chars (except tab, newline, CR).
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

fn write_text_cell_safe(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    format: &Format,
) -> Result<(), XlsxError> {
    let cleaned = sanitize_cell(text);
    worksheet.write_string_with_format(row, col, &cleaned, format).map(|_| ())
}

/// Estimate column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}

fn calculate_column_widths(rows: &[OutputRow]) -> Vec<f64> {
    let mut widths: Vec<f64> = export_headers().iter().map(|h| estimate_text_width(h)).collect();
    for row in rows {
        for (col, cell) in row.cells().iter().enumerate() {
            let w = estimate_text_width(cell);
            if col < widths.len() && w > widths[col] {
                widths[col] = w;
            }
        }
    }
    widths
}

/// Build the full workbook (header + all rows) and save it to `path`.
pub fn write_contacts_workbook(path: &Path, rows: &[OutputRow]) -> Result<(), SinkError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(rust_xlsxwriter::Color::RGB(0x2563EB))
        .set_font_color(rust_xlsxwriter::Color::RGB(0xFFFFFF));
    let text_format = Format::new();

    for (col, &w) in calculate_column_widths(rows).iter().enumerate() {
        worksheet.set_column_width(col as u16, w)?;
    }

    for (col, header) in export_headers().iter().enumerate() {
        write_text_cell_safe(worksheet, 0, col as u16, header, &header_format)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let r = (row_idx + 1) as u32;
        worksheet.write_number_with_format(r, 0, row.serial as f64, &text_format)?;
        write_text_cell_safe(worksheet, r, 1, &row.image_name, &text_format)?;
        for (i, value) in row.record.values().enumerate() {
            write_text_cell_safe(worksheet, r, (i + 2) as u16, value, &text_format)?;
        }
    }

    let _ = worksheet.set_freeze_panes(1, 0);
    workbook.save(path)?;
    Ok(())
}

/// `.xlsx` sink that rewrites the whole sheet from its in-memory table on each persist.
pub struct XlsxSink {
    path: PathBuf,
    rows: Vec<OutputRow>,
    persisted: usize,
}

impl XlsxSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
            persisted: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended since the last successful persist.
    pub fn unsaved(&self) -> usize {
        self.rows.len() - self.persisted
    }
}

impl ProgressSink for XlsxSink {
    fn append_batch(&mut self, rows: Vec<OutputRow>) {
        self.rows.extend(rows);
    }

    fn persist(&mut self) -> Result<(), SinkError> {
        write_contacts_workbook(&self.path, &self.rows)?;
        self.persisted = self.rows.len();
        info!(path = %self.path.display(), rows = self.rows.len(), "Progress saved");
        Ok(())
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Read the data rows (header excluded) of a saved contacts sheet as strings.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, SinkError> {
    if !path.exists() {
        return Err(SinkError::Open("File not found.".to_string()));
    }
    let mut workbook = open_workbook_auto(path).map_err(|e| SinkError::Open(e.to_string()))?;
    let range = workbook
        .worksheet_range(SHEET_NAME)
        .map_err(|e| SinkError::SheetNotFound(e.to_string()))?;
    Ok(range
        .rows()
        .skip(1)
        .map(|row| {
            row.iter()
                .map(|c| c.as_string().unwrap_or_default())
                .collect()
        })
        .collect())
}
