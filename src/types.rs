use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An input image: its path plus the file name shown in the output sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub path: PathBuf,
    pub name: String,
}

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|o| o.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Canonical contact fields, in output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    FirstName,
    LastName,
    Address,
    City,
    State,
    Zip,
    Email,
    Phone1,
    Phone2,
    Phone3,
    OwnerId,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::FirstName,
        Field::LastName,
        Field::Address,
        Field::City,
        Field::State,
        Field::Zip,
        Field::Email,
        Field::Phone1,
        Field::Phone2,
        Field::Phone3,
        Field::OwnerId,
    ];

    /// Label used both as the sheet header and as the bolded prompt marker.
    pub fn label(&self) -> &'static str {
        match self {
            Field::FirstName => "First Name",
            Field::LastName => "Last Name",
            Field::Address => "Address",
            Field::City => "City",
            Field::State => "State",
            Field::Zip => "Zip",
            Field::Email => "E-mail",
            Field::Phone1 => "Phone-1",
            Field::Phone2 => "Phone-2",
            Field::Phone3 => "Phone-3",
            Field::OwnerId => "Owner ID",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Cleaned values for one card, one slot per [`Field`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    values: [String; 11],
}

impl ContactRecord {
    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    /// Values in [`Field::ALL`] order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(String::is_empty)
    }
}

/// A row of the output sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub serial: u32,
    pub image_name: String,
    pub record: ContactRecord,
}

impl OutputRow {
    /// Cell values in header order (serial and image name first).
    pub fn cells(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(2 + Field::ALL.len());
        out.push(self.serial.to_string());
        out.push(self.image_name.clone());
        out.extend(self.record.values().map(str::to_string));
        out
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub images: usize,
    pub ocr_failures: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub empty_batches: usize,
    pub rows_written: usize,
    pub unrecorded_images: usize,
    pub persist_failures: usize,
    pub cooldowns: usize,
    pub alignment_warnings: usize,
}
