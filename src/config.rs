use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::Field;

/// Free-form phone labels seen on cards. Zipped with [`PHONE_STANDARD_LABELS`],
/// so only the first three get a canonical slot.
pub const PHONE_LABELS: &[&str] = &[
    "fax",
    "phone",
    "phone 1",
    "phone 2",
    "phone 3",
    "home phone",
    "cell phone",
    "business",
];

pub const PHONE_STANDARD_LABELS: &[&str] = &["Phone-1", "Phone-2", "Phone-3"];

pub const OUTPUT_FILE_NAME: &str = "extracted_details.xlsx";

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_COOLDOWN_EVERY: usize = 10;
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Lower-cased raw label -> canonical header, in declaration order.
pub fn phone_label_map() -> Vec<(String, String)> {
    PHONE_LABELS
        .iter()
        .zip(PHONE_STANDARD_LABELS.iter())
        .map(|(raw, canonical)| (raw.to_lowercase(), (*canonical).to_string()))
        .collect()
}

/// Settings shared by every stage of a run. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    /// Pause after every `cooldown_every` batches' worth of images.
    pub cooldown_every: usize,
    pub cooldown: Duration,
    pub fields: Vec<Field>,
    pub label_map: Vec<(String, String)>,
    /// Ask the model to number its blocks so they can be matched by index.
    pub tag_records: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown_every: DEFAULT_COOLDOWN_EVERY,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            fields: Field::ALL.to_vec(),
            label_map: phone_label_map(),
            tag_records: true,
        }
    }
}

impl PipelineConfig {
    pub fn new(
        batch_size: usize,
        cooldown_every: usize,
        cooldown: Duration,
        tag_records: bool,
    ) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        Ok(Self {
            batch_size,
            cooldown_every,
            cooldown,
            tag_records,
            ..Self::default()
        })
    }

    /// Whether the batch starting at input offset `window_start` triggers a pause.
    ///
    /// The trigger is `window_start + batch_size` landing on a multiple of
    /// `batch_size * cooldown_every` input images, not a count of completed
    /// batches. A short final window is measured as if it were full.
    pub fn cooldown_due(&self, window_start: usize) -> bool {
        if self.cooldown.is_zero() || self.cooldown_every == 0 {
            return false;
        }
        (window_start + self.batch_size) % (self.batch_size * self.cooldown_every) == 0
    }
}

/// `<image_dir>/extracted_details.xlsx` unless overridden; `.xlsx` is enforced.
pub fn output_path(image_dir: &Path, override_path: Option<&Path>) -> PathBuf {
    match override_path {
        Some(p) => {
            let mut pb = p.to_path_buf();
            if pb.extension().map(|e| e.to_str()) != Some(Some("xlsx")) {
                pb.set_extension("xlsx");
            }
            pb
        }
        None => image_dir.join(OUTPUT_FILE_NAME),
    }
}

/// Load `.env` from the working directory, then from the per-user config folder.
pub fn load_env() {
    let _ = dotenvy::dotenv();
    if let Some(dir) = dirs::config_dir() {
        let env_path = dir.join("card-scanner").join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_label_map_only_maps_first_three() {
        let map = phone_label_map();
        assert_eq!(
            map,
            vec![
                ("fax".to_string(), "Phone-1".to_string()),
                ("phone".to_string(), "Phone-2".to_string()),
                ("phone 1".to_string(), "Phone-3".to_string()),
            ]
        );
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            PipelineConfig::new(0, 10, Duration::ZERO, true),
            Err(ConfigError::BatchSize)
        ));
    }

    #[test]
    fn test_cooldown_cadence() {
        let config = PipelineConfig::new(10, 10, Duration::from_secs(60), true).unwrap();
        assert!(!config.cooldown_due(0));
        assert!(!config.cooldown_due(80));
        assert!(config.cooldown_due(90));
        assert!(config.cooldown_due(190));
        assert!(!config.cooldown_due(100));
    }

    #[test]
    fn test_cooldown_disabled() {
        let config = PipelineConfig::new(10, 10, Duration::ZERO, true).unwrap();
        assert!(!config.cooldown_due(90));
        let config = PipelineConfig::new(10, 0, Duration::from_secs(1), true).unwrap();
        assert!(!config.cooldown_due(90));
    }

    #[test]
    fn test_output_path() {
        let dir = Path::new("/scans");
        assert_eq!(output_path(dir, None), dir.join("extracted_details.xlsx"));
        assert_eq!(
            output_path(dir, Some(Path::new("/tmp/contacts"))),
            PathBuf::from("/tmp/contacts.xlsx")
        );
        assert_eq!(
            output_path(dir, Some(Path::new("/tmp/contacts.xlsx"))),
            PathBuf::from("/tmp/contacts.xlsx")
        );
    }
}
