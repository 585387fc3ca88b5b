use std::path::Path;

use crate::error::InputError;
use crate::types::ImageRef;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// List the images in `dir`, sorted by file name so runs are repeatable.
pub fn list_images(dir: &Path) -> Result<Vec<ImageRef>, InputError> {
    if !dir.is_dir() {
        return Err(InputError::NotFound(dir.to_path_buf()));
    }
    let entries = std::fs::read_dir(dir).map_err(|source| InputError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut images: Vec<ImageRef> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .map(ImageRef::new)
        .collect();
    if images.is_empty() {
        return Err(InputError::Empty(dir.to_path_buf()));
    }
    images.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(images)
}
