use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use crate::{constants::RECIPE_IMAGE_DIR, error::ApiError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Parses `data:image/<ext>;base64,<payload>`.
pub fn decode_image(data: &str) -> Result<DecodedImage, &'static str> {
    let (header, payload) = data
        .split_once(";base64,")
        .ok_or("Expected a base64-encoded data URI.")?;

    let extension = header
        .strip_prefix("data:image/")
        .ok_or("Upload a valid image.")?
        .to_ascii_lowercase();

    let extension = match extension.as_str() {
        "jpeg" => String::from("jpg"),
        "svg+xml" => return Err("Upload a valid image."),
        _ => extension,
    };

    if extension.is_empty()
        || extension.len() > 10
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err("Upload a valid image.");
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| "Invalid base64 payload.")?;

    if bytes.is_empty() {
        return Err("The submitted file is empty.");
    }

    Ok(DecodedImage { extension, bytes })
}

/// Writes the image under `media_root` and returns its media-relative path.
pub async fn store_image(media_root: &Path, image: &DecodedImage) -> Result<String, ApiError> {
    let relative = format!("{RECIPE_IMAGE_DIR}/{}.{}", Uuid::new_v4(), image.extension);
    let path = media_root.join(&relative);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to create {parent:?}: {e}")))?;
    }

    tokio::fs::write(&path, &image.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to write {path:?}: {e}")))?;

    log::debug!("Stored image {relative}");
    Ok(relative)
}

fn resolve(media_root: &Path, relative: &str) -> Option<PathBuf> {
    // only paths this module produced
    let name = relative.strip_prefix(RECIPE_IMAGE_DIR)?.strip_prefix('/')?;
    if name.is_empty() || name.contains('/') || name.contains("..") {
        return None;
    }
    Some(media_root.join(relative))
}

/// Best effort; a leftover file is logged, not reported to the caller.
pub async fn remove_image(media_root: &Path, relative: &str) {
    let Some(path) = resolve(media_root, relative) else {
        log::warn!("Refusing to remove unexpected media path {relative}");
        return;
    };

    if let Err(e) = tokio::fs::remove_file(&path).await {
        log::warn!("Failed to remove {path:?}: {e}");
    }
}

pub fn image_url(media_url: &str, image: Option<&str>) -> Option<String> {
    image.map(|path| format!("{media_url}{path}"))
}
