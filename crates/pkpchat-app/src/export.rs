//! Downloadable artifacts: standalone HTML decks and generated images.

use anyhow::{bail, Context, Result};
use base64::Engine;
use std::fs;
use std::path::{Path, PathBuf};

/// Write an extracted presentation document as a standalone HTML file.
pub fn write_presentation(document: &str, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, document)
        .with_context(|| format!("Failed to write presentation to {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Decode a generated image data URI and write its native bytes. The file
/// extension is taken from the URI's mime type.
pub fn write_image(data_uri: &str, path_stem: &Path) -> Result<PathBuf> {
    let Some((header, payload)) = data_uri.split_once(";base64,") else {
        bail!("Not a base64 image data URI");
    };
    let mime = header.strip_prefix("data:").unwrap_or(header);
    let extension = match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => other.rsplit('/').next().unwrap_or("bin"),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("Failed to decode image data")?;

    let path = path_stem.with_extension(extension);
    fs::write(&path, bytes)
        .with_context(|| format!("Failed to write image to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_presentation() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("deck.html");
        let written = write_presentation("<!doctype html><html></html>", &target).unwrap();
        assert_eq!(fs::read_to_string(written).unwrap(), "<!doctype html><html></html>");
    }

    #[test]
    fn test_write_image_decodes_payload() {
        let dir = TempDir::new().unwrap();
        let stem = dir.path().join("picture");
        let written = write_image("data:image/png;base64,QUJD", &stem).unwrap();
        assert_eq!(written.extension().unwrap(), "png");
        assert_eq!(fs::read(written).unwrap(), b"ABC");
    }

    #[test]
    fn test_write_image_rejects_plain_text() {
        let dir = TempDir::new().unwrap();
        assert!(write_image("not a data uri", &dir.path().join("x")).is_err());
    }
}
