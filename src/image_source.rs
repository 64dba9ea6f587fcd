use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::store::{ImagePayload, WorkItem};

// @module: Image discovery and loading

// @struct: Image file utilities
pub struct ImageSource;

impl ImageSource {
    /// Detect the MIME type of an image from its leading bytes
    pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some("image/jpeg");
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some("image/png");
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some("image/gif");
        }
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some("image/webp");
        }
        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            return match &bytes[8..12] {
                b"heic" | b"heix" | b"hevc" | b"hevx" => Some("image/heic"),
                b"mif1" | b"msf1" => Some("image/heif"),
                _ => None,
            };
        }
        None
    }

    /// Guess the MIME type from a file extension
    pub fn mime_from_extension<P: AsRef<Path>>(path: P) -> Option<&'static str> {
        let ext = path.as_ref().extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "heic" => Some("image/heic"),
            "heif" => Some("image/heif"),
            _ => None,
        }
    }

    /// Check whether a path looks like an image we can caption
    pub fn is_image_path<P: AsRef<Path>>(path: P) -> bool {
        Self::mime_from_extension(path).is_some()
    }

    /// Find image files under a file or directory, sorted by path
    pub fn find_images<P: AsRef<Path>>(input: P) -> Result<Vec<PathBuf>> {
        let input = input.as_ref();
        if input.is_file() {
            return Ok(vec![input.to_path_buf()]);
        }

        let mut result = Vec::new();
        for entry in WalkDir::new(input).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if path.is_file() && Self::is_image_path(path) {
                result.push(path.to_path_buf());
            }
        }
        result.sort();
        Ok(result)
    }

    /// Read an image into a payload. Content sniffing wins over the extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ImagePayload> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read image: {:?}", path))?;

        let mime_type = Self::sniff_mime_type(&bytes)
            .or_else(|| Self::mime_from_extension(path))
            .unwrap_or("application/octet-stream");

        Ok(ImagePayload::new(bytes, mime_type))
    }

    /// Scan `input` and build one work item per readable image
    pub fn load_items<P: AsRef<Path>>(input: P) -> Result<Vec<WorkItem>> {
        let paths = Self::find_images(input)?;
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::load(&path) {
                Ok(payload) => {
                    debug!("Loaded {:?} as {} ({} bytes)", path, payload.mime_type, payload.bytes.len());
                    items.push(WorkItem::new(path, payload));
                }
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }
        Ok(items)
    }
}
