/*!
 * Caption export.
 *
 * Builds the final text of every caption (prefix, body, suffix) and writes
 * one text file per captioned image.
 */

use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_config::{CaptionLanguage, ExportConfig};
use crate::store::{ItemStatus, WorkItem};

/// Join prefix, body and suffix with single spaces.
///
/// Each segment is trimmed first and empty segments are skipped, so
/// `("tok, ", "a cat", ", bg")` gives `"tok, a cat , bg"`.
pub fn compose_caption_text(prefix: &str, body: &str, suffix: &str) -> String {
    [prefix, body, suffix]
        .iter()
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes caption files for work items
pub struct CaptionExporter {
    config: ExportConfig,
}

impl CaptionExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Final caption text of an item
    pub fn caption_text(&self, item: &WorkItem) -> String {
        let body = match self.config.language {
            CaptionLanguage::En => &item.caption_en,
            CaptionLanguage::Zh => &item.caption_zh,
        };
        compose_caption_text(&self.config.prefix, body, &self.config.suffix)
    }

    /// Path of the caption file for an item.
    ///
    /// The image's location below `source_root` is kept under `output_dir`,
    /// so `root/a/cat.png` and `root/b/cat.png` get separate files.
    pub fn output_path(&self, item: &WorkItem, source_root: &Path, output_dir: &Path) -> PathBuf {
        let relative = item.source_path.strip_prefix(source_root)
            .ok()
            .filter(|relative| !relative.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| item.source_path.file_name().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(item.id.to_string()));
        let extension = self.config.extension.trim_start_matches('.');
        output_dir.join(relative).with_extension(extension)
    }

    /// Write one file per successful item. Existing files are only replaced with `force_overwrite`.
    ///
    /// Items whose final text is empty are skipped with a warning.
    pub fn write_all(
        &self,
        items: &[WorkItem],
        source_root: &Path,
        output_dir: &Path,
        force_overwrite: bool,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

        let mut written = Vec::new();
        for item in items.iter().filter(|item| item.status == ItemStatus::Success) {
            let text = self.caption_text(item);
            if text.is_empty() {
                warn!("Skipping {:?}: caption is empty", item.source_path);
                continue;
            }

            let path = self.output_path(item, source_root, output_dir);
            if path.exists() && !force_overwrite {
                warn!("Caption file already exists: {:?}. Use -f to force overwrite.", path);
                continue;
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }

            fs::write(&path, text)
                .with_context(|| format!("Failed to write caption file: {:?}", path))?;
            debug!("Wrote {:?}", path);
            written.push(path);
        }
        Ok(written)
    }
}
