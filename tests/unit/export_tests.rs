/*!
 * Tests for caption export
 */

use anyhow::Result;
use std::fs;
use std::path::Path;
use yacap::app_config::{CaptionLanguage, ExportConfig};
use yacap::export::{CaptionExporter, compose_caption_text};
use yacap::queue::QueueEvent;
use yacap::store::{ItemStatus, ItemStore};

use crate::common::{self, png_item};

#[test]
fn test_compose_withTriggerWords_shouldMatchExpectedSpacing() {
    assert_eq!(compose_caption_text("tok, ", "a cat", ", bg"), "tok, a cat , bg");
    assert_eq!(compose_caption_text("  ", "a cat", ""), "a cat");
    assert_eq!(compose_caption_text("sks", "\n a cat \t", "masterpiece"), "sks a cat masterpiece");
}

fn captioned_store() -> ItemStore {
    let store = ItemStore::new();
    let cat = store.add(png_item("photos/cat.png", 1));
    let dog = store.add(png_item("photos/dog.png", 1));
    store.add(png_item("photos/bird.png", 1));
    store.apply(&QueueEvent::Captioned { id: cat, en: "a cat".into(), zh: "一只猫".into() });
    store.update_status(dog, ItemStatus::Error, Some("blocked".into()));
    store
}

#[test]
fn test_writeAll_shouldOnlyExportSuccessfulItems() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let exporter = CaptionExporter::new(ExportConfig {
        prefix: "tok,".to_string(),
        ..ExportConfig::default()
    });

    let written = exporter.write_all(&captioned_store().snapshot(), Path::new("photos"), temp_dir.path(), false)?;
    assert_eq!(written, vec![temp_dir.path().join("cat.txt")]);
    assert_eq!(fs::read_to_string(&written[0])?, "tok, a cat");
    Ok(())
}

#[test]
fn test_writeAll_withExistingFile_shouldRequireForce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let existing = common::create_test_file(temp_dir.path(), "cat.txt", b"hand written")?;
    let exporter = CaptionExporter::new(ExportConfig::default());
    let items = captioned_store().snapshot();

    let written = exporter.write_all(&items, Path::new("photos"), temp_dir.path(), false)?;
    assert!(written.is_empty());
    assert_eq!(fs::read_to_string(&existing)?, "hand written");

    let written = exporter.write_all(&items, Path::new("photos"), temp_dir.path(), true)?;
    assert_eq!(written.len(), 1);
    assert_eq!(fs::read_to_string(&existing)?, "a cat");
    Ok(())
}

#[test]
fn test_writeAll_chineseWithCustomExtension_shouldUseBoth() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let out = temp_dir.path().join("captions");
    let exporter = CaptionExporter::new(ExportConfig {
        language: CaptionLanguage::Zh,
        extension: ".caption".to_string(),
        ..ExportConfig::default()
    });

    let written = exporter.write_all(&captioned_store().snapshot(), Path::new("photos"), &out, false)?;
    assert_eq!(written, vec![out.join("cat.caption")]);
    assert_eq!(fs::read_to_string(&written[0])?, "一只猫");
    Ok(())
}

#[test]
fn test_writeAll_withSameStemInTwoFolders_shouldWriteBoth() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = ItemStore::new();
    let first = store.add(png_item("photos/a/cat.png", 1));
    let second = store.add(png_item("photos/b/cat.png", 1));
    store.apply(&QueueEvent::Captioned { id: first, en: "a black cat".into(), zh: "黑猫".into() });
    store.apply(&QueueEvent::Captioned { id: second, en: "a white cat".into(), zh: "白猫".into() });

    let exporter = CaptionExporter::new(ExportConfig::default());
    let written = exporter.write_all(&store.snapshot(), Path::new("photos"), temp_dir.path(), false)?;

    let first_path = temp_dir.path().join("a").join("cat.txt");
    let second_path = temp_dir.path().join("b").join("cat.txt");
    assert_eq!(written, vec![first_path.clone(), second_path.clone()]);
    assert_eq!(fs::read_to_string(first_path)?, "a black cat");
    assert_eq!(fs::read_to_string(second_path)?, "a white cat");
    Ok(())
}

#[test]
fn test_writeAll_withEmptyCaption_shouldSkipItAndKeepGoing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = ItemStore::new();
    let empty = store.add(png_item("photos/a.png", 1));
    let dog = store.add(png_item("photos/b.png", 1));
    store.apply(&QueueEvent::Captioned { id: empty, en: "".into(), zh: "一只狗".into() });
    store.apply(&QueueEvent::Captioned { id: dog, en: "a dog".into(), zh: "一只狗".into() });

    let exporter = CaptionExporter::new(ExportConfig::default());
    let written = exporter.write_all(&store.snapshot(), Path::new("photos"), temp_dir.path(), false)?;

    assert_eq!(written, vec![temp_dir.path().join("b.txt")]);
    assert!(!temp_dir.path().join("a.txt").exists());
    assert_eq!(fs::read_to_string(&written[0])?, "a dog");
    Ok(())
}
