/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use yacap::app_config::{CaptionLanguage, Config};
use yacap::app_controller::Controller;
use yacap::providers::mock::MockProvider;

use crate::common;

fn controller(provider: MockProvider) -> Controller {
    let mut config = Config::default();
    config.export.prefix = "sks,".to_string();
    Controller::with_provider(config, Arc::new(provider))
}

/// Test the controller with the default configuration
#[test]
fn test_controller_initialization_withDefaultConfig_shouldSucceed() -> Result<()> {
    let controller = Controller::with_config(Config::default())?;
    assert_eq!(controller.config().export.language, CaptionLanguage::En);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_withImageFolder_shouldWriteOneCaptionPerImage() -> Result<()> {
    let input = common::create_temp_dir()?;
    let output = common::create_temp_dir()?;
    common::create_test_png(input.path(), "cat.png")?;
    common::create_test_png(input.path(), "sub/dog.png")?;
    common::create_test_file(input.path(), "readme.md", b"# not an image")?;

    let summary = controller(MockProvider::working())
        .run(input.path().to_path_buf(), output.path().to_path_buf(), false)
        .await?;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.captioned, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.interrupted, 0);
    assert_eq!(summary.written.len(), 2);

    let cat = fs::read_to_string(output.path().join("cat.txt"))?;
    assert_eq!(cat, "sks, an image of 16 bytes");
    assert!(output.path().join("sub").join("dog.txt").exists());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_withExistingCaption_shouldKeepItWithoutForce() -> Result<()> {
    let input = common::create_temp_dir()?;
    common::create_test_png(input.path(), "cat.png")?;
    let existing = common::create_test_file(input.path(), "cat.txt", b"curated caption")?;

    let summary = controller(MockProvider::working())
        .run(input.path().to_path_buf(), input.path().to_path_buf(), false)
        .await?;
    assert_eq!(summary.captioned, 1);
    assert!(summary.written.is_empty());
    assert_eq!(fs::read_to_string(&existing)?, "curated caption");

    let summary = controller(MockProvider::working())
        .run(input.path().to_path_buf(), input.path().to_path_buf(), true)
        .await?;
    assert_eq!(summary.written, vec![existing.clone()]);
    assert_ne!(fs::read_to_string(&existing)?, "curated caption");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_withSameNameInTwoFolders_shouldKeepBothCaptions() -> Result<()> {
    let input = common::create_temp_dir()?;
    let output = common::create_temp_dir()?;
    common::create_test_png(input.path(), "a/cat.png")?;
    common::create_test_png(input.path(), "b/cat.png")?;

    let summary = controller(MockProvider::working())
        .run(input.path().to_path_buf(), output.path().to_path_buf(), false)
        .await?;

    assert_eq!(summary.written.len(), 2);
    assert!(output.path().join("a").join("cat.txt").exists());
    assert!(output.path().join("b").join("cat.txt").exists());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_withSingleFileInput_shouldWriteAtOutputRoot() -> Result<()> {
    let input = common::create_temp_dir()?;
    let output = common::create_temp_dir()?;
    let image = common::create_test_png(input.path(), "nested/cat.png")?;

    let summary = controller(MockProvider::working())
        .run(image, output.path().to_path_buf(), false)
        .await?;

    assert_eq!(summary.written, vec![output.path().join("cat.txt")]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_withFailingProvider_shouldReportFailures() -> Result<()> {
    let input = common::create_temp_dir()?;
    let output = common::create_temp_dir()?;
    common::create_test_png(input.path(), "a.png")?;
    common::create_test_png(input.path(), "b.png")?;

    let summary = controller(MockProvider::failing())
        .run(input.path().to_path_buf(), output.path().to_path_buf(), false)
        .await?;

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.captioned, 0);
    assert!(summary.written.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_withEmptyFolder_shouldDoNothing() -> Result<()> {
    let input = common::create_temp_dir()?;
    let summary = controller(MockProvider::working())
        .run(input.path().to_path_buf(), input.path().to_path_buf(), false)
        .await?;
    assert_eq!(summary.total, 0);
    Ok(())
}

#[test]
fn test_run_withMissingInput_shouldFail() -> Result<()> {
    let input = common::create_temp_dir()?;
    let missing = input.path().join("nope");
    let result = tokio_test::block_on(async {
        controller(MockProvider::working())
            .run(missing, input.path().to_path_buf(), false)
            .await
    });
    assert!(result.is_err());
    Ok(())
}
