/*!
 * Provider implementations for different vision-language services.
 *
 * This module contains client implementations for the supported backends:
 * - Gemini: Google Generative Language API
 * - OpenAI: any OpenAI-compatible chat completions endpoint
 * - Mock: scripted in-process provider for tests and dry runs
 */

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{CaptionConfig, CaptionProviderKind};
use crate::errors::ProviderError;
use crate::store::ImagePayload;

pub mod gemini;
pub mod mock;
pub mod openai;

/// Placeholder stored as the Chinese caption when the reply was not the expected JSON
pub const ZH_PLACEHOLDER: &str = "（未能解析中文描述）";

/// MIME types accepted by both backends
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/heif",
];

/// English and Chinese caption of one image
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BilingualCaption {
    pub en: String,
    pub zh: String,
}

/// Common trait for all caption providers
///
/// The queue engine is written once against this trait; credentials,
/// endpoint and model are bound when the provider is constructed.
#[async_trait]
pub trait CaptionProvider: Send + Sync + Debug {
    /// Caption an image with the given prompt
    async fn caption(&self, image: &ImagePayload, prompt: &str) -> Result<BilingualCaption, ProviderError>;

    /// Translate a Chinese caption into English
    async fn translate(&self, chinese_text: &str) -> Result<String, ProviderError>;
}

/// Build the configured provider
pub fn from_config(config: &CaptionConfig) -> Arc<dyn CaptionProvider> {
    let api_key = config.get_api_key();
    let endpoint = config.get_endpoint();
    let model = config.get_model();
    let timeout_secs = config.get_timeout_secs();
    let translate_prompt = config.common.translate_prompt.clone();

    match config.provider {
        CaptionProviderKind::Gemini => Arc::new(
            gemini::Gemini::new(api_key, endpoint, model, timeout_secs)
                .with_translate_prompt(translate_prompt),
        ),
        CaptionProviderKind::OpenAI => Arc::new(
            openai::OpenAI::new(api_key, endpoint, model, timeout_secs)
                .with_translate_prompt(translate_prompt),
        ),
    }
}

/// Reject payloads neither backend accepts
pub(crate) fn check_mime_type(image: &ImagePayload) -> Result<(), ProviderError> {
    let mime = image.mime_type.to_ascii_lowercase();
    if SUPPORTED_MIME_TYPES.contains(&mime.as_str()) {
        Ok(())
    } else {
        Err(ProviderError::UnsupportedMedia(image.mime_type.clone()))
    }
}

/// Parse a model reply into a caption pair.
///
/// Models often wrap the JSON in a Markdown fence or add a sentence around
/// it, so the outermost object is extracted first. Anything that still does
/// not parse is kept verbatim as the English caption.
pub fn parse_bilingual_caption(text: &str) -> BilingualCaption {
    let trimmed = text.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };

    match serde_json::from_str::<BilingualCaption>(candidate) {
        Ok(caption) => BilingualCaption {
            en: caption.en.trim().to_string(),
            zh: caption.zh.trim().to_string(),
        },
        Err(_) => BilingualCaption {
            en: strip_code_fence(trimmed).to_string(),
            zh: ZH_PLACEHOLDER.to_string(),
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag on the opening fence
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}
