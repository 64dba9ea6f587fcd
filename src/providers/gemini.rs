use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::store::ImagePayload;

use super::{BilingualCaption, CaptionProvider, check_mime_type, parse_bilingual_caption};

/// Gemini client for the Generative Language API
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL
    endpoint: String,
    /// Model name, e.g. "gemini-2.0-flash"
    model: String,
    /// Instruction used for translation requests
    translate_prompt: String,
}

impl std::fmt::Debug for Gemini {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gemini")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// generateContent request body
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,

    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One turn of the conversation
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// Text or inline binary part
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", alias = "inlineData")]
    pub inline_data: Option<InlineData>,
}

/// Base64 encoded payload
#[derive(Debug, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(alias = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// Sampling settings
#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// generateContent response body
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,

    #[serde(rename = "promptFeedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,

    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PromptFeedback {
    #[serde(rename = "blockReason")]
    pub block_reason: Option<String>,
}

/// Error envelope returned on non-2xx responses
#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GenerateContentRequest {
    /// Single user turn with a text prompt
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: Some(prompt.into()), inline_data: None }],
            }],
            generation_config: None,
        }
    }

    /// Attach an image to the user turn
    pub fn image(mut self, image: &ImagePayload) -> Self {
        if let Some(content) = self.contents.first_mut() {
            content.parts.push(GeminiPart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: BASE64.encode(&image.bytes),
                }),
            });
        }
        self
    }

    /// Ask for a JSON reply
    pub fn json_response(mut self) -> Self {
        self.generation_config = Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            temperature: None,
        });
        self
    }
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            translate_prompt: String::new(),
        }
    }

    /// Set the translation instruction
    pub fn with_translate_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.translate_prompt = prompt.into();
        self
    }

    fn api_url(&self) -> String {
        let base = if self.endpoint.is_empty() {
            "https://generativelanguage.googleapis.com"
        } else {
            self.endpoint.trim_end_matches('/')
        };
        format!("{}/v1beta/models/{}:generateContent", base, self.model)
    }

    /// Send a generateContent request
    pub async fn complete(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingCredential("Gemini".to_string()));
        }

        let response = self.client.post(self.api_url())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to send request to Gemini API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Gemini API error ({}): {}", status, error_text);
            return Err(Self::api_error(status.as_u16(), &error_text));
        }

        let body = response.bytes().await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to read Gemini API response: {}", e)))?;
        serde_json::from_slice::<GenerateContentResponse>(&body)
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Gemini API response: {}", e)))
    }

    /// Map an error body to a provider error, keeping the status token
    fn api_error(status_code: u16, body: &str) -> ProviderError {
        let message = match serde_json::from_str::<GeminiErrorEnvelope>(body) {
            Ok(envelope) if !envelope.error.status.is_empty() => {
                format!("{}: {}", envelope.error.status, envelope.error.message)
            }
            Ok(envelope) => envelope.error.message,
            Err(_) => body.to_string(),
        };
        ProviderError::ApiError { status_code, message }
    }

    /// Extract the reply text, turning safety stops into errors
    pub fn extract_text(response: &GenerateContentResponse) -> Result<String, ProviderError> {
        if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
            return Err(ProviderError::ContentBlocked(reason.clone()));
        }

        let candidate = response.candidates.first()
            .ok_or_else(|| ProviderError::ParseError("Gemini returned no candidates".to_string()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if matches!(reason, "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST") {
                return Err(ProviderError::ContentBlocked(reason.to_string()));
            }
        }

        let text: String = candidate.content.iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect();

        if text.trim().is_empty() {
            return Err(ProviderError::ParseError("Gemini returned an empty reply".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl CaptionProvider for Gemini {
    async fn caption(&self, image: &ImagePayload, prompt: &str) -> Result<BilingualCaption, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingCredential("Gemini".to_string()));
        }
        check_mime_type(image)?;

        let request = GenerateContentRequest::text(prompt)
            .image(image)
            .json_response();
        let response = self.complete(&request).await?;
        let text = Self::extract_text(&response)?;
        debug!("Gemini caption reply: {} chars", text.len());
        Ok(parse_bilingual_caption(&text))
    }

    async fn translate(&self, chinese_text: &str) -> Result<String, ProviderError> {
        let prompt = format!("{}\n\n{}", self.translate_prompt, chinese_text);
        let response = self.complete(&GenerateContentRequest::text(prompt)).await?;
        Ok(Self::extract_text(&response)?.trim().to_string())
    }
}
