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

/// Client for OpenAI-compatible chat completions endpoints
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// Bearer token
    api_key: String,
    /// Base URL including the version segment, e.g. "https://api.openai.com/v1"
    endpoint: String,
    /// Vision-capable model name
    model: String,
    /// Instruction used for translation requests
    translate_prompt: String,
}

impl std::fmt::Debug for OpenAI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAI")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat message with multi-part content
#[derive(Debug, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

/// Text or image part of a message
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIReply,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIReply {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorEnvelope {
    error: OpenAIErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

impl OpenAIRequest {
    /// Create a new request for a model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Add a text message
    pub fn add_message(mut self, role: impl Into<String>, text: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: vec![ContentPart::Text { text: text.into() }],
        });
        self
    }

    /// Add a user message carrying a prompt and an image
    pub fn add_image_message(mut self, prompt: impl Into<String>, image: &ImagePayload) -> Self {
        let data_url = format!("data:{};base64,{}", image.mime_type, BASE64.encode(&image.bytes));
        self.messages.push(OpenAIMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text { text: prompt.into() },
                ContentPart::ImageUrl { image_url: ImageUrl { url: data_url } },
            ],
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of tokens to generate
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl OpenAI {
    /// Create a new client
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
            "https://api.openai.com/v1"
        } else {
            self.endpoint.trim_end_matches('/')
        };
        format!("{}/chat/completions", base)
    }

    /// Send a chat completion request
    pub async fn complete(&self, request: &OpenAIRequest) -> Result<OpenAIResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingCredential("OpenAI".to_string()));
        }

        let response = self.client.post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to send request to OpenAI API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("OpenAI API error ({}): {}", status, error_text);
            return Err(Self::api_error(status.as_u16(), &error_text));
        }

        let body = response.bytes().await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to read OpenAI API response: {}", e)))?;
        serde_json::from_slice::<OpenAIResponse>(&body)
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse OpenAI API response: {}", e)))
    }

    fn api_error(status_code: u16, body: &str) -> ProviderError {
        let message = match serde_json::from_str::<OpenAIErrorEnvelope>(body) {
            Ok(envelope) => match envelope.error.error_type {
                Some(error_type) => format!("{}: {}", error_type, envelope.error.message),
                None => envelope.error.message,
            },
            Err(_) => body.to_string(),
        };
        ProviderError::ApiError { status_code, message }
    }

    /// Extract the reply text, turning content filter stops into errors
    pub fn extract_text(response: &OpenAIResponse) -> Result<String, ProviderError> {
        let choice = response.choices.first()
            .ok_or_else(|| ProviderError::ParseError("OpenAI returned no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::ContentBlocked("content_filter".to_string()));
        }

        match choice.message.content.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(ProviderError::ParseError("OpenAI returned an empty reply".to_string())),
        }
    }
}

#[async_trait]
impl CaptionProvider for OpenAI {
    async fn caption(&self, image: &ImagePayload, prompt: &str) -> Result<BilingualCaption, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingCredential("OpenAI".to_string()));
        }
        check_mime_type(image)?;

        let request = OpenAIRequest::new(&self.model)
            .add_image_message(prompt, image)
            .max_tokens(1024);
        let response = self.complete(&request).await?;
        let text = Self::extract_text(&response)?;
        debug!("OpenAI caption reply: {} chars", text.len());
        Ok(parse_bilingual_caption(&text))
    }

    async fn translate(&self, chinese_text: &str) -> Result<String, ProviderError> {
        let request = OpenAIRequest::new(&self.model)
            .add_message("system", &self.translate_prompt)
            .add_message("user", chinese_text)
            .temperature(0.2);
        let response = self.complete(&request).await?;
        Ok(Self::extract_text(&response)?.trim().to_string())
    }
}
