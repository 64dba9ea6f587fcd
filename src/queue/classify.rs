/*!
 * Error taxonomy used by the queue to decide between retrying and failing.
 *
 * Classification looks at the error variant first, then at the HTTP status
 * and finally at the message text, because both vendors report quota and
 * network problems in several shapes.
 */

use crate::errors::ProviderError;

/// How the queue reacts to a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Quota or rate limit hit; retried and tightens the run limits
    RateLimited,
    /// Network or temporary server trouble; retried with plain backoff
    Transient,
    /// Unsupported image or unusable response
    Malformed,
    /// Refused by the provider's safety filter
    ContentBlocked,
    /// No API key for the selected provider
    MissingCredential,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    pub fn classify(error: &ProviderError) -> Self {
        match error {
            ProviderError::MissingCredential(_) => return Self::MissingCredential,
            ProviderError::UnsupportedMedia(_) => return Self::Malformed,
            ProviderError::ContentBlocked(_) => return Self::ContentBlocked,
            ProviderError::RateLimitExceeded(_) => return Self::RateLimited,
            ProviderError::ConnectionError(_) => return Self::Transient,
            _ => {}
        }

        let status = error.status_code();
        let text = error.to_string();
        let lower = text.to_lowercase();

        if status == Some(429) || text.contains("RESOURCE_EXHAUSTED") || lower.contains("quota") {
            return Self::RateLimited;
        }
        if status == Some(503) || lower.contains("fetch") || lower.contains("network") {
            return Self::Transient;
        }
        if matches!(error, ProviderError::ParseError(_)) {
            return Self::Malformed;
        }
        Self::Unknown
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }

    /// Short message shown on an item that ended in `Error`
    pub fn user_message(&self, error: &ProviderError) -> String {
        match self {
            Self::RateLimited => "API quota exhausted, try again later".to_string(),
            Self::Transient => format!("Network error, gave up after retries: {}", error),
            Self::Malformed => match error {
                ProviderError::UnsupportedMedia(mime) => format!("Unsupported image format ({})", mime),
                _ => "Malformed response from provider".to_string(),
            },
            Self::ContentBlocked => "Blocked by the provider's content safety filter".to_string(),
            Self::MissingCredential => match error {
                ProviderError::MissingCredential(provider) => format!("API key missing for {}", provider),
                _ => "API key missing".to_string(),
            },
            Self::Unknown => format!("Caption failed: {}", error),
        }
    }
}
