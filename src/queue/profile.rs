/*!
 * Provider-specific queue baselines.
 *
 * A run starts from these values and only ever tightens them.
 */

use std::time::Duration;

use crate::app_config::{CaptionConfig, CaptionProviderKind};

/// Starting limits of a queue run for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Maximum concurrent requests at run start
    pub max_concurrent_requests: usize,
    /// Pause between two dispatches at run start
    pub dispatch_delay: Duration,
}

impl ProviderProfile {
    /// Get the baseline profile for a given provider
    pub fn for_provider(provider: CaptionProviderKind) -> Self {
        match provider {
            CaptionProviderKind::Gemini => Self {
                // Free-tier Gemini keys trip RESOURCE_EXHAUSTED quickly
                max_concurrent_requests: 3,
                dispatch_delay: Duration::from_millis(1000),
            },
            CaptionProviderKind::OpenAI => Self {
                max_concurrent_requests: 5,
                dispatch_delay: Duration::from_millis(500),
            },
        }
    }

    /// Baseline for the active provider with any configured overrides applied
    pub fn from_config(config: &CaptionConfig) -> Self {
        let mut profile = Self::for_provider(config.provider);
        if let Some(concurrent) = config.get_concurrent_requests() {
            profile.max_concurrent_requests = concurrent.max(1);
        }
        if let Some(delay_ms) = config.get_dispatch_delay_ms() {
            profile.dispatch_delay = Duration::from_millis(delay_ms);
        }
        profile
    }
}
