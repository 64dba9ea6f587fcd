/*!
 * Mock provider implementation for tests and dry runs.
 *
 * This module provides a scripted provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with a caption pair
 * - `MockProvider::rate_limited()` - Always answers with a quota error
 * - `MockProvider::transient(n)` - Fails the first `n` calls with a 503, then succeeds
 * - `MockProvider::quota_then_working(n)` - Fails the first `n` calls with a 429, then succeeds
 * - `MockProvider::failing()` - Always fails with a non-retryable server error
 *
 * Every mock counts calls and records the highest number of overlapping calls,
 * and can optionally hold calls until the test releases them.
 */

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::errors::ProviderError;
use crate::store::ImagePayload;

use super::{BilingualCaption, CaptionProvider, ZH_PLACEHOLDER, check_mime_type};

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a caption pair
    Working,
    /// Always fails with HTTP 429 / RESOURCE_EXHAUSTED
    RateLimited,
    /// Fails the first `failures` calls with HTTP 503
    Transient { failures: usize },
    /// Fails the first `failures` calls with HTTP 429
    QuotaThenWorking { failures: usize },
    /// Always fails with HTTP 500
    Failing,
    /// Replies with prose instead of JSON
    PlainText,
    /// Always refused by the safety filter
    Blocked,
}

/// Mock provider for testing queue behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    /// Random latency range in milliseconds
    latency_ms: Option<(u64, u64)>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    /// Calls wait for a permit when set
    gate: Option<Arc<Semaphore>>,
    custom_response: Option<fn(&ImagePayload) -> BilingualCaption>,
}

struct InFlightCall<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightCall<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            latency_ms: None,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            gate: None,
            custom_response: None,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn rate_limited() -> Self {
        Self::new(MockBehavior::RateLimited)
    }

    pub fn transient(failures: usize) -> Self {
        Self::new(MockBehavior::Transient { failures })
    }

    pub fn quota_then_working(failures: usize) -> Self {
        Self::new(MockBehavior::QuotaThenWorking { failures })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Sleep a random duration in `[min_ms, max_ms]` before answering
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = Some((min_ms, max_ms.max(min_ms)));
        self
    }

    /// Hold every call until [`MockProvider::release`] hands out a permit
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `count` held calls complete
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Set a custom caption generator
    pub fn with_custom_response(mut self, generator: fn(&ImagePayload) -> BilingualCaption) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Number of calls received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls currently being answered
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that overlapped
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Shared part of caption and translate: bookkeeping, latency, gate, scripted failures
    async fn answer(&self) -> Result<(), ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightCall { counter: &self.in_flight };

        if let Some((min, max)) = self.latency_ms {
            let delay = rand::rng().random_range(min..=max);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        match self.behavior {
            MockBehavior::RateLimited => Err(ProviderError::ApiError {
                status_code: 429,
                message: "RESOURCE_EXHAUSTED: simulated quota".to_string(),
            }),
            MockBehavior::Transient { failures } if call < failures => Err(ProviderError::ApiError {
                status_code: 503,
                message: format!("Simulated overload (request #{})", call + 1),
            }),
            MockBehavior::QuotaThenWorking { failures } if call < failures => Err(ProviderError::ApiError {
                status_code: 429,
                message: format!("RESOURCE_EXHAUSTED: simulated quota (request #{})", call + 1),
            }),
            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated provider failure".to_string(),
            }),
            MockBehavior::Blocked => Err(ProviderError::ContentBlocked("SAFETY".to_string())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CaptionProvider for MockProvider {
    async fn caption(&self, image: &ImagePayload, _prompt: &str) -> Result<BilingualCaption, ProviderError> {
        check_mime_type(image)?;
        self.answer().await?;

        if let Some(generator) = self.custom_response {
            return Ok(generator(image));
        }
        if self.behavior == MockBehavior::PlainText {
            return Ok(BilingualCaption {
                en: "A plain description without JSON".to_string(),
                zh: ZH_PLACEHOLDER.to_string(),
            });
        }
        Ok(BilingualCaption {
            en: format!("  an image of {} bytes  ", image.bytes.len()),
            zh: format!(" 一张{}字节的图片 ", image.bytes.len()),
        })
    }

    async fn translate(&self, chinese_text: &str) -> Result<String, ProviderError> {
        self.answer().await?;
        Ok(format!("[EN] {}", chinese_text))
    }
}
