/*!
 * Tests for error types and classification
 */

use uuid::Uuid;
use yacap::errors::{AppError, ProviderError, StoreError};
use yacap::queue::ErrorKind;

#[test]
fn test_providerError_apiError_shouldDisplayStatusAndMessage() {
    let error = ProviderError::ApiError {
        status_code: 429,
        message: "RESOURCE_EXHAUSTED: Quota exceeded".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("429"));
    assert!(display.contains("RESOURCE_EXHAUSTED"));
    assert_eq!(error.status_code(), Some(429));
}

#[test]
fn test_providerError_connectionError_shouldHaveNoStatus() {
    let error = ProviderError::ConnectionError("Host unreachable".to_string());
    assert!(format!("{}", error).contains("Connection error"));
    assert_eq!(error.status_code(), None);
}

#[test]
fn test_appError_fromProviderError_shouldWrapCorrectly() {
    let app_error: AppError = ProviderError::ParseError("bad json".to_string()).into();
    assert!(matches!(app_error, AppError::Provider(_)));
    assert!(app_error.to_string().contains("bad json"));
}

#[test]
fn test_appError_fromStoreError_shouldWrapCorrectly() {
    let id = Uuid::new_v4();
    let app_error: AppError = StoreError::InFlight(id).into();
    assert!(app_error.to_string().contains(&id.to_string()));
}

#[test]
fn test_appError_fromIoError_shouldBeFileError() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.png");
    let app_error: AppError = io_error.into();
    assert!(matches!(app_error, AppError::File(_)));
}

#[test]
fn test_classify_quotaSignals_shouldBeRateLimited() {
    let by_status = ProviderError::ApiError { status_code: 429, message: "slow down".to_string() };
    let by_token = ProviderError::ApiError { status_code: 400, message: "RESOURCE_EXHAUSTED".to_string() };
    let by_word = ProviderError::RequestFailed("You exceeded your current Quota".to_string());
    let by_variant = ProviderError::RateLimitExceeded("retry later".to_string());

    for error in [by_status, by_token, by_word, by_variant] {
        assert_eq!(ErrorKind::classify(&error), ErrorKind::RateLimited, "{}", error);
    }
}

#[test]
fn test_classify_networkSignals_shouldBeTransient() {
    let overloaded = ProviderError::ApiError { status_code: 503, message: "UNAVAILABLE".to_string() };
    let fetch = ProviderError::RequestFailed("Failed to fetch".to_string());
    let network = ProviderError::RequestFailed("network changed".to_string());

    for error in [overloaded, fetch, network] {
        assert_eq!(ErrorKind::classify(&error), ErrorKind::Transient, "{}", error);
        assert!(ErrorKind::classify(&error).is_retryable());
    }
}

#[test]
fn test_classify_terminalKinds_shouldNotRetry() {
    let cases = [
        (ProviderError::UnsupportedMedia("text/plain".to_string()), ErrorKind::Malformed),
        (ProviderError::ParseError("no candidates".to_string()), ErrorKind::Malformed),
        (ProviderError::ContentBlocked("SAFETY".to_string()), ErrorKind::ContentBlocked),
        (ProviderError::MissingCredential("Gemini".to_string()), ErrorKind::MissingCredential),
        (ProviderError::ApiError { status_code: 400, message: "INVALID_ARGUMENT".to_string() }, ErrorKind::Unknown),
    ];

    for (error, expected) in cases {
        let kind = ErrorKind::classify(&error);
        assert_eq!(kind, expected, "{}", error);
        assert!(!kind.is_retryable());
    }
}

#[test]
fn test_userMessage_shouldBeReadable() {
    let blocked = ProviderError::ContentBlocked("SAFETY".to_string());
    assert!(ErrorKind::ContentBlocked.user_message(&blocked).contains("safety"));

    let media = ProviderError::UnsupportedMedia("image/bmp".to_string());
    assert!(ErrorKind::Malformed.user_message(&media).contains("image/bmp"));

    let quota = ProviderError::ApiError { status_code: 429, message: "x".to_string() };
    assert!(ErrorKind::RateLimited.user_message(&quota).contains("quota"));
}
