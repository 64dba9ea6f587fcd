/*!
 * Tests for provider construction and caption reply handling
 */

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use yacap::app_config::{CaptionProviderKind, Config};
use yacap::errors::ProviderError;
use yacap::providers::gemini::Gemini;
use yacap::providers::mock::{MockBehavior, MockProvider};
use yacap::providers::{self, CaptionProvider, ZH_PLACEHOLDER, parse_bilingual_caption};
use yacap::providers::openai::OpenAI;
use yacap::queue::ErrorKind;
use yacap::store::ImagePayload;

fn png() -> ImagePayload {
    ImagePayload::new(vec![0u8; 8], "image/png")
}

#[test]
fn test_parse_jsonSurroundedByProse_shouldExtractObject() {
    let reply = "Sure! Here is the caption:\n{\"en\": \"a lighthouse at night\", \"zh\": \"夜晚的灯塔\"}\nHope this helps.";
    let caption = parse_bilingual_caption(reply);
    assert_eq!(caption.en, "a lighthouse at night");
    assert_eq!(caption.zh, "夜晚的灯塔");
}

#[test]
fn test_parse_extraKeys_shouldBeIgnored() {
    let caption = parse_bilingual_caption(r#"{"en": "a cat", "zh": "一只猫", "tags": ["cat"]}"#);
    assert_eq!(caption.en, "a cat");
    assert_eq!(caption.zh, "一只猫");
}

#[test]
fn test_fromConfig_shouldBuildActiveProvider() {
    let mut config = Config::default();
    config.caption.provider = CaptionProviderKind::OpenAI;
    let provider = providers::from_config(&config.caption);
    assert!(format!("{:?}", provider).contains("OpenAI"));

    config.caption.provider = CaptionProviderKind::Gemini;
    let provider = providers::from_config(&config.caption);
    assert!(format!("{:?}", provider).contains("Gemini"));
}

#[tokio::test]
async fn test_gemini_withoutKey_shouldFailBeforeSending() {
    let client = Gemini::new("", "http://127.0.0.1:9", "gemini-2.0-flash", 1);
    let result = client.caption(&png(), "describe").await;
    assert!(matches!(result, Err(ProviderError::MissingCredential(_))));
}

#[tokio::test]
async fn test_gemini_unsupportedMedia_shouldFailBeforeSending() {
    let client = Gemini::new("key", "http://127.0.0.1:9", "gemini-2.0-flash", 1);
    let result = client.caption(&ImagePayload::new(vec![0u8], "application/pdf"), "describe").await;
    assert!(matches!(result, Err(ProviderError::UnsupportedMedia(_))));
}

#[tokio::test]
async fn test_mockPlainText_shouldDegradeToPlaceholder() {
    let provider = MockProvider::new(MockBehavior::PlainText);
    let caption = provider.caption(&png(), "describe").await.unwrap();
    assert_eq!(caption.zh, ZH_PLACEHOLDER);
    assert!(!caption.en.is_empty());
}

#[tokio::test]
async fn test_mockRateLimited_shouldLookLikeQuotaError() {
    let provider = MockProvider::rate_limited();
    let error = provider.caption(&png(), "describe").await.unwrap_err();
    assert_eq!(error.status_code(), Some(429));
    assert!(error.to_string().contains("RESOURCE_EXHAUSTED"));
}

/// Read one HTTP request, headers and body, from `socket`
async fn read_request(socket: &mut TcpStream) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buffer[..end]).to_lowercase();
            let length = headers.lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Answer one request with a 200 whose body is cut off mid-stream
async fn truncated_body_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 4096\r\n\r\n{\"candidates\": [")
            .await
            .unwrap();
        let _ = socket.shutdown().await;
    });
    format!("http://{}", address)
}

#[tokio::test]
async fn test_gemini_bodyCutOff_shouldBeRetryableConnectionError() {
    let endpoint = truncated_body_server().await;
    let client = Gemini::new("key", endpoint, "gemini-2.0-flash", 5);

    let error = client.caption(&png(), "describe").await.unwrap_err();
    assert!(matches!(error, ProviderError::ConnectionError(_)), "got {:?}", error);
    assert_eq!(ErrorKind::classify(&error), ErrorKind::Transient);
}

#[tokio::test]
async fn test_openai_bodyCutOff_shouldBeRetryableConnectionError() {
    let endpoint = truncated_body_server().await;
    let client = OpenAI::new("key", endpoint, "gpt-4o-mini", 5);

    let error = client.caption(&png(), "describe").await.unwrap_err();
    assert!(matches!(error, ProviderError::ConnectionError(_)), "got {:?}", error);
    assert_eq!(ErrorKind::classify(&error), ErrorKind::Transient);
}
