/*!
 * # yacap - Yet Another Captioner
 *
 * A Rust library for batch-captioning images for text-to-image training sets
 * using vision-language APIs.
 *
 * ## Features
 *
 * - Bilingual (English / Chinese) captions for every image
 * - Caption providers:
 *   - Google Gemini
 *   - Any OpenAI-compatible chat completions endpoint
 * - Adaptive concurrency: the first quota error slows the whole run down
 * - Retries with exponential backoff and quota cooldowns
 * - Cancellable runs that never overwrite later user edits
 * - Prefix/suffix trigger words on export
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `queue`: Adaptive caption queue:
 *   - `queue::engine`: Dispatch loop and per-item retry
 *   - `queue::state`: Run limits and cancellation
 *   - `queue::classify`: Provider error taxonomy
 * - `store`: In-memory work items and their captions
 * - `image_source`: Image discovery and loading
 * - `export`: Caption text composition and file output
 * - `app_controller`: Main application controller
 * - `providers`: Client implementations for the supported APIs:
 *   - `providers::gemini`: Gemini API client
 *   - `providers::openai`: OpenAI-compatible API client
 *   - `providers::mock`: Scripted provider for tests and dry runs
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod export;
pub mod image_source;
pub mod providers;
pub mod queue;
pub mod store;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, RunSummary};
pub use errors::{AppError, ProviderError, StoreError};
pub use export::{CaptionExporter, compose_caption_text};
pub use providers::{BilingualCaption, CaptionProvider};
pub use queue::{CaptionJob, CaptionQueue, ErrorKind, QueueEvent, QueueObserver};
pub use store::{ImagePayload, ItemId, ItemStatus, ItemStore, WorkItem};
