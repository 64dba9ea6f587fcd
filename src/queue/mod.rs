/*!
 * Adaptive caption queue.
 *
 * - `engine`: dispatch loop, per-item retry, single-item entry points
 * - `state`: ratchet-only run limits and cancellation
 * - `classify`: provider error taxonomy
 * - `retry`: backoff schedule
 * - `profile`: per-provider starting limits
 * - `events`: observer interface
 */

pub mod classify;
pub mod engine;
pub mod events;
pub mod profile;
pub mod retry;
pub mod state;

pub use classify::ErrorKind;
pub use engine::{CaptionJob, CaptionQueue};
pub use events::{Fanout, QueueEvent, QueueObserver};
pub use profile::ProviderProfile;
pub use retry::RetryPolicy;
pub use state::{QueueRunState, RunStateSnapshot};
