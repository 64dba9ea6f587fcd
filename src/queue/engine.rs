/*!
 * Caption queue engine.
 *
 * A bulk run walks its items in order, keeps at most `concurrency_limit`
 * of them in flight, waits `dispatch_delay` between dispatches and then
 * drains. Every item runs its own retry loop in a spawned task. The first
 * quota error of a run drops the run to one request at a time with a long
 * dispatch delay, and the run never loosens again.
 *
 * Stopping a run does not abort outstanding HTTP calls. Workers check the
 * cancellation at every resumption point and stop publishing events, so a
 * late answer never overwrites what the user did in the meantime.
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::providers::CaptionProvider;
use crate::store::{ImagePayload, ItemId, ItemStatus};

use super::classify::ErrorKind;
use super::events::{QueueEvent, QueueObserver};
use super::profile::ProviderProfile;
use super::retry::RetryPolicy;
use super::state::{QueueRunState, RunStateSnapshot};

/// One image to caption
#[derive(Debug, Clone)]
pub struct CaptionJob {
    pub id: ItemId,
    pub payload: ImagePayload,
}

type InFlightSet = Arc<Mutex<HashSet<ItemId>>>;

/// Removes an item from the in-flight set when its work ends, however it ends
struct InFlightGuard {
    set: InFlightSet,
    id: ItemId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

/// Adaptive, cancellable caption queue
pub struct CaptionQueue {
    provider: Arc<dyn CaptionProvider>,
    observer: Arc<dyn QueueObserver>,
    profile: ProviderProfile,
    policy: RetryPolicy,
    prompt: Arc<str>,
    /// State of the bulk run the user currently sees as running
    active: Mutex<Option<Arc<QueueRunState>>>,
    /// Cancels single-item work started outside a bulk run
    detached: Mutex<CancellationToken>,
    in_flight: InFlightSet,
}

impl CaptionQueue {
    pub fn new(
        provider: Arc<dyn CaptionProvider>,
        observer: Arc<dyn QueueObserver>,
        profile: ProviderProfile,
        policy: RetryPolicy,
        prompt: impl Into<String>,
    ) -> Self {
        let prompt: String = prompt.into();
        Self {
            provider,
            observer,
            profile,
            policy,
            prompt: Arc::from(prompt),
            active: Mutex::new(None),
            detached: Mutex::new(CancellationToken::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A bulk run is active and has not been stopped
    pub fn is_running(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|state| !state.is_cancelled())
    }

    /// Limits of the active bulk run
    pub fn run_state(&self) -> Option<RunStateSnapshot> {
        self.active.lock().as_ref().map(|state| state.snapshot())
    }

    /// Whether a request for the item is outstanding
    pub fn is_in_flight(&self, id: ItemId) -> bool {
        self.in_flight.lock().contains(&id)
    }

    /// Stop the active run and any single-item work.
    ///
    /// Returns immediately; the stopped run drains in the background of its
    /// own `run` call.
    pub fn cancel(&self) {
        if let Some(state) = self.active.lock().take() {
            state.cancel();
            info!("Caption run stopped");
        }
        let previous = std::mem::replace(&mut *self.detached.lock(), CancellationToken::new());
        previous.cancel();
    }

    /// Caption `jobs` in order with bounded, adaptive concurrency.
    ///
    /// A call made while another run is active returns at once without
    /// touching any item. Jobs whose item is already in flight are skipped.
    pub async fn run(&self, jobs: Vec<CaptionJob>) {
        let state = {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|state| !state.is_cancelled()) {
                warn!("A caption run is already active, ignoring new request");
                return;
            }
            let state = Arc::new(QueueRunState::new(&self.profile));
            *active = Some(state.clone());
            state
        };

        let jobs = self.dedupe(jobs);
        info!(
            "Starting caption run: {} item(s), concurrency {}, dispatch delay {:?}",
            jobs.len(),
            state.concurrency_limit(),
            state.dispatch_delay()
        );
        self.observer.on_event(&QueueEvent::RunStarted {
            items: jobs.len(),
            concurrency_limit: state.concurrency_limit(),
            dispatch_delay: state.dispatch_delay(),
        });
        for job in &jobs {
            self.observer.on_event(&QueueEvent::StatusChanged {
                id: job.id,
                status: ItemStatus::Queued,
                message: None,
                attempt: 0,
            });
        }

        let worker = self.worker(state.clone(), true);
        let mut tasks = JoinSet::new();

        let mut jobs = jobs.into_iter().peekable();
        while let Some(job) = jobs.next() {
            if state.is_cancelled() {
                break;
            }

            while tasks.len() >= state.concurrency_limit() {
                tokio::select! {
                    joined = tasks.join_next() => Self::log_join(joined),
                    _ = state.cancelled() => break,
                }
            }
            if state.is_cancelled() {
                break;
            }

            let Some(guard) = self.claim(job.id) else {
                debug!("Item {} is already in flight, skipping", job.id);
                continue;
            };
            let worker = worker.clone();
            tasks.spawn(async move {
                let _guard = guard;
                worker.caption_with_retry(job).await;
            });

            if jobs.peek().is_none() {
                break;
            }
            if !state.sleep(state.dispatch_delay()).await {
                break;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::log_join(Some(joined));
        }

        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|current| Arc::ptr_eq(current, &state)) {
                *active = None;
            }
        }

        let cancelled = state.is_cancelled();
        if cancelled {
            info!("Caption run drained after stop");
        } else {
            info!("Caption run finished");
        }
        self.observer.on_event(&QueueEvent::RunFinished { cancelled });
    }

    /// Caption one item again from attempt zero.
    ///
    /// Allowed while a bulk run is active; it never changes that run's
    /// limits. Returns false if the item is already in flight.
    pub async fn regenerate(&self, job: CaptionJob) -> bool {
        let Some(_guard) = self.claim(job.id) else {
            warn!("Item {} is already in flight, not regenerating", job.id);
            return false;
        };
        let worker = self.worker(self.detached_state(), false);
        worker.caption_with_retry(job).await;
        true
    }

    /// Replace the English caption with a translation of `chinese_text`.
    ///
    /// Single attempt, no retries. Returns false if nothing was started.
    pub async fn translate(&self, id: ItemId, chinese_text: &str) -> bool {
        let text = chinese_text.trim();
        if text.is_empty() {
            warn!("Item {} has no Chinese caption to translate", id);
            return false;
        }
        let Some(_guard) = self.claim(id) else {
            warn!("Item {} is already in flight, not translating", id);
            return false;
        };

        let worker = self.worker(self.detached_state(), false);
        worker.emit(QueueEvent::StatusChanged {
            id,
            status: ItemStatus::Translating,
            message: None,
            attempt: 0,
        });

        let result = self.provider.translate(text).await;
        match result {
            Ok(en) => worker.emit(QueueEvent::Translated { id, en: en.trim().to_string() }),
            Err(error) => {
                let kind = ErrorKind::classify(&error);
                warn!("Translation of item {} failed: {}", id, error);
                worker.emit(QueueEvent::StatusChanged {
                    id,
                    status: ItemStatus::Error,
                    message: Some(kind.user_message(&error)),
                    attempt: 0,
                });
            }
        }
        true
    }

    fn dedupe(&self, jobs: Vec<CaptionJob>) -> Vec<CaptionJob> {
        let busy = self.in_flight.lock();
        let mut seen = HashSet::new();
        jobs.into_iter()
            .filter(|job| !busy.contains(&job.id) && seen.insert(job.id))
            .collect()
    }

    fn claim(&self, id: ItemId) -> Option<InFlightGuard> {
        if self.in_flight.lock().insert(id) {
            Some(InFlightGuard { set: self.in_flight.clone(), id })
        } else {
            None
        }
    }

    fn detached_state(&self) -> Arc<QueueRunState> {
        let token = self.detached.lock().child_token();
        Arc::new(QueueRunState::with_cancel_token(&self.profile, token))
    }

    fn worker(&self, state: Arc<QueueRunState>, bulk: bool) -> ItemWorker {
        ItemWorker {
            provider: self.provider.clone(),
            observer: self.observer.clone(),
            policy: self.policy.clone(),
            prompt: self.prompt.clone(),
            state,
            bulk,
        }
    }

    fn log_join(joined: Option<Result<(), tokio::task::JoinError>>) {
        if let Some(Err(e)) = joined {
            error!("Caption task ended abnormally: {}", e);
        }
    }
}

/// Everything one item's retry loop needs, cloned into its task
#[derive(Clone)]
struct ItemWorker {
    provider: Arc<dyn CaptionProvider>,
    observer: Arc<dyn QueueObserver>,
    policy: RetryPolicy,
    prompt: Arc<str>,
    state: Arc<QueueRunState>,
    /// Throttling of a bulk run is published as an event
    bulk: bool,
}

impl ItemWorker {
    /// Publish unless the run was stopped
    fn emit(&self, event: QueueEvent) {
        if !self.state.is_cancelled() {
            self.observer.on_event(&event);
        }
    }

    async fn caption_with_retry(&self, job: CaptionJob) {
        let max = self.policy.max_retries;
        let mut attempt = 0;

        loop {
            if self.state.is_cancelled() {
                return;
            }
            let note = (attempt > 0).then(|| format!("Retrying ({}/{})", attempt, max));
            self.emit(QueueEvent::StatusChanged {
                id: job.id,
                status: ItemStatus::Loading,
                message: note,
                attempt,
            });

            let result = self.provider.caption(&job.payload, &self.prompt).await;
            if self.state.is_cancelled() {
                debug!("Dropping result for item {} after stop", job.id);
                return;
            }

            let error = match result {
                Ok(caption) => {
                    self.emit(QueueEvent::Captioned {
                        id: job.id,
                        en: caption.en.trim().to_string(),
                        zh: caption.zh.trim().to_string(),
                    });
                    return;
                }
                Err(error) => error,
            };

            let kind = ErrorKind::classify(&error);
            if !kind.is_retryable() || !self.policy.can_retry(attempt) {
                warn!("Item {} failed after {} retries: {}", job.id, attempt, error);
                self.emit(QueueEvent::StatusChanged {
                    id: job.id,
                    status: ItemStatus::Error,
                    message: Some(kind.user_message(&error)),
                    attempt,
                });
                return;
            }

            let delay = if kind == ErrorKind::RateLimited {
                self.escalate();
                self.policy.quota_cooldown()
            } else {
                self.policy.backoff(attempt)
            };
            debug!("Item {} attempt {} failed ({:?}): {}; retrying in {:?}", job.id, attempt, kind, error, delay);

            self.emit(QueueEvent::StatusChanged {
                id: job.id,
                status: ItemStatus::Loading,
                message: Some(countdown_message(kind, delay, attempt + 1, max)),
                attempt,
            });
            if !self.state.sleep(delay).await {
                return;
            }
            attempt += 1;
        }
    }

    /// Tighten the run after a quota error
    fn escalate(&self) {
        let before = self.state.snapshot();
        let after = self.state.throttle(self.policy.throttled_concurrency, self.policy.throttled_dispatch_delay);
        if before.concurrency_limit != after.concurrency_limit || before.dispatch_delay != after.dispatch_delay {
            warn!(
                "Quota limit hit, throttling run to {} concurrent request(s) every {:?}",
                after.concurrency_limit, after.dispatch_delay
            );
            if self.bulk {
                self.emit(QueueEvent::Throttled {
                    concurrency_limit: after.concurrency_limit,
                    dispatch_delay: after.dispatch_delay,
                });
            }
        }
    }
}

fn countdown_message(kind: ErrorKind, delay: Duration, next_attempt: u32, max: u32) -> String {
    let seconds = delay.as_secs_f64();
    match kind {
        ErrorKind::RateLimited => format!(
            "Quota limit reached, cooling down {:.0}s before retry {}/{}",
            seconds, next_attempt, max
        ),
        _ => format!("Request failed, retrying in {:.1}s ({}/{})", seconds, next_attempt, max),
    }
}
