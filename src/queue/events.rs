/*!
 * Events published by the caption queue.
 */

use std::time::Duration;

use crate::store::{ItemId, ItemStatus};

/// Something observable happened inside the queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// A bulk run accepted its input and is about to dispatch
    RunStarted {
        items: usize,
        concurrency_limit: usize,
        dispatch_delay: Duration,
    },
    /// An item moved to a new status. `message` carries the progress note
    /// while retrying and the failure reason on `Error`.
    StatusChanged {
        id: ItemId,
        status: ItemStatus,
        message: Option<String>,
        attempt: u32,
    },
    /// Captioning finished; the item is now `Success`
    Captioned { id: ItemId, en: String, zh: String },
    /// Chinese to English sync finished; the item is now `Success`
    Translated { id: ItemId, en: String },
    /// A quota error tightened the run limits for the rest of the run
    Throttled {
        concurrency_limit: usize,
        dispatch_delay: Duration,
    },
    /// The dispatch loop drained
    RunFinished { cancelled: bool },
}

impl QueueEvent {
    /// Item the event refers to, if any
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::StatusChanged { id, .. } | Self::Captioned { id, .. } | Self::Translated { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Receiver of queue events.
///
/// Implementations must tolerate events for items they no longer know.
pub trait QueueObserver: Send + Sync {
    fn on_event(&self, event: &QueueEvent);
}

/// Forwards every event to several observers in order
#[derive(Default)]
pub struct Fanout {
    observers: Vec<std::sync::Arc<dyn QueueObserver>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: std::sync::Arc<dyn QueueObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl QueueObserver for Fanout {
    fn on_event(&self, event: &QueueEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
