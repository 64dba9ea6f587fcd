/*!
 * Item store: the in-memory list of images and their captions.
 *
 * The queue engine writes status and caption results through the
 * [`QueueObserver`] implementation; users edit caption text and delete
 * items through the methods on [`ItemStore`]. Every write addressed to an
 * id that is no longer present is silently dropped.
 */

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::queue::{CaptionJob, QueueEvent, QueueObserver};

/// Stable identifier of a work item
pub type ItemId = Uuid;

/// Raw image bytes plus the MIME type they were detected as
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Processing status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Idle,
    Queued,
    Loading,
    Success,
    Error,
    Translating,
}

impl ItemStatus {
    /// A request for this item is currently outstanding
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Loading | Self::Translating)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
            Self::Translating => "translating",
        };
        f.write_str(name)
    }
}

/// One image and its captioning state
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: ItemId,
    /// Where the image came from, used to name exported files
    pub source_path: PathBuf,
    pub payload: ImagePayload,
    pub status: ItemStatus,
    pub caption_en: String,
    pub caption_zh: String,
    /// Last failure reason, or the progress note of a retrying item
    pub error_message: Option<String>,
    /// Retries used by the current attempt chain
    pub attempt_count: u32,
}

impl WorkItem {
    pub fn new(source_path: impl Into<PathBuf>, payload: ImagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path: source_path.into(),
            payload,
            status: ItemStatus::Idle,
            caption_en: String::new(),
            caption_zh: String::new(),
            error_message: None,
            attempt_count: 0,
        }
    }

    /// Job description handed to the queue engine
    pub fn job(&self) -> CaptionJob {
        CaptionJob {
            id: self.id,
            payload: self.payload.clone(),
        }
    }
}

/// Thread-safe, insertion-ordered collection of work items
#[derive(Debug, Default)]
pub struct ItemStore {
    items: RwLock<Vec<WorkItem>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, item: WorkItem) -> ItemId {
        let id = item.id;
        self.items.write().push(item);
        id
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<WorkItem> {
        self.items.read().iter().find(|item| item.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.items.read().clone()
    }

    /// Remove an item, releasing its image bytes. In-flight requests for it
    /// keep running but their results are dropped.
    pub fn remove(&self, id: ItemId) -> Option<WorkItem> {
        let mut items = self.items.write();
        let index = items.iter().position(|item| item.id == id)?;
        Some(items.remove(index))
    }

    /// Remove every item
    pub fn clear(&self) -> usize {
        let mut items = self.items.write();
        let count = items.len();
        items.clear();
        count
    }

    /// Jobs for every item not currently in flight
    pub fn pending_jobs(&self) -> Vec<CaptionJob> {
        self.items.read().iter()
            .filter(|item| !item.status.is_in_flight())
            .map(WorkItem::job)
            .collect()
    }

    /// Jobs for items that have never succeeded
    pub fn uncaptioned_jobs(&self) -> Vec<CaptionJob> {
        self.items.read().iter()
            .filter(|item| matches!(item.status, ItemStatus::Idle | ItemStatus::Error))
            .map(WorkItem::job)
            .collect()
    }

    /// Number of items per status
    pub fn counts(&self) -> HashMap<ItemStatus, usize> {
        let mut counts = HashMap::new();
        for item in self.items.read().iter() {
            *counts.entry(item.status).or_insert(0) += 1;
        }
        counts
    }

    /// User edit of the caption text. Refused while a request for the item is outstanding.
    pub fn edit_caption(&self, id: ItemId, en: Option<String>, zh: Option<String>) -> Result<(), StoreError> {
        let mut items = self.items.write();
        let item = items.iter_mut()
            .find(|item| item.id == id)
            .ok_or(StoreError::NotFound(id))?;

        if item.status.is_in_flight() {
            return Err(StoreError::InFlight(id));
        }
        if let Some(en) = en {
            item.caption_en = en;
        }
        if let Some(zh) = zh {
            item.caption_zh = zh;
        }
        Ok(())
    }

    /// Put items left queued or in flight by a stopped run back to idle
    pub fn reset_interrupted(&self) -> usize {
        let mut reset = 0;
        for item in self.items.write().iter_mut() {
            if matches!(item.status, ItemStatus::Queued) || item.status.is_in_flight() {
                item.status = ItemStatus::Idle;
                item.error_message = None;
                reset += 1;
            }
        }
        reset
    }

    /// Engine callback: new status. Returns false when the item is gone.
    pub fn update_status(&self, id: ItemId, status: ItemStatus, message: Option<String>) -> bool {
        self.with_item(id, |item| {
            item.status = status;
            item.error_message = message;
        })
    }

    /// Engine callback: captions produced. Returns false when the item is gone.
    pub fn update_result(&self, id: ItemId, en: String, zh: String) -> bool {
        self.with_item(id, |item| {
            item.caption_en = en;
            item.caption_zh = zh;
        })
    }

    fn with_item(&self, id: ItemId, f: impl FnOnce(&mut WorkItem)) -> bool {
        let mut items = self.items.write();
        match items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        }
    }

    /// Apply one engine event
    pub fn apply(&self, event: &QueueEvent) {
        match event {
            QueueEvent::StatusChanged { id, status, message, attempt } => {
                self.with_item(*id, |item| {
                    item.status = *status;
                    item.error_message = message.clone();
                    item.attempt_count = *attempt;
                });
            }
            QueueEvent::Captioned { id, en, zh } => {
                self.with_item(*id, |item| {
                    item.caption_en = en.clone();
                    item.caption_zh = zh.clone();
                    item.status = ItemStatus::Success;
                    item.error_message = None;
                });
            }
            QueueEvent::Translated { id, en } => {
                self.with_item(*id, |item| {
                    item.caption_en = en.clone();
                    item.status = ItemStatus::Success;
                    item.error_message = None;
                });
            }
            QueueEvent::RunStarted { .. } | QueueEvent::Throttled { .. } | QueueEvent::RunFinished { .. } => {}
        }
    }
}

impl QueueObserver for ItemStore {
    fn on_event(&self, event: &QueueEvent) {
        self.apply(event);
    }
}
