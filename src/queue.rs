//! Sequential upload queue.
//!
//! Uploaded files are pushed onto an explicit FIFO and consumed by a single
//! worker, one at a time, so the external API never sees more than one
//! request from this queue at once.
//!
//! # Item lifecycle
//! `queued → processing → success | error`. Items are never re-queued; a
//! retry is a new upload.
//!
//! # Policies
//! - [`QueuePolicy::HaltOnError`]: the first failure marks every remaining
//!   queued item as failed with [`HALTED_MESSAGE`] and the queue stops
//!   advancing until it is cleared.
//! - [`QueuePolicy::ContinueOnError`]: a failure only affects its own item.
//!
//! # Concurrency
//! All mutations go through [`UploadQueue`] behind a mutex and address items
//! by their stable [`ItemId`]. The lock is never held across a remote call,
//! so removing an item that is being processed returns immediately; the late
//! completion for that item is dropped.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contract::ItemProcessor;
use crate::metadata::GenerationResult;

pub type ItemId = Uuid;

pub const HALTED_MESSAGE: &str = "Processing halted due to a previous error.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Processing,
    Success,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueuePolicy {
    HaltOnError,
    #[default]
    ContinueOnError,
}

/// The part of a queue item handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFile {
    pub id: ItemId,
    pub path: PathBuf,
    /// File name shown to the user and written to the CSV export.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub file: QueuedFile,
    pub status: ItemStatus,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub queued: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Queue state. Pure bookkeeping; no I/O happens here.
#[derive(Debug)]
pub struct UploadQueue {
    policy: QueuePolicy,
    items: Vec<QueueItem>,
    pending: VecDeque<ItemId>,
    in_flight: Option<ItemId>,
    halted: bool,
}

impl UploadQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            items: Vec::new(),
            pending: VecDeque::new(),
            in_flight: None,
            halted: false,
        }
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Adds a file at the back of the queue.
    ///
    /// A halted queue accepts the file but fails it straight away with
    /// [`HALTED_MESSAGE`]; only `clear` resumes processing.
    pub fn enqueue(&mut self, path: PathBuf) -> ItemId {
        let id = Uuid::new_v4();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = QueuedFile { id, path, name };
        if self.halted {
            warn!(item = %id, file = %file.name, "[QUEUE] Queue is halted; failing new item");
            self.items.push(QueueItem {
                file,
                status: ItemStatus::Error,
                result: None,
                error: Some(HALTED_MESSAGE.to_string()),
            });
            return id;
        }
        debug!(item = %id, file = %file.name, "[QUEUE] Enqueued file");
        self.items.push(QueueItem {
            file,
            status: ItemStatus::Queued,
            result: None,
            error: None,
        });
        self.pending.push_back(id);
        id
    }

    /// Moves the oldest queued item to `processing` and returns it.
    ///
    /// Returns `None` while another item is in flight, after a halt, or
    /// when nothing is queued.
    pub fn start_next(&mut self) -> Option<QueuedFile> {
        if self.in_flight.is_some() || self.halted {
            return None;
        }
        while let Some(id) = self.pending.pop_front() {
            let Some(item) = self.items.iter_mut().find(|i| i.file.id == id) else {
                continue;
            };
            if item.status != ItemStatus::Queued {
                continue;
            }
            item.status = ItemStatus::Processing;
            self.in_flight = Some(id);
            return Some(item.file.clone());
        }
        None
    }

    /// Records the outcome of the in-flight item.
    ///
    /// Returns `false` when `id` is not the in-flight item (for example
    /// because it was removed meanwhile); the outcome is then discarded.
    pub fn complete(&mut self, id: ItemId, outcome: Result<GenerationResult, String>) -> bool {
        if self.in_flight != Some(id) {
            debug!(item = %id, "[QUEUE] Dropping completion for item no longer in flight");
            return false;
        }
        self.in_flight = None;
        let Some(item) = self.items.iter_mut().find(|i| i.file.id == id) else {
            return false;
        };
        match outcome {
            Ok(result) => {
                item.status = ItemStatus::Success;
                item.result = Some(result);
            }
            Err(message) => {
                item.status = ItemStatus::Error;
                item.error = Some(message);
                if self.policy == QueuePolicy::HaltOnError {
                    self.halt();
                }
            }
        }
        true
    }

    fn halt(&mut self) {
        let halted: Vec<ItemId> = self.pending.drain(..).collect();
        for item in self
            .items
            .iter_mut()
            .filter(|i| i.status == ItemStatus::Queued && halted.contains(&i.file.id))
        {
            item.status = ItemStatus::Error;
            item.error = Some(HALTED_MESSAGE.to_string());
        }
        self.halted = true;
        warn!(halted = halted.len(), "[QUEUE] Halting after error");
    }

    /// Removes an item in any state. Idempotent.
    pub fn remove(&mut self, id: ItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.file.id != id);
        self.pending.retain(|p| *p != id);
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
        before != self.items.len()
    }

    /// Drops every item and lifts a halt.
    pub fn clear(&mut self) {
        self.items.clear();
        self.pending.clear();
        self.in_flight = None;
        self.halted = false;
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn get(&self, id: ItemId) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.file.id == id)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary::default();
        for item in &self.items {
            match item.status {
                ItemStatus::Queued => summary.queued += 1,
                ItemStatus::Processing => summary.processing += 1,
                ItemStatus::Success => summary.succeeded += 1,
                ItemStatus::Error => summary.failed += 1,
            }
        }
        summary
    }
}

pub type SharedQueue = Arc<Mutex<UploadQueue>>;

pub fn shared(policy: QueuePolicy) -> SharedQueue {
    Arc::new(Mutex::new(UploadQueue::new(policy)))
}

fn lock(queue: &SharedQueue) -> MutexGuard<'_, UploadQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives a queue through an [`ItemProcessor`], one item at a time.
#[derive(Clone)]
pub struct QueueRunner {
    queue: SharedQueue,
    processor: Arc<dyn ItemProcessor>,
}

impl QueueRunner {
    pub fn new(queue: SharedQueue, processor: Arc<dyn ItemProcessor>) -> Self {
        Self { queue, processor }
    }

    /// Processes queued items until none can be started. Returns how many
    /// items were handed to the processor.
    pub async fn run_until_idle(&self) -> usize {
        let mut started = 0;
        loop {
            let next = lock(&self.queue).start_next();
            let Some(file) = next else {
                break;
            };
            started += 1;
            info!(item = %file.id, file = %file.name, "[QUEUE] Processing item");

            let id = file.id;
            let name = file.name.clone();
            let outcome = self.processor.process(file).await;
            match &outcome {
                Ok(_) => info!(item = %id, file = %name, "[QUEUE] Item succeeded"),
                Err(e) => error!(item = %id, file = %name, error = %e, "[QUEUE][ERROR] Item failed"),
            }
            let recorded = lock(&self.queue).complete(id, outcome);
            if !recorded {
                info!(item = %id, "[QUEUE] Item was removed while processing");
            }
        }
        let summary = lock(&self.queue).summary();
        info!(
            started,
            succeeded = summary.succeeded,
            failed = summary.failed,
            queued = summary.queued,
            "[QUEUE] Idle"
        );
        started
    }
}

enum QueueEvent {
    Submitted,
    Shutdown,
}

/// Handle to a background worker started by [`spawn_worker`].
#[derive(Clone)]
pub struct QueueHandle {
    queue: SharedQueue,
    events: mpsc::UnboundedSender<QueueEvent>,
}

impl QueueHandle {
    /// Enqueues a file and wakes the worker.
    pub fn submit(&self, path: PathBuf) -> ItemId {
        let id = lock(&self.queue).enqueue(path);
        if self.events.send(QueueEvent::Submitted).is_err() {
            warn!(item = %id, "[QUEUE] Worker has stopped; item stays queued");
        }
        id
    }

    /// Enqueues a whole batch under one lock, then wakes the worker once.
    pub fn submit_all(&self, paths: impl IntoIterator<Item = PathBuf>) -> Vec<ItemId> {
        let ids: Vec<ItemId> = {
            let mut queue = lock(&self.queue);
            paths.into_iter().map(|path| queue.enqueue(path)).collect()
        };
        if self.events.send(QueueEvent::Submitted).is_err() {
            warn!(items = ids.len(), "[QUEUE] Worker has stopped; batch stays queued");
        }
        ids
    }

    pub fn remove(&self, id: ItemId) -> bool {
        lock(&self.queue).remove(id)
    }

    /// Clears the batch; also resumes a halted queue for future submissions.
    pub fn clear(&self) {
        lock(&self.queue).clear();
    }

    pub fn snapshot(&self) -> Vec<QueueItem> {
        lock(&self.queue).items().to_vec()
    }

    pub fn summary(&self) -> QueueSummary {
        lock(&self.queue).summary()
    }

    /// Asks the worker to stop after the item it is working on.
    pub fn shutdown(&self) {
        let _ = self.events.send(QueueEvent::Shutdown);
    }
}

/// Starts the single worker that consumes submit events.
pub fn spawn_worker(
    queue: SharedQueue,
    processor: Arc<dyn ItemProcessor>,
) -> (QueueHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = QueueRunner::new(queue.clone(), processor);
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                QueueEvent::Submitted => {
                    runner.run_until_idle().await;
                }
                QueueEvent::Shutdown => {
                    info!("[QUEUE] Worker shutting down");
                    break;
                }
            }
        }
    });
    (QueueHandle { queue, events: tx }, task)
}
