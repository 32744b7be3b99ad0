//! Upload queue and scheduler
//!
//! Provides [`UploadQueue`], which owns every [`UploadItem`], admits queued
//! items under a global concurrency bound and drives one transfer task per
//! admitted item.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  enqueue/pause/...  ┌──────────────────────────┐
//! │    caller    │ ──────────────────► │       UploadQueue        │
//! └──────────────┘                     │                          │
//!        ▲                             │  records: Mutex<HashMap> │
//!        │  watch::Receiver            │  admission: FIFO, bound  │
//!        │◄────────────────────────────│                          │
//!        │      QueueSnapshot          └──────────────────────────┘
//!        │                                       │
//!        │                                       │ spawn driver per run
//!        │                                       ▼
//!        │                             ┌──────────────────────────┐
//!        │                             │  driver                  │
//!        │     progress, outcome       │  - transfer::run         │
//!        │◄────────────────────────────│  - TransferEvent channel │
//!        │                             │  - ProgressThrottle      │
//!                                      └──────────────────────────┘
//! ```
//!
//! The record map is the only shared mutable state. Its mutex is never held
//! across an await: drivers are spawned after the admission pass releases
//! it. Every record carries the id of its latest run, and a driver only
//! applies events and outcomes while its run is still the current one.
//! Public operations report whether the requested transition was applied
//! and never surface transfer errors.
//!
//! Drivers and best-effort session deletes run on a [`TaskTracker`], so a
//! caller about to shut the runtime down can wait for them with
//! [`UploadQueue::drain_background`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use docupload_core::domain::{
    ConflictMode, DomainError, ItemId, SessionInfo, TransferMode, UploadItem, UploadSessionId,
    UploadStatus,
};
use docupload_core::ports::{ByteSource, Document, DocumentStore};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::aggregator::{summarize, ProgressSummary};
use crate::config::EngineConfig;
use crate::throttle::ProgressThrottle;
use crate::transfer::{self, TransferContext, TransferEvent};
use crate::TransferError;

// ============================================================================
// QueueSnapshot
// ============================================================================

/// Point-in-time copy of the queue published after every mutation
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    /// Items in enqueue order
    pub items: Vec<UploadItem>,
    /// Aggregate over `items`
    pub summary: ProgressSummary,
}

impl QueueSnapshot {
    /// True when no item is queued or uploading
    pub fn is_idle(&self) -> bool {
        self.summary.counts.queued == 0 && self.summary.counts.uploading == 0
    }
}

// ============================================================================
// Internal state
// ============================================================================

struct Record {
    item: UploadItem,
    source: Arc<dyn ByteSource>,
    /// Position in the queued set; reassigned each time the item re-enters it
    queued_seq: u64,
    /// Latest run started for this item, 0 before the first admission
    run: u64,
    /// Token of the latest run while it may still be active
    cancel: Option<CancellationToken>,
}

#[derive(Default)]
struct QueueState {
    records: HashMap<ItemId, Record>,
    order: Vec<ItemId>,
    next_id: u64,
    next_seq: u64,
    next_run: u64,
}

impl QueueState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn snapshot(&self) -> QueueSnapshot {
        let items: Vec<UploadItem> = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|record| record.item.clone())
            .collect();
        let summary = summarize(&items);
        QueueSnapshot { items, summary }
    }

    /// Returns the record of `id` if its current run is `run`
    fn current(&mut self, id: ItemId, run: u64) -> Option<&mut Record> {
        self.records.get_mut(&id).filter(|record| record.run == run)
    }
}

/// A transfer admitted under the lock, started after it is released
struct Launch {
    id: ItemId,
    run: u64,
    mode: TransferMode,
    ctx: TransferContext,
    events: mpsc::UnboundedReceiver<TransferEvent>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    store: Arc<dyn DocumentStore>,
    config: EngineConfig,
    rt_handle: Handle,
    /// Drivers and session deletes
    background: TaskTracker,
    snapshot_tx: watch::Sender<QueueSnapshot>,
}

// ============================================================================
// UploadQueue
// ============================================================================

/// FIFO upload scheduler with a global concurrency bound
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl UploadQueue {
    /// Creates an empty queue
    ///
    /// # Arguments
    /// * `store` - Document store every transfer talks to
    /// * `config` - Concurrency bound, session threshold and progress interval
    /// * `rt_handle` - Tokio runtime handle for spawning transfer drivers
    pub fn new(store: Arc<dyn DocumentStore>, config: EngineConfig, rt_handle: Handle) -> Self {
        let (snapshot_tx, _) = watch::channel(QueueSnapshot::default());
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                store,
                config,
                rt_handle,
                background: TaskTracker::new(),
                snapshot_tx,
            }),
        }
    }

    /// Returns the engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Adds one item per source and runs admission
    ///
    /// # Returns
    /// The new items as they stand after admission
    pub fn enqueue(
        &self,
        sources: Vec<Arc<dyn ByteSource>>,
        run_options: Option<serde_json::Value>,
    ) -> Vec<UploadItem> {
        let (items, launches) = {
            let mut state = self.inner.lock();
            let mut ids = Vec::with_capacity(sources.len());

            for source in sources {
                state.next_id += 1;
                let id = ItemId::new(state.next_id);
                let item = UploadItem::new(id, source.info(), run_options.clone());
                debug!(
                    item_id = %id,
                    name = %item.source().name,
                    size = item.source().size,
                    "Enqueued upload"
                );
                let queued_seq = state.next_seq();
                state.records.insert(
                    id,
                    Record {
                        item,
                        source,
                        queued_seq,
                        run: 0,
                        cancel: None,
                    },
                );
                state.order.push(id);
                ids.push(id);
            }

            let launches = self.inner.admit(&mut state);
            self.inner.publish(&state);
            let items = ids
                .iter()
                .filter_map(|id| state.records.get(id))
                .map(|record| record.item.clone())
                .collect();
            (items, launches)
        };

        self.inner.start(launches);
        items
    }

    /// Pauses an uploading item
    ///
    /// The in-flight transfer is cancelled. Session items keep their
    /// progress and session; simple items restart from zero on resume.
    pub fn pause(&self, id: ItemId) -> bool {
        self.inner.mutate(id, "pause", |record, _| {
            record.item.pause()?;
            if let Some(token) = record.cancel.take() {
                token.cancel();
            }
            info!(item_id = %id, "Upload paused");
            Ok(())
        })
    }

    /// Re-queues a paused item at the back of the queue
    pub fn resume(&self, id: ItemId) -> bool {
        self.inner.mutate(id, "resume", |record, seq| {
            record.item.resume()?;
            record.queued_seq = seq;
            info!(item_id = %id, "Upload resumed");
            Ok(())
        })
    }

    /// Re-queues a failed item, keeping its idempotency key
    pub fn retry(&self, id: ItemId) -> bool {
        self.inner.mutate(id, "retry", |record, seq| {
            record.item.retry()?;
            record.queued_seq = seq;
            info!(item_id = %id, "Upload retried");
            Ok(())
        })
    }

    /// Re-queues a conflicted item with an explicit resolution
    ///
    /// The item gets a fresh idempotency key and restarts from zero.
    pub fn resolve_conflict(&self, id: ItemId, mode: ConflictMode) -> bool {
        self.inner.mutate(id, "resolve_conflict", |record, seq| {
            record.item.resolve_conflict(mode)?;
            record.queued_seq = seq;
            info!(item_id = %id, conflict_mode = %mode, "Conflict resolved");
            Ok(())
        })
    }

    /// Cancels a non-terminal item
    ///
    /// Any in-flight transfer is stopped and an existing upload session is
    /// deleted on the server in the background.
    pub fn cancel(&self, id: ItemId) -> bool {
        self.inner.mutate(id, "cancel", |record, _| {
            record.item.cancel()?;
            if let Some(token) = record.cancel.take() {
                token.cancel();
            }
            info!(item_id = %id, "Upload cancelled");
            Ok(())
        })
    }

    /// Removes an item in any status
    ///
    /// A non-terminal item is stopped first, as by [`cancel`](Self::cancel).
    pub fn remove(&self, id: ItemId) -> bool {
        let launches = {
            let mut state = self.inner.lock();
            let Some(mut record) = state.records.remove(&id) else {
                debug!(item_id = %id, op = "remove", "Unknown item");
                return false;
            };
            state.order.retain(|other| *other != id);

            if let Some(token) = record.cancel.take() {
                token.cancel();
            }
            if !record.item.status().is_terminal() {
                self.inner.cancel_item_session(&record.item);
            }
            info!(item_id = %id, status = %record.item.status(), "Upload removed");

            let launches = self.inner.admit(&mut state);
            self.inner.publish(&state);
            launches
        };
        self.inner.start(launches);
        true
    }

    /// Removes every succeeded, failed and cancelled item
    ///
    /// # Returns
    /// The number of removed items
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.lock();
        let before = state.records.len();
        state
            .records
            .retain(|_, record| !record.item.status().is_terminal());
        let QueueState { records, order, .. } = &mut *state;
        order.retain(|id| records.contains_key(id));

        let removed = before - state.records.len();
        if removed > 0 {
            debug!(removed, "Cleared completed uploads");
            self.inner.publish(&state);
        }
        removed
    }

    /// Returns a copy of one item
    pub fn get(&self, id: ItemId) -> Option<UploadItem> {
        self.inner
            .lock()
            .records
            .get(&id)
            .map(|record| record.item.clone())
    }

    /// Returns copies of all items in enqueue order
    pub fn items(&self) -> Vec<UploadItem> {
        self.inner.lock().snapshot().items
    }

    /// Aggregates progress and status counts over all items
    pub fn summary(&self) -> ProgressSummary {
        self.inner.lock().snapshot().summary
    }

    /// Subscribes to the snapshots published after every mutation
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Waits until no item is queued or uploading
    ///
    /// Paused and conflicted items do not keep the queue busy.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(QueueSnapshot::is_idle).await;
    }

    /// Waits until every spawned driver and session delete has finished
    ///
    /// Stopped drivers exit at their next cancellation check, so after
    /// cancelling everything this returns once the server-side sessions
    /// have been deleted. Work spawned while waiting is waited for too.
    pub async fn drain_background(&self) {
        let background = &self.inner.background;
        background.close();
        background.wait().await;
        background.reopen();
    }
}

// ============================================================================
// Scheduler internals
// ============================================================================

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &QueueState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    /// Applies `patch` to one record, then re-runs admission
    ///
    /// `patch` receives a fresh queue position for operations that re-queue.
    fn mutate<F>(self: &Arc<Self>, id: ItemId, op: &'static str, patch: F) -> bool
    where
        F: FnOnce(&mut Record, u64) -> Result<(), DomainError>,
    {
        let launches = {
            let mut state = self.lock();
            let seq = state.next_seq();
            let Some(record) = state.records.get_mut(&id) else {
                debug!(item_id = %id, op, "Unknown item");
                return false;
            };
            if let Err(e) = patch(record, seq) {
                debug!(item_id = %id, op, error = %e, "Operation rejected");
                return false;
            }
            if record.item.status() == UploadStatus::Cancelled {
                self.cancel_item_session(&record.item);
            }

            let launches = self.admit(&mut state);
            self.publish(&state);
            launches
        };
        self.start(launches);
        true
    }

    /// Admits queued items in FIFO order while slots are free
    ///
    /// Runs under the lock and never suspends.
    fn admit(&self, state: &mut QueueState) -> Vec<Launch> {
        let uploading = state
            .records
            .values()
            .filter(|record| record.item.status() == UploadStatus::Uploading)
            .count();
        let slots = self.config.concurrency.saturating_sub(uploading);
        if slots == 0 {
            return Vec::new();
        }

        let mut queued: Vec<(u64, ItemId)> = state
            .records
            .values()
            .filter(|record| record.item.status() == UploadStatus::Queued)
            .map(|record| (record.queued_seq, record.item.id()))
            .collect();
        queued.sort_unstable();

        let mut launches = Vec::new();
        for (_, id) in queued.into_iter().take(slots) {
            state.next_run += 1;
            let run = state.next_run;
            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };

            let mode = match record.item.admit(self.config.session_threshold) {
                Ok(mode) => mode,
                Err(e) => {
                    warn!(item_id = %id, error = %e, "Admission rejected");
                    continue;
                }
            };

            let cancel = CancellationToken::new();
            record.run = run;
            record.cancel = Some(cancel.clone());

            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let ctx = TransferContext {
                item_id: id,
                source: Arc::clone(&record.source),
                store: Arc::clone(&self.store),
                idempotency_key: record.item.idempotency_key(),
                conflict_mode: record.item.conflict_mode(),
                run_options: record.item.run_options().cloned(),
                session: record.item.session().cloned(),
                cancel,
                events: events_tx,
            };

            info!(item_id = %id, mode = %mode, run, "Upload started");
            launches.push(Launch {
                id,
                run,
                mode,
                ctx,
                events: events_rx,
            });
        }
        launches
    }

    fn start(self: &Arc<Self>, launches: Vec<Launch>) {
        for launch in launches {
            let inner = Arc::clone(self);
            self.background
                .spawn_on(async move { inner.drive(launch).await }, &self.rt_handle);
        }
    }

    /// Deletes the item's upload session, if it has one
    fn cancel_item_session(&self, item: &UploadItem) {
        if let Some(session) = item.session() {
            self.cancel_remote_session(item.id(), session.session_id.clone());
        }
    }

    /// Deletes an upload session without waiting for the result
    fn cancel_remote_session(&self, item_id: ItemId, session_id: UploadSessionId) {
        let store = Arc::clone(&self.store);
        let delete = async move {
            match store.cancel_session(&session_id).await {
                Ok(()) => debug!(item_id = %item_id, session_id = %session_id, "Upload session deleted"),
                Err(e) => warn!(
                    item_id = %item_id,
                    session_id = %session_id,
                    error = %e,
                    "Failed to delete upload session"
                ),
            }
        };
        self.background.spawn_on(delete, &self.rt_handle);
    }

    // ------------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------------

    /// Runs one transfer and applies its events and outcome
    async fn drive(self: Arc<Self>, launch: Launch) {
        let Launch {
            id,
            run,
            mode,
            ctx,
            mut events,
        } = launch;
        let mut throttle = ProgressThrottle::new(self.config.progress_interval);

        let transfer = transfer::run(mode, ctx);
        tokio::pin!(transfer);

        let outcome = loop {
            let deadline = throttle.deadline();
            tokio::select! {
                outcome = &mut transfer => break outcome,
                Some(event) = events.recv() => self.on_event(id, run, event, &mut throttle),
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(loaded) = throttle.flush(Instant::now()) {
                        self.apply_progress(id, run, loaded);
                    }
                }
            }
        };

        while let Ok(event) = events.try_recv() {
            self.on_event(id, run, event, &mut throttle);
        }
        if let Some(loaded) = throttle.flush(Instant::now()) {
            self.apply_progress(id, run, loaded);
        }

        self.finish(id, run, outcome);
    }

    fn on_event(&self, id: ItemId, run: u64, event: TransferEvent, throttle: &mut ProgressThrottle) {
        match event {
            TransferEvent::Progress(loaded) => {
                if let Some(loaded) = throttle.offer(loaded, Instant::now()) {
                    self.apply_progress(id, run, loaded);
                }
            }
            TransferEvent::Reconciled(received) => {
                throttle.discard();
                let mut state = self.lock();
                if let Some(record) = state.current(id, run) {
                    if record.item.status() == UploadStatus::Uploading {
                        record.item.reconcile_progress(received);
                        self.publish(&state);
                    }
                }
            }
            TransferEvent::SessionAssigned(session) => self.apply_session(id, run, Some(session)),
            TransferEvent::SessionCleared => self.apply_session(id, run, None),
        }
    }

    fn apply_progress(&self, id: ItemId, run: u64, loaded: u64) {
        let mut state = self.lock();
        if let Some(record) = state.current(id, run) {
            if record.item.status() == UploadStatus::Uploading && record.item.advance_progress(loaded)
            {
                self.publish(&state);
            }
        }
    }

    /// Records the run's session on its item
    ///
    /// Changes of a paused run are kept so resume can use them. A session
    /// created for an item that was cancelled or removed meanwhile is
    /// deleted, since nothing else knows about it.
    fn apply_session(&self, id: ItemId, run: u64, session: Option<SessionInfo>) {
        let mut state = self.lock();
        if !state.records.contains_key(&id) {
            if let Some(session) = session {
                debug!(
                    item_id = %id,
                    session_id = %session.session_id,
                    "Session created for removed item"
                );
                self.cancel_remote_session(id, session.session_id);
            }
            return;
        }
        let Some(record) = state.current(id, run) else {
            return;
        };

        match record.item.status() {
            UploadStatus::Uploading | UploadStatus::Paused => {
                match record.item.set_session(session) {
                    Ok(()) => self.publish(&state),
                    Err(e) => warn!(item_id = %id, error = %e, "Ignoring session update"),
                }
            }
            UploadStatus::Cancelled => {
                if let Some(session) = session {
                    self.cancel_remote_session(id, session.session_id);
                }
            }
            _ => {}
        }
    }

    /// Applies a transfer outcome and re-runs admission
    fn finish(self: &Arc<Self>, id: ItemId, run: u64, outcome: Result<Document, TransferError>) {
        let launches = {
            let mut state = self.lock();
            if let Some(record) = state.current(id, run) {
                record.cancel = None;
                apply_outcome(&mut record.item, outcome);
            }
            let launches = self.admit(&mut state);
            self.publish(&state);
            launches
        };
        self.start(launches);
    }
}

/// Maps a transfer outcome onto the item's state machine
///
/// Outcomes of runs that were paused or cancelled meanwhile are dropped.
fn apply_outcome(item: &mut UploadItem, outcome: Result<Document, TransferError>) {
    let id = item.id();
    if item.status() != UploadStatus::Uploading {
        debug!(item_id = %id, status = %item.status(), "Dropping outcome of stopped transfer");
        return;
    }

    let result = match outcome {
        Ok(document) => item.mark_succeeded(document).map(|()| {
            info!(item_id = %id, "Upload succeeded");
        }),
        Err(TransferError::Conflict(message)) => {
            info!(item_id = %id, reason = %message, "Upload conflicted");
            item.mark_conflict(message)
        }
        Err(err) => {
            info!(item_id = %id, error = %err, "Upload failed");
            item.mark_failed(err.to_string())
        }
    };
    if let Err(e) = result {
        warn!(item_id = %id, error = %e, "Could not apply transfer outcome");
    }
}

// ============================================================================
// Tests
// ============================================================================
