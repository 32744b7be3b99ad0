//! In-memory document store for engine tests
//!
//! Models the server side of both upload paths closely enough to exercise
//! resume, expiry and conflict handling: sessions track their received byte
//! count, ranges must arrive in order, and failures can be queued per
//! operation. Optional semaphores hold uploads mid-flight so tests can
//! observe and interrupt them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docupload_core::domain::{ConflictMode, IdempotencyKey, SessionInfo, UploadSessionId};
use docupload_core::ports::{
    ByteSource, CreateSessionRequest, Document, DocumentStore, ProgressFn, RangeAck,
    SessionCreated, SessionStatus, SimpleUploadRequest, StoreError,
};
use tokio::sync::Semaphore;

/// One recorded store call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Simple {
        key: IdempotencyKey,
        conflict_mode: Option<ConflictMode>,
        run_options: Option<serde_json::Value>,
    },
    Create {
        key: IdempotencyKey,
        conflict_mode: Option<ConflictMode>,
    },
    Status {
        sid: String,
    },
    Range {
        sid: String,
        start: u64,
        len: u64,
    },
    Commit {
        sid: String,
    },
    Cancel {
        sid: String,
    },
}

struct FakeSession {
    filename: String,
    total: u64,
    received: u64,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    sessions: HashMap<String, FakeSession>,
    next_session: u64,
    next_document: u64,
    simple_failures: VecDeque<StoreError>,
    create_failures: VecDeque<StoreError>,
    status_failures: VecDeque<StoreError>,
    range_failures: VecDeque<StoreError>,
    commit_failures: VecDeque<StoreError>,
    create_response: Option<SessionCreated>,
}

/// Callback run when a create request is answered
type CreateHook = Box<dyn Fn() + Send + Sync>;

/// Scripted [`DocumentStore`]
pub struct FakeStore {
    chunk_size: u64,
    state: Mutex<FakeState>,
    create_hook: Mutex<Option<CreateHook>>,
    simple_gate: Mutex<Option<Arc<Semaphore>>>,
    range_gate: Mutex<Option<Arc<Semaphore>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Counts an upload as active until dropped
struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, max_active: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeStore {
    /// Creates a store that hands out sessions with `chunk_size` byte chunks
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            state: Mutex::new(FakeState::default()),
            create_hook: Mutex::new(None),
            simple_gate: Mutex::new(None),
            range_gate: Mutex::new(None),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    // ------------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------------

    /// Holds every simple upload after its first progress report until a
    /// permit is added to the returned semaphore
    pub fn gate_simple(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.simple_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Holds every range upload until a permit is added
    pub fn gate_ranges(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.range_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_next_simple(&self, err: StoreError) {
        self.state().simple_failures.push_back(err);
    }

    pub fn fail_next_create(&self, err: StoreError) {
        self.state().create_failures.push_back(err);
    }

    pub fn fail_next_status(&self, err: StoreError) {
        self.state().status_failures.push_back(err);
    }

    pub fn fail_next_range(&self, err: StoreError) {
        self.state().range_failures.push_back(err);
    }

    pub fn fail_next_commit(&self, err: StoreError) {
        self.state().commit_failures.push_back(err);
    }

    /// Answers the next create with `response` instead of a real session
    pub fn set_create_response(&self, response: SessionCreated) {
        self.state().create_response = Some(response);
    }

    /// Runs `hook` after a session was created, just before the response
    /// reaches the caller
    pub fn on_create(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.create_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Registers a session that already holds `received` bytes
    pub fn seed_session(&self, total: u64, received: u64) -> SessionInfo {
        let mut state = self.state();
        state.next_session += 1;
        let sid = format!("seeded-{}", state.next_session);
        state.sessions.insert(
            sid.clone(),
            FakeSession {
                filename: "seeded".to_string(),
                total,
                received,
            },
        );
        SessionInfo {
            session_id: UploadSessionId::new(sid).unwrap(),
            chunk_size_bytes: self.chunk_size,
            next_expected_ranges: vec![format!("{received}-")],
        }
    }

    /// Forgets every session, as if the server expired them
    pub fn expire_sessions(&self) {
        self.state().sessions.clear();
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn range_starts(&self) -> Vec<u64> {
        self.ranges().into_iter().map(|(start, _)| start).collect()
    }

    pub fn range_lens(&self) -> Vec<u64> {
        self.ranges().into_iter().map(|(_, len)| len).collect()
    }

    fn ranges(&self) -> Vec<(u64, u64)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Range { start, len, .. } => Some((*start, *len)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn simple_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Simple { .. }))
    }

    pub fn create_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Create { .. }))
    }

    pub fn commit_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Commit { .. }))
    }

    pub fn cancel_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Cancel { .. }))
    }

    /// Number of sessions the server still holds
    pub fn open_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    /// Highest number of uploads that were in flight at the same time
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn document(&self, filename: &str) -> Document {
        let mut state = self.state();
        state.next_document += 1;
        serde_json::json!({
            "id": format!("doc-{}", state.next_document),
            "name": filename,
        })
    }
}

async fn pass_gate(gate: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn upload_simple(
        &self,
        request: &SimpleUploadRequest,
        source: Arc<dyn ByteSource>,
        progress: ProgressFn,
    ) -> Result<Document, StoreError> {
        let _active = ActiveGuard::enter(&self.active, &self.max_active);
        {
            let mut state = self.state();
            state.calls.push(Call::Simple {
                key: request.idempotency_key,
                conflict_mode: request.conflict_mode,
                run_options: request.run_options.clone(),
            });
            if let Some(err) = state.simple_failures.pop_front() {
                return Err(err);
            }
        }

        let size = source.size();
        progress(size / 2);
        pass_gate(&self.simple_gate).await;

        source.slice(0, size).await?;
        progress(size);
        Ok(self.document(&request.filename))
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionCreated, StoreError> {
        let sid = {
            let mut state = self.state();
            state.calls.push(Call::Create {
                key: request.idempotency_key,
                conflict_mode: request.conflict_mode,
            });
            if let Some(err) = state.create_failures.pop_front() {
                return Err(err);
            }
            if let Some(response) = state.create_response.take() {
                return Ok(response);
            }

            state.next_session += 1;
            let sid = format!("s-{}", state.next_session);
            state.sessions.insert(
                sid.clone(),
                FakeSession {
                    filename: request.filename.clone(),
                    total: request.byte_size,
                    received: 0,
                },
            );
            sid
        };

        if let Some(hook) = self.create_hook.lock().unwrap().as_ref() {
            hook();
        }
        Ok(SessionCreated {
            upload_session_id: Some(sid),
            chunk_size_bytes: Some(self.chunk_size),
            next_expected_ranges: vec!["0-".to_string()],
        })
    }

    async fn session_status(
        &self,
        session_id: &UploadSessionId,
    ) -> Result<SessionStatus, StoreError> {
        let mut state = self.state();
        state.calls.push(Call::Status {
            sid: session_id.to_string(),
        });
        if let Some(err) = state.status_failures.pop_front() {
            return Err(err);
        }
        match state.sessions.get(session_id.as_str()) {
            Some(session) => Ok(SessionStatus {
                received_bytes: session.received,
                next_expected_ranges: vec![format!("{}-", session.received)],
            }),
            None => Err(StoreError::NotFound(format!("session {session_id}"))),
        }
    }

    async fn upload_range(
        &self,
        session_id: &UploadSessionId,
        start: u64,
        total: u64,
        data: Vec<u8>,
    ) -> Result<RangeAck, StoreError> {
        let _active = ActiveGuard::enter(&self.active, &self.max_active);
        pass_gate(&self.range_gate).await;

        let mut state = self.state();
        let len = data.len() as u64;
        state.calls.push(Call::Range {
            sid: session_id.to_string(),
            start,
            len,
        });
        if let Some(err) = state.range_failures.pop_front() {
            return Err(err);
        }

        let session = state
            .sessions
            .get_mut(session_id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
        if start != session.received || total != session.total || len > self.chunk_size {
            return Err(StoreError::Status {
                status: 416,
                message: format!("expected offset {}", session.received),
            });
        }
        session.received += len;
        Ok(RangeAck {
            next_expected_ranges: vec![format!("{}-", session.received)],
        })
    }

    async fn commit_session(&self, session_id: &UploadSessionId) -> Result<Document, StoreError> {
        let filename = {
            let mut state = self.state();
            state.calls.push(Call::Commit {
                sid: session_id.to_string(),
            });
            if let Some(err) = state.commit_failures.pop_front() {
                return Err(err);
            }
            let session = state
                .sessions
                .remove(session_id.as_str())
                .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
            if session.received != session.total {
                return Err(StoreError::Status {
                    status: 400,
                    message: format!("{} of {} bytes", session.received, session.total),
                });
            }
            session.filename
        };
        Ok(self.document(&filename))
    }

    async fn cancel_session(&self, session_id: &UploadSessionId) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(Call::Cancel {
            sid: session_id.to_string(),
        });
        state.sessions.remove(session_id.as_str());
        Ok(())
    }
}
