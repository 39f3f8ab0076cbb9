//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::DuplicatePolicy;
use crate::error::AppError;
use crate::fetch_error::FetchError;
use crate::models::{DigestSet, FetchedResponse, HashAlgo, QueueEntry, ResponseRecord};
use crate::sequence::Seq;
use crate::surt::surt;
use crate::traits::{EnqueueOutcome, Fetcher, QueueStore, ResponseStore};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that replays a list of canned results.
#[derive(Clone)]
pub struct MockFetcher {
    /// Each call pops the first element. If empty, returns an empty 200.
    responses: Arc<Mutex<Vec<Result<FetchedResponse, FetchError>>>>,
    /// URLs that fail with the given error on every attempt.
    failing: Arc<Mutex<HashMap<String, FetchError>>>,
    /// Recorded `(url, client)` pairs.
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockFetcher {
    pub fn with_responses(responses: Vec<Result<FetchedResponse, FetchError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            failing: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every fetch of `url` fails with `error`, without consuming a canned result.
    pub fn always_failing(self, url: &str, error: FetchError) -> Self {
        self.failing.lock().unwrap().insert(url.to_string(), error);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, client: &str) -> Result<FetchedResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), client.to_string()));

        if let Some(error) = self.failing.lock().unwrap().get(url) {
            return Err(*error);
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(FetchedResponse {
                status: 200,
                content_type: String::new(),
                length: 0,
                digests: DigestSet::new(),
            })
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<Seq, ResponseRecord>,
    queue: BTreeMap<Seq, QueueEntry>,
    high_water: u64,
}

impl MemoryState {
    fn insert_record(&mut self, record: &ResponseRecord) -> Result<(), AppError> {
        surt(&record.url)?;
        if self.records.contains_key(&record.seq) {
            return Err(AppError::Conflict {
                time: record.seq.time,
                id: record.seq.id,
            });
        }
        self.records.insert(record.seq, record.clone());
        self.high_water = self.high_water.max(record.seq.id);
        Ok(())
    }
}

/// In-memory store implementing both store traits with the same
/// all-or-nothing semantics as the real database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    commit_error: Arc<Mutex<Option<AppError>>>,
    enqueue_error: Arc<Mutex<Option<AppError>>>,
    read_error: Arc<Mutex<Option<AppError>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `commit_fetch` fails with `error` and changes nothing.
    pub fn fail_next_commit(&self, error: AppError) {
        *self.commit_error.lock().unwrap() = Some(error);
    }

    /// The next `put_queue_entry` fails with `error`.
    pub fn fail_next_enqueue(&self, error: AppError) {
        *self.enqueue_error.lock().unwrap() = Some(error);
    }

    /// The next URL or hash lookup fails with `error`.
    pub fn fail_next_read(&self, error: AppError) {
        *self.read_error.lock().unwrap() = Some(error);
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    fn take_read_error(&self) -> Result<(), AppError> {
        match self.read_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl ResponseStore for MemoryStore {
    async fn put_response(&self, record: &ResponseRecord) -> Result<(), AppError> {
        self.state.lock().unwrap().insert_record(record)
    }

    async fn responses_by_url(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<Vec<ResponseRecord>, AppError> {
        self.take_read_error()?;
        let key = surt(url)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .values()
            .rev()
            .filter(|r| surt(&r.url).is_ok_and(|s| s == key))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn responses_by_hash(
        &self,
        algo: HashAlgo,
        digest: &[u8],
        limit: usize,
    ) -> Result<Vec<ResponseRecord>, AppError> {
        self.take_read_error()?;
        if digest.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .values()
            .rev()
            .filter(|r| r.digests.get(algo) == digest)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn responses_after(
        &self,
        after: Option<Seq>,
        limit: usize,
    ) -> Result<Vec<ResponseRecord>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .values()
            .filter(|r| after.is_none_or(|a| r.seq > a))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn sequence_high_water(&self) -> Result<u64, AppError> {
        Ok(self.state.lock().unwrap().high_water)
    }
}

impl QueueStore for MemoryStore {
    async fn put_queue_entry(
        &self,
        entry: &QueueEntry,
        policy: DuplicatePolicy,
    ) -> Result<EnqueueOutcome, AppError> {
        if let Some(e) = self.enqueue_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut state = self.state.lock().unwrap();
        if policy == DuplicatePolicy::SkipQueued && state.queue.values().any(|q| q.url == entry.url)
        {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }
        if state.queue.contains_key(&entry.seq) {
            return Err(AppError::Conflict {
                time: entry.seq.time,
                id: entry.seq.id,
            });
        }
        state.queue.insert(entry.seq, entry.clone());
        state.high_water = state.high_water.max(entry.seq.id);
        Ok(EnqueueOutcome::Queued)
    }

    async fn next_queue_entry(&self, after: Option<Seq>) -> Result<Option<QueueEntry>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .queue
            .values()
            .find(|q| after.is_none_or(|a| q.seq > a))
            .cloned())
    }

    async fn queued_entries(&self, limit: usize) -> Result<Vec<QueueEntry>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.queue.values().take(limit).cloned().collect())
    }

    async fn delete_queue_entry(&self, entry: &QueueEntry) -> Result<bool, AppError> {
        Ok(self.state.lock().unwrap().queue.remove(&entry.seq).is_some())
    }

    async fn commit_fetch(
        &self,
        entry: &QueueEntry,
        record: &ResponseRecord,
    ) -> Result<(), AppError> {
        if let Some(e) = self.commit_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut state = self.state.lock().unwrap();
        if !state.queue.contains_key(&entry.seq) {
            return Err(AppError::NotFound(format!("queue entry {}", entry.seq)));
        }
        state.insert_record(record)?;
        state.queue.remove(&entry.seq);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::Waiting => "Waiting",
            WorkerEvent::EntryClaimed { .. } => "EntryClaimed",
            WorkerEvent::Fetching { .. } => "Fetching",
            WorkerEvent::Archived { .. } => "Archived",
            WorkerEvent::AttemptFailed { .. } => "AttemptFailed",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

static NEXT_TEST_ID: AtomicU64 = AtomicU64::new(1);

/// Create a record for `https://example.com/` with a unique sequence id.
pub fn make_record(
    status: i32,
    time: u64,
    content_type: &str,
    length: u64,
    digests: DigestSet,
) -> ResponseRecord {
    ResponseRecord {
        seq: Seq::new(time, NEXT_TEST_ID.fetch_add(1, Ordering::Relaxed)),
        url: "https://example.com/".to_string(),
        status,
        content_type: content_type.to_string(),
        length,
        digests,
    }
}

/// Create a `text/html` record for `url` with a unique sequence id.
pub fn make_record_for(url: &str, status: i32, time: u64, digests: DigestSet) -> ResponseRecord {
    ResponseRecord {
        url: url.to_string(),
        ..make_record(status, time, "text/html", 100, digests)
    }
}
