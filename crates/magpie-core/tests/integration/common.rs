//! Test utilities and mock implementations for integration tests.
//!
//! Provides mock implementations of the core traits for testing
//! `IngestionPipeline` in isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use magpie_core::traits::{RecordStore, ResolveSource, SearchSource};
use magpie_core::{AppError, CandidateRef, Record};

/// Builds a record with the given id and creation timestamp.
pub fn record(id: &str, created_utc: i64) -> Record {
    Record {
        id: id.to_string(),
        collection: "test".to_string(),
        ups: 10,
        upvote_ratio: 0.8,
        num_comments: 3,
        created: created_utc,
        created_utc,
        ..Default::default()
    }
}

// =============================================================================
// MockArchive
// =============================================================================

/// Mock search source backed by a fixed submission list.
///
/// Supports injecting transient failures: the first `fail_times` search calls
/// return a retryable network error.
#[derive(Clone)]
pub struct MockArchive {
    submissions: Arc<Vec<CandidateRef>>,
    failures_remaining: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

impl MockArchive {
    pub fn new(mut submissions: Vec<CandidateRef>) -> Self {
        // Newest first, as the archive returns them
        submissions.sort_by(|a, b| b.observed_utc.cmp(&a.observed_utc));
        Self {
            submissions: Arc::new(submissions),
            failures_remaining: Arc::new(AtomicU32::new(0)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_failures(self, fail_times: u32) -> Self {
        self.failures_remaining.store(fail_times, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchSource for MockArchive {
    async fn search(
        &self,
        _collection: &str,
        _query: Option<&str>,
        before_epoch: Option<i64>,
        limit: usize,
    ) -> Result<Vec<CandidateRef>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::NetworkError("mock archive down".to_string()));
        }

        let before = before_epoch.unwrap_or(i64::MAX);
        Ok(self
            .submissions
            .iter()
            .filter(|c| c.observed_utc < before)
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// MockGateway
// =============================================================================

/// Mock resolve source backed by an id -> record map.
///
/// Unknown ids are dropped silently (attrition), matching the real gateway.
/// Records every resolve call's chunk size so tests can assert the chunking
/// shape.
#[derive(Clone)]
pub struct MockGateway {
    records: Arc<Mutex<HashMap<String, Record>>>,
    chunk_sizes: Arc<Mutex<Vec<usize>>>,
    failures_remaining: Arc<AtomicU32>,
}

impl MockGateway {
    pub fn new(records: Vec<Record>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Arc::new(Mutex::new(map)),
            chunk_sizes: Arc::new(Mutex::new(Vec::new())),
            failures_remaining: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_failures(self, fail_times: u32) -> Self {
        self.failures_remaining.store(fail_times, Ordering::SeqCst);
        self
    }

    /// Replaces one record, simulating changed upstream state between runs.
    pub fn update_record(&self, record: Record) {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunk_sizes.lock().unwrap().clone()
    }
}

impl ResolveSource for MockGateway {
    async fn resolve(&self, _collection: &str, ids: &[String]) -> Result<Vec<Record>, AppError> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::NetworkError("mock gateway down".to_string()));
        }

        self.chunk_sizes.lock().unwrap().push(ids.len());

        let records = self.records.lock().unwrap();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }
}

// =============================================================================
// MockStore
// =============================================================================

/// In-memory record store implementing the field-merge upsert policy.
#[derive(Clone, Default)]
pub struct MockStore {
    records: Arc<Mutex<HashMap<(String, String), Record>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Record> {
        self.records
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    /// Snapshot of the full store state, ordered by creation time, for
    /// whole-state equality assertions.
    pub fn snapshot(&self) -> Vec<Record> {
        let mut all: Vec<Record> = self.records.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| (a.created_utc, &a.id).cmp(&(b.created_utc, &b.id)));
        all
    }
}

impl RecordStore for MockStore {
    async fn upsert_many(&self, collection: &str, records: &[Record]) -> Result<usize, AppError> {
        let mut store = self.records.lock().unwrap();
        for incoming in records {
            let key = (collection.to_string(), incoming.id.clone());
            match store.get_mut(&key) {
                Some(existing) => {
                    // Full overwrite except the immutable anchor fields
                    let mut merged = incoming.clone();
                    merged.id = existing.id.clone();
                    merged.created = existing.created;
                    merged.created_utc = existing.created_utc;
                    *existing = merged;
                }
                None => {
                    store.insert(key, incoming.clone());
                }
            }
        }
        Ok(records.len())
    }

    async fn select(
        &self,
        collection: &str,
        range: Option<(i64, i64)>,
        include_removed: bool,
    ) -> Result<Vec<Record>, AppError> {
        let store = self.records.lock().unwrap();
        let mut selected: Vec<Record> = store
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, r)| r.clone())
            .filter(|r| match range {
                Some((start, end)) => r.created_utc >= start && r.created_utc < end,
                None => true,
            })
            .filter(|r| include_removed || !r.removed)
            .collect();
        selected.sort_by_key(|r| r.created_utc);
        Ok(selected)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
