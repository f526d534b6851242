//! Test doubles: a store wrapper with failure injection and a recording relay.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use super::{CascadeMode, Ledger};
use crate::db::{
    init_database, BatchOp, Document, DocumentStore, FieldEquals, Fields, OrderBy, SqliteStore,
    Subscription,
};
use crate::errors::AppError;
use crate::models::RevisionInfo;
use crate::relay::{FlattenedRecord, NotificationRelay, StudentPayload};

/// SQLite store whose writes can be made to fail on demand.
pub(crate) struct FlakyStore {
    inner: SqliteStore,
    fail_batches: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_batches: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    /// Fail single-document creates, updates and deletes.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of write calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) -> Result<(), AppError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn subscribe(
        &self,
        collection: &str,
        order_by: OrderBy,
    ) -> Result<Subscription, AppError> {
        self.inner.subscribe(collection, order_by).await
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String, AppError> {
        self.record_write()?;
        self.inner.create(collection, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), AppError> {
        self.record_write()?;
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.record_write()?;
        self.inner.delete(collection, id).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &FieldEquals,
    ) -> Result<Vec<Document>, AppError> {
        self.inner.query(collection, filter).await
    }

    async fn batch_write(&self, ops: Vec<BatchOp>) -> Result<(), AppError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(AppError::Database("injected batch failure".to_string()));
        }
        self.inner.batch_write(ops).await
    }

    async fn revision(&self) -> Result<RevisionInfo, AppError> {
        self.inner.revision().await
    }
}

/// Relay that records calls and fails for chosen student names.
#[derive(Default)]
pub(crate) struct RecordingRelay {
    structured: AtomicUsize,
    flattened: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingRelay {
    pub fn fail_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn structured_calls(&self) -> usize {
        self.structured.load(Ordering::SeqCst)
    }

    pub fn flattened_calls(&self) -> usize {
        self.flattened.lock().unwrap().len()
    }

    fn outcome(&self, name: &str) -> Result<(), AppError> {
        if self.failing.lock().unwrap().contains(name) {
            Err(AppError::Relay(format!("webhook rejected {}", name)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationRelay for RecordingRelay {
    async fn send_structured(&self, payload: &StudentPayload) -> Result<(), AppError> {
        self.structured.fetch_add(1, Ordering::SeqCst);
        self.outcome(&payload.name)
    }

    async fn send_flattened(&self, record: &FlattenedRecord) -> Result<(), AppError> {
        self.flattened.lock().unwrap().push(record.to_line());
        self.outcome(&record.name)
    }
}

pub(crate) struct TestContext {
    pub ledger: Ledger,
    pub store: Arc<FlakyStore>,
    pub relay: Arc<RecordingRelay>,
    _temp_dir: TempDir,
}

pub(crate) async fn setup(mode: CascadeMode) -> TestContext {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&temp_dir.path().join("ledger.sqlite"))
        .await
        .expect("Failed to init DB");

    let store = Arc::new(FlakyStore::new(SqliteStore::new(pool)));
    let relay = Arc::new(RecordingRelay::default());
    let ledger = Ledger::open(store.clone(), relay.clone(), mode)
        .await
        .expect("Failed to open ledger");

    TestContext {
        ledger,
        store,
        relay,
        _temp_dir: temp_dir,
    }
}
