//! In-memory remote table store for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatlake_common::{RemoteTable, RemoteTableStore, Row, StoreError, TableMetadata};
use parking_lot::Mutex;
use serde_json::json;

#[derive(Default)]
struct Counters {
    listings: AtomicUsize,
    metadata_reads: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    inserts: AtomicUsize,
}

#[derive(Default)]
pub struct FakeStore {
    tables: Mutex<BTreeMap<String, TableMetadata>>,
    rows: Mutex<BTreeMap<String, Vec<Row>>>,
    counters: Counters,
    failing_listings: AtomicUsize,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    failing_inserts: Mutex<HashSet<String>>,
    delay: Duration,
}

fn not_found(table: &str) -> StoreError {
    StoreError::Api {
        status: 404,
        reason: Some("notFound".to_string()),
        message: format!("Not found: Table {}", table),
    }
}

fn server_error() -> StoreError {
    StoreError::Api {
        status: 500,
        reason: Some("backendError".to_string()),
        message: "Backend error".to_string(),
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every listing takes this long, so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_table(self, name: &str, metadata: TableMetadata) -> Self {
        self.tables.lock().insert(name.to_string(), metadata);
        self
    }

    pub fn fail_next_listings(&self, count: usize) {
        self.failing_listings.store(count, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts_into(&self, table: &str) {
        self.failing_inserts.lock().insert(table.to_string());
    }

    pub fn listings(&self) -> usize {
        self.counters.listings.load(Ordering::SeqCst)
    }

    pub fn metadata_reads(&self) -> usize {
        self.counters.metadata_reads.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.counters.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.counters.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.counters.deletes.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.counters.inserts.load(Ordering::SeqCst)
    }

    /// Create, update and delete calls
    pub fn mutations(&self) -> usize {
        self.creates() + self.updates() + self.deletes()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.lock().keys().cloned().collect()
    }

    pub fn metadata(&self, table: &str) -> Option<TableMetadata> {
        self.tables.lock().get(table).cloned()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.rows.lock().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RemoteTableStore for FakeStore {
    async fn list_tables(&self) -> Result<Vec<RemoteTable>, StoreError> {
        self.counters.listings.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failing_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Transport("connection reset by peer".to_string()));
        }

        Ok(self
            .tables
            .lock()
            .keys()
            .map(|name| RemoteTable::new(name.as_str()))
            .collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().contains_key(table))
    }

    async fn get_metadata(&self, table: &str) -> Result<TableMetadata, StoreError> {
        self.counters.metadata_reads.fetch_add(1, Ordering::SeqCst);
        let mut metadata = self
            .tables
            .lock()
            .get(table)
            .cloned()
            .ok_or_else(|| not_found(table))?;
        metadata.insert("id".to_string(), json!(format!("test:analytics.{}", table)));
        metadata.insert("numRows".to_string(), json!("0"));
        Ok(metadata)
    }

    async fn create_table(&self, table: &str, metadata: &TableMetadata) -> Result<(), StoreError> {
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        self.tables.lock().insert(table.to_string(), metadata.clone());
        Ok(())
    }

    async fn set_metadata(&self, table: &str, metadata: &TableMetadata) -> Result<(), StoreError> {
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        match self.tables.lock().get_mut(table) {
            Some(current) => {
                *current = metadata.clone();
                Ok(())
            }
            None => Err(not_found(table)),
        }
    }

    async fn delete_table(&self, table: &str, ignore_not_found: bool) -> Result<(), StoreError> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        match self.tables.lock().remove(table) {
            Some(_) => Ok(()),
            None if ignore_not_found => Ok(()),
            None => Err(not_found(table)),
        }
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        self.counters.inserts.fetch_add(1, Ordering::SeqCst);
        if self.failing_inserts.lock().contains(table) {
            return Err(StoreError::Transport(format!("insert into {} timed out", table)));
        }
        if !self.tables.lock().contains_key(table) {
            return Err(not_found(table));
        }
        self.rows
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }
}

/// Collects formatted log output of a thread-local subscriber
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let writer = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
