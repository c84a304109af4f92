//! Test doubles shared by the unit tests

use std::io;
use std::sync::Arc;

use chatlake_common::{RemoteTable, RemoteTableStore, Row, StoreError, TableMetadata};
use mockall::mock;
use parking_lot::Mutex;

mock! {
    pub Store {}

    #[async_trait::async_trait]
    impl RemoteTableStore for Store {
        async fn list_tables(&self) -> Result<Vec<RemoteTable>, StoreError>;
        async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;
        async fn get_metadata(&self, table: &str) -> Result<TableMetadata, StoreError>;
        async fn create_table(&self, table: &str, metadata: &TableMetadata) -> Result<(), StoreError>;
        async fn set_metadata(&self, table: &str, metadata: &TableMetadata) -> Result<(), StoreError>;
        async fn delete_table(&self, table: &str, ignore_not_found: bool) -> Result<(), StoreError>;
        async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<(), StoreError>;
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
