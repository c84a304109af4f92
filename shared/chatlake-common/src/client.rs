//! Remote table store capability
//!
//! Every method is one network round trip and may fail. The reconciler and
//! the insert path only ever talk to the store through this trait, so tests
//! and alternative backends can stand in for the REST client.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{RemoteTable, Row, TableMetadata};

#[async_trait]
pub trait RemoteTableStore: Send + Sync {
    /// List every table and view of the dataset
    async fn list_tables(&self) -> Result<Vec<RemoteTable>, StoreError>;

    /// Probe a single table
    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// Fetch the full remote resource of a table
    async fn get_metadata(&self, table: &str) -> Result<TableMetadata, StoreError>;

    /// Create a table or view from the given resource fields
    async fn create_table(&self, table: &str, metadata: &TableMetadata)
        -> Result<(), StoreError>;

    /// Replace the mutable fields of an existing table
    async fn set_metadata(&self, table: &str, metadata: &TableMetadata)
        -> Result<(), StoreError>;

    /// Delete a table or view; with `ignore_not_found` a missing table is success
    async fn delete_table(&self, table: &str, ignore_not_found: bool) -> Result<(), StoreError>;

    /// Insert all rows in one request, preserving their order
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<(), StoreError>;
}
