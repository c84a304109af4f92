//! Batch insert gateway
//!
//! Every insert waits for the schema gate, then writes all rows of a batch in
//! one request. Failures are logged with the per-row detail the store
//! reports and then settled through the error policy, so analytics failures
//! stay out of the caller's request path unless strict mode is on.

use std::sync::Arc;
use std::time::Instant;

use chatlake_common::{ChatLakeError, ErrorPolicy, Result, Row, RowBatch};
use futures::future::join_all;
use tracing::{debug, error, info, instrument};

use crate::gate::SchemaGate;

pub struct InsertGateway {
    gate: Arc<SchemaGate>,
    error_policy: ErrorPolicy,
}

impl InsertGateway {
    pub fn new(gate: Arc<SchemaGate>, error_policy: ErrorPolicy) -> Self {
        Self { gate, error_policy }
    }

    /// Insert rows into one table; empty input is a no-op
    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    pub async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let store = match self.gate.ready().await {
            Ok(store) => store,
            Err(err) => {
                error!(table, error = %err, "Insert to \"{}\" skipped, topology not ready", table);
                return self.error_policy.settle(err);
            }
        };

        match store.insert_rows(table, rows).await {
            Ok(()) => {
                debug!("Inserted {} rows into {}", rows.len(), table);
                Ok(())
            }
            Err(source) => {
                let details = source.row_details();
                if details.is_empty() {
                    error!(table, error = %source, "Insert to \"{}\" failed", table);
                } else {
                    error!(
                        table,
                        error = %source,
                        details = ?details,
                        "Insert to \"{}\" failed", table
                    );
                }
                self.error_policy.settle(ChatLakeError::Insert {
                    table: table.to_string(),
                    source,
                })
            }
        }
    }

    pub async fn insert_batch(&self, batch: &RowBatch) -> Result<()> {
        self.insert(&batch.table, &batch.rows).await
    }

    /// Insert batches of different tables concurrently.
    ///
    /// Every batch runs to completion regardless of the others; the first
    /// error in batch order is returned afterwards.
    pub async fn insert_batches(&self, batches: &[RowBatch]) -> Result<()> {
        let started = Instant::now();

        let results = join_all(batches.iter().map(|batch| self.insert_batch(batch))).await;

        let elapsed_ms = started.elapsed().as_millis();
        if self.error_policy.is_strict() {
            info!("Inserted {} batches in {}ms", batches.len(), elapsed_ms);
        } else {
            debug!("Inserted {} batches in {}ms", batches.len(), elapsed_ms);
        }

        results.into_iter().collect()
    }
}
