//! Topology reconciler
//!
//! Brings the remote dataset in line with the declared topology:
//! - one table listing up front, no per-table existence probes
//! - missing tables are created, failures here are always fatal
//! - existing tables whose metadata already contains the declared fields are left alone
//! - drifted tables get the declared fields merged into their remote metadata
//! - drifted materialized views are deleted and recreated
//! - views whose source table is not listed yet are deferred to the next pass
//!
//! All definitions are reconciled concurrently. Non-fatal failures are settled
//! through the configured [`ErrorPolicy`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chatlake_common::{
    merged, metadata_is_subset, ChatLakeError, ErrorPolicy, RemoteTable, RemoteTableStore,
    Result, TableDefinition, Topology,
};
use futures::future::join_all;
use tracing::{debug, error, info, instrument};

/// Result of reconciling one definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Created,
    Updated,
    Unchanged,
    /// Materialized view waiting for its source table
    Deferred { source: String },
    Failed(String),
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOutcome::Created => write!(f, "created"),
            TableOutcome::Updated => write!(f, "updated"),
            TableOutcome::Unchanged => write!(f, "unchanged"),
            TableOutcome::Deferred { source } => write!(f, "deferred (waiting for {})", source),
            TableOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
}

/// Per-table outcomes of one reconciliation pass, in topology order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub tables: Vec<TableReport>,
}

impl ReconciliationReport {
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|report| report.table == table)
            .map(|report| &report.outcome)
    }

    fn count(&self, predicate: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| *o == TableOutcome::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(|o| *o == TableOutcome::Updated)
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| *o == TableOutcome::Unchanged)
    }

    pub fn deferred(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Deferred { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Failed(_)))
    }

    /// Every table is in its declared shape
    pub fn is_converged(&self) -> bool {
        self.deferred() == 0 && self.failed() == 0
    }
}

/// Applies a topology to a remote store
pub struct TopologyReconciler {
    store: Arc<dyn RemoteTableStore>,
    topology: Arc<Topology>,
    error_policy: ErrorPolicy,
}

impl TopologyReconciler {
    pub fn new(
        store: Arc<dyn RemoteTableStore>,
        topology: Arc<Topology>,
        error_policy: ErrorPolicy,
    ) -> Self {
        Self {
            store,
            topology,
            error_policy,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// List the dataset and reconcile every definition against it
    #[instrument(skip(self), fields(tables = self.topology.len()))]
    pub async fn run(&self) -> Result<ReconciliationReport> {
        let started = Instant::now();

        let remote = self.store.list_tables().await?;
        debug!("Found {} remote tables", remote.len());

        let report = self.reconcile(&remote).await?;

        let elapsed_ms = started.elapsed().as_millis();
        if self.error_policy.is_strict() {
            info!("Topology reconciled in {}ms", elapsed_ms);
        } else {
            debug!("Topology reconciled in {}ms", elapsed_ms);
        }
        Ok(report)
    }

    /// Reconcile every definition against an already fetched listing
    pub async fn reconcile(&self, remote: &[RemoteTable]) -> Result<ReconciliationReport> {
        let existing: HashMap<&str, Option<&str>> = remote
            .iter()
            .map(|table| (table.id.as_str(), table.kind.as_deref()))
            .collect();

        let results = join_all(
            self.topology
                .definitions()
                .iter()
                .map(|definition| self.upsert(definition, &existing)),
        )
        .await;

        let mut report = ReconciliationReport::default();
        let mut first_error = None;

        for (definition, result) in self.topology.definitions().iter().zip(results) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(table = %definition.name, error = %err, "Failed to update topology");
                    let outcome = TableOutcome::Failed(err.to_string());

                    let escalated = if err.is_always_fatal() {
                        Some(err)
                    } else {
                        self.error_policy.settle(err).err()
                    };
                    if first_error.is_none() {
                        first_error = escalated;
                    }
                    outcome
                }
            };

            report.tables.push(TableReport {
                table: definition.name.clone(),
                outcome,
            });
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    async fn upsert(
        &self,
        definition: &TableDefinition,
        existing: &HashMap<&str, Option<&str>>,
    ) -> Result<TableOutcome> {
        let name = definition.name.as_str();

        if let Some(source) = definition.source_table() {
            if !existing.contains_key(source) {
                info!(
                    "View {} will be created later, source table {} is missing",
                    name, source
                );
                return Ok(TableOutcome::Deferred {
                    source: source.to_string(),
                });
            }
        }

        let desired = definition.metadata()?;

        if !existing.contains_key(name) {
            info!("Creating table {}...", name);
            self.store
                .create_table(name, &desired)
                .await
                .map_err(|source| ChatLakeError::MissingTableCreation {
                    table: name.to_string(),
                    source,
                })?;
            info!("Table {} created", name);
            return Ok(TableOutcome::Created);
        }

        let schema_update = |source| ChatLakeError::SchemaUpdate {
            table: name.to_string(),
            source,
        };

        let remote = self
            .store
            .get_metadata(name)
            .await
            .map_err(schema_update)?;

        if metadata_is_subset(&remote, &desired) {
            info!("Table {} is up to date", name);
            return Ok(TableOutcome::Unchanged);
        }

        if definition.is_view() {
            let remote_kind = existing.get(name).copied().flatten().unwrap_or("unknown");
            info!(remote_kind, "Recreating view {}...", name);
            self.store
                .delete_table(name, true)
                .await
                .map_err(schema_update)?;
            self.store
                .create_table(name, &desired)
                .await
                .map_err(schema_update)?;
            info!("View {} recreated", name);
        } else {
            info!("Updating table {}...", name);
            self.store
                .set_metadata(name, &merged(&remote, &desired))
                .await
                .map_err(schema_update)?;
            info!("Table {} updated", name);
        }

        Ok(TableOutcome::Updated)
    }
}
