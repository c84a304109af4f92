//! ChatLake Write
//!
//! Keeps a remote analytics dataset in line with a declared topology and
//! writes chatbot telemetry into it.
//!
//! This crate:
//! - Reconciles the declared tables and materialized views once per process
//! - Holds writers back until reconciliation has settled (single flight)
//! - Inserts row batches per table, concurrently across tables
//! - Maps chatbot sessions and tracking events onto table rows
//!
//! Configuration via environment variables:
//! - CHATLAKE_PROJECT_ID, CHATLAKE_DATASET: target dataset
//! - CHATLAKE_CREDENTIALS, CHATLAKE_ACCESS_TOKEN: authentication
//! - CHATLAKE_THROW_EXCEPTIONS, CHATLAKE_PASSIVE_SCHEMA: behaviour switches

pub mod gate;
pub mod gateway;
pub mod reconciler;
pub mod sink;

#[cfg(test)]
mod testing;

pub use gate::{GateStatus, SchemaGate};
pub use gateway::InsertGateway;
pub use reconciler::{ReconciliationReport, TableOutcome, TableReport, TopologyReconciler};
pub use sink::ChatLakeSink;

// Re-export common types
pub use chatlake_common::{
    config::{ChatLakeConfig, ErrorPolicy, SchemaMode, SinkOptions},
    error::{ChatLakeError, StoreError},
    rows::{ConversationDetail, InteractionContext, TrackingEvent, TrackingType, UserSession},
    schemas::{default_topology, get_all_table_names, get_schema_for_table},
    types::{Row, RowBatch, TableDefinition, Topology},
    RemoteTableStore, Result,
};
