//! Error types for ChatLake sinks

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One structured error descriptor reported by the remote store for a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
}

/// Per-row rejection returned by a batched insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowInsertError {
    /// Position of the rejected row inside the submitted batch
    pub index: usize,
    #[serde(default)]
    pub errors: Vec<ErrorDescriptor>,
}

/// Failures of a single remote store call
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The request never produced a usable response (connect, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    /// The store accepted the request but rejected individual rows
    #[error("{} row(s) rejected by the remote store", .0.len())]
    RowsRejected(Vec<RowInsertError>),

    /// Could not obtain credentials for the request
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Response or request body could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// True when the store reported that the addressed resource is missing
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::Api { status, reason, .. } => {
                *status == 404 || reason.as_deref() == Some("notFound")
            }
            _ => false,
        }
    }

    /// Flattened per-row error descriptors, when the failure was row-level
    pub fn row_details(&self) -> Vec<ErrorDescriptor> {
        match self {
            StoreError::RowsRejected(rows) => rows
                .iter()
                .flat_map(|row| row.errors.iter().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Serialization(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// ChatLake operation errors
#[derive(Error, Debug, Clone)]
pub enum ChatLakeError {
    /// A table or view missing from the store could not be created
    #[error("Failed to create missing table {table}: {source}")]
    MissingTableCreation {
        table: String,
        #[source]
        source: StoreError,
    },

    /// An existing table's metadata update (or view recreate) failed
    #[error("Failed to update schema of {table}: {source}")]
    SchemaUpdate {
        table: String,
        #[source]
        source: StoreError,
    },

    /// A batch insert failed wholly or partially
    #[error("Insert into {table} failed: {source}")]
    Insert {
        table: String,
        #[source]
        source: StoreError,
    },

    /// The shared reconciliation attempt failed; every waiter sees the same cause
    #[error("Topology reconciliation failed: {0}")]
    Reconciliation(#[source] Arc<ChatLakeError>),

    /// Remote store call outside of a per-table step (e.g. the table listing)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid desired topology
    #[error("Topology error: {0}")]
    TopologyError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ChatLakeError {
    /// Whether this failure is fatal regardless of the configured error policy
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            ChatLakeError::MissingTableCreation { .. } | ChatLakeError::Store(_)
        )
    }

    /// Table the failure refers to, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            ChatLakeError::MissingTableCreation { table, .. }
            | ChatLakeError::SchemaUpdate { table, .. }
            | ChatLakeError::Insert { table, .. } => Some(table),
            ChatLakeError::Reconciliation(inner) => inner.table(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ChatLakeError {
    fn from(err: serde_json::Error) -> Self {
        ChatLakeError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for ChatLakeError {
    fn from(err: anyhow::Error) -> Self {
        ChatLakeError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let by_status = StoreError::Api {
            status: 404,
            reason: None,
            message: "Not found: Table p:d.t".to_string(),
        };
        assert!(by_status.is_not_found());

        let by_reason = StoreError::Api {
            status: 400,
            reason: Some("notFound".to_string()),
            message: "gone".to_string(),
        };
        assert!(by_reason.is_not_found());

        assert!(!StoreError::Transport("timeout".to_string()).is_not_found());
    }

    #[test]
    fn test_row_details_flatten() {
        let err = StoreError::RowsRejected(vec![
            RowInsertError {
                index: 0,
                errors: vec![ErrorDescriptor {
                    reason: Some("invalid".to_string()),
                    message: Some("no such field: foo".to_string()),
                    ..Default::default()
                }],
            },
            RowInsertError {
                index: 3,
                errors: vec![
                    ErrorDescriptor {
                        reason: Some("invalid".to_string()),
                        ..Default::default()
                    },
                    ErrorDescriptor {
                        reason: Some("stopped".to_string()),
                        ..Default::default()
                    },
                ],
            },
        ]);

        let details = err.row_details();
        assert_eq!(details.len(), 3);
        assert_eq!(details[2].reason.as_deref(), Some("stopped"));
        assert_eq!(err.to_string(), "2 row(s) rejected by the remote store");
    }

    #[test]
    fn test_fatality() {
        let create = ChatLakeError::MissingTableCreation {
            table: "events".to_string(),
            source: StoreError::Transport("reset".to_string()),
        };
        assert!(create.is_always_fatal());
        assert_eq!(create.table(), Some("events"));

        let update = ChatLakeError::SchemaUpdate {
            table: "events".to_string(),
            source: StoreError::Transport("reset".to_string()),
        };
        assert!(!update.is_always_fatal());

        let shared = ChatLakeError::Reconciliation(Arc::new(create));
        assert_eq!(shared.table(), Some("events"));
    }
}
