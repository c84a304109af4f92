//! ChatLake Common Library
//!
//! Shared types, schemas, configuration, and the remote table store client
//! for the ChatLake analytics sink. Chatbot sessions, conversation turns and
//! tracking events land in a day-partitioned dataset of a remote table store.

pub mod auth;
pub mod bigquery;
pub mod client;
pub mod config;
pub mod error;
pub mod metadata;
pub mod rows;
pub mod schemas;
pub mod types;

// Re-export commonly used types
pub use bigquery::BigQueryClient;
pub use client::RemoteTableStore;
pub use config::{ChatLakeConfig, Credentials, ErrorPolicy, SchemaMode, SinkOptions};
pub use error::{ChatLakeError, ErrorDescriptor, RowInsertError, StoreError};
pub use metadata::{is_subset, merge_into, merged, metadata_is_subset};
pub use rows::{
    format_date, format_datetime, session_batch, ConversationDetail, EventRows,
    InteractionContext, TrackingEvent, TrackingType, UserSession,
};
pub use schemas::{
    conversations_schema, default_topology, events_schema, get_all_table_names,
    get_clustering_columns, get_schema_for_table, sessions_schema, table_definition,
    CONVERSATIONS_TABLE, EVENTS_TABLE, SESSIONS_TABLE,
};
pub use types::*;

/// Result type alias for ChatLake operations
pub type Result<T> = std::result::Result<T, ChatLakeError>;
