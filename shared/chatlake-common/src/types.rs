//! Type definitions for ChatLake sinks
//!
//! Declarative table/view definitions (the desired "topology") and the
//! observed remote state they are reconciled against.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ChatLakeError;

/// Table identifier
pub type TableName = String;

/// Remote table resource as a JSON object (schema, partitioning, clustering, ...)
pub type TableMetadata = Map<String, Value>;

/// One flat record destined for a table
pub type Row = Map<String, Value>;

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Numeric,
    Boolean,
    Timestamp,
    Datetime,
    Date,
    Bytes,
    Json,
}

/// Column nullability / cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMode {
    Nullable,
    Required,
    Repeated,
}

/// Typed column declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<FieldMode>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "int64_string"
    )]
    pub max_length: Option<u64>,
}

impl FieldSchema {
    /// Nullable column without length limit
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: None,
            max_length: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = Some(FieldMode::Required);
        self
    }

    pub fn repeated(mut self) -> Self {
        self.mode = Some(FieldMode::Repeated);
        self
    }

    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Partition granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionUnit {
    Day,
    Month,
}

/// Time based partitioning descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePartitioning {
    #[serde(rename = "type")]
    pub unit: PartitionUnit,
    /// Partition retention in milliseconds
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "int64_string"
    )]
    pub expiration_ms: Option<u64>,
    /// Partition column; ingestion time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Query-backed derived table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedViewDefinition {
    pub query: String,
    /// Base table the view reads from; must be part of the same topology
    pub source_table: TableName,
    #[serde(default = "default_enable_refresh")]
    pub enable_refresh: bool,
}

fn default_enable_refresh() -> bool {
    true
}

/// Desired state of one table or materialized view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub name: TableName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<FieldSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_partitioning: Option<TimePartitioning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialized_view: Option<MaterializedViewDefinition>,
}

impl TableDefinition {
    /// Base table with the given columns
    pub fn table(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            schema: Some(fields),
            time_partitioning: None,
            clustering: None,
            materialized_view: None,
        }
    }

    /// Materialized view over `source_table`
    pub fn materialized_view(
        name: impl Into<String>,
        source_table: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema: None,
            time_partitioning: None,
            clustering: None,
            materialized_view: Some(MaterializedViewDefinition {
                query: query.into(),
                source_table: source_table.into(),
                enable_refresh: true,
            }),
        }
    }

    pub fn with_time_partitioning(mut self, partitioning: TimePartitioning) -> Self {
        self.time_partitioning = Some(partitioning);
        self
    }

    pub fn with_clustering<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clustering = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_view(&self) -> bool {
        self.materialized_view.is_some()
    }

    /// Source table of a materialized view
    pub fn source_table(&self) -> Option<&str> {
        self.materialized_view
            .as_ref()
            .map(|view| view.source_table.as_str())
    }

    /// Render the desired fields in the remote store's resource shape.
    ///
    /// Only declared fields are emitted so the result can be compared as a
    /// subset of the remote metadata. The view's source table is local
    /// bookkeeping and never sent.
    pub fn metadata(&self) -> Result<TableMetadata, ChatLakeError> {
        let mut metadata = TableMetadata::new();

        if let Some(fields) = &self.schema {
            metadata.insert(
                "schema".to_string(),
                json!({ "fields": serde_json::to_value(fields)? }),
            );
        }
        if let Some(partitioning) = &self.time_partitioning {
            metadata.insert(
                "timePartitioning".to_string(),
                serde_json::to_value(partitioning)?,
            );
        }
        if let Some(columns) = &self.clustering {
            metadata.insert("clustering".to_string(), json!({ "fields": columns }));
        }
        if let Some(view) = &self.materialized_view {
            metadata.insert(
                "materializedView".to_string(),
                json!({
                    "query": view.query,
                    "enableRefresh": view.enable_refresh,
                }),
            );
        }

        Ok(metadata)
    }
}

/// Validated desired topology: unique names, views reference declared tables
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    definitions: Vec<TableDefinition>,
}

impl Topology {
    pub fn new(definitions: Vec<TableDefinition>) -> Result<Self, ChatLakeError> {
        let mut seen = HashSet::new();
        for definition in &definitions {
            if definition.name.is_empty() {
                return Err(ChatLakeError::TopologyError(
                    "Table name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(definition.name.as_str()) {
                return Err(ChatLakeError::TopologyError(format!(
                    "Duplicate table name: {}",
                    definition.name
                )));
            }
        }

        for definition in &definitions {
            if let Some(source) = definition.source_table() {
                if source == definition.name || !seen.contains(source) {
                    return Err(ChatLakeError::TopologyError(format!(
                        "View {} reads from {} which is not a table of this topology",
                        definition.name, source
                    )));
                }
            }
        }

        Ok(Self { definitions })
    }

    pub fn definitions(&self) -> &[TableDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Entry of the remote table listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTable {
    pub id: TableName,
    /// Remote resource kind (`TABLE`, `VIEW`, `MATERIALIZED_VIEW`), when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl RemoteTable {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: None,
        }
    }
}

/// Rows for one table, written in one request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowBatch {
    pub table: TableName,
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(table: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            table: table.into(),
            rows,
        }
    }

    /// Serialize records into a batch; non-object records are rejected
    pub fn from_records<T: Serialize>(
        table: impl Into<String>,
        records: &[T],
    ) -> Result<Self, ChatLakeError> {
        let rows = records
            .iter()
            .map(|record| match serde_json::to_value(record)? {
                Value::Object(map) => Ok(map),
                other => Err(ChatLakeError::SerializationError(format!(
                    "Row must serialize to an object, got {}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, ChatLakeError>>()?;
        Ok(Self::new(table, rows))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 64-bit integers travel as JSON strings in the remote resource format.
mod int64_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(n)) => Ok(Some(n)),
            Some(Raw::Text(s)) => s.parse().map(Some).map_err(de::Error::custom),
        }
    }
}
