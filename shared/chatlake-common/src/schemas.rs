//! Table schemas for chatbot analytics
//!
//! Sessions, conversation turns, and tracking events (page views, reports,
//! custom events). All three tables are day-partitioned on `date` and
//! clustered by page and session for per-conversation lookups.

use crate::types::{FieldSchema, FieldType, PartitionUnit, TableDefinition, TimePartitioning};

/// Table names
pub const EVENTS_TABLE: &str = "events";
pub const SESSIONS_TABLE: &str = "sessions";
pub const CONVERSATIONS_TABLE: &str = "conversations";

/// Ten years of partitions
pub const PARTITION_EXPIRATION_MS: u64 = 3_118_560_000_000;

/// Length of a uuid in its textual form
const UUID_LENGTH: u64 = 36;
const SESSION_ID_LENGTH: u64 = 32;

fn string(name: &str) -> FieldSchema {
    FieldSchema::new(name, FieldType::String)
}

/// Identity columns shared by every table
fn identity_fields() -> Vec<FieldSchema> {
    vec![
        string("pageId").with_max_length(UUID_LENGTH).required(),
        string("senderId").with_max_length(UUID_LENGTH).required(),
        string("sessionId")
            .with_max_length(SESSION_ID_LENGTH)
            .required(),
    ]
}

/// Columns of the events table
pub fn events_schema() -> Vec<FieldSchema> {
    let mut fields = identity_fields();
    fields.extend([
        FieldSchema::new("timestamp", FieldType::Timestamp).required(),
        FieldSchema::new("datetime", FieldType::Datetime).required(),
        FieldSchema::new("date", FieldType::Date).required(),
        string("category").with_max_length(3).required(),
        string("type").with_max_length(12).required(),
        string("action"),
        string("label"),
        FieldSchema::new("value", FieldType::Integer),
        string("lang").with_max_length(2),
        FieldSchema::new("nonInteractive", FieldType::Boolean).required(),
    ]);
    fields
}

/// Columns of the sessions table
pub fn sessions_schema() -> Vec<FieldSchema> {
    let mut fields = identity_fields();
    fields.extend([
        FieldSchema::new("sessionStart", FieldType::Timestamp).required(),
        FieldSchema::new("sessionStartDate", FieldType::Datetime).required(),
        FieldSchema::new("date", FieldType::Date).required(),
        string("action"),
        FieldSchema::new("sessionCount", FieldType::Integer),
        string("lang").with_max_length(2),
        FieldSchema::new("nonInteractive", FieldType::Boolean).required(),
        string("botId").with_max_length(UUID_LENGTH),
        string("snapshot").with_max_length(14),
    ]);
    fields
}

/// Columns of the conversations table
pub fn conversations_schema() -> Vec<FieldSchema> {
    let flag = |name: &str| FieldSchema::new(name, FieldType::Boolean).required();

    let mut fields = identity_fields();
    fields.extend([
        FieldSchema::new("timestamp", FieldType::Timestamp).required(),
        FieldSchema::new("datetime", FieldType::Datetime).required(),
        FieldSchema::new("date", FieldType::Date).required(),
        string("category").with_max_length(3).required(),
        string("action"),
        string("lastAction"),
        string("label"),
        FieldSchema::new("value", FieldType::Integer),
        string("lang").with_max_length(2),
        string("skill"),
        string("text"),
        string("expected"),
        flag("expectedTaken"),
        flag("isContextUpdate"),
        flag("isAttachment"),
        flag("isNotification"),
        flag("isQuickReply"),
        flag("isPassThread"),
        flag("isText"),
        flag("isPostback"),
        flag("didHandover"),
        flag("withUser"),
        string("userId"),
        FieldSchema::new("feedback", FieldType::Integer).required(),
        FieldSchema::new("sessionStart", FieldType::Timestamp).required(),
        FieldSchema::new("sessionStartDate", FieldType::Datetime).required(),
        FieldSchema::new("sessionDuration", FieldType::Integer).required(),
        string("winnerAction"),
        string("winnerIntent"),
        string("winnerEntities").repeated(),
        FieldSchema::new("winnerScore", FieldType::Float),
        FieldSchema::new("winnerTaken", FieldType::Boolean),
        string("intent"),
        FieldSchema::new("intentScore", FieldType::Float),
        string("entities").repeated(),
        string("allActions").repeated(),
        flag("nonInteractive"),
        string("botId").with_max_length(UUID_LENGTH),
        string("snapshot").with_max_length(14),
    ]);
    fields
}

/// Daily partitions on `date`, kept for ten years
pub fn daily_partitioning() -> TimePartitioning {
    TimePartitioning {
        unit: PartitionUnit::Day,
        expiration_ms: Some(PARTITION_EXPIRATION_MS),
        field: Some("date".to_string()),
    }
}

/// Clustering columns shared by all analytics tables
pub fn get_clustering_columns() -> Vec<String> {
    vec!["pageId".to_string(), "sessionId".to_string()]
}

/// Get schema by table name
pub fn get_schema_for_table(table_name: &str) -> Option<Vec<FieldSchema>> {
    match table_name {
        EVENTS_TABLE => Some(events_schema()),
        SESSIONS_TABLE => Some(sessions_schema()),
        CONVERSATIONS_TABLE => Some(conversations_schema()),
        _ => None,
    }
}

/// Get all table names
pub fn get_all_table_names() -> Vec<&'static str> {
    vec![EVENTS_TABLE, CONVERSATIONS_TABLE, SESSIONS_TABLE]
}

/// Full definition of one analytics table
pub fn table_definition(table_name: &str) -> Option<TableDefinition> {
    get_schema_for_table(table_name).map(|fields| {
        TableDefinition::table(table_name, fields)
            .with_time_partitioning(daily_partitioning())
            .with_clustering(get_clustering_columns())
    })
}

/// Desired topology of the chatbot analytics dataset
pub fn default_topology() -> Vec<TableDefinition> {
    get_all_table_names()
        .into_iter()
        .filter_map(table_definition)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldMode, Topology};

    fn names(fields: &[FieldSchema]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_default_topology_is_valid() {
        let topology = Topology::new(default_topology()).unwrap();
        assert_eq!(topology.len(), 3);
        assert!(topology.definitions().iter().all(|d| !d.is_view()));
    }

    #[test]
    fn test_all_tables_partitioned_by_date() {
        for definition in default_topology() {
            let partitioning = definition.time_partitioning.as_ref().unwrap();
            assert_eq!(partitioning.unit, PartitionUnit::Day);
            assert_eq!(partitioning.field.as_deref(), Some("date"));
            assert_eq!(partitioning.expiration_ms, Some(PARTITION_EXPIRATION_MS));
            assert_eq!(
                definition.clustering.as_deref(),
                Some(&["pageId".to_string(), "sessionId".to_string()][..])
            );

            let fields = definition.schema.as_ref().unwrap();
            assert!(names(fields).contains(&"date"));
        }
    }

    #[test]
    fn test_identity_columns_first() {
        for table in get_all_table_names() {
            let fields = get_schema_for_table(table).unwrap();
            assert_eq!(&names(&fields)[..3], &["pageId", "senderId", "sessionId"]);
            assert_eq!(fields[0].max_length, Some(36));
            assert_eq!(fields[2].max_length, Some(32));
        }
    }

    #[test]
    fn test_conversations_repeated_columns() {
        let fields = conversations_schema();
        let repeated: Vec<&str> = fields
            .iter()
            .filter(|f| f.mode == Some(FieldMode::Repeated))
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(repeated, vec!["winnerEntities", "entities", "allActions"]);
    }

    #[test]
    fn test_column_names_unique() {
        for table in get_all_table_names() {
            let fields = get_schema_for_table(table).unwrap();
            let unique: std::collections::HashSet<_> = names(&fields).into_iter().collect();
            assert_eq!(unique.len(), fields.len(), "duplicate column in {}", table);
        }
    }

    #[test]
    fn test_unknown_table() {
        assert!(get_schema_for_table("blocks").is_none());
        assert!(table_definition("blocks").is_none());
    }
}
