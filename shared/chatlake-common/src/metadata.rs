//! Structural comparison and merging of table metadata
//!
//! Desired metadata only declares the fields it cares about; the remote
//! resource carries many more (etag, creationTime, numRows, ...). Comparison
//! is therefore one-way: every declared key must be present and equal, extra
//! remote keys are ignored.

use serde_json::Value;

use crate::types::TableMetadata;

/// True when every key/value of `desired` is present and equal in `remote`.
///
/// Objects recurse on the desired keys. Arrays compare position by position
/// with the same subset rule, so a remote list may carry trailing entries the
/// desired list does not mention. Scalars must be equal.
pub fn is_subset(remote: &Value, desired: &Value) -> bool {
    match (remote, desired) {
        (Value::Object(remote), Value::Object(desired)) => desired
            .iter()
            .all(|(key, value)| remote.get(key).is_some_and(|r| is_subset(r, value))),
        (Value::Array(remote), Value::Array(desired)) => {
            desired.len() <= remote.len()
                && desired.iter().zip(remote).all(|(d, r)| is_subset(r, d))
        }
        (remote, desired) => remote == desired,
    }
}

/// [`is_subset`] over whole metadata maps
pub fn metadata_is_subset(remote: &TableMetadata, desired: &TableMetadata) -> bool {
    desired
        .iter()
        .all(|(key, value)| remote.get(key).is_some_and(|r| is_subset(r, value)))
}

/// Merge `desired` into `target` in place.
///
/// Nested objects merge key by key; any other desired value (scalars and
/// whole arrays) replaces the target's. Keys absent from `desired` keep
/// their remote value.
pub fn merge_into(target: &mut TableMetadata, desired: &TableMetadata) {
    for (key, value) in desired {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Copy of `remote` with `desired` merged over it
pub fn merged(remote: &TableMetadata, desired: &TableMetadata) -> TableMetadata {
    let mut result = remote.clone();
    merge_into(&mut result, desired);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn md(value: Value) -> TableMetadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("metadata fixture must be an object"),
        }
    }

    #[test]
    fn test_subset_ignores_extra_remote_keys() {
        let remote = md(json!({ "a": 1, "b": 2, "c": 3 }));
        let desired = md(json!({ "a": 1, "b": 2 }));
        assert!(metadata_is_subset(&remote, &desired));
    }

    #[test]
    fn test_changed_value_is_not_subset_and_merges() {
        let remote = md(json!({ "a": 1, "b": 2, "c": 3 }));
        let desired = md(json!({ "a": 1, "b": 5 }));

        assert!(!metadata_is_subset(&remote, &desired));
        assert_eq!(
            Value::Object(merged(&remote, &desired)),
            json!({ "a": 1, "b": 5, "c": 3 })
        );
    }

    #[test]
    fn test_missing_key_is_not_subset() {
        let remote = md(json!({ "a": 1 }));
        let desired = md(json!({ "clustering": { "fields": ["pageId"] } }));
        assert!(!metadata_is_subset(&remote, &desired));
    }

    #[test]
    fn test_nested_schema_fields_subset() {
        let remote = md(json!({
            "etag": "abc",
            "schema": { "fields": [
                { "name": "pageId", "type": "STRING", "mode": "REQUIRED", "maxLength": "36", "description": "" },
                { "name": "lang", "type": "STRING", "mode": "NULLABLE" }
            ]}
        }));
        let same = md(json!({
            "schema": { "fields": [
                { "name": "pageId", "type": "STRING", "mode": "REQUIRED", "maxLength": "36" },
                { "name": "lang", "type": "STRING" }
            ]}
        }));
        let added_column = md(json!({
            "schema": { "fields": [
                { "name": "pageId", "type": "STRING", "mode": "REQUIRED", "maxLength": "36" },
                { "name": "lang", "type": "STRING" },
                { "name": "botId", "type": "STRING" }
            ]}
        }));

        assert!(metadata_is_subset(&remote, &same));
        assert!(!metadata_is_subset(&remote, &added_column));
    }

    #[test]
    fn test_type_mismatch_is_not_subset() {
        assert!(!is_subset(&json!("36"), &json!(36)));
        assert!(!is_subset(&json!({ "a": 1 }), &json!([1])));
        assert!(is_subset(&json!(null), &json!(null)));
    }

    #[test]
    fn test_merge_replaces_arrays_and_keeps_nested_remote_keys() {
        let remote = md(json!({
            "timePartitioning": { "type": "DAY", "field": "date", "requirePartitionFilter": false },
            "clustering": { "fields": ["pageId"] },
            "schema": { "fields": [{ "name": "a", "type": "STRING" }] }
        }));
        let desired = md(json!({
            "timePartitioning": { "type": "DAY", "expirationMs": "1000" },
            "schema": { "fields": [{ "name": "a", "type": "STRING" }, { "name": "b", "type": "DATE" }] }
        }));

        let result = merged(&remote, &desired);
        assert_eq!(
            Value::Object(result),
            json!({
                "timePartitioning": {
                    "type": "DAY",
                    "field": "date",
                    "requirePartitionFilter": false,
                    "expirationMs": "1000"
                },
                "clustering": { "fields": ["pageId"] },
                "schema": { "fields": [{ "name": "a", "type": "STRING" }, { "name": "b", "type": "DATE" }] }
            })
        );
    }

    #[test]
    fn test_merged_result_is_superset_of_desired() {
        let remote = md(json!({ "x": { "y": 1 }, "z": [1, 2, 3] }));
        let desired = md(json!({ "x": { "w": 2 }, "z": [9] }));
        let result = merged(&remote, &desired);
        assert!(metadata_is_subset(&result, &desired));
        assert_eq!(result["z"], json!([9]));
    }
}
