//! Decoded result rows and trailing metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of a view result.
///
/// `id` is the emitting document's id; reduced and grouped rows have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
}

impl ViewRow {
    pub fn new(id: Option<String>, key: Value, value: Value) -> Self {
        Self { id, key, value }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Summary of a completed view query.
///
/// Only exists once the row stream was drained without error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewMetaData {
    /// Number of rows in the index, not the number returned. Reduced
    /// queries carry no count and read as zero.
    #[serde(default)]
    pub total_rows: u64,
    /// Server debug information, present when `debug` was requested.
    #[serde(default, rename = "debug", skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Value>,
}

impl ViewMetaData {
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn debug_info(&self) -> Option<&Value> {
        self.debug_info.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reduced_rows_have_no_id() {
        let row: ViewRow = serde_json::from_value(json!({"key": null, "value": 42})).unwrap();
        assert_eq!(row.id(), None);
        assert_eq!(row.value(), &json!(42));
    }

    #[test]
    fn map_rows_keep_the_document_id() {
        let row: ViewRow = serde_json::from_value(json!({
            "id": "landmark_11769",
            "key": ["101 Coffee Shop", "landmark_11769"],
            "value": null
        }))
        .unwrap();
        assert_eq!(row.id(), Some("landmark_11769"));
        assert_eq!(row.key()[0], "101 Coffee Shop");
    }

    #[test]
    fn metadata_reads_debug_trailer() {
        let meta: ViewMetaData =
            serde_json::from_str(r#"{"total_rows": 7, "debug": {"node": "n1"}}"#).unwrap();
        assert_eq!(meta.total_rows(), 7);
        assert_eq!(meta.debug_info(), Some(&json!({"node": "n1"})));
    }

    #[test]
    fn reduced_trailer_without_total_rows() {
        let meta: ViewMetaData = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.total_rows(), 0);
        assert!(meta.debug_info().is_none());
    }

    #[test]
    fn metadata_without_debug() {
        let meta: ViewMetaData = serde_json::from_str(r#"{"total_rows": 0}"#).unwrap();
        assert_eq!(meta.total_rows(), 0);
        assert!(meta.debug_info().is_none());
    }
}
