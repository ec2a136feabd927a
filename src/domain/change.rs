//! Row-level change notifications pushed by the backing store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::record_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// Webhook payload describing one row change.
///
/// `table` and `schema` are optional; database webhooks include them but
/// hand-rolled notifiers usually do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ChangeEvent {
    /// Identifier of the row this event is about.
    ///
    /// Deletes look at `old_record` first, inserts and updates at `record`.
    pub fn subject_id(&self, id_field: &str) -> Option<String> {
        let (primary, fallback) = match self.kind {
            ChangeKind::Delete => (&self.old_record, &self.record),
            ChangeKind::Insert | ChangeKind::Update => (&self.record, &self.old_record),
        };
        primary
            .as_ref()
            .and_then(|row| record_id(row, id_field))
            .or_else(|| fallback.as_ref().and_then(|row| record_id(row, id_field)))
    }

    /// Whether the event concerns `table`. Events without a table match everything.
    pub fn targets(&self, table: &str) -> bool {
        self.table.as_deref().is_none_or(|name| name == table)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_webhook_payload() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "type": "UPDATE",
            "table": "weather",
            "schema": "public",
            "record": {"id": 1, "temp": 25},
            "old_record": {"id": 1, "temp": 20}
        }))
        .expect("valid payload");

        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.table.as_deref(), Some("weather"));
        assert_eq!(event.subject_id("id").as_deref(), Some("1"));
    }

    #[test]
    fn missing_records_default_to_none() {
        let event: ChangeEvent =
            serde_json::from_value(json!({"type": "INSERT"})).expect("valid payload");
        assert!(event.record.is_none());
        assert!(event.old_record.is_none());
        assert!(event.subject_id("id").is_none());
    }

    #[test]
    fn rejects_unknown_kinds() {
        let result = serde_json::from_value::<ChangeEvent>(json!({"type": "TRUNCATE"}));
        assert!(result.is_err());
    }

    #[test]
    fn delete_prefers_old_record() {
        let event = ChangeEvent {
            kind: ChangeKind::Delete,
            record: Some(json!({"id": "new"})),
            old_record: Some(json!({"id": "old"})),
            table: None,
            schema: None,
        };
        assert_eq!(event.subject_id("id").as_deref(), Some("old"));

        let event = ChangeEvent {
            old_record: None,
            ..event
        };
        assert_eq!(event.subject_id("id").as_deref(), Some("new"));
    }

    #[test]
    fn table_filter() {
        let mut event = ChangeEvent {
            kind: ChangeKind::Insert,
            record: None,
            old_record: None,
            table: None,
            schema: None,
        };
        assert!(event.targets("weather"));

        event.table = Some("articles".to_string());
        assert!(event.targets("articles"));
        assert!(!event.targets("weather"));
    }
}
