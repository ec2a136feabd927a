//! Helpers for working with schemaless rows.

use serde_json::{Map, Value};

use super::error::DomainError;

/// Extract a row identifier as a string. Only strings and numbers qualify.
pub fn record_id(record: &Value, id_field: &str) -> Option<String> {
    match record.get(id_field)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Validate a client write and build the row to insert.
///
/// Every field in `required` must be present and non-null. When `required` is
/// empty the whole object is forwarded; otherwise only the required fields are.
pub fn prepare_insert(payload: Value, required: &[String]) -> Result<Map<String, Value>, DomainError> {
    let Value::Object(mut fields) = payload else {
        return Err(DomainError::PayloadNotObject);
    };

    if let Some(missing) = required
        .iter()
        .find(|field| fields.get(field.as_str()).is_none_or(Value::is_null))
    {
        return Err(DomainError::missing_field(missing.as_str()));
    }

    if required.is_empty() {
        return Ok(fields);
    }

    let mut row = Map::with_capacity(required.len());
    for field in required {
        if let Some(value) = fields.remove(field.as_str()) {
            row.insert(field.clone(), value);
        }
    }
    Ok(row)
}
