use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid collection name `{name}`: {reason}")]
    InvalidCollectionName { name: String, reason: &'static str },
    #[error("payload must be a JSON object")]
    PayloadNotObject,
    #[error("required field `{field}` is missing")]
    MissingField { field: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidCollectionName {
            name: name.into(),
            reason,
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
