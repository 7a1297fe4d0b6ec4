use crate::{FieldType, PubField};
use serde_json::Value;
use thiserror::Error;

/// A staged value that does not fit its field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no field with slug '{slug}' in this community")]
    UnknownField { slug: String },

    #[error("field '{slug}' is a relation field; use connect instead of set")]
    RelationRequired { slug: String },

    #[error("field '{slug}' is not a relation field; use set instead of connect")]
    NotARelation { slug: String },

    #[error("field '{slug}' expects {expected}, got {found}")]
    TypeMismatch {
        slug: String,
        expected: FieldType,
        found: String,
    },

    #[error("value for '{slug}' rejected: {reason}")]
    Rejected { slug: String, reason: String },
}

/// Validates staged payloads before they are persisted.
///
/// The default implementation only checks the payload against the field's
/// declared type. Implement this to layer extra rules (length limits,
/// allowed values) on top; call [`check_payload`] to keep the type check.
pub trait ValueValidator: Send + Sync {
    /// Validate `value` as a payload for `field`. For relation fields the
    /// payload is the edge value, not the target.
    fn validate(&self, field: &PubField, value: &Value) -> Result<(), ValidationError> {
        check_payload(field, value)
    }
}

/// Validator that applies only the declared field types.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl ValueValidator for SchemaValidator {}

/// Checks `value` against `field.payload_type()`.
pub fn check_payload(field: &PubField, value: &Value) -> Result<(), ValidationError> {
    let expected = field.payload_type();
    if expected.accepts(value) {
        return Ok(());
    }
    Err(ValidationError::TypeMismatch {
        slug: field.slug.clone(),
        expected,
        found: json_kind(value).to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
