use pubgraph_types::{CommunityId, FieldId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, typed slot a Pub can hold values for.
///
/// Slugs are unique within a community. A relation field's values point at
/// other Pubs; `relation_value` types the payload carried on each edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubField {
    pub id: FieldId,
    pub community_id: CommunityId,
    pub slug: String,
    pub schema: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_value: Option<FieldType>,
}

impl PubField {
    /// Shorthand for a scalar field.
    pub fn scalar(community_id: CommunityId, slug: &str, schema: FieldType) -> Self {
        Self {
            id: FieldId::new(),
            community_id,
            slug: slug.into(),
            schema,
            relation_value: None,
        }
    }

    /// Shorthand for a relation field whose edges carry `edge_value` payloads.
    pub fn relation(community_id: CommunityId, slug: &str, edge_value: FieldType) -> Self {
        Self {
            id: FieldId::new(),
            community_id,
            slug: slug.into(),
            schema: FieldType::Relation,
            relation_value: Some(edge_value),
        }
    }

    pub fn is_relation(&self) -> bool {
        self.schema == FieldType::Relation
    }

    /// The type a stored payload must have: the field's own schema for
    /// scalars, the edge payload type for relations.
    pub fn payload_type(&self) -> FieldType {
        if self.is_relation() {
            self.relation_value.unwrap_or(FieldType::Json)
        } else {
            self.schema
        }
    }
}

/// The data type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// RFC 3339 string.
    DateTime,
    /// Any JSON value, including null.
    Json,
    Relation,
}

impl FieldType {
    /// Returns true if `value` is an acceptable payload for this type.
    ///
    /// `Relation` accepts nothing on its own; relation payloads are checked
    /// against the field's `relation_value` type instead.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::DateTime => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            FieldType::Json => true,
            FieldType::Relation => false,
        }
    }

    /// Stable name used for storage and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "date_time",
            FieldType::Json => "json",
            FieldType::Relation => "relation",
        }
    }

    /// Inverse of [`FieldType::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            "date_time" => Some(FieldType::DateTime),
            "json" => Some(FieldType::Json),
            "relation" => Some(FieldType::Relation),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
