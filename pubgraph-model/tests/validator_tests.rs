use pubgraph_model::{
    FieldType, PubField, SchemaValidator, ValidationError, ValueValidator, check_payload,
};
use pubgraph_types::CommunityId;
use serde_json::{Value, json};

fn title_field() -> PubField {
    PubField::scalar(CommunityId::new(), "title", FieldType::String)
}

#[test]
fn schema_validator_accepts_matching_type() {
    assert!(SchemaValidator.validate(&title_field(), &json!("Hello")).is_ok());
}

#[test]
fn schema_validator_reports_mismatch() {
    let err = SchemaValidator.validate(&title_field(), &json!(42)).unwrap_err();
    assert_eq!(
        err,
        ValidationError::TypeMismatch {
            slug: "title".into(),
            expected: FieldType::String,
            found: "number".into(),
        }
    );
    assert_eq!(err.to_string(), "field 'title' expects string, got number");
}

#[test]
fn relation_payload_checked_against_edge_type() {
    let field = PubField::relation(CommunityId::new(), "authors", FieldType::Number);
    assert!(check_payload(&field, &json!(1)).is_ok());
    assert!(check_payload(&field, &json!("first")).is_err());
}

struct MaxLength(usize);

impl ValueValidator for MaxLength {
    fn validate(&self, field: &PubField, value: &Value) -> Result<(), ValidationError> {
        check_payload(field, value)?;
        match value.as_str() {
            Some(s) if s.len() > self.0 => Err(ValidationError::Rejected {
                slug: field.slug.clone(),
                reason: format!("longer than {} bytes", self.0),
            }),
            _ => Ok(()),
        }
    }
}

#[test]
fn custom_validator_layers_on_type_check() {
    let v = MaxLength(3);
    assert!(v.validate(&title_field(), &json!("abc")).is_ok());
    assert!(matches!(
        v.validate(&title_field(), &json!("abcd")),
        Err(ValidationError::Rejected { .. })
    ));
    assert!(matches!(
        v.validate(&title_field(), &json!(1)),
        Err(ValidationError::TypeMismatch { .. })
    ));
}
