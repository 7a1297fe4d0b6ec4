//! Field definition reads and writes.

use crate::sql::{id_at, placeholders, text};
use crate::{StorageError, StorageResult};
use pubgraph_model::{FieldType, PubField};
use pubgraph_types::{CommunityId, FieldId};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use std::collections::HashMap;

pub(crate) fn insert_field(conn: &Connection, field: &PubField) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO pub_fields (id, community_id, slug, schema_name, relation_value) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            field.id.to_string(),
            field.community_id.to_string(),
            field.slug,
            field.schema.as_str(),
            field.relation_value.map(|t| t.as_str()),
        ],
    )?;
    Ok(())
}

/// Loads the fields of `community`, restricted to `slugs` when given.
pub(crate) fn load_fields(
    conn: &Connection,
    community: CommunityId,
    slugs: Option<&[&str]>,
) -> StorageResult<HashMap<String, PubField>> {
    let mut sql = String::from(
        "SELECT id, community_id, slug, schema_name, relation_value FROM pub_fields WHERE community_id = ?",
    );
    let mut args = vec![text(community)];
    if let Some(slugs) = slugs {
        if slugs.is_empty() {
            return Ok(HashMap::new());
        }
        sql.push_str(&format!(" AND slug IN ({})", placeholders(slugs.len())));
        args.extend(slugs.iter().map(|s| SqlValue::Text((*s).to_string())));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args), |row| {
            Ok((
                id_at::<FieldId>(row, 0)?,
                id_at::<CommunityId>(row, 1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut fields = HashMap::with_capacity(rows.len());
    for (id, community_id, slug, schema_name, relation_value) in rows {
        let schema = parse_field_type(&schema_name)?;
        let relation_value = relation_value.as_deref().map(parse_field_type).transpose()?;
        fields.insert(
            slug.clone(),
            PubField {
                id,
                community_id,
                slug,
                schema,
                relation_value,
            },
        );
    }
    Ok(fields)
}

fn parse_field_type(s: &str) -> StorageResult<FieldType> {
    FieldType::parse(s).ok_or_else(|| StorageError::InvalidData(format!("unknown field type '{s}'")))
}

