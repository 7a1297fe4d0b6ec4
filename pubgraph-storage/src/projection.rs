//! Read-side projection: a Pub with its values and nested relations.
//!
//! Relations are followed to a fixed depth, so cyclic graphs project to a
//! finite tree.

use crate::StorageResult;
use crate::sql::{id_at, opt_id_at};
use pubgraph_model::{ProjectedPub, ProjectedRelation, Pub};
use pubgraph_types::{PubId, Timestamp};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

pub(crate) fn load_pub(conn: &Connection, id: PubId) -> StorageResult<Option<Pub>> {
    let record = conn
        .query_row(
            "SELECT id, community_id, pub_type_id, stage_id, created_at, updated_at FROM pubs WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(Pub {
                    id: id_at(row, 0)?,
                    community_id: id_at(row, 1)?,
                    pub_type_id: id_at(row, 2)?,
                    stage_id: opt_id_at(row, 3)?,
                    created_at: Timestamp::from_millis(row.get(4)?),
                    updated_at: Timestamp::from_millis(row.get(5)?),
                })
            },
        )
        .optional()?;
    Ok(record)
}

pub(crate) fn project(conn: &Connection, id: PubId, depth: usize) -> StorageResult<Option<ProjectedPub>> {
    let Some(record) = load_pub(conn, id)? else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT f.slug, v.value, v.related_pub_id FROM pub_values v \
         JOIN pub_fields f ON f.id = v.field_id \
         WHERE v.pub_id = ?1 \
         ORDER BY f.slug, v.created_at, v.id",
    )?;
    let rows = stmt
        .query_map(params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                opt_id_at::<PubId>(row, 2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut values = BTreeMap::new();
    let mut relations = Vec::new();
    for (slug, raw, related_pub_id) in rows {
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        match related_pub_id {
            None => {
                values.insert(slug, value);
            }
            Some(related_pub_id) => {
                let related = if depth > 0 {
                    project(conn, related_pub_id, depth - 1)?.map(Box::new)
                } else {
                    None
                };
                relations.push(ProjectedRelation {
                    field_slug: slug,
                    value,
                    related_pub_id,
                    related,
                });
            }
        }
    }

    Ok(Some(ProjectedPub {
        record,
        values,
        relations,
    }))
}
