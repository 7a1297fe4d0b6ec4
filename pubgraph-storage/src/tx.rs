//! [`ValueStore`] over one open SQLite transaction.

use crate::fields::load_fields;
use crate::sql::{
    MAX_ROWS_PER_STATEMENT, id_at, opt_text, placeholders, row_placeholders, text,
};
use crate::traits::{
    Edge, EdgeIndex, ExistingRelation, FieldFilter, NewPub, PendingValue, ValidatedValue,
    ValueStore,
};
use crate::{StorageError, StorageResult};
use pubgraph_model::{ValidationError, ValueValidator};
use pubgraph_types::{CommunityId, PubId, StageId, Timestamp, ValueId};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Borrowed view of a connection that is inside a transaction.
///
/// Obtained from [`crate::PubStore::with_transaction`]; every call made
/// through it commits or rolls back together.
pub struct StoreTx<'a> {
    conn: &'a Connection,
    validator: &'a dyn ValueValidator,
}

impl<'a> StoreTx<'a> {
    pub(crate) fn new(conn: &'a Connection, validator: &'a dyn ValueValidator) -> Self {
        Self { conn, validator }
    }

    fn upsert_values(&self, rows: &[ValidatedValue], conflict: &str) -> StorageResult<usize> {
        let now = Timestamp::now().as_millis();
        let mut written = 0;
        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "INSERT INTO pub_values (id, pub_id, field_id, value, related_pub_id, created_at, updated_at) \
                 VALUES {} {conflict} DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                row_placeholders(chunk.len(), 7)
            );
            let mut args = Vec::with_capacity(chunk.len() * 7);
            for row in chunk {
                args.push(text(ValueId::new()));
                args.push(text(row.pub_id));
                args.push(text(row.field_id));
                args.push(SqlValue::Text(serde_json::to_string(&row.value)?));
                args.push(opt_text(row.related_pub_id));
                args.push(SqlValue::Integer(now));
                args.push(SqlValue::Integer(now));
            }
            written += self.conn.execute(&sql, params_from_iter(args))?;
        }
        Ok(written)
    }

    fn edges_where(&self, column: &str, pub_ids: &[PubId]) -> StorageResult<Vec<Edge>> {
        let mut edges = Vec::new();
        for chunk in pub_ids.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "SELECT DISTINCT pub_id, related_pub_id FROM pub_values \
                 WHERE related_pub_id IS NOT NULL AND {column} IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter().map(text)), |row| {
                    Ok(Edge {
                        source: id_at(row, 0)?,
                        target: id_at(row, 1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            edges.extend(rows);
        }
        Ok(edges)
    }

    fn delete_where_id_in<T: ToString>(&self, table: &str, ids: &[T]) -> StorageResult<usize> {
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!("DELETE FROM {table} WHERE id IN ({})", placeholders(chunk.len()));
            deleted += self
                .conn
                .execute(&sql, params_from_iter(chunk.iter().map(|id| text(id.to_string()))))?;
        }
        Ok(deleted)
    }
}

impl EdgeIndex for StoreTx<'_> {
    fn outgoing(&self, pub_ids: &[PubId]) -> StorageResult<Vec<Edge>> {
        self.edges_where("pub_id", pub_ids)
    }

    fn incoming(&self, pub_ids: &[PubId]) -> StorageResult<Vec<Edge>> {
        self.edges_where("related_pub_id", pub_ids)
    }
}

impl ValueStore for StoreTx<'_> {
    fn insert_pubs(&self, rows: &[NewPub]) -> StorageResult<Vec<PubId>> {
        let now = Timestamp::now().as_millis();
        let mut inserted = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "INSERT INTO pubs (id, community_id, pub_type_id, stage_id, created_at, updated_at) \
                 VALUES {} ON CONFLICT(id) DO NOTHING RETURNING id",
                row_placeholders(chunk.len(), 6)
            );
            let mut args = Vec::with_capacity(chunk.len() * 6);
            for row in chunk {
                args.push(text(row.id));
                args.push(text(row.community_id));
                args.push(text(row.pub_type_id));
                args.push(opt_text(row.stage_id));
                args.push(SqlValue::Integer(now));
                args.push(SqlValue::Integer(now));
            }
            let mut stmt = self.conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params_from_iter(args), |row| id_at::<PubId>(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            inserted.extend(ids);
        }
        debug!("Inserted {} of {} requested pubs", inserted.len(), rows.len());
        Ok(inserted)
    }

    fn existing_pubs(
        &self,
        community: CommunityId,
        ids: &[PubId],
    ) -> StorageResult<HashSet<PubId>> {
        let mut found = HashSet::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = format!(
                "SELECT id FROM pubs WHERE community_id = ? AND id IN ({})",
                placeholders(chunk.len())
            );
            let mut args = Vec::with_capacity(chunk.len() + 1);
            args.push(text(community));
            args.extend(chunk.iter().map(text));
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), |row| id_at::<PubId>(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            found.extend(rows);
        }
        Ok(found)
    }

    fn find_pub_by_value(
        &self,
        community: CommunityId,
        slug: &str,
        value: &Value,
    ) -> StorageResult<Option<PubId>> {
        let encoded = serde_json::to_string(value)?;
        let mut stmt = self.conn.prepare(
            "SELECT v.pub_id FROM pub_values v \
             JOIN pub_fields f ON f.id = v.field_id \
             WHERE f.community_id = ?1 AND f.slug = ?2 \
               AND v.related_pub_id IS NULL AND v.value = ?3 \
             LIMIT 2",
        )?;
        let matches = stmt
            .query_map(params![community.to_string(), slug, encoded], |row| {
                id_at::<PubId>(row, 0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => Err(StorageError::Ambiguous(format!(
                "more than one pub has {slug} = {encoded}"
            ))),
        }
    }

    fn set_stage(&self, pub_id: PubId, stage_id: StageId) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE pubs SET stage_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![stage_id.to_string(), Timestamp::now().as_millis(), pub_id.to_string()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("pub {pub_id}")));
        }
        Ok(())
    }

    fn load_existing_relations(
        &self,
        pub_id: PubId,
        fields: FieldFilter<'_>,
    ) -> StorageResult<Vec<ExistingRelation>> {
        let mut sql = String::from(
            "SELECT v.id, v.related_pub_id, f.slug FROM pub_values v \
             JOIN pub_fields f ON f.id = v.field_id \
             WHERE v.pub_id = ? AND v.related_pub_id IS NOT NULL",
        );
        let mut args = vec![text(pub_id)];
        if let FieldFilter::Slugs(slugs) = fields {
            if slugs.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(" AND f.slug IN ({})", placeholders(slugs.len())));
            args.extend(slugs.iter().map(|s| SqlValue::Text(s.clone())));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let relations = stmt
            .query_map(params_from_iter(args), |row| {
                Ok(ExistingRelation {
                    value_id: id_at(row, 0)?,
                    related_pub_id: id_at(row, 1)?,
                    field_slug: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(relations)
    }

    fn delete_values_by_id(&self, ids: &[ValueId]) -> StorageResult<usize> {
        self.delete_where_id_in("pub_values", ids)
    }

    fn delete_scalar_values(&self, pub_id: PubId, slugs: &[String]) -> StorageResult<usize> {
        if slugs.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM pub_values WHERE pub_id = ? AND related_pub_id IS NULL AND field_id IN (\
                SELECT f.id FROM pub_fields f JOIN pubs p ON p.community_id = f.community_id \
                WHERE p.id = ? AND f.slug IN ({}))",
            placeholders(slugs.len())
        );
        let mut args = vec![text(pub_id), text(pub_id)];
        args.extend(slugs.iter().map(|s| SqlValue::Text(s.clone())));
        Ok(self.conn.execute(&sql, params_from_iter(args))?)
    }

    fn delete_pubs(&self, ids: &[PubId]) -> StorageResult<usize> {
        let deleted = self.delete_where_id_in("pubs", ids)?;
        debug!("Deleted {deleted} pubs");
        Ok(deleted)
    }

    fn validate_values(
        &self,
        community: CommunityId,
        pending: Vec<PendingValue>,
    ) -> StorageResult<Vec<ValidatedValue>> {
        let mut slugs: Vec<&str> = pending.iter().map(|p| p.slug.as_str()).collect();
        slugs.sort_unstable();
        slugs.dedup();
        let fields = load_fields(self.conn, community, Some(slugs.as_slice()))?;

        let mut validated = Vec::with_capacity(pending.len());
        for p in pending {
            let field = fields
                .get(&p.slug)
                .ok_or_else(|| ValidationError::UnknownField { slug: p.slug.clone() })?;
            match (field.is_relation(), p.related_pub_id.is_some()) {
                (true, false) => {
                    return Err(ValidationError::RelationRequired { slug: p.slug }.into());
                }
                (false, true) => {
                    return Err(ValidationError::NotARelation { slug: p.slug }.into());
                }
                _ => {}
            }
            self.validator.validate(field, &p.value)?;
            validated.push(ValidatedValue {
                pub_id: p.pub_id,
                field_id: field.id,
                slug: p.slug,
                value: p.value,
                related_pub_id: p.related_pub_id,
            });
        }
        Ok(validated)
    }

    fn upsert_scalar_values(&self, rows: &[ValidatedValue]) -> StorageResult<usize> {
        self.upsert_values(
            rows,
            "ON CONFLICT(pub_id, field_id) WHERE related_pub_id IS NULL",
        )
    }

    fn upsert_relation_values(&self, rows: &[ValidatedValue]) -> StorageResult<usize> {
        self.upsert_values(
            rows,
            "ON CONFLICT(pub_id, field_id, related_pub_id) WHERE related_pub_id IS NOT NULL",
        )
    }
}
