//! Table definitions.
//!
//! Relation values are ordinary value rows with `related_pub_id` set, so one
//! Pub can hold many edges per field. Deleting a Pub cascades to the values
//! it owns and to every edge pointing at it.

use crate::StorageResult;
use rusqlite::Connection;

pub(crate) fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS pubs (
            id TEXT PRIMARY KEY,
            community_id TEXT NOT NULL,
            pub_type_id TEXT NOT NULL,
            stage_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pub_fields (
            id TEXT PRIMARY KEY,
            community_id TEXT NOT NULL,
            slug TEXT NOT NULL,
            schema_name TEXT NOT NULL,
            relation_value TEXT,
            UNIQUE(community_id, slug)
        );

        CREATE TABLE IF NOT EXISTS pub_values (
            id TEXT PRIMARY KEY,
            pub_id TEXT NOT NULL REFERENCES pubs(id) ON DELETE CASCADE,
            field_id TEXT NOT NULL REFERENCES pub_fields(id) ON DELETE CASCADE,
            value TEXT NOT NULL,
            related_pub_id TEXT REFERENCES pubs(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS pub_values_scalar_key
            ON pub_values(pub_id, field_id) WHERE related_pub_id IS NULL;

        CREATE UNIQUE INDEX IF NOT EXISTS pub_values_relation_key
            ON pub_values(pub_id, field_id, related_pub_id) WHERE related_pub_id IS NOT NULL;

        CREATE INDEX IF NOT EXISTS pub_values_related
            ON pub_values(related_pub_id) WHERE related_pub_id IS NOT NULL;

        CREATE INDEX IF NOT EXISTS pubs_community ON pubs(community_id);
        ",
    )?;
    Ok(())
}
