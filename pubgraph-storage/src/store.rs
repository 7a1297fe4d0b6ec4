//! Connection owner and transaction entry point.

use crate::fields::{insert_field, load_fields};
use crate::projection::{load_pub, project};
use crate::schema::init_schema;
use crate::sql::id_at;
use crate::{StorageError, StorageResult, StoreTx};
use pubgraph_model::{ProjectedPub, Pub, PubField, SchemaValidator, ValueValidator};
use pubgraph_types::{CommunityId, PubId};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// SQLite-backed store for pubs, fields and values.
///
/// Cloning is cheap; clones share one connection. Every write made by the
/// engine goes through [`PubStore::with_transaction`], which holds the
/// connection for the whole transaction.
#[derive(Clone)]
pub struct PubStore {
    conn: Arc<Mutex<Connection>>,
    validator: Arc<dyn ValueValidator>,
}

impl PubStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        debug!("Opening pub store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            validator: Arc::new(SchemaValidator),
        })
    }

    /// Replaces the validator applied to staged values.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn ValueValidator>) -> Self {
        self.validator = validator;
        self
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            warn!("Pub store connection lock poisoned");
            StorageError::LockPoisoned
        })
    }

    /// Runs `f` inside one transaction. Commits if `f` returns `Ok`, rolls
    /// back otherwise.
    pub fn with_transaction<T, E>(
        &self,
        f: impl FnOnce(&StoreTx<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StorageError::from)?;
        let out = {
            let store_tx = StoreTx::new(&tx, self.validator.as_ref());
            f(&store_tx)?
        };
        tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }

    // ── Fields ───────────────────────────────────────────────────

    /// Registers a field definition.
    pub fn create_field(&self, field: &PubField) -> StorageResult<()> {
        let conn = self.lock()?;
        insert_field(&conn, field)
    }

    /// Looks up one field by slug.
    pub fn field(&self, community: CommunityId, slug: &str) -> StorageResult<Option<PubField>> {
        let conn = self.lock()?;
        let slugs = [slug];
        Ok(load_fields(&conn, community, Some(&slugs[..]))?.remove(slug))
    }

    /// All fields of a community, sorted by slug.
    pub fn fields(&self, community: CommunityId) -> StorageResult<Vec<PubField>> {
        let conn = self.lock()?;
        let mut fields: Vec<PubField> = load_fields(&conn, community, None)?.into_values().collect();
        fields.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(fields)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Loads a Pub row without its values.
    pub fn get_pub(&self, id: PubId) -> StorageResult<Option<Pub>> {
        let conn = self.lock()?;
        load_pub(&conn, id)
    }

    pub fn pub_exists(&self, id: PubId) -> StorageResult<bool> {
        Ok(self.get_pub(id)?.is_some())
    }

    /// Loads a Pub with its values, following relations `depth` levels deep.
    pub fn project(&self, id: PubId, depth: usize) -> StorageResult<Option<ProjectedPub>> {
        let conn = self.lock()?;
        project(&conn, id, depth)
    }

    /// Ids of every Pub in a community, oldest first.
    pub fn pub_ids(&self, community: CommunityId) -> StorageResult<Vec<PubId>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id FROM pubs WHERE community_id = ?1 ORDER BY created_at, id")?;
        let ids = stmt
            .query_map(params![community.to_string()], |row| id_at::<PubId>(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Number of value rows (scalar and relation) owned by a Pub.
    pub fn count_values(&self, id: PubId) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pub_values WHERE pub_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
