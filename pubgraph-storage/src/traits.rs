//! The storage interface the mutation engine is written against.
//!
//! [`crate::StoreTx`] implements both traits over one SQLite transaction.
//! Anything else that can answer these calls inside a single atomic unit
//! can stand in for it.

use crate::StorageResult;
use pubgraph_types::{CommunityId, FieldId, PubId, PubTypeId, StageId, ValueId};
use serde_json::Value;
use std::collections::HashSet;

/// A Pub row to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPub {
    pub id: PubId,
    pub community_id: CommunityId,
    pub pub_type_id: PubTypeId,
    pub stage_id: Option<StageId>,
}

/// A persisted outgoing edge, as loaded for deletion decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRelation {
    pub value_id: ValueId,
    pub related_pub_id: PubId,
    pub field_slug: String,
}

/// Which relation fields to load.
#[derive(Debug, Clone, Copy)]
pub enum FieldFilter<'a> {
    /// Every relation field of the Pub.
    All,
    /// Only the named slugs.
    Slugs(&'a [String]),
}

/// A value staged by an operation, before its field is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingValue {
    pub pub_id: PubId,
    pub slug: String,
    pub value: Value,
    /// Set for relation values.
    pub related_pub_id: Option<PubId>,
}

/// A value whose field exists and whose payload passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedValue {
    pub pub_id: PubId,
    pub field_id: FieldId,
    pub slug: String,
    pub value: Value,
    pub related_pub_id: Option<PubId>,
}

impl ValidatedValue {
    pub fn is_relation(&self) -> bool {
        self.related_pub_id.is_some()
    }
}

/// A directed edge `source -> target`, regardless of field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: PubId,
    pub target: PubId,
}

/// Edge lookups used by the orphan analyzer to walk the graph one frontier
/// at a time instead of scanning it.
pub trait EdgeIndex {
    /// Edges whose source is one of `pub_ids`.
    fn outgoing(&self, pub_ids: &[PubId]) -> StorageResult<Vec<Edge>>;

    /// Edges whose target is one of `pub_ids`.
    fn incoming(&self, pub_ids: &[PubId]) -> StorageResult<Vec<Edge>>;
}

/// Row-level primitives the executor composes into one atomic write.
pub trait ValueStore: EdgeIndex {
    /// Inserts rows, skipping ids that already exist. Returns the ids that
    /// were actually inserted; order is not guaranteed.
    fn insert_pubs(&self, rows: &[NewPub]) -> StorageResult<Vec<PubId>>;

    /// The subset of `ids` that exist in `community`.
    fn existing_pubs(
        &self,
        community: CommunityId,
        ids: &[PubId],
    ) -> StorageResult<HashSet<PubId>>;

    /// Finds the single Pub in `community` whose scalar `slug` equals `value`.
    fn find_pub_by_value(
        &self,
        community: CommunityId,
        slug: &str,
        value: &Value,
    ) -> StorageResult<Option<PubId>>;

    /// Moves a Pub to another stage.
    fn set_stage(&self, pub_id: PubId, stage_id: StageId) -> StorageResult<()>;

    /// Persisted outgoing edges of one Pub.
    fn load_existing_relations(
        &self,
        pub_id: PubId,
        fields: FieldFilter<'_>,
    ) -> StorageResult<Vec<ExistingRelation>>;

    fn delete_values_by_id(&self, ids: &[ValueId]) -> StorageResult<usize>;

    /// Deletes scalar rows of the named fields of one Pub.
    fn delete_scalar_values(&self, pub_id: PubId, slugs: &[String]) -> StorageResult<usize>;

    /// Deletes Pubs together with their values and every edge pointing at them.
    fn delete_pubs(&self, ids: &[PubId]) -> StorageResult<usize>;

    /// Resolves each value's field in `community` and validates its payload.
    /// Fails on the first value that does not fit.
    fn validate_values(
        &self,
        community: CommunityId,
        pending: Vec<PendingValue>,
    ) -> StorageResult<Vec<ValidatedValue>>;

    /// Writes scalar rows, replacing the current value of each (pub, field).
    fn upsert_scalar_values(&self, rows: &[ValidatedValue]) -> StorageResult<usize>;

    /// Writes relation rows, replacing the edge value of each (pub, field, target).
    fn upsert_relation_values(&self, rows: &[ValidatedValue]) -> StorageResult<usize>;
}
