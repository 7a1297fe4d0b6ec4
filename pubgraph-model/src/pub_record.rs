use pubgraph_types::{CommunityId, FieldId, PubId, PubTypeId, StageId, Timestamp, ValueId};
use serde::{Deserialize, Serialize};

/// A typed content record stored in the pub graph.
///
/// Pubs are mutable, but `id` never changes once the row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pub {
    pub id: PubId,
    pub community_id: CommunityId,
    pub pub_type_id: PubTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One stored value row, owned by a single Pub and bound to a single field.
///
/// For relation fields `related_pub_id` is the edge target and `value`
/// describes the edge itself (a caption, an ordering key, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubValue {
    pub id: ValueId,
    pub pub_id: PubId,
    pub field_id: FieldId,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_pub_id: Option<PubId>,
}

impl PubValue {
    /// Returns true if this row is an edge to another Pub.
    pub fn is_relation(&self) -> bool {
        self.related_pub_id.is_some()
    }
}
