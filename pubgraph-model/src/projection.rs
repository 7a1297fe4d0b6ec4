use crate::Pub;
use pubgraph_types::PubId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A Pub re-read after a write, with scalar values keyed by field slug and
/// outgoing relations resolved to a bounded depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPub {
    #[serde(flatten)]
    pub record: Pub,
    pub values: BTreeMap<String, serde_json::Value>,
    pub relations: Vec<ProjectedRelation>,
}

/// One outgoing edge of a [`ProjectedPub`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedRelation {
    pub field_slug: String,
    pub value: serde_json::Value,
    pub related_pub_id: PubId,
    /// `None` once the projection depth is exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Box<ProjectedPub>>,
}

impl ProjectedPub {
    pub fn id(&self) -> PubId {
        self.record.id
    }

    /// Returns the scalar value stored for `slug`.
    pub fn value(&self, slug: &str) -> Option<&serde_json::Value> {
        self.values.get(slug)
    }

    /// Extract a string scalar value.
    pub fn get_str(&self, slug: &str) -> Option<&str> {
        self.values.get(slug).and_then(|v| v.as_str())
    }

    /// Extract a numeric scalar value.
    pub fn get_number(&self, slug: &str) -> Option<f64> {
        self.values.get(slug).and_then(|v| v.as_f64())
    }

    /// All outgoing edges on one relation field.
    pub fn relations_for<'a>(&'a self, slug: &'a str) -> impl Iterator<Item = &'a ProjectedRelation> + 'a {
        self.relations.iter().filter(move |r| r.field_slug == slug)
    }

    /// Targets of every outgoing edge on one relation field.
    pub fn related_ids(&self, slug: &str) -> Vec<PubId> {
        self.relations_for(slug).map(|r| r.related_pub_id).collect()
    }
}
