//! Core type definitions for pubgraph.
//!
//! This crate defines the fundamental types shared by every layer of the
//! engine:
//! - Pub, community, pub type, stage, field and value identifiers (UUID v7)
//! - Millisecond timestamps used for row bookkeeping
//!
//! Record shapes (pubs, fields, values) live in `pubgraph-model`.

mod ids;
mod timestamp;

pub use ids::{CommunityId, FieldId, PubId, PubTypeId, StageId, ValueId};
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
