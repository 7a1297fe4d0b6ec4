//! Error types for the mutation engine.

use crate::builder::BuilderId;
use pubgraph_model::ValidationError;
use pubgraph_storage::StorageError;
use pubgraph_types::PubId;
use thiserror::Error;

/// Result type for engine operations.
pub type OpsResult<T> = Result<T, OpsError>;

/// Everything that can abort an execution. Any of these rolls back the
/// whole transaction.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Storage failure other than validation.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// A staged value does not fit its field.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// `create` against an id that is already taken, or `upsert` against
    /// an id taken in another community.
    #[error("cannot create a Pub with an id that already exists: {0}")]
    CreateConflict(PubId),

    /// `update` against a Pub that does not exist in the mutation's
    /// community.
    #[error("pub not found: {0}")]
    PubNotFound(PubId),

    /// `update_by_value` found nothing to update.
    #[error("no pub has {slug} = {value}")]
    NoMatchForValue { slug: String, value: String },

    /// A new edge points at a Pub that neither exists nor is created here.
    #[error("relation '{slug}' on {pub_id} targets missing pub {target}")]
    MissingRelatedPub {
        pub_id: PubId,
        slug: String,
        target: PubId,
    },

    /// A by-value target was used before it was resolved.
    #[error("operation keyed by '{0}' has not been resolved to a pub id")]
    UnresolvedTarget(String),

    /// A handle that was not registered on the mutation it is used with.
    #[error("unknown operation {0}: handle belongs to another mutation")]
    UnknownOperation(BuilderId),

    /// Mutations from different communities operate on the same Pub.
    #[error("pub {0} is operated on from more than one community")]
    CommunityMismatch(PubId),

    /// A batch item failed while it was being prepared.
    #[error("batch preparation failed: {0}")]
    Preparation(String),

    /// The blocking task running the transaction panicked or was cancelled.
    #[error("execution task failed: {0}")]
    Join(String),
}

impl OpsError {
    /// Wraps any error raised while preparing a batch item.
    pub fn preparation(err: impl std::fmt::Display) -> Self {
        Self::Preparation(err.to_string())
    }
}

impl From<StorageError> for OpsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(e) => Self::Validation(e),
            other => Self::Storage(other),
        }
    }
}
