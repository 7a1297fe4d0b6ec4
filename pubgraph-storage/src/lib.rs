//! SQLite value store for pubgraph.
//!
//! Persists Pubs, field definitions and value rows, and implements the
//! [`ValueStore`] / [`EdgeIndex`] interface the mutation engine writes
//! through.
//!
//! # Architecture
//!
//! - One connection behind a mutex; writes run inside
//!   [`PubStore::with_transaction`] and see a [`StoreTx`]
//! - Relation values are value rows with a `related_pub_id`, so a field can
//!   hold many valued edges and each is addressable by its value id
//! - Multi-row statements for bulk writes, chunked below the parameter limit
//! - A depth-bounded projection for reading a Pub back with its relations

mod error;
mod fields;
mod projection;
mod schema;
mod sql;
mod store;
mod traits;
mod tx;

pub use error::{StorageError, StorageResult};
pub use store::PubStore;
pub use traits::{
    Edge, EdgeIndex, ExistingRelation, FieldFilter, NewPub, PendingValue, ValidatedValue,
    ValueStore,
};
pub use tx::StoreTx;
