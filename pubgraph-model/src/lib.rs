//! Record model for pubgraph.
//!
//! Defines the shapes every other crate agrees on:
//! - [`Pub`] — a typed content record, the node of the relation graph
//! - [`PubField`] / [`FieldType`] — named slots, scalar or relation
//! - [`PubValue`] — one stored value; relation values are also edges
//! - [`ProjectedPub`] — the nested read-side shape returned after a write
//! - [`ValueValidator`] — pluggable validation of staged values

mod field;
mod projection;
mod pub_record;
mod validator;

pub use field::{FieldType, PubField};
pub use projection::{ProjectedPub, ProjectedRelation};
pub use pub_record::{Pub, PubValue};
pub use validator::{check_payload, SchemaValidator, ValidationError, ValueValidator};
