//! Relation graph mutation engine for pubgraph.
//!
//! Build a [`Mutation`] of create, upsert and update operations that may
//! connect to one another in any shape, then execute it atomically:
//!
//! - [`builder`]: the operation arena and typed handles
//! - [`collector`]: flattens reachable operations into one entry per Pub
//! - [`executor`]: runs the create, relations, orphan GC and values phases
//! - [`orphan`]: finds Pubs left unreachable by removed edges
//! - [`batch`]: prepares many mutations concurrently, executes them together

pub mod batch;
pub mod builder;
pub mod collector;
mod config;
mod error;
pub mod executor;
pub mod orphan;

pub use batch::Batch;
pub use builder::{
    BuilderId, ConnectOptions, Create, Mode, Mutation, OpEditor, PubOp, RelationTarget,
    RemoveOptions, Update, UpdateCapable, Upsert,
};
pub use collector::{OperationMap, PubOperation, ResolvedKeys, WriteMode};
pub use config::EngineConfig;
pub use error::{OpsError, OpsResult};
pub use executor::{ExecutionReport, execute_mutations};
pub use orphan::find_orphans;
