//! Operation builder.
//!
//! A [`Mutation`] is an arena of pending Pub operations. Factory methods
//! register an operation and hand back an [`OpEditor`]; the editor records
//! intent and yields a copyable [`PubOp`] handle that other operations can
//! connect to. Handles are indices tagged with their owning mutation, so
//! operations may reference each other in cycles and a handle used with
//! the wrong mutation fails execution instead of aliasing another
//! operation.
//!
//! The mode is a type parameter. Relation removal and `unset` only exist on
//! editors for existing Pubs:
//!
//! ```compile_fail
//! use pubgraph_ops::{Mutation, RemoveOptions};
//! use pubgraph_types::{CommunityId, PubId, PubTypeId};
//!
//! let mut m = Mutation::new(CommunityId::new());
//! m.create(PubTypeId::new())
//!     .disconnect("cites", PubId::new(), RemoveOptions::default());
//! ```

use crate::error::{OpsError, OpsResult};
use pubgraph_types::{CommunityId, PubId, PubTypeId, StageId};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MUTATION: AtomicU64 = AtomicU64::new(1);

/// Index of an operation inside the [`Mutation`] that registered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuilderId {
    pub(crate) mutation: u64,
    pub(crate) index: usize,
}

impl fmt::Display for BuilderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}.{}", self.mutation, self.index)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Operation mode marker.
pub trait Mode: sealed::Sealed {}

/// Modes whose target may already exist, and so may lose relations.
pub trait UpdateCapable: Mode {}

/// The Pub must not exist yet.
#[derive(Debug)]
pub enum Create {}
/// The Pub is created if missing and updated otherwise.
#[derive(Debug)]
pub enum Upsert {}
/// The Pub must already exist.
#[derive(Debug)]
pub enum Update {}

impl sealed::Sealed for Create {}
impl sealed::Sealed for Upsert {}
impl sealed::Sealed for Update {}
impl Mode for Create {}
impl Mode for Upsert {}
impl Mode for Update {}
impl UpdateCapable for Upsert {}
impl UpdateCapable for Update {}

/// Typed handle to an operation registered in a [`Mutation`].
pub struct PubOp<M> {
    id: BuilderId,
    _mode: PhantomData<fn() -> M>,
}

impl<M> PubOp<M> {
    fn new(id: BuilderId) -> Self {
        Self {
            id,
            _mode: PhantomData,
        }
    }

    pub fn id(&self) -> BuilderId {
        self.id
    }
}

impl<M> Clone for PubOp<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for PubOp<M> {}

impl<M> fmt::Debug for PubOp<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PubOp").field(&self.id).finish()
    }
}

impl<M> PartialEq for PubOp<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for PubOp<M> {}

/// The far end of a staged edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationTarget {
    /// A Pub that is not operated on by this mutation.
    Pub(PubId),
    /// Another operation of the same mutation.
    Op(BuilderId),
}

impl From<PubId> for RelationTarget {
    fn from(id: PubId) -> Self {
        Self::Pub(id)
    }
}

impl<M> From<PubOp<M>> for RelationTarget {
    fn from(op: PubOp<M>) -> Self {
        Self::Op(op.id)
    }
}

impl<M> From<&PubOp<M>> for RelationTarget {
    fn from(op: &PubOp<M>) -> Self {
        Self::Op(op.id)
    }
}

/// Options for [`OpEditor::connect_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Replace every persisted edge of the field.
    pub override_existing: bool,
    /// Offer the replaced targets to orphan cleanup.
    pub delete_orphaned: bool,
}

impl ConnectOptions {
    pub fn overriding() -> Self {
        Self {
            override_existing: true,
            delete_orphaned: false,
        }
    }

    pub fn delete_orphaned(mut self) -> Self {
        self.delete_orphaned = true;
        self
    }
}

/// Options for relation removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Offer the unlinked targets to orphan cleanup.
    pub delete_orphaned: bool,
}

impl RemoveOptions {
    pub fn delete_orphaned() -> Self {
        Self {
            delete_orphaned: true,
        }
    }
}

/// Mode as stored in the arena, with the data each mode needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Create { pub_type_id: PubTypeId },
    Upsert { pub_type_id: PubTypeId },
    Update,
}

/// How an operation finds its Pub.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PubKey {
    Id(PubId),
    ByValue { slug: String, value: Value },
}

/// Which relation fields a clear applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClearScope {
    Field(String),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Set {
        slug: String,
        value: Value,
    },
    Connect {
        slug: String,
        target: RelationTarget,
        value: Value,
        options: ConnectOptions,
    },
    Disconnect {
        slug: String,
        target: RelationTarget,
        options: RemoveOptions,
    },
    Clear {
        scope: ClearScope,
        options: RemoveOptions,
    },
    Unset {
        slug: String,
    },
    Stage(StageId),
}

#[derive(Debug, Clone)]
pub(crate) struct OpNode {
    pub(crate) kind: OpKind,
    pub(crate) key: PubKey,
    pub(crate) commands: Vec<Command>,
}

/// Arena of pending operations against one community.
///
/// Nothing touches storage until the mutation is executed, which consumes
/// it. A clone shares the tag of its source, so handles stay valid in both.
#[derive(Debug, Clone)]
pub struct Mutation {
    tag: u64,
    community_id: CommunityId,
    nodes: Vec<OpNode>,
    roots: Vec<BuilderId>,
    /// First handle from another mutation passed to [`Mutation::edit`].
    foreign_edit: Option<BuilderId>,
}

impl Mutation {
    pub fn new(community_id: CommunityId) -> Self {
        Self {
            tag: NEXT_MUTATION.fetch_add(1, Ordering::Relaxed),
            community_id,
            nodes: Vec::new(),
            roots: Vec::new(),
            foreign_edit: None,
        }
    }

    pub fn community_id(&self) -> CommunityId {
        self.community_id
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a Pub with a freshly generated id.
    pub fn create(&mut self, pub_type_id: PubTypeId) -> OpEditor<'_, Create> {
        self.create_with_id(PubId::new(), pub_type_id)
    }

    /// Creates a Pub with a caller-chosen id. Execution fails if it exists.
    pub fn create_with_id(&mut self, id: PubId, pub_type_id: PubTypeId) -> OpEditor<'_, Create> {
        self.register(OpKind::Create { pub_type_id }, PubKey::Id(id))
    }

    /// Creates the Pub if `id` is free, otherwise updates it.
    pub fn upsert(&mut self, id: PubId, pub_type_id: PubTypeId) -> OpEditor<'_, Upsert> {
        self.register(OpKind::Upsert { pub_type_id }, PubKey::Id(id))
    }

    /// Updates the Pub whose scalar `slug` equals `value`, or creates one.
    pub fn upsert_by_value(
        &mut self,
        slug: impl Into<String>,
        value: impl Into<Value>,
        pub_type_id: PubTypeId,
    ) -> OpEditor<'_, Upsert> {
        let key = PubKey::ByValue {
            slug: slug.into(),
            value: value.into(),
        };
        self.register(OpKind::Upsert { pub_type_id }, key)
    }

    /// Updates an existing Pub. Execution fails if it does not exist.
    pub fn update(&mut self, id: PubId) -> OpEditor<'_, Update> {
        self.register(OpKind::Update, PubKey::Id(id))
    }

    /// Updates the existing Pub whose scalar `slug` equals `value`.
    pub fn update_by_value(
        &mut self,
        slug: impl Into<String>,
        value: impl Into<Value>,
    ) -> OpEditor<'_, Update> {
        let key = PubKey::ByValue {
            slug: slug.into(),
            value: value.into(),
        };
        self.register(OpKind::Update, key)
    }

    /// Reopens a previously registered operation for editing.
    ///
    /// A handle from another mutation records nothing and makes execution
    /// fail with [`OpsError::UnknownOperation`].
    pub fn edit<M: Mode>(&mut self, op: PubOp<M>) -> OpEditor<'_, M> {
        OpEditor {
            mutation: self,
            id: op.id,
            _mode: PhantomData,
        }
    }

    /// Marks an operation as a root of this mutation.
    ///
    /// Only operations reachable from a root are executed. A mutation with
    /// no marked root treats every operation as one.
    pub fn add_root<M>(&mut self, op: PubOp<M>) -> &mut Self {
        if !self.roots.contains(&op.id) {
            self.roots.push(op.id);
        }
        self
    }

    /// The marked roots, or every operation when none is marked.
    pub fn roots(&self) -> Vec<BuilderId> {
        if self.roots.is_empty() {
            (0..self.nodes.len()).map(|index| self.builder_id(index)).collect()
        } else {
            self.roots.clone()
        }
    }

    pub(crate) fn set_roots(&mut self, roots: Vec<BuilderId>) {
        self.roots = roots;
    }

    pub(crate) fn node(&self, id: BuilderId) -> OpsResult<&OpNode> {
        if id.mutation != self.tag {
            return Err(OpsError::UnknownOperation(id));
        }
        self.nodes
            .get(id.index)
            .ok_or(OpsError::UnknownOperation(id))
    }

    /// Fails if any handle recorded on this mutation belongs to another.
    pub(crate) fn check_handles(&self) -> OpsResult<()> {
        if let Some(id) = self.foreign_edit {
            return Err(OpsError::UnknownOperation(id));
        }
        for root in &self.roots {
            self.node(*root)?;
        }
        for node in &self.nodes {
            for command in &node.commands {
                if let Command::Connect {
                    target: RelationTarget::Op(other),
                    ..
                }
                | Command::Disconnect {
                    target: RelationTarget::Op(other),
                    ..
                } = command
                {
                    self.node(*other)?;
                }
            }
        }
        Ok(())
    }

    fn builder_id(&self, index: usize) -> BuilderId {
        BuilderId {
            mutation: self.tag,
            index,
        }
    }

    fn register<M: Mode>(&mut self, kind: OpKind, key: PubKey) -> OpEditor<'_, M> {
        let id = self.builder_id(self.nodes.len());
        self.nodes.push(OpNode {
            kind,
            key,
            commands: Vec::new(),
        });
        OpEditor {
            mutation: self,
            id,
            _mode: PhantomData,
        }
    }
}

/// Records commands on one operation. Every method returns the editor so
/// calls chain; finish with [`OpEditor::op`] to keep a handle.
pub struct OpEditor<'m, M> {
    mutation: &'m mut Mutation,
    id: BuilderId,
    _mode: PhantomData<fn() -> M>,
}

impl<M: Mode> OpEditor<'_, M> {
    /// Handle to the operation being edited.
    pub fn op(&self) -> PubOp<M> {
        PubOp::new(self.id)
    }

    fn push(self, command: Command) -> Self {
        let own = self.id.mutation == self.mutation.tag;
        match self.mutation.nodes.get_mut(self.id.index) {
            Some(node) if own => node.commands.push(command),
            _ => {
                self.mutation.foreign_edit.get_or_insert(self.id);
            }
        }
        self
    }

    /// Stages a scalar write. The last write per slug wins.
    pub fn set(self, slug: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(Command::Set {
            slug: slug.into(),
            value: value.into(),
        })
    }

    pub fn set_all<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (slug, value) in values {
            self = self.set(slug, value);
        }
        self
    }

    /// Stages an outgoing edge on a relation field.
    pub fn connect(
        self,
        slug: impl Into<String>,
        target: impl Into<RelationTarget>,
        value: impl Into<Value>,
    ) -> Self {
        self.connect_with(slug, target, value, ConnectOptions::default())
    }

    pub fn connect_with(
        self,
        slug: impl Into<String>,
        target: impl Into<RelationTarget>,
        value: impl Into<Value>,
        options: ConnectOptions,
    ) -> Self {
        self.push(Command::Connect {
            slug: slug.into(),
            target: target.into(),
            value: value.into(),
            options,
        })
    }

    /// Makes `target` the only edge of the field.
    pub fn set_relation(
        self,
        slug: impl Into<String>,
        target: impl Into<RelationTarget>,
        value: impl Into<Value>,
    ) -> Self {
        self.connect_with(slug, target, value, ConnectOptions::overriding())
    }

    /// Makes `relations` the complete edge list of the field.
    pub fn set_relations<I, T, V>(
        mut self,
        slug: impl Into<String>,
        relations: I,
        options: RemoveOptions,
    ) -> Self
    where
        I: IntoIterator<Item = (T, V)>,
        T: Into<RelationTarget>,
        V: Into<Value>,
    {
        let slug = slug.into();
        let options = ConnectOptions {
            override_existing: true,
            delete_orphaned: options.delete_orphaned,
        };
        let mut any = false;
        for (target, value) in relations {
            any = true;
            self = self.connect_with(slug.clone(), target, value, options);
        }
        if !any {
            // An empty list still replaces whatever is stored.
            self = self.push(Command::Clear {
                scope: ClearScope::Field(slug),
                options: RemoveOptions {
                    delete_orphaned: options.delete_orphaned,
                },
            });
        }
        self
    }

    /// Moves the Pub to a workflow stage.
    pub fn stage(self, stage_id: StageId) -> Self {
        self.push(Command::Stage(stage_id))
    }
}

impl<M: UpdateCapable> OpEditor<'_, M> {
    /// Removes the persisted edge to `target` on the field.
    ///
    /// An operation given as `target` only supplies the Pub id; it is not
    /// executed unless something connects to it or it is a root.
    pub fn disconnect(
        self,
        slug: impl Into<String>,
        target: impl Into<RelationTarget>,
        options: RemoveOptions,
    ) -> Self {
        self.push(Command::Disconnect {
            slug: slug.into(),
            target: target.into(),
            options,
        })
    }

    /// Removes every persisted edge of one field.
    pub fn clear_relations_for_field(self, slug: impl Into<String>, options: RemoveOptions) -> Self {
        self.push(Command::Clear {
            scope: ClearScope::Field(slug.into()),
            options,
        })
    }

    /// Removes every persisted edge of every relation field.
    pub fn clear_all_relations(self, options: RemoveOptions) -> Self {
        self.push(Command::Clear {
            scope: ClearScope::All,
            options,
        })
    }

    /// Deletes every stored value row of the field.
    pub fn unset(self, slug: impl Into<String>) -> Self {
        self.push(Command::Unset { slug: slug.into() })
    }
}
