//! Flattens the operations reachable from a mutation's roots into one
//! entry per Pub.

use crate::builder::{BuilderId, ClearScope, Command, Mutation, OpKind, PubKey, RelationTarget};
use crate::error::{OpsError, OpsResult};
use pubgraph_types::{CommunityId, PubId, PubTypeId, StageId};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Pub ids of operations keyed by value, filled in before collection.
#[derive(Debug, Clone, Default)]
pub struct ResolvedKeys {
    by_value: HashMap<BuilderId, PubId>,
}

impl ResolvedKeys {
    pub(crate) fn insert(&mut self, op: BuilderId, pub_id: PubId) {
        self.by_value.insert(op, pub_id);
    }

    /// The Pub id an operation writes to.
    pub(crate) fn pub_id(&self, mutation: &Mutation, op: BuilderId) -> OpsResult<PubId> {
        match &mutation.node(op)?.key {
            PubKey::Id(id) => Ok(*id),
            PubKey::ByValue { slug, .. } => self
                .by_value
                .get(&op)
                .copied()
                .ok_or_else(|| OpsError::UnresolvedTarget(slug.clone())),
        }
    }
}

/// Operation modes after merging, strongest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteMode {
    Update,
    Upsert,
    Create,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationAdd {
    pub slug: String,
    pub target: PubId,
    pub value: Value,
    pub override_existing: bool,
    pub delete_orphaned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRemove {
    pub slug: String,
    pub target: PubId,
    pub delete_orphaned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldClear {
    /// `None` clears every relation field.
    pub slug: Option<String>,
    pub delete_orphaned: bool,
}

/// Everything one execution does to one Pub.
#[derive(Debug, Clone, PartialEq)]
pub struct PubOperation {
    pub pub_id: PubId,
    pub community_id: CommunityId,
    pub mode: WriteMode,
    /// Set for create and upsert.
    pub pub_type_id: Option<PubTypeId>,
    pub stage_id: Option<StageId>,
    pub values: BTreeMap<String, Value>,
    pub add: Vec<RelationAdd>,
    pub remove: Vec<RelationRemove>,
    pub clear: Vec<FieldClear>,
    pub unset: Vec<String>,
}

impl PubOperation {
    fn new(pub_id: PubId, community_id: CommunityId, kind: OpKind) -> Self {
        let (mode, pub_type_id) = match kind {
            OpKind::Create { pub_type_id } => (WriteMode::Create, Some(pub_type_id)),
            OpKind::Upsert { pub_type_id } => (WriteMode::Upsert, Some(pub_type_id)),
            OpKind::Update => (WriteMode::Update, None),
        };
        Self {
            pub_id,
            community_id,
            mode,
            pub_type_id,
            stage_id: None,
            values: BTreeMap::new(),
            add: Vec::new(),
            remove: Vec::new(),
            clear: Vec::new(),
            unset: Vec::new(),
        }
    }

    /// Folds a later operation on the same Pub into this one.
    fn merge(&mut self, later: PubOperation) {
        if later.mode > self.mode {
            self.mode = later.mode;
        }
        if self.pub_type_id.is_none() {
            self.pub_type_id = later.pub_type_id;
        }
        if later.stage_id.is_some() {
            self.stage_id = later.stage_id;
        }
        self.values.extend(later.values);
        self.add.extend(later.add);
        self.remove.extend(later.remove);
        self.clear.extend(later.clear);
        for slug in later.unset {
            if !self.unset.contains(&slug) {
                self.unset.push(slug);
            }
        }
    }

    /// True if any persisted edge or value may be removed.
    pub fn removes_anything(&self) -> bool {
        !self.remove.is_empty()
            || !self.clear.is_empty()
            || !self.unset.is_empty()
            || self.add.iter().any(|a| a.override_existing)
    }
}

/// Collected operations in first-visit order, keyed by Pub id.
#[derive(Debug, Clone, Default)]
pub struct OperationMap {
    ops: Vec<PubOperation>,
    index: HashMap<PubId, usize>,
}

impl OperationMap {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn get(&self, pub_id: PubId) -> Option<&PubOperation> {
        self.index.get(&pub_id).map(|&i| &self.ops[i])
    }

    pub fn contains(&self, pub_id: PubId) -> bool {
        self.index.contains_key(&pub_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PubOperation> {
        self.ops.iter()
    }

    fn insert(&mut self, op: PubOperation) -> OpsResult<()> {
        match self.index.get(&op.pub_id) {
            Some(&i) if self.ops[i].community_id != op.community_id => {
                Err(OpsError::CommunityMismatch(op.pub_id))
            }
            Some(&i) => {
                self.ops[i].merge(op);
                Ok(())
            }
            None => {
                self.index.insert(op.pub_id, self.ops.len());
                self.ops.push(op);
                Ok(())
            }
        }
    }

    /// Folds another map in; shared Pubs are merged.
    ///
    /// Fails if a shared Pub is operated on from two communities.
    pub fn extend(&mut self, other: OperationMap) -> OpsResult<()> {
        for op in other.ops {
            self.insert(op)?;
        }
        Ok(())
    }
}

/// Walks the operations reachable from `roots` and flattens them.
///
/// Every `connect` is recorded on its source whether or not the target was
/// already visited, so cycles produce both edges and still terminate.
/// Only connect targets are followed; a disconnect target contributes its
/// Pub id and nothing else. Targets given by Pub id produce no entry of
/// their own.
pub fn collect(
    mutation: &Mutation,
    roots: &[BuilderId],
    keys: &ResolvedKeys,
) -> OpsResult<OperationMap> {
    let mut map = OperationMap::default();
    let mut visited = HashSet::new();
    let mut stack: Vec<BuilderId> = roots.iter().rev().copied().collect();

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        let node = mutation.node(current)?;
        let pub_id = keys.pub_id(mutation, current)?;
        let mut op = PubOperation::new(pub_id, mutation.community_id(), node.kind);
        if let PubKey::ByValue { slug, value } = &node.key {
            op.values.insert(slug.clone(), value.clone());
        }

        let mut resolve = |target: &RelationTarget, follow: bool| -> OpsResult<PubId> {
            match *target {
                RelationTarget::Pub(id) => Ok(id),
                RelationTarget::Op(other) => {
                    if follow && !visited.contains(&other) {
                        stack.push(other);
                    }
                    keys.pub_id(mutation, other)
                }
            }
        };

        for command in &node.commands {
            match command {
                Command::Set { slug, value } => {
                    op.values.insert(slug.clone(), value.clone());
                }
                Command::Connect {
                    slug,
                    target,
                    value,
                    options,
                } => op.add.push(RelationAdd {
                    slug: slug.clone(),
                    target: resolve(target, true)?,
                    value: value.clone(),
                    override_existing: options.override_existing,
                    delete_orphaned: options.delete_orphaned,
                }),
                Command::Disconnect {
                    slug,
                    target,
                    options,
                } => op.remove.push(RelationRemove {
                    slug: slug.clone(),
                    target: resolve(target, false)?,
                    delete_orphaned: options.delete_orphaned,
                }),
                Command::Clear { scope, options } => op.clear.push(FieldClear {
                    slug: match scope {
                        ClearScope::Field(slug) => Some(slug.clone()),
                        ClearScope::All => None,
                    },
                    delete_orphaned: options.delete_orphaned,
                }),
                Command::Unset { slug } => {
                    if !op.unset.contains(slug) {
                        op.unset.push(slug.clone());
                    }
                }
                Command::Stage(stage_id) => op.stage_id = Some(*stage_id),
            }
        }
        map.insert(op)?;
    }
    Ok(map)
}

/// Operations whose Pub id collection needs: everything reachable from
/// `roots` through connect edges, in visit order, then disconnect targets
/// not otherwise reached.
pub(crate) fn reachable(mutation: &Mutation, roots: &[BuilderId]) -> OpsResult<Vec<BuilderId>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut referenced = Vec::new();
    let mut stack: Vec<BuilderId> = roots.iter().rev().copied().collect();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        order.push(current);
        for command in &mutation.node(current)?.commands {
            match command {
                Command::Connect {
                    target: RelationTarget::Op(other),
                    ..
                } => {
                    if !visited.contains(other) {
                        stack.push(*other);
                    }
                }
                Command::Disconnect {
                    target: RelationTarget::Op(other),
                    ..
                } => referenced.push(*other),
                _ => {}
            }
        }
    }
    for other in referenced {
        if visited.insert(other) {
            mutation.node(other)?;
            order.push(other);
        }
    }
    Ok(order)
}
