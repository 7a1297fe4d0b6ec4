//! Runs collected operations against a [`ValueStore`] in fixed phases.
//!
//! 1. Create: insert missing Pubs and reconcile what already existed
//! 2. Relations: delete overridden, cleared, disconnected and unset rows
//! 3. Orphan GC: delete Pubs only the removed edges kept reachable
//! 4. Values: validate and upsert scalar and relation values
//!
//! Callers run [`run`] inside one transaction; any error rolls back all
//! phases.

use crate::builder::{BuilderId, Mutation, OpKind, PubKey, PubOp};
use crate::config::EngineConfig;
use crate::collector::{self, OperationMap, PubOperation, ResolvedKeys, WriteMode};
use crate::error::{OpsError, OpsResult};
use crate::orphan;
use pubgraph_storage::{ExistingRelation, FieldFilter, NewPub, PendingValue, PubStore, ValueStore};
use pubgraph_model::ProjectedPub;
use pubgraph_types::{CommunityId, PubId, ValueId};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// What one execution did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Root Pub ids, one per root in submission order.
    pub roots: Vec<PubId>,
    /// Pubs inserted by this execution.
    pub created: Vec<PubId>,
    /// Relation and unset rows removed in the relations phase.
    pub removed_values: usize,
    /// Pubs deleted by orphan cleanup.
    pub deleted_orphans: Vec<PubId>,
    /// Scalar and relation rows written.
    pub written_values: usize,
}

/// Executes `mutations` in one transaction on `store`.
pub fn execute_mutations(store: &PubStore, mutations: Vec<Mutation>) -> OpsResult<ExecutionReport> {
    let report = store.with_transaction(|tx| run(tx, &mutations))?;
    info!(
        "Executed {} mutations: {} roots, {} created, {} orphans deleted, {} values written",
        mutations.len(),
        report.roots.len(),
        report.created.len(),
        report.deleted_orphans.len(),
        report.written_values
    );
    Ok(report)
}

/// Resolves, collects and applies every mutation through `tx`.
///
/// All mutations are flattened into one operation map before any phase
/// starts, so orphan cleanup sees every edge the batch intends to add.
pub fn run<S>(tx: &S, mutations: &[Mutation]) -> OpsResult<ExecutionReport>
where
    S: ValueStore + ?Sized,
{
    let mut ops = OperationMap::default();
    let mut roots = Vec::new();
    let mut by_value = ValueKeyCache::new();
    for mutation in mutations {
        mutation.check_handles()?;
        let root_ops = mutation.roots();
        let keys = resolve_keys(tx, mutation, &root_ops, &mut by_value)?;
        ops.extend(collector::collect(mutation, &root_ops, &keys)?)?;
        for root in &root_ops {
            roots.push(keys.pub_id(mutation, *root)?);
        }
    }
    debug!("Collected {} pub operations", ops.len());

    let mut report = ExecutionReport {
        roots,
        ..Default::default()
    };
    report.created = create_phase(tx, &ops)?;
    let created: HashSet<PubId> = report.created.iter().copied().collect();

    let (removed, candidates) = relations_phase(tx, &ops, &created)?;
    report.removed_values = removed;

    report.deleted_orphans = orphan_phase(tx, &ops, &candidates)?;
    report.written_values = values_phase(tx, &ops)?;
    Ok(report)
}

/// Pub ids already chosen for a (community, slug, encoded value) key.
type ValueKeyCache = HashMap<(CommunityId, String, String), PubId>;

/// Phase 0: finds the Pub behind every by-value operation.
///
/// `seen` spans the whole execution, so every mutation that keys on the
/// same value lands on the same Pub.
fn resolve_keys<S>(
    tx: &S,
    mutation: &Mutation,
    roots: &[BuilderId],
    seen: &mut ValueKeyCache,
) -> OpsResult<ResolvedKeys>
where
    S: ValueStore + ?Sized,
{
    let mut keys = ResolvedKeys::default();
    for op in collector::reachable(mutation, roots)? {
        let node = mutation.node(op)?;
        let PubKey::ByValue { slug, value } = &node.key else {
            continue;
        };
        let cache_key = (mutation.community_id(), slug.clone(), value.to_string());
        if let Some(pub_id) = seen.get(&cache_key) {
            keys.insert(op, *pub_id);
            continue;
        }
        let found = tx.find_pub_by_value(mutation.community_id(), slug, value)?;
        let pub_id = match (found, node.kind) {
            (Some(id), _) => id,
            (None, OpKind::Update) => {
                warn!("Rejected update: no pub has {slug} = {value}");
                return Err(OpsError::NoMatchForValue {
                    slug: slug.clone(),
                    value: value.to_string(),
                });
            }
            (None, _) => PubId::new(),
        };
        seen.insert(cache_key, pub_id);
        keys.insert(op, pub_id);
    }
    Ok(keys)
}

/// Phase 1: inserts create and upsert targets, checks update targets.
fn create_phase<S>(tx: &S, ops: &OperationMap) -> OpsResult<Vec<PubId>>
where
    S: ValueStore + ?Sized,
{
    let mut rows = Vec::new();
    let mut updates = Vec::new();
    for op in ops.iter() {
        match op.pub_type_id {
            Some(pub_type_id) if op.mode != WriteMode::Update => rows.push(NewPub {
                id: op.pub_id,
                community_id: op.community_id,
                pub_type_id,
                stage_id: op.stage_id,
            }),
            _ => updates.push(op.pub_id),
        }
    }

    let inserted: HashSet<PubId> = tx.insert_pubs(&rows)?.into_iter().collect();
    let mut created = Vec::with_capacity(inserted.len());
    let mut existing = Vec::new();
    for row in &rows {
        if inserted.contains(&row.id) {
            created.push(row.id);
        } else if ops.get(row.id).map(|op| op.mode) == Some(WriteMode::Create) {
            warn!("Rejected create: pub {} already exists", row.id);
            return Err(OpsError::CreateConflict(row.id));
        } else {
            existing.push(row.id);
        }
    }
    existing.extend(updates);

    // Upserts that hit a taken id and updates must find their Pub in the
    // community they write from.
    let mut by_community: BTreeMap<CommunityId, Vec<PubId>> = BTreeMap::new();
    for id in &existing {
        if let Some(op) = ops.get(*id) {
            by_community.entry(op.community_id).or_default().push(*id);
        }
    }
    for (community, ids) in &by_community {
        let found = tx.existing_pubs(*community, ids)?;
        if let Some(missing) = ids.iter().find(|id| !found.contains(*id)) {
            return Err(match ops.get(*missing).map(|op| op.mode) {
                Some(WriteMode::Update) => {
                    warn!("Rejected update: pub {missing} does not exist in community {community}");
                    OpsError::PubNotFound(*missing)
                }
                _ => {
                    warn!("Rejected upsert: pub {missing} belongs to another community");
                    OpsError::CreateConflict(*missing)
                }
            });
        }
    }

    for id in &existing {
        if let Some(stage_id) = ops.get(*id).and_then(|op| op.stage_id) {
            tx.set_stage(*id, stage_id)?;
        }
    }
    debug!(
        "Create phase: {} created, {} existing",
        created.len(),
        existing.len()
    );
    Ok(created)
}

/// Which persisted rows of one Pub the relations phase removes.
struct RemovalPlan<'a> {
    op: &'a PubOperation,
    all_fields: bool,
    slugs: Vec<String>,
}

impl<'a> RemovalPlan<'a> {
    fn new(op: &'a PubOperation) -> Self {
        let all_fields = op.clear.iter().any(|c| c.slug.is_none());
        let mut slugs: Vec<String> = op
            .add
            .iter()
            .filter(|a| a.override_existing)
            .map(|a| a.slug.clone())
            .chain(op.remove.iter().map(|r| r.slug.clone()))
            .chain(op.clear.iter().filter_map(|c| c.slug.clone()))
            .chain(op.unset.iter().cloned())
            .collect();
        slugs.sort();
        slugs.dedup();
        Self {
            op,
            all_fields,
            slugs,
        }
    }

    fn filter(&self) -> FieldFilter<'_> {
        if self.all_fields {
            FieldFilter::All
        } else {
            FieldFilter::Slugs(&self.slugs)
        }
    }

    /// `None` keeps the edge; `Some(gc)` deletes it, offering the target to
    /// orphan cleanup when `gc` is set.
    fn verdict(&self, edge: &ExistingRelation) -> Option<bool> {
        let slug = edge.field_slug.as_str();
        let mut matched = false;
        let mut gc = false;
        let mut hit = |delete_orphaned: bool| {
            matched = true;
            gc |= delete_orphaned;
        };

        for add in self.op.add.iter().filter(|a| a.override_existing && a.slug == slug) {
            hit(add.delete_orphaned);
        }
        for remove in &self.op.remove {
            if remove.slug == slug && remove.target == edge.related_pub_id {
                hit(remove.delete_orphaned);
            }
        }
        for clear in &self.op.clear {
            if clear.slug.as_deref().is_none_or(|s| s == slug) {
                hit(clear.delete_orphaned);
            }
        }
        if self.op.unset.iter().any(|s| s == slug) {
            hit(false);
        }
        matched.then_some(gc)
    }
}

/// Phase 2: deletes relation rows and collects orphan candidates.
fn relations_phase<S>(
    tx: &S,
    ops: &OperationMap,
    created: &HashSet<PubId>,
) -> OpsResult<(usize, HashSet<PubId>)>
where
    S: ValueStore + ?Sized,
{
    let mut removed = 0;
    let mut candidates = HashSet::new();
    for op in ops.iter() {
        if created.contains(&op.pub_id) || !op.removes_anything() {
            continue;
        }
        let plan = RemovalPlan::new(op);
        let existing = tx.load_existing_relations(op.pub_id, plan.filter())?;

        let mut doomed: Vec<ValueId> = Vec::new();
        for edge in &existing {
            if let Some(gc) = plan.verdict(edge) {
                doomed.push(edge.value_id);
                if gc {
                    candidates.insert(edge.related_pub_id);
                }
            }
        }
        removed += tx.delete_values_by_id(&doomed)?;
        removed += tx.delete_scalar_values(op.pub_id, &op.unset)?;
    }
    debug!(
        "Relations phase: {} rows removed, {} orphan candidates",
        removed,
        candidates.len()
    );
    Ok((removed, candidates))
}

/// Phase 3: deletes Pubs left unreachable by the removed edges.
fn orphan_phase<S>(
    tx: &S,
    ops: &OperationMap,
    candidates: &HashSet<PubId>,
) -> OpsResult<Vec<PubId>>
where
    S: ValueStore + ?Sized,
{
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let protected: HashSet<PubId> = ops
        .iter()
        .flat_map(|op| std::iter::once(op.pub_id).chain(op.add.iter().map(|a| a.target)))
        .collect();
    let doomed = orphan::find_orphans(tx, candidates, &protected)?;
    if !doomed.is_empty() {
        let deleted = tx.delete_pubs(&doomed)?;
        debug!("Orphan phase: deleted {deleted} pubs");
    }
    Ok(doomed)
}

/// Phase 4: validates and writes every staged value and edge.
fn values_phase<S>(tx: &S, ops: &OperationMap) -> OpsResult<usize>
where
    S: ValueStore + ?Sized,
{
    // Edge targets must live in the source's community, whether they are
    // operated on here or only referenced.
    let mut external: BTreeMap<CommunityId, HashSet<PubId>> = BTreeMap::new();
    for op in ops.iter() {
        let targets = external.entry(op.community_id).or_default();
        targets.extend(op.add.iter().map(|a| a.target).filter(|t| !ops.contains(*t)));
    }
    let mut found: HashMap<CommunityId, HashSet<PubId>> = HashMap::new();
    for (community, targets) in external {
        let targets: Vec<PubId> = targets.into_iter().collect();
        found.insert(community, tx.existing_pubs(community, &targets)?);
    }
    for op in ops.iter() {
        let in_community = |target: PubId| match ops.get(target) {
            Some(other) => other.community_id == op.community_id,
            None => found
                .get(&op.community_id)
                .is_some_and(|ids| ids.contains(&target)),
        };
        let missing = op.add.iter().find(|a| !in_community(a.target));
        if let Some(add) = missing {
            warn!(
                "Rejected relation '{}' on {}: target {} does not exist",
                add.slug, op.pub_id, add.target
            );
            return Err(OpsError::MissingRelatedPub {
                pub_id: op.pub_id,
                slug: add.slug.clone(),
                target: add.target,
            });
        }
    }

    let mut pending: BTreeMap<CommunityId, Vec<PendingValue>> = BTreeMap::new();
    for op in ops.iter() {
        let rows = pending.entry(op.community_id).or_default();
        rows.extend(op.values.iter().map(|(slug, value)| PendingValue {
            pub_id: op.pub_id,
            slug: slug.clone(),
            value: value.clone(),
            related_pub_id: None,
        }));
        rows.extend(op.add.iter().map(|add| PendingValue {
            pub_id: op.pub_id,
            slug: add.slug.clone(),
            value: add.value.clone(),
            related_pub_id: Some(add.target),
        }));
    }

    let mut written = 0;
    for (community, rows) in pending {
        if rows.is_empty() {
            continue;
        }
        let validated = tx.validate_values(community, rows)?;
        let (relations, scalars): (Vec<_>, Vec<_>) =
            validated.into_iter().partition(|v| v.is_relation());
        written += tx.upsert_scalar_values(&scalars)?;
        written += tx.upsert_relation_values(&relations)?;
        debug!(
            "Values phase: {} scalar and {} relation rows for community {}",
            scalars.len(),
            relations.len(),
            community
        );
    }
    Ok(written)
}

impl Mutation {
    /// Executes the mutation rooted at `root` and returns the root Pub
    /// projected to the default depth.
    pub fn execute<M>(self, store: &PubStore, root: PubOp<M>) -> OpsResult<ProjectedPub> {
        self.execute_with(store, root, &EngineConfig::default())
    }

    pub fn execute_with<M>(
        mut self,
        store: &PubStore,
        root: PubOp<M>,
        config: &EngineConfig,
    ) -> OpsResult<ProjectedPub> {
        self.set_roots(vec![root.id()]);
        let report = execute_mutations(store, vec![self])?;
        let id = report
            .roots
            .first()
            .copied()
            .ok_or_else(|| OpsError::UnresolvedTarget(root.id().to_string()))?;
        store
            .project(id, config.projection_depth)?
            .ok_or(OpsError::PubNotFound(id))
    }

    /// Executes every root (see [`Mutation::add_root`]) and returns their
    /// Pub ids in root order.
    pub fn execute_roots(self, store: &PubStore) -> OpsResult<Vec<PubId>> {
        Ok(execute_mutations(store, vec![self])?.roots)
    }
}
