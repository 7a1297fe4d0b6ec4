//! Orphan reachability analysis.
//!
//! After edges are removed, their former targets may no longer be
//! reachable. The analyzer walks forward from those candidates, one
//! frontier per [`EdgeIndex`] call, and returns the part of that region
//! nothing outside it still points into.

use crate::error::OpsResult;
use pubgraph_storage::EdgeIndex;
use pubgraph_types::PubId;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Pubs to delete, in discovery order.
///
/// `protected` Pubs are never expanded, never returned, and count as
/// outside the affected region, so an edge from one keeps its target alive.
pub fn find_orphans<I>(
    index: &I,
    candidates: &HashSet<PubId>,
    protected: &HashSet<PubId>,
) -> OpsResult<Vec<PubId>>
where
    I: EdgeIndex + ?Sized,
{
    let mut order: Vec<PubId> = Vec::new();
    let mut affected: HashSet<PubId> = HashSet::new();
    let mut downstream: HashMap<PubId, Vec<PubId>> = HashMap::new();

    let mut frontier: Vec<PubId> = candidates
        .iter()
        .filter(|id| !protected.contains(*id))
        .copied()
        .collect();
    frontier.sort();
    for id in &frontier {
        affected.insert(*id);
        order.push(*id);
    }

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for edge in index.outgoing(&frontier)? {
            if protected.contains(&edge.target) {
                continue;
            }
            downstream.entry(edge.source).or_default().push(edge.target);
            if affected.insert(edge.target) {
                order.push(edge.target);
                next.push(edge.target);
            }
        }
        frontier = next;
    }

    if order.is_empty() {
        return Ok(Vec::new());
    }

    let safe: Vec<PubId> = {
        let mut safe = HashSet::new();
        for edge in index.incoming(&order)? {
            if !affected.contains(&edge.source) {
                safe.insert(edge.target);
            }
        }
        order.iter().filter(|id| safe.contains(*id)).copied().collect()
    };

    let mut alive: HashSet<PubId> = safe.iter().copied().collect();
    let mut queue: VecDeque<PubId> = safe.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        for target in downstream.get(&id).into_iter().flatten() {
            if alive.insert(*target) {
                queue.push_back(*target);
            }
        }
    }

    let doomed: Vec<PubId> = order
        .into_iter()
        .filter(|id| !alive.contains(id))
        .collect();
    debug!(
        "Orphan analysis: {} candidates, {} affected, {} safe, {} to delete",
        candidates.len(),
        affected.len(),
        safe.len(),
        doomed.len()
    );
    Ok(doomed)
}
