use pretty_assertions::assert_eq;
use proptest::prelude::*;
use pubgraph_ops::find_orphans;
use pubgraph_storage::{Edge, EdgeIndex, StorageResult};
use pubgraph_types::PubId;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};

/// Edge list that records which Pubs were looked up.
#[derive(Default)]
struct MemoryGraph {
    edges: Vec<Edge>,
    touched: RefCell<HashSet<PubId>>,
}

impl MemoryGraph {
    fn new(edges: &[(PubId, PubId)]) -> Self {
        Self {
            edges: edges
                .iter()
                .map(|(source, target)| Edge {
                    source: *source,
                    target: *target,
                })
                .collect(),
            touched: RefCell::default(),
        }
    }
}

impl EdgeIndex for MemoryGraph {
    fn outgoing(&self, pub_ids: &[PubId]) -> StorageResult<Vec<Edge>> {
        self.touched.borrow_mut().extend(pub_ids.iter().copied());
        Ok(self
            .edges
            .iter()
            .filter(|e| pub_ids.contains(&e.source))
            .copied()
            .collect())
    }

    fn incoming(&self, pub_ids: &[PubId]) -> StorageResult<Vec<Edge>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| pub_ids.contains(&e.target))
            .copied()
            .collect())
    }
}

fn make_ids<const N: usize>() -> [PubId; N] {
    std::array::from_fn(|_| PubId::new())
}

fn set(ids: &[PubId]) -> HashSet<PubId> {
    ids.iter().copied().collect()
}

fn orphans(graph: &MemoryGraph, candidates: &[PubId], protected: &[PubId]) -> HashSet<PubId> {
    find_orphans(graph, &set(candidates), &set(protected))
        .unwrap()
        .into_iter()
        .collect()
}

// ── Fixed graphs ─────────────────────────────────────────────────

#[test]
fn empty_candidates_delete_nothing() {
    let [a, b] = make_ids();
    let graph = MemoryGraph::new(&[(a, b)]);
    assert!(orphans(&graph, &[], &[]).is_empty());
    assert!(graph.touched.borrow().is_empty());
}

#[test]
fn chain_below_candidate_is_deleted() {
    let [b, c, d] = make_ids();
    let graph = MemoryGraph::new(&[(b, c), (c, d)]);
    assert_eq!(orphans(&graph, &[b], &[]), set(&[b, c, d]));
}

#[test]
fn external_inbound_edge_keeps_subtree() {
    let [b, c, d, j] = make_ids();
    let graph = MemoryGraph::new(&[(b, c), (c, d), (j, c)]);
    assert_eq!(orphans(&graph, &[b], &[]), set(&[b]));
}

#[test]
fn cycle_reached_from_outside_survives_whole() {
    let [b, c, j] = make_ids();
    let graph = MemoryGraph::new(&[(b, c), (c, b), (j, c)]);
    assert!(orphans(&graph, &[b], &[]).is_empty());
}

#[test]
fn isolated_cycle_is_deleted() {
    let [b, c] = make_ids();
    let graph = MemoryGraph::new(&[(b, c), (c, b)]);
    assert_eq!(orphans(&graph, &[b], &[]), set(&[b, c]));
}

#[test]
fn diamond_with_one_live_parent_survives_below_it() {
    // b -> c, b -> d, c -> e, d -> e, j -> d
    let [b, c, d, e, j] = make_ids();
    let graph = MemoryGraph::new(&[(b, c), (b, d), (c, e), (d, e), (j, d)]);
    assert_eq!(orphans(&graph, &[b], &[]), set(&[b, c]));
}

#[test]
fn protected_pub_is_neither_deleted_nor_expanded() {
    let [b, p, q] = make_ids();
    let graph = MemoryGraph::new(&[(b, p), (p, q)]);
    assert_eq!(orphans(&graph, &[b, p], &[p]), set(&[b]));
    assert!(!graph.touched.borrow().contains(&p));
}

#[test]
fn edge_from_protected_pub_keeps_target() {
    let [b, c, p] = make_ids();
    let graph = MemoryGraph::new(&[(p, b), (b, c)]);
    assert!(orphans(&graph, &[b], &[p]).is_empty());
}

#[test]
fn only_the_downstream_region_is_read() {
    let [a, b, c, unrelated, other] = make_ids();
    let graph = MemoryGraph::new(&[(a, b), (b, c), (unrelated, other)]);
    orphans(&graph, &[b], &[a]);
    assert_eq!(*graph.touched.borrow(), set(&[b, c]));
}

#[test]
fn result_follows_discovery_order() {
    let [b, c, d] = make_ids();
    let graph = MemoryGraph::new(&[(b, c), (c, d)]);
    let ordered = find_orphans(&graph, &set(&[b]), &HashSet::new()).unwrap();
    assert_eq!(ordered, vec![b, c, d]);
}

// ── Random graphs ────────────────────────────────────────────────

fn forward(edges: &[(usize, usize)], from: &[usize], blocked: &HashSet<usize>) -> HashSet<usize> {
    let mut seen: HashSet<usize> = from.iter().copied().filter(|n| !blocked.contains(n)).collect();
    let mut queue: VecDeque<usize> = seen.iter().copied().collect();
    while let Some(n) = queue.pop_front() {
        for (_, t) in edges.iter().filter(|(s, _)| *s == n) {
            if !blocked.contains(t) && seen.insert(*t) {
                queue.push_back(*t);
            }
        }
    }
    seen
}

fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<usize>, Vec<usize>)> {
    (2usize..12).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec((0..n, 0..n), 0..30),
            prop::collection::vec(0..n, 1..4),
            prop::collection::vec(0..n, 0..3),
        )
    })
}

proptest! {
    #[test]
    fn deleted_exactly_when_unreachable_from_outside(
        (n, edges, candidates, protected) in graph_strategy()
    ) {
        let ids: Vec<PubId> = (0..n).map(|_| PubId::new()).collect();
        let graph = MemoryGraph::new(
            &edges.iter().map(|(s, t)| (ids[*s], ids[*t])).collect::<Vec<_>>(),
        );
        let candidate_ids: Vec<PubId> = candidates.iter().map(|i| ids[*i]).collect();
        let protected_ids: Vec<PubId> = protected.iter().map(|i| ids[*i]).collect();
        let doomed = orphans(&graph, &candidate_ids, &protected_ids);

        let blocked: HashSet<usize> = protected.iter().copied().collect();
        let affected = forward(&edges, &candidates, &blocked);
        let outside: Vec<usize> = (0..n).filter(|i| !affected.contains(i)).collect();
        let kept_alive = forward(&edges, &outside, &HashSet::new());

        for i in 0..n {
            let expected = affected.contains(&i) && !kept_alive.contains(&i);
            prop_assert_eq!(doomed.contains(&ids[i]), expected, "node {}", i);
        }
        for p in &protected_ids {
            prop_assert!(!doomed.contains(p));
        }
    }
}
