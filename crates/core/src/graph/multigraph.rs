use std::sync::{Arc, Mutex};

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

#[allow(unused_imports)]
use crate::graph::rel::{Rel, RelSet};
use crate::history::OpId;

/// Directed multigraph over ops.
///
/// Each arc carries a non-empty [`RelSet`]; parallel edges with distinct
/// labels merge by set union. Vertices are added implicitly by edges or
/// explicitly via [`add_vertex`](Self::add_vertex).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpGraph {
    adj: HashMap<OpId, HashMap<OpId, RelSet>>,
}

impl OpGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, v: OpId) {
        self.adj.entry(v).or_default();
    }

    /// Inserts `a -> b` labeled `rels`, unioning with any existing labels.
    pub fn add_edge(&mut self, a: OpId, b: OpId, rels: RelSet) {
        if rels.is_empty() {
            return;
        }
        let labels = self.adj.entry(a).or_default().entry(b).or_insert(RelSet::EMPTY);
        *labels = labels.union(rels);
        self.adj.entry(b).or_default();
    }

    /// The labels on `a -> b`, or the empty set if no such arc exists.
    #[must_use]
    pub fn edge(&self, a: OpId, b: OpId) -> RelSet {
        self.adj
            .get(&a)
            .and_then(|next| next.get(&b))
            .copied()
            .unwrap_or(RelSet::EMPTY)
    }

    #[must_use]
    pub fn has_edge(&self, a: OpId, b: OpId) -> bool {
        !self.edge(a, b).is_empty()
    }

    /// Merges all arcs (and vertices) of `other` into this graph.
    pub fn union(&mut self, other: &Self) {
        for (&a, next) in &other.adj {
            self.add_vertex(a);
            for (&b, &rels) in next {
                self.add_edge(a, b, rels);
            }
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.adj.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adj.values().map(HashMap::len).sum()
    }

    /// Vertices in ascending op order.
    #[must_use]
    pub fn sorted_vertices(&self) -> Vec<OpId> {
        let mut vs: Vec<OpId> = self.adj.keys().copied().collect();
        vs.sort_unstable();
        vs
    }

    /// Out-neighbors of `v` with their labels, ascending by op.
    ///
    /// Search primitives rely on this ordering for determinism.
    #[must_use]
    pub fn out_edges_sorted(&self, v: OpId) -> Vec<(OpId, RelSet)> {
        let mut out: Vec<(OpId, RelSet)> = self
            .adj
            .get(&v)
            .map(|next| next.iter().map(|(&b, &rels)| (b, rels)).collect())
            .unwrap_or_default();
        out.sort_unstable_by_key(|(b, _)| *b);
        out
    }

    /// The subgraph of arcs whose labels intersect `rels`.
    ///
    /// Surviving arcs keep only the intersecting labels, which makes the
    /// operation idempotent: `project(project(g, r), r) == project(g, r)`.
    /// The vertex set is preserved.
    #[must_use]
    pub fn project(&self, rels: RelSet) -> Self {
        let adj = self
            .adj
            .iter()
            .map(|(&a, next)| {
                let filtered: HashMap<OpId, RelSet> = next
                    .iter()
                    .filter_map(|(&b, &labels)| {
                        let kept = labels.intersection(rels);
                        (!kept.is_empty()).then_some((b, kept))
                    })
                    .collect();
                (a, filtered)
            })
            .collect();
        Self { adj }
    }

    /// Restriction of the vertex set to `members`, dropping arcs that
    /// leave it.
    #[must_use]
    pub fn restrict(&self, members: &HashSet<OpId>) -> Self {
        let adj = self
            .adj
            .iter()
            .filter(|(a, _)| members.contains(*a))
            .map(|(&a, next)| {
                let filtered: HashMap<OpId, RelSet> = next
                    .iter()
                    .filter(|(b, _)| members.contains(*b))
                    .map(|(&b, &rels)| (b, rels))
                    .collect();
                (a, filtered)
            })
            .collect();
        Self { adj }
    }

    /// All arcs as `(source, target, labels)`, ascending by (source, target).
    #[must_use]
    pub fn sorted_edges(&self) -> Vec<(OpId, OpId, RelSet)> {
        let mut edges: Vec<(OpId, OpId, RelSet)> = self
            .adj
            .iter()
            .flat_map(|(&a, next)| next.iter().map(move |(&b, &rels)| (a, b, rels)))
            .collect();
        edges.sort_unstable_by_key(|(a, b, _)| (*a, *b));
        edges
    }
}

/// Memoized projections of a frozen [`OpGraph`].
///
/// The union graph is read-only once built; projections are computed on
/// demand, at most once per label set, and shared across the SCC searches.
/// [`prewarm`](Self::prewarm) materializes every label set the anomaly
/// specs will request before any search timer starts.
#[derive(Debug)]
pub struct ProjectionCache {
    full: Arc<OpGraph>,
    memo: Mutex<HashMap<RelSet, Arc<OpGraph>>>,
}

impl ProjectionCache {
    #[must_use]
    pub fn new(full: OpGraph) -> Self {
        Self {
            full: Arc::new(full),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// The unprojected union graph.
    #[must_use]
    pub fn full(&self) -> Arc<OpGraph> {
        Arc::clone(&self.full)
    }

    /// The projection onto `rels`, computing and caching it if absent.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the memo lock panicked.
    #[must_use]
    pub fn get(&self, rels: RelSet) -> Arc<OpGraph> {
        if let Some(found) = self.memo.lock().expect("projection memo poisoned").get(&rels) {
            return Arc::clone(found);
        }
        // Racing computations are possible before the first insert wins;
        // the loser's work is discarded.
        let computed = Arc::new(self.full.project(rels));
        Arc::clone(
            self.memo
                .lock()
                .expect("projection memo poisoned")
                .entry(rels)
                .or_insert(computed),
        )
    }

    /// Materializes the given label sets in parallel.
    pub fn prewarm(&self, sets: &[RelSet]) {
        sets.par_iter().for_each(|&rels| {
            let _ = self.get(rels);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WW: RelSet = RelSet::single(Rel::Ww);
    const WR: RelSet = RelSet::single(Rel::Wr);

    #[test]
    fn parallel_edges_merge_labels() {
        let mut g = OpGraph::new();
        g.add_edge(OpId(0), OpId(1), WW);
        g.add_edge(OpId(0), OpId(1), WR);

        assert_eq!(g.edge(OpId(0), OpId(1)), WW.union(WR));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn projection_keeps_intersection_and_is_idempotent() {
        let mut g = OpGraph::new();
        g.add_edge(OpId(0), OpId(1), WW.union(WR));
        g.add_edge(OpId(1), OpId(2), WR);
        g.add_edge(OpId(2), OpId(0), WW);

        let ww = g.project(WW);
        assert_eq!(ww.edge(OpId(0), OpId(1)), WW);
        assert!(!ww.has_edge(OpId(1), OpId(2)));
        assert_eq!(ww.edge(OpId(2), OpId(0)), WW);
        assert_eq!(ww.project(WW), ww);
        // vertex set survives projection
        assert_eq!(ww.vertex_count(), 3);
    }

    #[test]
    fn union_merges_arcs() {
        let mut a = OpGraph::new();
        a.add_edge(OpId(0), OpId(1), WW);
        let mut b = OpGraph::new();
        b.add_edge(OpId(0), OpId(1), WR);
        b.add_edge(OpId(1), OpId(0), WW);

        a.union(&b);
        assert_eq!(a.edge(OpId(0), OpId(1)), WW.union(WR));
        assert!(a.has_edge(OpId(1), OpId(0)));
    }

    #[test]
    fn cache_returns_shared_projection() {
        let mut g = OpGraph::new();
        g.add_edge(OpId(0), OpId(1), WW);
        let cache = ProjectionCache::new(g);

        let first = cache.get(WW);
        let second = cache.get(WW);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn empty_labels_are_rejected() {
        let mut g = OpGraph::new();
        g.add_edge(OpId(0), OpId(1), RelSet::EMPTY);
        assert_eq!(g.edge_count(), 0);
    }
}
