//! Cycle-search primitives over projected dependency graphs.
//!
//! All searches run inside one strongly connected component of the union
//! graph, but against a *projection*, whose arcs are a subset; a search can
//! therefore legitimately find nothing. Traversal order is fixed (lowest
//! op first, lowest neighbor first) so results are deterministic.
//!
//! Every search polls a [`Deadline`] at a fixed stride of visited arcs
//! and gives up with [`SearchTimeout`] once it expires. The exception is
//! [`fallback_cycle`], which is used precisely when a deadline has already
//! fired and must always produce a witness.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};

use crate::graph::multigraph::OpGraph;
#[allow(unused_imports)]
use crate::graph::rel::{Rel, RelSet};
use crate::history::OpId;

/// How many arc visits a search performs between deadline polls.
const POLL_INTERVAL: u32 = 64;

/// A search gave up because its deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTimeout;

/// Wall-clock budget for one search.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never expires.
    #[must_use]
    pub const fn never() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now().checked_add(budget))
    }

    #[must_use]
    pub fn expired(self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Counts arc visits and polls the deadline at a fixed stride.
struct Poller {
    deadline: Deadline,
    visits: u32,
}

impl Poller {
    fn new(deadline: Deadline) -> Result<Self, SearchTimeout> {
        if deadline.expired() {
            return Err(SearchTimeout);
        }
        Ok(Self { deadline, visits: 0 })
    }

    fn tick(&mut self) -> Result<(), SearchTimeout> {
        self.visits += 1;
        if self.visits >= POLL_INTERVAL {
            self.visits = 0;
            if self.deadline.expired() {
                return Err(SearchTimeout);
            }
        }
        Ok(())
    }
}

/// Rotates `cycle` so the lowest op comes first.
///
/// Reported cycles are always canonicalized this way; two searches that
/// find the same cycle from different entry points report it identically.
#[must_use]
pub fn canonical_rotation(cycle: &[OpId]) -> Vec<OpId> {
    let Some(min_at) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| **v)
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_at..]);
    rotated.extend_from_slice(&cycle[..min_at]);
    rotated
}

/// Finds any cycle of `g` within `scc`.
///
/// BFS from each member in ascending order; the first start with a path
/// back to itself yields the shortest such cycle. Returns `Ok(None)` when
/// no arc of `g` closes a cycle inside `scc`.
///
/// # Errors
///
/// [`SearchTimeout`] if the deadline expires mid-search.
pub fn find_cycle(
    g: &OpGraph,
    scc: &[OpId],
    deadline: Deadline,
) -> Result<Option<Vec<OpId>>, SearchTimeout> {
    let mut poller = Poller::new(deadline)?;
    let members: HashSet<OpId> = scc.iter().copied().collect();

    for &start in scc {
        if let Some(path) = bfs_path(g, start, start, &members, &mut poller)? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Finds a cycle whose first arc lies in `first` and whose remaining arcs
/// lie in `rest`.
///
/// The returned cycle starts at the source of the constrained arc, so the
/// caller can attribute arc 0 to `first` before canonicalizing.
///
/// # Errors
///
/// [`SearchTimeout`] if the deadline expires mid-search.
pub fn find_cycle_starting_with(
    first: &OpGraph,
    rest: &OpGraph,
    scc: &[OpId],
    deadline: Deadline,
) -> Result<Option<Vec<OpId>>, SearchTimeout> {
    let mut poller = Poller::new(deadline)?;
    let members: HashSet<OpId> = scc.iter().copied().collect();

    for &v in scc {
        for (u, _) in first.out_edges_sorted(v) {
            if !members.contains(&u) {
                continue;
            }
            poller.tick()?;
            if u == v {
                return Ok(Some(vec![v]));
            }
            if let Some(path) = bfs_path(rest, u, v, &members, &mut poller)? {
                let mut cycle = Vec::with_capacity(path.len() + 1);
                cycle.push(v);
                cycle.extend(path);
                return Ok(Some(cycle));
            }
        }
    }
    Ok(None)
}

/// Shortest path `from .. x` within `members` such that `g` has an arc
/// `x -> to`. When `from == to` this finds the shortest cycle through the
/// vertex. Returns the node sequence starting at `from`, excluding `to`.
fn bfs_path(
    g: &OpGraph,
    from: OpId,
    to: OpId,
    members: &HashSet<OpId>,
    poller: &mut Poller,
) -> Result<Option<Vec<OpId>>, SearchTimeout> {
    let mut parent: HashMap<OpId, OpId> = HashMap::new();
    let mut seen: HashSet<OpId> = HashSet::new();
    let mut queue: VecDeque<OpId> = VecDeque::new();
    seen.insert(from);
    queue.push_back(from);

    while let Some(v) = queue.pop_front() {
        for (w, _) in g.out_edges_sorted(v) {
            if !members.contains(&w) {
                continue;
            }
            poller.tick()?;
            if w == to {
                let mut path = vec![v];
                let mut at = v;
                while at != from {
                    at = parent[&at];
                    path.push(at);
                }
                path.reverse();
                return Ok(Some(path));
            }
            if seen.insert(w) {
                parent.insert(w, v);
                queue.push_back(w);
            }
        }
    }
    Ok(None)
}

/// Path-state predicate for stateful cycle search. A closed set rather
/// than a callback: the interpreter has no open-ended function surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPred {
    /// No two rw arcs may be adjacent, including the wraparound from the
    /// closing arc to the first.
    NonadjacentRw,
}

/// Accumulator tracked along a candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RwPathState {
    pub first_is_rw: bool,
    pub last_is_rw: bool,
    /// Saturates at 2; the filters only distinguish 0, 1, and "many".
    pub rw_count: u8,
}

impl RwPathState {
    fn init(rel: Rel) -> Self {
        let is_rw = rel == Rel::Rw;
        Self {
            first_is_rw: is_rw,
            last_is_rw: is_rw,
            rw_count: u8::from(is_rw),
        }
    }

    /// `None` when extending with `rel` violates the predicate.
    fn step(self, rel: Rel) -> Option<Self> {
        let is_rw = rel == Rel::Rw;
        if self.last_is_rw && is_rw {
            return None;
        }
        Some(Self {
            first_is_rw: self.first_is_rw,
            last_is_rw: is_rw,
            rw_count: self.rw_count.saturating_add(u8::from(is_rw)).min(2),
        })
    }

    /// Wraparound check when the path closes: the closing arc is the last
    /// arc, adjacent to the first.
    fn closes(self) -> bool {
        !(self.first_is_rw && self.last_is_rw)
    }
}

/// Final gate on the accumulated path state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStateFilter {
    /// At least two rw arcs in the cycle.
    MultipleRw,
}

impl PathStateFilter {
    #[must_use]
    pub fn accepts(self, state: RwPathState) -> bool {
        match self {
            Self::MultipleRw => state.rw_count >= 2,
        }
    }
}

/// Finds a cycle whose arcs, labeled one relation each, satisfy `pred`
/// along the path and `filter` once closed.
///
/// BFS over `(vertex, state)` pairs; an arc carrying several labels is
/// explored once per label. Used for G-nonadjacent searches, where the
/// state tracks rw adjacency.
///
/// # Errors
///
/// [`SearchTimeout`] if the deadline expires mid-search.
pub fn find_cycle_with(
    pred: PathPred,
    filter: Option<PathStateFilter>,
    g: &OpGraph,
    scc: &[OpId],
    deadline: Deadline,
) -> Result<Option<(Vec<OpId>, RwPathState)>, SearchTimeout> {
    let PathPred::NonadjacentRw = pred;
    let mut poller = Poller::new(deadline)?;
    let members: HashSet<OpId> = scc.iter().copied().collect();

    for &start in scc {
        type Node = (OpId, RwPathState);
        let mut parent: HashMap<Node, Node> = HashMap::new();
        let mut seen: HashSet<Node> = HashSet::new();
        let mut queue: VecDeque<Node> = VecDeque::new();

        for (u, rels) in g.out_edges_sorted(start) {
            if !members.contains(&u) {
                continue;
            }
            for rel in rels.iter() {
                poller.tick()?;
                let state = RwPathState::init(rel);
                if u == start {
                    if state.closes() && filter.is_none_or(|f| f.accepts(state)) {
                        return Ok(Some((vec![start], state)));
                    }
                    continue;
                }
                if seen.insert((u, state)) {
                    queue.push_back((u, state));
                }
            }
        }

        while let Some((v, state)) = queue.pop_front() {
            for (w, rels) in g.out_edges_sorted(v) {
                if !members.contains(&w) {
                    continue;
                }
                for rel in rels.iter() {
                    poller.tick()?;
                    let Some(next) = state.step(rel) else {
                        continue;
                    };
                    if w == start {
                        if next.closes() && filter.is_none_or(|f| f.accepts(next)) {
                            let mut path = vec![v];
                            let mut at = (v, state);
                            while let Some(&prev) = parent.get(&at) {
                                path.push(prev.0);
                                at = prev;
                            }
                            path.push(start);
                            path.reverse();
                            return Ok(Some((path, next)));
                        }
                        continue;
                    }
                    if seen.insert((w, next)) {
                        parent.insert((w, next), (v, state));
                        queue.push_back((w, next));
                    }
                }
            }
        }
    }
    Ok(None)
}

/// A guaranteed cycle inside an SCC of `g` itself.
///
/// Greedy walk following the lowest in-component neighbor; the walk must
/// revisit a vertex, and the revisited suffix is a cycle. Never polls a
/// deadline. Returns `None` only if `scc` is not actually strongly
/// connected in `g` (a caller error for its intended use).
#[must_use]
pub fn fallback_cycle(g: &OpGraph, scc: &[OpId]) -> Option<Vec<OpId>> {
    let members: HashSet<OpId> = scc.iter().copied().collect();
    let mut position: HashMap<OpId, usize> = HashMap::new();
    let mut path: Vec<OpId> = Vec::new();
    let mut at = *scc.first()?;

    loop {
        if let Some(&start) = position.get(&at) {
            return Some(path[start..].to_vec());
        }
        position.insert(at, path.len());
        path.push(at);
        at = g
            .out_edges_sorted(at)
            .into_iter()
            .map(|(w, _)| w)
            .find(|w| members.contains(w))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WW: RelSet = RelSet::single(Rel::Ww);
    const WR: RelSet = RelSet::single(Rel::Wr);
    const RW: RelSet = RelSet::single(Rel::Rw);

    fn graph(edges: &[(usize, usize, RelSet)]) -> OpGraph {
        let mut g = OpGraph::new();
        for &(a, b, rels) in edges {
            g.add_edge(OpId(a), OpId(b), rels);
        }
        g
    }

    fn ids(raw: &[usize]) -> Vec<OpId> {
        raw.iter().map(|&i| OpId(i)).collect()
    }

    #[test]
    fn finds_shortest_cycle() {
        // 0 -> 1 -> 2 -> 0 and a shortcut 1 -> 0
        let g = graph(&[
            (0, 1, WW),
            (1, 2, WW),
            (2, 0, WW),
            (1, 0, WW),
        ]);
        let scc = ids(&[0, 1, 2]);
        let cycle = find_cycle(&g, &scc, Deadline::never()).unwrap().unwrap();
        assert_eq!(cycle, ids(&[0, 1]));
    }

    #[test]
    fn respects_projection_absence() {
        // the scc comes from a richer graph; this projection is acyclic
        let g = graph(&[(0, 1, WW), (1, 2, WW)]);
        let scc = ids(&[0, 1, 2]);
        assert_eq!(find_cycle(&g, &scc, Deadline::never()).unwrap(), None);
    }

    #[test]
    fn zero_budget_times_out() {
        let g = graph(&[(0, 1, WW), (1, 0, WW)]);
        let scc = ids(&[0, 1]);
        let result = find_cycle(&g, &scc, Deadline::after(Duration::ZERO));
        assert_eq!(result, Err(SearchTimeout));
    }

    #[test]
    fn starting_with_constrains_first_arc() {
        // rw arc only 1 -> 2; ww/wr arcs close the loop
        let first = graph(&[(1, 2, RW)]);
        let rest = graph(&[(0, 1, WW), (2, 0, WR), (1, 2, WW)]);
        let scc = ids(&[0, 1, 2]);

        let cycle = find_cycle_starting_with(&first, &rest, &scc, Deadline::never())
            .unwrap()
            .unwrap();
        // starts at the rw source
        assert_eq!(cycle, ids(&[1, 2, 0]));
    }

    #[test]
    fn starting_with_needs_a_return_path() {
        let first = graph(&[(1, 2, RW)]);
        let rest = graph(&[(0, 1, WW)]);
        let scc = ids(&[0, 1, 2]);
        assert_eq!(
            find_cycle_starting_with(&first, &rest, &scc, Deadline::never()).unwrap(),
            None
        );
    }

    #[test]
    fn nonadjacent_search_rejects_adjacent_rw() {
        // 0 -rw-> 1 -rw-> 0: both arrangements have adjacent rw arcs
        let g = graph(&[(0, 1, RW), (1, 0, RW)]);
        let scc = ids(&[0, 1]);
        let found = find_cycle_with(
            PathPred::NonadjacentRw,
            Some(PathStateFilter::MultipleRw),
            &g,
            &scc,
            Deadline::never(),
        )
        .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn nonadjacent_search_finds_separated_rw() {
        // 0 -rw-> 1 -wr-> 2 -rw-> 3 -wr-> 0
        let g = graph(&[(0, 1, RW), (1, 2, WR), (2, 3, RW), (3, 0, WR)]);
        let scc = ids(&[0, 1, 2, 3]);
        let (cycle, state) = find_cycle_with(
            PathPred::NonadjacentRw,
            Some(PathStateFilter::MultipleRw),
            &g,
            &scc,
            Deadline::never(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(cycle, ids(&[0, 1, 2, 3]));
        assert_eq!(state.rw_count, 2);
        assert!(!state.first_is_rw || !state.last_is_rw);
    }

    #[test]
    fn nonadjacent_search_requires_two_rw() {
        // only one rw in the loop
        let g = graph(&[(0, 1, RW), (1, 2, WR), (2, 0, WW)]);
        let scc = ids(&[0, 1, 2]);
        let found = find_cycle_with(
            PathPred::NonadjacentRw,
            Some(PathStateFilter::MultipleRw),
            &g,
            &scc,
            Deadline::never(),
        )
        .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn fallback_always_finds_a_witness() {
        let g = graph(&[(0, 1, WW), (1, 2, WW), (2, 1, WW), (2, 0, WW)]);
        let scc = ids(&[0, 1, 2]);
        let cycle = fallback_cycle(&g, &scc).unwrap();
        // the greedy walk 0 -> 1 -> 2 -> 0 revisits 0
        assert_eq!(cycle, ids(&[0, 1, 2]));
    }

    #[test]
    fn canonical_rotation_starts_at_lowest() {
        assert_eq!(
            canonical_rotation(&ids(&[2, 0, 1])),
            ids(&[0, 1, 2])
        );
        assert_eq!(canonical_rotation(&[]), Vec::<OpId>::new());
    }
}
