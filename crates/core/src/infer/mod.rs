//! Per-workload inference of dependency edges from a history.
//!
//! Both analyzers produce an [`Inference`]: the labeled dependency graph,
//! a [`PairIndex`] that can justify any inferred arc at the mop level, and
//! whatever anomalies surfaced during inference itself (contradictory
//! version orders, dirty reads, internal inconsistencies).

use hashbrown::HashMap;

use crate::anomaly::{Anomaly, Step};
use crate::graph::{OpGraph, Rel, RelSet};
use crate::history::OpId;

pub mod list_append;
pub mod order;
pub mod register;

/// The output of one workload analyzer.
#[derive(Debug)]
pub struct Inference<K, V> {
    pub graph: OpGraph,
    pub index: PairIndex<K, V>,
    pub anomalies: Vec<Anomaly<K, V>>,
}

/// Justifications for inferred arcs, recorded as the arcs are created.
///
/// Explaining a pair is a pure lookup; no graph traversal happens after
/// the build phase. When several keys justify the same arc, the first
/// recorded (lowest key, by construction) wins.
#[derive(Debug, Default)]
pub struct PairIndex<K, V> {
    ww: HashMap<(OpId, OpId), (K, V, V)>,
    wr: HashMap<(OpId, OpId), (K, V)>,
    rw: HashMap<(OpId, OpId), (K, Option<V>, V)>,
}

impl<K, V> PairIndex<K, V> {
    pub fn new() -> Self {
        Self {
            ww: HashMap::new(),
            wr: HashMap::new(),
            rw: HashMap::new(),
        }
    }

    pub fn record_ww(&mut self, a: OpId, b: OpId, key: K, prev: V, next: V) {
        self.ww.entry((a, b)).or_insert((key, prev, next));
    }

    pub fn record_wr(&mut self, a: OpId, b: OpId, key: K, value: V) {
        self.wr.entry((a, b)).or_insert((key, value));
    }

    pub fn record_rw(&mut self, a: OpId, b: OpId, key: K, read: Option<V>, next: V) {
        self.rw.entry((a, b)).or_insert((key, read, next));
    }
}

impl<K, V> PairIndex<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Justifies the arc `a -> b` given its labels, preferring the most
    /// direct dependency kind: ww, then wr, then rw, then order edges.
    #[must_use]
    pub fn explain_arc(&self, a: OpId, b: OpId, rels: RelSet) -> Step<K, V> {
        if rels.contains(Rel::Ww) {
            if let Some((key, prev, next)) = self.ww.get(&(a, b)) {
                return Step::Ww {
                    key: key.clone(),
                    prev: prev.clone(),
                    next: next.clone(),
                };
            }
        }
        if rels.contains(Rel::Wr) {
            if let Some((key, value)) = self.wr.get(&(a, b)) {
                return Step::Wr {
                    key: key.clone(),
                    value: value.clone(),
                };
            }
        }
        if rels.contains(Rel::Rw) {
            if let Some((key, read, next)) = self.rw.get(&(a, b)) {
                return Step::Rw {
                    key: key.clone(),
                    read: read.clone(),
                    next: next.clone(),
                };
            }
        }
        if rels.contains(Rel::Process) {
            return Step::Process;
        }
        if rels.contains(Rel::Realtime) {
            return Step::Realtime;
        }
        Step::Other { rels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explain_prefers_direct_dependencies() {
        let mut index: PairIndex<&str, u64> = PairIndex::new();
        index.record_ww(OpId(0), OpId(1), "x", 1, 2);
        index.record_wr(OpId(0), OpId(1), "x", 2);

        let rels = RelSet::single(Rel::Ww).with(Rel::Wr);
        assert_eq!(
            index.explain_arc(OpId(0), OpId(1), rels),
            Step::Ww {
                key: "x",
                prev: 1,
                next: 2
            }
        );
        assert_eq!(
            index.explain_arc(OpId(0), OpId(1), RelSet::single(Rel::Wr)),
            Step::Wr { key: "x", value: 2 }
        );
    }

    #[test]
    fn order_arcs_need_no_index() {
        let index: PairIndex<&str, u64> = PairIndex::new();
        assert_eq!(
            index.explain_arc(OpId(3), OpId(4), RelSet::single(Rel::Realtime)),
            Step::Realtime
        );
        assert_eq!(
            index.explain_arc(OpId(3), OpId(4), RelSet::single(Rel::Process)),
            Step::Process
        );
    }
}
