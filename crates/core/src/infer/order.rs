//! Process-order and real-time-order graphs.

use std::collections::BTreeMap;

use crate::graph::{OpGraph, Rel, RelSet};
use crate::history::{History, OpId};

const PROCESS: RelSet = RelSet::single(Rel::Process);
const REALTIME: RelSet = RelSet::single(Rel::Realtime);

/// Chains each process's completions (ok and info) in index order.
#[must_use]
pub fn process_graph<K, V>(history: &History<K, V>) -> OpGraph {
    let mut by_process: BTreeMap<u64, Vec<OpId>> = BTreeMap::new();
    for &id in history.oks().iter().chain(history.infos()) {
        by_process
            .entry(history.op(id).process)
            .or_default()
            .push(id);
    }

    let mut g = OpGraph::new();
    for chain in by_process.values_mut() {
        chain.sort_unstable();
        for pair in chain.windows(2) {
            g.add_edge(pair[0], pair[1], PROCESS);
        }
    }
    g
}

struct Interval {
    id: OpId,
    invoke: Option<i64>,
    complete: Option<i64>,
}

/// Real-time order: `a -> b` when `a`'s completion strictly precedes
/// `b`'s invocation in wall-clock time.
///
/// A frontier sweep keeps the edge set close to the transitive reduction:
/// once an op completes, every frontier op that completed before its
/// invocation is covered for all later invocations and leaves the
/// frontier. Extra transitive arcs can survive, which is harmless; no
/// constraint is ever missed.
///
/// Info ops have no completion time, so they can succeed other ops but
/// never precede them. Completions without a recorded invocation can
/// precede but never succeed.
#[must_use]
pub fn realtime_graph<K, V>(history: &History<K, V>) -> OpGraph {
    let mut intervals: Vec<Interval> = Vec::new();
    for &id in history.oks() {
        intervals.push(Interval {
            id,
            invoke: history.invocation_of(id).map(|inv| inv.time),
            complete: Some(history.op(id).time),
        });
    }
    for &id in history.infos() {
        intervals.push(Interval {
            id,
            invoke: history.invocation_of(id).map(|inv| inv.time),
            complete: None,
        });
    }

    let mut by_invoke: Vec<&Interval> = intervals.iter().filter(|i| i.invoke.is_some()).collect();
    by_invoke.sort_unstable_by_key(|i| (i.invoke, i.id));
    let mut by_complete: Vec<&Interval> =
        intervals.iter().filter(|i| i.complete.is_some()).collect();
    by_complete.sort_unstable_by_key(|i| (i.complete, i.id));

    let mut g = OpGraph::new();
    let mut frontier: Vec<&Interval> = Vec::new();
    let mut next_complete = 0usize;

    for b in by_invoke {
        let invoked_at = b.invoke.expect("by_invoke is filtered");
        while next_complete < by_complete.len()
            && by_complete[next_complete].complete.expect("by_complete is filtered") < invoked_at
        {
            let c = by_complete[next_complete];
            next_complete += 1;
            if let Some(c_invoke) = c.invoke {
                frontier.retain(|a| a.complete.expect("frontier ops completed") >= c_invoke);
            }
            frontier.push(c);
        }
        let mut sources: Vec<OpId> = frontier.iter().map(|a| a.id).collect();
        sources.sort_unstable();
        for a in sources {
            if a != b.id {
                g.add_edge(a, b.id, REALTIME);
            }
        }
    }
    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{Mop, Op, OpKind};

    fn op(index: u64, process: u64, kind: OpKind, time: i64) -> Op<&'static str, u64> {
        Op {
            index,
            process,
            kind,
            mops: vec![Mop::append("x", index)],
            time,
        }
    }

    fn pair(h: &mut Vec<Op<&'static str, u64>>, process: u64, invoke_t: i64, ok_t: i64) {
        let base = h.len() as u64;
        h.push(op(base, process, OpKind::Invoke, invoke_t));
        h.push(op(base + 1, process, OpKind::Ok, ok_t));
    }

    #[test]
    fn process_graph_chains_completions() {
        let mut ops = Vec::new();
        pair(&mut ops, 1, 0, 1);
        pair(&mut ops, 2, 2, 3);
        pair(&mut ops, 1, 4, 5);
        let h = History::new(ops).unwrap();

        let g = process_graph(&h);
        // process 1 completions are ops 1 and 5
        assert!(g.has_edge(OpId(1), OpId(5)));
        assert!(!g.has_edge(OpId(1), OpId(3)));
        assert_eq!(g.edge(OpId(1), OpId(5)), PROCESS);
    }

    #[test]
    fn realtime_orders_disjoint_intervals() {
        let mut ops = Vec::new();
        pair(&mut ops, 1, 0, 10); // op 1: [0, 10]
        pair(&mut ops, 2, 20, 30); // op 3: [20, 30]
        let h = History::new(ops).unwrap();

        let g = realtime_graph(&h);
        assert!(g.has_edge(OpId(1), OpId(3)));
        assert!(!g.has_edge(OpId(3), OpId(1)));
    }

    #[test]
    fn realtime_ignores_overlap() {
        let mut ops = Vec::new();
        pair(&mut ops, 1, 0, 25); // [0, 25]
        pair(&mut ops, 2, 20, 30); // [20, 30] overlaps
        let h = History::new(ops).unwrap();

        let g = realtime_graph(&h);
        assert!(!g.has_edge(OpId(1), OpId(3)));
        assert!(!g.has_edge(OpId(3), OpId(1)));
    }

    #[test]
    fn realtime_frontier_reduces_chains() {
        let mut ops = Vec::new();
        pair(&mut ops, 1, 0, 1); // a: [0, 1]
        pair(&mut ops, 2, 2, 3); // b: [2, 3]
        pair(&mut ops, 3, 4, 5); // c: [4, 5]
        let h = History::new(ops).unwrap();

        let g = realtime_graph(&h);
        assert!(g.has_edge(OpId(1), OpId(3)));
        assert!(g.has_edge(OpId(3), OpId(5)));
        // a -> c is covered by b
        assert!(!g.has_edge(OpId(1), OpId(5)));
    }

    #[test]
    fn info_ops_only_succeed() {
        let mut ops = Vec::new();
        pair(&mut ops, 1, 0, 1); // ok: [0, 1]
        let base = ops.len() as u64;
        ops.push(op(base, 2, OpKind::Invoke, 5));
        ops.push(op(base + 1, 2, OpKind::Info, 6));
        pair(&mut ops, 3, 10, 11);
        let h = History::new(ops).unwrap();

        let g = realtime_graph(&h);
        // ok precedes the info op
        assert!(g.has_edge(OpId(1), OpId(3)));
        // the info op precedes nothing, not even the much later op
        assert!(!g.has_edge(OpId(3), OpId(5)));
        // but the earlier ok still reaches the later one (frontier keeps it)
        assert!(g.has_edge(OpId(1), OpId(5)));
    }
}
