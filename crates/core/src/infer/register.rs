//! Dependency inference for the read-write register workload.
//!
//! Register values are opaque and need not be unique, so version order is
//! reconstructed conservatively from per-transaction evidence only:
//!
//! - write-after-write: a transaction that writes `v1` and later `v2` on
//!   one key orders `v1` directly before `v2`;
//! - write-follows-read: a transaction that (externally) reads `v0` and
//!   then writes `v1` orders `v0` directly before `v1`.
//!
//! Constraints feed a per-key [`ConstraintGraph`]; a contradiction is an
//! `incompatible-order` anomaly and disables ww/rw inference for the key
//! (observed wr edges are kept; they need no version order). Undetermined
//! pairs get no edge at all. The lost-update detector compensates for the
//! deliberate weakness of this inference.

use core::fmt::Debug;
use core::hash::Hash;
use std::collections::{BTreeMap, BTreeSet};

use hashbrown::{HashMap, HashSet};

use crate::anomaly::Anomaly;
use crate::graph::{ConstraintGraph, OpGraph, Rel, RelSet};
use crate::history::{History, HistoryError, Mop, Observed, OpId};
use crate::infer::{Inference, PairIndex};

const WW: RelSet = RelSet::single(Rel::Ww);
const WR: RelSet = RelSet::single(Rel::Wr);
const RW: RelSet = RelSet::single(Rel::Rw);

type WriteIndex<'a, K, V> = BTreeMap<&'a K, BTreeMap<&'a V, Vec<OpId>>>;

/// Infers the dependency graph of a read-write register history.
///
/// # Errors
///
/// Infallible for histories that pass the workload sanity check; the
/// `Result` mirrors the list-append analyzer so the two share a call site.
pub fn infer<K, V>(history: &History<K, V>) -> Result<Inference<K, V>, HistoryError<K, V>>
where
    K: Eq + Hash + Ord + Clone + Debug + Send + Sync,
    V: Eq + Hash + Ord + Clone + Debug + Send + Sync,
{
    let ok_writes = write_index(history, history.oks());
    let info_writes = write_index(history, history.infos());

    let mut failed_values: HashSet<(&K, &V)> = HashSet::new();
    for &id in history.fails() {
        for mop in &history.op(id).mops {
            if let Mop::Write { key, value } = mop {
                failed_values.insert((key, value));
            }
        }
    }

    // Walk each committed transaction once: internal consistency,
    // external reads, and version constraints.
    let mut constraints: BTreeMap<&K, ConstraintGraph<V>> = BTreeMap::new();
    let mut external_reads: Vec<(OpId, &K, &V)> = Vec::new();
    let mut anomalies: Vec<Anomaly<K, V>> = Vec::new();

    for &id in history.oks() {
        let mut last_read: HashMap<&K, &V> = HashMap::new();
        let mut own_write: HashMap<&K, &V> = HashMap::new();
        for mop in &history.op(id).mops {
            match mop {
                Mop::Read {
                    key,
                    value: Some(Observed::Scalar(value)),
                } => {
                    if let Some(&own) = own_write.get(key) {
                        // a read after an own write is internal
                        if value != own {
                            anomalies.push(Anomaly::InternalInconsistency {
                                op: id,
                                key: key.clone(),
                                expected: Observed::Scalar(own.clone()),
                                observed: Observed::Scalar(value.clone()),
                            });
                        }
                    } else {
                        if let Some(&prev) = last_read.get(key) {
                            if value != prev {
                                anomalies.push(Anomaly::InternalInconsistency {
                                    op: id,
                                    key: key.clone(),
                                    expected: Observed::Scalar(prev.clone()),
                                    observed: Observed::Scalar(value.clone()),
                                });
                            }
                        }
                        external_reads.push((id, key, value));
                        last_read.insert(key, value);
                    }
                }
                Mop::Write { key, value } => {
                    if let Some(&own) = own_write.get(key) {
                        constraints
                            .entry(key)
                            .or_default()
                            .add_edge(own.clone(), value.clone());
                    } else if let Some(&observed) = last_read.get(key) {
                        constraints
                            .entry(key)
                            .or_default()
                            .add_edge(observed.clone(), value.clone());
                    }
                    own_write.insert(key, value);
                }
                _ => {}
            }
        }
    }

    let mut graph = OpGraph::new();
    let mut index = PairIndex::new();
    let mut ambiguous: BTreeSet<(&K, &V)> = BTreeSet::new();
    for &id in history.oks() {
        graph.add_vertex(id);
    }

    // wr edges from observed reads
    for &(reader, key, value) in &external_reads {
        if committed_writers(&ok_writes, key, value).len() > 1 {
            ambiguous.insert((key, value));
        }
        match resolve_writer(&ok_writes, &info_writes, key, value) {
            Some(writer) if writer != reader => {
                graph.add_edge(writer, reader, WR);
                index.record_wr(writer, reader, key.clone(), value.clone());
            }
            Some(_) => {}
            None => {
                // a failed write read back is the aborted-read detector's case
                if !failed_values.contains(&(key, value)) {
                    anomalies.push(Anomaly::DirtyRead {
                        key: key.clone(),
                        value: value.clone(),
                        reader,
                    });
                }
            }
        }
    }

    // ww edges from per-key version constraints
    let mut skipped: BTreeSet<&K> = BTreeSet::new();
    for (&key, versions) in &constraints {
        if let Some((a, b)) = versions.cycle_edge() {
            anomalies.push(Anomaly::IncompatibleOrder {
                key: key.clone(),
                a: Observed::Scalar(a),
                b: Observed::Scalar(b),
            });
            skipped.insert(key);
            continue;
        }
        for (prev, next) in versions.edges() {
            if committed_writers(&ok_writes, key, prev).len() > 1 {
                ambiguous.insert((key, prev));
            }
            if committed_writers(&ok_writes, key, next).len() > 1 {
                ambiguous.insert((key, next));
            }
            let Some(installer) = resolve_writer(&ok_writes, &info_writes, key, prev) else {
                continue;
            };
            let Some(successor) = resolve_writer(&ok_writes, &info_writes, key, next) else {
                continue;
            };
            if installer != successor {
                graph.add_edge(installer, successor, WW);
                index.record_ww(installer, successor, key.clone(), prev.clone(), next.clone());
            }
        }
    }

    // rw edges: each external read anti-depends on the installers of the
    // directly following versions
    for &(reader, key, value) in &external_reads {
        if skipped.contains(key) {
            continue;
        }
        let Some(versions) = constraints.get(key) else {
            continue;
        };
        for next in versions.successors(value) {
            let Some(successor) = resolve_writer(&ok_writes, &info_writes, key, next) else {
                continue;
            };
            if successor != reader {
                graph.add_edge(reader, successor, RW);
                index.record_rw(reader, successor, key.clone(), Some(value.clone()), next.clone());
            }
        }
    }

    for (key, value) in ambiguous {
        anomalies.push(Anomaly::AmbiguousVersionOrder {
            key: key.clone(),
            value: value.clone(),
            candidates: committed_writers(&ok_writes, key, value).to_vec(),
        });
    }

    tracing::debug!(
        edges = graph.edge_count(),
        anomalies = anomalies.len(),
        "rw-register inference"
    );

    Ok(Inference {
        graph,
        index,
        anomalies,
    })
}

fn write_index<'a, K, V>(history: &'a History<K, V>, ids: &[OpId]) -> WriteIndex<'a, K, V>
where
    K: Ord,
    V: Ord,
{
    let mut writes: WriteIndex<'a, K, V> = BTreeMap::new();
    for &id in ids {
        for mop in &history.op(id).mops {
            if let Mop::Write { key, value } = mop {
                writes
                    .entry(key)
                    .or_default()
                    .entry(value)
                    .or_default()
                    .push(id);
            }
        }
    }
    writes
}

fn committed_writers<'a, K, V>(writes: &'a WriteIndex<'_, K, V>, key: &K, value: &V) -> &'a [OpId]
where
    K: Ord,
    V: Ord,
{
    writes
        .get(key)
        .and_then(|per_value| per_value.get(value))
        .map_or(&[], Vec::as_slice)
}

/// The deterministic installer of `(key, value)`: the earliest committed
/// writer, falling back to the earliest indeterminate writer.
fn resolve_writer<K, V>(
    ok_writes: &WriteIndex<'_, K, V>,
    info_writes: &WriteIndex<'_, K, V>,
    key: &K,
    value: &V,
) -> Option<OpId>
where
    K: Ord,
    V: Ord,
{
    committed_writers(ok_writes, key, value)
        .first()
        .copied()
        .or_else(|| committed_writers(info_writes, key, value).first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyType;
    use crate::history::{Op, OpKind};

    fn ok_op(index: u64, mops: Vec<Mop<&'static str, u64>>) -> Op<&'static str, u64> {
        Op {
            index,
            process: index,
            kind: OpKind::Ok,
            mops,
            time: index as i64,
        }
    }

    fn hist(ops: Vec<Op<&'static str, u64>>) -> History<&'static str, u64> {
        History::new(ops).unwrap()
    }

    #[test]
    fn write_follows_read_orders_versions() {
        // T0 initializes x; T1 reads 0 and writes 1; T2 reads stale 0
        let h = hist(vec![
            ok_op(0, vec![Mop::write("x", 0)]),
            ok_op(1, vec![Mop::read_scalar("x", 0), Mop::write("x", 1)]),
            ok_op(2, vec![Mop::read_scalar("x", 0)]),
        ]);
        let inf = infer(&h).unwrap();

        assert_eq!(inf.graph.edge(OpId(0), OpId(1)), WW.union(WR));
        assert_eq!(inf.graph.edge(OpId(0), OpId(2)), WR);
        // T2 read the version T1 overwrote
        assert_eq!(inf.graph.edge(OpId(2), OpId(1)), RW);
        // T1's own anti-dependency on itself is not an edge
        assert!(!inf.graph.has_edge(OpId(1), OpId(1)));
        assert!(inf.anomalies.is_empty());
    }

    #[test]
    fn undetermined_order_gets_no_edge() {
        // two blind writes: nothing orders 1 and 2
        let h = hist(vec![
            ok_op(0, vec![Mop::write("x", 1)]),
            ok_op(1, vec![Mop::write("x", 2)]),
        ]);
        let inf = infer(&h).unwrap();
        assert_eq!(inf.graph.edge_count(), 0);
        assert!(inf.anomalies.is_empty());
    }

    #[test]
    fn contradictory_constraints_disqualify_ww() {
        // T0: 1 -> 2, T1: 2 -> 1 on the same key
        let h = hist(vec![
            ok_op(0, vec![Mop::write("x", 1), Mop::write("x", 2)]),
            ok_op(1, vec![Mop::read_scalar("x", 2), Mop::write("x", 1)]),
        ]);
        let inf = infer(&h).unwrap();

        assert!(inf
            .anomalies
            .iter()
            .any(|a| a.anomaly_type() == AnomalyType::IncompatibleOrder));
        // the observed wr edge survives
        assert_eq!(inf.graph.edge(OpId(0), OpId(1)), WR);
        assert!(!inf.graph.has_edge(OpId(1), OpId(0)));
    }

    #[test]
    fn ambiguous_writer_is_reported_and_resolved_deterministically() {
        let h = hist(vec![
            ok_op(0, vec![Mop::write("x", 7)]),
            ok_op(1, vec![Mop::write("x", 7)]),
            ok_op(2, vec![Mop::read_scalar("x", 7)]),
        ]);
        let inf = infer(&h).unwrap();

        // earliest-indexed candidate wins
        assert_eq!(inf.graph.edge(OpId(0), OpId(2)), WR);
        assert!(!inf.graph.has_edge(OpId(1), OpId(2)));
        assert!(matches!(
            inf.anomalies.as_slice(),
            [Anomaly::AmbiguousVersionOrder {
                key: "x",
                value: 7,
                ..
            }]
        ));
    }

    #[test]
    fn internal_inconsistency_after_own_write() {
        let h = hist(vec![ok_op(
            0,
            vec![Mop::write("x", 1), Mop::read_scalar("x", 2)],
        )]);
        let inf = infer(&h).unwrap();
        assert!(matches!(
            inf.anomalies.as_slice(),
            [Anomaly::InternalInconsistency { op: OpId(0), .. }]
        ));
    }

    #[test]
    fn non_repeatable_read_is_internal() {
        let h = hist(vec![
            ok_op(0, vec![Mop::write("x", 1)]),
            ok_op(1, vec![Mop::write("x", 2)]),
            ok_op(
                2,
                vec![Mop::read_scalar("x", 1), Mop::read_scalar("x", 2)],
            ),
        ]);
        let inf = infer(&h).unwrap();
        assert!(inf
            .anomalies
            .iter()
            .any(|a| a.anomaly_type() == AnomalyType::InternalInconsistency));
    }

    #[test]
    fn unwritten_value_is_a_dirty_read() {
        let h = hist(vec![ok_op(0, vec![Mop::read_scalar("x", 9)])]);
        let inf = infer(&h).unwrap();
        assert!(matches!(
            inf.anomalies.as_slice(),
            [Anomaly::DirtyRead {
                key: "x",
                value: 9,
                reader: OpId(0)
            }]
        ));
    }

    #[test]
    fn info_write_resolves_when_no_commit_matches() {
        let h = hist(vec![
            Op {
                index: 0,
                process: 0,
                kind: OpKind::Info,
                mops: vec![Mop::write("x", 5)],
                time: 0,
            },
            ok_op(1, vec![Mop::read_scalar("x", 5)]),
        ]);
        let inf = infer(&h).unwrap();
        assert_eq!(inf.graph.edge(OpId(0), OpId(1)), WR);
        assert!(inf.anomalies.is_empty());
    }
}
