//! Dependency inference for the list-append workload.
//!
//! Every append is globally unique, so any read of a key observes a
//! prefix of that key's final list, and the observed prefixes witness the
//! key's version order directly:
//!
//! 1. All valid read values of a key, sorted by length, must form a
//!    prefix chain; the longest is the reconstructed version order.
//!    A chain violation is an `incompatible-order` anomaly and disqualifies
//!    the key.
//! 2. Installers of consecutive versions are linked by `ww`.
//! 3. The installer of a read's final element is linked to the reader by
//!    `wr` (empty reads observe the initial state and get no `wr`).
//! 4. A reader anti-depends (`rw`) on the installer of the version
//!    directly following its prefix, when the version order knows one.
//!
//! Appends witnessed by no read stay unordered and contribute no edges;
//! this includes indeterminate (info) appends, which join the element
//! index so a later committed read can pull them into the order.

use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use crate::anomaly::Anomaly;
use crate::graph::{OpGraph, Rel, RelSet};
use crate::history::{History, HistoryError, Mop, Observed, OpId};
use crate::infer::{Inference, PairIndex};

const WW: RelSet = RelSet::single(Rel::Ww);
const WR: RelSet = RelSet::single(Rel::Wr);
const RW: RelSet = RelSet::single(Rel::Rw);

#[derive(Debug)]
struct KeyOutcome<K, V> {
    ww: Vec<(OpId, OpId, K, V, V)>,
    wr: Vec<(OpId, OpId, K, V)>,
    rw: Vec<(OpId, OpId, K, Option<V>, V)>,
    anomalies: Vec<Anomaly<K, V>>,
}

impl<K, V> Default for KeyOutcome<K, V> {
    fn default() -> Self {
        Self {
            ww: Vec::new(),
            wr: Vec::new(),
            rw: Vec::new(),
            anomalies: Vec::new(),
        }
    }
}

/// Infers the dependency graph of a list-append history.
///
/// # Errors
///
/// [`HistoryError::DuplicateAppend`] if any element is appended to the
/// same key twice; version order reconstruction is unsound without
/// global uniqueness.
pub fn infer<K, V>(history: &History<K, V>) -> Result<Inference<K, V>, HistoryError<K, V>>
where
    K: Eq + Hash + Ord + Clone + Debug + Send + Sync,
    V: Eq + Hash + Ord + Clone + Debug + Send + Sync,
{
    // elem -> installer, over committed and indeterminate appends
    let mut appends: BTreeMap<&K, HashMap<&V, OpId>> = BTreeMap::new();
    for &id in history.oks().iter().chain(history.infos()) {
        for mop in &history.op(id).mops {
            if let Mop::Append { key, element } = mop {
                if appends.entry(key).or_default().insert(element, id).is_some() {
                    return Err(HistoryError::DuplicateAppend {
                        key: key.clone(),
                        element: element.clone(),
                    });
                }
            }
        }
    }

    let mut failed: HashMap<&K, HashSet<&V>> = HashMap::new();
    for &id in history.fails() {
        for mop in &history.op(id).mops {
            if let Mop::Append { key, element } = mop {
                failed.entry(key).or_default().insert(element);
            }
        }
    }

    let mut reads: BTreeMap<&K, Vec<(OpId, &Vec<V>)>> = BTreeMap::new();
    for &id in history.oks() {
        for mop in &history.op(id).mops {
            if let Mop::Read {
                key,
                value: Some(Observed::List(list)),
            } = mop
            {
                reads.entry(key).or_default().push((id, list));
            }
        }
    }

    let keys: BTreeSet<&K> = appends.keys().chain(reads.keys()).copied().collect();
    let keys: Vec<&K> = keys.into_iter().collect();

    tracing::debug!(
        keys = keys.len(),
        oks = history.oks().len(),
        "list-append inference"
    );

    let empty_appends: HashMap<&V, OpId> = HashMap::new();
    let outcomes: Vec<KeyOutcome<K, V>> = keys
        .par_iter()
        .map(|&key| {
            key_outcome(
                key,
                appends.get(key).unwrap_or(&empty_appends),
                failed.get(key),
                reads.get(key).map_or(&[], Vec::as_slice),
            )
        })
        .collect();

    let mut graph = OpGraph::new();
    let mut index = PairIndex::new();
    let mut anomalies = Vec::new();
    for &id in history.oks() {
        graph.add_vertex(id);
    }
    for outcome in outcomes {
        for (a, b, key, prev, next) in outcome.ww {
            graph.add_edge(a, b, WW);
            index.record_ww(a, b, key, prev, next);
        }
        for (a, b, key, value) in outcome.wr {
            graph.add_edge(a, b, WR);
            index.record_wr(a, b, key, value);
        }
        for (a, b, key, read, next) in outcome.rw {
            graph.add_edge(a, b, RW);
            index.record_rw(a, b, key, read, next);
        }
        anomalies.extend(outcome.anomalies);
    }
    anomalies.extend(internal_anomalies(history));

    Ok(Inference {
        graph,
        index,
        anomalies,
    })
}

fn key_outcome<K, V>(
    key: &K,
    appended: &HashMap<&V, OpId>,
    failed: Option<&HashSet<&V>>,
    reads: &[(OpId, &Vec<V>)],
) -> KeyOutcome<K, V>
where
    K: Eq + Hash + Ord + Clone + Debug,
    V: Eq + Hash + Ord + Clone + Debug,
{
    let mut out = KeyOutcome::default();

    // Reads containing unwritten elements carry no ordering evidence.
    // Elements of failed appends are left to the aborted-read detector.
    let mut valid: Vec<(OpId, &Vec<V>)> = Vec::new();
    for &(id, list) in reads {
        match list.iter().find(|e| !appended.contains_key(*e)) {
            Some(unknown) => {
                if !failed.is_some_and(|f| f.contains(unknown)) {
                    out.anomalies.push(Anomaly::DirtyRead {
                        key: key.clone(),
                        value: unknown.clone(),
                        reader: id,
                    });
                }
            }
            None => valid.push((id, list)),
        }
    }

    let mut values: Vec<&Vec<V>> = valid.iter().map(|&(_, list)| list).collect();
    values.sort_unstable_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    values.dedup();
    for pair in values.windows(2) {
        if !pair[1].starts_with(pair[0]) {
            out.anomalies.push(Anomaly::IncompatibleOrder {
                key: key.clone(),
                a: Observed::List(pair[0].clone()),
                b: Observed::List(pair[1].clone()),
            });
            return out;
        }
    }
    let order: &[V] = values.last().map_or(&[], |list| list.as_slice());

    for pair in order.windows(2) {
        let a = appended[&pair[0]];
        let b = appended[&pair[1]];
        if a != b {
            out.ww
                .push((a, b, key.clone(), pair[0].clone(), pair[1].clone()));
        }
    }

    for &(id, list) in &valid {
        if let Some(last) = list.last() {
            let installer = appended[last];
            if installer != id {
                out.wr.push((installer, id, key.clone(), last.clone()));
            }
        }
        let pos = list.len();
        if pos < order.len() {
            let next = &order[pos];
            let installer = appended[next];
            if installer != id {
                out.rw
                    .push((id, installer, key.clone(), list.last().cloned(), next.clone()));
            }
        }
    }

    out
}

/// A transaction's reads must agree with its own earlier appends: a read
/// after a prior read extends it by exactly the own appends in between,
/// and a first read ends with whatever the transaction appended so far.
fn internal_anomalies<K, V>(history: &History<K, V>) -> Vec<Anomaly<K, V>>
where
    K: Eq + Hash + Clone,
    V: Eq + Clone,
{
    let mut found = Vec::new();
    for &id in history.oks() {
        let mut known: HashMap<&K, Vec<V>> = HashMap::new();
        let mut pending: HashMap<&K, Vec<V>> = HashMap::new();
        for mop in &history.op(id).mops {
            match mop {
                Mop::Append { key, element } => {
                    if let Some(state) = known.get_mut(key) {
                        state.push(element.clone());
                    } else {
                        pending.entry(key).or_default().push(element.clone());
                    }
                }
                Mop::Read {
                    key,
                    value: Some(Observed::List(list)),
                } => {
                    if let Some(expected) = known.get(key) {
                        if list != expected {
                            found.push(Anomaly::InternalInconsistency {
                                op: id,
                                key: key.clone(),
                                expected: Observed::List(expected.clone()),
                                observed: Observed::List(list.clone()),
                            });
                        }
                    } else {
                        let pre = pending.remove(key).unwrap_or_default();
                        if !pre.is_empty() && !list.ends_with(&pre) {
                            found.push(Anomaly::InternalInconsistency {
                                op: id,
                                key: key.clone(),
                                expected: Observed::List(pre),
                                observed: Observed::List(list.clone()),
                            });
                        }
                    }
                    known.insert(key, list.clone());
                }
                _ => {}
            }
        }
    }
    found
}
