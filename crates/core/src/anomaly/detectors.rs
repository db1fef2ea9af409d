//! Non-cycle anomaly detectors: aborted reads, intermediate reads, and
//! lost updates.
//!
//! Each detector builds an index map over the history with a parallel
//! fold-and-merge, then scans committed reads against it. The detectors
//! are independent; none can suppress another.

use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::anomaly::Anomaly;
use crate::history::{History, Mop, Observed, OpId};

/// The key and value a write-like mop installs.
fn written<K, V>(mop: &Mop<K, V>) -> Option<(&K, &V)> {
    match mop {
        Mop::Write { key, value } => Some((key, value)),
        Mop::Append { key, element } => Some((key, element)),
        Mop::Read { .. } => None,
    }
}

/// Every value a committed read observed. A list read observed each of
/// its elements; a scalar read observed its value.
fn observations<K, V>(mop: &Mop<K, V>) -> Option<(&K, Vec<&V>)> {
    match mop {
        Mop::Read {
            key,
            value: Some(Observed::Scalar(v)),
        } => Some((key, vec![v])),
        Mop::Read {
            key,
            value: Some(Observed::List(l)),
        } => Some((key, l.iter().collect())),
        _ => None,
    }
}

/// The single value a read's *final state* shows: the scalar, or the last
/// element of the list.
fn final_observation<K, V>(mop: &Mop<K, V>) -> Option<(&K, &V)> {
    match mop {
        Mop::Read {
            key,
            value: Some(Observed::Scalar(v)),
        } => Some((key, v)),
        Mop::Read {
            key,
            value: Some(Observed::List(l)),
        } => l.last().map(|v| (key, v)),
        _ => None,
    }
}

/// Merges per-chunk index maps, keeping the lowest-indexed op per entry.
fn merge_min<'a, K, V>(
    mut left: HashMap<(&'a K, &'a V), OpId>,
    right: HashMap<(&'a K, &'a V), OpId>,
) -> HashMap<(&'a K, &'a V), OpId>
where
    K: Eq + Hash,
    V: Eq + Hash,
{
    for (kv, id) in right {
        left.entry(kv)
            .and_modify(|existing| *existing = (*existing).min(id))
            .or_insert(id);
    }
    left
}

/// Committed reads that observed a value only a failed write installed.
#[must_use]
pub fn aborted_reads<K, V>(history: &History<K, V>) -> Vec<Anomaly<K, V>>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Eq + Hash + Clone + Debug + Send + Sync,
{
    let failed: HashMap<(&K, &V), OpId> = history
        .fails()
        .par_iter()
        .fold(HashMap::new, |mut acc, &id| {
            for mop in &history.op(id).mops {
                if let Some((key, value)) = written(mop) {
                    acc.entry((key, value)).or_insert(id);
                }
            }
            acc
        })
        .reduce(HashMap::new, merge_min);

    if failed.is_empty() {
        return Vec::new();
    }

    history
        .oks()
        .par_iter()
        .map(|&reader| {
            let mut found = Vec::new();
            for mop in &history.op(reader).mops {
                if let Some((key, values)) = observations(mop) {
                    for value in values {
                        if let Some(&writer) = failed.get(&(key, value)) {
                            found.push(Anomaly::AbortedRead {
                                key: key.clone(),
                                value: value.clone(),
                                writer,
                                reader,
                            });
                        }
                    }
                }
            }
            found
        })
        .flatten()
        .collect()
}

/// Committed reads whose final state shows a value some transaction
/// overwrote before it completed.
///
/// Within one transaction, the final write of a key is its last write (or
/// append); every earlier write of the key is intermediate. For list
/// reads only the last element matters: earlier elements legitimately
/// remain in the list.
#[must_use]
pub fn intermediate_reads<K, V>(history: &History<K, V>) -> Vec<Anomaly<K, V>>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Eq + Hash + Clone + Debug + Send + Sync,
{
    let writer_ids: Vec<OpId> = history
        .oks()
        .iter()
        .chain(history.infos())
        .copied()
        .collect();
    let intermediate: HashMap<(&K, &V), OpId> = writer_ids
        .par_iter()
        .fold(HashMap::new, |mut acc, &id| {
            let mut last_write: HashMap<&K, &V> = HashMap::new();
            for mop in &history.op(id).mops {
                if let Some((key, value)) = written(mop) {
                    if let Some(earlier) = last_write.insert(key, value) {
                        acc.entry((key, earlier)).or_insert(id);
                    }
                }
            }
            acc
        })
        .reduce(HashMap::new, merge_min);

    if intermediate.is_empty() {
        return Vec::new();
    }

    history
        .oks()
        .par_iter()
        .map(|&reader| {
            let mut found = Vec::new();
            for mop in &history.op(reader).mops {
                if let Some((key, value)) = final_observation(mop) {
                    if let Some(&writer) = intermediate.get(&(key, value)) {
                        if writer != reader {
                            found.push(Anomaly::IntermediateRead {
                                key: key.clone(),
                                value: value.clone(),
                                writer,
                                reader,
                            });
                        }
                    }
                }
            }
            found
        })
        .flatten()
        .collect()
}

/// Groups of transactions that read the same version of a key and all
/// wrote the key afterwards: all but one of those writes is lost.
///
/// Only register writes count; appends cannot lose updates this way.
#[must_use]
pub fn lost_updates<K, V>(history: &History<K, V>) -> Vec<Anomaly<K, V>>
where
    K: Eq + Hash + Ord + Clone + Debug + Send + Sync,
    V: Eq + Hash + Ord + Clone + Debug + Send + Sync,
{
    // (key, first externally read value) -> txns that later wrote the key
    let mut groups: BTreeMap<(&K, &V), Vec<OpId>> = BTreeMap::new();

    for &id in history.oks() {
        let mut first_read: HashMap<&K, &V> = HashMap::new();
        let mut wrote: HashMap<&K, ()> = HashMap::new();
        for mop in &history.op(id).mops {
            match mop {
                Mop::Read {
                    key,
                    value: Some(Observed::Scalar(value)),
                } => {
                    // only reads before any own write count as the snapshot
                    if !wrote.contains_key(key) {
                        first_read.entry(key).or_insert(value);
                    }
                }
                Mop::Write { key, .. } => {
                    wrote.insert(key, ());
                }
                _ => {}
            }
        }
        for (key, value) in first_read {
            if wrote.contains_key(key) {
                groups.entry((key, value)).or_default().push(id);
            }
        }
    }

    groups
        .into_iter()
        .filter(|(_, txns)| txns.len() >= 2)
        .map(|((key, value), mut txns)| {
            txns.sort_unstable();
            Anomaly::LostUpdate {
                key: key.clone(),
                value: value.clone(),
                txns,
            }
        })
        .collect()
}
