//! The analysis entry point: graph assembly, parallel SCC search, and
//! verdict aggregation.

use core::fmt::Debug;
use core::hash::Hash;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use derive_more::From;
use rayon::prelude::*;
use typed_builder::TypedBuilder;

use crate::anomaly::specs::{cycle_anomaly_specs, search_scc, CycleAnomalySpec};
use crate::anomaly::{detectors, Anomaly, AnomalyType};
use crate::consistency::{
    impossible_models, prohibited_anomalies, required_order_graphs, Model,
};
use crate::graph::{strongly_connected_components, OpGraph, ProjectionCache, RelSet};
use crate::history::{History, HistoryError, Workload};
use crate::infer::{list_append, order, register, Inference};

/// Analysis options.
///
/// The default checks strict serializability with a one-second search
/// budget per component and spec.
#[derive(Debug, TypedBuilder)]
pub struct Options {
    /// Models whose proscribed anomalies are searched for. The verdict is
    /// `Invalid` as soon as one proscribed anomaly is found.
    #[builder(default = vec![Model::StrictSerializable])]
    pub consistency_models: Vec<Model>,
    /// Additional anomaly tags to treat as prohibited.
    #[builder(default)]
    pub anomalies: Vec<AnomalyType>,
    /// Wall-clock budget for each cycle-spec search within one component.
    #[builder(default = Duration::from_millis(1000))]
    pub cycle_search_timeout: Duration,
    /// Extra dependency graphs to union in, built by the caller from the
    /// same history.
    #[builder(default)]
    pub additional_graphs: Vec<OpGraph>,
    /// Cooperative cancellation: when set, analysis aborts at the next
    /// phase boundary with no partial result.
    #[builder(default)]
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for Options {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Options {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Error aborting an analysis. Anomalies are results, never errors; this
/// covers precondition failures and external cancellation only.
#[derive(Debug, From, Clone, PartialEq, Eq)]
pub enum CheckError<K, V> {
    History(HistoryError<K, V>),
    Aborted,
}

/// The verdict of one analysis.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// No reportable anomaly was found.
    Valid,
    /// At least one prohibited anomaly was found.
    Invalid,
    /// Only unknown-class findings (timeouts, unreadable evidence).
    Unknown,
}

/// The full result of one analysis.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult<K, V> {
    pub valid: Validity,
    /// Sorted tags of every reportable anomaly found.
    pub anomaly_types: Vec<AnomalyType>,
    /// Structured explanations, grouped by tag.
    pub anomalies: BTreeMap<AnomalyType, Vec<Anomaly<K, V>>>,
    /// Consistency models the findings refute.
    pub impossible_models: BTreeSet<Model>,
}

/// Checks a history against the configured consistency models.
///
/// Runs the workload's edge inference, unions in whatever order graphs
/// the models require (plus caller-supplied graphs), decomposes the
/// result into strongly connected components, and searches each
/// component for prohibited cycles while the non-cycle detectors scan
/// the history. Deterministic for a fixed history and option set.
///
/// # Errors
///
/// - [`CheckError::History`] if the history violates a precondition
///   (dialect mix, non-monotonic indices, duplicate appends).
/// - [`CheckError::Aborted`] if the cancellation token fires; no partial
///   result is returned.
pub fn check<K, V>(
    history: &History<K, V>,
    workload: Workload,
    options: &Options,
) -> Result<CheckResult<K, V>, CheckError<K, V>>
where
    K: Eq + Hash + Ord + Clone + Debug + Send + Sync,
    V: Eq + Hash + Ord + Clone + Debug + Send + Sync,
{
    history.ensure_workload(workload)?;

    let prohibited = prohibited_anomalies(&options.consistency_models, &options.anomalies);
    let mut reportable = prohibited.clone();
    reportable.extend(AnomalyType::ALL.into_iter().filter(|a| a.is_unknown_class()));

    let (want_process, want_realtime) = required_order_graphs(&reportable);
    tracing::debug!(
        ?workload,
        prohibited = prohibited.len(),
        want_process,
        want_realtime,
        "starting analysis"
    );

    if options.cancelled() {
        return Err(CheckError::Aborted);
    }

    let Inference {
        graph: txn_graph,
        index,
        anomalies: inferred,
    } = match workload {
        Workload::ListAppend => list_append::infer(history)?,
        Workload::RwRegister => register::infer(history)?,
    };

    let mut found: BTreeMap<AnomalyType, Vec<Anomaly<K, V>>> = BTreeMap::new();
    if txn_graph.edge_count() == 0 && !history.oks().is_empty() {
        found
            .entry(AnomalyType::EmptyTransactionGraph)
            .or_default()
            .push(Anomaly::EmptyTransactionGraph);
    }
    for anomaly in inferred {
        found.entry(anomaly.anomaly_type()).or_default().push(anomaly);
    }

    let mut union = txn_graph;
    if want_process {
        union.union(&order::process_graph(history));
    }
    if want_realtime {
        union.union(&order::realtime_graph(history));
    }
    for extra in &options.additional_graphs {
        union.union(extra);
    }

    if options.cancelled() {
        return Err(CheckError::Aborted);
    }

    let specs: Vec<CycleAnomalySpec> = cycle_anomaly_specs()
        .into_iter()
        .filter(|spec| reportable.contains(&spec.anomaly))
        .collect();

    let projections = ProjectionCache::new(union);
    let label_sets: BTreeSet<RelSet> = specs.iter().flat_map(|s| s.label_sets()).collect();
    let label_sets: Vec<RelSet> = label_sets.into_iter().collect();
    projections.prewarm(&label_sets);

    let full = projections.full();
    let sccs = strongly_connected_components(&full);
    tracing::debug!(
        sccs = sccs.len(),
        edges = full.edge_count(),
        specs = specs.len(),
        "searching components"
    );

    let reports: Result<Vec<_>, CheckError<K, V>> = sccs
        .par_iter()
        .map(|scc| {
            if options.cancelled() {
                return Err(CheckError::Aborted);
            }
            Ok(search_scc(
                &projections,
                &index,
                scc,
                &specs,
                options.cycle_search_timeout,
            ))
        })
        .collect();

    for report in reports? {
        for cycle in report.cycles {
            found
                .entry(cycle.typ)
                .or_default()
                .push(Anomaly::Cycle(cycle));
        }
        if let Some(timeout) = report.timeout {
            found
                .entry(AnomalyType::CycleSearchTimeout)
                .or_default()
                .push(timeout);
        }
    }

    if options.cancelled() {
        return Err(CheckError::Aborted);
    }

    for anomaly in detectors::aborted_reads(history) {
        found.entry(AnomalyType::AbortedRead).or_default().push(anomaly);
    }
    for anomaly in detectors::intermediate_reads(history) {
        found
            .entry(AnomalyType::IntermediateRead)
            .or_default()
            .push(anomaly);
    }
    for anomaly in detectors::lost_updates(history) {
        found.entry(AnomalyType::LostUpdate).or_default().push(anomaly);
    }

    found.retain(|tag, _| reportable.contains(tag));

    let tags: BTreeSet<AnomalyType> = found.keys().copied().collect();
    let valid = if tags.is_empty() {
        Validity::Valid
    } else if tags.iter().any(|tag| prohibited.contains(tag)) {
        Validity::Invalid
    } else {
        Validity::Unknown
    };

    let result = CheckResult {
        valid,
        anomaly_types: tags.iter().copied().collect(),
        impossible_models: impossible_models(&tags),
        anomalies: found,
    };
    tracing::debug!(valid = ?result.valid, anomalies = result.anomaly_types.len(), "analysis done");
    Ok(result)
}
