//! The declarative anomaly-spec catalogue and its per-SCC interpreter.
//!
//! Each cycle anomaly is described by a [`CycleAnomalySpec`]: which
//! relations may label its arcs, optionally a distinct constraint for the
//! first arc, optionally a stateful path predicate, and a final check on
//! the classified type. The interpreter picks the search primitive from
//! the populated fields, so adding an anomaly means adding a row, not
//! code.
//!
//! Specs are ordered by severity and specificity; within one component
//! the interpreter runs them in order, each under the configured search
//! budget. The first budget overrun stops the component's search, records
//! which spec was in flight, and falls back to an unconditional witness
//! cycle so the component is never left unreported.

use std::time::Duration;

use crate::anomaly::classify::classify;
#[allow(unused_imports)]
use crate::anomaly::{Anomaly, AnomalyType, CycleExplanation, Step};
use crate::graph::{
    canonical_rotation, fallback_cycle, find_cycle, find_cycle_starting_with, find_cycle_with,
    Deadline, OpGraph, PathPred, PathStateFilter, ProjectionCache, Rel, RelSet, SearchTimeout,
};
use crate::history::OpId;
use crate::infer::PairIndex;

const WW: RelSet = RelSet::single(Rel::Ww);
const WW_WR: RelSet = WW.with(Rel::Wr);
const WW_WR_RW: RelSet = WW_WR.with(Rel::Rw);
const RW: RelSet = RelSet::single(Rel::Rw);

/// One row of the anomaly catalogue.
#[derive(Debug, Clone, Copy)]
pub struct CycleAnomalySpec {
    /// The tag this spec searches for.
    pub anomaly: AnomalyType,
    /// Labels permitted on every arc.
    pub rels: Option<RelSet>,
    /// Labels permitted on the first arc, when it is constrained
    /// separately.
    pub first_rels: Option<RelSet>,
    /// Labels permitted on the remaining arcs.
    pub rest_rels: Option<RelSet>,
    /// Stateful path predicate.
    pub with: Option<PathPred>,
    /// Final gate on the accumulated path state.
    pub filter_path_state: Option<PathStateFilter>,
    /// Accept only cycles that classify exactly as this type.
    pub filter_ex: Option<AnomalyType>,
}

impl CycleAnomalySpec {
    const fn plain(anomaly: AnomalyType, rels: RelSet, filter_ex: Option<AnomalyType>) -> Self {
        Self {
            anomaly,
            rels: Some(rels),
            first_rels: None,
            rest_rels: None,
            with: None,
            filter_path_state: None,
            filter_ex,
        }
    }

    const fn first_rest(
        anomaly: AnomalyType,
        first: RelSet,
        rest: RelSet,
        filter_ex: Option<AnomalyType>,
    ) -> Self {
        Self {
            anomaly,
            rels: None,
            first_rels: Some(first),
            rest_rels: Some(rest),
            with: None,
            filter_path_state: None,
            filter_ex,
        }
    }

    const fn nonadjacent(anomaly: AnomalyType, rels: RelSet) -> Self {
        Self {
            anomaly,
            rels: Some(rels),
            first_rels: None,
            rest_rels: None,
            with: Some(PathPred::NonadjacentRw),
            filter_path_state: Some(PathStateFilter::MultipleRw),
            filter_ex: Some(anomaly),
        }
    }

    /// Every label set this spec's searches and classification touch.
    pub(crate) fn label_sets(&self) -> Vec<RelSet> {
        let mut sets = Vec::new();
        if let Some(rels) = self.rels {
            sets.push(rels);
        }
        if let (Some(first), Some(rest)) = (self.first_rels, self.rest_rels) {
            sets.push(first);
            sets.push(rest);
            sets.push(first.union(rest));
        }
        sets
    }
}

/// The full catalogue, in search priority order: unsuffixed anomalies
/// first (most severe first), then the process-refined set, then the
/// realtime-refined set.
#[must_use]
pub fn cycle_anomaly_specs() -> Vec<CycleAnomalySpec> {
    use AnomalyType as A;

    const PROC: Rel = Rel::Process;
    const RT: Rel = Rel::Realtime;

    vec![
        CycleAnomalySpec::plain(A::G0, WW, None),
        CycleAnomalySpec::plain(A::G1c, WW_WR, Some(A::G1c)),
        CycleAnomalySpec::first_rest(A::GSingle, RW, WW_WR, None),
        CycleAnomalySpec::nonadjacent(A::GNonadjacent, WW_WR_RW),
        CycleAnomalySpec::plain(A::G2Item, WW_WR_RW, Some(A::G2Item)),
        // process refinements
        CycleAnomalySpec::plain(A::G0Process, WW.with(PROC), Some(A::G0Process)),
        CycleAnomalySpec::plain(A::G1cProcess, WW_WR.with(PROC), Some(A::G1cProcess)),
        CycleAnomalySpec::first_rest(
            A::GSingleProcess,
            RW,
            WW_WR.with(PROC),
            Some(A::GSingleProcess),
        ),
        CycleAnomalySpec::nonadjacent(A::GNonadjacentProcess, WW_WR_RW.with(PROC)),
        CycleAnomalySpec::plain(A::G2ItemProcess, WW_WR_RW.with(PROC), Some(A::G2ItemProcess)),
        // realtime refinements
        CycleAnomalySpec::plain(A::G0Realtime, WW.with(RT), Some(A::G0Realtime)),
        CycleAnomalySpec::plain(A::G1cRealtime, WW_WR.with(RT), Some(A::G1cRealtime)),
        CycleAnomalySpec::first_rest(
            A::GSingleRealtime,
            RW,
            WW_WR.with(RT),
            Some(A::GSingleRealtime),
        ),
        CycleAnomalySpec::nonadjacent(A::GNonadjacentRealtime, WW_WR_RW.with(RT)),
        CycleAnomalySpec::plain(
            A::G2ItemRealtime,
            WW_WR_RW.with(RT),
            Some(A::G2ItemRealtime),
        ),
    ]
}

/// The result of searching one strongly connected component.
#[derive(Debug)]
pub struct SccReport<K, V> {
    pub cycles: Vec<CycleExplanation<K, V>>,
    pub timeout: Option<Anomaly<K, V>>,
}

/// Runs the given specs against one component, in order, each under
/// `budget`.
///
/// A found cycle is classified from the labels the search actually saw,
/// checked against the spec's `filter_ex`, canonicalized, and explained
/// arc by arc through the pair index. The first timeout stops the search
/// and reports a `cycle-search-timeout` with the in-flight spec, the
/// completed spec list, and a fallback witness cycle from the full graph.
pub fn search_scc<K, V>(
    projections: &ProjectionCache,
    index: &PairIndex<K, V>,
    scc: &[OpId],
    specs: &[CycleAnomalySpec],
    budget: Duration,
) -> SccReport<K, V>
where
    K: Clone,
    V: Clone,
{
    let mut cycles = Vec::new();
    let mut completed: Vec<AnomalyType> = Vec::new();

    for spec in specs {
        tracing::trace!(anomaly = %spec.anomaly, members = scc.len(), "searching component");
        match run_spec(projections, scc, spec, Deadline::after(budget)) {
            Ok(Some((cycle, arcs))) => {
                if let Some(explanation) = accept(spec, index, cycle, arcs) {
                    cycles.push(explanation);
                }
            }
            Ok(None) => {}
            Err(SearchTimeout) => {
                tracing::debug!(
                    anomaly = %spec.anomaly,
                    members = scc.len(),
                    "cycle search timed out"
                );
                let full = projections.full();
                let fallback = fallback_cycle(&full, scc)
                    .and_then(|cycle| explain_unconditionally(index, &full, cycle));
                return SccReport {
                    cycles,
                    timeout: Some(Anomaly::CycleSearchTimeout {
                        in_flight: spec.anomaly,
                        completed,
                        fallback,
                    }),
                };
            }
        }
        completed.push(spec.anomaly);
    }

    SccReport {
        cycles,
        timeout: None,
    }
}

/// Dispatches a spec to its search primitive and returns the cycle with
/// per-arc labels as seen through the spec's projections.
#[allow(clippy::type_complexity)]
fn run_spec(
    projections: &ProjectionCache,
    scc: &[OpId],
    spec: &CycleAnomalySpec,
    deadline: Deadline,
) -> Result<Option<(Vec<OpId>, Vec<RelSet>)>, SearchTimeout> {
    if let Some(pred) = spec.with {
        let rels = spec.rels.unwrap_or(WW_WR_RW);
        let g = projections.get(rels);
        let found = find_cycle_with(pred, spec.filter_path_state, &g, scc, deadline)?;
        return Ok(found.map(|(cycle, _)| {
            let arcs = arc_labels(&g, &cycle);
            (cycle, arcs)
        }));
    }

    if let Some(rels) = spec.rels {
        let g = projections.get(rels);
        let found = find_cycle(&g, scc, deadline)?;
        return Ok(found.map(|cycle| {
            let arcs = arc_labels(&g, &cycle);
            (cycle, arcs)
        }));
    }

    let (first, rest) = (
        spec.first_rels.unwrap_or(RW),
        spec.rest_rels.unwrap_or(WW_WR),
    );
    let g_first = projections.get(first);
    let g_rest = projections.get(rest);
    let found = find_cycle_starting_with(&g_first, &g_rest, scc, deadline)?;
    Ok(found.map(|cycle| {
        // arc 0 is the constrained arc; label it through the first
        // projection, the remainder through the rest projection
        let mut arcs = arc_labels(&g_rest, &cycle);
        arcs[0] = g_first.edge(cycle[0], cycle[1 % cycle.len()]);
        (cycle, arcs)
    }))
}

fn arc_labels(g: &OpGraph, cycle: &[OpId]) -> Vec<RelSet> {
    (0..cycle.len())
        .map(|i| g.edge(cycle[i], cycle[(i + 1) % cycle.len()]))
        .collect()
}

/// Classifies, filters, canonicalizes, and explains a found cycle.
fn accept<K, V>(
    spec: &CycleAnomalySpec,
    index: &PairIndex<K, V>,
    cycle: Vec<OpId>,
    arcs: Vec<RelSet>,
) -> Option<CycleExplanation<K, V>>
where
    K: Clone,
    V: Clone,
{
    let typ = classify(&arcs)?;
    if spec.filter_ex.is_some_and(|expected| expected != typ) {
        return None;
    }
    Some(explain(index, typ, cycle, arcs))
}

/// Explains a fallback cycle with whatever labels the full graph carries.
fn explain_unconditionally<K, V>(
    index: &PairIndex<K, V>,
    full: &OpGraph,
    cycle: Vec<OpId>,
) -> Option<CycleExplanation<K, V>>
where
    K: Clone,
    V: Clone,
{
    let arcs = arc_labels(full, &cycle);
    let typ = classify(&arcs)?;
    Some(explain(index, typ, cycle, arcs))
}

fn explain<K, V>(
    index: &PairIndex<K, V>,
    typ: AnomalyType,
    cycle: Vec<OpId>,
    arcs: Vec<RelSet>,
) -> CycleExplanation<K, V>
where
    K: Clone,
    V: Clone,
{
    // rotate cycle and arcs together so the lowest op leads
    let canonical = canonical_rotation(&cycle);
    let shift = cycle
        .iter()
        .position(|&id| id == canonical[0])
        .unwrap_or(0);
    let n = cycle.len();
    let steps = (0..n)
        .map(|i| {
            let at = (shift + i) % n;
            index.explain_arc(cycle[at], cycle[(at + 1) % n], arcs[at])
        })
        .collect();

    CycleExplanation {
        typ,
        cycle: canonical,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_is_priority_ordered() {
        let specs = cycle_anomaly_specs();
        let order: Vec<AnomalyType> = specs.iter().map(|s| s.anomaly).collect();
        assert_eq!(
            &order[..5],
            &[
                AnomalyType::G0,
                AnomalyType::G1c,
                AnomalyType::GSingle,
                AnomalyType::GNonadjacent,
                AnomalyType::G2Item,
            ]
        );
        // refined sets follow the plain set
        assert!(order[5..10]
            .iter()
            .all(|a| a.suffix() == crate::anomaly::Suffix::Process));
        assert!(order[10..]
            .iter()
            .all(|a| a.suffix() == crate::anomaly::Suffix::Realtime));
    }

    #[test]
    fn specs_choose_distinct_primitives() {
        let specs = cycle_anomaly_specs();
        let g_single = specs
            .iter()
            .find(|s| s.anomaly == AnomalyType::GSingle)
            .unwrap();
        assert!(g_single.rels.is_none());
        assert_eq!(g_single.first_rels, Some(RW));

        let nonadjacent = specs
            .iter()
            .find(|s| s.anomaly == AnomalyType::GNonadjacent)
            .unwrap();
        assert_eq!(nonadjacent.with, Some(PathPred::NonadjacentRw));
        assert_eq!(
            nonadjacent.filter_path_state,
            Some(PathStateFilter::MultipleRw)
        );
    }

    #[test]
    fn timeout_reports_in_flight_and_fallback() {
        use crate::infer::PairIndex;

        let mut g = OpGraph::new();
        g.add_edge(OpId(0), OpId(1), WW);
        g.add_edge(OpId(1), OpId(0), WW);
        let projections = ProjectionCache::new(g);
        let index: PairIndex<&str, u64> = PairIndex::new();
        let scc = vec![OpId(0), OpId(1)];

        let report = search_scc(
            &projections,
            &index,
            &scc,
            &cycle_anomaly_specs(),
            Duration::ZERO,
        );

        assert!(report.cycles.is_empty());
        let Some(Anomaly::CycleSearchTimeout {
            in_flight,
            completed,
            fallback,
        }) = report.timeout
        else {
            panic!("expected a timeout report");
        };
        assert_eq!(in_flight, AnomalyType::G0);
        assert!(completed.is_empty());
        let fallback = fallback.unwrap();
        assert_eq!(fallback.typ, AnomalyType::G0);
        assert_eq!(fallback.cycle, vec![OpId(0), OpId(1)]);
    }

    #[test]
    fn search_finds_and_canonicalizes_g0() {
        use crate::infer::PairIndex;

        let mut g = OpGraph::new();
        g.add_edge(OpId(2), OpId(1), WW);
        g.add_edge(OpId(1), OpId(2), WW);
        let projections = ProjectionCache::new(g);
        let mut index: PairIndex<&str, u64> = PairIndex::new();
        index.record_ww(OpId(1), OpId(2), "x", 1, 2);
        index.record_ww(OpId(2), OpId(1), "y", 2, 1);
        let scc = vec![OpId(1), OpId(2)];

        let report = search_scc(
            &projections,
            &index,
            &scc,
            &cycle_anomaly_specs(),
            Duration::from_secs(1),
        );

        assert!(report.timeout.is_none());
        let g0 = report
            .cycles
            .iter()
            .find(|c| c.typ == AnomalyType::G0)
            .unwrap();
        assert_eq!(g0.cycle, vec![OpId(1), OpId(2)]);
        assert_eq!(
            g0.steps,
            vec![
                Step::Ww {
                    key: "x",
                    prev: 1,
                    next: 2
                },
                Step::Ww {
                    key: "y",
                    prev: 2,
                    next: 1
                },
            ]
        );
    }
}
