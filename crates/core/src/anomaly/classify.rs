//! Classification of a closed edge sequence into an anomaly type.

use crate::anomaly::{AnomalyType, Suffix};
use crate::graph::{Rel, RelSet};

/// Classifies a cycle by the labels on its arcs.
///
/// `arcs[i]` labels the arc from cycle node `i` to node `(i + 1) % n`.
/// An arc carrying several labels counts once per label. Rules, in order:
///
/// - exactly one rw arc: G-single;
/// - two or more rw arcs: G2-item if any two are adjacent (the wraparound
///   from the last arc to the first counts), else G-nonadjacent;
/// - otherwise, any wr arc: G1c;
/// - otherwise, any ww arc: G0.
///
/// The result is refined with `-realtime` if any arc carries a realtime
/// label, else `-process` if any carries a process label.
///
/// Returns `None` for an empty arc list or a cycle with none of the
/// dependency labels, which inference never produces.
#[must_use]
pub fn classify(arcs: &[RelSet]) -> Option<AnomalyType> {
    if arcs.is_empty() {
        return None;
    }

    let n = arcs.len();
    let is_rw: Vec<bool> = arcs.iter().map(|rels| rels.contains(Rel::Rw)).collect();
    let rw_count = is_rw.iter().filter(|&&rw| rw).count();
    let adjacent_rw = (0..n).any(|i| is_rw[i] && is_rw[(i + 1) % n]);
    let any_wr = arcs.iter().any(|rels| rels.contains(Rel::Wr));
    let any_ww = arcs.iter().any(|rels| rels.contains(Rel::Ww));

    let base = match rw_count {
        1 => AnomalyType::GSingle,
        _ if rw_count > 1 && adjacent_rw => AnomalyType::G2Item,
        _ if rw_count > 1 => AnomalyType::GNonadjacent,
        _ if any_wr => AnomalyType::G1c,
        _ if any_ww => AnomalyType::G0,
        _ => return None,
    };

    let suffix = if arcs.iter().any(|rels| rels.contains(Rel::Realtime)) {
        Suffix::Realtime
    } else if arcs.iter().any(|rels| rels.contains(Rel::Process)) {
        Suffix::Process
    } else {
        Suffix::None
    };

    Some(base.with_suffix(suffix))
}
