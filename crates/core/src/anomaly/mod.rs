//! The anomaly catalogue: tags, structured explanations, and detection.

use core::fmt::{self, Display, Formatter};

use crate::graph::RelSet;
use crate::history::{Observed, OpId};

pub mod classify;
pub mod detectors;
pub mod specs;

/// Every anomaly tag the checker can report.
///
/// Cycle anomalies follow Adya's nomenclature, refined with `-process`
/// (session order participates in the cycle) and `-realtime` (wall-clock
/// order participates). The remaining tags are non-cycle anomalies and
/// analysis artifacts.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnomalyType {
    /// Write cycle: every arc is ww.
    G0,
    G0Process,
    G0Realtime,
    /// Circular information flow: ww/wr arcs with at least one wr.
    G1c,
    G1cProcess,
    G1cRealtime,
    /// Exactly one anti-dependency arc (read skew).
    GSingle,
    GSingleProcess,
    GSingleRealtime,
    /// Two or more anti-dependency arcs, no two adjacent.
    GNonadjacent,
    GNonadjacentProcess,
    GNonadjacentRealtime,
    /// Two or more anti-dependency arcs, at least two adjacent.
    G2Item,
    G2ItemProcess,
    G2ItemRealtime,
    /// A committed read observed an aborted write.
    AbortedRead,
    /// A committed read observed a value a transaction later overwrote.
    IntermediateRead,
    /// A committed read observed a value nothing wrote.
    DirtyRead,
    /// A transaction's reads disagree with its own earlier operations.
    InternalInconsistency,
    /// Two transactions read the same version of a key and both wrote it.
    LostUpdate,
    /// Read observations of one key contradict each other.
    IncompatibleOrder,
    /// Several writes could have installed an observed version.
    AmbiguousVersionOrder,
    /// No dependencies could be inferred at all.
    EmptyTransactionGraph,
    /// A cycle search exhausted its budget.
    CycleSearchTimeout,
}

/// Cycle-type refinement by the strongest order relation in the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    None,
    Process,
    Realtime,
}

impl AnomalyType {
    pub const ALL: [Self; 24] = [
        Self::G0,
        Self::G0Process,
        Self::G0Realtime,
        Self::G1c,
        Self::G1cProcess,
        Self::G1cRealtime,
        Self::GSingle,
        Self::GSingleProcess,
        Self::GSingleRealtime,
        Self::GNonadjacent,
        Self::GNonadjacentProcess,
        Self::GNonadjacentRealtime,
        Self::G2Item,
        Self::G2ItemProcess,
        Self::G2ItemRealtime,
        Self::AbortedRead,
        Self::IntermediateRead,
        Self::DirtyRead,
        Self::InternalInconsistency,
        Self::LostUpdate,
        Self::IncompatibleOrder,
        Self::AmbiguousVersionOrder,
        Self::EmptyTransactionGraph,
        Self::CycleSearchTimeout,
    ];

    /// Anomalies that neither prove nor disprove anything: the analysis
    /// could not finish or could not make sense of the evidence.
    #[must_use]
    pub const fn is_unknown_class(self) -> bool {
        matches!(
            self,
            Self::IncompatibleOrder
                | Self::AmbiguousVersionOrder
                | Self::EmptyTransactionGraph
                | Self::CycleSearchTimeout
        )
    }

    /// The order-relation refinement of a cycle anomaly tag.
    #[must_use]
    pub const fn suffix(self) -> Suffix {
        match self {
            Self::G0Process
            | Self::G1cProcess
            | Self::GSingleProcess
            | Self::GNonadjacentProcess
            | Self::G2ItemProcess => Suffix::Process,
            Self::G0Realtime
            | Self::G1cRealtime
            | Self::GSingleRealtime
            | Self::GNonadjacentRealtime
            | Self::G2ItemRealtime => Suffix::Realtime,
            _ => Suffix::None,
        }
    }

    /// Applies a suffix to an unsuffixed cycle anomaly tag.
    #[must_use]
    pub const fn with_suffix(self, suffix: Suffix) -> Self {
        match (self, suffix) {
            (Self::G0, Suffix::Process) => Self::G0Process,
            (Self::G0, Suffix::Realtime) => Self::G0Realtime,
            (Self::G1c, Suffix::Process) => Self::G1cProcess,
            (Self::G1c, Suffix::Realtime) => Self::G1cRealtime,
            (Self::GSingle, Suffix::Process) => Self::GSingleProcess,
            (Self::GSingle, Suffix::Realtime) => Self::GSingleRealtime,
            (Self::GNonadjacent, Suffix::Process) => Self::GNonadjacentProcess,
            (Self::GNonadjacent, Suffix::Realtime) => Self::GNonadjacentRealtime,
            (Self::G2Item, Suffix::Process) => Self::G2ItemProcess,
            (Self::G2Item, Suffix::Realtime) => Self::G2ItemRealtime,
            (base, _) => base,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::G0 => "g0",
            Self::G0Process => "g0-process",
            Self::G0Realtime => "g0-realtime",
            Self::G1c => "g1c",
            Self::G1cProcess => "g1c-process",
            Self::G1cRealtime => "g1c-realtime",
            Self::GSingle => "g-single",
            Self::GSingleProcess => "g-single-process",
            Self::GSingleRealtime => "g-single-realtime",
            Self::GNonadjacent => "g-nonadjacent",
            Self::GNonadjacentProcess => "g-nonadjacent-process",
            Self::GNonadjacentRealtime => "g-nonadjacent-realtime",
            Self::G2Item => "g2-item",
            Self::G2ItemProcess => "g2-item-process",
            Self::G2ItemRealtime => "g2-item-realtime",
            Self::AbortedRead => "aborted-read",
            Self::IntermediateRead => "intermediate-read",
            Self::DirtyRead => "dirty-read",
            Self::InternalInconsistency => "internal-inconsistency",
            Self::LostUpdate => "lost-update",
            Self::IncompatibleOrder => "incompatible-order",
            Self::AmbiguousVersionOrder => "ambiguous-version-order",
            Self::EmptyTransactionGraph => "empty-transaction-graph",
            Self::CycleSearchTimeout => "cycle-search-timeout",
        }
    }
}

impl Display for AnomalyType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AnomalyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown anomaly tag {s:?}"))
    }
}

/// Mop-level justification for one arc of a cycle.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<K, V> {
    /// Source installed `prev`, target installed the directly following
    /// version `next` of `key`.
    Ww { key: K, prev: V, next: V },
    /// Target read `value`, which source installed on `key`.
    Wr { key: K, value: V },
    /// Source read `read` (`None` for the initial state) of `key`; target
    /// installed the directly following version `next`.
    Rw {
        key: K,
        read: Option<V>,
        next: V,
    },
    /// Consecutive completions by one process.
    Process,
    /// Source completed before target was invoked.
    Realtime,
    /// An arc from a caller-supplied graph.
    Other { rels: RelSet },
}

/// A classified cycle with per-arc justifications.
///
/// `cycle` is rotated so the lowest op comes first; `steps[i]` explains
/// the arc from `cycle[i]` to `cycle[(i + 1) % n]`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleExplanation<K, V> {
    pub typ: AnomalyType,
    pub cycle: Vec<OpId>,
    pub steps: Vec<Step<K, V>>,
}

/// A structured explanation of one detected anomaly.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly<K, V> {
    Cycle(CycleExplanation<K, V>),
    AbortedRead {
        key: K,
        value: V,
        writer: OpId,
        reader: OpId,
    },
    IntermediateRead {
        key: K,
        value: V,
        writer: OpId,
        reader: OpId,
    },
    DirtyRead {
        key: K,
        value: V,
        reader: OpId,
    },
    InternalInconsistency {
        op: OpId,
        key: K,
        expected: Observed<V>,
        observed: Observed<V>,
    },
    LostUpdate {
        key: K,
        value: V,
        txns: Vec<OpId>,
    },
    IncompatibleOrder {
        key: K,
        a: Observed<V>,
        b: Observed<V>,
    },
    AmbiguousVersionOrder {
        key: K,
        value: V,
        candidates: Vec<OpId>,
    },
    EmptyTransactionGraph,
    CycleSearchTimeout {
        /// The spec that was in flight when the budget ran out.
        in_flight: AnomalyType,
        /// Specs that had already finished for this component.
        completed: Vec<AnomalyType>,
        /// A witness cycle so the component is never left unreported.
        fallback: Option<CycleExplanation<K, V>>,
    },
}

impl<K, V> Anomaly<K, V> {
    /// The tag this explanation is filed under.
    #[must_use]
    pub const fn anomaly_type(&self) -> AnomalyType {
        match self {
            Self::Cycle(c) => c.typ,
            Self::AbortedRead { .. } => AnomalyType::AbortedRead,
            Self::IntermediateRead { .. } => AnomalyType::IntermediateRead,
            Self::DirtyRead { .. } => AnomalyType::DirtyRead,
            Self::InternalInconsistency { .. } => AnomalyType::InternalInconsistency,
            Self::LostUpdate { .. } => AnomalyType::LostUpdate,
            Self::IncompatibleOrder { .. } => AnomalyType::IncompatibleOrder,
            Self::AmbiguousVersionOrder { .. } => AnomalyType::AmbiguousVersionOrder,
            Self::EmptyTransactionGraph => AnomalyType::EmptyTransactionGraph,
            Self::CycleSearchTimeout { .. } => AnomalyType::CycleSearchTimeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_roundtrip() {
        for tag in AnomalyType::ALL {
            let shown = tag.to_string();
            assert_eq!(shown.parse::<AnomalyType>().unwrap(), tag);
        }
        assert!("g3".parse::<AnomalyType>().is_err());
    }

    #[test]
    fn suffixing() {
        assert_eq!(
            AnomalyType::GSingle.with_suffix(Suffix::Realtime),
            AnomalyType::GSingleRealtime
        );
        assert_eq!(AnomalyType::G0.with_suffix(Suffix::None), AnomalyType::G0);
        assert_eq!(AnomalyType::G2ItemProcess.suffix(), Suffix::Process);
    }

    #[test]
    fn unknown_class_membership() {
        assert!(AnomalyType::CycleSearchTimeout.is_unknown_class());
        assert!(AnomalyType::IncompatibleOrder.is_unknown_class());
        assert!(!AnomalyType::G0.is_unknown_class());
        assert!(!AnomalyType::LostUpdate.is_unknown_class());
    }
}
