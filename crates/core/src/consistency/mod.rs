//! Consistency models and the anomalies they proscribe.
//!
//! A model is checked by refutation: the checker searches for the
//! anomalies the model forbids and declares the model impossible when it
//! finds one. Models are listed weakest to strongest; each strictly
//! includes the proscriptions of the weaker ones it builds on.
//!
//! Phantom (predicate) anomalies are invisible to the keyed workloads
//! this checker analyzes, so Repeatable Read and Serializable proscribe
//! the same item-level set here.

use core::fmt::{self, Display, Formatter};
use std::collections::BTreeSet;

use crate::anomaly::{AnomalyType, Suffix};

/// A consistency model a history can be checked against.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Model {
    /// Adya PL-1: proscribes write cycles.
    ReadUncommitted,
    /// Adya PL-2: additionally proscribes reading aborted, intermediate,
    /// or unwritten state and circular information flow.
    ReadCommitted,
    /// A transaction's writes become visible all at once; observing only
    /// part of them shows up as read skew at item level.
    MonotonicAtomicView,
    /// Adya PL-2.99 over item-level workloads.
    RepeatableRead,
    /// Reads from a consistent snapshot; write skew remains legal.
    SnapshotIsolation,
    /// Equivalent to some serial order.
    Serializable,
    /// Serializable, and each process observes its own order.
    StrongSessionSerializable,
    /// Serializable in wall-clock order.
    StrictSerializable,
}

impl Model {
    pub const ALL: [Self; 8] = [
        Self::ReadUncommitted,
        Self::ReadCommitted,
        Self::MonotonicAtomicView,
        Self::RepeatableRead,
        Self::SnapshotIsolation,
        Self::Serializable,
        Self::StrongSessionSerializable,
        Self::StrictSerializable,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read-uncommitted",
            Self::ReadCommitted => "read-committed",
            Self::MonotonicAtomicView => "monotonic-atomic-view",
            Self::RepeatableRead => "repeatable-read",
            Self::SnapshotIsolation => "snapshot-isolation",
            Self::Serializable => "serializable",
            Self::StrongSessionSerializable => "strong-session-serializable",
            Self::StrictSerializable => "strict-serializable",
        }
    }

    /// The anomalies whose presence refutes this model.
    #[must_use]
    pub fn proscribed_anomalies(self) -> BTreeSet<AnomalyType> {
        use AnomalyType as A;

        let mut set: BTreeSet<AnomalyType> = match self {
            Self::ReadUncommitted => return [A::G0, A::DirtyRead].into(),
            Self::ReadCommitted => {
                let mut set = Self::ReadUncommitted.proscribed_anomalies();
                set.extend([
                    A::G1c,
                    A::AbortedRead,
                    A::IntermediateRead,
                    A::InternalInconsistency,
                ]);
                return set;
            }
            Self::MonotonicAtomicView => {
                let mut set = Self::ReadCommitted.proscribed_anomalies();
                set.insert(A::GSingle);
                return set;
            }
            Self::RepeatableRead | Self::Serializable => {
                let mut set = Self::ReadCommitted.proscribed_anomalies();
                set.extend([A::GSingle, A::GNonadjacent, A::G2Item, A::LostUpdate]);
                return set;
            }
            Self::SnapshotIsolation => {
                let mut set = Self::ReadCommitted.proscribed_anomalies();
                set.extend([A::GSingle, A::GNonadjacent, A::LostUpdate]);
                return set;
            }
            Self::StrongSessionSerializable => Self::Serializable.proscribed_anomalies(),
            Self::StrictSerializable => Self::StrongSessionSerializable.proscribed_anomalies(),
        };

        match self {
            Self::StrongSessionSerializable => {
                set.extend([
                    A::G0Process,
                    A::G1cProcess,
                    A::GSingleProcess,
                    A::GNonadjacentProcess,
                    A::G2ItemProcess,
                ]);
            }
            Self::StrictSerializable => {
                set.extend([
                    A::G0Realtime,
                    A::G1cRealtime,
                    A::GSingleRealtime,
                    A::GNonadjacentRealtime,
                    A::G2ItemRealtime,
                ]);
            }
            _ => {}
        }
        set
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown consistency model {s:?}"))
    }
}

/// Anomalies whose occurrence implies an occurrence of the given one.
///
/// Adya defines G1c over ww and wr arcs, so a pure write cycle (G0) is a
/// G1c instance as well; proscribing G1c therefore proscribes G0, per
/// suffix family.
fn implied(anomaly: AnomalyType) -> &'static [AnomalyType] {
    use AnomalyType as A;
    match anomaly {
        A::G0 => &[A::G1c],
        A::G0Process => &[A::G1cProcess],
        A::G0Realtime => &[A::G1cRealtime],
        _ => &[],
    }
}

/// The full prohibited set for a model list plus explicitly requested
/// anomaly tags, closed under implication.
#[must_use]
pub fn prohibited_anomalies(models: &[Model], extra: &[AnomalyType]) -> BTreeSet<AnomalyType> {
    let mut set: BTreeSet<AnomalyType> = models
        .iter()
        .flat_map(|m| m.proscribed_anomalies())
        .chain(extra.iter().copied())
        .collect();

    loop {
        let grown: Vec<AnomalyType> = AnomalyType::ALL
            .into_iter()
            .filter(|a| !set.contains(a))
            .filter(|a| implied(*a).iter().any(|target| set.contains(target)))
            .collect();
        if grown.is_empty() {
            break;
        }
        set.extend(grown);
    }
    set
}

/// Which order graphs the reportable anomaly set requires.
///
/// Realtime reporting implies the process graph as well: both refine the
/// same cycles and realtime models subsume session guarantees.
#[must_use]
pub fn required_order_graphs(reportable: &BTreeSet<AnomalyType>) -> (bool, bool) {
    let realtime = reportable.iter().any(|a| a.suffix() == Suffix::Realtime);
    let process = realtime || reportable.iter().any(|a| a.suffix() == Suffix::Process);
    (process, realtime)
}

/// Models refuted by the anomalies actually found.
#[must_use]
pub fn impossible_models(found: &BTreeSet<AnomalyType>) -> BTreeSet<Model> {
    Model::ALL
        .into_iter()
        .filter(|m| !m.proscribed_anomalies().is_disjoint(found))
        .collect()
}
