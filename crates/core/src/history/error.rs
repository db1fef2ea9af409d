use super::{Mop, Workload};

/// Error rejecting a history before analysis. These are precondition
/// failures, not anomalies: analysis aborts with no partial result.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError<K, V> {
    /// A mop from the wrong dialect for the selected workload.
    TypeMismatch {
        workload: Workload,
        op_index: u64,
        mop: Mop<K, V>,
    },
    /// Op indices must be strictly increasing.
    NonMonotonicIndex { op_index: u64 },
    /// A process invoked a transaction while a previous one was still open.
    OverlappingInvoke { process: u64, op_index: u64 },
    /// The same element appended to the same key more than once. Version
    /// order reconstruction relies on globally unique appends.
    DuplicateAppend { key: K, element: V },
}
