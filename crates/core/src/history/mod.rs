//! Normalized representation of recorded histories.
//!
//! A history is a flat, index-ordered sequence of [`Op`] records. Every
//! operation a client performs appears (at most) twice: once as an
//! `invoke` and once as a terminal completion (`ok`, `fail`, or `info`).
//! Analysis runs over completions; invocations only contribute their
//! wall-clock times to the real-time order.

use core::fmt::{self, Debug, Formatter};
use core::hash::Hash;

use hashbrown::HashMap;

pub mod error;
#[cfg(feature = "serde")]
mod serde_impl;

pub use error::HistoryError;

/// Identifies an op by its position in the history's op arena.
///
/// Positions follow the (strictly increasing) op `index`, so ordering
/// `OpId`s orders ops by index. All graph nodes are `OpId`s.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub usize);

/// Lifecycle stage of an op record.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// The client submitted the transaction.
    Invoke,
    /// The transaction definitely committed.
    Ok,
    /// The transaction definitely aborted.
    Fail,
    /// Indeterminate: the transaction may or may not have taken effect.
    Info,
}

/// The value a read observed: a register scalar or an append-list prefix.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Observed<V> {
    Scalar(V),
    List(Vec<V>),
}

impl<V> Debug for Observed<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v:?}"),
            Self::List(l) => write!(f, "{l:?}"),
        }
    }
}

/// A single micro-operation inside a transaction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mop<K, V> {
    /// Observe the current value of `key`. `None` when the read never
    /// completed (non-ok ops).
    Read { key: K, value: Option<Observed<V>> },
    /// Set `key` to `value` (register dialect).
    Write { key: K, value: V },
    /// Append `element` to the list at `key` (list-append dialect).
    Append { key: K, element: V },
}

impl<K, V> Mop<K, V> {
    pub const fn read_scalar(key: K, value: V) -> Self {
        Self::Read {
            key,
            value: Some(Observed::Scalar(value)),
        }
    }

    pub const fn read_list(key: K, value: Vec<V>) -> Self {
        Self::Read {
            key,
            value: Some(Observed::List(value)),
        }
    }

    pub const fn read_none(key: K) -> Self {
        Self::Read { key, value: None }
    }

    pub const fn write(key: K, value: V) -> Self {
        Self::Write { key, value }
    }

    pub const fn append(key: K, element: V) -> Self {
        Self::Append { key, element }
    }

    pub const fn key(&self) -> &K {
        match self {
            Self::Read { key, .. } | Self::Write { key, .. } | Self::Append { key, .. } => key,
        }
    }
}

impl<K, V> Debug for Mop<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Read { key, value: None } => write!(f, "{key:?}=>?"),
            Self::Read {
                key,
                value: Some(v),
            } => write!(f, "{key:?}=>{v:?}"),
            Self::Write { key, value } => write!(f, "{key:?}<={value:?}"),
            Self::Append { key, element } => write!(f, "{key:?}<+{element:?}"),
        }
    }
}

/// One record of a history: an invocation or completion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op<K, V> {
    /// Position in the recorded history. Strictly increasing.
    pub index: u64,
    /// The client process that performed the transaction.
    pub process: u64,
    pub kind: OpKind,
    /// The transaction body, in execution order.
    pub mops: Vec<Mop<K, V>>,
    /// Wall-clock time in nanoseconds.
    pub time: i64,
}

/// The micro-operation dialect a history is written in.
///
/// A history mixes dialects only by mistake; [`History::ensure_workload`]
/// rejects the mix before any inference runs.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Appends to per-key lists; reads observe prefixes.
    ListAppend,
    /// Opaque writes to per-key registers; reads observe scalars.
    RwRegister,
}

/// An immutable, validated history of op records.
///
/// Construction pairs each completion with its invocation and indexes
/// completions by kind. Ops are never mutated after ingestion.
#[derive(Debug, Clone)]
pub struct History<K, V> {
    ops: Vec<Op<K, V>>,
    /// Completion op -> its invocation op.
    invocation: HashMap<OpId, OpId>,
    oks: Vec<OpId>,
    fails: Vec<OpId>,
    infos: Vec<OpId>,
}

impl<K, V> History<K, V> {
    /// Ingest a sequence of op records.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NonMonotonicIndex`] if op indices are not
    /// strictly increasing, and [`HistoryError::OverlappingInvoke`] if a
    /// process invokes a new transaction while one is still open.
    /// Completions without a recorded invocation are tolerated (crash
    /// artifacts); so are invocations that never complete.
    pub fn new(ops: Vec<Op<K, V>>) -> Result<Self, HistoryError<K, V>> {
        let mut last_index: Option<u64> = None;
        let mut open: HashMap<u64, OpId> = HashMap::new();
        let mut invocation = HashMap::new();
        let mut oks = Vec::new();
        let mut fails = Vec::new();
        let mut infos = Vec::new();

        for (pos, op) in ops.iter().enumerate() {
            let id = OpId(pos);
            if last_index.is_some_and(|prev| op.index <= prev) {
                return Err(HistoryError::NonMonotonicIndex { op_index: op.index });
            }
            last_index = Some(op.index);

            match op.kind {
                OpKind::Invoke => {
                    if open.insert(op.process, id).is_some() {
                        return Err(HistoryError::OverlappingInvoke {
                            process: op.process,
                            op_index: op.index,
                        });
                    }
                }
                OpKind::Ok | OpKind::Fail | OpKind::Info => {
                    if let Some(inv) = open.remove(&op.process) {
                        invocation.insert(id, inv);
                    }
                    match op.kind {
                        OpKind::Ok => oks.push(id),
                        OpKind::Fail => fails.push(id),
                        OpKind::Info => infos.push(id),
                        OpKind::Invoke => unreachable!(),
                    }
                }
            }
        }

        Ok(Self {
            ops,
            invocation,
            oks,
            fails,
            infos,
        })
    }

    #[must_use]
    pub fn op(&self, id: OpId) -> &Op<K, V> {
        &self.ops[id.0]
    }

    /// All ops, in index order.
    #[must_use]
    pub fn ops(&self) -> &[Op<K, V>] {
        &self.ops
    }

    /// Successful completions, in index order.
    #[must_use]
    pub fn oks(&self) -> &[OpId] {
        &self.oks
    }

    /// Definite aborts, in index order.
    #[must_use]
    pub fn fails(&self) -> &[OpId] {
        &self.fails
    }

    /// Indeterminate completions, in index order.
    #[must_use]
    pub fn infos(&self) -> &[OpId] {
        &self.infos
    }

    /// The invocation record of a completion, if one was recorded.
    #[must_use]
    pub fn invocation_of(&self, id: OpId) -> Option<&Op<K, V>> {
        self.invocation.get(&id).map(|inv| &self.ops[inv.0])
    }

    /// Streams `(op, mop)` pairs over the given completions, preserving
    /// mop order within each op.
    pub fn op_mops<'a>(
        &'a self,
        ids: &'a [OpId],
    ) -> impl Iterator<Item = (OpId, &'a Mop<K, V>)> + 'a {
        ids.iter()
            .flat_map(move |&id| self.ops[id.0].mops.iter().map(move |mop| (id, mop)))
    }
}

impl<K, V> History<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Assert that every mop in the history belongs to `workload`'s dialect.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::TypeMismatch`] citing the first offending
    /// mop: a `Write` or scalar read in a list-append history, or an
    /// `Append` or list read in a register history.
    pub fn ensure_workload(&self, workload: Workload) -> Result<(), HistoryError<K, V>> {
        for op in &self.ops {
            for mop in &op.mops {
                let foreign = match workload {
                    Workload::ListAppend => matches!(
                        mop,
                        Mop::Write { .. }
                            | Mop::Read {
                                value: Some(Observed::Scalar(_)),
                                ..
                            }
                    ),
                    Workload::RwRegister => matches!(
                        mop,
                        Mop::Append { .. }
                            | Mop::Read {
                                value: Some(Observed::List(_)),
                                ..
                            }
                    ),
                };
                if foreign {
                    return Err(HistoryError::TypeMismatch {
                        workload,
                        op_index: op.index,
                        mop: mop.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl<K, V> History<K, V>
where
    K: Eq + Hash,
{
    /// True if no ok completion carries any mop. Such histories have no
    /// transaction graph at all.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.oks.iter().all(|&id| self.ops[id.0].mops.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(index: u64, process: u64, kind: OpKind) -> Op<&'static str, u64> {
        Op {
            index,
            process,
            kind,
            mops: vec![Mop::append("x", index)],
            time: index as i64,
        }
    }

    #[test]
    fn pairs_invocations_with_completions() {
        let h = History::new(vec![
            op(0, 1, OpKind::Invoke),
            op(1, 2, OpKind::Invoke),
            op(2, 1, OpKind::Ok),
            op(3, 2, OpKind::Fail),
        ])
        .unwrap();

        assert_eq!(h.oks(), &[OpId(2)]);
        assert_eq!(h.fails(), &[OpId(3)]);
        assert_eq!(h.invocation_of(OpId(2)).unwrap().index, 0);
        assert_eq!(h.invocation_of(OpId(3)).unwrap().index, 1);
    }

    #[test]
    fn rejects_non_monotonic_indices() {
        let result = History::new(vec![op(5, 1, OpKind::Invoke), op(5, 1, OpKind::Ok)]);
        assert!(matches!(
            result,
            Err(HistoryError::NonMonotonicIndex { op_index: 5 })
        ));
    }

    #[test]
    fn rejects_overlapping_invokes() {
        let result = History::new(vec![op(0, 1, OpKind::Invoke), op(1, 1, OpKind::Invoke)]);
        assert!(matches!(
            result,
            Err(HistoryError::OverlappingInvoke { process: 1, .. })
        ));
    }

    #[test]
    fn tolerates_unmatched_completion() {
        let h = History::new(vec![op(0, 1, OpKind::Ok)]).unwrap();
        assert_eq!(h.oks(), &[OpId(0)]);
        assert!(h.invocation_of(OpId(0)).is_none());
    }

    #[test]
    fn workload_sanity() {
        let h: History<&str, u64> = History::new(vec![Op {
            index: 0,
            process: 0,
            kind: OpKind::Ok,
            mops: vec![Mop::append("x", 1), Mop::write("x", 2)],
            time: 0,
        }])
        .unwrap();

        assert!(h.ensure_workload(Workload::ListAppend).is_err());
        assert!(h.ensure_workload(Workload::RwRegister).is_err());

        let h: History<&str, u64> = History::new(vec![Op {
            index: 0,
            process: 0,
            kind: OpKind::Ok,
            mops: vec![Mop::append("x", 1), Mop::read_list("x", vec![1])],
            time: 0,
        }])
        .unwrap();
        assert!(h.ensure_workload(Workload::ListAppend).is_ok());
    }

    #[test]
    fn mop_debug() {
        let mop: Mop<&str, u64> = Mop::read_list("x", vec![1, 2]);
        assert_eq!(format!("{mop:?}"), "\"x\"=>[1, 2]");
        let mop: Mop<&str, u64> = Mop::write("x", 3);
        assert_eq!(format!("{mop:?}"), "\"x\"<=3");
        let mop: Mop<&str, u64> = Mop::append("x", 4);
        assert_eq!(format!("{mop:?}"), "\"x\"<+4");
        let mop: Mop<&str, u64> = Mop::read_none("x");
        assert_eq!(format!("{mop:?}"), "\"x\"=>?");
    }
}
