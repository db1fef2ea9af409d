use core::fmt::{self, Debug, Display, Formatter};

/// A dependency relation between two transactions.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rel {
    /// Version order: the source installed the version directly preceding
    /// the target's version of some key.
    Ww,
    /// The target read a version the source installed.
    Wr,
    /// Anti-dependency: the source read a version the target overwrote.
    Rw,
    /// Consecutive completions by the same process.
    Process,
    /// The source's completion preceded the target's invocation in
    /// wall-clock time.
    Realtime,
}

impl Rel {
    pub const ALL: [Self; 5] = [Self::Ww, Self::Wr, Self::Rw, Self::Process, Self::Realtime];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl Display for Rel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Ww => "ww",
            Self::Wr => "wr",
            Self::Rw => "rw",
            Self::Process => "process",
            Self::Realtime => "realtime",
        })
    }
}

/// A small set of [`Rel`]s, used both as edge labels and as the memo key
/// for graph projections.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelSet(u8);

impl RelSet {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn single(rel: Rel) -> Self {
        Self(rel.bit())
    }

    #[must_use]
    pub const fn with(self, rel: Rel) -> Self {
        Self(self.0 | rel.bit())
    }

    #[must_use]
    pub const fn contains(self, rel: Rel) -> bool {
        self.0 & rel.bit() != 0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, rel: Rel) {
        self.0 |= rel.bit();
    }

    /// Relations in the set, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Rel> {
        Rel::ALL.into_iter().filter(move |rel| self.contains(*rel))
    }
}

impl FromIterator<Rel> for RelSet {
    fn from_iter<I: IntoIterator<Item = Rel>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for rel in iter {
            set.insert(rel);
        }
        set
    }
}

impl Debug for RelSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, rel) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{rel}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let ww_wr = RelSet::single(Rel::Ww).with(Rel::Wr);
        assert!(ww_wr.contains(Rel::Ww));
        assert!(ww_wr.contains(Rel::Wr));
        assert!(!ww_wr.contains(Rel::Rw));

        let rw = RelSet::single(Rel::Rw);
        assert!(!ww_wr.intersects(rw));
        assert!(ww_wr.intersects(ww_wr.with(Rel::Rw)));
        assert_eq!(ww_wr.intersection(RelSet::single(Rel::Wr)), RelSet::single(Rel::Wr));
        assert!(RelSet::EMPTY.is_empty());
    }

    #[test]
    fn iteration_order_is_stable() {
        let set: RelSet = [Rel::Realtime, Rel::Ww, Rel::Rw].into_iter().collect();
        let rels: Vec<Rel> = set.iter().collect();
        assert_eq!(rels, vec![Rel::Ww, Rel::Rw, Rel::Realtime]);
        assert_eq!(format!("{set:?}"), "{ww,rw,realtime}");
    }
}
