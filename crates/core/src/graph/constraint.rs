use std::collections::{BTreeMap, BTreeSet};

/// Ordering constraints over the versions of a single key.
///
/// Vertices are versions; an edge `a -> b` asserts that version `a` was
/// installed before version `b`. Built from read observations and
/// per-transaction mop order, then checked for contradictions before any
/// dependency edge is derived from it.
///
/// Backed by ordered maps so successor iteration and cycle reporting are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintGraph<T>
where
    T: Ord + Clone,
{
    adj: BTreeMap<T, BTreeSet<T>>,
}

impl<T> Default for ConstraintGraph<T>
where
    T: Ord + Clone,
{
    fn default() -> Self {
        Self {
            adj: BTreeMap::new(),
        }
    }
}

impl<T> ConstraintGraph<T>
where
    T: Ord + Clone,
{
    pub fn add_vertex(&mut self, v: T) {
        self.adj.entry(v).or_default();
    }

    /// Inserts `a -> b`. Both vertices are added if absent.
    pub fn add_edge(&mut self, a: T, b: T) {
        self.adj.entry(b.clone()).or_default();
        self.adj.entry(a).or_default().insert(b);
    }

    #[must_use]
    pub fn has_edge(&self, a: &T, b: &T) -> bool {
        self.adj.get(a).is_some_and(|next| next.contains(b))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    /// Direct successors of `v`, in ascending order.
    pub fn successors<'a>(&'a self, v: &T) -> impl Iterator<Item = &'a T> + 'a {
        self.adj.get(v).into_iter().flatten()
    }

    /// All constraint edges, lexicographically ordered.
    pub fn edges(&self) -> impl Iterator<Item = (&T, &T)> + '_ {
        self.adj
            .iter()
            .flat_map(|(a, next)| next.iter().map(move |b| (a, b)))
    }

    /// A topological ordering of the vertices, or `None` on contradiction.
    ///
    /// Kahn's algorithm with an ordered ready set, so the result is
    /// deterministic. O(V + E) up to the map accesses.
    #[must_use]
    pub fn topological_sort(&self) -> Option<Vec<T>> {
        let mut in_degree: BTreeMap<&T, usize> =
            self.adj.keys().map(|v| (v, 0)).collect();
        for next in self.adj.values() {
            for b in next {
                *in_degree.get_mut(b).expect("edge targets are vertices") += 1;
            }
        }

        let mut ready: BTreeSet<&T> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(v, _)| *v)
            .collect();

        let mut order = Vec::with_capacity(self.adj.len());
        while let Some(&v) = ready.iter().next() {
            ready.remove(v);
            order.push(v.clone());
            for b in self.successors(v) {
                let deg = in_degree.get_mut(b).expect("edge targets are vertices");
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(b);
                }
            }
        }

        (order.len() == self.adj.len()).then_some(order)
    }

    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        self.topological_sort().is_none()
    }

    /// An edge closing some contradiction cycle, or `None` if the
    /// constraints are consistent.
    ///
    /// Iterative DFS; the first back edge found (under deterministic
    /// vertex order) is returned.
    #[must_use]
    pub fn cycle_edge(&self) -> Option<(T, T)> {
        #[derive(PartialEq, Eq, Clone, Copy)]
        enum Color {
            Gray,
            Black,
        }

        let mut color: BTreeMap<&T, Color> = BTreeMap::new();
        for root in self.adj.keys() {
            if color.contains_key(root) {
                continue;
            }
            color.insert(root, Color::Gray);
            let mut stack: Vec<(&T, Vec<&T>, usize)> =
                vec![(root, self.successors(root).collect(), 0)];

            while !stack.is_empty() {
                let (v, step) = {
                    let frame = stack.last_mut().expect("stack is non-empty");
                    let v = frame.0;
                    if frame.2 < frame.1.len() {
                        let u = frame.1[frame.2];
                        frame.2 += 1;
                        (v, Some(u))
                    } else {
                        (v, None)
                    }
                };
                match step {
                    Some(u) => match color.get(u) {
                        Some(Color::Gray) => return Some((v.clone(), u.clone())),
                        Some(Color::Black) => {}
                        None => {
                            color.insert(u, Color::Gray);
                            stack.push((u, self.successors(u).collect(), 0));
                        }
                    },
                    None => {
                        stack.pop();
                        color.insert(v, Color::Black);
                    }
                }
            }
        }
        None
    }
}
