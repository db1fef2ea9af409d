//! Graph structures and search primitives for dependency analysis.

pub mod constraint;
pub mod cycle;
pub mod multigraph;
pub mod rel;
pub mod scc;

pub use constraint::ConstraintGraph;
pub use cycle::{
    canonical_rotation, fallback_cycle, find_cycle, find_cycle_starting_with, find_cycle_with,
    Deadline, PathPred, PathStateFilter, RwPathState, SearchTimeout,
};
pub use multigraph::{OpGraph, ProjectionCache};
pub use rel::{Rel, RelSet};
pub use scc::strongly_connected_components;
