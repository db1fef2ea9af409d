//! Core anomaly-detection engine for black-box transactional histories.
//!
//! Given a recorded history of transactions -- each a sequence of read,
//! write, or append micro-operations on keyed values -- this crate infers a
//! transaction dependency graph (write-write, write-read, and read-write
//! anti-dependency edges, plus per-process and real-time orders), decomposes
//! it into strongly connected components, and searches each component for
//! cycles matching a priority-ordered catalogue of Adya-style anomalies
//! (G0, G1c, G-single, G-nonadjacent, G2-item, with `-process` and
//! `-realtime` refinements). Non-cycle anomalies (aborted reads,
//! intermediate reads, lost updates) are detected by independent scans.
//!
//! The engine never proves a history safe; it disproves consistency by
//! exhibiting concrete counterexamples, or reports that it found none.

pub mod anomaly;
pub mod check;
pub mod consistency;
pub mod graph;
pub mod history;
pub mod infer;

pub use check::{check, CheckError, CheckResult, Options, Validity};
pub use consistency::Model;
pub use history::{History, Mop, Observed, Op, OpId, OpKind, Workload};
