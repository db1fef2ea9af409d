//! Serially-executed random histories.
//!
//! Generated transactions run one after another against an in-memory
//! state, so every produced history is consistent under every model the
//! checker knows; they are fixtures for benchmarks and smoke tests, not
//! adversarial inputs.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use rand::distr::{Distribution, Uniform};
use rand::Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use adya_core::{History, Mop, Op, OpKind, Workload};

/// Dimensions of a generated history.
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct GenParams {
    pub id: u64,
    /// Client processes issuing transactions round-robin.
    pub n_process: u64,
    pub n_key: u64,
    /// Total transactions across all processes.
    pub n_txn: u64,
    /// Micro-operations per transaction.
    pub n_mop: u64,
}

/// A generated history with its provenance.
#[derive(Debug, Deserialize, Serialize)]
pub struct GeneratedHistory {
    params: GenParams,
    workload: Workload,
    start: DateTime<Local>,
    end: DateTime<Local>,
    data: Vec<Op<String, i64>>,
}

impl GeneratedHistory {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn workload(&self) -> Workload {
        self.workload
    }

    #[must_use]
    pub fn ops(&self) -> &[Op<String, i64>] {
        &self.data
    }

    /// Validates the raw op records into a checkable history.
    ///
    /// # Errors
    ///
    /// Propagates [`History::new`] validation failures; generated data
    /// never triggers them.
    pub fn history(
        &self,
    ) -> Result<History<String, i64>, adya_core::history::HistoryError<String, i64>> {
        History::new(self.data.clone())
    }
}

fn key_name(k: u64) -> String {
    format!("k{k}")
}

/// Generates one serially-executed list-append history.
///
/// Appended elements are globally unique (a running counter), and every
/// read observes the current list state.
///
/// # Panics
///
/// Panics if `n_key` is zero.
#[must_use]
pub fn generate_list_append_history(params: &GenParams) -> GeneratedHistory {
    let start = Local::now();
    let key_range = Uniform::new(0, params.n_key).expect("n_key must be positive");
    let mut lists: HashMap<u64, Vec<i64>> = HashMap::new();
    let mut next_element: i64 = 1;

    let data = generate_ops(params, |mops, rng| {
        for _ in 0..params.n_mop {
            let k = key_range.sample(rng);
            if rng.random_bool(0.5) {
                let list = lists.entry(k).or_default();
                list.push(next_element);
                mops.push(Mop::append(key_name(k), next_element));
                next_element += 1;
            } else {
                let list = lists.get(&k).cloned().unwrap_or_default();
                mops.push(Mop::read_list(key_name(k), list));
            }
        }
    });

    GeneratedHistory {
        params: params.clone(),
        workload: Workload::ListAppend,
        start,
        end: Local::now(),
        data,
    }
}

/// Generates one serially-executed read-write register history.
///
/// Written values are unique per key (a running counter), so version
/// resolution is never ambiguous; reads observe the latest write.
///
/// # Panics
///
/// Panics if `n_key` is zero.
#[must_use]
pub fn generate_register_history(params: &GenParams) -> GeneratedHistory {
    let start = Local::now();
    let key_range = Uniform::new(0, params.n_key).expect("n_key must be positive");
    let mut registers: HashMap<u64, i64> = HashMap::new();
    let mut next_value: i64 = 1;

    let data = generate_ops(params, |mops, rng| {
        for _ in 0..params.n_mop {
            let k = key_range.sample(rng);
            match registers.get(&k) {
                Some(&current) if rng.random_bool(0.5) => {
                    mops.push(Mop::read_scalar(key_name(k), current));
                }
                _ => {
                    registers.insert(k, next_value);
                    mops.push(Mop::write(key_name(k), next_value));
                    next_value += 1;
                }
            }
        }
    });

    GeneratedHistory {
        params: params.clone(),
        workload: Workload::RwRegister,
        start,
        end: Local::now(),
        data,
    }
}

/// Wraps transaction bodies in invoke/ok pairs with strictly increasing
/// indices and times, processes assigned round-robin.
fn generate_ops<F>(params: &GenParams, mut body: F) -> Vec<Op<String, i64>>
where
    F: FnMut(&mut Vec<Mop<String, i64>>, &mut rand::rngs::ThreadRng),
{
    let mut rng = rand::rng();
    let mut ops = Vec::with_capacity(params.n_txn as usize * 2);
    for t in 0..params.n_txn {
        let mut mops = Vec::with_capacity(params.n_mop as usize);
        body(&mut mops, &mut rng);
        let index = ops.len() as u64;
        let process = if params.n_process == 0 {
            0
        } else {
            t % params.n_process
        };
        ops.push(Op {
            index,
            process,
            kind: OpKind::Invoke,
            mops: mops.clone(),
            time: i64::try_from(index).unwrap_or(i64::MAX),
        });
        ops.push(Op {
            index: index + 1,
            process,
            kind: OpKind::Ok,
            mops,
            time: i64::try_from(index + 1).unwrap_or(i64::MAX),
        });
    }
    ops
}

/// Generates `n_hist` histories in parallel, ids `0..n_hist`.
#[must_use]
pub fn generate_mult_histories(
    workload: Workload,
    n_hist: u64,
    n_process: u64,
    n_key: u64,
    n_txn: u64,
    n_mop: u64,
) -> Vec<GeneratedHistory> {
    (0..n_hist)
        .into_par_iter()
        .map(|id| {
            let params = GenParams::builder()
                .id(id)
                .n_process(n_process)
                .n_key(n_key)
                .n_txn(n_txn)
                .n_mop(n_mop)
                .build();
            match workload {
                Workload::ListAppend => generate_list_append_history(&params),
                Workload::RwRegister => generate_register_history(&params),
            }
        })
        .collect()
}
