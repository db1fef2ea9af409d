//! DSL for building test histories.
//!
//! `history!` produces a validated `History<&'static str, i64>`. Each
//! entry is `(process) kind [mops..]` and expands to an invoke/completion
//! pair with consecutive indices and times, so entries execute serially
//! in listing order (which also makes real-time order total):
//!
//! ```ignore
//! let h = history![
//!     (0) ok [append(x, 1), r(x, [1])],
//!     (1) fail [w(y, 2)],
//!     (2) info [append(x, 3)],
//! ];
//! ```
//!
//! Mops: `append(k, v)`, `w(k, v)`, `r(k, [e1, e2])` (list read),
//! `r(k, v)` (scalar read), `r(k)` (read that never completed).

#[macro_export]
macro_rules! mop {
    (append($key:ident, $elem:expr)) => {
        adya_core::Mop::append(stringify!($key), $elem as i64)
    };
    (w($key:ident, $value:expr)) => {
        adya_core::Mop::write(stringify!($key), $value as i64)
    };
    (r($key:ident, [$($elem:expr),* $(,)?])) => {
        adya_core::Mop::read_list(stringify!($key), vec![$($elem as i64),*])
    };
    (r($key:ident, $value:expr)) => {
        adya_core::Mop::read_scalar(stringify!($key), $value as i64)
    };
    (r($key:ident)) => {
        adya_core::Mop::read_none(stringify!($key))
    };
}

#[macro_export]
macro_rules! completion_kind {
    (ok) => {
        adya_core::OpKind::Ok
    };
    (fail) => {
        adya_core::OpKind::Fail
    };
    (info) => {
        adya_core::OpKind::Info
    };
}

#[macro_export]
macro_rules! history {
    ($( ($process:expr) $kind:ident [ $($mop_name:ident $mop_args:tt),* $(,)? ] ),* $(,)?) => {{
        let mut ops: Vec<adya_core::Op<&'static str, i64>> = Vec::new();
        $(
            {
                let mops = vec![$($crate::mop!($mop_name $mop_args)),*];
                let index = ops.len() as u64;
                ops.push(adya_core::Op {
                    index,
                    process: $process,
                    kind: adya_core::OpKind::Invoke,
                    mops: mops.clone(),
                    time: index as i64,
                });
                ops.push(adya_core::Op {
                    index: index + 1,
                    process: $process,
                    kind: $crate::completion_kind!($kind),
                    mops,
                    time: (index + 1) as i64,
                });
            }
        )*
        adya_core::History::new(ops).expect("DSL histories are well-formed")
    }};
}

/// The completion op id of the `n`-th entry in a `history!` block.
#[allow(dead_code)]
pub fn txn(n: usize) -> adya_core::OpId {
    adya_core::OpId(n * 2 + 1)
}
