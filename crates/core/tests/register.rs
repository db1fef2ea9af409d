//! End-to-end checks of read-write register histories.

mod common;

use std::time::Duration;

use adya_core::anomaly::{Anomaly, AnomalyType, Step};
use adya_core::{check, Model, Options, Validity, Workload};
use common::txn;

fn opts(models: &[Model]) -> Options {
    Options::builder()
        .consistency_models(models.to_vec())
        .cycle_search_timeout(Duration::from_secs(5))
        .build()
}

#[test]
fn serial_register_history_is_valid() {
    let h = history![
        (0) ok [w(x, 0), w(y, 0)],
        (1) ok [r(x, 0), w(x, 1)],
        (2) ok [r(x, 1), r(y, 0)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::Serializable])).unwrap();
    assert_eq!(result.valid, Validity::Valid);
}

#[test]
fn read_skew_is_g_single() {
    // T1 overwrites x and y; T2 sees the new x but the old y
    let h = history![
        (0) ok [w(x, 0), w(y, 0)],
        (1) ok [r(x, 0), w(x, 1), r(y, 0), w(y, 1)],
        (2) ok [r(x, 1), r(y, 0)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::SnapshotIsolation])).unwrap();

    assert_eq!(result.valid, Validity::Invalid);
    assert_eq!(result.anomaly_types, vec![AnomalyType::GSingle]);
    assert!(result
        .impossible_models
        .contains(&Model::MonotonicAtomicView));
    assert!(result
        .impossible_models
        .contains(&Model::SnapshotIsolation));
    assert!(result.impossible_models.contains(&Model::Serializable));

    let Anomaly::Cycle(explanation) = &result.anomalies[&AnomalyType::GSingle][0] else {
        panic!("expected a cycle explanation");
    };
    assert_eq!(explanation.cycle, vec![txn(1), txn(2)]);
    // exactly one anti-dependency step
    let rw_steps = explanation
        .steps
        .iter()
        .filter(|step| matches!(step, Step::Rw { .. }))
        .count();
    assert_eq!(rw_steps, 1);
}

#[test]
fn lost_update_is_detected_with_its_cycle() {
    let h = history![
        (0) ok [w(x, 0)],
        (1) ok [r(x, 0), w(x, 1)],
        (2) ok [r(x, 0), w(x, 2)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::SnapshotIsolation])).unwrap();

    assert_eq!(result.valid, Validity::Invalid);
    assert!(result.anomaly_types.contains(&AnomalyType::LostUpdate));
    let Anomaly::LostUpdate { key, value, txns } =
        &result.anomalies[&AnomalyType::LostUpdate][0]
    else {
        panic!("expected a lost update");
    };
    assert_eq!((*key, *value), ("x", 0));
    assert_eq!(txns, &vec![txn(1), txn(2)]);
}

#[test]
fn lost_update_cycle_is_write_skew_under_weak_models() {
    // the same history checked against read-committed: the G2-item cycle
    // and the lost update are both legal there
    let h = history![
        (0) ok [w(x, 0)],
        (1) ok [r(x, 0), w(x, 1)],
        (2) ok [r(x, 0), w(x, 2)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::ReadCommitted])).unwrap();
    assert_eq!(result.valid, Validity::Valid);
}

#[test]
fn aborted_read_cites_the_failed_writer() {
    let h = history![
        (0) fail [w(x, 7)],
        (1) ok [r(x, 7)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::ReadCommitted])).unwrap();

    assert_eq!(result.valid, Validity::Invalid);
    assert!(result.anomaly_types.contains(&AnomalyType::AbortedRead));
    let Anomaly::AbortedRead { writer, reader, .. } =
        &result.anomalies[&AnomalyType::AbortedRead][0]
    else {
        panic!("expected an aborted read");
    };
    assert_eq!((*writer, *reader), (txn(0), txn(1)));
}

#[test]
fn intermediate_read_register() {
    let h = history![
        (0) ok [w(x, 1), w(x, 2)],
        (1) ok [r(x, 1)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::ReadCommitted])).unwrap();

    assert_eq!(result.valid, Validity::Invalid);
    assert!(result
        .anomaly_types
        .contains(&AnomalyType::IntermediateRead));
}

#[test]
fn ambiguous_version_order_is_reported_and_unknown() {
    let h = history![
        (0) ok [w(x, 7)],
        (1) ok [w(x, 7)],
        (2) ok [r(x, 7)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::Serializable])).unwrap();

    assert_eq!(result.valid, Validity::Unknown);
    assert!(result
        .anomaly_types
        .contains(&AnomalyType::AmbiguousVersionOrder));
}

#[test]
fn non_repeatable_read_is_internal_inconsistency() {
    let h = history![
        (0) ok [w(x, 1)],
        (1) ok [w(x, 2)],
        (2) ok [r(x, 1), r(x, 2)],
    ];
    let result = check(&h, Workload::RwRegister, &opts(&[Model::ReadCommitted])).unwrap();

    assert_eq!(result.valid, Validity::Invalid);
    assert!(result
        .anomaly_types
        .contains(&AnomalyType::InternalInconsistency));
}

#[test]
fn list_mops_are_rejected_by_type_sanity() {
    let h = history![
        (0) ok [append(x, 1)],
    ];
    let err = check(&h, Workload::RwRegister, &Options::default()).unwrap_err();
    assert!(matches!(err, adya_core::CheckError::History(_)));
}
