use bridge_telemetry::{metrics, new_run_id, record_pass_skipped, record_pool_evicted};

#[test]
fn run_ids_are_unique() {
    let first = new_run_id();
    let second = new_run_id();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[test]
fn counters_only_grow() {
    let before = metrics().snapshot();
    record_pass_skipped();
    record_pool_evicted();
    let after = metrics().snapshot();
    assert!(after.passes_skipped >= before.passes_skipped + 1);
    assert!(after.pools_evicted >= before.pools_evicted + 1);
}
