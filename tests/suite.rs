//! Every registered test passes against the reference adapter.

use std::sync::Arc;

use d3d12_conformance::api::DeviceOptions;
use d3d12_conformance::harness::fixture::TestEnv;
use d3d12_conformance::reference::{self, ReferenceRuntime};
use d3d12_conformance::suite;
use d3d12_conformance::Hresult;

fn env() -> TestEnv {
    TestEnv::new(reference::create_runtime(), DeviceOptions::default()).with_wait_timeout(10_000)
}

#[test]
fn test_registry_passes_on_reference() {
    let env = env();
    let mut failed = Vec::new();
    for case in suite::registry() {
        let outcome = suite::run_case(&env, case);
        if outcome.failed(true) || outcome.skipped() {
            for record in &outcome.records {
                eprintln!("{}", record);
            }
            failed.push(case.name);
        }
        assert!(outcome.checks > 0, "{} made no checks", case.name);
    }
    assert!(failed.is_empty(), "failing tests: {:?}", failed);
}

#[test]
fn test_validation_layer_options() {
    let env = TestEnv::new(
        reference::create_runtime(),
        DeviceOptions {
            validate: true,
            warp: true,
        },
    );
    let case = suite::find("test_clear_render_target_view").unwrap();
    let outcome = suite::run_case(&env, case);
    assert!(!outcome.failed(true), "{:?}", outcome.records);
}

#[test]
fn test_missing_adapter_skips_everything() {
    let env = TestEnv::new(
        Arc::new(ReferenceRuntime::unavailable(Hresult::DXGI_ERROR_UNSUPPORTED)),
        DeviceOptions::default(),
    );
    for name in ["test_draw_passthrough", "test_fence_event_order", "test_zero_group_dispatch"] {
        let outcome = suite::run_case(&env, suite::find(name).unwrap());
        assert!(outcome.skipped(), "{} was not skipped: {:?}", name, outcome.records);
        assert!(!outcome.failed(true));
    }
}
