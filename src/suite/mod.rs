//! Registered conformance tests.
//!
//! Each test is a plain function over a [`TestEnv`]; the runner gives every
//! test its own diagnostics collector.

mod clear;
mod command_list;
mod draw;
mod fence;
mod resource;
mod root_signature;

use crate::harness::fixture::TestEnv;
use crate::harness::report::{self, Outcome};
use crate::harness::sync;

pub struct TestCase {
    pub name: &'static str,
    pub run: fn(&TestEnv),
}

macro_rules! tests {
    ($($module:ident::$name:ident),+ $(,)?) => {
        &[$(TestCase {
            name: stringify!($name),
            run: $module::$name,
        }),+]
    };
}

static TESTS: &[TestCase] = tests![
    clear::test_clear_render_target_view,
    clear::test_clear_render_target_view_srgb,
    clear::test_clear_depth_stencil_view,
    clear::test_clear_float_render_target,
    draw::test_draw_passthrough,
    draw::test_scissor,
    draw::test_draw_requires_root_signature,
    draw::test_draw_pipeline_mismatch,
    fence::test_fence_event_order,
    fence::test_queue_signal_bound_event,
    fence::test_fence_waits,
    fence::test_multithread_fence_wait,
    resource::test_fixture_teardown,
    resource::test_heap_mappability,
    resource::test_copyable_footprints,
    resource::test_texture_upload_readback,
    resource::test_buffer_upload_readback,
    resource::test_invalid_heap_transitions,
    command_list::test_allocator_in_use,
    command_list::test_reset_allocator_while_open,
    command_list::test_reset_list_in_flight,
    command_list::test_bundles,
    command_list::test_zero_group_dispatch,
    root_signature::test_root_signature_uav_round_trip,
    root_signature::test_root_signature_battery,
    root_signature::test_root_signature_cost,
];

/// Every registered test, in run order.
pub fn registry() -> &'static [TestCase] {
    TESTS
}

pub fn find(name: &str) -> Option<&'static TestCase> {
    TESTS.iter().find(|case| case.name == name)
}

pub fn run_case(env: &TestEnv, case: &TestCase) -> Outcome {
    let run = case.run;
    report::run_test(|| sync::with_wait_timeout(env.wait_timeout_ms, || run(env)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_env_timeout_reaches_the_body() {
        fn body(_: &TestEnv) {
            report::check(sync::wait_timeout() == 1234, format!("Got timeout {}.", sync::wait_timeout()));
        }
        let case = TestCase { name: "body", run: body };
        let env = TestEnv::new(crate::reference::create_runtime(), Default::default()).with_wait_timeout(1234);
        let outcome = run_case(&env, &case);
        assert_eq!((outcome.checks, outcome.failures), (1, 0));
        assert_eq!(sync::wait_timeout(), crate::platform::INFINITE);
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = registry().iter().map(|c| c.name).collect();
        assert_eq!(names.len(), registry().len());
        assert!(find("test_scissor").is_some());
        assert!(find("test_nothing").is_none());
    }
}
