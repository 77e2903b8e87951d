//! Reusable test substrate.
//!
//! A test body obtains a fixture, builds what it needs with the resource
//! and pipeline helpers, records and submits commands, then reads results
//! back and compares them. Every assertion lands in [`report`].

pub mod compare;
pub mod fixture;
pub mod pipeline;
pub mod readback;
pub mod report;
pub mod resources;
pub mod rs_check;
pub mod shaders;
pub mod staging;
pub mod sync;

pub use compare::{
    check_readback_float, check_readback_u16, check_readback_u64, check_readback_u8,
    check_readback_uint, check_readback_uvec4, check_readback_vec4, check_sub_resource_float,
    check_sub_resource_u16, check_sub_resource_uint, check_sub_resource_uvec4,
    check_sub_resource_vec4, compare_color, compare_float, compare_uint, compare_uvec4,
    compare_vec4, SubResource,
};
pub use fixture::{
    destroy_test_context, init_compute_test_context, init_test_context, TestContext,
    TestContextDesc, TestEnv,
};
pub use readback::{
    get_buffer_readback_with_command_list, get_texture_readback_with_command_list,
    release_readback, ResourceReadback,
};
pub use report::{check, check_hr, check_ok, check_todo, fail, skip, trace, Outcome, Record, Severity};
pub use sync::{
    exec_command_list, reset_command_list, transition_resource_state,
    transition_sub_resource_state, uav_barrier, wait_for_fence, wait_for_fence_timeout, wait_queue_idle,
    wait_timeout, with_wait_timeout,
};
