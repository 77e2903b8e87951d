use crate::api::{CommandListType, CommandQueueDesc, RootSignatureFlags};
use crate::error::{hr_of, Hresult};
use crate::harness::fixture::{
    destroy_test_context, init_compute_test_context, init_test_context, TestContextDesc, TestEnv,
};
use crate::harness::pipeline::{create_compute_pipeline_state, create_empty_root_signature};
use crate::harness::report;
use crate::harness::shaders::empty_cs;
use crate::harness::sync::{exec_command_list, wait_queue_idle};

fn bare_context_desc() -> TestContextDesc {
    TestContextDesc {
        no_render_target: true,
        no_root_signature: true,
        no_pipeline: true,
        ..Default::default()
    }
}

/// An allocator serves one recording list at a time.
pub fn test_allocator_in_use(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };
    let device = &*context.device;

    let second = device.create_command_list(0, CommandListType::Direct, &*context.allocator, None);
    report::check_hr(hr_of(&second), Hresult::E_INVALIDARG, "CreateCommandList");

    report::check_hr(hr_of(&context.list.close()), Hresult::S_OK, "Close");
    let second = device.create_command_list(0, CommandListType::Direct, &*context.allocator, None);
    report::check_hr(hr_of(&second), Hresult::S_OK, "CreateCommandList");

    // The new list now owns the allocator, so the fixture list cannot reopen on it.
    if let Ok(second) = second {
        let reopened = context.list.reset(&*context.allocator, None);
        report::check_hr(hr_of(&reopened), Hresult::E_INVALIDARG, "Reset");
        report::check_hr(hr_of(&second.close()), Hresult::S_OK, "Close");
        report::check_hr(hr_of(&context.list.reset(&*context.allocator, None)), Hresult::S_OK, "Reset");
    }

    // Lists and allocators must agree on their type.
    if let Some(compute) = report::check_ok(
        device.create_command_allocator(CommandListType::Compute),
        "Failed to create allocator",
    ) {
        let mismatched = device.create_command_list(0, CommandListType::Direct, &*compute, None);
        report::check_hr(hr_of(&mismatched), Hresult::E_INVALIDARG, "CreateCommandList");
    }

    destroy_test_context(context);
}

pub fn test_reset_allocator_while_open(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };

    report::check_hr(hr_of(&context.allocator.reset()), Hresult::E_FAIL, "CommandAllocator::Reset");
    report::check_hr(
        hr_of(&context.list.reset(&*context.allocator, None)),
        Hresult::E_FAIL,
        "CommandList::Reset",
    );
    report::check_hr(hr_of(&context.list.close()), Hresult::S_OK, "Close");
    report::check_hr(hr_of(&context.allocator.reset()), Hresult::S_OK, "CommandAllocator::Reset");
    // Resetting twice in a row is harmless.
    report::check_hr(hr_of(&context.allocator.reset()), Hresult::S_OK, "CommandAllocator::Reset");

    destroy_test_context(context);
}

/// A submitted list may be reopened on another allocator straight away.
pub fn test_reset_list_in_flight(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };
    let device = &*context.device;
    let queue = &*context.queue;
    let list = &*context.list;

    if let Some(allocator) = report::check_ok(
        device.create_command_allocator(CommandListType::Direct),
        "Failed to create allocator",
    ) {
        for _ in 0..4 {
            report::check_ok(exec_command_list(queue, list), "Failed to execute command list");
            report::check_hr(hr_of(&list.reset(&*allocator, None)), Hresult::S_OK, "Reset");
            report::check_ok(exec_command_list(queue, list), "Failed to execute command list");
            report::check_hr(hr_of(&list.reset(&*context.allocator, None)), Hresult::S_OK, "Reset");
        }
        report::check_ok(wait_queue_idle(device, queue), "Failed to drain queue");
    }

    destroy_test_context(context);
}

pub fn test_bundles(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };
    let device = &*context.device;

    let allocator = device.create_command_allocator(CommandListType::Bundle);
    report::check_hr(hr_of(&allocator), Hresult::E_NOTIMPL, "CreateCommandAllocator");
    let list = device.create_command_list(0, CommandListType::Bundle, &*context.allocator, None);
    report::check_hr(hr_of(&list), Hresult::E_NOTIMPL, "CreateCommandList");
    let queue = device.create_command_queue(&CommandQueueDesc::new(CommandListType::Bundle));
    report::check_hr(hr_of(&queue), Hresult::E_INVALIDARG, "CreateCommandQueue");

    destroy_test_context(context);
}

/// An empty grid needs no bindings; a real one does.
pub fn test_zero_group_dispatch(env: &TestEnv) {
    let Some(context) = init_compute_test_context(env) else {
        return;
    };
    let list = &*context.list;

    list.dispatch(0, 1, 1);
    list.dispatch(4, 0, 0);
    report::check_hr(hr_of(&list.close()), Hresult::S_OK, "Close");

    report::check_hr(hr_of(&context.allocator.reset()), Hresult::S_OK, "CommandAllocator::Reset");
    report::check_hr(hr_of(&list.reset(&*context.allocator, None)), Hresult::S_OK, "Reset");
    list.dispatch(1, 1, 1);
    report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");

    let device = &*context.device;
    let root_signature = create_empty_root_signature(&*context.runtime, device, RootSignatureFlags::NONE);
    if let Some(root_signature) = report::check_ok(root_signature, "Failed to create root signature") {
        let pso = create_compute_pipeline_state(device, &*root_signature, empty_cs());
        if let Some(pso) = report::check_ok(pso, "Failed to create pipeline state") {
            report::check_hr(hr_of(&list.reset(&*context.allocator, Some(&*pso))), Hresult::S_OK, "Reset");
            list.set_compute_root_signature(Some(&*root_signature));
            list.dispatch(1, 1, 1);
            report::check_ok(exec_command_list(&*context.queue, list), "Failed to execute command list");
            report::check_ok(wait_queue_idle(device, &*context.queue), "Failed to drain queue");
        }
    }

    destroy_test_context(context);
}
