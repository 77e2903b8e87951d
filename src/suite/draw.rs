use crate::api::{Format, PrimitiveTopology, Rect, ResourceStates, RootSignatureFlags};
use crate::error::{hr_of, Hresult};
use crate::harness::compare::{check_readback_uint, check_sub_resource_uint, SubResource};
use crate::harness::fixture::{destroy_test_context, init_test_context, TestContextDesc, TestEnv};
use crate::harness::pipeline::{create_empty_root_signature, create_pipeline_state};
use crate::harness::readback::{get_texture_readback_with_command_list, release_readback};
use crate::harness::report;
use crate::harness::sync::{reset_command_list, transition_resource_state};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

pub fn test_draw_passthrough(env: &TestEnv) {
    let Some(context) = init_test_context(env, None) else {
        return;
    };
    let list = &*context.list;

    list.clear_render_target_view(context.rtv, WHITE, &[]);
    context.bind_defaults();
    list.draw_instanced(3, 1, 0, 0);

    if let Some(rt) = context.render_target.as_deref() {
        transition_resource_state(list, rt, ResourceStates::RENDER_TARGET, ResourceStates::COPY_SOURCE);
        let sub = SubResource::new(&*context.device, rt, 0, &*context.queue, list);
        check_sub_resource_uint(sub, 0xff00_ff00, 0);
    }

    destroy_test_context(context);
}

pub fn test_scissor(env: &TestEnv) {
    let desc = TestContextDesc {
        rt_width: 640,
        rt_height: 480,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };
    let list = &*context.list;

    list.clear_render_target_view(context.rtv, RED, &[]);
    context.bind_defaults();
    list.rs_set_scissor_rects(&[Rect::new(160, 120, 480, 360)]);
    list.draw_instanced(3, 1, 0, 0);

    if let Some(rt) = context.render_target.as_deref() {
        transition_resource_state(list, rt, ResourceStates::RENDER_TARGET, ResourceStates::COPY_SOURCE);
        let rb = get_texture_readback_with_command_list(&*context.device, rt, 0, &*context.queue, list);
        if let Some(rb) = report::check_ok(rb, "Failed to read back render target") {
            check_readback_uint(&rb, Some(&Rect::new(80, 240, 81, 241)), 0xff00_00ff, 0);
            check_readback_uint(&rb, Some(&Rect::new(320, 240, 321, 241)), 0xff00_ff00, 0);
            check_readback_uint(&rb, Some(&Rect::new(560, 240, 561, 241)), 0xff00_00ff, 0);
            check_readback_uint(&rb, Some(&Rect::new(160, 120, 480, 360)), 0xff00_ff00, 0);
            release_readback(rb);
        }
    }

    destroy_test_context(context);
}

/// Drawing without a graphics root signature makes the list invalid.
pub fn test_draw_requires_root_signature(env: &TestEnv) {
    let Some(context) = init_test_context(env, None) else {
        return;
    };
    let list = &*context.list;

    list.om_set_render_targets(&[context.rtv], None);
    if let Some(pso) = &context.pipeline_state {
        list.set_pipeline_state(&**pso);
    }
    list.rs_set_viewports(&[context.viewport]);
    list.rs_set_scissor_rects(&[context.scissor_rect]);
    list.draw_instanced(3, 1, 0, 0);
    report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");

    destroy_test_context(context);
}

/// A draw is only valid when the pipeline agrees with the bound root
/// signature, topology and render target formats.
pub fn test_draw_pipeline_mismatch(env: &TestEnv) {
    let Some(context) = init_test_context(env, None) else {
        return;
    };
    let runtime = &*context.runtime;
    let device = &*context.device;
    let list = &*context.list;
    let reset = || {
        report::check_ok(reset_command_list(list, &*context.allocator), "Failed to reset command list");
    };

    // Same layout, different object.
    let twin = create_empty_root_signature(runtime, device, RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT);
    if let Some(twin) = report::check_ok(twin, "Failed to create root signature") {
        context.bind_defaults();
        list.set_graphics_root_signature(Some(&*twin));
        list.draw_instanced(3, 1, 0, 0);
        report::check_hr(hr_of(&list.close()), Hresult::S_OK, "Close");
        reset();
    }

    let other = create_empty_root_signature(runtime, device, RootSignatureFlags::NONE);
    if let Some(other) = report::check_ok(other, "Failed to create root signature") {
        context.bind_defaults();
        list.set_graphics_root_signature(Some(&*other));
        list.draw_instanced(3, 1, 0, 0);
        report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");
        reset();
    }

    context.bind_defaults();
    list.ia_set_primitive_topology(PrimitiveTopology::LineList);
    list.draw_instanced(3, 1, 0, 0);
    report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");
    reset();

    if let Some(rs) = &context.root_signature {
        let pso = create_pipeline_state(device, &**rs, Format::R32_FLOAT, None, None, &[]);
        if let Some(pso) = report::check_ok(pso, "Failed to create pipeline state") {
            context.bind_defaults();
            list.set_pipeline_state(&*pso);
            list.draw_instanced(3, 1, 0, 0);
            report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");
            reset();
        }
    }

    // Recording resumes normally after the failed lists.
    context.bind_defaults();
    list.draw_instanced(3, 1, 0, 0);
    report::check_hr(hr_of(&list.close()), Hresult::S_OK, "Close");
    reset();

    destroy_test_context(context);
}
