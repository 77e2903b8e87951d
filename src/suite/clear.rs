use crate::api::{
    ClearFlags, DepthStencilViewDesc, DsvFlags, Format, RenderTargetViewDesc, ResourceStates, RtvDimension,
};
use crate::error::{hr_of, Hresult};
use crate::harness::compare::{check_sub_resource_float, check_sub_resource_uint, check_sub_resource_vec4, SubResource};
use crate::harness::fixture::{destroy_test_context, init_test_context, TestContext, TestContextDesc, TestEnv};
use crate::harness::report;
use crate::harness::resources::create_depth_stencil;
use crate::harness::sync::{reset_command_list, transition_resource_state};

const CLEAR_COLOR: [f32; 4] = [0.1, 0.5, 0.3, 0.75];

fn render_target_sub_resource(context: &TestContext) -> Option<SubResource<'_>> {
    let rt = context.render_target.as_deref();
    report::check(rt.is_some(), "Fixture has no render target.");
    Some(SubResource::new(&*context.device, rt?, 0, &*context.queue, &*context.list))
}

pub fn test_clear_render_target_view(env: &TestEnv) {
    let Some(context) = init_test_context(env, None) else {
        return;
    };

    context.list.clear_render_target_view(context.rtv, CLEAR_COLOR, &[]);
    if let Some(sub) = render_target_sub_resource(&context) {
        transition_resource_state(&*context.list, sub.texture, ResourceStates::RENDER_TARGET, ResourceStates::COPY_SOURCE);
        check_sub_resource_uint(sub, 0xbf4c_7f19, 2);
    }

    destroy_test_context(context);
}

/// An sRGB view over UNORM storage encodes on write.
pub fn test_clear_render_target_view_srgb(env: &TestEnv) {
    let Some(context) = init_test_context(env, None) else {
        return;
    };

    let view = RenderTargetViewDesc {
        format: Format::R8G8B8A8_UNORM_SRGB,
        dimension: RtvDimension::Texture2D { mip_slice: 0 },
    };
    context
        .device
        .create_render_target_view(context.render_target.as_deref(), Some(&view), context.rtv);
    context.list.clear_render_target_view(context.rtv, CLEAR_COLOR, &[]);
    if let Some(sub) = render_target_sub_resource(&context) {
        transition_resource_state(&*context.list, sub.texture, ResourceStates::RENDER_TARGET, ResourceStates::COPY_SOURCE);
        check_sub_resource_uint(sub, 0xbf95_bc59, 2);
    }

    destroy_test_context(context);
}

pub fn test_clear_depth_stencil_view(env: &TestEnv) {
    let desc = TestContextDesc {
        no_render_target: true,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };

    let ds = create_depth_stencil(&*context.device, 32, 32, Format::D32_FLOAT, Format::D32_FLOAT, None);
    if let Some(ds) = report::check_ok(ds, "Failed to create depth stencil") {
        context
            .list
            .clear_depth_stencil_view(ds.handle, ClearFlags::DEPTH, 0.75, 0, &[]);
        transition_resource_state(&*context.list, &*ds.texture, ResourceStates::DEPTH_WRITE, ResourceStates::COPY_SOURCE);
        let sub = SubResource::new(&*context.device, &*ds.texture, 0, &*context.queue, &*context.list);
        check_sub_resource_float(sub, 0.75, 0);

        // A read-only depth view cannot be cleared.
        let read_only = DepthStencilViewDesc {
            format: Format::D32_FLOAT,
            flags: DsvFlags::READ_ONLY_DEPTH,
            mip_slice: 0,
        };
        context.device.create_depth_stencil_view(Some(&*ds.texture), Some(&read_only), ds.handle);
        if report::check_ok(reset_command_list(&*context.list, &*context.allocator), "Failed to reset").is_some() {
            context
                .list
                .clear_depth_stencil_view(ds.handle, ClearFlags::DEPTH, 0.25, 0, &[]);
            report::check_hr(hr_of(&context.list.close()), Hresult::E_INVALIDARG, "Close");
        }
        ds.destroy();
    }

    destroy_test_context(context);
}

/// Float targets store the clear colour exactly.
pub fn test_clear_float_render_target(env: &TestEnv) {
    let desc = TestContextDesc {
        rt_format: Format::R32G32B32A32_FLOAT,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };

    let color = [0.1, -2.5, 1.0e-3, 0.75];
    context.list.clear_render_target_view(context.rtv, color, &[]);
    if let Some(sub) = render_target_sub_resource(&context) {
        transition_resource_state(&*context.list, sub.texture, ResourceStates::RENDER_TARGET, ResourceStates::COPY_SOURCE);
        check_sub_resource_vec4(sub, &color, 1);
    }

    destroy_test_context(context);
}
