use crate::api::{
    CommandListType, Format, HeapFlags, HeapProperties, HeapType, Rect, Resource, ResourceDesc, ResourceDimension,
    ResourceFlags, ResourceStates,
};
use crate::error::{hr_of, Hresult};
use crate::harness::compare::{check_readback_uint, check_sub_resource_float, check_sub_resource_uint, SubResource};
use crate::harness::fixture::{
    destroy_test_context, init_compute_test_context, init_test_context, TestContext, TestContextDesc, TestEnv,
};
use crate::harness::readback::{get_buffer_readback_with_command_list, release_readback};
use crate::harness::report;
use crate::harness::resources::{
    create_default_buffer, create_default_texture2d, create_readback_buffer, create_upload_buffer,
};
use crate::harness::staging::{compute_copyable_footprints, upload_buffer_data, upload_texture_data, SubresourceData};
use crate::harness::sync::{reset_command_list, transition_resource_state, transition_sub_resource_state};

/// Every fixture shape tears down to a zero device count.
pub fn test_fixture_teardown(env: &TestEnv) {
    let shapes = [
        TestContextDesc::default(),
        TestContextDesc {
            rt_width: 640,
            rt_height: 480,
            rt_format: Format::B8G8R8A8_UNORM,
            rt_descriptor_count: 4,
            ..Default::default()
        },
        TestContextDesc {
            no_pipeline: true,
            ..Default::default()
        },
        TestContextDesc {
            no_render_target: true,
            no_root_signature: true,
            no_pipeline: true,
            ..Default::default()
        },
    ];
    for desc in &shapes {
        let Some(context) = init_test_context(env, Some(desc)) else {
            return;
        };
        destroy_test_context(context);
    }
    if let Some(context) = init_compute_test_context(env) {
        report::check(
            context.queue.desc().list_type == CommandListType::Compute,
            "Compute fixture has a non-compute queue.",
        );
        destroy_test_context(context);
    }
}

#[track_caller]
fn check_mappable(resource: &dyn Resource, expected: Hresult) {
    let result = resource.map(0, None);
    let mapped = result.is_ok();
    report::check_hr(hr_of(&result), expected, "Map");
    if mapped {
        resource.unmap(0, None);
    }
}

pub fn test_heap_mappability(env: &TestEnv) {
    let desc = TestContextDesc {
        no_render_target: true,
        no_root_signature: true,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };
    let device = &*context.device;

    if let Some(upload) = report::check_ok(create_upload_buffer(device, 256, None), "Upload buffer") {
        check_mappable(&*upload, Hresult::S_OK);
    }
    if let Some(readback) = report::check_ok(create_readback_buffer(device, 256), "Readback buffer") {
        check_mappable(&*readback, Hresult::S_OK);
    }
    if let Some(default) = report::check_ok(
        create_default_buffer(device, 256, ResourceFlags::NONE, ResourceStates::COMMON),
        "Default buffer",
    ) {
        check_mappable(&*default, Hresult::E_INVALIDARG);
    }

    let texture = ResourceDesc::texture2d(4, 4, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
    for (heap, state) in [
        (HeapType::Upload, ResourceStates::GENERIC_READ),
        (HeapType::Readback, ResourceStates::COPY_DEST),
    ] {
        let result = device.create_committed_resource(&HeapProperties::new(heap), HeapFlags::NONE, &texture, state, None);
        report::check_hr(hr_of(&result), Hresult::E_INVALIDARG, &format!("Texture on {:?} heap", heap));
    }

    destroy_test_context(context);
}

fn footprint_cases() -> Vec<ResourceDesc> {
    let mut cases = Vec::new();
    let mut mips = ResourceDesc::texture2d(100, 60, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
    mips.mip_levels = 7;
    cases.push(mips);
    let mut array = ResourceDesc::texture2d(33, 17, Format::R32_FLOAT, ResourceFlags::NONE);
    array.depth_or_array_size = 3;
    array.mip_levels = 2;
    cases.push(array);
    let mut bc = ResourceDesc::texture2d(128, 64, Format::BC1_UNORM, ResourceFlags::NONE);
    bc.mip_levels = 8;
    cases.push(bc);
    cases.push(ResourceDesc::texture2d(3, 3, Format::BC7_UNORM, ResourceFlags::NONE));
    let mut volume = ResourceDesc::texture2d(16, 8, Format::R16_FLOAT, ResourceFlags::NONE);
    volume.dimension = ResourceDimension::Texture3D;
    volume.depth_or_array_size = 4;
    volume.mip_levels = 3;
    cases.push(volume);
    cases
}

/// The device's layout query agrees with the placement rules.
pub fn test_copyable_footprints(env: &TestEnv) {
    let desc = TestContextDesc {
        no_render_target: true,
        no_root_signature: true,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };

    for resource_desc in footprint_cases() {
        let count = resource_desc.subresource_count();
        for base_offset in [0, 512, 65536] {
            for first in 0..count {
                let remaining = count - first;
                let got = context
                    .device
                    .get_copyable_footprints(&resource_desc, first, remaining, base_offset);
                let expected = compute_copyable_footprints(&resource_desc, first, remaining, base_offset);
                report::check(
                    got == expected,
                    format!(
                        "{:?} sub-resources {}..{}, base {}: got {:?}, expected {:?}.",
                        resource_desc.format, first, count, base_offset, got, expected
                    ),
                );
            }
        }

        // Out-of-range counts and unaligned bases fill every output with ones.
        for (num, base_offset) in [(count + 1, 0), (count, 1), (count, 1000)] {
            let invalid = context
                .device
                .get_copyable_footprints(&resource_desc, 0, num, base_offset);
            report::check(
                invalid.total_bytes == u64::MAX && invalid.row_counts.iter().all(|&rows| rows == u32::MAX),
                format!("Got total {:#x} for base {}.", invalid.total_bytes, base_offset),
            );
        }
    }

    destroy_test_context(context);
}

fn reset(context: &TestContext) {
    report::check_ok(reset_command_list(&*context.list, &*context.allocator), "Failed to reset command list");
}

/// Uploaded texels come back unchanged, per mip level.
pub fn test_texture_upload_readback(env: &TestEnv) {
    let desc = TestContextDesc {
        no_render_target: true,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };
    let device = &*context.device;

    let texture = create_default_texture2d(
        device,
        8,
        8,
        1,
        2,
        Format::R8G8B8A8_UNORM,
        ResourceFlags::NONE,
        ResourceStates::COPY_DEST,
    );
    if let Some(texture) = report::check_ok(texture, "Failed to create texture") {
        let level0 = [0x11u8, 0x22, 0x33, 0x44].repeat(64);
        let level1 = [0xa0u8, 0xb0, 0xc0, 0xd0].repeat(16);
        let data = [
            SubresourceData {
                data: &level0,
                row_pitch: 32,
                slice_pitch: 256,
            },
            SubresourceData {
                data: &level1,
                row_pitch: 16,
                slice_pitch: 64,
            },
        ];
        report::check_ok(
            upload_texture_data(device, &*texture, &data, &*context.queue, &*context.list),
            "Failed to upload texture data",
        );
        reset(&context);
        transition_resource_state(&*context.list, &*texture, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);
        let sub = SubResource::new(device, &*texture, 0, &*context.queue, &*context.list);
        check_sub_resource_uint(sub, 0x4433_2211, 0);
        reset(&context);
        let sub = SubResource::new(device, &*texture, 1, &*context.queue, &*context.list);
        check_sub_resource_uint(sub, 0xd0c0_b0a0, 0);
    }

    reset(&context);
    let texture = create_default_texture2d(
        device,
        5,
        3,
        1,
        1,
        Format::R32_FLOAT,
        ResourceFlags::NONE,
        ResourceStates::COPY_DEST,
    );
    if let Some(texture) = report::check_ok(texture, "Failed to create texture") {
        let texels: Vec<u8> = std::iter::repeat(1.5f32).take(15).flat_map(f32::to_le_bytes).collect();
        let data = [SubresourceData {
            data: &texels,
            row_pitch: 20,
            slice_pitch: 60,
        }];
        report::check_ok(
            upload_texture_data(device, &*texture, &data, &*context.queue, &*context.list),
            "Failed to upload texture data",
        );
        reset(&context);
        transition_sub_resource_state(&*context.list, &*texture, 0, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);
        let sub = SubResource::new(device, &*texture, 0, &*context.queue, &*context.list);
        check_sub_resource_float(sub, 1.5, 0);
    }

    destroy_test_context(context);
}

pub fn test_buffer_upload_readback(env: &TestEnv) {
    let desc = TestContextDesc {
        no_render_target: true,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };
    let device = &*context.device;

    let buffer = create_default_buffer(device, 1024, ResourceFlags::NONE, ResourceStates::COPY_DEST);
    if let Some(buffer) = report::check_ok(buffer, "Failed to create buffer") {
        let words: Vec<u8> = std::iter::repeat(0xdead_beef_u32).take(64).flat_map(u32::to_le_bytes).collect();
        report::check_ok(
            upload_buffer_data(device, &*buffer, 256, &words, &*context.queue, &*context.list),
            "Failed to upload buffer data",
        );
        reset(&context);
        transition_resource_state(&*context.list, &*buffer, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);
        let rb = get_buffer_readback_with_command_list(device, &buffer, Format::R32_UINT, &*context.queue, &*context.list);
        if let Some(rb) = report::check_ok(rb, "Failed to read back buffer") {
            report::check(rb.width == 256, format!("Got width {}.", rb.width));
            check_readback_uint(&rb, Some(&Rect::new(0, 0, 64, 1)), 0, 0);
            check_readback_uint(&rb, Some(&Rect::new(64, 0, 128, 1)), 0xdead_beef, 0);
            check_readback_uint(&rb, Some(&Rect::new(128, 0, 256, 1)), 0, 0);
            release_readback(rb);
        }
    }

    destroy_test_context(context);
}

/// Upload and readback resources cannot leave their initial state.
pub fn test_invalid_heap_transitions(env: &TestEnv) {
    let desc = TestContextDesc {
        no_render_target: true,
        no_root_signature: true,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };
    let device = &*context.device;
    let list = &*context.list;

    if let Some(readback) = report::check_ok(create_readback_buffer(device, 256), "Readback buffer") {
        transition_resource_state(list, &*readback, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);
        report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");
    }

    reset(&context);
    if let Some(upload) = report::check_ok(create_upload_buffer(device, 256, None), "Upload buffer") {
        transition_resource_state(list, &*upload, ResourceStates::GENERIC_READ, ResourceStates::COPY_DEST);
        report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");
    }

    // A transition whose before-state does not match is diagnosed too.
    reset(&context);
    let buffer = create_default_buffer(device, 256, ResourceFlags::NONE, ResourceStates::COPY_DEST);
    if let Some(buffer) = report::check_ok(buffer, "Default buffer") {
        transition_resource_state(list, &*buffer, ResourceStates::COPY_SOURCE, ResourceStates::COMMON);
        report::check_hr(hr_of(&list.close()), Hresult::E_INVALIDARG, "Close");

        reset(&context);
        transition_resource_state(list, &*buffer, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);
        transition_resource_state(list, &*buffer, ResourceStates::COPY_SOURCE, ResourceStates::COMMON);
        report::check_hr(hr_of(&list.close()), Hresult::S_OK, "Close");
    }

    destroy_test_context(context);
}
