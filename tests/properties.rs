use d3d12_conformance::api::{DeviceOptions, Format, ResourceDesc, ResourceDimension, ResourceFlags, Runtime};
use d3d12_conformance::harness::compare::compare_float;
use d3d12_conformance::harness::staging::compute_copyable_footprints;
use d3d12_conformance::reference::ReferenceRuntime;
use proptest::prelude::*;

const FORMATS: [Format; 6] = [
    Format::R8G8B8A8_UNORM,
    Format::R32G32B32A32_FLOAT,
    Format::R16_FLOAT,
    Format::R8_UNORM,
    Format::BC1_UNORM,
    Format::BC7_UNORM,
];

#[derive(Debug, Clone)]
struct TextureCase {
    desc: ResourceDesc,
    first: u32,
    count: u32,
    base_offset: u64,
}

fn texture_case() -> impl Strategy<Value = TextureCase> {
    (
        1u32..300,
        1u32..200,
        1u16..5,
        1u16..6,
        0usize..FORMATS.len(),
        any::<bool>(),
        0u64..8,
    )
        .prop_flat_map(|(width, height, depth, mips, format, volume, base)| {
            let mut desc = ResourceDesc::texture2d(width, height, FORMATS[format], ResourceFlags::NONE);
            desc.mip_levels = mips;
            desc.depth_or_array_size = depth;
            if volume {
                desc.dimension = ResourceDimension::Texture3D;
            }
            let total = desc.subresource_count();
            (Just(desc), 0..total, Just(base * 512)).prop_flat_map(move |(desc, first, base_offset)| {
                (1..=total - first).prop_map(move |count| TextureCase {
                    desc,
                    first,
                    count,
                    base_offset,
                })
            })
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_device_footprints_follow_placement_rules(case in texture_case()) {
        let device = ReferenceRuntime::new().create_device(&DeviceOptions::default()).unwrap();
        let got = device.get_copyable_footprints(&case.desc, case.first, case.count, case.base_offset);
        let expected = compute_copyable_footprints(&case.desc, case.first, case.count, case.base_offset);
        prop_assert_eq!(&got, &expected);

        for layout in &got.layouts {
            prop_assert_eq!(layout.offset % 512, 0);
            prop_assert_eq!(layout.footprint.row_pitch % 256, 0);
        }
    }

    #[test]
    fn prop_float_distance_is_symmetric(f in -1.0e6f32..1.0e6, g in -1.0e6f32..1.0e6, ulps in 0u32..1000) {
        prop_assert_eq!(compare_float(f, g, ulps), compare_float(g, f, ulps));
        prop_assert!(compare_float(f, f, 0));
    }

    #[test]
    fn prop_adjacent_floats_are_one_ulp_apart(f in 1.0e-30f32..1.0e30) {
        let next = f32::from_bits(f.to_bits() + 1);
        prop_assert!(compare_float(f, next, 1));
        prop_assert!(!compare_float(f, next, 0));
        prop_assert!(compare_float(-f, -next, 1));
    }
}

#[test]
fn test_signed_zeroes_coincide() {
    assert!(compare_float(0.0, -0.0, 0));
    assert!(compare_float(f32::from_bits(1), -f32::from_bits(1), 2));
    assert!(!compare_float(f32::from_bits(1), -f32::from_bits(1), 1));
}
