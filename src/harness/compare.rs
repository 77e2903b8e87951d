//! Tolerant comparison of read-back values.
//!
//! The `check_readback_*` functions scan a rectangle, stop at the first
//! mismatch and record it at the caller's location together with the
//! coordinate and both values.

use crate::api::{CommandQueue, Device, GraphicsCommandList, Rect, Resource};
use crate::harness::readback::{get_texture_readback_with_command_list, release_readback, ResourceReadback};
use crate::harness::report;

/// Position of `f` on a line where adjacent floats are one apart.
/// Negative floats are reflected so that -0.0 and +0.0 coincide.
fn ulp_ordinal(f: f32) -> i64 {
    let bits = f.to_bits() as i32;
    if bits < 0 {
        i64::from(i32::MIN) - i64::from(bits)
    } else {
        i64::from(bits)
    }
}

pub fn compare_float(f: f32, g: f32, ulps: u32) -> bool {
    (ulp_ordinal(f) - ulp_ordinal(g)).unsigned_abs() <= u64::from(ulps)
}

pub fn compare_uint(x: u32, y: u32, max_diff: u32) -> bool {
    x.abs_diff(y) <= max_diff
}

/// Compare packed 8-bit channels independently.
pub fn compare_color(c1: u32, c2: u32, max_diff: u8) -> bool {
    c1.to_le_bytes()
        .iter()
        .zip(c2.to_le_bytes())
        .all(|(a, b)| a.abs_diff(b) <= max_diff)
}

pub fn compare_vec4(v1: &[f32; 4], v2: &[f32; 4], ulps: u32) -> bool {
    v1.iter().zip(v2).all(|(a, b)| compare_float(*a, *b, ulps))
}

pub fn compare_uvec4(v1: &[u32; 4], v2: &[u32; 4]) -> bool {
    v1 == v2
}

fn full_rect(rb: &ResourceReadback) -> Rect {
    Rect::new(0, 0, rb.width as i32, rb.height as i32)
}

/// First texel in `rect` for which `matches` is false. The rectangle is
/// clipped to the readback.
fn first_mismatch(
    rb: &ResourceReadback,
    rect: Option<&Rect>,
    mut matches: impl FnMut(u32, u32) -> bool,
) -> Option<(u32, u32)> {
    let bounds = full_rect(rb);
    let rect = rect.map_or(bounds, |r| r.intersect(&bounds));
    if rect.is_empty() {
        return None;
    }
    for y in rect.top as u32..rect.bottom as u32 {
        for x in rect.left as u32..rect.right as u32 {
            if !matches(x, y) {
                return Some((x, y));
            }
        }
    }
    None
}

#[track_caller]
pub fn check_readback_float(rb: &ResourceReadback, rect: Option<&Rect>, expected: f32, ulps: u32) {
    let mismatch = first_mismatch(rb, rect, |x, y| compare_float(rb.get_f32(x, y), expected, ulps));
    let message = match mismatch {
        Some((x, y)) => format!(
            "Got {:.8e}, expected {:.8e} at ({}, {}).",
            rb.get_f32(x, y),
            expected,
            x,
            y
        ),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message);
}

/// Packed 8-bit-per-channel values, compared channel by channel.
#[track_caller]
pub fn check_readback_uint(rb: &ResourceReadback, rect: Option<&Rect>, expected: u32, max_diff: u8) {
    let mismatch = first_mismatch(rb, rect, |x, y| compare_color(rb.get_u32(x, y), expected, max_diff));
    let message = match mismatch {
        Some((x, y)) => format!(
            "Got 0x{:08x}, expected 0x{:08x} at ({}, {}).",
            rb.get_u32(x, y),
            expected,
            x,
            y
        ),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message);
}

#[track_caller]
pub fn check_readback_u8(rb: &ResourceReadback, rect: Option<&Rect>, expected: u8, max_diff: u8) {
    let mismatch = first_mismatch(rb, rect, |x, y| rb.get_u8(x, y).abs_diff(expected) <= max_diff);
    let message = match mismatch {
        Some((x, y)) => format!("Got 0x{:02x}, expected 0x{:02x} at ({}, {}).", rb.get_u8(x, y), expected, x, y),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message);
}

#[track_caller]
pub fn check_readback_u16(rb: &ResourceReadback, rect: Option<&Rect>, expected: u16, max_diff: u16) {
    let mismatch = first_mismatch(rb, rect, |x, y| rb.get_u16(x, y).abs_diff(expected) <= max_diff);
    let message = match mismatch {
        Some((x, y)) => format!("Got 0x{:04x}, expected 0x{:04x} at ({}, {}).", rb.get_u16(x, y), expected, x, y),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message);
}

#[track_caller]
pub fn check_readback_u64(rb: &ResourceReadback, rect: Option<&Rect>, expected: u64, max_diff: u64) {
    let mismatch = first_mismatch(rb, rect, |x, y| rb.get_u64(x, y).abs_diff(expected) <= max_diff);
    let message = match mismatch {
        Some((x, y)) => format!(
            "Got {:#018x}, expected {:#018x} at ({}, {}).",
            rb.get_u64(x, y),
            expected,
            x,
            y
        ),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message);
}

#[track_caller]
pub fn check_readback_vec4(rb: &ResourceReadback, rect: Option<&Rect>, expected: &[f32; 4], ulps: u32) {
    let mismatch = first_mismatch(rb, rect, |x, y| compare_vec4(&rb.get_vec4(x, y), expected, ulps));
    let message = match mismatch {
        Some((x, y)) => format!("Got {:?}, expected {:?} at ({}, {}).", rb.get_vec4(x, y), expected, x, y),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message);
}

#[track_caller]
pub fn check_readback_uvec4(rb: &ResourceReadback, rect: Option<&Rect>, expected: &[u32; 4]) {
    let mismatch = first_mismatch(rb, rect, |x, y| compare_uvec4(&rb.get_uvec4(x, y), expected));
    let message = match mismatch {
        Some((x, y)) => format!("Got {:?}, expected {:?} at ({}, {}).", rb.get_uvec4(x, y), expected, x, y),
        None => String::new(),
    };
    report::check(mismatch.is_none(), message);
}

/// Everything needed to read a sub-resource back.
#[derive(Clone, Copy)]
pub struct SubResource<'a> {
    pub device: &'a dyn Device,
    pub texture: &'a dyn Resource,
    pub index: u32,
    pub queue: &'a dyn CommandQueue,
    pub list: &'a dyn GraphicsCommandList,
}

impl<'a> SubResource<'a> {
    pub fn new(
        device: &'a dyn Device,
        texture: &'a dyn Resource,
        index: u32,
        queue: &'a dyn CommandQueue,
        list: &'a dyn GraphicsCommandList,
    ) -> Self {
        Self {
            device,
            texture,
            index,
            queue,
            list,
        }
    }

    #[track_caller]
    fn with_readback(&self, f: impl FnOnce(&ResourceReadback)) {
        match get_texture_readback_with_command_list(self.device, self.texture, self.index, self.queue, self.list) {
            Ok(rb) => {
                f(&rb);
                release_readback(rb);
            }
            Err(e) => report::fail(format!("Failed to read back sub-resource {}: {}.", self.index, e)),
        }
    }
}

// `#[track_caller]` does not reach through closures, so each wrapper
// checks at its own location and reports the caller's.

#[track_caller]
pub fn check_sub_resource_float(sub: SubResource<'_>, expected: f32, ulps: u32) {
    let location = std::panic::Location::caller();
    sub.with_readback(|rb| {
        let mismatch = first_mismatch(rb, None, |x, y| compare_float(rb.get_f32(x, y), expected, ulps));
        report_at(location, mismatch.map(|(x, y)| {
            format!("Got {:.8e}, expected {:.8e} at ({}, {}).", rb.get_f32(x, y), expected, x, y)
        }));
    });
}

#[track_caller]
pub fn check_sub_resource_uint(sub: SubResource<'_>, expected: u32, max_diff: u8) {
    let location = std::panic::Location::caller();
    sub.with_readback(|rb| {
        let mismatch = first_mismatch(rb, None, |x, y| compare_color(rb.get_u32(x, y), expected, max_diff));
        report_at(location, mismatch.map(|(x, y)| {
            format!("Got 0x{:08x}, expected 0x{:08x} at ({}, {}).", rb.get_u32(x, y), expected, x, y)
        }));
    });
}

#[track_caller]
pub fn check_sub_resource_u16(sub: SubResource<'_>, expected: u16, max_diff: u16) {
    let location = std::panic::Location::caller();
    sub.with_readback(|rb| {
        let mismatch = first_mismatch(rb, None, |x, y| rb.get_u16(x, y).abs_diff(expected) <= max_diff);
        report_at(location, mismatch.map(|(x, y)| {
            format!("Got 0x{:04x}, expected 0x{:04x} at ({}, {}).", rb.get_u16(x, y), expected, x, y)
        }));
    });
}

#[track_caller]
pub fn check_sub_resource_vec4(sub: SubResource<'_>, expected: &[f32; 4], ulps: u32) {
    let location = std::panic::Location::caller();
    sub.with_readback(|rb| {
        let mismatch = first_mismatch(rb, None, |x, y| compare_vec4(&rb.get_vec4(x, y), expected, ulps));
        report_at(location, mismatch.map(|(x, y)| {
            format!("Got {:?}, expected {:?} at ({}, {}).", rb.get_vec4(x, y), expected, x, y)
        }));
    });
}

#[track_caller]
pub fn check_sub_resource_uvec4(sub: SubResource<'_>, expected: &[u32; 4]) {
    let location = std::panic::Location::caller();
    sub.with_readback(|rb| {
        let mismatch = first_mismatch(rb, None, |x, y| compare_uvec4(&rb.get_uvec4(x, y), expected));
        report_at(location, mismatch.map(|(x, y)| {
            format!("Got {:?}, expected {:?} at ({}, {}).", rb.get_uvec4(x, y), expected, x, y)
        }));
    });
}

fn report_at(location: &'static std::panic::Location<'static>, failure: Option<String>) {
    report::check_at(location, failure.is_none(), failure.unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        CommandListType, CommandQueueDesc, ComPtr, DeviceOptions, Format, ResourceFlags, ResourceStates, Runtime,
    };
    use crate::harness::resources::{create_default_texture, create_readback_buffer};
    use crate::harness::staging::{upload_texture_data, SubresourceData};
    use crate::harness::sync::{reset_command_list, transition_resource_state};
    use crate::reference::ReferenceRuntime;

    fn device() -> ComPtr<dyn Device> {
        ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap()
    }

    /// A `width` x `height` readback whose texel at (x, y) is `texel(x, y)`.
    fn readback(
        device: &dyn Device,
        format: Format,
        width: u32,
        height: u32,
        texel: impl Fn(u32, u32) -> Vec<u8>,
    ) -> ResourceReadback {
        let bytes: Vec<u8> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .flat_map(|(x, y)| texel(x, y))
            .collect();
        let row_pitch = (bytes.len() / height as usize) as u64;
        let buffer = create_readback_buffer(device, bytes.len() as u64).unwrap();
        let ptr = buffer.map(0, Some(0..0)).unwrap();
        // SAFETY: the buffer is mapped and exactly `bytes.len()` long.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        buffer.unmap(0, None);
        ResourceReadback::map(buffer, format, width, height, row_pitch).unwrap()
    }

    fn failure_message(outcome: &report::Outcome) -> &str {
        assert_eq!(outcome.failures, 1, "{:?}", outcome.records);
        &outcome.records[0].message
    }

    #[test]
    fn test_readback_float_rect() {
        let device = device();
        let rb = readback(&*device, Format::R32_FLOAT, 4, 3, |x, y| {
            let value = if (x, y) == (3, 1) { 2.0f32 } else { 0.5 };
            value.to_le_bytes().to_vec()
        });

        let outcome = report::run_test(|| {
            check_readback_float(&rb, Some(&Rect::new(0, 0, 4, 1)), 0.5, 0);
            check_readback_float(&rb, Some(&Rect::new(0, 0, 3, 3)), 0.5, 0);
            check_readback_float(&rb, Some(&Rect::new(0, 2, 4, 3)), 0.5, 0);
        });
        assert_eq!((outcome.checks, outcome.failures), (3, 0));

        let outcome = report::run_test(|| check_readback_float(&rb, Some(&Rect::new(0, 0, 4, 2)), 0.5, 0));
        let message = failure_message(&outcome);
        assert!(message.contains("at (3, 1)"), "{}", message);
        assert_eq!(outcome.records[0].file, file!());

        let outcome = report::run_test(|| check_readback_float(&rb, None, 0.5, 0));
        assert!(failure_message(&outcome).contains("at (3, 1)"));
    }

    #[test]
    fn test_readback_float_signed_zero_and_ulp_limits() {
        let device = device();
        let zeros = readback(&*device, Format::R32_FLOAT, 2, 2, |_, _| (-0.0f32).to_le_bytes().to_vec());
        let max = readback(&*device, Format::R32_FLOAT, 2, 1, |x, _| {
            let value = if x == 0 { f32::MAX } else { -f32::MAX };
            value.to_le_bytes().to_vec()
        });

        let outcome = report::run_test(|| {
            check_readback_float(&zeros, None, 0.0, 0);
            check_readback_float(&max, Some(&Rect::new(0, 0, 1, 1)), f32::INFINITY, 1);
            check_readback_float(&max, Some(&Rect::new(1, 0, 2, 1)), f32::NEG_INFINITY, 1);
            check_readback_float(&max, None, f32::MAX, u32::MAX);
        });
        assert_eq!((outcome.checks, outcome.failures), (4, 0));

        let outcome = report::run_test(|| check_readback_float(&max, Some(&Rect::new(0, 0, 1, 1)), f32::INFINITY, 0));
        assert!(failure_message(&outcome).contains("at (0, 0)"));
        // The two extremes are 0xfefffffe apart.
        let outcome = report::run_test(|| check_readback_float(&max, None, f32::MAX, 0xfefffffd));
        assert!(failure_message(&outcome).contains("at (1, 0)"));
        let outcome = report::run_test(|| check_readback_float(&max, None, f32::MAX, 0xfefffffe));
        assert_eq!(outcome.failures, 0);
    }

    #[test]
    fn test_readback_rect_clipped_to_extent() {
        let device = device();
        let rb = readback(&*device, Format::R32_FLOAT, 4, 3, |x, y| {
            let value = if (x, y) == (3, 2) { 1.0f32 } else { 0.0 };
            value.to_le_bytes().to_vec()
        });

        let outcome = report::run_test(|| {
            check_readback_float(&rb, Some(&Rect::new(-2, -2, 3, 100)), 0.0, 0);
            check_readback_float(&rb, Some(&Rect::new(10, 10, 20, 20)), 0.0, 0);
            check_readback_float(&rb, Some(&Rect::new(5, 0, 2, 3)), 0.0, 0);
        });
        assert_eq!((outcome.checks, outcome.failures), (3, 0));

        let outcome = report::run_test(|| check_readback_float(&rb, Some(&Rect::new(0, 0, 100, 100)), 0.0, 0));
        assert!(failure_message(&outcome).contains("at (3, 2)"));
    }

    #[test]
    fn test_readback_vec4() {
        let device = device();
        let rb = readback(&*device, Format::R32G32B32A32_FLOAT, 2, 2, |x, y| {
            let w = if (x, y) == (1, 1) { 0.25f32 } else { f32::MAX };
            [0.0f32, -0.0, 1.0, w].iter().flat_map(|c| c.to_le_bytes()).collect()
        });
        let expected = [-0.0, 0.0, 1.0, f32::INFINITY];

        let outcome = report::run_test(|| {
            check_readback_vec4(&rb, Some(&Rect::new(0, 0, 2, 1)), &expected, 1);
            check_readback_vec4(&rb, Some(&Rect::new(0, 0, 1, 2)), &expected, 1);
        });
        assert_eq!((outcome.checks, outcome.failures), (2, 0));

        let outcome = report::run_test(|| check_readback_vec4(&rb, Some(&Rect::new(0, 0, 2, 1)), &expected, 0));
        assert!(failure_message(&outcome).contains("at (0, 0)"));
        let outcome = report::run_test(|| check_readback_vec4(&rb, None, &expected, 1));
        assert!(failure_message(&outcome).contains("at (1, 1)"));
    }

    #[test]
    fn test_readback_integers() {
        let device = device();
        let last = |x, y| (x, y) == (3, 1);
        let u8s = readback(&*device, Format::R8_UINT, 4, 2, |x, y| vec![if last(x, y) { 0x48 } else { 0x40 }]);
        let u16s = readback(&*device, Format::R16_UINT, 4, 2, |x, y| {
            let value: u16 = if last(x, y) { 0xbeef } else { 0xbee0 };
            value.to_le_bytes().to_vec()
        });
        let u64s = readback(&*device, Format::R32G32_UINT, 4, 2, |x, y| {
            let value: u64 = if last(x, y) { 1 << 40 } else { (1 << 40) + 3 };
            value.to_le_bytes().to_vec()
        });
        let uvec4s = readback(&*device, Format::R32G32B32A32_UINT, 4, 2, |x, y| {
            let w: u32 = if last(x, y) { 5 } else { 4 };
            [1u32, 2, 3, w].iter().flat_map(|c| c.to_le_bytes()).collect()
        });
        let inside = Rect::new(0, 0, 3, 2);

        let outcome = report::run_test(|| {
            check_readback_u8(&u8s, Some(&inside), 0x40, 0);
            check_readback_u8(&u8s, None, 0x40, 8);
            check_readback_u16(&u16s, Some(&inside), 0xbee0, 0);
            check_readback_u16(&u16s, None, 0xbee8, 8);
            check_readback_u64(&u64s, Some(&inside), (1 << 40) + 3, 0);
            check_readback_u64(&u64s, None, 1 << 40, 3);
            check_readback_uvec4(&uvec4s, Some(&inside), &[1, 2, 3, 4]);
        });
        assert_eq!((outcome.checks, outcome.failures), (7, 0));

        let outcome = report::run_test(|| check_readback_u8(&u8s, None, 0x40, 7));
        assert!(failure_message(&outcome).contains("Got 0x48, expected 0x40 at (3, 1)"));
        let outcome = report::run_test(|| check_readback_u16(&u16s, None, 0xbee0, 14));
        assert!(failure_message(&outcome).contains("Got 0xbeef, expected 0xbee0 at (3, 1)"));
        let outcome = report::run_test(|| check_readback_u64(&u64s, None, (1 << 40) + 3, 2));
        assert!(failure_message(&outcome).contains("at (3, 1)"));
        let outcome = report::run_test(|| check_readback_uvec4(&uvec4s, None, &[1, 2, 3, 4]));
        assert!(failure_message(&outcome).contains("Got [1, 2, 3, 5], expected [1, 2, 3, 4] at (3, 1)"));
    }

    #[test]
    fn test_sub_resource_checks() {
        let device = device();
        let queue = device
            .create_command_queue(&CommandQueueDesc::new(CommandListType::Direct))
            .unwrap();
        let allocator = device.create_command_allocator(CommandListType::Direct).unwrap();
        let list = device
            .create_command_list(0, CommandListType::Direct, &*allocator, None)
            .unwrap();

        let upload = |format: Format, texel: &[u8]| {
            let texture =
                create_default_texture(&*device, 4, 4, format, ResourceFlags::NONE, ResourceStates::COPY_DEST).unwrap();
            let row: Vec<u8> = texel.repeat(4);
            let texels = row.repeat(4);
            let data = [SubresourceData {
                data: &texels,
                row_pitch: row.len(),
                slice_pitch: texels.len(),
            }];
            upload_texture_data(&*device, &*texture, &data, &*queue, &*list).unwrap();
            reset_command_list(&*list, &*allocator).unwrap();
            transition_resource_state(&*list, &*texture, ResourceStates::COPY_DEST, ResourceStates::COPY_SOURCE);
            texture
        };

        let u16s = upload(Format::R16_UINT, &0x1234u16.to_le_bytes());
        let sub = SubResource::new(&*device, &*u16s, 0, &*queue, &*list);
        let outcome = report::run_test(|| check_sub_resource_u16(sub, 0x1234, 0));
        assert_eq!((outcome.checks, outcome.failures), (1, 0));
        reset_command_list(&*list, &*allocator).unwrap();
        let outcome = report::run_test(|| check_sub_resource_u16(sub, 0x1236, 1));
        let message = failure_message(&outcome);
        assert!(message.contains("Got 0x1234, expected 0x1236 at (0, 0)"), "{}", message);
        assert_eq!(outcome.records[0].file, file!());
        reset_command_list(&*list, &*allocator).unwrap();

        let texel: Vec<u8> = [7u32, 8, 9, 10].iter().flat_map(|c| c.to_le_bytes()).collect();
        let uvec4s = upload(Format::R32G32B32A32_UINT, &texel);
        let sub = SubResource::new(&*device, &*uvec4s, 0, &*queue, &*list);
        let outcome = report::run_test(|| check_sub_resource_uvec4(sub, &[7, 8, 9, 10]));
        assert_eq!((outcome.checks, outcome.failures), (1, 0));
        reset_command_list(&*list, &*allocator).unwrap();
        let outcome = report::run_test(|| check_sub_resource_uvec4(sub, &[7, 8, 9, 11]));
        assert!(failure_message(&outcome).contains("at (0, 0)"));
    }

    #[test]
    fn test_ulp_distance() {
        assert!(compare_float(1.0, 1.0, 0));
        assert!(compare_float(1.0, f32::from_bits(1.0f32.to_bits() + 1), 1));
        assert!(!compare_float(1.0, f32::from_bits(1.0f32.to_bits() + 2), 1));
        assert!(compare_float(0.0, -0.0, 0));
        assert!(compare_float(-f32::from_bits(1), f32::from_bits(1), 2));
        assert!(!compare_float(-1.0, 1.0, 1000));
    }

    #[test]
    fn test_color_channels() {
        assert!(compare_color(0xbf4c7f19, 0xbf4c7f19, 0));
        assert!(compare_color(0xbf4c7f19, 0xc04a8017, 2));
        assert!(!compare_color(0xbf4c7f19, 0xbf4c7f1c, 2));
        assert!(compare_uint(10, 12, 2));
        assert!(!compare_uint(12, 9, 2));
    }

    #[test]
    fn test_vec4() {
        assert!(compare_vec4(&[0.0, 1.0, 0.5, -2.0], &[-0.0, 1.0, 0.5, -2.0], 0));
        assert!(!compare_vec4(&[0.0, 1.0, 0.5, -2.0], &[0.0, 1.0, 0.5, 2.0], 1));
    }
}
