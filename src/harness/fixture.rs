//! Per-test device, queue and command list bundles.
//!
//! A fixture is built at the start of a test body and torn down at its end;
//! teardown asserts that the device was not leaked.

use std::panic::Location;
use std::sync::Arc;

use tracing::{debug, info};

use crate::api::{
    CommandAllocator, CommandListType, CommandQueue, CommandQueueDesc, ComPtr,
    CpuDescriptorHandle, DescriptorHeap, DescriptorHeapFlags, DescriptorHeapType, Device,
    DeviceOptions, Format, GraphicsCommandList, PipelineState, PrimitiveTopology, Rect, Resource, ResourceFlags,
    ResourceStates, RootSignature, RootSignatureFlags, Runtime, Viewport,
};
use crate::error::HarnessError;
use crate::harness::pipeline::{create_empty_root_signature, create_pipeline_state};
use crate::harness::report;
use crate::harness::resources::{create_default_texture, create_descriptor_heap};
use crate::platform::INFINITE;

/// What a test needs to reach the implementation under test.
#[derive(Clone)]
pub struct TestEnv {
    pub runtime: Arc<dyn Runtime>,
    pub options: DeviceOptions,
    /// Bound on fence waits made while a test runs; `INFINITE` disables it.
    pub wait_timeout_ms: u32,
}

impl TestEnv {
    pub fn new(runtime: Arc<dyn Runtime>, options: DeviceOptions) -> Self {
        Self {
            runtime,
            options,
            wait_timeout_ms: INFINITE,
        }
    }

    pub fn with_wait_timeout(mut self, timeout_ms: u32) -> Self {
        self.wait_timeout_ms = timeout_ms;
        self
    }
}

/// Overrides for [`init_test_context`].
#[derive(Debug, Clone, Copy)]
pub struct TestContextDesc {
    pub rt_width: u32,
    pub rt_height: u32,
    pub rt_format: Format,
    pub rt_descriptor_count: u32,
    pub no_render_target: bool,
    pub no_root_signature: bool,
    pub no_pipeline: bool,
}

impl Default for TestContextDesc {
    fn default() -> Self {
        Self {
            rt_width: 32,
            rt_height: 32,
            rt_format: Format::R8G8B8A8_UNORM,
            rt_descriptor_count: 1,
            no_render_target: false,
            no_root_signature: false,
            no_pipeline: false,
        }
    }
}

pub struct TestContext {
    pub runtime: Arc<dyn Runtime>,
    pub device: ComPtr<dyn Device>,
    pub queue: ComPtr<dyn CommandQueue>,
    pub allocator: ComPtr<dyn CommandAllocator>,
    pub list: ComPtr<dyn GraphicsCommandList>,

    pub render_target_desc: TestContextDesc,
    pub render_target: Option<ComPtr<dyn Resource>>,
    pub rtv_heap: Option<ComPtr<dyn DescriptorHeap>>,
    pub rtv: CpuDescriptorHandle,

    pub root_signature: Option<ComPtr<dyn RootSignature>>,
    pub pipeline_state: Option<ComPtr<dyn PipelineState>>,

    pub viewport: Viewport,
    pub scissor_rect: Rect,
}

pub fn create_device(env: &TestEnv) -> Result<ComPtr<dyn Device>, HarnessError> {
    env.runtime
        .create_device(&env.options)
        .map_err(HarnessError::DeviceUnavailable)
}

fn create_queue_bundle(
    device: &dyn Device,
    list_type: CommandListType,
) -> Result<
    (
        ComPtr<dyn CommandQueue>,
        ComPtr<dyn CommandAllocator>,
        ComPtr<dyn GraphicsCommandList>,
    ),
    HarnessError,
> {
    let queue = device
        .create_command_queue(&CommandQueueDesc::new(list_type))
        .map_err(HarnessError::api("CreateCommandQueue"))?;
    let allocator = device
        .create_command_allocator(list_type)
        .map_err(HarnessError::api("CreateCommandAllocator"))?;
    let list = device
        .create_command_list(0, list_type, &*allocator, None)
        .map_err(HarnessError::api("CreateCommandList"))?;
    Ok((queue, allocator, list))
}

fn build_test_context(env: &TestEnv, desc: TestContextDesc) -> Result<TestContext, HarnessError> {
    let device = create_device(env)?;
    let (queue, allocator, list) = create_queue_bundle(&*device, CommandListType::Direct)?;

    let mut render_target = None;
    let mut rtv_heap = None;
    let mut rtv = CpuDescriptorHandle::default();
    if !desc.no_render_target {
        let heap = create_descriptor_heap(
            &*device,
            DescriptorHeapType::Rtv,
            desc.rt_descriptor_count.max(1),
            DescriptorHeapFlags::NONE,
        )?;
        let texture = create_default_texture(
            &*device,
            desc.rt_width,
            desc.rt_height,
            desc.rt_format,
            ResourceFlags::ALLOW_RENDER_TARGET,
            ResourceStates::RENDER_TARGET,
        )?;
        rtv = heap.cpu_descriptor_handle_for_heap_start();
        device.create_render_target_view(Some(&*texture), None, rtv);
        render_target = Some(texture);
        rtv_heap = Some(heap);
    }

    let mut root_signature = None;
    let mut pipeline_state = None;
    if !desc.no_root_signature {
        let rs = create_empty_root_signature(
            &*env.runtime,
            &*device,
            RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        )?;
        if !desc.no_pipeline {
            let rt_format = if desc.no_render_target {
                Format::UNKNOWN
            } else {
                desc.rt_format
            };
            pipeline_state = Some(create_pipeline_state(&*device, &*rs, rt_format, None, None, &[])?);
        }
        root_signature = Some(rs);
    }

    debug!(
        "Test context: {}x{} {:?}, render target {}, pipeline {}",
        desc.rt_width,
        desc.rt_height,
        desc.rt_format,
        render_target.is_some(),
        pipeline_state.is_some()
    );

    Ok(TestContext {
        runtime: env.runtime.clone(),
        device,
        queue,
        allocator,
        list,
        render_target_desc: desc,
        render_target,
        rtv_heap,
        rtv,
        root_signature,
        pipeline_state,
        viewport: Viewport::new(0.0, 0.0, desc.rt_width as f32, desc.rt_height as f32),
        scissor_rect: Rect::new(0, 0, desc.rt_width as i32, desc.rt_height as i32),
    })
}

/// Report a construction failure. Devices that cannot be created make the
/// test inapplicable rather than failed.
fn report_init_failure(location: &'static Location<'static>, e: HarnessError) {
    match e {
        HarnessError::DeviceUnavailable(hr) => {
            info!("Skipping test, no device: {}", hr);
            report::skip(format!("Failed to create device, hr {}.", hr));
        }
        e => {
            report::check_at(location, false, format!("Failed to create test context: {}.", e));
        }
    }
}

/// Build a direct-queue fixture, or `None` when the test cannot run.
#[track_caller]
pub fn init_test_context(env: &TestEnv, desc: Option<&TestContextDesc>) -> Option<TestContext> {
    let location = Location::caller();
    match build_test_context(env, desc.copied().unwrap_or_default()) {
        Ok(context) => Some(context),
        Err(e) => {
            report_init_failure(location, e);
            None
        }
    }
}

/// A compute-queue fixture without render target or pipeline.
#[track_caller]
pub fn init_compute_test_context(env: &TestEnv) -> Option<TestContext> {
    let location = Location::caller();
    let build = || -> Result<TestContext, HarnessError> {
        let device = create_device(env)?;
        let (queue, allocator, list) = create_queue_bundle(&*device, CommandListType::Compute)?;
        Ok(TestContext {
            runtime: env.runtime.clone(),
            device,
            queue,
            allocator,
            list,
            render_target_desc: TestContextDesc {
                no_render_target: true,
                no_root_signature: true,
                no_pipeline: true,
                ..Default::default()
            },
            render_target: None,
            rtv_heap: None,
            rtv: CpuDescriptorHandle::default(),
            root_signature: None,
            pipeline_state: None,
            viewport: Viewport::new(0.0, 0.0, 0.0, 0.0),
            scissor_rect: Rect::new(0, 0, 0, 0),
        })
    };
    match build() {
        Ok(context) => Some(context),
        Err(e) => {
            report_init_failure(location, e);
            None
        }
    }
}

/// Release everything the fixture owns, dependents first, and check that
/// the device goes with it.
#[track_caller]
pub fn destroy_test_context(context: TestContext) {
    let TestContext {
        device,
        queue,
        allocator,
        list,
        render_target,
        rtv_heap,
        root_signature,
        pipeline_state,
        ..
    } = context;

    drop(pipeline_state);
    drop(root_signature);
    drop(rtv_heap);
    drop(render_target);
    drop(list);
    drop(allocator);
    drop(queue);

    let refcount = device.release();
    report::check(refcount == 0, format!("Device has {} references left.", refcount));
}

impl TestContext {
    pub fn render_target(&self) -> Option<&dyn Resource> {
        self.render_target.as_deref()
    }

    /// Bind the default render target, viewport, scissor, root signature
    /// and pipeline on the fixture's list.
    pub fn bind_defaults(&self) {
        let list = &*self.list;
        if self.render_target.is_some() {
            list.om_set_render_targets(&[self.rtv], None);
        }
        if let Some(rs) = &self.root_signature {
            list.set_graphics_root_signature(Some(&**rs));
        }
        if let Some(pso) = &self.pipeline_state {
            list.set_pipeline_state(&**pso);
        }
        list.rs_set_viewports(&[self.viewport]);
        list.rs_set_scissor_rects(&[self.scissor_rect]);
        list.ia_set_primitive_topology(PrimitiveTopology::TriangleList);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Hresult;
    use crate::reference::{create_runtime, ReferenceRuntime};

    fn env() -> TestEnv {
        TestEnv::new(create_runtime(), DeviceOptions::default())
    }

    #[test]
    fn test_default_fixture_is_leak_free() {
        let outcome = report::run_test(|| {
            let context = init_test_context(&env(), None).unwrap();
            let rt = context.render_target().unwrap();
            assert_eq!(rt.desc().width, 32);
            assert_eq!(rt.desc().height, 32);
            assert!(context.pipeline_state.is_some());
            destroy_test_context(context);
        });
        assert_eq!(outcome.failures, 0, "{:?}", outcome.records);
        assert_eq!(outcome.checks, 1);
    }

    #[test]
    fn test_compute_fixture() {
        let outcome = report::run_test(|| {
            let context = init_compute_test_context(&env()).unwrap();
            assert_eq!(context.queue.desc().list_type, CommandListType::Compute);
            assert!(context.render_target.is_none());
            destroy_test_context(context);
        });
        assert_eq!(outcome.failures, 0, "{:?}", outcome.records);
    }

    #[test]
    fn test_leaked_child_is_reported() {
        let outcome = report::run_test(|| {
            let context = init_test_context(
                &env(),
                Some(&TestContextDesc {
                    no_pipeline: true,
                    ..Default::default()
                }),
            )
            .unwrap();
            let leaked = context.render_target.clone();
            destroy_test_context(context);
            drop(leaked);
        });
        assert_eq!(outcome.failures, 1);
        assert!(outcome.records[0].message.contains("references left"));
    }

    #[test]
    fn test_missing_device_skips() {
        let outcome = report::run_test(|| {
            let env = TestEnv::new(
                Arc::new(ReferenceRuntime::unavailable(Hresult::DXGI_ERROR_UNSUPPORTED)),
                DeviceOptions::default(),
            );
            assert!(init_test_context(&env, None).is_none());
        });
        assert!(outcome.skipped());
        assert!(!outcome.failed(true));
    }
}
