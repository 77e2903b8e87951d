//! Command queues.
//!
//! Each queue owns a worker thread that drains submissions in order from an
//! unbounded channel. Copies, clears and constant-colour draws execute
//! against resource storage on the worker.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, trace, warn};

use super::command_list::{Command, CopyLocation, DrawState, ReferenceCommandList};
use super::descriptor::{DepthStencilView, RenderTargetView};
use super::device::ReferenceDevice;
use super::fence::ReferenceFence;
use super::layout::{encode_color, encode_output, write_depth_stencil, DepthStencilWrite};
use super::pipeline::{PipelineKind, RasterProgram};
use super::resource::ReferenceResource;
use crate::api::format::{row_count, row_size};
use crate::api::{
    iid, ComObject, ComPtr, CommandListType, CommandQueue, CommandQueueDesc, CopyBox, Fence,
    Format, GraphicsCommandList, Guid, PlacedSubresourceFootprint, PrimitiveTopology, Rect,
    RefCount, Unknown,
};
use crate::error::{ApiResult, Hresult};

pub(crate) enum Submission {
    Execute {
        list: Arc<ReferenceCommandList>,
        commands: Arc<Vec<Command>>,
    },
    Signal {
        fence: Arc<ReferenceFence>,
        value: u64,
    },
    Wait {
        fence: Arc<ReferenceFence>,
        value: u64,
    },
}

pub struct ReferenceCommandQueue {
    self_ref: Weak<ReferenceCommandQueue>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    desc: CommandQueueDesc,
    sender: Mutex<Option<UnboundedSender<Submission>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReferenceCommandQueue {
    pub(crate) fn new(device: Arc<ReferenceDevice>, id: u32, desc: CommandQueueDesc) -> ApiResult<Arc<Self>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name(format!("queue-{}", id))
            .spawn(move || run_worker(id, receiver))
            .map_err(|e| {
                error!("Failed to start queue worker: {}", e);
                Hresult::E_OUTOFMEMORY
            })?;
        debug!("CreateCommandQueue: id={}, {:?}", id, desc.list_type);
        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            desc,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }))
    }

    fn submit(&self, submission: Submission) -> ApiResult<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(submission).map_err(|_| {
                error!("Queue {} worker has exited", self.id);
                Hresult::E_FAIL
            }),
            None => Err(Hresult::E_FAIL),
        }
    }

    fn accepts(&self, list_type: CommandListType) -> bool {
        match self.desc.list_type {
            CommandListType::Direct => list_type != CommandListType::Bundle,
            queue_type => queue_type == list_type,
        }
    }

    fn final_release(&self) {
        debug!("Command queue {} released", self.id);
        // Closing the channel lets the worker finish queued work and exit.
        self.sender.lock().take();
        self.worker.lock().take();
        self.device.release();
    }
}

impl_unknown!(
    ReferenceCommandQueue,
    CommandQueue,
    [iid::OBJECT, iid::DEVICE_CHILD, iid::PAGEABLE, iid::COMMAND_QUEUE]
);

impl CommandQueue for ReferenceCommandQueue {
    fn desc(&self) -> CommandQueueDesc {
        self.desc
    }

    fn execute_command_lists(&self, lists: &[&dyn GraphicsCommandList]) {
        for list in lists {
            let Some(list) = ReferenceCommandList::from_interface(*list) else {
                warn!("ExecuteCommandLists: foreign command list");
                continue;
            };
            if !self.accepts(list.list_type()) {
                warn!(
                    "ExecuteCommandLists: {:?} list on {:?} queue",
                    list.list_type(),
                    self.desc.list_type
                );
                continue;
            }
            let Some(commands) = list.submit() else {
                continue;
            };
            debug!("Queue {}: execute list {} ({} commands)", self.id, list.id, commands.len());
            if self.submit(Submission::Execute { list, commands }).is_err() {
                return;
            }
        }
    }

    fn signal(&self, fence: &dyn Fence, value: u64) -> ApiResult<()> {
        let fence = ReferenceFence::from_interface(fence).ok_or(Hresult::E_INVALIDARG)?;
        trace!("Queue {}: signal fence {} to {}", self.id, fence.id, value);
        self.submit(Submission::Signal { fence, value })
    }

    fn wait(&self, fence: &dyn Fence, value: u64) -> ApiResult<()> {
        let fence = ReferenceFence::from_interface(fence).ok_or(Hresult::E_INVALIDARG)?;
        trace!("Queue {}: wait for fence {} >= {}", self.id, fence.id, value);
        self.submit(Submission::Wait { fence, value })
    }
}

fn run_worker(queue_id: u32, mut receiver: UnboundedReceiver<Submission>) {
    let mut processor = CommandProcessor::new(queue_id);
    while let Some(submission) = receiver.blocking_recv() {
        processor.process(submission);
    }
    debug!(
        "Queue {} worker exiting after {} lists",
        queue_id,
        processor.executed_lists()
    );
}

/// Resolved sub-resource region in a resource's storage.
struct Region<'a> {
    resource: &'a ReferenceResource,
    placed: PlacedSubresourceFootprint,
}

impl<'a> Region<'a> {
    fn of(location: &'a CopyLocation) -> Option<Region<'a>> {
        match location {
            CopyLocation::Subresource { resource, index } => {
                let mut placed = *resource.footprints.layouts.get(*index as usize)?;
                placed.footprint.format = resource.resource_desc().format;
                Some(Region { resource, placed })
            }
            CopyLocation::Footprint { resource, footprint } => Some(Region {
                resource,
                placed: *footprint,
            }),
        }
    }

    fn format(&self) -> Format {
        self.placed.footprint.format
    }

    fn slice_pitch(&self) -> u64 {
        u64::from(self.placed.footprint.row_pitch)
            * u64::from(row_count(self.format(), self.placed.footprint.height))
    }

    /// Byte offset of the block containing texel `(x, y, z)`.
    fn offset_of(&self, x: u32, y: u32, z: u32) -> u64 {
        let (_, block_height) = self.format().block_dimensions();
        self.placed.offset
            + u64::from(z) * self.slice_pitch()
            + u64::from(y / block_height) * u64::from(self.placed.footprint.row_pitch)
            + u64::from(row_size(self.format(), x))
    }

    fn full_box(&self) -> CopyBox {
        CopyBox {
            left: 0,
            top: 0,
            front: 0,
            right: self.placed.footprint.width,
            bottom: self.placed.footprint.height,
            back: self.placed.footprint.depth,
        }
    }
}

/// Executes submissions on a queue's worker thread.
pub(crate) struct CommandProcessor {
    queue_id: u32,
    executed_lists: u64,
}

impl CommandProcessor {
    pub fn new(queue_id: u32) -> Self {
        Self {
            queue_id,
            executed_lists: 0,
        }
    }

    pub fn process(&mut self, submission: Submission) {
        match submission {
            Submission::Execute { list, commands } => {
                for command in commands.iter() {
                    self.process_command(command);
                }
                list.complete();
                self.executed_lists += 1;
            }
            Submission::Signal { fence, value } => {
                debug!("Queue {}: fence {} <- {}", self.queue_id, fence.id, value);
                fence.set_value(value);
            }
            Submission::Wait { fence, value } => {
                debug!("Queue {}: waiting on fence {} >= {}", self.queue_id, fence.id, value);
                fence.wait_for(value);
            }
        }
    }

    fn process_command(&mut self, command: &Command) {
        match command {
            Command::CopyBuffer {
                dst,
                dst_offset,
                src,
                src_offset,
                len,
            } => self.handle_copy_buffer(dst, *dst_offset, src, *src_offset, *len),
            Command::CopyTexture {
                dst,
                dst_origin,
                src,
                src_box,
            } => self.handle_copy_texture(dst, *dst_origin, src, src_box.as_ref()),
            Command::CopyResource { dst, src } => self.handle_copy_resource(dst, src),
            Command::ClearRenderTarget { view, color, rects } => {
                self.handle_clear_render_target(view, *color, rects)
            }
            Command::ClearDepthStencil { view, write, rects } => {
                self.handle_clear_depth_stencil(view, *write, rects)
            }
            Command::Draw {
                state,
                vertex_count,
                instance_count,
            } => self.handle_draw(state, *vertex_count, *instance_count),
            Command::Dispatch { groups } => {
                debug!("Dispatch: {:?} groups, compute is not executed", groups);
            }
        }
    }

    fn handle_copy_buffer(
        &mut self,
        dst: &ReferenceResource,
        dst_offset: u64,
        src: &ReferenceResource,
        src_offset: u64,
        len: u64,
    ) {
        debug!(
            "CopyBufferRegion: {} bytes {}@{} -> {}@{}",
            len, src.id, src_offset, dst.id, dst_offset
        );
        if !dst.storage.copy_from(dst_offset, &src.storage, src_offset, len as usize) {
            warn!("CopyBufferRegion out of bounds");
        }
    }

    fn handle_copy_texture(
        &mut self,
        dst: &CopyLocation,
        dst_origin: [u32; 3],
        src: &CopyLocation,
        src_box: Option<&CopyBox>,
    ) {
        let (Some(dst), Some(src)) = (Region::of(dst), Region::of(src)) else {
            warn!("CopyTextureRegion: bad sub-resource");
            return;
        };
        if row_size(dst.format(), 1) != row_size(src.format(), 1) {
            warn!(
                "CopyTextureRegion: format {:?} does not match {:?}",
                src.format(),
                dst.format()
            );
            return;
        }
        let b = src_box.copied().unwrap_or_else(|| src.full_box());
        let full = src.full_box();
        let [dx, dy, dz] = dst_origin;
        let (width, height, depth) = (
            b.right.saturating_sub(b.left),
            b.bottom.saturating_sub(b.top),
            b.back.saturating_sub(b.front),
        );
        let dst_full = dst.full_box();
        let fits = b.right <= full.right
            && b.bottom <= full.bottom
            && b.back <= full.back
            && dx + width <= dst_full.right
            && dy + height <= dst_full.bottom
            && dz + depth <= dst_full.back;
        if !fits {
            warn!("CopyTextureRegion: box {:?} out of bounds", b);
            return;
        }
        debug!(
            "CopyTextureRegion: {}x{}x{} {:?} from {} to {}",
            width,
            height,
            depth,
            src.format(),
            src.resource.id,
            dst.resource.id
        );

        let format = src.format();
        let (_, block_height) = format.block_dimensions();
        let row_bytes = row_size(format, width) as usize;
        let rows = row_count(format, height);
        for z in 0..depth {
            for row in 0..rows {
                let y = row * block_height;
                let from = src.offset_of(b.left, b.top + y, b.front + z);
                let to = dst.offset_of(dx, dy + y, dz + z);
                if !dst
                    .resource
                    .storage
                    .copy_from(to, &src.resource.storage, from, row_bytes)
                {
                    warn!("CopyTextureRegion: row {} out of bounds", row);
                    return;
                }
            }
        }
    }

    fn handle_copy_resource(&mut self, dst: &ReferenceResource, src: &ReferenceResource) {
        let len = dst.storage.len().min(src.storage.len());
        debug!("CopyResource: {} -> {}, {} bytes", src.id, dst.id, len);
        dst.storage.copy_from(0, &src.storage, 0, len);
    }

    /// Apply `f` to every texel of `rect` in one sub-resource.
    fn for_each_texel<F: FnMut(&mut [u8])>(
        resource: &ReferenceResource,
        subresource: u32,
        texel_size: usize,
        rect: Rect,
        mut f: F,
    ) {
        let Some(placed) = resource.footprints.layouts.get(subresource as usize) else {
            return;
        };
        let bounds = Rect::new(
            0,
            0,
            placed.footprint.width as i32,
            placed.footprint.height as i32,
        );
        let rect = rect.intersect(&bounds);
        if rect.is_empty() || texel_size == 0 {
            return;
        }
        let mut row = vec![0u8; (rect.right - rect.left) as usize * texel_size];
        for y in rect.top..rect.bottom {
            let offset = placed.offset
                + y as u64 * u64::from(placed.footprint.row_pitch)
                + rect.left as u64 * texel_size as u64;
            if !resource.storage.read(offset, &mut row) {
                return;
            }
            row.chunks_exact_mut(texel_size).for_each(&mut f);
            resource.storage.write(offset, &row);
        }
    }

    fn clear_rects(rects: &[Rect]) -> Vec<Rect> {
        if rects.is_empty() {
            vec![Rect::new(0, 0, i32::MAX, i32::MAX)]
        } else {
            rects.to_vec()
        }
    }

    fn handle_clear_render_target(&mut self, view: &RenderTargetView, color: [f32; 4], rects: &[Rect]) {
        debug!(
            "ClearRenderTargetView: resource {}, {:?}, color={:?}",
            view.resource.id, view.format, color
        );
        let Some(texel) = encode_color(view.format, color) else {
            warn!("ClearRenderTargetView: cannot encode {:?}", view.format);
            return;
        };
        for rect in Self::clear_rects(rects) {
            Self::for_each_texel(&view.resource, view.subresource, texel.len(), rect, |t| {
                t.copy_from_slice(&texel)
            });
        }
    }

    fn handle_clear_depth_stencil(&mut self, view: &DepthStencilView, write: DepthStencilWrite, rects: &[Rect]) {
        debug!(
            "ClearDepthStencilView: resource {}, {:?}, {:?}",
            view.resource.id, view.format, write
        );
        let texel_size = view.format.byte_size() as usize;
        for rect in Self::clear_rects(rects) {
            let mut ok = true;
            Self::for_each_texel(&view.resource, view.subresource, texel_size, rect, |t| {
                ok &= write_depth_stencil(view.format, t, write);
            });
            if !ok {
                warn!("ClearDepthStencilView: {:?} has no depth aspect", view.format);
                return;
            }
        }
    }

    fn handle_draw(&mut self, state: &DrawState, vertex_count: u32, instance_count: u32) {
        let Some(pso) = &state.pipeline else {
            return;
        };
        let PipelineKind::Graphics(graphics) = &pso.kind else {
            return;
        };
        let RasterProgram::ConstantFill(outputs) = &graphics.program else {
            warn!("DrawInstanced: pipeline {} is not rasterised", pso.id);
            return;
        };
        if state.topology != PrimitiveTopology::TriangleList || vertex_count < 3 || instance_count == 0 {
            warn!(
                "DrawInstanced: {:?} with {} vertices is not rasterised",
                state.topology, vertex_count
            );
            return;
        }
        let (Some(viewport), Some(scissor)) = (state.viewports.first(), state.scissors.first()) else {
            debug!("DrawInstanced: no viewport or scissor, nothing drawn");
            return;
        };
        let viewport_rect = Rect::new(
            viewport.top_left_x.floor() as i32,
            viewport.top_left_y.floor() as i32,
            (viewport.top_left_x + viewport.width).ceil() as i32,
            (viewport.top_left_y + viewport.height).ceil() as i32,
        );
        let area = viewport_rect.intersect(scissor);
        debug!("DrawInstanced: constant fill of {:?}", area);

        for (index, view) in state.render_targets.iter().enumerate() {
            let Some((_, words)) = outputs.iter().find(|(reg, _)| *reg as usize == index) else {
                continue;
            };
            let Some(texel) = encode_output(view.format, *words) else {
                warn!("DrawInstanced: cannot encode output for {:?}", view.format);
                continue;
            };
            Self::for_each_texel(&view.resource, view.subresource, texel.len(), area, |t| {
                t.copy_from_slice(&texel)
            });
        }
    }

    /// Number of command lists executed so far.
    pub fn executed_lists(&self) -> u64 {
        self.executed_lists
    }
}
