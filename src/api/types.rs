//! Enumerations, flag sets and descriptions passed through the API.

use bitflags::bitflags;

use crate::api::format::Format;
use crate::api::interfaces::{Resource, RootSignature};

/// Applies a barrier or view to every sub-resource.
pub const ALL_SUBRESOURCES: u32 = 0xffff_ffff;

/// Required alignment of texture rows in buffer footprints.
pub const TEXTURE_DATA_PITCH_ALIGNMENT: u32 = 256;

/// Required alignment of sub-resource offsets in buffer footprints.
pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: u64 = 512;

/// Default alignment of committed resources.
pub const DEFAULT_RESOURCE_PLACEMENT_ALIGNMENT: u64 = 65536;

pub const SIMULTANEOUS_RENDER_TARGET_COUNT: usize = 8;

api_enum! {
    pub enum HeapType {
        Default = 1,
        Upload = 2,
        Readback = 3,
        Custom = 4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapProperties {
    pub heap_type: HeapType,
    pub creation_node_mask: u32,
    pub visible_node_mask: u32,
}

impl HeapProperties {
    pub fn new(heap_type: HeapType) -> Self {
        Self {
            heap_type,
            creation_node_mask: 1,
            visible_node_mask: 1,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeapFlags: u32 {
        const NONE = 0;
        const SHARED = 0x1;
        const DENY_BUFFERS = 0x4;
        const ALLOW_DISPLAY = 0x8;
        const DENY_RT_DS_TEXTURES = 0x40;
        const DENY_NON_RT_DS_TEXTURES = 0x80;
    }
}

api_enum! {
    pub enum ResourceDimension {
        Unknown = 0,
        Buffer = 1,
        Texture1D = 2,
        Texture2D = 3,
        Texture3D = 4,
    }
}

api_enum! {
    pub enum TextureLayout {
        Unknown = 0,
        RowMajor = 1,
        UndefinedSwizzle64Kb = 2,
        StandardSwizzle64Kb = 3,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceFlags: u32 {
        const NONE = 0;
        const ALLOW_RENDER_TARGET = 0x1;
        const ALLOW_DEPTH_STENCIL = 0x2;
        const ALLOW_UNORDERED_ACCESS = 0x4;
        const DENY_SHADER_RESOURCE = 0x8;
        const ALLOW_CROSS_ADAPTER = 0x10;
        const ALLOW_SIMULTANEOUS_ACCESS = 0x20;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceStates: u32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const STREAM_OUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const RESOLVE_DEST = 0x1000;
        const RESOLVE_SOURCE = 0x2000;
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        const PRESENT = 0;
        const PREDICATION = 0x200;
    }
}

impl ResourceStates {
    /// States that allow writes; at most one of them may be set, and never
    /// together with a read state.
    pub const WRITE_STATES: ResourceStates = ResourceStates::RENDER_TARGET
        .union(ResourceStates::UNORDERED_ACCESS)
        .union(ResourceStates::DEPTH_WRITE)
        .union(ResourceStates::STREAM_OUT)
        .union(ResourceStates::COPY_DEST)
        .union(ResourceStates::RESOLVE_DEST);

    /// A state is well-formed if it is a pure read combination or a single
    /// write state.
    pub fn is_valid_combination(self) -> bool {
        let writes = self & Self::WRITE_STATES;
        if writes.is_empty() {
            return true;
        }
        writes.bits().count_ones() == 1 && self == writes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDesc {
    pub count: u32,
    pub quality: u32,
}

impl Default for SampleDesc {
    fn default() -> Self {
        Self {
            count: 1,
            quality: 0,
        }
    }
}

/// Description of a buffer or texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    pub alignment: u64,
    pub width: u64,
    pub height: u32,
    pub depth_or_array_size: u16,
    pub mip_levels: u16,
    pub format: Format,
    pub sample_desc: SampleDesc,
    pub layout: TextureLayout,
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    pub fn buffer(size: u64, flags: ResourceFlags) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            alignment: 0,
            width: size,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: Format::UNKNOWN,
            sample_desc: SampleDesc::default(),
            layout: TextureLayout::RowMajor,
            flags,
        }
    }

    pub fn texture2d(width: u32, height: u32, format: Format, flags: ResourceFlags) -> Self {
        Self {
            dimension: ResourceDimension::Texture2D,
            alignment: 0,
            width: u64::from(width),
            height,
            depth_or_array_size: 1,
            mip_levels: 1,
            format,
            sample_desc: SampleDesc::default(),
            layout: TextureLayout::Unknown,
            flags,
        }
    }

    pub fn is_buffer(&self) -> bool {
        self.dimension == ResourceDimension::Buffer
    }

    pub fn array_size(&self) -> u32 {
        if self.dimension == ResourceDimension::Texture3D {
            1
        } else {
            u32::from(self.depth_or_array_size)
        }
    }

    /// Levels in a complete chain down to 1×1×1.
    pub fn full_mip_chain(&self) -> u32 {
        if self.is_buffer() {
            return 1;
        }
        let depth = if self.dimension == ResourceDimension::Texture3D {
            u64::from(self.depth_or_array_size)
        } else {
            1
        };
        let largest = self.width.max(u64::from(self.height)).max(depth).max(1);
        64 - largest.leading_zeros()
    }

    /// `mip_levels`, with 0 standing for the full chain.
    pub fn mip_count(&self) -> u32 {
        match self.mip_levels {
            0 => self.full_mip_chain(),
            levels => u32::from(levels),
        }
    }

    pub fn subresource_count(&self) -> u32 {
        if self.is_buffer() {
            1
        } else {
            self.mip_count() * self.array_size()
        }
    }

    // Levels past the chain clamp to 1 instead of overflowing the shift.
    pub fn mip_width(&self, level: u32) -> u32 {
        (self.width.checked_shr(level).unwrap_or(0) as u32).max(1)
    }

    pub fn mip_height(&self, level: u32) -> u32 {
        self.height.checked_shr(level).unwrap_or(0).max(1)
    }

    pub fn mip_depth(&self, level: u32) -> u32 {
        if self.dimension == ResourceDimension::Texture3D {
            u32::from(self.depth_or_array_size).checked_shr(level).unwrap_or(0).max(1)
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValueKind {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

/// Optimized clear value supplied at resource creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValue {
    pub format: Format,
    pub value: ClearValueKind,
}

/// Box of texels in a copy source, `[left, right)` × `[top, bottom)` × `[front, back)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubresourceFootprint {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub row_pitch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlacedSubresourceFootprint {
    pub offset: u64,
    pub footprint: SubresourceFootprint,
}

/// Output of `get_copyable_footprints`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CopyableFootprints {
    pub layouts: Vec<PlacedSubresourceFootprint>,
    pub row_counts: Vec<u32>,
    pub row_sizes: Vec<u64>,
    pub total_bytes: u64,
}

/// One side of a texture copy.
#[derive(Clone, Copy)]
pub enum TextureCopyLocation<'a> {
    SubresourceIndex {
        resource: &'a dyn Resource,
        index: u32,
    },
    PlacedFootprint {
        resource: &'a dyn Resource,
        footprint: PlacedSubresourceFootprint,
    },
}

impl<'a> TextureCopyLocation<'a> {
    pub fn resource(&self) -> &'a dyn Resource {
        match *self {
            TextureCopyLocation::SubresourceIndex { resource, .. } => resource,
            TextureCopyLocation::PlacedFootprint { resource, .. } => resource,
        }
    }
}

#[derive(Clone, Copy)]
pub enum ResourceBarrier<'a> {
    Transition {
        resource: &'a dyn Resource,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    },
    /// Orders UAV accesses; `None` orders all of them.
    Uav { resource: Option<&'a dyn Resource> },
}

api_enum! {
    pub enum CommandListType {
        Direct = 0,
        Bundle = 1,
        Compute = 2,
        Copy = 3,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandQueueFlags: u32 {
        const NONE = 0;
        const DISABLE_GPU_TIMEOUT = 0x1;
    }
}

pub const COMMAND_QUEUE_PRIORITY_NORMAL: i32 = 0;
pub const COMMAND_QUEUE_PRIORITY_HIGH: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandQueueDesc {
    pub list_type: CommandListType,
    pub priority: i32,
    pub flags: CommandQueueFlags,
    pub node_mask: u32,
}

impl CommandQueueDesc {
    pub fn new(list_type: CommandListType) -> Self {
        Self {
            list_type,
            priority: COMMAND_QUEUE_PRIORITY_NORMAL,
            flags: CommandQueueFlags::NONE,
            node_mask: 0,
        }
    }
}

api_enum! {
    pub enum DescriptorHeapType {
        CbvSrvUav = 0,
        Sampler = 1,
        Rtv = 2,
        Dsv = 3,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DescriptorHeapFlags: u32 {
        const NONE = 0;
        const SHADER_VISIBLE = 0x1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    pub heap_type: DescriptorHeapType,
    pub num_descriptors: u32,
    pub flags: DescriptorHeapFlags,
    pub node_mask: u32,
}

/// Handle used to write descriptors into a heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuDescriptorHandle {
    pub ptr: u64,
}

impl CpuDescriptorHandle {
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self {
            ptr: self.ptr + u64::from(index) * u64::from(increment),
        }
    }
}

/// Handle used to bind descriptor tables while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GpuDescriptorHandle {
    pub ptr: u64,
}

impl GpuDescriptorHandle {
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self {
            ptr: self.ptr + u64::from(index) * u64::from(increment),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            top_left_x: x,
            top_left_y: y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtvDimension {
    Texture2D {
        mip_slice: u32,
    },
    Texture2DArray {
        mip_slice: u32,
        first_array_slice: u32,
        array_size: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetViewDesc {
    pub format: Format,
    pub dimension: RtvDimension,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DsvFlags: u32 {
        const NONE = 0;
        const READ_ONLY_DEPTH = 0x1;
        const READ_ONLY_STENCIL = 0x2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilViewDesc {
    pub format: Format,
    pub flags: DsvFlags,
    pub mip_slice: u32,
}

/// Default component mapping: identity swizzle.
pub const DEFAULT_SHADER_4_COMPONENT_MAPPING: u32 = 0x1688;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrvDimension {
    Buffer {
        first_element: u64,
        num_elements: u32,
        structure_byte_stride: u32,
        raw: bool,
    },
    Texture2D {
        most_detailed_mip: u32,
        mip_levels: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderResourceViewDesc {
    pub format: Format,
    pub dimension: SrvDimension,
    pub component_mapping: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UavDimension {
    Buffer {
        first_element: u64,
        num_elements: u32,
        structure_byte_stride: u32,
        raw: bool,
    },
    Texture2D {
        mip_slice: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnorderedAccessViewDesc {
    pub format: Format,
    pub dimension: UavDimension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBufferViewDesc {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
}

/// Texture filter encoding, passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Filter(pub u32);

impl Filter {
    pub const MIN_MAG_MIP_POINT: Filter = Filter(0);
    pub const MIN_MAG_MIP_LINEAR: Filter = Filter(0x15);
    pub const ANISOTROPIC: Filter = Filter(0x55);
    pub const COMPARISON_MIN_MAG_MIP_POINT: Filter = Filter(0x80);
    pub const COMPARISON_MIN_MAG_MIP_LINEAR: Filter = Filter(0x95);
}

api_enum! {
    pub enum TextureAddressMode {
        Wrap = 1,
        Mirror = 2,
        Clamp = 3,
        Border = 4,
        MirrorOnce = 5,
    }
}

api_enum! {
    pub enum ComparisonFunc {
        Never = 1,
        Less = 2,
        Equal = 3,
        LessEqual = 4,
        Greater = 5,
        NotEqual = 6,
        GreaterEqual = 7,
        Always = 8,
    }
}

api_enum! {
    pub enum StaticBorderColor {
        TransparentBlack = 0,
        OpaqueBlack = 1,
        OpaqueWhite = 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const DEPTH = 0x1;
        const STENCIL = 0x2;
    }
}

api_enum! {
    pub enum PrimitiveTopologyType {
        Undefined = 0,
        Point = 1,
        Line = 2,
        Triangle = 3,
        Patch = 4,
    }
}

api_enum! {
    pub enum PrimitiveTopology {
        Undefined = 0,
        PointList = 1,
        LineList = 2,
        LineStrip = 3,
        TriangleList = 4,
        TriangleStrip = 5,
    }
}

impl PrimitiveTopology {
    /// The pipeline topology class a draw with this topology needs.
    pub fn topology_type(self) -> PrimitiveTopologyType {
        match self {
            PrimitiveTopology::Undefined => PrimitiveTopologyType::Undefined,
            PrimitiveTopology::PointList => PrimitiveTopologyType::Point,
            PrimitiveTopology::LineList | PrimitiveTopology::LineStrip => PrimitiveTopologyType::Line,
            PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip => PrimitiveTopologyType::Triangle,
        }
    }
}

/// Compiled shader code; empty when the stage is unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderBytecode<'a> {
    pub code: &'a [u8],
}

impl<'a> ShaderBytecode<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

api_enum! {
    pub enum FillMode {
        Wireframe = 2,
        Solid = 3,
    }
}

api_enum! {
    pub enum CullMode {
        None = 1,
        Front = 2,
        Back = 3,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub forced_sample_count: u32,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            multisample_enable: false,
            antialiased_line_enable: false,
            forced_sample_count: 0,
        }
    }
}

pub const COLOR_WRITE_ENABLE_ALL: u8 = 0xf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub logic_op_enable: bool,
    pub src_blend: u32,
    pub dest_blend: u32,
    pub blend_op: u32,
    pub src_blend_alpha: u32,
    pub dest_blend_alpha: u32,
    pub blend_op_alpha: u32,
    pub logic_op: u32,
    pub render_target_write_mask: u8,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        // ONE, ZERO, ADD; logic op NOOP.
        Self {
            blend_enable: false,
            logic_op_enable: false,
            src_blend: 2,
            dest_blend: 1,
            blend_op: 1,
            src_blend_alpha: 2,
            dest_blend_alpha: 1,
            blend_op_alpha: 1,
            logic_op: 4,
            render_target_write_mask: COLOR_WRITE_ENABLE_ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendDesc {
    pub alpha_to_coverage_enable: bool,
    pub independent_blend_enable: bool,
    pub render_target: [RenderTargetBlendDesc; SIMULTANEOUS_RENDER_TARGET_COUNT],
}

api_enum! {
    pub enum DepthWriteMask {
        Zero = 0,
        All = 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilOpDesc {
    pub stencil_fail_op: u32,
    pub stencil_depth_fail_op: u32,
    pub stencil_pass_op: u32,
    pub stencil_func: ComparisonFunc,
}

impl Default for DepthStencilOpDesc {
    fn default() -> Self {
        // KEEP for every operation.
        Self {
            stencil_fail_op: 1,
            stencil_depth_fail_op: 1,
            stencil_pass_op: 1,
            stencil_func: ComparisonFunc::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write_mask: DepthWriteMask,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: DepthStencilOpDesc,
    pub back_face: DepthStencilOpDesc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: DepthWriteMask::All,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front_face: DepthStencilOpDesc::default(),
            back_face: DepthStencilOpDesc::default(),
        }
    }
}

api_enum! {
    pub enum InputClassification {
        PerVertexData = 0,
        PerInstanceData = 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputElementDesc<'a> {
    pub semantic_name: &'a str,
    pub semantic_index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub input_slot_class: InputClassification,
    pub instance_data_step_rate: u32,
}

#[derive(Clone, Copy)]
pub struct GraphicsPipelineStateDesc<'a> {
    pub root_signature: Option<&'a dyn RootSignature>,
    pub vs: ShaderBytecode<'a>,
    pub ps: ShaderBytecode<'a>,
    pub ds: ShaderBytecode<'a>,
    pub hs: ShaderBytecode<'a>,
    pub gs: ShaderBytecode<'a>,
    pub blend_state: BlendDesc,
    pub sample_mask: u32,
    pub rasterizer_state: RasterizerDesc,
    pub depth_stencil_state: DepthStencilDesc,
    pub input_layout: &'a [InputElementDesc<'a>],
    pub primitive_topology_type: PrimitiveTopologyType,
    pub num_render_targets: u32,
    pub rtv_formats: [Format; SIMULTANEOUS_RENDER_TARGET_COUNT],
    pub dsv_format: Format,
    pub sample_desc: SampleDesc,
    pub node_mask: u32,
}

#[derive(Clone, Copy)]
pub struct ComputePipelineStateDesc<'a> {
    pub root_signature: Option<&'a dyn RootSignature>,
    pub cs: ShaderBytecode<'a>,
    pub node_mask: u32,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FenceFlags: u32 {
        const NONE = 0;
        const SHARED = 0x1;
    }
}

/// Adapter selection and runtime debugging switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceOptions {
    /// Enable the runtime's validation layer.
    pub validate: bool,
    /// Prefer the software adapter.
    pub warp: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_enum_round_trip() {
        assert_eq!(HeapType::try_from(3), Ok(HeapType::Readback));
        assert_eq!(HeapType::try_from(9), Err(9));
        assert_eq!(u32::from(CommandListType::Compute), 2);
    }

    #[test]
    fn test_generic_read_is_union_of_reads() {
        assert_eq!(ResourceStates::GENERIC_READ.bits(), 0xac3);
        assert!(ResourceStates::GENERIC_READ.is_valid_combination());
        assert!(!(ResourceStates::COPY_DEST | ResourceStates::COPY_SOURCE).is_valid_combination());
        assert!(ResourceStates::COPY_DEST.is_valid_combination());
    }

    #[test]
    fn test_buffer_desc_invariants() {
        let desc = ResourceDesc::buffer(1024, ResourceFlags::NONE);
        assert_eq!(desc.format, Format::UNKNOWN);
        assert_eq!(desc.layout, TextureLayout::RowMajor);
        assert_eq!(desc.subresource_count(), 1);
    }

    #[test]
    fn test_mip_extents() {
        let mut desc = ResourceDesc::texture2d(32, 8, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 6;
        assert_eq!(desc.mip_width(3), 4);
        assert_eq!(desc.mip_height(3), 1);
        assert_eq!(desc.mip_height(5), 1);
        assert_eq!(desc.subresource_count(), 6);
    }

    #[test]
    fn test_zero_mip_levels_mean_full_chain() {
        let mut desc = ResourceDesc::texture2d(100, 60, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 0;
        assert_eq!(desc.full_mip_chain(), 7);
        assert_eq!(desc.mip_count(), 7);
        assert_eq!(desc.subresource_count(), 7);

        let mut volume = ResourceDesc::texture2d(4, 4, Format::R8_UNORM, ResourceFlags::NONE);
        volume.dimension = ResourceDimension::Texture3D;
        volume.depth_or_array_size = 32;
        volume.mip_levels = 0;
        assert_eq!(volume.mip_count(), 6);
        assert_eq!(ResourceDesc::buffer(4096, ResourceFlags::NONE).full_mip_chain(), 1);
    }

    #[test]
    fn test_mip_extents_past_the_chain() {
        let mut desc = ResourceDesc::texture2d(1, 1, Format::R8G8B8A8_UNORM, ResourceFlags::NONE);
        desc.mip_levels = 40;
        assert_eq!(desc.mip_width(35), 1);
        assert_eq!(desc.mip_height(64), 1);
        assert_eq!(desc.mip_depth(u32::MAX), 1);
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 640, 480);
        let b = Rect::new(160, 120, 480, 360);
        assert_eq!(a.intersect(&b), b);
        assert!(Rect::new(5, 5, 5, 10).is_empty());
        assert!(b.contains(320, 240));
        assert!(!b.contains(80, 240));
    }
}
