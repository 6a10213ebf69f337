use smallvec::SmallVec;

use crate::gpu::config::BindingPoolSizes;
use crate::gpu::error::Result;
use crate::sync::barrier_batch::{BufferBarrier, ImageBarrier, MemoryBarrier};
use crate::sync::state::{Aspect, Layout, Stage, SubresourceRange};

use super::types::*;

//===----------------------------------------------------------------------===//
// Command payloads
//===----------------------------------------------------------------------===//

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Inheritance {
    pub render_pass: NativeRenderPass,
    pub subpass: u32,
    pub framebuffer: NativeFramebuffer,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferBegin {
    pub one_time_submit: bool,
    pub simultaneous_use: bool,
    /// Set for secondary buffers recorded inside a render pass.
    pub inheritance: Option<Inheritance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeginRenderPass {
    pub render_pass: NativeRenderPass,
    pub framebuffer: NativeFramebuffer,
    pub render_area: Rect2D,
    pub clear_values: SmallVec<[ClearValue; 4]>,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Draw {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DrawIndexed {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Dispatch {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// `count` draw records read from `buffer`, `stride` bytes apart starting at `offset`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DrawIndirect {
    pub buffer: NativeBuffer,
    pub offset: u64,
    pub count: u32,
    pub stride: u32,
}

/// Query results written into a buffer. `element_size` is 4 or 8; with availability each
/// value is followed by a second element that is non-zero once the result is ready.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct QueryCopy {
    pub first: u32,
    pub count: u32,
    pub offset: u64,
    pub stride: u64,
    pub element_size: u64,
    pub with_availability: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageSubresourceLayers {
    pub aspect: Aspect,
    pub mip_level: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Offset3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageCopy {
    pub src_subresource: ImageSubresourceLayers,
    pub src_offset: Offset3D,
    pub dst_subresource: ImageSubresourceLayers,
    pub dst_offset: Offset3D,
    pub extent: Extent3D,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    /// Zero means tightly packed.
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub image_subresource: ImageSubresourceLayers,
    pub image_offset: Offset3D,
    pub image_extent: Extent3D,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageBlit {
    pub src_subresource: ImageSubresourceLayers,
    pub src_offsets: [Offset3D; 2],
    pub dst_subresource: ImageSubresourceLayers,
    pub dst_offsets: [Offset3D; 2],
}

//===----------------------------------------------------------------------===//
// Binding sets
//===----------------------------------------------------------------------===//

#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler = 0,
    CombinedImageSampler = 1,
    SampledImage = 2,
    StorageImage = 3,
    UniformTexelBuffer = 4,
    StorageTexelBuffer = 5,
    UniformBuffer = 6,
    StorageBuffer = 7,
    UniformBufferDynamic = 8,
    StorageBufferDynamic = 9,
    InputAttachment = 10,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageBinding {
    pub sampler: NativeSampler,
    pub view: NativeImageView,
    pub layout: Layout,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    pub buffer: NativeBuffer,
    pub offset: u64,
    pub range: u64,
}

/// One descriptor write. Exactly one of the slices is non-empty, picked by `ty`.
#[derive(Debug, Copy, Clone)]
pub struct BindingWrite<'a> {
    pub set: NativeBindingSet,
    pub binding: u32,
    pub ty: DescriptorType,
    pub images: &'a [ImageBinding],
    pub buffers: &'a [BufferBinding],
    pub texel_views: &'a [NativeBufferView],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FenceWait {
    Signaled,
    Timeout,
}

//===----------------------------------------------------------------------===//
// Backend
//===----------------------------------------------------------------------===//

/// Native explicit graphics API. Every method maps onto one native call; the recorder above
/// it owns all ordering and synchronization decisions.
pub trait Backend: Send + Sync + 'static {
    fn create_command_pool(&self) -> Result<NativeCommandPool>;
    fn reset_command_pool(&self, pool: NativeCommandPool) -> Result<()>;
    fn allocate_command_buffer(
        &self,
        pool: NativeCommandPool,
        level: CommandBufferLevel,
    ) -> Result<NativeCommandBuffer>;
    fn begin_command_buffer(
        &self,
        cmd: NativeCommandBuffer,
        begin: &CommandBufferBegin,
    ) -> Result<()>;
    fn end_command_buffer(&self, cmd: NativeCommandBuffer) -> Result<()>;

    fn pipeline_barrier(
        &self,
        cmd: NativeCommandBuffer,
        src: Stage,
        dst: Stage,
        memory: &[MemoryBarrier],
        buffers: &[BufferBarrier],
        images: &[ImageBarrier],
    ) -> Result<()>;

    fn begin_render_pass(
        &self,
        cmd: NativeCommandBuffer,
        begin: &BeginRenderPass,
        secondary_contents: bool,
    ) -> Result<()>;
    fn next_subpass(&self, cmd: NativeCommandBuffer, secondary_contents: bool) -> Result<()>;
    fn end_render_pass(&self, cmd: NativeCommandBuffer) -> Result<()>;
    fn execute_commands(
        &self,
        cmd: NativeCommandBuffer,
        secondaries: &[NativeCommandBuffer],
    ) -> Result<()>;
    fn set_viewport(&self, cmd: NativeCommandBuffer, viewport: &Viewport) -> Result<()>;
    fn set_scissor(&self, cmd: NativeCommandBuffer, scissor: &Rect2D) -> Result<()>;

    fn bind_pipeline(
        &self,
        cmd: NativeCommandBuffer,
        point: BindPoint,
        pipeline: NativePipeline,
    ) -> Result<()>;
    fn bind_binding_sets(
        &self,
        cmd: NativeCommandBuffer,
        point: BindPoint,
        layout: NativePipelineLayout,
        first_set: u32,
        sets: &[NativeBindingSet],
        dynamic_offsets: &[u32],
    ) -> Result<()>;
    fn bind_vertex_buffers(
        &self,
        cmd: NativeCommandBuffer,
        first_binding: u32,
        buffers: &[NativeBuffer],
        offsets: &[u64],
    ) -> Result<()>;
    fn bind_index_buffer(
        &self,
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
        ty: IndexType,
    ) -> Result<()>;

    fn draw(&self, cmd: NativeCommandBuffer, draw: &Draw) -> Result<()>;
    fn draw_indexed(&self, cmd: NativeCommandBuffer, draw: &DrawIndexed) -> Result<()>;
    fn dispatch(&self, cmd: NativeCommandBuffer, dispatch: &Dispatch) -> Result<()>;
    fn draw_indirect(&self, cmd: NativeCommandBuffer, draw: &DrawIndirect) -> Result<()>;
    fn draw_indexed_indirect(&self, cmd: NativeCommandBuffer, draw: &DrawIndirect) -> Result<()>;
    fn dispatch_indirect(
        &self,
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
    ) -> Result<()>;

    fn reset_query_pool(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        first: u32,
        count: u32,
    ) -> Result<()>;
    fn begin_query(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
        precise: bool,
    ) -> Result<()>;
    fn end_query(&self, cmd: NativeCommandBuffer, pool: NativeQueryPool, query: u32)
        -> Result<()>;
    /// Timestamp taken once every previous command finished.
    fn write_timestamp(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
    ) -> Result<()>;
    fn copy_query_results(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        dst: NativeBuffer,
        copy: &QueryCopy,
    ) -> Result<()>;

    fn copy_buffer(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeBuffer,
        regions: &[BufferCopy],
    ) -> Result<()>;
    fn update_buffer(
        &self,
        cmd: NativeCommandBuffer,
        dst: NativeBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<()>;
    fn copy_image(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeImage,
        src_layout: Layout,
        dst: NativeImage,
        dst_layout: Layout,
        regions: &[ImageCopy],
    ) -> Result<()>;
    fn copy_buffer_to_image(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeImage,
        dst_layout: Layout,
        regions: &[BufferImageCopy],
    ) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    fn blit_image(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeImage,
        src_layout: Layout,
        dst: NativeImage,
        dst_layout: Layout,
        regions: &[ImageBlit],
        filter: Filter,
    ) -> Result<()>;
    fn clear_color_image(
        &self,
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        color: &ClearValue,
        ranges: &[SubresourceRange],
    ) -> Result<()>;
    fn clear_depth_stencil_image(
        &self,
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        depth: f32,
        stencil: u32,
        ranges: &[SubresourceRange],
    ) -> Result<()>;

    fn create_binding_pool(&self, sizes: &BindingPoolSizes) -> Result<NativeBindingPool>;
    fn reset_binding_pool(&self, pool: NativeBindingPool) -> Result<()>;
    /// `Ok(None)` when the pool has no room left for another set.
    fn allocate_binding_set(
        &self,
        pool: NativeBindingPool,
        layout: NativeBindingLayout,
    ) -> Result<Option<NativeBindingSet>>;
    fn update_binding_sets(&self, writes: &[BindingWrite<'_>]) -> Result<()>;
    fn create_buffer_view(
        &self,
        buffer: NativeBuffer,
        format: Format,
        offset: u64,
        size: u64,
    ) -> Result<NativeBufferView>;

    fn create_fence(&self, signaled: bool) -> Result<NativeFence>;
    fn reset_fences(&self, fences: &[NativeFence]) -> Result<()>;
    fn wait_for_fences(&self, fences: &[NativeFence], timeout_ns: u64) -> Result<FenceWait>;
    fn fence_status(&self, fence: NativeFence) -> Result<bool>;
    fn queue_submit(&self, buffers: &[NativeCommandBuffer], fence: NativeFence) -> Result<()>;
    fn wait_idle(&self) -> Result<()>;

    fn destroy_native(&self, object: NativeObject);
}
