//! Headless backend. Hands out generational handles, keeps a log of every native call and
//! simulates fences and binding-pool exhaustion. All tests run against it.

use std::collections::HashSet;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::gpu::config::BindingPoolSizes;
use crate::gpu::driver::command::*;
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::sync::barrier_batch::{BufferBarrier, ImageBarrier, MemoryBarrier};
use crate::sync::state::{Layout, Stage, SubresourceRange};
use crate::utils::{Handle, Pool};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub set: NativeBindingSet,
    pub binding: u32,
    pub ty: DescriptorType,
    pub images: Vec<ImageBinding>,
    pub buffers: Vec<BufferBinding>,
    pub texel_views: Vec<NativeBufferView>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NullCall {
    CreateCommandPool(NativeCommandPool),
    ResetCommandPool(NativeCommandPool),
    AllocateCommandBuffer {
        pool: NativeCommandPool,
        level: CommandBufferLevel,
        cmd: NativeCommandBuffer,
    },
    BeginCommandBuffer {
        cmd: NativeCommandBuffer,
        begin: CommandBufferBegin,
    },
    EndCommandBuffer(NativeCommandBuffer),
    PipelineBarrier {
        cmd: NativeCommandBuffer,
        src: Stage,
        dst: Stage,
        memory: Vec<MemoryBarrier>,
        buffers: Vec<BufferBarrier>,
        images: Vec<ImageBarrier>,
    },
    BeginRenderPass {
        cmd: NativeCommandBuffer,
        begin: BeginRenderPass,
        secondary_contents: bool,
    },
    NextSubpass {
        cmd: NativeCommandBuffer,
        secondary_contents: bool,
    },
    EndRenderPass(NativeCommandBuffer),
    ExecuteCommands {
        cmd: NativeCommandBuffer,
        secondaries: Vec<NativeCommandBuffer>,
    },
    SetViewport {
        cmd: NativeCommandBuffer,
        viewport: Viewport,
    },
    SetScissor {
        cmd: NativeCommandBuffer,
        scissor: Rect2D,
    },
    BindPipeline {
        cmd: NativeCommandBuffer,
        point: BindPoint,
        pipeline: NativePipeline,
    },
    BindBindingSets {
        cmd: NativeCommandBuffer,
        point: BindPoint,
        layout: NativePipelineLayout,
        first_set: u32,
        sets: Vec<NativeBindingSet>,
        dynamic_offsets: Vec<u32>,
    },
    BindVertexBuffers {
        cmd: NativeCommandBuffer,
        first_binding: u32,
        buffers: Vec<NativeBuffer>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
        ty: IndexType,
    },
    Draw {
        cmd: NativeCommandBuffer,
        draw: Draw,
    },
    DrawIndexed {
        cmd: NativeCommandBuffer,
        draw: DrawIndexed,
    },
    Dispatch {
        cmd: NativeCommandBuffer,
        dispatch: Dispatch,
    },
    DrawIndirect {
        cmd: NativeCommandBuffer,
        draw: DrawIndirect,
        indexed: bool,
    },
    DispatchIndirect {
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
    },
    ResetQueryPool {
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        first: u32,
        count: u32,
    },
    BeginQuery {
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
        precise: bool,
    },
    EndQuery {
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
    },
    WriteTimestamp {
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
    },
    CopyQueryResults {
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        dst: NativeBuffer,
        copy: QueryCopy,
    },
    CopyBuffer {
        cmd: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeBuffer,
        regions: Vec<BufferCopy>,
    },
    UpdateBuffer {
        cmd: NativeCommandBuffer,
        dst: NativeBuffer,
        offset: u64,
        data: Vec<u8>,
    },
    CopyImage {
        cmd: NativeCommandBuffer,
        src: NativeImage,
        src_layout: Layout,
        dst: NativeImage,
        dst_layout: Layout,
        regions: Vec<ImageCopy>,
    },
    CopyBufferToImage {
        cmd: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeImage,
        dst_layout: Layout,
        regions: Vec<BufferImageCopy>,
    },
    BlitImage {
        cmd: NativeCommandBuffer,
        src: NativeImage,
        dst: NativeImage,
        regions: Vec<ImageBlit>,
        filter: Filter,
    },
    ClearColorImage {
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        color: ClearValue,
    },
    ClearDepthStencilImage {
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        depth: f32,
        stencil: u32,
    },
    CreateBindingPool {
        pool: NativeBindingPool,
        sizes: BindingPoolSizes,
    },
    ResetBindingPool(NativeBindingPool),
    AllocateBindingSet {
        pool: NativeBindingPool,
        layout: NativeBindingLayout,
        set: Option<NativeBindingSet>,
    },
    UpdateBindingSets(Vec<RecordedWrite>),
    CreateBufferView(NativeBufferView),
    CreateFence(NativeFence),
    ResetFences(Vec<NativeFence>),
    WaitForFences(Vec<NativeFence>),
    QueueSubmit {
        buffers: Vec<NativeCommandBuffer>,
        fence: NativeFence,
    },
    WaitIdle,
    Destroy(NativeObject),
}

#[derive(Debug)]
enum NullObject {
    CommandPool { buffers: Vec<u64> },
    CommandBuffer,
    Fence { signaled: bool },
    BindingPool { allocated: u32, max_sets: u32, sets: Vec<u64> },
    BindingSet,
    Other,
}

struct NullState {
    objects: Pool<NullObject>,
    calls: Vec<NullCall>,
    auto_signal: bool,
    unsignaled: HashSet<u64>,
    max_sets_per_pool: Option<u32>,
}

pub struct NullBackend {
    state: Mutex<NullState>,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NullState {
                objects: Pool::default(),
                calls: Vec::new(),
                auto_signal: true,
                unsignaled: HashSet::new(),
                max_sets_per_pool: None,
            }),
        }
    }

    /// When disabled, submitted fences stay unsignaled until [`NullBackend::signal_all`].
    pub fn set_auto_signal(&self, auto_signal: bool) {
        self.state.lock().auto_signal = auto_signal;
    }

    pub fn signal_all(&self) {
        let mut state = self.state.lock();
        let pending: Vec<u64> = state.unsignaled.drain().collect();
        for raw in pending {
            if let Some(NullObject::Fence { signaled }) = lookup_mut(&mut state.objects, raw) {
                *signaled = true;
            }
        }
    }

    /// Caps every binding pool at `max_sets` allocations, regardless of its requested size.
    pub fn set_max_sets_per_pool(&self, max_sets: Option<u32>) {
        self.state.lock().max_sets_per_pool = max_sets;
    }

    pub fn calls(&self) -> Vec<NullCall> {
        self.state.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<NullCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    pub fn count_calls<F>(&self, pred: F) -> usize
    where
        F: Fn(&NullCall) -> bool,
    {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Native objects created and not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn create_buffer(&self) -> Result<NativeBuffer> {
        self.insert(NullObject::Other).map(NativeBuffer)
    }

    pub fn create_image(&self) -> Result<NativeImage> {
        self.insert(NullObject::Other).map(NativeImage)
    }

    pub fn create_image_view(&self) -> Result<NativeImageView> {
        self.insert(NullObject::Other).map(NativeImageView)
    }

    pub fn create_framebuffer(&self) -> Result<NativeFramebuffer> {
        self.insert(NullObject::Other).map(NativeFramebuffer)
    }

    pub fn create_render_pass(&self) -> Result<NativeRenderPass> {
        self.insert(NullObject::Other).map(NativeRenderPass)
    }

    pub fn create_pipeline(&self) -> Result<NativePipeline> {
        self.insert(NullObject::Other).map(NativePipeline)
    }

    pub fn create_pipeline_layout(&self) -> Result<NativePipelineLayout> {
        self.insert(NullObject::Other).map(NativePipelineLayout)
    }

    pub fn create_binding_layout(&self) -> Result<NativeBindingLayout> {
        self.insert(NullObject::Other).map(NativeBindingLayout)
    }

    pub fn create_sampler(&self) -> Result<NativeSampler> {
        self.insert(NullObject::Other).map(NativeSampler)
    }

    pub fn create_query_pool(&self) -> Result<NativeQueryPool> {
        self.insert(NullObject::Other).map(NativeQueryPool)
    }

    fn insert(&self, object: NullObject) -> Result<u64> {
        self.state.lock().insert(object)
    }

    fn record(&self, call: NullCall) {
        self.state.lock().calls.push(call);
    }
}

fn lookup_mut(objects: &mut Pool<NullObject>, raw: u64) -> Option<&mut NullObject> {
    objects.get_mut_ref(Handle::from_raw(raw)?)
}

impl NullState {
    fn insert(&mut self, object: NullObject) -> Result<u64> {
        self.objects
            .insert(object)
            .map(Handle::to_raw)
            .ok_or_else(GPUError::out_of_memory)
    }

    fn release(&mut self, raw: u64) -> Option<NullObject> {
        self.objects.release(Handle::from_raw(raw)?)
    }

    fn release_children(&mut self, raw: u64) {
        match self.release(raw) {
            Some(NullObject::CommandPool { buffers }) => {
                for b in buffers {
                    self.release(b);
                }
            }
            Some(NullObject::BindingPool { sets, .. }) => {
                for s in sets {
                    self.release(s);
                }
            }
            _ => {}
        }
    }
}

impl Backend for NullBackend {
    fn create_command_pool(&self) -> Result<NativeCommandPool> {
        let mut state = self.state.lock();
        let pool = NativeCommandPool(state.insert(NullObject::CommandPool {
            buffers: Vec::new(),
        })?);
        state.calls.push(NullCall::CreateCommandPool(pool));
        Ok(pool)
    }

    fn reset_command_pool(&self, pool: NativeCommandPool) -> Result<()> {
        self.record(NullCall::ResetCommandPool(pool));
        Ok(())
    }

    fn allocate_command_buffer(
        &self,
        pool: NativeCommandPool,
        level: CommandBufferLevel,
    ) -> Result<NativeCommandBuffer> {
        let mut state = self.state.lock();
        let raw = state.insert(NullObject::CommandBuffer)?;
        match lookup_mut(&mut state.objects, pool.0) {
            Some(NullObject::CommandPool { buffers }) => buffers.push(raw),
            _ => {
                state.release(raw);
                return Err(GPUError::not_found("Unknown command pool."));
            }
        }
        let cmd = NativeCommandBuffer(raw);
        state
            .calls
            .push(NullCall::AllocateCommandBuffer { pool, level, cmd });
        Ok(cmd)
    }

    fn begin_command_buffer(
        &self,
        cmd: NativeCommandBuffer,
        begin: &CommandBufferBegin,
    ) -> Result<()> {
        self.record(NullCall::BeginCommandBuffer { cmd, begin: *begin });
        Ok(())
    }

    fn end_command_buffer(&self, cmd: NativeCommandBuffer) -> Result<()> {
        self.record(NullCall::EndCommandBuffer(cmd));
        Ok(())
    }

    fn pipeline_barrier(
        &self,
        cmd: NativeCommandBuffer,
        src: Stage,
        dst: Stage,
        memory: &[MemoryBarrier],
        buffers: &[BufferBarrier],
        images: &[ImageBarrier],
    ) -> Result<()> {
        self.record(NullCall::PipelineBarrier {
            cmd,
            src,
            dst,
            memory: memory.to_vec(),
            buffers: buffers.to_vec(),
            images: images.to_vec(),
        });
        Ok(())
    }

    fn begin_render_pass(
        &self,
        cmd: NativeCommandBuffer,
        begin: &BeginRenderPass,
        secondary_contents: bool,
    ) -> Result<()> {
        self.record(NullCall::BeginRenderPass {
            cmd,
            begin: begin.clone(),
            secondary_contents,
        });
        Ok(())
    }

    fn next_subpass(&self, cmd: NativeCommandBuffer, secondary_contents: bool) -> Result<()> {
        self.record(NullCall::NextSubpass {
            cmd,
            secondary_contents,
        });
        Ok(())
    }

    fn end_render_pass(&self, cmd: NativeCommandBuffer) -> Result<()> {
        self.record(NullCall::EndRenderPass(cmd));
        Ok(())
    }

    fn execute_commands(
        &self,
        cmd: NativeCommandBuffer,
        secondaries: &[NativeCommandBuffer],
    ) -> Result<()> {
        self.record(NullCall::ExecuteCommands {
            cmd,
            secondaries: secondaries.to_vec(),
        });
        Ok(())
    }

    fn set_viewport(&self, cmd: NativeCommandBuffer, viewport: &Viewport) -> Result<()> {
        self.record(NullCall::SetViewport {
            cmd,
            viewport: *viewport,
        });
        Ok(())
    }

    fn set_scissor(&self, cmd: NativeCommandBuffer, scissor: &Rect2D) -> Result<()> {
        self.record(NullCall::SetScissor {
            cmd,
            scissor: *scissor,
        });
        Ok(())
    }

    fn bind_pipeline(
        &self,
        cmd: NativeCommandBuffer,
        point: BindPoint,
        pipeline: NativePipeline,
    ) -> Result<()> {
        self.record(NullCall::BindPipeline {
            cmd,
            point,
            pipeline,
        });
        Ok(())
    }

    fn bind_binding_sets(
        &self,
        cmd: NativeCommandBuffer,
        point: BindPoint,
        layout: NativePipelineLayout,
        first_set: u32,
        sets: &[NativeBindingSet],
        dynamic_offsets: &[u32],
    ) -> Result<()> {
        self.record(NullCall::BindBindingSets {
            cmd,
            point,
            layout,
            first_set,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
        Ok(())
    }

    fn bind_vertex_buffers(
        &self,
        cmd: NativeCommandBuffer,
        first_binding: u32,
        buffers: &[NativeBuffer],
        offsets: &[u64],
    ) -> Result<()> {
        self.record(NullCall::BindVertexBuffers {
            cmd,
            first_binding,
            buffers: buffers.to_vec(),
            offsets: offsets.to_vec(),
        });
        Ok(())
    }

    fn bind_index_buffer(
        &self,
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
        ty: IndexType,
    ) -> Result<()> {
        self.record(NullCall::BindIndexBuffer {
            cmd,
            buffer,
            offset,
            ty,
        });
        Ok(())
    }

    fn draw(&self, cmd: NativeCommandBuffer, draw: &Draw) -> Result<()> {
        self.record(NullCall::Draw { cmd, draw: *draw });
        Ok(())
    }

    fn draw_indexed(&self, cmd: NativeCommandBuffer, draw: &DrawIndexed) -> Result<()> {
        self.record(NullCall::DrawIndexed { cmd, draw: *draw });
        Ok(())
    }

    fn dispatch(&self, cmd: NativeCommandBuffer, dispatch: &Dispatch) -> Result<()> {
        self.record(NullCall::Dispatch {
            cmd,
            dispatch: *dispatch,
        });
        Ok(())
    }

    fn draw_indirect(&self, cmd: NativeCommandBuffer, draw: &DrawIndirect) -> Result<()> {
        self.record(NullCall::DrawIndirect {
            cmd,
            draw: *draw,
            indexed: false,
        });
        Ok(())
    }

    fn draw_indexed_indirect(&self, cmd: NativeCommandBuffer, draw: &DrawIndirect) -> Result<()> {
        self.record(NullCall::DrawIndirect {
            cmd,
            draw: *draw,
            indexed: true,
        });
        Ok(())
    }

    fn dispatch_indirect(
        &self,
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
    ) -> Result<()> {
        self.record(NullCall::DispatchIndirect {
            cmd,
            buffer,
            offset,
        });
        Ok(())
    }

    fn reset_query_pool(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        first: u32,
        count: u32,
    ) -> Result<()> {
        self.record(NullCall::ResetQueryPool {
            cmd,
            pool,
            first,
            count,
        });
        Ok(())
    }

    fn begin_query(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
        precise: bool,
    ) -> Result<()> {
        self.record(NullCall::BeginQuery {
            cmd,
            pool,
            query,
            precise,
        });
        Ok(())
    }

    fn end_query(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
    ) -> Result<()> {
        self.record(NullCall::EndQuery { cmd, pool, query });
        Ok(())
    }

    fn write_timestamp(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
    ) -> Result<()> {
        self.record(NullCall::WriteTimestamp { cmd, pool, query });
        Ok(())
    }

    fn copy_query_results(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        dst: NativeBuffer,
        copy: &QueryCopy,
    ) -> Result<()> {
        self.record(NullCall::CopyQueryResults {
            cmd,
            pool,
            dst,
            copy: *copy,
        });
        Ok(())
    }

    fn copy_buffer(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeBuffer,
        regions: &[BufferCopy],
    ) -> Result<()> {
        self.record(NullCall::CopyBuffer {
            cmd,
            src,
            dst,
            regions: regions.to_vec(),
        });
        Ok(())
    }

    fn update_buffer(
        &self,
        cmd: NativeCommandBuffer,
        dst: NativeBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        self.record(NullCall::UpdateBuffer {
            cmd,
            dst,
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn copy_image(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeImage,
        src_layout: Layout,
        dst: NativeImage,
        dst_layout: Layout,
        regions: &[ImageCopy],
    ) -> Result<()> {
        self.record(NullCall::CopyImage {
            cmd,
            src,
            src_layout,
            dst,
            dst_layout,
            regions: regions.to_vec(),
        });
        Ok(())
    }

    fn copy_buffer_to_image(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeImage,
        dst_layout: Layout,
        regions: &[BufferImageCopy],
    ) -> Result<()> {
        self.record(NullCall::CopyBufferToImage {
            cmd,
            src,
            dst,
            dst_layout,
            regions: regions.to_vec(),
        });
        Ok(())
    }

    fn blit_image(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeImage,
        _src_layout: Layout,
        dst: NativeImage,
        _dst_layout: Layout,
        regions: &[ImageBlit],
        filter: Filter,
    ) -> Result<()> {
        self.record(NullCall::BlitImage {
            cmd,
            src,
            dst,
            regions: regions.to_vec(),
            filter,
        });
        Ok(())
    }

    fn clear_color_image(
        &self,
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        color: &ClearValue,
        _ranges: &[SubresourceRange],
    ) -> Result<()> {
        self.record(NullCall::ClearColorImage {
            cmd,
            image,
            layout,
            color: *color,
        });
        Ok(())
    }

    fn clear_depth_stencil_image(
        &self,
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        depth: f32,
        stencil: u32,
        _ranges: &[SubresourceRange],
    ) -> Result<()> {
        self.record(NullCall::ClearDepthStencilImage {
            cmd,
            image,
            layout,
            depth,
            stencil,
        });
        Ok(())
    }

    fn create_binding_pool(&self, sizes: &BindingPoolSizes) -> Result<NativeBindingPool> {
        let mut state = self.state.lock();
        let max_sets = match state.max_sets_per_pool {
            Some(cap) => cap.min(sizes.max_sets),
            None => sizes.max_sets,
        };
        let pool = NativeBindingPool(state.insert(NullObject::BindingPool {
            allocated: 0,
            max_sets,
            sets: Vec::new(),
        })?);
        state.calls.push(NullCall::CreateBindingPool {
            pool,
            sizes: *sizes,
        });
        Ok(pool)
    }

    fn reset_binding_pool(&self, pool: NativeBindingPool) -> Result<()> {
        let mut state = self.state.lock();
        let freed = match lookup_mut(&mut state.objects, pool.0) {
            Some(NullObject::BindingPool {
                allocated, sets, ..
            }) => {
                *allocated = 0;
                std::mem::take(sets)
            }
            _ => return Err(GPUError::not_found("Unknown binding pool.")),
        };
        for set in freed {
            state.release(set);
        }
        state.calls.push(NullCall::ResetBindingPool(pool));
        Ok(())
    }

    fn allocate_binding_set(
        &self,
        pool: NativeBindingPool,
        layout: NativeBindingLayout,
    ) -> Result<Option<NativeBindingSet>> {
        let mut state = self.state.lock();
        let has_room = match lookup_mut(&mut state.objects, pool.0) {
            Some(NullObject::BindingPool {
                allocated,
                max_sets,
                ..
            }) => *allocated < *max_sets,
            _ => return Err(GPUError::not_found("Unknown binding pool.")),
        };

        let set = if has_room {
            let raw = state.insert(NullObject::BindingSet)?;
            if let Some(NullObject::BindingPool {
                allocated, sets, ..
            }) = lookup_mut(&mut state.objects, pool.0)
            {
                *allocated += 1;
                sets.push(raw);
            }
            Some(NativeBindingSet(raw))
        } else {
            None
        };

        state
            .calls
            .push(NullCall::AllocateBindingSet { pool, layout, set });
        Ok(set)
    }

    fn update_binding_sets(&self, writes: &[BindingWrite<'_>]) -> Result<()> {
        let recorded = writes
            .iter()
            .map(|w| RecordedWrite {
                set: w.set,
                binding: w.binding,
                ty: w.ty,
                images: w.images.to_vec(),
                buffers: w.buffers.to_vec(),
                texel_views: w.texel_views.to_vec(),
            })
            .collect();
        self.record(NullCall::UpdateBindingSets(recorded));
        Ok(())
    }

    fn create_buffer_view(
        &self,
        _buffer: NativeBuffer,
        _format: Format,
        _offset: u64,
        _size: u64,
    ) -> Result<NativeBufferView> {
        let mut state = self.state.lock();
        let view = NativeBufferView(state.insert(NullObject::Other)?);
        state.calls.push(NullCall::CreateBufferView(view));
        Ok(view)
    }

    fn create_fence(&self, signaled: bool) -> Result<NativeFence> {
        let mut state = self.state.lock();
        let fence = NativeFence(state.insert(NullObject::Fence { signaled })?);
        state.calls.push(NullCall::CreateFence(fence));
        Ok(fence)
    }

    fn reset_fences(&self, fences: &[NativeFence]) -> Result<()> {
        let mut state = self.state.lock();
        for fence in fences {
            if let Some(NullObject::Fence { signaled }) = lookup_mut(&mut state.objects, fence.0)
            {
                *signaled = false;
            }
        }
        state.calls.push(NullCall::ResetFences(fences.to_vec()));
        Ok(())
    }

    fn wait_for_fences(&self, fences: &[NativeFence], _timeout_ns: u64) -> Result<FenceWait> {
        let mut state = self.state.lock();
        let mut all_signaled = true;
        for fence in fences {
            match lookup_mut(&mut state.objects, fence.0) {
                Some(NullObject::Fence { signaled }) => all_signaled &= *signaled,
                _ => return Err(GPUError::not_found("Unknown fence.")),
            }
        }
        state.calls.push(NullCall::WaitForFences(fences.to_vec()));
        Ok(if all_signaled {
            FenceWait::Signaled
        } else {
            FenceWait::Timeout
        })
    }

    fn fence_status(&self, fence: NativeFence) -> Result<bool> {
        let mut state = self.state.lock();
        match lookup_mut(&mut state.objects, fence.0) {
            Some(NullObject::Fence { signaled }) => Ok(*signaled),
            _ => Err(GPUError::not_found("Unknown fence.")),
        }
    }

    fn queue_submit(&self, buffers: &[NativeCommandBuffer], fence: NativeFence) -> Result<()> {
        let mut state = self.state.lock();
        if !fence.is_null() {
            let auto_signal = state.auto_signal;
            match lookup_mut(&mut state.objects, fence.0) {
                Some(NullObject::Fence { signaled }) => *signaled = auto_signal,
                _ => return Err(GPUError::not_found("Unknown fence.")),
            }
            if !auto_signal {
                state.unsignaled.insert(fence.0);
            }
        }
        let buffers: SmallVec<[NativeCommandBuffer; 8]> = buffers.iter().copied().collect();
        state.calls.push(NullCall::QueueSubmit {
            buffers: buffers.into_vec(),
            fence,
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.signal_all();
        self.record(NullCall::WaitIdle);
        Ok(())
    }

    fn destroy_native(&self, object: NativeObject) {
        let raw = match object {
            NativeObject::Buffer(h) => h.0,
            NativeObject::Image(h) => h.0,
            NativeObject::ImageView(h) => h.0,
            NativeObject::BufferView(h) => h.0,
            NativeObject::Framebuffer(h) => h.0,
            NativeObject::QueryPool(h) => h.0,
            NativeObject::BindingPool(h) => h.0,
            NativeObject::CommandPool(h) => h.0,
            NativeObject::Fence(h) => h.0,
        };
        let mut state = self.state.lock();
        state.unsignaled.remove(&raw);
        state.release_children(raw);
        state.calls.push(NullCall::Destroy(object));
    }
}
