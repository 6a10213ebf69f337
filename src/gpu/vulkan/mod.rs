//! [`Backend`] over an externally created Vulkan device.
//!
//! Instance and device creation, memory allocation, pipelines and render pass objects stay with
//! the caller; this backend only records, synchronizes and submits. Destroying a buffer or
//! image here releases the handle, not the memory bound to it.

use ash::vk;
use ash::vk::Handle as VkHandle;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::gpu::config::BindingPoolSizes;
use crate::gpu::driver::command::*;
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::sync::barrier_batch::{BufferBarrier, ImageBarrier, MemoryBarrier};
use crate::sync::state::{Layout, Stage, SubresourceRange};

mod conversions;
use conversions::*;

fn raw<H: VkHandle>(raw: u64) -> H {
    H::from_raw(raw)
}

pub struct VulkanBackend {
    device: ash::Device,
    queue_family: u32,
    /// Queue submission needs external synchronization.
    queue: Mutex<vk::Queue>,
}

impl VulkanBackend {
    /// Wraps `device`. `queue` must belong to `queue_family` of that device.
    pub fn new(device: ash::Device, queue_family: u32, queue: vk::Queue) -> Self {
        Self {
            device,
            queue_family,
            queue: Mutex::new(queue),
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }
}

impl Backend for VulkanBackend {
    //===------------------------------------------------------------------===//
    // Command buffers
    //===------------------------------------------------------------------===//

    fn create_command_pool(&self) -> Result<NativeCommandPool> {
        let info = vk::CommandPoolCreateInfo::builder().queue_family_index(self.queue_family);
        let pool = unsafe { self.device.create_command_pool(&info, None)? };
        Ok(NativeCommandPool(pool.as_raw()))
    }

    fn reset_command_pool(&self, pool: NativeCommandPool) -> Result<()> {
        unsafe {
            self.device
                .reset_command_pool(raw(pool.0), vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }

    fn allocate_command_buffer(
        &self,
        pool: NativeCommandPool,
        level: CommandBufferLevel,
    ) -> Result<NativeCommandBuffer> {
        let level = match level {
            CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
        };
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(raw(pool.0))
            .level(level)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info)? };
        buffers
            .first()
            .map(|cmd| NativeCommandBuffer(cmd.as_raw()))
            .ok_or_else(|| GPUError::backend("No command buffer was allocated."))
    }

    fn begin_command_buffer(
        &self,
        cmd: NativeCommandBuffer,
        begin: &CommandBufferBegin,
    ) -> Result<()> {
        let mut flags = vk::CommandBufferUsageFlags::empty();
        if begin.one_time_submit {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if begin.simultaneous_use {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }

        let inheritance = begin.inheritance.map(|i| {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
            vk::CommandBufferInheritanceInfo::builder()
                .render_pass(raw(i.render_pass.0))
                .subpass(i.subpass)
                .framebuffer(raw(i.framebuffer.0))
                .build()
        });
        let mut info = vk::CommandBufferBeginInfo::builder().flags(flags);
        if let Some(inheritance) = inheritance.as_ref() {
            info = info.inheritance_info(inheritance);
        }
        unsafe { self.device.begin_command_buffer(raw(cmd.0), &info)? };
        Ok(())
    }

    fn end_command_buffer(&self, cmd: NativeCommandBuffer) -> Result<()> {
        unsafe { self.device.end_command_buffer(raw(cmd.0))? };
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
        let memory: SmallVec<[vk::MemoryBarrier; 1]> = memory
            .iter()
            .map(|b| {
                vk::MemoryBarrier::builder()
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_access_mask(access_to_vk(b.dst_access))
                    .build()
            })
            .collect();
        let buffers: SmallVec<[vk::BufferMemoryBarrier; 8]> = buffers
            .iter()
            .map(|b| {
                vk::BufferMemoryBarrier::builder()
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_access_mask(access_to_vk(b.dst_access))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(raw(b.buffer.0))
                    .offset(b.offset)
                    .size(b.size)
                    .build()
            })
            .collect();
        let images: SmallVec<[vk::ImageMemoryBarrier; 8]> = images
            .iter()
            .map(|b| {
                vk::ImageMemoryBarrier::builder()
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_access_mask(access_to_vk(b.dst_access))
                    .old_layout(layout_to_vk(b.old_layout))
                    .new_layout(layout_to_vk(b.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(raw(b.image.0))
                    .subresource_range(range_to_vk(&b.range))
                    .build()
            })
            .collect();

        unsafe {
            self.device.cmd_pipeline_barrier(
                raw(cmd.0),
                stage_to_vk(src),
                stage_to_vk(dst),
                vk::DependencyFlags::empty(),
                &memory,
                &buffers,
                &images,
            );
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Render passes
    //===------------------------------------------------------------------===//

    fn begin_render_pass(
        &self,
        cmd: NativeCommandBuffer,
        begin: &BeginRenderPass,
        secondary_contents: bool,
    ) -> Result<()> {
        let clear_values: SmallVec<[vk::ClearValue; 4]> =
            begin.clear_values.iter().map(clear_to_vk).collect();
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(raw(begin.render_pass.0))
            .framebuffer(raw(begin.framebuffer.0))
            .render_area(rect_to_vk(&begin.render_area))
            .clear_values(&clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(raw(cmd.0), &info, subpass_contents(secondary_contents));
        }
        Ok(())
    }

    fn next_subpass(&self, cmd: NativeCommandBuffer, secondary_contents: bool) -> Result<()> {
        unsafe {
            self.device
                .cmd_next_subpass(raw(cmd.0), subpass_contents(secondary_contents));
        }
        Ok(())
    }

    fn end_render_pass(&self, cmd: NativeCommandBuffer) -> Result<()> {
        unsafe { self.device.cmd_end_render_pass(raw(cmd.0)) };
        Ok(())
    }

    fn execute_commands(
        &self,
        cmd: NativeCommandBuffer,
        secondaries: &[NativeCommandBuffer],
    ) -> Result<()> {
        let secondaries: SmallVec<[vk::CommandBuffer; 4]> =
            secondaries.iter().map(|c| raw(c.0)).collect();
        unsafe { self.device.cmd_execute_commands(raw(cmd.0), &secondaries) };
        Ok(())
    }

    fn set_viewport(&self, cmd: NativeCommandBuffer, viewport: &Viewport) -> Result<()> {
        unsafe {
            self.device
                .cmd_set_viewport(raw(cmd.0), 0, &[viewport_to_vk(viewport)]);
        }
        Ok(())
    }

    fn set_scissor(&self, cmd: NativeCommandBuffer, scissor: &Rect2D) -> Result<()> {
        unsafe {
            self.device
                .cmd_set_scissor(raw(cmd.0), 0, &[rect_to_vk(scissor)]);
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Binding and drawing
    //===------------------------------------------------------------------===//

    fn bind_pipeline(
        &self,
        cmd: NativeCommandBuffer,
        point: BindPoint,
        pipeline: NativePipeline,
    ) -> Result<()> {
        unsafe {
            self.device
                .cmd_bind_pipeline(raw(cmd.0), bind_point(point), raw(pipeline.0));
        }
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
        let sets: SmallVec<[vk::DescriptorSet; 4]> = sets.iter().map(|s| raw(s.0)).collect();
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                raw(cmd.0),
                bind_point(point),
                raw(layout.0),
                first_set,
                &sets,
                dynamic_offsets,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffers(
        &self,
        cmd: NativeCommandBuffer,
        first_binding: u32,
        buffers: &[NativeBuffer],
        offsets: &[u64],
    ) -> Result<()> {
        let buffers: SmallVec<[vk::Buffer; 4]> = buffers.iter().map(|b| raw(b.0)).collect();
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(raw(cmd.0), first_binding, &buffers, offsets);
        }
        Ok(())
    }

    fn bind_index_buffer(
        &self,
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
        ty: IndexType,
    ) -> Result<()> {
        unsafe {
            self.device
                .cmd_bind_index_buffer(raw(cmd.0), raw(buffer.0), offset, ty.into());
        }
        Ok(())
    }

    fn draw(&self, cmd: NativeCommandBuffer, draw: &Draw) -> Result<()> {
        unsafe {
            self.device.cmd_draw(
                raw(cmd.0),
                draw.vertex_count,
                draw.instance_count,
                draw.first_vertex,
                draw.first_instance,
            );
        }
        Ok(())
    }

    fn draw_indexed(&self, cmd: NativeCommandBuffer, draw: &DrawIndexed) -> Result<()> {
        unsafe {
            self.device.cmd_draw_indexed(
                raw(cmd.0),
                draw.index_count,
                draw.instance_count,
                draw.first_index,
                draw.vertex_offset,
                draw.first_instance,
            );
        }
        Ok(())
    }

    fn dispatch(&self, cmd: NativeCommandBuffer, dispatch: &Dispatch) -> Result<()> {
        unsafe {
            self.device
                .cmd_dispatch(raw(cmd.0), dispatch.x, dispatch.y, dispatch.z);
        }
        Ok(())
    }

    fn draw_indirect(&self, cmd: NativeCommandBuffer, draw: &DrawIndirect) -> Result<()> {
        unsafe {
            self.device.cmd_draw_indirect(
                raw(cmd.0),
                raw(draw.buffer.0),
                draw.offset,
                draw.count,
                draw.stride,
            );
        }
        Ok(())
    }

    fn draw_indexed_indirect(&self, cmd: NativeCommandBuffer, draw: &DrawIndirect) -> Result<()> {
        unsafe {
            self.device.cmd_draw_indexed_indirect(
                raw(cmd.0),
                raw(draw.buffer.0),
                draw.offset,
                draw.count,
                draw.stride,
            );
        }
        Ok(())
    }

    fn dispatch_indirect(
        &self,
        cmd: NativeCommandBuffer,
        buffer: NativeBuffer,
        offset: u64,
    ) -> Result<()> {
        unsafe {
            self.device
                .cmd_dispatch_indirect(raw(cmd.0), raw(buffer.0), offset);
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Queries
    //===------------------------------------------------------------------===//

    fn reset_query_pool(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        first: u32,
        count: u32,
    ) -> Result<()> {
        unsafe {
            self.device
                .cmd_reset_query_pool(raw(cmd.0), raw(pool.0), first, count);
        }
        Ok(())
    }

    fn begin_query(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
        precise: bool,
    ) -> Result<()> {
        let flags = if precise {
            vk::QueryControlFlags::PRECISE
        } else {
            vk::QueryControlFlags::empty()
        };
        unsafe {
            self.device
                .cmd_begin_query(raw(cmd.0), raw(pool.0), query, flags);
        }
        Ok(())
    }

    fn end_query(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
    ) -> Result<()> {
        unsafe {
            self.device.cmd_end_query(raw(cmd.0), raw(pool.0), query);
        }
        Ok(())
    }

    fn write_timestamp(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        query: u32,
    ) -> Result<()> {
        unsafe {
            self.device.cmd_write_timestamp(
                raw(cmd.0),
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                raw(pool.0),
                query,
            );
        }
        Ok(())
    }

    fn copy_query_results(
        &self,
        cmd: NativeCommandBuffer,
        pool: NativeQueryPool,
        dst: NativeBuffer,
        copy: &QueryCopy,
    ) -> Result<()> {
        let mut flags = vk::QueryResultFlags::empty();
        if copy.element_size == 8 {
            flags |= vk::QueryResultFlags::TYPE_64;
        }
        if copy.with_availability {
            flags |= vk::QueryResultFlags::WITH_AVAILABILITY;
        }
        unsafe {
            self.device.cmd_copy_query_pool_results(
                raw(cmd.0),
                raw(pool.0),
                copy.first,
                copy.count,
                raw(dst.0),
                copy.offset,
                copy.stride,
                flags,
            );
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Transfers
    //===------------------------------------------------------------------===//

    fn copy_buffer(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeBuffer,
        dst: NativeBuffer,
        regions: &[BufferCopy],
    ) -> Result<()> {
        let regions: SmallVec<[vk::BufferCopy; 4]> = regions
            .iter()
            .map(|r| vk::BufferCopy {
                src_offset: r.src_offset,
                dst_offset: r.dst_offset,
                size: r.size,
            })
            .collect();
        unsafe {
            self.device
                .cmd_copy_buffer(raw(cmd.0), raw(src.0), raw(dst.0), &regions);
        }
        Ok(())
    }

    fn update_buffer(
        &self,
        cmd: NativeCommandBuffer,
        dst: NativeBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        unsafe {
            self.device
                .cmd_update_buffer(raw(cmd.0), raw(dst.0), offset, data);
        }
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
        let regions: SmallVec<[vk::ImageCopy; 4]> = regions
            .iter()
            .map(|r| vk::ImageCopy {
                src_subresource: layers_to_vk(&r.src_subresource),
                src_offset: offset_to_vk(&r.src_offset),
                dst_subresource: layers_to_vk(&r.dst_subresource),
                dst_offset: offset_to_vk(&r.dst_offset),
                extent: extent_to_vk(&r.extent),
            })
            .collect();
        unsafe {
            self.device.cmd_copy_image(
                raw(cmd.0),
                raw(src.0),
                layout_to_vk(src_layout),
                raw(dst.0),
                layout_to_vk(dst_layout),
                &regions,
            );
        }
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
        let regions: SmallVec<[vk::BufferImageCopy; 4]> = regions
            .iter()
            .map(|r| vk::BufferImageCopy {
                buffer_offset: r.buffer_offset,
                buffer_row_length: r.buffer_row_length,
                buffer_image_height: r.buffer_image_height,
                image_subresource: layers_to_vk(&r.image_subresource),
                image_offset: offset_to_vk(&r.image_offset),
                image_extent: extent_to_vk(&r.image_extent),
            })
            .collect();
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                raw(cmd.0),
                raw(src.0),
                raw(dst.0),
                layout_to_vk(dst_layout),
                &regions,
            );
        }
        Ok(())
    }

    fn blit_image(
        &self,
        cmd: NativeCommandBuffer,
        src: NativeImage,
        src_layout: Layout,
        dst: NativeImage,
        dst_layout: Layout,
        regions: &[ImageBlit],
        filter: Filter,
    ) -> Result<()> {
        let regions: SmallVec<[vk::ImageBlit; 4]> = regions
            .iter()
            .map(|r| vk::ImageBlit {
                src_subresource: layers_to_vk(&r.src_subresource),
                src_offsets: [
                    offset_to_vk(&r.src_offsets[0]),
                    offset_to_vk(&r.src_offsets[1]),
                ],
                dst_subresource: layers_to_vk(&r.dst_subresource),
                dst_offsets: [
                    offset_to_vk(&r.dst_offsets[0]),
                    offset_to_vk(&r.dst_offsets[1]),
                ],
            })
            .collect();
        unsafe {
            self.device.cmd_blit_image(
                raw(cmd.0),
                raw(src.0),
                layout_to_vk(src_layout),
                raw(dst.0),
                layout_to_vk(dst_layout),
                &regions,
                filter.into(),
            );
        }
        Ok(())
    }

    fn clear_color_image(
        &self,
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        color: &ClearValue,
        ranges: &[SubresourceRange],
    ) -> Result<()> {
        let ranges: SmallVec<[vk::ImageSubresourceRange; 2]> =
            ranges.iter().map(range_to_vk).collect();
        unsafe {
            self.device.cmd_clear_color_image(
                raw(cmd.0),
                raw(image.0),
                layout_to_vk(layout),
                &color_to_vk(color),
                &ranges,
            );
        }
        Ok(())
    }

    fn clear_depth_stencil_image(
        &self,
        cmd: NativeCommandBuffer,
        image: NativeImage,
        layout: Layout,
        depth: f32,
        stencil: u32,
        ranges: &[SubresourceRange],
    ) -> Result<()> {
        let ranges: SmallVec<[vk::ImageSubresourceRange; 2]> =
            ranges.iter().map(range_to_vk).collect();
        unsafe {
            self.device.cmd_clear_depth_stencil_image(
                raw(cmd.0),
                raw(image.0),
                layout_to_vk(layout),
                &vk::ClearDepthStencilValue { depth, stencil },
                &ranges,
            );
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Binding sets
    //===------------------------------------------------------------------===//

    fn create_binding_pool(&self, sizes: &BindingPoolSizes) -> Result<NativeBindingPool> {
        let pool_sizes = pool_sizes_to_vk(sizes);
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(sizes.max_sets.max(1))
            .pool_sizes(&pool_sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&info, None)? };
        Ok(NativeBindingPool(pool.as_raw()))
    }

    fn reset_binding_pool(&self, pool: NativeBindingPool) -> Result<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(raw(pool.0), vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    fn allocate_binding_set(
        &self,
        pool: NativeBindingPool,
        layout: NativeBindingLayout,
    ) -> Result<Option<NativeBindingSet>> {
        let layouts = [raw::<vk::DescriptorSetLayout>(layout.0)];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(raw(pool.0))
            .set_layouts(&layouts);
        match unsafe { self.device.allocate_descriptor_sets(&info) } {
            Ok(sets) => Ok(sets.first().map(|s| NativeBindingSet(s.as_raw()))),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_binding_sets(&self, writes: &[BindingWrite<'_>]) -> Result<()> {
        let images: Vec<SmallVec<[vk::DescriptorImageInfo; 4]>> = writes
            .iter()
            .map(|w| {
                w.images
                    .iter()
                    .map(|i| vk::DescriptorImageInfo {
                        sampler: raw(i.sampler.0),
                        image_view: raw(i.view.0),
                        image_layout: layout_to_vk(i.layout),
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<SmallVec<[vk::DescriptorBufferInfo; 4]>> = writes
            .iter()
            .map(|w| {
                w.buffers
                    .iter()
                    .map(|b| vk::DescriptorBufferInfo {
                        buffer: raw(b.buffer.0),
                        offset: b.offset,
                        range: b.range,
                    })
                    .collect()
            })
            .collect();
        let views: Vec<SmallVec<[vk::BufferView; 4]>> = writes
            .iter()
            .map(|w| w.texel_views.iter().map(|v| raw(v.0)).collect())
            .collect();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(raw(w.set.0))
                    .dst_binding(w.binding)
                    .descriptor_type(w.ty.into());
                if !images[i].is_empty() {
                    write.image_info(&images[i]).build()
                } else if !buffers[i].is_empty() {
                    write.buffer_info(&buffers[i]).build()
                } else {
                    write.texel_buffer_view(&views[i]).build()
                }
            })
            .collect();
        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
        Ok(())
    }

    fn create_buffer_view(
        &self,
        buffer: NativeBuffer,
        format: Format,
        offset: u64,
        size: u64,
    ) -> Result<NativeBufferView> {
        let info = vk::BufferViewCreateInfo::builder()
            .buffer(raw(buffer.0))
            .format(format_to_vk(format))
            .offset(offset)
            .range(size);
        let view = unsafe { self.device.create_buffer_view(&info, None)? };
        Ok(NativeBufferView(view.as_raw()))
    }

    //===------------------------------------------------------------------===//
    // Fences and the queue
    //===------------------------------------------------------------------===//

    fn create_fence(&self, signaled: bool) -> Result<NativeFence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { self.device.create_fence(&info, None)? };
        Ok(NativeFence(fence.as_raw()))
    }

    fn reset_fences(&self, fences: &[NativeFence]) -> Result<()> {
        let fences: SmallVec<[vk::Fence; 4]> = fences.iter().map(|f| raw(f.0)).collect();
        unsafe { self.device.reset_fences(&fences)? };
        Ok(())
    }

    fn wait_for_fences(&self, fences: &[NativeFence], timeout_ns: u64) -> Result<FenceWait> {
        let fences: SmallVec<[vk::Fence; 8]> = fences.iter().map(|f| raw(f.0)).collect();
        match unsafe { self.device.wait_for_fences(&fences, true, timeout_ns) } {
            Ok(()) => Ok(FenceWait::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceWait::Timeout),
            Err(err) => Err(err.into()),
        }
    }

    fn fence_status(&self, fence: NativeFence) -> Result<bool> {
        Ok(unsafe { self.device.get_fence_status(raw(fence.0))? })
    }

    fn queue_submit(&self, buffers: &[NativeCommandBuffer], fence: NativeFence) -> Result<()> {
        let buffers: SmallVec<[vk::CommandBuffer; 8]> = buffers.iter().map(|c| raw(c.0)).collect();
        let submit = vk::SubmitInfo::builder().command_buffers(&buffers).build();
        let queue = self.queue.lock();
        unsafe {
            self.device
                .queue_submit(*queue, std::slice::from_ref(&submit), raw(fence.0))?;
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let _queue = self.queue.lock();
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn destroy_native(&self, object: NativeObject) {
        unsafe {
            match object {
                NativeObject::Buffer(h) => self.device.destroy_buffer(raw(h.0), None),
                NativeObject::Image(h) => self.device.destroy_image(raw(h.0), None),
                NativeObject::ImageView(h) => self.device.destroy_image_view(raw(h.0), None),
                NativeObject::BufferView(h) => self.device.destroy_buffer_view(raw(h.0), None),
                NativeObject::Framebuffer(h) => self.device.destroy_framebuffer(raw(h.0), None),
                NativeObject::QueryPool(h) => self.device.destroy_query_pool(raw(h.0), None),
                NativeObject::BindingPool(h) => {
                    self.device.destroy_descriptor_pool(raw(h.0), None)
                }
                NativeObject::CommandPool(h) => self.device.destroy_command_pool(raw(h.0), None),
                NativeObject::Fence(h) => self.device.destroy_fence(raw(h.0), None),
            }
        }
    }
}

fn subpass_contents(secondary_contents: bool) -> vk::SubpassContents {
    if secondary_contents {
        vk::SubpassContents::SECONDARY_COMMAND_BUFFERS
    } else {
        vk::SubpassContents::INLINE
    }
}

fn bind_point(point: BindPoint) -> vk::PipelineBindPoint {
    match point {
        BindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
        BindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
    }
}

fn extent_to_vk(extent: &Extent3D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}
