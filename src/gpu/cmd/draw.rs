use std::mem::size_of;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::gpu::binding::{BindingContext, BindingScope, Shader, ValueSource};
use crate::gpu::driver::command::{Backend, Dispatch, Draw, DrawIndexed, DrawIndirect};
use crate::gpu::driver::state::shader_stages;
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::Buffer;
use crate::sync::barrier_batch::WHOLE_SIZE;
use crate::sync::state::Stage;

use super::CommandBuffer;

fn check_indirect(buffer: &Buffer, usage: BufferUsage, offset: u64) -> Result<()> {
    if !buffer.usage().contains(usage) {
        return Err(GPUError::invalid_argument(
            "Graphics buffer not created as an indirect buffer.",
        ));
    }
    if offset % 4 != 0 {
        return Err(GPUError::invalid_argument(
            "Indirect buffer offsets must be aligned to 4 bytes.",
        ));
    }
    Ok(())
}

fn fits(buffer: &Buffer, offset: u64, size: u64) -> bool {
    offset
        .checked_add(size)
        .map_or(false, |end| end <= buffer.size())
}

fn same_shader(bound: &Option<Arc<Shader>>, shader: &Arc<Shader>) -> bool {
    bound.as_ref().map_or(false, |b| Arc::ptr_eq(b, shader))
}

impl<B: Backend> CommandBuffer<B> {
    //===------------------------------------------------------------------===//
    // Graphics shaders
    //===------------------------------------------------------------------===//

    /// Binds `shader` for the draws that follow. `material` supplies the per-draw values;
    /// `shared` the global ones, required when the shader has global bindings.
    pub fn bind_shader(
        &mut self,
        shader: &Arc<Shader>,
        material: &dyn ValueSource,
        shared: Option<&dyn ValueSource>,
    ) -> Result<()> {
        if self.render_pass.is_none() {
            return Err(GPUError::permission_denied(
                "Shader binding must be performed inside of a render pass.",
            ));
        }
        if self.bound_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot bind a shader when another shader is bound.",
            ));
        }
        if shader.bind_point != BindPoint::Graphics {
            return Err(GPUError::permission_denied(
                "Attempting to bind a shader without graphics stages.",
            ));
        }

        self.bound_shader = Some(Arc::clone(shader));
        let result = self.bind_shader_state(shader, material, shared);
        if result.is_err() {
            self.bound_shader = None;
        }
        result
    }

    pub fn update_instance_values(
        &mut self,
        shader: &Arc<Shader>,
        values: &dyn ValueSource,
    ) -> Result<()> {
        if !same_shader(&self.bound_shader, shader) {
            return Err(GPUError::permission_denied(
                "Can only update instance values for the currently bound shader.",
            ));
        }
        self.bind_instance_set(shader, values)
    }

    pub fn unbind_shader(&mut self, shader: &Arc<Shader>) -> Result<()> {
        if self.render_pass.is_none() {
            return Err(GPUError::permission_denied(
                "Shader unbinding must be performed inside of a render pass.",
            ));
        }
        if !same_shader(&self.bound_shader, shader) {
            return Err(GPUError::permission_denied(
                "Can only unbind the currently bound shader.",
            ));
        }
        self.bound_shader = None;
        Ok(())
    }

    /// Pipeline, material set and global set of `shader`, on the buffer currently recorded
    /// into. Redundant pipeline binds are skipped.
    fn bind_shader_state(
        &mut self,
        shader: &Arc<Shader>,
        material: &dyn ValueSource,
        shared: Option<&dyn ValueSource>,
    ) -> Result<()> {
        let point = shader.bind_point;
        let cmd = self.get_command_buffer()?;
        let device = Arc::clone(&self.device);
        let backend = device.backend();

        if self.bound.pipeline != Some(shader.pipeline) {
            backend.bind_pipeline(cmd, point, shader.pipeline)?;
            self.bound.pipeline = Some(shader.pipeline);
        }

        let mut ctx = BindingContext {
            device: &device,
            resources: &mut self.used,
            barriers: &mut self.barriers,
        };
        let volatile = &mut self.recorder.slot_mut(&device)?.volatile;
        if let Some(set) = volatile.create_set(&mut ctx, shader, material)? {
            backend.bind_binding_sets(
                cmd,
                point,
                shader.pipeline_layout,
                BindingScope::Material.set_index(),
                &[set],
                volatile.dynamic_offsets(),
            )?;
        }

        if shader.material_desc.has_scope(BindingScope::Global) {
            let shared = shared.ok_or_else(|| {
                GPUError::not_found("Shader has global bindings but no shared values were given.")
            })?;
            if let Some(set) = self.shared_global.create_set(&mut ctx, shader, shared)? {
                backend.bind_binding_sets(
                    cmd,
                    point,
                    shader.pipeline_layout,
                    BindingScope::Global.set_index(),
                    &[set],
                    self.shared_global.dynamic_offsets(),
                )?;
            }
        }
        Ok(())
    }

    fn bind_instance_set(&mut self, shader: &Arc<Shader>, values: &dyn ValueSource) -> Result<()> {
        let cmd = self.get_command_buffer()?;
        let device = Arc::clone(&self.device);
        let mut ctx = BindingContext {
            device: &device,
            resources: &mut self.used,
            barriers: &mut self.barriers,
        };
        if let Some(set) = self.shared_instance.create_set(&mut ctx, shader, values)? {
            device.backend().bind_binding_sets(
                cmd,
                shader.bind_point,
                shader.pipeline_layout,
                BindingScope::Instance.set_index(),
                &[set],
                self.shared_instance.dynamic_offsets(),
            )?;
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Geometry and draws
    //===------------------------------------------------------------------===//

    /// Binds `(buffer, offset)` pairs starting at `first_binding`.
    pub fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[(&Arc<Buffer>, u64)],
    ) -> Result<()> {
        if self.render_pass.is_none() {
            return Err(GPUError::permission_denied(
                "Binding geometry must be performed inside of a render pass.",
            ));
        }
        if let Some((buffer, _)) = buffers
            .iter()
            .find(|(b, _)| !b.usage().contains(BufferUsage::VERTEX))
        {
            return Err(GPUError::invalid_argument(format!(
                "Buffer {:?} wasn't created with vertex usage.",
                buffer.native()
            )));
        }

        let mut natives: SmallVec<[(NativeBuffer, u64); 4]> = SmallVec::new();
        for (buffer, offset) in buffers {
            buffer.add_memory_barrier(&mut self.barriers, *offset, WHOLE_SIZE)?;
            self.used.add_tracked(*buffer)?;
            natives.push((buffer.native(), *offset));
        }

        let cmd = self.get_command_buffer()?;
        if self.bound.first_vertex_binding == first_binding && self.bound.vertex_buffers == natives
        {
            return Ok(());
        }
        let handles: SmallVec<[NativeBuffer; 4]> = natives.iter().map(|(b, _)| *b).collect();
        let offsets: SmallVec<[u64; 4]> = natives.iter().map(|(_, o)| *o).collect();
        self.device
            .backend()
            .bind_vertex_buffers(cmd, first_binding, &handles, &offsets)?;
        self.bound.first_vertex_binding = first_binding;
        self.bound.vertex_buffers = natives;
        Ok(())
    }

    pub fn bind_index_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        ty: IndexType,
    ) -> Result<()> {
        if self.render_pass.is_none() {
            return Err(GPUError::permission_denied(
                "Binding geometry must be performed inside of a render pass.",
            ));
        }
        if !buffer.usage().contains(BufferUsage::INDEX) {
            return Err(GPUError::invalid_argument(
                "Buffer wasn't created with index usage.",
            ));
        }

        buffer.add_memory_barrier(&mut self.barriers, offset, WHOLE_SIZE)?;
        self.used.add_tracked(buffer)?;

        let cmd = self.get_command_buffer()?;
        let binding = (buffer.native(), offset, ty);
        if self.bound.index_buffer == Some(binding) {
            return Ok(());
        }
        self.device
            .backend()
            .bind_index_buffer(cmd, buffer.native(), offset, ty)?;
        self.bound.index_buffer = Some(binding);
        Ok(())
    }

    pub fn draw(&mut self, draw: &Draw) -> Result<()> {
        self.check_draw()?;
        let cmd = self.get_command_buffer()?;
        self.device.backend().draw(cmd, draw)
    }

    pub fn draw_indexed(&mut self, draw: &DrawIndexed) -> Result<()> {
        self.check_draw()?;
        if self.bound.index_buffer.is_none() {
            return Err(GPUError::invalid_argument(
                "An index buffer must be bound for indexed drawing.",
            ));
        }
        let cmd = self.get_command_buffer()?;
        self.device.backend().draw_indexed(cmd, draw)
    }

    /// Draws `count` [`Draw`] records read from `buffer`, `stride` bytes apart.
    pub fn draw_indirect(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        count: u32,
        stride: u32,
    ) -> Result<()> {
        self.check_draw()?;
        let draw = self.indirect_draw(buffer, offset, count, stride, size_of::<Draw>())?;
        let cmd = self.get_command_buffer()?;
        self.device.backend().draw_indirect(cmd, &draw)
    }

    /// Draws `count` [`DrawIndexed`] records read from `buffer`, `stride` bytes apart.
    pub fn draw_indexed_indirect(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        count: u32,
        stride: u32,
    ) -> Result<()> {
        self.check_draw()?;
        if self.bound.index_buffer.is_none() {
            return Err(GPUError::invalid_argument(
                "An index buffer must be bound for indexed drawing.",
            ));
        }
        let draw = self.indirect_draw(buffer, offset, count, stride, size_of::<DrawIndexed>())?;
        let cmd = self.get_command_buffer()?;
        self.device.backend().draw_indexed_indirect(cmd, &draw)
    }

    fn indirect_draw(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        count: u32,
        stride: u32,
        record: usize,
    ) -> Result<DrawIndirect> {
        check_indirect(buffer, BufferUsage::INDIRECT_DRAW, offset)?;
        if (stride as usize) < record {
            return Err(GPUError::invalid_argument(format!(
                "Indirect draw records must be at least {} bytes apart.",
                record
            )));
        }
        let size = u64::from(count) * u64::from(stride);
        if !fits(buffer, offset, size) {
            return Err(GPUError::out_of_range(
                "Indirect draws outside of indirect buffer range.",
            ));
        }

        buffer.add_memory_barrier(&mut self.barriers, offset, size)?;
        self.used.add_tracked(buffer)?;
        Ok(DrawIndirect {
            buffer: buffer.native(),
            offset,
            count,
            stride,
        })
    }

    fn check_draw(&self) -> Result<()> {
        if self.render_pass.is_none() {
            return Err(GPUError::permission_denied(
                "Drawing must be performed inside of a render pass.",
            ));
        }
        if self.bound_shader.is_none() {
            return Err(GPUError::permission_denied(
                "A shader must be bound for drawing.",
            ));
        }
        Ok(())
    }

    /// Replaces the viewport of the current subpass.
    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        if self.render_pass.is_none() {
            return Err(GPUError::permission_denied(
                "Setting the viewport must be performed inside of a render pass.",
            ));
        }
        let cmd = self.get_command_buffer()?;
        self.device.backend().set_viewport(cmd, viewport)
    }

    //===------------------------------------------------------------------===//
    // Compute
    //===------------------------------------------------------------------===//

    pub fn bind_compute_shader(
        &mut self,
        shader: &Arc<Shader>,
        material: &dyn ValueSource,
        shared: Option<&dyn ValueSource>,
    ) -> Result<()> {
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Compute shader binding must be performed outside of a render pass.",
            ));
        }
        if self.bound_compute_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot bind a compute shader when another compute shader is bound.",
            ));
        }
        if shader.bind_point != BindPoint::Compute {
            return Err(GPUError::permission_denied(
                "Attempting to bind a compute shader without a compute stage.",
            ));
        }

        self.bound_compute_shader = Some(Arc::clone(shader));
        let result = self.bind_shader_state(shader, material, shared);
        if result.is_err() {
            self.bound_compute_shader = None;
        }
        result
    }

    pub fn update_compute_instance_values(
        &mut self,
        shader: &Arc<Shader>,
        values: &dyn ValueSource,
    ) -> Result<()> {
        if !same_shader(&self.bound_compute_shader, shader) {
            return Err(GPUError::permission_denied(
                "Can only update compute instance values for the currently bound compute shader.",
            ));
        }
        self.bind_instance_set(shader, values)
    }

    /// Emits the barriers queued by binds, then dispatches the bound compute shader.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Compute dispatch must be performed outside of a render pass.",
            ));
        }
        if self.bound_compute_shader.is_none() {
            return Err(GPUError::permission_denied(
                "Dispatching a compute shader must be done with a compute shader bound.",
            ));
        }

        let cmd = self.get_command_buffer()?;
        let src = shader_stages(self.device.config()) | Stage::TRANSFER | Stage::HOST;
        self.barriers
            .submit(self.device.backend(), cmd, src, Stage::COMPUTE_SHADER)?;
        self.device
            .backend()
            .dispatch(cmd, &Dispatch { x, y, z })
    }

    /// Dispatches the bound compute shader with the group counts stored in `buffer` at
    /// `offset`.
    pub fn dispatch_indirect(&mut self, buffer: &Arc<Buffer>, offset: u64) -> Result<()> {
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Compute dispatch must be performed outside of a render pass.",
            ));
        }
        if self.bound_compute_shader.is_none() {
            return Err(GPUError::permission_denied(
                "Dispatching a compute shader must be done with a compute shader bound.",
            ));
        }
        check_indirect(buffer, BufferUsage::INDIRECT_DISPATCH, offset)?;
        let size = size_of::<Dispatch>() as u64;
        if !fits(buffer, offset, size) {
            return Err(GPUError::out_of_range(
                "Indirect dispatch outside of indirect buffer range.",
            ));
        }

        buffer.add_memory_barrier(&mut self.barriers, offset, size)?;
        self.used.add_tracked(buffer)?;
        let cmd = self.get_command_buffer()?;
        let src = shader_stages(self.device.config()) | Stage::TRANSFER | Stage::HOST;
        let dst = Stage::COMPUTE_SHADER | Stage::DRAW_INDIRECT;
        self.barriers.submit(self.device.backend(), cmd, src, dst)?;
        self.device
            .backend()
            .dispatch_indirect(cmd, buffer.native(), offset)
    }

    pub fn unbind_compute_shader(&mut self, shader: &Arc<Shader>) -> Result<()> {
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Compute shader unbinding must be performed outside of a render pass.",
            ));
        }
        if !same_shader(&self.bound_compute_shader, shader) {
            return Err(GPUError::permission_denied(
                "Can only unbind the currently bound compute shader.",
            ));
        }
        self.bound_compute_shader = None;
        Ok(())
    }
}
