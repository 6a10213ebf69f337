use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::gpu::driver::command::{Backend, BeginRenderPass, CommandBufferBegin, Inheritance};
use crate::gpu::driver::state::{attachment_layout, framebuffer_stages};
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::{Framebuffer, FramebufferSurface, RenderSurface};
use crate::sync::barrier_batch::ImageBarrier;
use crate::sync::state::{Access, Aspect, Layout, Stage, SubresourceRange};

use super::{BoundState, CommandBuffer};

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttachmentUsage: u32 {
        const CLEAR = 0x1;
        const KEEP_BEFORE = 0x2;
        const KEEP_AFTER = 0x4;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentInfo {
    pub format: Format,
    pub usage: AttachmentUsage,
    pub samples: u32,
}

/// Native render pass plus what recording needs to know about its attachments.
#[derive(Debug)]
pub struct RenderPass {
    native: NativeRenderPass,
    attachments: Vec<AttachmentInfo>,
    subpass_count: u32,
}

impl RenderPass {
    pub fn new(
        native: NativeRenderPass,
        attachments: Vec<AttachmentInfo>,
        subpass_count: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            native,
            attachments,
            subpass_count: subpass_count.max(1),
        })
    }

    pub fn native(&self) -> NativeRenderPass {
        self.native
    }

    pub fn attachments(&self) -> &[AttachmentInfo] {
        &self.attachments
    }

    pub fn subpass_count(&self) -> u32 {
        self.subpass_count
    }

    pub fn clears_attachments(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.usage.contains(AttachmentUsage::CLEAR))
    }
}

/// Render pass currently being recorded. The native pass itself is only begun when it ends:
/// each subpass is recorded into its own secondary buffer and stitched into the primary then.
pub struct ActivePass {
    pass: Arc<RenderPass>,
    framebuffer: Arc<Framebuffer>,
    viewport: Viewport,
    render_area: Rect2D,
    clear_values: SmallVec<[ClearValue; 4]>,
    subpass: u32,
    subpass_buffers: SmallVec<[NativeCommandBuffer; 4]>,
}

impl ActivePass {
    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.pass
    }

    pub fn framebuffer(&self) -> &Arc<Framebuffer> {
        &self.framebuffer
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn subpass(&self) -> u32 {
        self.subpass
    }

    pub fn subpass_buffers(&self) -> &[NativeCommandBuffer] {
        &self.subpass_buffers
    }

    pub(crate) fn current_buffer(&self) -> Result<NativeCommandBuffer> {
        self.subpass_buffers
            .last()
            .copied()
            .ok_or_else(|| GPUError::backend("Render pass has no subpass buffer."))
    }
}

fn viewport_in_range(viewport: &Viewport, framebuffer: &Framebuffer) -> bool {
    viewport.x >= 0.0
        && viewport.y >= 0.0
        && viewport.width > 0.0
        && viewport.height > 0.0
        && viewport.x + viewport.width <= framebuffer.width() as f32
        && viewport.y + viewport.height <= framebuffer.height() as f32
        && viewport.min_depth >= 0.0
        && viewport.max_depth <= 1.0
        && viewport.min_depth <= viewport.max_depth
}

const RENDER_SURFACE_ACCESS: Access =
    Access::TRANSFER_WRITE.union(Access::COLOR_ATTACHMENT_WRITE);
const RENDER_SURFACE_STAGES: Stage = Stage::TRANSFER.union(Stage::COLOR_ATTACHMENT_OUTPUT);

impl<B: Backend> CommandBuffer<B> {
    //===------------------------------------------------------------------===//
    // Render passes
    //===------------------------------------------------------------------===//

    /// Starts recording `pass` into `framebuffer`. Without a viewport the whole framebuffer
    /// is drawn to. Clear values, when given, must cover every attachment.
    pub fn begin_render_pass(
        &mut self,
        pass: &Arc<RenderPass>,
        framebuffer: &Arc<Framebuffer>,
        viewport: Option<Viewport>,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot start a render pass when another render pass is active.",
            ));
        }
        if self.bound_compute_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot start a render pass when a compute shader is bound.",
            ));
        }
        if framebuffer.surfaces().len() != pass.attachments().len() {
            return Err(GPUError::invalid_argument(
                "Framebuffer not compatible with render pass attachments.",
            ));
        }
        if !clear_values.is_empty() && clear_values.len() != pass.attachments().len() {
            return Err(GPUError::invalid_argument(
                "When clear values are provided they must equal the number of attachments.",
            ));
        }
        if clear_values.is_empty() && pass.clears_attachments() {
            return Err(GPUError::invalid_argument(
                "No clear values provided for render pass that clears attachments.",
            ));
        }

        let viewport = viewport.unwrap_or(Viewport {
            width: framebuffer.width() as f32,
            height: framebuffer.height() as f32,
            ..Default::default()
        });
        if !viewport_in_range(&viewport, framebuffer) {
            return Err(GPUError::out_of_range("Viewport is out of range."));
        }
        let render_area = Rect2D {
            x: viewport.x as i32,
            y: viewport.y as i32,
            w: viewport.width as u32,
            h: viewport.height as u32,
        };

        let cmd = self.begin_subpass_buffer(pass, framebuffer, 0, &viewport, &render_area)?;
        let mut subpass_buffers = SmallVec::new();
        subpass_buffers.push(cmd);
        self.bound = BoundState::default();
        self.render_pass = Some(ActivePass {
            pass: Arc::clone(pass),
            framebuffer: Arc::clone(framebuffer),
            viewport,
            render_area,
            clear_values: clear_values.iter().copied().collect(),
            subpass: 0,
            subpass_buffers,
        });
        Ok(())
    }

    fn begin_subpass_buffer(
        &mut self,
        pass: &RenderPass,
        framebuffer: &Framebuffer,
        subpass: u32,
        viewport: &Viewport,
        scissor: &Rect2D,
    ) -> Result<NativeCommandBuffer> {
        let device = Arc::clone(&self.device);
        let backend = device.backend();
        let cmd = self
            .recorder
            .slot_mut(&device)?
            .natives
            .alloc(backend, CommandBufferLevel::Secondary)?;
        backend.begin_command_buffer(
            cmd,
            &CommandBufferBegin {
                one_time_submit: self.usage.is_single_use(),
                simultaneous_use: self.usage.contains(CommandBufferUsage::MULTI_SUBMIT),
                inheritance: Some(Inheritance {
                    render_pass: pass.native(),
                    subpass,
                    framebuffer: framebuffer.native(),
                }),
            },
        )?;
        backend.set_viewport(cmd, viewport)?;
        backend.set_scissor(cmd, scissor)?;
        Ok(cmd)
    }

    pub fn next_subpass(&mut self, pass: &Arc<RenderPass>) -> Result<()> {
        let active = match &self.render_pass {
            Some(active) if Arc::ptr_eq(&active.pass, pass) => active,
            _ => {
                return Err(GPUError::permission_denied(
                    "Can only go to the next subpass for the currently active render pass.",
                ))
            }
        };
        if active.subpass + 1 >= pass.subpass_count() {
            return Err(GPUError::permission_denied(
                "Already at the end of the current render pass.",
            ));
        }
        if self.bound_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot go to the next subpass while a shader is bound.",
            ));
        }

        let framebuffer = Arc::clone(&active.framebuffer);
        let viewport = active.viewport;
        let render_area = active.render_area;
        let next = active.subpass + 1;
        let current = active.current_buffer()?;

        self.device.backend().end_command_buffer(current)?;
        let cmd = self.begin_subpass_buffer(pass, &framebuffer, next, &viewport, &render_area)?;
        if let Some(active) = self.render_pass.as_mut() {
            active.subpass_buffers.try_reserve(1)?;
            active.subpass_buffers.push(cmd);
            active.subpass = next;
        }
        self.bound = BoundState::default();
        Ok(())
    }

    /// Ends `pass`: attachment barriers are emitted, then the native pass is recorded into the
    /// primary buffer, executing each subpass buffer in order.
    pub fn end_render_pass(&mut self, pass: &Arc<RenderPass>) -> Result<()> {
        let active = match &self.render_pass {
            Some(active) if Arc::ptr_eq(&active.pass, pass) => active,
            _ => {
                return Err(GPUError::permission_denied(
                    "Can only end the currently active render pass.",
                ))
            }
        };
        if active.subpass + 1 < pass.subpass_count() {
            return Err(GPUError::permission_denied("Must draw all render subpasses."));
        }
        if self.bound_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot end a render pass while a shader is bound.",
            ));
        }

        if let Err(err) = self.stitch_render_pass() {
            self.barriers.reset();
            return Err(err);
        }
        if self.fence_set && self.is_primary() {
            self.submit_fence()?;
        }
        Ok(())
    }

    fn stitch_render_pass(&mut self) -> Result<()> {
        let Some(active) = self.render_pass.take() else {
            return Ok(());
        };
        let device = Arc::clone(&self.device);
        let backend = device.backend();

        backend.end_command_buffer(active.current_buffer()?)?;
        self.bound = BoundState::default();

        self.begin_framebuffer(&active.framebuffer)?;
        let cmd = self.primary_buffer()?;
        backend.begin_render_pass(
            cmd,
            &BeginRenderPass {
                render_pass: active.pass.native(),
                framebuffer: active.framebuffer.native(),
                render_area: active.render_area,
                clear_values: active.clear_values.clone(),
            },
            true,
        )?;
        for (i, secondary) in active.subpass_buffers.iter().enumerate() {
            if i > 0 {
                backend.next_subpass(cmd, true)?;
            }
            backend.execute_commands(cmd, std::slice::from_ref(secondary))?;
        }
        backend.end_render_pass(cmd)?;
        self.end_framebuffer(&active.framebuffer)
    }

    /// Moves every attachment into its attachment layout, together with the barriers queued
    /// by binds during the pass.
    fn begin_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<()> {
        let layers = framebuffer.layers();
        for surface in framebuffer.surfaces() {
            let FramebufferSurface::Offscreen {
                texture,
                mip_level,
                layer,
                cube_face,
            } = surface
            else {
                continue;
            };
            if texture.can_read_back() {
                self.readback_offscreens.add(texture)?;
            }
            if texture.only_subpass_input() {
                continue;
            }

            let format = texture.info().format;
            let attachment_write = if format.is_depth_stencil() {
                Access::DEPTH_STENCIL_ATTACHMENT_WRITE
            } else {
                Access::COLOR_ATTACHMENT_WRITE
            };
            let base_layer = layer * texture.info().faces() + cube_face;
            *self.barriers.add_image_barrier()? = ImageBarrier {
                src_access: Access::TRANSFER_READ
                    | Access::TRANSFER_WRITE
                    | Access::SHADER_READ
                    | Access::INPUT_ATTACHMENT_READ
                    | attachment_write,
                dst_access: Access::TRANSFER_WRITE | attachment_write,
                old_layout: texture.layout(),
                new_layout: attachment_layout(format),
                image: texture.native(),
                range: SubresourceRange::mip(texture.aspect(), *mip_level, base_layer, layers),
            };
        }

        let stages = framebuffer_stages(self.device.config());
        let cmd = self.primary_buffer()?;
        self.barriers
            .submit(self.device.backend(), cmd, stages, stages)
    }

    /// Moves attachments back to their resting layouts and tracks everything the pass touched.
    fn end_framebuffer(&mut self, framebuffer: &Arc<Framebuffer>) -> Result<()> {
        let layers = framebuffer.layers();
        for surface in framebuffer.surfaces() {
            match surface {
                FramebufferSurface::Offscreen {
                    texture,
                    mip_level,
                    layer,
                    cube_face,
                } => {
                    self.used.add_tracked(texture)?;
                    if texture.only_subpass_input() {
                        continue;
                    }

                    let format = texture.info().format;
                    let attachment_access = if format.is_depth_stencil() {
                        Access::DEPTH_STENCIL_ATTACHMENT_READ
                            | Access::DEPTH_STENCIL_ATTACHMENT_WRITE
                    } else {
                        Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE
                    };
                    let base_layer = layer * texture.info().faces() + cube_face;
                    *self.barriers.add_image_barrier()? = ImageBarrier {
                        src_access: Access::TRANSFER_READ
                            | Access::TRANSFER_WRITE
                            | Access::INPUT_ATTACHMENT_READ
                            | attachment_access,
                        dst_access: Access::TRANSFER_READ
                            | Access::TRANSFER_WRITE
                            | Access::SHADER_READ
                            | Access::INPUT_ATTACHMENT_READ
                            | attachment_access,
                        old_layout: attachment_layout(format),
                        new_layout: texture.layout(),
                        image: texture.native(),
                        range: SubresourceRange::mip(
                            texture.aspect(),
                            *mip_level,
                            base_layer,
                            layers,
                        ),
                    };
                }
                FramebufferSurface::RenderSurface(surface) => {
                    self.used.add_tracked(surface)?;
                }
            }
        }
        self.used.add_tracked(framebuffer)?;

        let stages = framebuffer_stages(self.device.config());
        let cmd = self.primary_buffer()?;
        self.barriers
            .submit(self.device.backend(), cmd, stages, stages)
    }

    //===------------------------------------------------------------------===//
    // Render surfaces
    //===------------------------------------------------------------------===//

    /// Transitions a window surface image for drawing. Must be balanced by
    /// [`CommandBuffer::end_render_surface`] before the command buffer ends.
    pub fn begin_render_surface(&mut self, surface: &Arc<RenderSurface>) -> Result<()> {
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot begin drawing to a render surface inside of a render pass.",
            ));
        }
        if self.bound_surface.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot begin drawing to a render surface while another is bound.",
            ));
        }
        if self.bound_shader.is_some() || self.bound_compute_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot begin drawing to a render surface while a shader is bound.",
            ));
        }

        let cmd = self.primary_buffer()?;
        let barrier = ImageBarrier {
            src_access: Access::NONE,
            dst_access: RENDER_SURFACE_ACCESS,
            old_layout: Layout::Undefined,
            new_layout: Layout::ColorAttachment,
            image: surface.image(),
            range: SubresourceRange::whole(Aspect::COLOR),
        };
        self.device.backend().pipeline_barrier(
            cmd,
            Stage::TOP_OF_PIPE,
            RENDER_SURFACE_STAGES,
            &[],
            &[],
            std::slice::from_ref(&barrier),
        )?;
        self.render_surfaces.add(surface)?;
        self.bound_surface = Some(Arc::clone(surface));
        Ok(())
    }

    pub fn end_render_surface(&mut self, surface: &Arc<RenderSurface>) -> Result<()> {
        match &self.bound_surface {
            Some(bound) if Arc::ptr_eq(bound, surface) => {}
            _ => {
                return Err(GPUError::permission_denied(
                    "Can only end drawing to the currently bound render surface.",
                ))
            }
        }
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot end drawing to a render surface inside of a render pass.",
            ));
        }
        if self.bound_shader.is_some() || self.bound_compute_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot end drawing to a render surface while a shader is bound.",
            ));
        }

        let cmd = self.primary_buffer()?;
        let barrier = ImageBarrier {
            src_access: RENDER_SURFACE_ACCESS,
            dst_access: Access::NONE,
            old_layout: Layout::ColorAttachment,
            new_layout: Layout::Present,
            image: surface.image(),
            range: SubresourceRange::whole(Aspect::COLOR),
        };
        self.device.backend().pipeline_barrier(
            cmd,
            RENDER_SURFACE_STAGES,
            Stage::BOTTOM_OF_PIPE,
            &[],
            &[],
            std::slice::from_ref(&barrier),
        )?;
        self.bound_surface = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_detection() {
        let keep = AttachmentInfo {
            format: Format::RGBA8Unorm,
            usage: AttachmentUsage::KEEP_AFTER,
            samples: 1,
        };
        let pass = RenderPass::new(NativeRenderPass(1), vec![keep], 0);
        assert_eq!(pass.subpass_count(), 1);
        assert!(!pass.clears_attachments());

        let clear = AttachmentInfo {
            usage: AttachmentUsage::CLEAR,
            ..keep
        };
        let pass = RenderPass::new(NativeRenderPass(1), vec![keep, clear], 2);
        assert!(pass.clears_attachments());
    }

    #[test]
    fn viewport_range() {
        let fb = Framebuffer::new(NativeFramebuffer(1), Vec::new(), 64, 32, 1);
        let full = Viewport {
            width: 64.0,
            height: 32.0,
            ..Default::default()
        };
        assert!(viewport_in_range(&full, &fb));
        let wide = Viewport {
            width: 65.0,
            ..full
        };
        assert!(!viewport_in_range(&wide, &fb));
        let deep = Viewport {
            max_depth: 1.5,
            ..full
        };
        assert!(!viewport_in_range(&deep, &fb));
    }
}
