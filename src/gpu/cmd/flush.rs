use std::sync::Arc;

use smallvec::SmallVec;

use crate::gpu::driver::command::{Backend, Extent3D, ImageCopy, ImageSubresourceLayers};
use crate::gpu::driver::state::shader_stages;
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::Texture;
use crate::sync::barrier_batch::{BarrierBatch, ImageBarrier, MemoryBarrier};
use crate::sync::state::{Access, Layout, Stage, SubresourceRange};

use super::CommandBuffer;

/// One copy per mip level of a readback offscreen into its host image.
fn readback_regions(texture: &Texture) -> SmallVec<[ImageCopy; 4]> {
    let info = texture.info();
    let layer_count = if info.dimension == TextureDim::Dim3D {
        1
    } else {
        info.layer_count()
    };
    (0..info.mip_levels.max(1))
        .map(|level| {
            let (width, height, depth) = info.mip_extent(level);
            let subresource = ImageSubresourceLayers {
                aspect: texture.aspect(),
                mip_level: level,
                base_layer: 0,
                layer_count,
            };
            ImageCopy {
                src_subresource: subresource,
                src_offset: Default::default(),
                dst_subresource: subresource,
                dst_offset: Default::default(),
                extent: Extent3D {
                    width,
                    height,
                    depth,
                },
            }
        })
        .collect()
}

impl<B: Backend> CommandBuffer<B> {
    /// Copies every readback offscreen rendered to since the last flush into its host image.
    fn process_offscreen_readbacks(&mut self, cmd: NativeCommandBuffer) -> Result<()> {
        let readbacks: SmallVec<[Arc<Texture>; 4]> = self
            .readback_offscreens
            .iter()
            .filter(|t| t.host_image().is_some())
            .cloned()
            .collect();
        if readbacks.is_empty() {
            return Ok(());
        }

        for texture in &readbacks {
            let src_access = if texture.info().format.is_depth_stencil() {
                Access::DEPTH_STENCIL_ATTACHMENT_WRITE
            } else {
                Access::COLOR_ATTACHMENT_WRITE
            };
            *self.copy_barriers.add_image_barrier()? = ImageBarrier {
                src_access,
                dst_access: Access::TRANSFER_READ,
                old_layout: Layout::General,
                new_layout: Layout::General,
                image: texture.native(),
                range: SubresourceRange::whole(texture.aspect()),
            };
        }
        let src = Stage::COLOR_ATTACHMENT_OUTPUT | Stage::LATE_FRAGMENT_TESTS | Stage::TRANSFER;
        self.copy_barriers
            .submit(self.device.backend(), cmd, src, Stage::TRANSFER)?;

        for texture in &readbacks {
            let Some(host) = texture.host_image() else {
                continue;
            };
            self.device.backend().copy_image(
                cmd,
                texture.native(),
                Layout::General,
                host,
                Layout::General,
                &readback_regions(texture),
            )?;
        }
        log::debug!(
            target: "strata::render",
            "queued readback of {} offscreens",
            readbacks.len()
        );
        Ok(())
    }

    /// Readbacks and the host visibility barrier closing every submission.
    fn end_submit_commands(&mut self, cmd: NativeCommandBuffer) -> Result<()> {
        self.process_offscreen_readbacks(cmd)?;
        let stages = shader_stages(self.device.config());
        BarrierBatch::submit_memory(
            self.device.backend(),
            cmd,
            stages | Stage::TRANSFER,
            Stage::HOST,
            MemoryBarrier {
                src_access: Access::SHADER_WRITE | Access::TRANSFER_WRITE,
                dst_access: Access::HOST_READ,
            },
        )
    }

    /// Submits everything recorded on the main command buffer to the queue. Returns the new
    /// submission number, which every used resource now records as its last use.
    pub fn flush(&mut self) -> Result<u64> {
        if !self.is_primary() {
            return Err(GPUError::permission_denied(
                "Only the main command buffer can be flushed.",
            ));
        }
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot flush inside of a render pass.",
            ));
        }

        let device = Arc::clone(&self.device);
        device.wait_for_submit_slot()?;
        device.free_deferred();

        let cmd = self.primary_buffer()?;
        let stages = shader_stages(device.config()) | Stage::TRANSFER;
        self.barriers.submit(device.backend(), cmd, stages, stages)?;
        self.end_submit_commands(cmd)?;
        self.finish_command_buffer()?;

        let owner = Arc::clone(self.owner());
        self.used.add_tracked(&owner)?;
        let submit = device.queue_submit(&self.submit_buffers)?;

        self.submitted_resources(submit);
        self.submit_buffers.clear();
        self.fence_set = false;
        self.advance_slot(submit)?;
        Ok(submit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_readback_copies_every_face() {
        let info = TextureInfo {
            dimension: TextureDim::Cube,
            width: 8,
            height: 8,
            depth: 2,
            mip_levels: 2,
            ..Default::default()
        };
        let texture = Texture::offscreen(
            NativeImage(1),
            NativeImageView(2),
            info,
            TextureUsage::TEXTURE,
            Some(NativeImage(3)),
        );
        let regions = readback_regions(&texture);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].src_subresource.layer_count, 12);
        assert_eq!(regions[1].extent.width, 4);
        assert_eq!(regions[1].extent.depth, 1);
    }

    #[test]
    fn volume_readback_copies_slices() {
        let info = TextureInfo {
            dimension: TextureDim::Dim3D,
            width: 4,
            height: 4,
            depth: 4,
            ..Default::default()
        };
        let texture = Texture::offscreen(
            NativeImage(1),
            NativeImageView(2),
            info,
            TextureUsage::TEXTURE,
            Some(NativeImage(3)),
        );
        let regions = readback_regions(&texture);
        assert_eq!(regions[0].src_subresource.layer_count, 1);
        assert_eq!(regions[0].extent.depth, 4);
    }
}
