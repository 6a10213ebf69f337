//! Transfers recorded outside of render passes: buffer updates and copies, texture uploads,
//! copies and blits, mipmap generation and surface clears.
//!
//! Every transfer is wrapped in copy barriers emitted right away: textures leave their resting
//! layout for a transfer layout and come back afterwards, buffers get write-to-transfer and
//! transfer-to-read dependencies.

use std::sync::Arc;

use bytemuck::Pod;
use smallvec::SmallVec;

use crate::gpu::driver::command::{
    Backend, BufferCopy, BufferImageCopy, Extent3D, ImageBlit, ImageCopy, ImageSubresourceLayers,
    Offset3D,
};
use crate::gpu::driver::state::{
    buffer_read_access, buffer_write_access, framebuffer_stages, shader_stages,
};
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::{Buffer, Texture};
use crate::sync::barrier_batch::{BufferBarrier, ImageBarrier};
use crate::sync::state::{Access, Layout, Stage, SubresourceRange};

use super::CommandBuffer;

/// Largest update recorded inline into the command buffer.
pub const MAX_BUFFER_UPDATE_SIZE: usize = 65_536;

/// Texel position inside a texture. `depth` is the array layer, or the slice for 3D textures.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TexturePosition {
    pub face: u32,
    pub x: u32,
    pub y: u32,
    pub depth: u32,
    pub mip_level: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureCopyRegion {
    pub src: TexturePosition,
    pub dst: TexturePosition,
    pub width: u32,
    pub height: u32,
    /// Array layers, or slices for 3D textures.
    pub layers: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureBlitRegion {
    pub src: TexturePosition,
    pub dst: TexturePosition,
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
    pub layers: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum Role {
    Src,
    Dst,
}

impl Role {
    fn layout(self) -> Layout {
        match self {
            Role::Src => Layout::TransferSrc,
            Role::Dst => Layout::TransferDst,
        }
    }

    fn access(self) -> Access {
        match self {
            Role::Src => Access::TRANSFER_READ,
            Role::Dst => Access::TRANSFER_WRITE,
        }
    }
}

/// Every access a texture may see outside of transfers.
fn resting_access(texture: &Texture) -> Access {
    let mut access = Access::SHADER_READ | Access::TRANSFER_READ | Access::TRANSFER_WRITE;
    if texture.usage().contains(TextureUsage::IMAGE) {
        access |= Access::SHADER_WRITE;
    }
    if texture.is_offscreen() {
        access |= if texture.info().format.is_depth_stencil() {
            Access::DEPTH_STENCIL_ATTACHMENT_READ | Access::DEPTH_STENCIL_ATTACHMENT_WRITE
        } else {
            Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE
        };
    }
    access
}

fn buffer_stages(stages: Stage) -> Stage {
    stages | Stage::VERTEX_INPUT | Stage::DRAW_INDIRECT | Stage::TRANSFER
}

/// Subresource and offset of `pos`, covering `layers` layers (or slices for 3D textures).
fn subresource(
    texture: &Texture,
    pos: &TexturePosition,
    layers: u32,
) -> (ImageSubresourceLayers, Offset3D) {
    let info = texture.info();
    let volume = info.dimension == TextureDim::Dim3D;
    let subresource = ImageSubresourceLayers {
        aspect: texture.aspect(),
        mip_level: pos.mip_level,
        base_layer: if volume {
            0
        } else {
            pos.depth * info.faces() + pos.face
        },
        layer_count: if volume { 1 } else { layers.max(1) },
    };
    let offset = Offset3D {
        x: pos.x as i32,
        y: pos.y as i32,
        z: if volume { pos.depth as i32 } else { 0 },
    };
    (subresource, offset)
}

fn slices(texture: &Texture, layers: u32) -> u32 {
    if texture.info().dimension == TextureDim::Dim3D {
        layers.max(1)
    } else {
        1
    }
}

fn check_region(
    texture: &Texture,
    pos: &TexturePosition,
    width: u32,
    height: u32,
    layers: u32,
) -> Result<()> {
    let info = texture.info();
    let out_of_range = || GPUError::out_of_range("Attempting to copy texture data out of range.");
    if pos.mip_level >= info.mip_levels.max(1) {
        return Err(out_of_range());
    }

    let (mip_width, mip_height, mip_depth) = info.mip_extent(pos.mip_level);
    let layers = layers.max(1);
    let fits_x = pos.x.checked_add(width).map_or(false, |end| end <= mip_width);
    let fits_y = pos.y.checked_add(height).map_or(false, |end| end <= mip_height);
    let fits_layers = if info.dimension == TextureDim::Dim3D {
        pos.face == 0 && pos.depth.checked_add(layers).map_or(false, |end| end <= mip_depth)
    } else {
        pos.face < info.faces()
            && (pos.depth * info.faces() + pos.face)
                .checked_add(layers)
                .map_or(false, |end| end <= info.layer_count())
    };
    if !fits_x || !fits_y || !fits_layers {
        return Err(out_of_range());
    }
    Ok(())
}

pub(super) fn range(end: u64, offset: u64, size: u64) -> bool {
    offset.checked_add(size).map_or(false, |last| last <= end)
}

impl<B: Backend> CommandBuffer<B> {
    pub(super) fn check_outside_pass(&self, what: &str) -> Result<()> {
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(format!(
                "{} must be performed outside of a render pass.",
                what
            )));
        }
        Ok(())
    }

    fn queue_image_transition(
        &mut self,
        texture: &Texture,
        range: SubresourceRange,
        role: Role,
        entering: bool,
    ) -> Result<()> {
        let (src_access, dst_access, old_layout, new_layout) = if entering {
            (resting_access(texture), role.access(), texture.layout(), role.layout())
        } else {
            (role.access(), resting_access(texture), role.layout(), texture.layout())
        };
        *self.copy_barriers.add_image_barrier()? = ImageBarrier {
            src_access,
            dst_access,
            old_layout,
            new_layout,
            image: texture.native(),
            range,
        };
        Ok(())
    }

    pub(super) fn queue_buffer_transfer(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        size: u64,
        role: Role,
        entering: bool,
    ) -> Result<()> {
        let usage = buffer.usage();
        let other = buffer_write_access(usage, buffer.can_map()) | buffer_read_access(usage);
        let (src_access, dst_access) = if entering {
            (other, role.access())
        } else {
            (role.access(), buffer_read_access(usage))
        };
        *self.copy_barriers.add_buffer_barrier()? = BufferBarrier {
            src_access,
            dst_access,
            buffer: buffer.native(),
            offset,
            size,
        };
        Ok(())
    }

    /// Emits pending copy barriers. `entering` barriers wait on every stage and unblock
    /// transfers; the others do the reverse.
    pub(super) fn flush_copy_barriers(&mut self, cmd: NativeCommandBuffer, entering: bool) -> Result<()> {
        let config = self.device.config();
        let others = buffer_stages(framebuffer_stages(config) | shader_stages(config));
        let (src, dst) = if entering {
            (others, Stage::TRANSFER)
        } else {
            (Stage::TRANSFER, others)
        };
        self.copy_barriers
            .submit(self.device.backend(), cmd, src, dst)
    }

    //===------------------------------------------------------------------===//
    // Buffers
    //===------------------------------------------------------------------===//

    /// Writes `data` into `buffer` at `offset` through the command stream. Limited to
    /// [`MAX_BUFFER_UPDATE_SIZE`] bytes, with offset and size multiples of 4.
    pub fn copy_buffer_data(&mut self, buffer: &Arc<Buffer>, offset: u64, data: &[u8]) -> Result<()> {
        self.check_outside_pass("Buffer copying")?;
        if !buffer.usage().contains(BufferUsage::COPY_TO) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data to a buffer without the copy to usage flag set.",
            ));
        }
        if data.is_empty() || data.len() > MAX_BUFFER_UPDATE_SIZE {
            return Err(GPUError::invalid_argument(format!(
                "Buffer data updates must be between 1 and {} bytes.",
                MAX_BUFFER_UPDATE_SIZE
            )));
        }
        if offset % 4 != 0 || data.len() % 4 != 0 {
            return Err(GPUError::invalid_argument(
                "Buffer data updates must be aligned to 4 bytes.",
            ));
        }
        let size = data.len() as u64;
        if !range(buffer.size(), offset, size) {
            return Err(GPUError::out_of_range(
                "Attempting to copy buffer data out of range.",
            ));
        }

        let cmd = self.get_command_buffer()?;
        self.queue_buffer_transfer(buffer, offset, size, Role::Dst, true)?;
        self.flush_copy_barriers(cmd, true)?;
        self.device.backend().update_buffer(cmd, buffer.native(), offset, data)?;
        self.queue_buffer_transfer(buffer, offset, size, Role::Dst, false)?;
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(buffer)?;
        Ok(())
    }

    /// [`CommandBuffer::copy_buffer_data`] for plain-old-data values.
    pub fn copy_buffer_data_pod<T: Pod>(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        values: &[T],
    ) -> Result<()> {
        self.copy_buffer_data(buffer, offset, bytemuck::cast_slice(values))
    }

    pub fn copy_buffer(
        &mut self,
        src: &Arc<Buffer>,
        dst: &Arc<Buffer>,
        regions: &[BufferCopy],
    ) -> Result<()> {
        self.check_outside_pass("Buffer copying")?;
        if !src.usage().contains(BufferUsage::COPY_FROM) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data from a buffer without the copy from usage flag set.",
            ));
        }
        if !dst.usage().contains(BufferUsage::COPY_TO) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data to a buffer without the copy to usage flag set.",
            ));
        }
        for region in regions {
            if !range(src.size(), region.src_offset, region.size)
                || !range(dst.size(), region.dst_offset, region.size)
            {
                return Err(GPUError::out_of_range(
                    "Attempting to copy buffer data out of range.",
                ));
            }
        }
        if regions.is_empty() {
            return Ok(());
        }

        let cmd = self.get_command_buffer()?;
        for region in regions {
            self.queue_buffer_transfer(src, region.src_offset, region.size, Role::Src, true)?;
            self.queue_buffer_transfer(dst, region.dst_offset, region.size, Role::Dst, true)?;
        }
        self.flush_copy_barriers(cmd, true)?;
        self.device
            .backend()
            .copy_buffer(cmd, src.native(), dst.native(), regions)?;
        for region in regions {
            self.queue_buffer_transfer(dst, region.dst_offset, region.size, Role::Dst, false)?;
        }
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(src)?;
        self.used.add_tracked(dst)?;
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Textures
    //===------------------------------------------------------------------===//

    /// Uploads a `width` x `height` x `layers` block from `staging` into `texture` at
    /// `position`. Texel data is tightly packed.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_texture_data(
        &mut self,
        texture: &Arc<Texture>,
        position: &TexturePosition,
        width: u32,
        height: u32,
        layers: u32,
        staging: &Arc<Buffer>,
        staging_offset: u64,
    ) -> Result<()> {
        self.check_outside_pass("Texture copying")?;
        if !texture.usage().contains(TextureUsage::COPY_TO) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data to a texture without the copy to usage flag set.",
            ));
        }
        if !staging.usage().contains(BufferUsage::COPY_FROM) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data from a buffer without the copy from usage flag set.",
            ));
        }
        check_region(texture, position, width, height, layers)?;
        let format = texture.info().format;
        let block = format
            .block_size()
            .ok_or_else(|| GPUError::unsupported_format(format))?;
        let size = u64::from(width) * u64::from(height) * u64::from(layers.max(1)) * u64::from(block);
        if !range(staging.size(), staging_offset, size) {
            return Err(GPUError::out_of_range(
                "Attempting to copy texture data out of the staging buffer range.",
            ));
        }

        let (image_subresource, image_offset) = subresource(texture, position, layers);
        let region = BufferImageCopy {
            buffer_offset: staging_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource,
            image_offset,
            image_extent: Extent3D {
                width,
                height,
                depth: slices(texture, layers),
            },
        };
        let range = SubresourceRange::mip(
            image_subresource.aspect,
            position.mip_level,
            image_subresource.base_layer,
            image_subresource.layer_count,
        );

        let cmd = self.get_command_buffer()?;
        self.queue_buffer_transfer(staging, staging_offset, size, Role::Src, true)?;
        self.queue_image_transition(texture, range, Role::Dst, true)?;
        self.flush_copy_barriers(cmd, true)?;
        self.device.backend().copy_buffer_to_image(
            cmd,
            staging.native(),
            texture.native(),
            Layout::TransferDst,
            std::slice::from_ref(&region),
        )?;
        self.queue_image_transition(texture, range, Role::Dst, false)?;
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(staging)?;
        self.used.add_tracked(texture)?;
        Ok(())
    }

    pub fn copy_texture(
        &mut self,
        src: &Arc<Texture>,
        dst: &Arc<Texture>,
        regions: &[TextureCopyRegion],
    ) -> Result<()> {
        self.check_outside_pass("Texture copying")?;
        self.check_texture_pair(src, dst)?;
        for region in regions {
            check_region(src, &region.src, region.width, region.height, region.layers)?;
            check_region(dst, &region.dst, region.width, region.height, region.layers)?;
        }
        if regions.is_empty() {
            return Ok(());
        }

        let mut copies: SmallVec<[ImageCopy; 4]> = SmallVec::new();
        let mut ranges: SmallVec<[(SubresourceRange, SubresourceRange); 4]> = SmallVec::new();
        for region in regions {
            let (src_subresource, src_offset) = subresource(src, &region.src, region.layers);
            let (dst_subresource, dst_offset) = subresource(dst, &region.dst, region.layers);
            copies.push(ImageCopy {
                src_subresource,
                src_offset,
                dst_subresource,
                dst_offset,
                extent: Extent3D {
                    width: region.width,
                    height: region.height,
                    depth: slices(src, region.layers),
                },
            });
            ranges.push((
                layers_range(&src_subresource),
                layers_range(&dst_subresource),
            ));
        }

        let cmd = self.get_command_buffer()?;
        for (src_range, dst_range) in &ranges {
            self.queue_image_transition(src, *src_range, Role::Src, true)?;
            self.queue_image_transition(dst, *dst_range, Role::Dst, true)?;
        }
        self.flush_copy_barriers(cmd, true)?;
        self.device.backend().copy_image(
            cmd,
            src.native(),
            Layout::TransferSrc,
            dst.native(),
            Layout::TransferDst,
            &copies,
        )?;
        for (src_range, dst_range) in &ranges {
            self.queue_image_transition(src, *src_range, Role::Src, false)?;
            self.queue_image_transition(dst, *dst_range, Role::Dst, false)?;
        }
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(src)?;
        self.used.add_tracked(dst)?;
        Ok(())
    }

    /// Scaled copy between textures, filtered with `filter`.
    pub fn blit_texture(
        &mut self,
        src: &Arc<Texture>,
        dst: &Arc<Texture>,
        regions: &[TextureBlitRegion],
        filter: Filter,
    ) -> Result<()> {
        self.check_outside_pass("Surface blitting")?;
        self.check_texture_pair(src, dst)?;
        for region in regions {
            check_region(src, &region.src, region.src_width, region.src_height, region.layers)?;
            check_region(dst, &region.dst, region.dst_width, region.dst_height, region.layers)?;
        }
        if regions.is_empty() {
            return Ok(());
        }

        let mut blits: SmallVec<[ImageBlit; 4]> = SmallVec::new();
        let mut ranges: SmallVec<[(SubresourceRange, SubresourceRange); 4]> = SmallVec::new();
        for region in regions {
            let (src_subresource, src_offset) = subresource(src, &region.src, region.layers);
            let (dst_subresource, dst_offset) = subresource(dst, &region.dst, region.layers);
            let depth = slices(src, region.layers) as i32;
            blits.push(ImageBlit {
                src_subresource,
                src_offsets: [
                    src_offset,
                    Offset3D {
                        x: src_offset.x + region.src_width as i32,
                        y: src_offset.y + region.src_height as i32,
                        z: src_offset.z + depth,
                    },
                ],
                dst_subresource,
                dst_offsets: [
                    dst_offset,
                    Offset3D {
                        x: dst_offset.x + region.dst_width as i32,
                        y: dst_offset.y + region.dst_height as i32,
                        z: dst_offset.z + depth,
                    },
                ],
            });
            ranges.push((
                layers_range(&src_subresource),
                layers_range(&dst_subresource),
            ));
        }

        let cmd = self.get_command_buffer()?;
        for (src_range, dst_range) in &ranges {
            self.queue_image_transition(src, *src_range, Role::Src, true)?;
            self.queue_image_transition(dst, *dst_range, Role::Dst, true)?;
        }
        self.flush_copy_barriers(cmd, true)?;
        self.device.backend().blit_image(
            cmd,
            src.native(),
            Layout::TransferSrc,
            dst.native(),
            Layout::TransferDst,
            &blits,
            filter,
        )?;
        for (src_range, dst_range) in &ranges {
            self.queue_image_transition(src, *src_range, Role::Src, false)?;
            self.queue_image_transition(dst, *dst_range, Role::Dst, false)?;
        }
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(src)?;
        self.used.add_tracked(dst)?;
        Ok(())
    }

    fn check_texture_pair(&self, src: &Arc<Texture>, dst: &Arc<Texture>) -> Result<()> {
        if Arc::ptr_eq(src, dst) {
            return Err(GPUError::invalid_argument(
                "Source and destination textures must differ.",
            ));
        }
        if !src.usage().contains(TextureUsage::COPY_FROM) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data from a texture without the copy from usage flag set.",
            ));
        }
        if !dst.usage().contains(TextureUsage::COPY_TO) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data to a texture without the copy to usage flag set.",
            ));
        }
        Ok(())
    }

    /// Fills every mip level below the first by blitting down from the level above.
    pub fn generate_mipmaps(&mut self, texture: &Arc<Texture>) -> Result<()> {
        self.check_outside_pass("Generating mipmaps")?;
        let usage = texture.usage();
        if !usage.contains(TextureUsage::COPY_FROM | TextureUsage::COPY_TO) {
            return Err(GPUError::invalid_argument(
                "Generating mipmaps requires both the copy from and copy to usage flags.",
            ));
        }
        let info = *texture.info();
        if info.mip_levels <= 1 {
            return Ok(());
        }

        let aspect = texture.aspect();
        let layers = info.layer_count();
        let cmd = self.get_command_buffer()?;
        self.queue_image_transition(texture, SubresourceRange::whole(aspect), Role::Dst, true)?;
        self.flush_copy_barriers(cmd, true)?;

        for level in 1..info.mip_levels {
            *self.copy_barriers.add_image_barrier()? = ImageBarrier {
                src_access: Access::TRANSFER_WRITE,
                dst_access: Access::TRANSFER_READ,
                old_layout: Layout::TransferDst,
                new_layout: Layout::TransferSrc,
                image: texture.native(),
                range: SubresourceRange::mip(aspect, level - 1, 0, layers),
            };
            self.copy_barriers.submit(
                self.device.backend(),
                cmd,
                Stage::TRANSFER,
                Stage::TRANSFER,
            )?;

            let (src_w, src_h, src_d) = info.mip_extent(level - 1);
            let (dst_w, dst_h, dst_d) = info.mip_extent(level);
            let blit = ImageBlit {
                src_subresource: ImageSubresourceLayers {
                    aspect,
                    mip_level: level - 1,
                    base_layer: 0,
                    layer_count: layers,
                },
                src_offsets: [
                    Offset3D::default(),
                    Offset3D {
                        x: src_w as i32,
                        y: src_h as i32,
                        z: src_d as i32,
                    },
                ],
                dst_subresource: ImageSubresourceLayers {
                    aspect,
                    mip_level: level,
                    base_layer: 0,
                    layer_count: layers,
                },
                dst_offsets: [
                    Offset3D::default(),
                    Offset3D {
                        x: dst_w as i32,
                        y: dst_h as i32,
                        z: dst_d as i32,
                    },
                ],
            };
            self.device.backend().blit_image(
                cmd,
                texture.native(),
                Layout::TransferSrc,
                texture.native(),
                Layout::TransferDst,
                std::slice::from_ref(&blit),
                Filter::Linear,
            )?;
        }

        let last = info.mip_levels - 1;
        let upper = SubresourceRange {
            level_count: last,
            ..SubresourceRange::whole(aspect)
        };
        self.queue_image_transition(texture, upper, Role::Src, false)?;
        self.queue_image_transition(
            texture,
            SubresourceRange::mip(aspect, last, 0, layers),
            Role::Dst,
            false,
        )?;
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(texture)?;
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Clears
    //===------------------------------------------------------------------===//

    pub fn clear_color_surface(&mut self, texture: &Arc<Texture>, color: &ClearValue) -> Result<()> {
        self.check_outside_pass("Clearing")?;
        if texture.info().format.is_depth_stencil() || matches!(color, ClearValue::DepthStencil { .. })
        {
            return Err(GPUError::invalid_argument(
                "Color clears need a color texture and a color value.",
            ));
        }

        let range = SubresourceRange::whole(texture.aspect());
        let cmd = self.get_command_buffer()?;
        self.queue_image_transition(texture, range, Role::Dst, true)?;
        self.flush_copy_barriers(cmd, true)?;
        self.device.backend().clear_color_image(
            cmd,
            texture.native(),
            Layout::TransferDst,
            color,
            std::slice::from_ref(&range),
        )?;
        self.queue_image_transition(texture, range, Role::Dst, false)?;
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(texture)?;
        Ok(())
    }

    pub fn clear_depth_stencil_surface(
        &mut self,
        texture: &Arc<Texture>,
        depth: f32,
        stencil: u32,
    ) -> Result<()> {
        self.check_outside_pass("Clearing")?;
        if !texture.info().format.is_depth_stencil() {
            return Err(GPUError::invalid_argument(
                "Depth-stencil clears need a depth or stencil texture.",
            ));
        }

        let range = SubresourceRange::whole(texture.aspect());
        let cmd = self.get_command_buffer()?;
        self.queue_image_transition(texture, range, Role::Dst, true)?;
        self.flush_copy_barriers(cmd, true)?;
        self.device.backend().clear_depth_stencil_image(
            cmd,
            texture.native(),
            Layout::TransferDst,
            depth,
            stencil,
            std::slice::from_ref(&range),
        )?;
        self.queue_image_transition(texture, range, Role::Dst, false)?;
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(texture)?;
        Ok(())
    }
}

fn layers_range(layers: &ImageSubresourceLayers) -> SubresourceRange {
    SubresourceRange::mip(
        layers.aspect,
        layers.mip_level,
        layers.base_layer,
        layers.layer_count,
    )
}
