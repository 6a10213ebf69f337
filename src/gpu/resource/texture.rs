use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::gpu::driver::state::{image_aspect, texture_layout};
use crate::gpu::driver::types::*;
use crate::gpu::error::Result;
use crate::sync::barrier_batch::{BarrierBatch, ImageBarrier};
use crate::sync::state::{Access, Aspect, Layout, SubresourceRange};

use super::{GpuResource, Tracked, NOT_SUBMITTED};

pub struct Texture {
    resource: GpuResource,
    native: NativeImage,
    view: NativeImageView,
    /// Host-visible copy target for offscreens that can be read back.
    host_image: Option<NativeImage>,
    info: TextureInfo,
    usage: TextureUsage,
    offscreen: bool,
    last_draw_submit: AtomicU64,
}

impl Texture {
    pub fn new(
        native: NativeImage,
        view: NativeImageView,
        info: TextureInfo,
        usage: TextureUsage,
    ) -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
            native,
            view,
            host_image: None,
            info,
            usage,
            offscreen: false,
            last_draw_submit: AtomicU64::new(NOT_SUBMITTED),
        })
    }

    /// Render target texture. Passing a `host_image` makes it readable from the host.
    pub fn offscreen(
        native: NativeImage,
        view: NativeImageView,
        info: TextureInfo,
        usage: TextureUsage,
        host_image: Option<NativeImage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
            native,
            view,
            host_image,
            info,
            usage,
            offscreen: true,
            last_draw_submit: AtomicU64::new(NOT_SUBMITTED),
        })
    }

    pub fn native(&self) -> NativeImage {
        self.native
    }

    pub fn view(&self) -> NativeImageView {
        self.view
    }

    pub fn host_image(&self) -> Option<NativeImage> {
        self.host_image
    }

    pub fn info(&self) -> &TextureInfo {
        &self.info
    }

    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    pub fn is_offscreen(&self) -> bool {
        self.offscreen
    }

    pub fn can_read_back(&self) -> bool {
        self.offscreen && self.host_image.is_some()
    }

    /// Subpass inputs that are never sampled stay in their attachment layout.
    pub fn only_subpass_input(&self) -> bool {
        self.usage.contains(TextureUsage::SUBPASS_INPUT)
            && !self
                .usage
                .intersects(TextureUsage::TEXTURE | TextureUsage::IMAGE | TextureUsage::COPY_FROM)
    }

    pub fn layout(&self) -> Layout {
        texture_layout(self.usage, self.can_read_back())
    }

    pub fn aspect(&self) -> Aspect {
        image_aspect(self.info.format)
    }

    /// Queues a barrier making prior GPU writes visible to shader reads. Textures only ever
    /// written by the host need none.
    pub fn add_memory_barrier(&self, barriers: &mut BarrierBatch) -> Result<()> {
        let mut src_access = Access::NONE;
        if self.usage.contains(TextureUsage::IMAGE) {
            src_access |= Access::SHADER_WRITE;
        }
        if self.usage.contains(TextureUsage::COPY_TO) {
            src_access |= Access::TRANSFER_WRITE;
        }
        if self.offscreen {
            src_access |= if self.info.format.is_depth_stencil() {
                Access::DEPTH_STENCIL_ATTACHMENT_WRITE
            } else {
                Access::COLOR_ATTACHMENT_WRITE
            };
        }
        if src_access.is_empty() {
            return Ok(());
        }

        let mut dst_access = Access::SHADER_READ;
        if self.usage.contains(TextureUsage::IMAGE) {
            dst_access |= Access::SHADER_WRITE;
        }
        let layout = self.layout();
        let barrier = ImageBarrier {
            src_access,
            dst_access,
            old_layout: layout,
            new_layout: layout,
            image: self.native,
            range: SubresourceRange::whole(self.aspect()),
        };
        if barriers.recently_added_image(&barrier) {
            return Ok(());
        }
        *barriers.add_image_barrier()? = barrier;
        Ok(())
    }

    pub fn last_draw_submit(&self) -> u64 {
        self.last_draw_submit.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_draw_submit(&self, submit: u64) {
        self.last_draw_submit.store(submit, Ordering::Release);
    }
}

impl Tracked for Texture {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        let mut objects = SmallVec::new();
        objects.push(NativeObject::ImageView(self.view));
        objects.push(NativeObject::Image(self.native));
        if let Some(host) = self.host_image {
            objects.push(NativeObject::Image(host));
        }
        objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readback_offscreens_rest_in_general() {
        let info = TextureInfo::default();
        let sampled = Texture::new(
            NativeImage(1),
            NativeImageView(2),
            info,
            TextureUsage::TEXTURE,
        );
        assert_eq!(sampled.layout(), Layout::ShaderReadOnly);

        let readback = Texture::offscreen(
            NativeImage(3),
            NativeImageView(4),
            info,
            TextureUsage::TEXTURE,
            Some(NativeImage(5)),
        );
        assert!(readback.can_read_back());
        assert_eq!(readback.layout(), Layout::General);
        assert_eq!(readback.native_objects().len(), 3);
    }

    #[test]
    fn subpass_only_textures() {
        let t = Texture::offscreen(
            NativeImage(1),
            NativeImageView(2),
            TextureInfo::default(),
            TextureUsage::SUBPASS_INPUT,
            None,
        );
        assert!(t.only_subpass_input());
        assert_eq!(t.last_draw_submit(), NOT_SUBMITTED);
    }

    #[test]
    fn storage_images_get_a_barrier_once() {
        let t = Texture::new(
            NativeImage(1),
            NativeImageView(2),
            TextureInfo::default(),
            TextureUsage::IMAGE,
        );
        let mut batch = BarrierBatch::new(10);
        t.add_memory_barrier(&mut batch).unwrap();
        t.add_memory_barrier(&mut batch).unwrap();
        assert_eq!(batch.images().len(), 1);
        assert_eq!(batch.images()[0].old_layout, Layout::General);

        let sampled = Texture::new(
            NativeImage(3),
            NativeImageView(4),
            TextureInfo::default(),
            TextureUsage::TEXTURE,
        );
        sampled.add_memory_barrier(&mut batch).unwrap();
        assert_eq!(batch.images().len(), 1);
    }
}
