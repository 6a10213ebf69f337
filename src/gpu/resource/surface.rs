use std::sync::Arc;

use smallvec::SmallVec;

use crate::gpu::driver::types::*;

use super::{GpuResource, Texture, Tracked};

/// Window surface image. The swapchain that owns it lives outside this crate.
pub struct RenderSurface {
    resource: GpuResource,
    image: NativeImage,
    view: NativeImageView,
    format: Format,
    width: u32,
    height: u32,
}

impl RenderSurface {
    pub fn new(
        image: NativeImage,
        view: NativeImageView,
        format: Format,
        width: u32,
        height: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
            image,
            view,
            format,
            width,
            height,
        })
    }

    pub fn image(&self) -> NativeImage {
        self.image
    }

    pub fn view(&self) -> NativeImageView {
        self.view
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Tracked for RenderSurface {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        SmallVec::new()
    }
}

#[derive(Clone)]
pub enum FramebufferSurface {
    Offscreen {
        texture: Arc<Texture>,
        mip_level: u32,
        layer: u32,
        cube_face: u32,
    },
    RenderSurface(Arc<RenderSurface>),
}

impl FramebufferSurface {
    pub fn offscreen(texture: Arc<Texture>) -> Self {
        FramebufferSurface::Offscreen {
            texture,
            mip_level: 0,
            layer: 0,
            cube_face: 0,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            FramebufferSurface::Offscreen { texture, .. } => texture.info().format,
            FramebufferSurface::RenderSurface(surface) => surface.format(),
        }
    }
}

pub struct Framebuffer {
    resource: GpuResource,
    native: NativeFramebuffer,
    surfaces: Vec<FramebufferSurface>,
    width: u32,
    height: u32,
    layers: u32,
}

impl Framebuffer {
    pub fn new(
        native: NativeFramebuffer,
        surfaces: Vec<FramebufferSurface>,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
            native,
            surfaces,
            width,
            height,
            layers: layers.max(1),
        })
    }

    pub fn native(&self) -> NativeFramebuffer {
        self.native
    }

    pub fn surfaces(&self) -> &[FramebufferSurface] {
        &self.surfaces
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }
}

impl Tracked for Framebuffer {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        SmallVec::from_elem(NativeObject::Framebuffer(self.native), 1)
    }
}

/// Native query pool of a single [`QueryType`].
pub struct QueryPool {
    resource: GpuResource,
    native: NativeQueryPool,
    ty: QueryType,
    count: u32,
}

impl QueryPool {
    pub fn new(native: NativeQueryPool, ty: QueryType, count: u32) -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
            native,
            ty,
            count,
        })
    }

    pub fn native(&self) -> NativeQueryPool {
        self.native
    }

    pub fn query_type(&self) -> QueryType {
        self.ty
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Tracked for QueryPool {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        SmallVec::from_elem(NativeObject::QueryPool(self.native), 1)
    }
}
