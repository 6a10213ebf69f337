use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

#[cfg(feature = "strata-serde")]
use serde::{Deserialize, Serialize};

//===----------------------------------------------------------------------===//
// Native handles
//===----------------------------------------------------------------------===//

macro_rules! native_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(transparent)]
            #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: Self = Self(0);

                pub fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

native_handle! {
    NativeCommandBuffer;
    NativeCommandPool;
    NativeFence;
    NativeBuffer;
    NativeImage;
    NativeImageView;
    NativeBufferView;
    NativeSampler;
    NativeRenderPass;
    NativeFramebuffer;
    NativePipeline;
    NativePipelineLayout;
    /// Layout of one binding set.
    NativeBindingLayout;
    NativeBindingPool;
    NativeBindingSet;
    NativeQueryPool;
}

/// Native objects the backend can be asked to destroy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NativeObject {
    Buffer(NativeBuffer),
    Image(NativeImage),
    ImageView(NativeImageView),
    BufferView(NativeBufferView),
    Framebuffer(NativeFramebuffer),
    QueryPool(NativeQueryPool),
    BindingPool(NativeBindingPool),
    CommandPool(NativeCommandPool),
    Fence(NativeFence),
}

//===----------------------------------------------------------------------===//
// Formats and dimensions
//===----------------------------------------------------------------------===//

#[cfg_attr(feature = "strata-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Unknown,
    R8Unorm,
    R8Uint,
    R8Sint,
    RG8Unorm,
    RGBA8Unorm,
    RGBA8Srgb,
    BGRA8Unorm,
    R16Float,
    RGBA16Float,
    R32Uint,
    R32Float,
    RG32Float,
    RGBA32Float,
    D16,
    D32Float,
    S8,
    D24S8,
    D32S8Float,
}

impl Format {
    pub fn has_depth(self) -> bool {
        matches!(
            self,
            Format::D16 | Format::D32Float | Format::D24S8 | Format::D32S8Float
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::S8 | Format::D24S8 | Format::D32S8Float)
    }

    pub fn is_depth_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    /// Bytes per texel, `None` for [`Format::Unknown`].
    pub fn block_size(self) -> Option<u32> {
        let size = match self {
            Format::Unknown => return None,
            Format::R8Unorm | Format::R8Uint | Format::R8Sint | Format::S8 => 1,
            Format::RG8Unorm | Format::R16Float | Format::D16 => 2,
            Format::RGBA8Unorm
            | Format::RGBA8Srgb
            | Format::BGRA8Unorm
            | Format::R32Uint
            | Format::R32Float
            | Format::D32Float
            | Format::D24S8 => 4,
            Format::RGBA16Float | Format::RG32Float | Format::D32S8Float => 8,
            Format::RGBA32Float => 16,
        };
        Some(size)
    }
}

#[cfg_attr(feature = "strata-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureDim {
    Dim1D,
    #[default]
    Dim2D,
    Dim3D,
    Cube,
}

#[cfg_attr(feature = "strata-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureInfo {
    pub format: Format,
    pub dimension: TextureDim,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array layers otherwise. Zero means not an array.
    pub depth: u32,
    pub mip_levels: u32,
    pub samples: u32,
}

impl Default for TextureInfo {
    fn default() -> Self {
        Self {
            format: Format::RGBA8Unorm,
            dimension: TextureDim::Dim2D,
            width: 1,
            height: 1,
            depth: 0,
            mip_levels: 1,
            samples: 1,
        }
    }
}

impl TextureInfo {
    pub fn faces(&self) -> u32 {
        if self.dimension == TextureDim::Cube {
            6
        } else {
            1
        }
    }

    /// Array layers of the native image, counting cube faces.
    pub fn layer_count(&self) -> u32 {
        if self.dimension == TextureDim::Dim3D {
            1
        } else {
            self.depth.max(1) * self.faces()
        }
    }

    /// Extent of `level`, clamped to one texel.
    pub fn mip_extent(&self, level: u32) -> (u32, u32, u32) {
        let depth = if self.dimension == TextureDim::Dim3D {
            (self.depth.max(1) >> level).max(1)
        } else {
            1
        };
        (
            (self.width >> level).max(1),
            (self.height >> level).max(1),
            depth,
        )
    }
}

//===----------------------------------------------------------------------===//
// Usage flags
//===----------------------------------------------------------------------===//

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const INDEX = 0x001;
        const VERTEX = 0x002;
        const INDIRECT_DRAW = 0x004;
        const INDIRECT_DISPATCH = 0x008;
        const UNIFORM_BLOCK = 0x010;
        const UNIFORM_BUFFER = 0x020;
        const IMAGE = 0x040;
        const MUTABLE_IMAGE = 0x080;
        const COPY_FROM = 0x100;
        const COPY_TO = 0x200;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryHints: u32 {
        const GPU_ONLY = 0x01;
        const STATIC = 0x02;
        const DRAW = 0x04;
        const STREAM = 0x08;
        const READ = 0x10;
        const PERSISTENT = 0x20;
        /// Read maps wait for the GPU to finish with the buffer.
        const SYNCHRONIZE = 0x40;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const TEXTURE = 0x01;
        const IMAGE = 0x02;
        const SUBPASS_INPUT = 0x04;
        const COPY_FROM = 0x08;
        const COPY_TO = 0x10;
        const OFFSCREEN_CONTINUE = 0x20;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const PERSISTENT = 0x4;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandBufferUsage: u32 {
        const MULTI_SUBMIT = 0x1;
        const MULTI_FRAME = 0x2;
    }
}

impl CommandBufferUsage {
    pub fn is_single_use(self) -> bool {
        !self.intersects(CommandBufferUsage::MULTI_SUBMIT | CommandBufferUsage::MULTI_FRAME)
    }
}

//===----------------------------------------------------------------------===//
// Plain state
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    IntColor([i32; 4]),
    UintColor([u32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Color([0.0; 4])
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BindPoint {
    #[default]
    Graphics,
    Compute,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    #[default]
    U32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

#[cfg_attr(feature = "strata-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// Exact number of samples that passed depth and stencil tests.
    #[default]
    SamplesPassed,
    /// Non-zero when any sample passed. Implementations may still count.
    AnySamplesPassed,
    Timestamp,
}
