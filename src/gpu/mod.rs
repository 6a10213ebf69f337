//! Command recording and synchronization on top of an explicit graphics [`Backend`].
//!
//! A [`Device`] wraps a backend and owns submission numbering and deferred deletion. A
//! [`Renderer`] owns the device's main [`CommandBuffer`]; pooled command buffers record
//! independently and are submitted into it before a flush.

pub mod binding;
pub mod cmd;
pub mod config;
pub mod deferred;
pub mod device;
pub mod driver;
pub mod error;
pub mod null;
pub mod resource;
pub mod submit;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use binding::{
    BindingScope, ElementType, MaterialDesc, MaterialElement, MaterialValues, Shader,
    SharedBindingSets, ValueSource, VariableGroupDesc, VolatileBindingSets,
};
pub use cmd::{
    ActivePass, AttachmentInfo, AttachmentUsage, CommandBuffer, CommandBufferPool, RecorderKind,
    RenderPass, TextureBlitRegion, TextureCopyRegion, TexturePosition,
};
pub use config::{BindingPoolSizes, DeviceConfig};
pub use device::Device;
pub use driver::command::{Backend, BufferCopy, Draw, DrawIndexed, DrawIndirect, QueryCopy};
pub use driver::types::*;
pub use error::{clear_last_error, last_error, ErrorCode, GPUError, Result};
pub use null::{NullBackend, NullCall};
pub use resource::{
    Buffer, BufferDesc, FenceResult, Framebuffer, FramebufferSurface, GfxFence, GpuResource,
    QueryPool, RenderSurface, ResourceRef, Texture, Tracked,
};
pub use submit::Renderer;
#[cfg(feature = "vulkan")]
pub use vulkan::VulkanBackend;
