use crate::gpu::config::DeviceConfig;
use crate::sync::state::{Access, Aspect, Layout, Stage};

use super::types::{BufferUsage, Format, TextureUsage};

/// Access a buffer with `usage` may see when the GPU writes it.
pub fn buffer_write_access(usage: BufferUsage, can_map: bool) -> Access {
    let mut access = Access::NONE;
    if usage.intersects(BufferUsage::UNIFORM_BUFFER | BufferUsage::MUTABLE_IMAGE) {
        access |= Access::SHADER_WRITE;
    }
    if usage.contains(BufferUsage::COPY_TO) {
        access |= Access::TRANSFER_WRITE;
    }
    if can_map {
        access |= Access::HOST_WRITE;
    }
    access
}

/// Every way a buffer with `usage` can be read by the GPU.
pub fn buffer_read_access(usage: BufferUsage) -> Access {
    let mut access = Access::NONE;
    if usage.contains(BufferUsage::INDEX) {
        access |= Access::INDEX_READ;
    }
    if usage.contains(BufferUsage::VERTEX) {
        access |= Access::VERTEX_ATTRIBUTE_READ;
    }
    if usage.intersects(BufferUsage::INDIRECT_DRAW | BufferUsage::INDIRECT_DISPATCH) {
        access |= Access::INDIRECT_COMMAND_READ;
    }
    if usage.contains(BufferUsage::UNIFORM_BLOCK) {
        access |= Access::UNIFORM_READ;
    }
    if usage.intersects(
        BufferUsage::UNIFORM_BUFFER | BufferUsage::IMAGE | BufferUsage::MUTABLE_IMAGE,
    ) {
        access |= Access::SHADER_READ;
    }
    if usage.contains(BufferUsage::COPY_FROM) {
        access |= Access::TRANSFER_READ;
    }
    access
}

/// Whether GPU work can write into a buffer with this usage.
pub fn buffer_is_gpu_writable(usage: BufferUsage, can_map: bool) -> bool {
    can_map
        || usage.intersects(
            BufferUsage::COPY_TO | BufferUsage::MUTABLE_IMAGE | BufferUsage::UNIFORM_BUFFER,
        )
}

pub fn image_aspect(format: Format) -> Aspect {
    let mut aspect = Aspect::empty();
    if format.has_depth() {
        aspect |= Aspect::DEPTH;
    }
    if format.has_stencil() {
        aspect |= Aspect::STENCIL;
    }
    if aspect.is_empty() {
        Aspect::COLOR
    } else {
        aspect
    }
}

/// Layout a texture rests in between uses.
pub fn texture_layout(usage: TextureUsage, offscreen_readback: bool) -> Layout {
    if usage.contains(TextureUsage::IMAGE) || offscreen_readback {
        Layout::General
    } else {
        Layout::ShaderReadOnly
    }
}

/// Layout of a texture while bound as a framebuffer attachment.
pub fn attachment_layout(format: Format) -> Layout {
    if format.is_depth_stencil() {
        Layout::DepthStencilAttachment
    } else {
        Layout::ColorAttachment
    }
}

/// Every shader stage the device can run.
pub fn shader_stages(config: &DeviceConfig) -> Stage {
    let mut stages = Stage::VERTEX_SHADER | Stage::FRAGMENT_SHADER | Stage::COMPUTE_SHADER;
    if config.has_tessellation_shaders {
        stages |= Stage::TESSELLATION_CONTROL_SHADER | Stage::TESSELLATION_EVALUATION_SHADER;
    }
    if config.has_geometry_shaders {
        stages |= Stage::GEOMETRY_SHADER;
    }
    stages
}

/// Stages touching framebuffer images around a render pass.
pub fn framebuffer_stages(config: &DeviceConfig) -> Stage {
    shader_stages(config)
        | Stage::TRANSFER
        | Stage::EARLY_FRAGMENT_TESTS
        | Stage::LATE_FRAGMENT_TESTS
        | Stage::COLOR_ATTACHMENT_OUTPUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_access_follows_usage() {
        assert_eq!(
            buffer_write_access(BufferUsage::COPY_TO, false),
            Access::TRANSFER_WRITE
        );
        assert_eq!(
            buffer_write_access(BufferUsage::MUTABLE_IMAGE, true),
            Access::SHADER_WRITE | Access::HOST_WRITE
        );
        assert!(!buffer_is_gpu_writable(BufferUsage::VERTEX, false));
    }

    #[test]
    fn read_access_follows_usage() {
        let access = buffer_read_access(BufferUsage::VERTEX | BufferUsage::INDEX);
        assert_eq!(access, Access::VERTEX_ATTRIBUTE_READ | Access::INDEX_READ);
        assert_eq!(
            buffer_read_access(BufferUsage::INDIRECT_DISPATCH),
            Access::INDIRECT_COMMAND_READ
        );
    }

    #[test]
    fn layouts() {
        assert_eq!(texture_layout(TextureUsage::TEXTURE, false), Layout::ShaderReadOnly);
        assert_eq!(texture_layout(TextureUsage::IMAGE, false), Layout::General);
        assert_eq!(texture_layout(TextureUsage::TEXTURE, true), Layout::General);
        assert_eq!(image_aspect(Format::D24S8), Aspect::DEPTH | Aspect::STENCIL);
        assert_eq!(image_aspect(Format::RGBA8Unorm), Aspect::COLOR);
    }

    #[test]
    fn optional_stages() {
        let cfg = DeviceConfig::default().optional_shader_stages(false, true);
        let stages = shader_stages(&cfg);
        assert!(stages.contains(Stage::GEOMETRY_SHADER));
        assert!(!stages.contains(Stage::TESSELLATION_CONTROL_SHADER));
    }
}
