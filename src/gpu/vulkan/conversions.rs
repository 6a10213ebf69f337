use ash::vk;

use crate::gpu::config::BindingPoolSizes;
use crate::gpu::driver::command::{DescriptorType, ImageSubresourceLayers, Offset3D};
use crate::gpu::driver::types::{ClearValue, Filter, Format, IndexType, Rect2D, Viewport};
use crate::sync::state::{Access, Aspect, Layout, Stage, SubresourceRange};

// Access, stage, aspect and layout values share their bits with the native enums.

pub(super) fn access_to_vk(access: Access) -> vk::AccessFlags {
    vk::AccessFlags::from_raw(access.bits())
}

pub(super) fn stage_to_vk(stage: Stage) -> vk::PipelineStageFlags {
    if stage.is_empty() {
        return vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    vk::PipelineStageFlags::from_raw(stage.bits())
}

pub(super) fn aspect_to_vk(aspect: Aspect) -> vk::ImageAspectFlags {
    vk::ImageAspectFlags::from_raw(aspect.bits())
}

pub(super) fn layout_to_vk(layout: Layout) -> vk::ImageLayout {
    vk::ImageLayout::from_raw(layout.as_raw())
}

pub(super) fn range_to_vk(range: &SubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect_to_vk(range.aspect),
        base_mip_level: range.base_mip,
        level_count: range.level_count,
        base_array_layer: range.base_layer,
        layer_count: range.layer_count,
    }
}

pub(super) fn layers_to_vk(layers: &ImageSubresourceLayers) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect_to_vk(layers.aspect),
        mip_level: layers.mip_level,
        base_array_layer: layers.base_layer,
        layer_count: layers.layer_count,
    }
}

pub(super) fn offset_to_vk(offset: &Offset3D) -> vk::Offset3D {
    vk::Offset3D {
        x: offset.x,
        y: offset.y,
        z: offset.z,
    }
}

impl From<Filter> for vk::Filter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => vk::Filter::NEAREST,
            Filter::Linear => vk::Filter::LINEAR,
        }
    }
}

impl From<IndexType> for vk::IndexType {
    fn from(ty: IndexType) -> Self {
        match ty {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

impl From<DescriptorType> for vk::DescriptorType {
    fn from(ty: DescriptorType) -> Self {
        vk::DescriptorType::from_raw(ty as i32)
    }
}

pub(super) fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::Unknown => vk::Format::UNDEFINED,
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::R8Uint => vk::Format::R8_UINT,
        Format::R8Sint => vk::Format::R8_SINT,
        Format::RG8Unorm => vk::Format::R8G8_UNORM,
        Format::RGBA8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::RGBA8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::BGRA8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::R16Float => vk::Format::R16_SFLOAT,
        Format::RGBA16Float => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32Uint => vk::Format::R32_UINT,
        Format::R32Float => vk::Format::R32_SFLOAT,
        Format::RG32Float => vk::Format::R32G32_SFLOAT,
        Format::RGBA32Float => vk::Format::R32G32B32A32_SFLOAT,
        Format::D16 => vk::Format::D16_UNORM,
        Format::D32Float => vk::Format::D32_SFLOAT,
        Format::S8 => vk::Format::S8_UINT,
        Format::D24S8 => vk::Format::D24_UNORM_S8_UINT,
        Format::D32S8Float => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub(super) fn color_to_vk(value: &ClearValue) -> vk::ClearColorValue {
    match *value {
        ClearValue::Color(float32) => vk::ClearColorValue { float32 },
        ClearValue::IntColor(int32) => vk::ClearColorValue { int32 },
        ClearValue::UintColor(uint32) => vk::ClearColorValue { uint32 },
        ClearValue::DepthStencil { .. } => vk::ClearColorValue::default(),
    }
}

pub(super) fn clear_to_vk(value: &ClearValue) -> vk::ClearValue {
    match *value {
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
        _ => vk::ClearValue {
            color: color_to_vk(value),
        },
    }
}

pub(super) fn rect_to_vk(rect: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.x,
            y: rect.y,
        },
        extent: vk::Extent2D {
            width: rect.w,
            height: rect.h,
        },
    }
}

pub(super) fn viewport_to_vk(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

/// Descriptor pool sizes, leaving out empty kinds.
pub(super) fn pool_sizes_to_vk(sizes: &BindingPoolSizes) -> Vec<vk::DescriptorPoolSize> {
    [
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, sizes.textures),
        (vk::DescriptorType::STORAGE_IMAGE, sizes.images),
        (vk::DescriptorType::INPUT_ATTACHMENT, sizes.input_attachments),
        (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, sizes.texel_buffers),
        (vk::DescriptorType::STORAGE_TEXEL_BUFFER, sizes.mutable_texel_buffers),
        (vk::DescriptorType::UNIFORM_BUFFER, sizes.uniform_buffers),
        (vk::DescriptorType::STORAGE_BUFFER, sizes.storage_buffers),
        (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, sizes.dynamic_uniform_buffers),
        (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, sizes.dynamic_storage_buffers),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
        ty,
        descriptor_count,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_pass_through() {
        assert_eq!(
            access_to_vk(Access::TRANSFER_WRITE | Access::HOST_READ),
            vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::HOST_READ
        );
        assert_eq!(
            stage_to_vk(Stage::COLOR_ATTACHMENT_OUTPUT),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(stage_to_vk(Stage::empty()), vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(layout_to_vk(Layout::Present), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            vk::DescriptorType::from(DescriptorType::StorageBufferDynamic),
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        );
    }

    #[test]
    fn empty_pool_sizes_are_dropped() {
        let sizes = pool_sizes_to_vk(&BindingPoolSizes::default());
        assert!(sizes
            .iter()
            .all(|s| s.ty != vk::DescriptorType::STORAGE_BUFFER));
        assert_eq!(sizes.len(), 8);
    }
}
