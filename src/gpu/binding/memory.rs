use smallvec::SmallVec;

use crate::gpu::driver::command::{
    Backend, BindingWrite, BufferBinding, DescriptorType, ImageBinding,
};
use crate::gpu::driver::types::{NativeBindingSet, NativeBufferView, NativeSampler};
use crate::gpu::error::{GPUError, Result};
use crate::sync::state::Layout;

use super::{descriptor_type, BindingContext, BindingScope, ElementType, Shader, ValueSource};

/// Where one element's value landed in the resolved arrays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindingInfo {
    pub binding: u32,
    pub ty: DescriptorType,
    pub index: u32,
}

/// Values of one scope resolved to native bindings. Two resolutions are equal when they would
/// write the same set; dynamic offsets are left out since they are supplied at bind time.
#[derive(Debug, Default, Clone)]
pub struct ResolvedBindings {
    pub images: Vec<ImageBinding>,
    pub buffers: Vec<BufferBinding>,
    pub texel_views: Vec<NativeBufferView>,
    pub infos: Vec<BindingInfo>,
    pub offsets: Vec<u32>,
}

impl PartialEq for ResolvedBindings {
    fn eq(&self, other: &Self) -> bool {
        self.infos == other.infos
            && self.images == other.images
            && self.buffers == other.buffers
            && self.texel_views == other.texel_views
    }
}

impl ResolvedBindings {
    pub fn clear(&mut self) {
        self.images.clear();
        self.buffers.clear();
        self.texel_views.clear();
        self.infos.clear();
        self.offsets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Resolves every used element of `scope`, queueing barriers and tracking resources along
    /// the way. A missing value is an error.
    pub fn resolve<B: Backend>(
        &mut self,
        ctx: &mut BindingContext<'_, B>,
        shader: &Shader,
        scope: BindingScope,
        values: &dyn ValueSource,
    ) -> Result<()> {
        self.clear();
        for (i, element) in shader.material_desc.scope_elements(scope) {
            let dynamic = scope.dynamic_buffers(element.ty);
            let ty = descriptor_type(element.ty, dynamic);
            let index = match element.ty {
                ElementType::Texture | ElementType::Image | ElementType::SubpassInput => {
                    let texture = values.texture(&element.name).ok_or_else(|| {
                        GPUError::not_found(format!("No texture bound to '{}'.", element.name))
                    })?;
                    texture.add_memory_barrier(ctx.barriers)?;
                    ctx.resources.add_tracked(texture)?;

                    let (sampler, layout) = match element.ty {
                        ElementType::Texture => (shader.sampler(i), texture.layout()),
                        ElementType::Image => (NativeSampler::NULL, Layout::General),
                        _ => (NativeSampler::NULL, texture.layout()),
                    };
                    self.images.try_reserve(1)?;
                    self.images.push(ImageBinding {
                        sampler,
                        view: texture.view(),
                        layout,
                    });
                    self.images.len() - 1
                }
                ElementType::TextureBuffer | ElementType::ImageBuffer => {
                    let value = values.texel_buffer(&element.name).ok_or_else(|| {
                        GPUError::not_found(format!(
                            "No texture buffer bound to '{}'.",
                            element.name
                        ))
                    })?;
                    let block = value
                        .format
                        .block_size()
                        .ok_or_else(|| GPUError::unsupported_format(value.format))?;
                    value.buffer.add_memory_barrier(
                        ctx.barriers,
                        value.offset,
                        value.count * block as u64,
                    )?;
                    let view = value.buffer.texel_view(
                        ctx.backend(),
                        value.format,
                        value.offset,
                        value.count,
                    )?;
                    ctx.resources.add_tracked(&value.buffer)?;

                    self.texel_views.try_reserve(1)?;
                    self.texel_views.push(view);
                    self.texel_views.len() - 1
                }
                ElementType::VariableGroup
                | ElementType::UniformBlock
                | ElementType::UniformBuffer => {
                    let value = values.buffer(&element.name).ok_or_else(|| {
                        GPUError::not_found(format!("No buffer bound to '{}'.", element.name))
                    })?;
                    let range = if value.size == 0 {
                        value.buffer.size().saturating_sub(value.offset)
                    } else {
                        value.size
                    };
                    value
                        .buffer
                        .add_memory_barrier(ctx.barriers, value.offset, range)?;
                    ctx.resources.add_tracked(&value.buffer)?;

                    let offset = if dynamic {
                        let dynamic_offset = u32::try_from(value.offset).map_err(|_| {
                            GPUError::out_of_range("Dynamic buffer offset is out of range.")
                        })?;
                        self.offsets.try_reserve(1)?;
                        self.offsets.push(dynamic_offset);
                        0
                    } else {
                        value.offset
                    };
                    self.buffers.try_reserve(1)?;
                    self.buffers.push(BufferBinding {
                        buffer: value.buffer.native(),
                        offset,
                        range,
                    });
                    self.buffers.len() - 1
                }
            };

            self.infos.try_reserve(1)?;
            self.infos.push(BindingInfo {
                binding: element.binding,
                ty,
                index: index as u32,
            });
        }
        Ok(())
    }

    /// One write per resolved element, all targeting `set`.
    pub fn writes(&self, set: NativeBindingSet) -> SmallVec<[BindingWrite<'_>; 8]> {
        self.infos
            .iter()
            .map(|info| {
                let i = info.index as usize;
                let mut write = BindingWrite {
                    set,
                    binding: info.binding,
                    ty: info.ty,
                    images: &[],
                    buffers: &[],
                    texel_views: &[],
                };
                match info.ty {
                    DescriptorType::Sampler
                    | DescriptorType::CombinedImageSampler
                    | DescriptorType::SampledImage
                    | DescriptorType::StorageImage
                    | DescriptorType::InputAttachment => write.images = &self.images[i..=i],
                    DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer => {
                        write.texel_views = &self.texel_views[i..=i]
                    }
                    DescriptorType::UniformBuffer
                    | DescriptorType::StorageBuffer
                    | DescriptorType::UniformBufferDynamic
                    | DescriptorType::StorageBufferDynamic => write.buffers = &self.buffers[i..=i],
                }
                write
            })
            .collect()
    }

    /// Per-type descriptor counts, for sizing a pool that holds exactly one set.
    pub fn descriptor_counts(&self) -> SmallVec<[(DescriptorType, u32); 8]> {
        let mut counts: SmallVec<[(DescriptorType, u32); 8]> = SmallVec::new();
        for info in &self.infos {
            match counts.iter_mut().find(|(ty, _)| *ty == info.ty) {
                Some((_, count)) => *count += 1,
                None => counts.push((info.ty, 1)),
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::driver::types::*;

    #[test]
    fn offsets_are_ignored_by_equality() {
        let mut a = ResolvedBindings::default();
        a.buffers.push(BufferBinding {
            buffer: NativeBuffer(1),
            offset: 0,
            range: 64,
        });
        a.infos.push(BindingInfo {
            binding: 0,
            ty: DescriptorType::UniformBufferDynamic,
            index: 0,
        });
        let mut b = a.clone();
        a.offsets.push(0);
        b.offsets.push(256);
        assert_eq!(a, b);

        b.buffers[0].range = 32;
        assert_ne!(a, b);
    }

    #[test]
    fn writes_point_at_their_arrays() {
        let mut r = ResolvedBindings::default();
        r.images.push(ImageBinding::default());
        r.texel_views.push(NativeBufferView(4));
        r.infos.push(BindingInfo {
            binding: 0,
            ty: DescriptorType::CombinedImageSampler,
            index: 0,
        });
        r.infos.push(BindingInfo {
            binding: 3,
            ty: DescriptorType::UniformTexelBuffer,
            index: 0,
        });

        let writes = r.writes(NativeBindingSet(9));
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].images.len(), 1);
        assert_eq!(writes[1].texel_views, &[NativeBufferView(4)]);
        assert_eq!(writes[1].binding, 3);
        assert_eq!(r.descriptor_counts().len(), 2);
    }
}
