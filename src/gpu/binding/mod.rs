//! Material descriptions, value sources and the binding-set caches built from them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::gpu::device::Device;
use crate::gpu::driver::command::{Backend, DescriptorType};
use crate::gpu::driver::types::*;
use crate::gpu::resource::{Buffer, Texture, UsedResources};
use crate::sync::barrier_batch::BarrierBatch;

pub mod memory;
pub mod shared;
pub mod volatile;

pub use memory::{BindingInfo, ResolvedBindings};
pub use shared::{BindingPoolResource, SharedBindingSets};
pub use volatile::VolatileBindingSets;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    Texture,
    Image,
    SubpassInput,
    TextureBuffer,
    ImageBuffer,
    VariableGroup,
    UniformBlock,
    UniformBuffer,
}

impl ElementType {
    pub fn is_image(self) -> bool {
        matches!(
            self,
            ElementType::Texture | ElementType::Image | ElementType::SubpassInput
        )
    }

    pub fn is_texel_buffer(self) -> bool {
        matches!(self, ElementType::TextureBuffer | ElementType::ImageBuffer)
    }

    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            ElementType::VariableGroup | ElementType::UniformBlock | ElementType::UniformBuffer
        )
    }
}

/// Which set an element lives in. The discriminant is the set index in the pipeline layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BindingScope {
    Material = 0,
    Global = 1,
    Instance = 2,
}

impl BindingScope {
    pub fn set_index(self) -> u32 {
        self as u32
    }

    /// Whether buffers in this scope are bound through dynamic offsets.
    pub fn dynamic_buffers(self, ty: ElementType) -> bool {
        match self {
            BindingScope::Material => ty != ElementType::VariableGroup,
            BindingScope::Global => false,
            BindingScope::Instance => true,
        }
    }
}

pub fn descriptor_type(ty: ElementType, dynamic: bool) -> DescriptorType {
    match ty {
        ElementType::Texture => DescriptorType::CombinedImageSampler,
        ElementType::Image => DescriptorType::StorageImage,
        ElementType::SubpassInput => DescriptorType::InputAttachment,
        ElementType::TextureBuffer => DescriptorType::UniformTexelBuffer,
        ElementType::ImageBuffer => DescriptorType::StorageTexelBuffer,
        ElementType::VariableGroup | ElementType::UniformBlock if dynamic => {
            DescriptorType::UniformBufferDynamic
        }
        ElementType::VariableGroup | ElementType::UniformBlock => DescriptorType::UniformBuffer,
        ElementType::UniformBuffer if dynamic => DescriptorType::StorageBufferDynamic,
        ElementType::UniformBuffer => DescriptorType::StorageBuffer,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableGroupDesc {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialElement {
    pub name: String,
    pub ty: ElementType,
    pub scope: BindingScope,
    /// Binding slot within the scope's set.
    pub binding: u32,
    /// False when reflection found the element unused by every stage.
    pub used: bool,
    pub group: Option<Arc<VariableGroupDesc>>,
}

impl MaterialElement {
    pub fn new(name: impl Into<String>, ty: ElementType, scope: BindingScope, binding: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            scope,
            binding,
            used: true,
            group: None,
        }
    }

    pub fn unused(mut self) -> Self {
        self.used = false;
        self
    }

    pub fn with_group(mut self, group: Arc<VariableGroupDesc>) -> Self {
        self.group = Some(group);
        self
    }
}

/// Reflected material layout, shared by every shader built from it.
#[derive(Debug, Default)]
pub struct MaterialDesc {
    pub elements: Vec<MaterialElement>,
    layouts: [Option<NativeBindingLayout>; 3],
}

impl MaterialDesc {
    pub fn new(elements: Vec<MaterialElement>) -> Self {
        Self {
            elements,
            layouts: [None; 3],
        }
    }

    pub fn with_layout(mut self, scope: BindingScope, layout: NativeBindingLayout) -> Self {
        self.layouts[scope.set_index() as usize] = Some(layout);
        self
    }

    pub fn layout(&self, scope: BindingScope) -> Option<NativeBindingLayout> {
        self.layouts[scope.set_index() as usize]
    }

    pub fn has_scope(&self, scope: BindingScope) -> bool {
        self.layout(scope).is_some() && self.elements.iter().any(|e| e.scope == scope && e.used)
    }

    /// Used elements of `scope`, paired with their element index.
    pub fn scope_elements(
        &self,
        scope: BindingScope,
    ) -> impl Iterator<Item = (usize, &MaterialElement)> {
        self.elements
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.scope == scope && e.used)
    }
}

pub struct Shader {
    pub pipeline: NativePipeline,
    pub pipeline_layout: NativePipelineLayout,
    pub material_desc: Arc<MaterialDesc>,
    /// Sampler per element index; null for elements without one.
    pub samplers: Vec<NativeSampler>,
    pub bind_point: BindPoint,
}

impl Shader {
    pub fn new(
        pipeline: NativePipeline,
        pipeline_layout: NativePipelineLayout,
        material_desc: Arc<MaterialDesc>,
        bind_point: BindPoint,
    ) -> Arc<Self> {
        let samplers = vec![NativeSampler::NULL; material_desc.elements.len()];
        Arc::new(Self {
            pipeline,
            pipeline_layout,
            material_desc,
            samplers,
            bind_point,
        })
    }

    pub fn with_samplers(
        pipeline: NativePipeline,
        pipeline_layout: NativePipelineLayout,
        material_desc: Arc<MaterialDesc>,
        bind_point: BindPoint,
        samplers: Vec<NativeSampler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            pipeline_layout,
            material_desc,
            samplers,
            bind_point,
        })
    }

    pub fn sampler(&self, element: usize) -> NativeSampler {
        self.samplers
            .get(element)
            .copied()
            .unwrap_or(NativeSampler::NULL)
    }
}

#[derive(Clone)]
pub struct BufferValue {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub size: u64,
}

#[derive(Clone)]
pub struct TexelBufferValue {
    pub buffer: Arc<Buffer>,
    pub format: Format,
    pub offset: u64,
    pub count: u64,
}

/// Looks up bound values by element name.
pub trait ValueSource {
    fn texture(&self, name: &str) -> Option<&Arc<Texture>>;
    fn texel_buffer(&self, name: &str) -> Option<&TexelBufferValue>;
    fn buffer(&self, name: &str) -> Option<&BufferValue>;
}

#[derive(Clone)]
enum MaterialValue {
    Texture(Arc<Texture>),
    TexelBuffer(TexelBufferValue),
    Buffer(BufferValue),
}

/// Name-keyed values. Serves both shared (global/instance) and per-draw values.
#[derive(Clone, Default)]
pub struct MaterialValues {
    values: HashMap<String, MaterialValue>,
}

impl MaterialValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_texture(&mut self, name: impl Into<String>, texture: Arc<Texture>) -> &mut Self {
        self.values
            .insert(name.into(), MaterialValue::Texture(texture));
        self
    }

    pub fn set_texel_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: Arc<Buffer>,
        format: Format,
        offset: u64,
        count: u64,
    ) -> &mut Self {
        self.values.insert(
            name.into(),
            MaterialValue::TexelBuffer(TexelBufferValue {
                buffer,
                format,
                offset,
                count,
            }),
        );
        self
    }

    pub fn set_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: Arc<Buffer>,
        offset: u64,
        size: u64,
    ) -> &mut Self {
        self.values.insert(
            name.into(),
            MaterialValue::Buffer(BufferValue {
                buffer,
                offset,
                size,
            }),
        );
        self
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.values.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ValueSource for MaterialValues {
    fn texture(&self, name: &str) -> Option<&Arc<Texture>> {
        match self.values.get(name)? {
            MaterialValue::Texture(t) => Some(t),
            _ => None,
        }
    }

    fn texel_buffer(&self, name: &str) -> Option<&TexelBufferValue> {
        match self.values.get(name)? {
            MaterialValue::TexelBuffer(b) => Some(b),
            _ => None,
        }
    }

    fn buffer(&self, name: &str) -> Option<&BufferValue> {
        match self.values.get(name)? {
            MaterialValue::Buffer(b) => Some(b),
            _ => None,
        }
    }
}

/// What resolving values needs from the recording command buffer.
pub struct BindingContext<'a, B: Backend> {
    pub device: &'a Device<B>,
    pub resources: &'a mut UsedResources,
    pub barriers: &'a mut BarrierBatch,
}

impl<'a, B: Backend> BindingContext<'a, B> {
    pub fn backend(&self) -> &'a B {
        self.device.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_offsets_per_scope() {
        assert!(BindingScope::Material.dynamic_buffers(ElementType::UniformBlock));
        assert!(!BindingScope::Material.dynamic_buffers(ElementType::VariableGroup));
        assert!(!BindingScope::Global.dynamic_buffers(ElementType::UniformBuffer));
        assert!(BindingScope::Instance.dynamic_buffers(ElementType::VariableGroup));
        assert_eq!(
            descriptor_type(ElementType::UniformBuffer, true),
            DescriptorType::StorageBufferDynamic
        );
        assert_eq!(
            descriptor_type(ElementType::Texture, true),
            DescriptorType::CombinedImageSampler
        );
    }

    #[test]
    fn scope_elements_skip_unused() {
        let desc = MaterialDesc::new(vec![
            MaterialElement::new("a", ElementType::Texture, BindingScope::Material, 0),
            MaterialElement::new("b", ElementType::Texture, BindingScope::Material, 1).unused(),
            MaterialElement::new("c", ElementType::UniformBlock, BindingScope::Global, 0),
        ])
        .with_layout(BindingScope::Material, NativeBindingLayout(1));

        let names: Vec<_> = desc
            .scope_elements(BindingScope::Material)
            .map(|(_, e)| e.name.as_str())
            .collect();
        assert_eq!(names, ["a"]);
        assert!(desc.has_scope(BindingScope::Material));
        assert!(!desc.has_scope(BindingScope::Global));
    }
}
