use std::sync::Arc;

use smallvec::SmallVec;

use crate::gpu::config::BindingPoolSizes;
use crate::gpu::device::Device;
use crate::gpu::driver::command::{Backend, DescriptorType};
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::{GpuResource, Tracked};

use super::{BindingContext, BindingScope, MaterialDesc, ResolvedBindings, Shader, ValueSource};

/// Binding pool holding exactly one shared set. Tracked like any resource so it outlives every
/// submission that bound its set.
pub struct BindingPoolResource {
    resource: GpuResource,
    pool: NativeBindingPool,
}

impl BindingPoolResource {
    pub fn native(&self) -> NativeBindingPool {
        self.pool
    }
}

impl Tracked for BindingPoolResource {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        SmallVec::from_elem(NativeObject::BindingPool(self.pool), 1)
    }
}

struct SharedSet {
    pool: Arc<BindingPoolResource>,
    set: NativeBindingSet,
    layout: NativeBindingLayout,
    desc: Arc<MaterialDesc>,
    resolved: ResolvedBindings,
}

/// Keeps the last set built for one shared scope (global or instance values).
pub struct SharedBindingSets {
    scope: BindingScope,
    scratch: ResolvedBindings,
    last: Option<SharedSet>,
}

impl SharedBindingSets {
    pub fn new(scope: BindingScope) -> Self {
        Self {
            scope,
            scratch: ResolvedBindings::default(),
            last: None,
        }
    }

    pub fn scope(&self) -> BindingScope {
        self.scope
    }

    pub fn dynamic_offsets(&self) -> &[u32] {
        self.last
            .as_ref()
            .map_or(&[], |last| last.resolved.offsets.as_slice())
    }

    pub fn create_set<B: Backend>(
        &mut self,
        ctx: &mut BindingContext<'_, B>,
        shader: &Shader,
        values: &dyn ValueSource,
    ) -> Result<Option<NativeBindingSet>> {
        let desc = &shader.material_desc;
        let layout = match desc.layout(self.scope) {
            Some(layout) if desc.has_scope(self.scope) => layout,
            _ => return Ok(None),
        };

        self.scratch.resolve(ctx, shader, self.scope, values)?;

        if let Some(last) = self.last.as_mut() {
            if Arc::ptr_eq(&last.desc, desc)
                && last.layout == layout
                && last.resolved == self.scratch
            {
                ctx.resources.add_tracked(&last.pool)?;
                std::mem::swap(&mut last.resolved.offsets, &mut self.scratch.offsets);
                return Ok(Some(last.set));
            }
        }

        self.clear_last_set(ctx.device);

        let backend = ctx.backend();
        let native = backend.create_binding_pool(&exact_sizes(&self.scratch))?;
        let set = match backend.allocate_binding_set(native, layout) {
            Ok(Some(set)) => set,
            Ok(None) => {
                backend.destroy_native(NativeObject::BindingPool(native));
                return Err(GPUError::out_of_memory());
            }
            Err(err) => {
                backend.destroy_native(NativeObject::BindingPool(native));
                return Err(err);
            }
        };
        let pool = Arc::new(BindingPoolResource {
            resource: GpuResource::new(),
            pool: native,
        });
        // Owned from here on, so a failure below still retires the pool.
        self.last = Some(SharedSet {
            pool: Arc::clone(&pool),
            set,
            layout,
            desc: Arc::clone(desc),
            resolved: ResolvedBindings::default(),
        });

        backend.update_binding_sets(&self.scratch.writes(set))?;
        ctx.resources.add_tracked(&pool)?;
        if let Some(last) = self.last.as_mut() {
            std::mem::swap(&mut last.resolved, &mut self.scratch);
        }
        Ok(Some(set))
    }

    /// Forgets the last set and retires its pool through the device's deferred deletes.
    pub fn clear_last_set<B: Backend>(&mut self, device: &Device<B>) {
        if let Some(last) = self.last.take() {
            device.delete_resource(last.pool);
        }
    }

    pub fn shutdown<B: Backend>(&mut self, device: &Device<B>) {
        self.clear_last_set(device);
        self.scratch = ResolvedBindings::default();
    }
}

fn exact_sizes(resolved: &ResolvedBindings) -> BindingPoolSizes {
    let mut sizes = BindingPoolSizes {
        max_sets: 1,
        textures: 0,
        images: 0,
        input_attachments: 0,
        texel_buffers: 0,
        mutable_texel_buffers: 0,
        uniform_buffers: 0,
        storage_buffers: 0,
        dynamic_uniform_buffers: 0,
        dynamic_storage_buffers: 0,
    };
    for (ty, count) in resolved.descriptor_counts() {
        let slot = match ty {
            DescriptorType::Sampler
            | DescriptorType::CombinedImageSampler
            | DescriptorType::SampledImage => &mut sizes.textures,
            DescriptorType::StorageImage => &mut sizes.images,
            DescriptorType::InputAttachment => &mut sizes.input_attachments,
            DescriptorType::UniformTexelBuffer => &mut sizes.texel_buffers,
            DescriptorType::StorageTexelBuffer => &mut sizes.mutable_texel_buffers,
            DescriptorType::UniformBuffer => &mut sizes.uniform_buffers,
            DescriptorType::StorageBuffer => &mut sizes.storage_buffers,
            DescriptorType::UniformBufferDynamic => &mut sizes.dynamic_uniform_buffers,
            DescriptorType::StorageBufferDynamic => &mut sizes.dynamic_storage_buffers,
        };
        *slot += count;
    }
    sizes
}
