use crate::gpu::config::BindingPoolSizes;
use crate::gpu::driver::command::Backend;
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};

use super::{BindingContext, BindingScope, ResolvedBindings, Shader, ValueSource};

/// Per-draw binding sets, allocated from a growing list of pools and reused while the
/// resolved values stay the same.
///
/// Pools are only reset through [`VolatileBindingSets::clear`], once every submission that
/// used their sets has finished.
pub struct VolatileBindingSets {
    pools: Vec<NativeBindingPool>,
    current: usize,
    sizes: BindingPoolSizes,
    resolved: ResolvedBindings,
    last_resolved: ResolvedBindings,
    last_layout: Option<NativeBindingLayout>,
    last_set: Option<NativeBindingSet>,
}

impl VolatileBindingSets {
    pub fn new(sizes: BindingPoolSizes) -> Self {
        Self {
            pools: Vec::new(),
            current: 0,
            sizes,
            resolved: ResolvedBindings::default(),
            last_resolved: ResolvedBindings::default(),
            last_layout: None,
            last_set: None,
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Dynamic offsets of the set last returned by [`VolatileBindingSets::create_set`].
    pub fn dynamic_offsets(&self) -> &[u32] {
        &self.last_resolved.offsets
    }

    /// Set holding `values` for the shader's material scope, or `None` when the shader has no
    /// material bindings.
    pub fn create_set<B: Backend>(
        &mut self,
        ctx: &mut BindingContext<'_, B>,
        shader: &Shader,
        values: &dyn ValueSource,
    ) -> Result<Option<NativeBindingSet>> {
        let desc = &shader.material_desc;
        let layout = match desc.layout(BindingScope::Material) {
            Some(layout) if desc.has_scope(BindingScope::Material) => layout,
            _ => return Ok(None),
        };

        // Forget the last layout until resolution succeeds so a failure never hands back a
        // set built from other values.
        let last_layout = self.last_layout.take();
        self.resolved
            .resolve(ctx, shader, BindingScope::Material, values)?;

        if let Some(set) = self.last_set {
            if last_layout == Some(layout) && self.resolved == self.last_resolved {
                std::mem::swap(&mut self.resolved, &mut self.last_resolved);
                self.last_layout = last_layout;
                return Ok(Some(set));
            }
        }

        let set = self.allocate(ctx.backend(), layout)?;
        ctx.backend()
            .update_binding_sets(&self.resolved.writes(set))?;

        std::mem::swap(&mut self.resolved, &mut self.last_resolved);
        self.last_set = Some(set);
        self.last_layout = Some(layout);
        Ok(Some(set))
    }

    fn allocate<B: Backend>(
        &mut self,
        backend: &B,
        layout: NativeBindingLayout,
    ) -> Result<NativeBindingSet> {
        loop {
            let fresh = self.current == self.pools.len();
            if fresh {
                self.pools.try_reserve(1)?;
                let pool = backend.create_binding_pool(&self.sizes)?;
                self.pools.push(pool);
                log::debug!(
                    target: "strata::render",
                    "volatile binding pool {} created",
                    self.pools.len()
                );
            }

            match backend.allocate_binding_set(self.pools[self.current], layout)? {
                Some(set) => return Ok(set),
                None if fresh => return Err(GPUError::out_of_memory()),
                None => self.current += 1,
            }
        }
    }

    /// Resets every pool. Sets handed out earlier become invalid.
    pub fn clear<B: Backend>(&mut self, backend: &B) -> Result<()> {
        for pool in &self.pools {
            backend.reset_binding_pool(*pool)?;
        }
        self.current = 0;
        self.last_set = None;
        self.last_layout = None;
        self.last_resolved.clear();
        Ok(())
    }

    /// Gives up ownership of every pool, for destruction once their sets are no longer in use.
    pub fn take_pools(&mut self) -> Vec<NativeBindingPool> {
        self.current = 0;
        self.last_set = None;
        self.last_layout = None;
        self.last_resolved.clear();
        std::mem::take(&mut self.pools)
    }

    pub fn shutdown<B: Backend>(&mut self, backend: &B) {
        for pool in self.pools.drain(..) {
            backend.destroy_native(NativeObject::BindingPool(pool));
        }
        self.current = 0;
        self.last_set = None;
        self.last_layout = None;
        self.resolved = ResolvedBindings::default();
        self.last_resolved = ResolvedBindings::default();
    }
}
