use crate::gpu::driver::command::Backend;
use crate::gpu::driver::types::*;
use crate::gpu::error::Result;

/// Native command pool plus the buffers allocated from it.
///
/// Buffers are never freed one by one. [`NativeBufferPool::reset`] resets the whole native pool
/// and moves every handed out buffer back onto the free lists.
#[derive(Debug)]
pub struct NativeBufferPool {
    raw: NativeCommandPool,
    free_primary: Vec<NativeCommandBuffer>,
    free_secondary: Vec<NativeCommandBuffer>,
    used_primary: Vec<NativeCommandBuffer>,
    used_secondary: Vec<NativeCommandBuffer>,
}

impl NativeBufferPool {
    pub fn new<B: Backend + ?Sized>(backend: &B) -> Result<Self> {
        let raw = backend.create_command_pool()?;
        Ok(Self {
            raw,
            free_primary: Vec::new(),
            free_secondary: Vec::new(),
            used_primary: Vec::new(),
            used_secondary: Vec::new(),
        })
    }

    /// Raw native command pool handle.
    pub fn raw(&self) -> NativeCommandPool {
        self.raw
    }

    pub fn alloc<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        level: CommandBufferLevel,
    ) -> Result<NativeCommandBuffer> {
        let (free, used) = match level {
            CommandBufferLevel::Primary => (&mut self.free_primary, &mut self.used_primary),
            CommandBufferLevel::Secondary => (&mut self.free_secondary, &mut self.used_secondary),
        };
        used.try_reserve(1)?;
        let buf = match free.pop() {
            Some(buf) => buf,
            None => backend.allocate_command_buffer(self.raw, level)?,
        };
        used.push(buf);
        Ok(buf)
    }

    /// Number of buffers handed out since the last reset.
    pub fn in_use(&self) -> usize {
        self.used_primary.len() + self.used_secondary.len()
    }

    pub fn reset<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        backend.reset_command_pool(self.raw)?;
        self.free_primary.append(&mut self.used_primary);
        self.free_secondary.append(&mut self.used_secondary);
        Ok(())
    }

    /// Hands the native pool over for deferred destruction, leaving this one empty.
    pub fn retire(&mut self) -> Option<NativeCommandPool> {
        let raw = std::mem::replace(&mut self.raw, NativeCommandPool::NULL);
        self.free_primary.clear();
        self.free_secondary.clear();
        self.used_primary.clear();
        self.used_secondary.clear();
        (!raw.is_null()).then_some(raw)
    }

    /// Destroys the native pool. Buffers allocated from it become invalid.
    pub fn destroy<B: Backend + ?Sized>(&mut self, backend: &B) {
        if !self.raw.is_null() {
            backend.destroy_native(NativeObject::CommandPool(self.raw));
        }
        self.raw = NativeCommandPool::NULL;
        self.free_primary.clear();
        self.free_secondary.clear();
        self.used_primary.clear();
        self.used_secondary.clear();
    }
}
