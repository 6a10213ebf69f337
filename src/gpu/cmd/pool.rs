use std::sync::Arc;

use crate::gpu::device::Device;
use crate::gpu::driver::command::Backend;
use crate::gpu::driver::types::CommandBufferUsage;
use crate::gpu::error::Result;

use super::CommandBuffer;

/// Fixed set of pooled command buffers sharing one usage mode.
pub struct CommandBufferPool<B: Backend> {
    buffers: Vec<CommandBuffer<B>>,
    usage: CommandBufferUsage,
}

impl<B: Backend> CommandBufferPool<B> {
    pub fn create(device: Arc<Device<B>>, count: usize, usage: CommandBufferUsage) -> Result<Self> {
        let mut buffers = Vec::new();
        buffers.try_reserve(count)?;
        for _ in 0..count {
            buffers.push(CommandBuffer::new_pooled(Arc::clone(&device), usage)?);
        }
        log::debug!(
            target: "strata::render",
            "created command buffer pool of {} ({:?})",
            count,
            usage
        );
        Ok(Self { buffers, usage })
    }

    /// Prepares every command buffer for a new recording cycle.
    pub fn prepare(&mut self) -> Result<()> {
        for buffer in &mut self.buffers {
            buffer.prepare()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn usage(&self) -> CommandBufferUsage {
        self.usage
    }

    pub fn get(&self, index: usize) -> Option<&CommandBuffer<B>> {
        self.buffers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CommandBuffer<B>> {
        self.buffers.get_mut(index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CommandBuffer<B>> {
        self.buffers.iter_mut()
    }
}
