//! Submission numbering and the renderer front end.
//!
//! The [`SubmitRing`] holds one native fence per in-flight submission. Every queue submission
//! takes the next slot, and the number it is given is what resources record as their last use.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::gpu::cmd::{CommandBuffer, CommandBufferPool};
use crate::gpu::device::Device;
use crate::gpu::driver::command::Backend;
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};

#[derive(Debug, Copy, Clone)]
pub(crate) struct SubmitSlot {
    pub(crate) fence: NativeFence,
    /// Zero until the slot is first submitted.
    pub(crate) submit_index: u64,
}

/// Fixed ring of submission fences.
#[derive(Debug)]
pub(crate) struct SubmitRing {
    slots: Vec<SubmitSlot>,
    curr: u16,
    submit_count: u64,
    finished_submit_count: u64,
    /// Threads blocked on fences outside of the lock. Fences aren't reset while nonzero.
    pub(crate) waiters: u32,
}

impl SubmitRing {
    pub(crate) fn new<B: Backend>(backend: &B, count: usize) -> Result<Self> {
        let count = count.clamp(1, u16::MAX as usize);
        let mut slots = Vec::new();
        slots.try_reserve(count)?;
        for _ in 0..count {
            match backend.create_fence(false) {
                Ok(fence) => slots.push(SubmitSlot {
                    fence,
                    submit_index: 0,
                }),
                Err(err) => {
                    for slot in slots.drain(..) {
                        backend.destroy_native(NativeObject::Fence(slot.fence));
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self {
            slots,
            curr: 0,
            submit_count: 0,
            finished_submit_count: 0,
            waiters: 0,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn curr_slot(&self) -> SubmitSlot {
        self.slots[self.curr as usize]
    }

    pub(crate) fn submit_count(&self) -> u64 {
        self.submit_count
    }

    pub(crate) fn finished_submit_count(&self) -> u64 {
        self.finished_submit_count
    }

    /// Fences of every submission up to and including `submit` that isn't known to be done.
    pub(crate) fn fences_through(&self, submit: u64) -> SmallVec<[NativeFence; 8]> {
        self.slots
            .iter()
            .filter(|s| {
                s.submit_index != 0
                    && s.submit_index <= submit
                    && s.submit_index > self.finished_submit_count
            })
            .map(|s| s.fence)
            .collect()
    }

    /// Submissions still in flight, oldest first.
    pub(crate) fn pending(&self) -> SmallVec<[SubmitSlot; 8]> {
        let mut pending: SmallVec<[SubmitSlot; 8]> = self
            .slots
            .iter()
            .filter(|s| s.submit_index > self.finished_submit_count)
            .copied()
            .collect();
        pending.sort_by_key(|s| s.submit_index);
        pending
    }

    /// Gives the current slot the next submission number and moves on.
    pub(crate) fn record_submit(&mut self) -> u64 {
        self.submit_count += 1;
        self.slots[self.curr as usize].submit_index = self.submit_count;
        self.advance();
        self.submit_count
    }

    pub(crate) fn mark_finished(&mut self, submit: u64) {
        self.finished_submit_count = self.finished_submit_count.max(submit);
    }

    fn advance(&mut self) {
        self.curr = (self.curr + 1) % self.slots.len() as u16;
    }

    pub(crate) fn destroy_all<B: Backend>(&mut self, backend: &B) {
        for slot in self.slots.drain(..) {
            backend.destroy_native(NativeObject::Fence(slot.fence));
        }
        self.curr = 0;
    }
}

//===----------------------------------------------------------------------===//
// Renderer
//===----------------------------------------------------------------------===//

/// Owns the main command buffer of a device. Pooled command buffers are recorded separately and
/// submitted into it; [`Renderer::flush`] sends everything to the queue.
pub struct Renderer<B: Backend> {
    device: Arc<Device<B>>,
    main: CommandBuffer<B>,
}

impl<B: Backend> Renderer<B> {
    pub fn new(device: Arc<Device<B>>) -> Self {
        let main = CommandBuffer::new_primary(Arc::clone(&device));
        Self { device, main }
    }

    pub fn device(&self) -> &Arc<Device<B>> {
        &self.device
    }

    pub fn main_command_buffer(&mut self) -> &mut CommandBuffer<B> {
        &mut self.main
    }

    pub fn create_command_buffer_pool(
        &self,
        count: usize,
        usage: CommandBufferUsage,
    ) -> Result<CommandBufferPool<B>> {
        CommandBufferPool::create(Arc::clone(&self.device), count, usage)
    }

    /// Appends a finished pooled command buffer to the main one.
    pub fn submit_command_buffer(&mut self, src: &mut CommandBuffer<B>) -> Result<()> {
        self.main.submit(src)
    }

    /// Submits everything recorded on the main command buffer. Returns the submission number.
    pub fn flush(&mut self) -> Result<u64> {
        self.main.flush()
    }

    /// Flushes pending work, then blocks until the GPU has finished all of it.
    pub fn wait_until_idle(&mut self) -> Result<()> {
        if self.main.in_render_pass() {
            return Err(GPUError::permission_denied(
                "Cannot wait for idle inside of a render pass.",
            ));
        }
        if !self.main.submit_buffers().is_empty() || !self.main.used_resources().is_empty() {
            self.main.flush()?;
        }
        self.device.wait_until_idle()
    }
}
