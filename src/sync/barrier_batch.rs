use smallvec::SmallVec;

use crate::gpu::driver::command::Backend;
use crate::gpu::driver::types::{NativeBuffer, NativeCommandBuffer, NativeImage};
use crate::gpu::error::Result;
use crate::utils::recently_added;

use super::state::{Access, Layout, Stage, SubresourceRange};

/// Size sentinel for "to the end of the buffer".
pub const WHOLE_SIZE: u64 = u64::MAX;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferBarrier {
    pub src_access: Access,
    pub dst_access: Access,
    pub buffer: NativeBuffer,
    pub offset: u64,
    pub size: u64,
}

impl Default for BufferBarrier {
    fn default() -> Self {
        Self {
            src_access: Access::NONE,
            dst_access: Access::NONE,
            buffer: NativeBuffer::NULL,
            offset: 0,
            size: WHOLE_SIZE,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageBarrier {
    pub src_access: Access,
    pub dst_access: Access,
    pub old_layout: Layout,
    pub new_layout: Layout,
    pub image: NativeImage,
    pub range: SubresourceRange,
}

/// Global memory dependency, not tied to a resource.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MemoryBarrier {
    pub src_access: Access,
    pub dst_access: Access,
}

/// Pending barriers waiting to be flushed as one pipeline barrier.
#[derive(Debug)]
pub struct BarrierBatch {
    buffers: Vec<BufferBarrier>,
    images: Vec<ImageBarrier>,
    window: usize,
}

impl BarrierBatch {
    pub fn new(window: usize) -> Self {
        Self {
            buffers: Vec::new(),
            images: Vec::new(),
            window,
        }
    }

    /// Pushes a default barrier and hands it back to be filled in.
    pub fn add_buffer_barrier(&mut self) -> Result<&mut BufferBarrier> {
        self.buffers.try_reserve(1)?;
        self.buffers.push(BufferBarrier::default());
        let last = self.buffers.len() - 1;
        Ok(&mut self.buffers[last])
    }

    pub fn add_image_barrier(&mut self) -> Result<&mut ImageBarrier> {
        self.images.try_reserve(1)?;
        self.images.push(ImageBarrier::default());
        let last = self.images.len() - 1;
        Ok(&mut self.images[last])
    }

    pub fn recently_added_buffer(&self, barrier: &BufferBarrier) -> bool {
        recently_added(&self.buffers, self.window, |b| b == barrier)
    }

    pub fn recently_added_image(&self, barrier: &ImageBarrier) -> bool {
        recently_added(&self.images, self.window, |b| b == barrier)
    }

    pub fn buffers(&self) -> &[BufferBarrier] {
        &self.buffers
    }

    pub fn images(&self) -> &[ImageBarrier] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.images.is_empty()
    }

    /// Emits everything pending as a single barrier call on `cmd` and clears the batch.
    pub fn submit<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        cmd: NativeCommandBuffer,
        src: Stage,
        dst: Stage,
    ) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let result = backend.pipeline_barrier(cmd, src, dst, &[], &self.buffers, &self.images);
        self.reset();
        result
    }

    /// Emits only a global memory barrier. Pending resource barriers are left untouched.
    pub fn submit_memory<B: Backend + ?Sized>(
        backend: &B,
        cmd: NativeCommandBuffer,
        src: Stage,
        dst: Stage,
        barrier: MemoryBarrier,
    ) -> Result<()> {
        let memory: SmallVec<[MemoryBarrier; 1]> = SmallVec::from_buf([barrier]);
        backend.pipeline_barrier(cmd, src, dst, &memory, &[], &[])
    }

    pub fn reset(&mut self) {
        self.buffers.clear();
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::null::{NullBackend, NullCall};

    #[test]
    fn recency_window_is_bounded() {
        let mut batch = BarrierBatch::new(2);
        for i in 1..=3u64 {
            let b = batch.add_buffer_barrier().unwrap();
            b.buffer = NativeBuffer(i);
        }

        let first = BufferBarrier {
            buffer: NativeBuffer(1),
            ..Default::default()
        };
        let last = BufferBarrier {
            buffer: NativeBuffer(3),
            ..Default::default()
        };
        assert!(!batch.recently_added_buffer(&first));
        assert!(batch.recently_added_buffer(&last));
    }

    #[test]
    fn empty_submit_emits_nothing() {
        let backend = NullBackend::new();
        let mut batch = BarrierBatch::new(10);
        batch
            .submit(&backend, NativeCommandBuffer(1), Stage::TRANSFER, Stage::TRANSFER)
            .unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn submit_flushes_once_and_clears() {
        let backend = NullBackend::new();
        let mut batch = BarrierBatch::new(10);
        batch.add_buffer_barrier().unwrap().buffer = NativeBuffer(7);
        let image = batch.add_image_barrier().unwrap();
        image.image = NativeImage(9);
        image.new_layout = Layout::TransferDst;

        batch
            .submit(&backend, NativeCommandBuffer(1), Stage::TRANSFER, Stage::TRANSFER)
            .unwrap();

        assert!(batch.is_empty());
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            NullCall::PipelineBarrier {
                buffers, images, ..
            } => {
                assert_eq!(buffers.len(), 1);
                assert_eq!(images[0].new_layout, Layout::TransferDst);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn reset_discards_without_emitting() {
        let backend = NullBackend::new();
        let mut batch = BarrierBatch::new(10);
        batch.add_image_barrier().unwrap();
        batch.reset();
        batch
            .submit(&backend, NativeCommandBuffer(1), Stage::TRANSFER, Stage::TRANSFER)
            .unwrap();
        assert_eq!(batch.len(), 0);
        assert!(backend.calls().is_empty());
    }
}
