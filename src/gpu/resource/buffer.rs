use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::gpu::device::Device;
use crate::gpu::driver::command::Backend;
use crate::gpu::driver::state::{buffer_is_gpu_writable, buffer_read_access, buffer_write_access};
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::sync::barrier_batch::{BarrierBatch, BufferBarrier};

use super::fence::FenceResult;
use super::{GpuResource, Tracked, NOT_SUBMITTED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryHints,
    /// Backing memory can be mapped by the host.
    pub host_visible: bool,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: BufferUsage::empty(),
            memory: MemoryHints::GPU_ONLY,
            host_visible: false,
        }
    }
}

/// Currently mapped range of a buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MappedRange {
    pub offset: u64,
    pub size: u64,
    pub write: bool,
}

/// Mapped range plus a count of every map taken, so a wait can tell whether the map it
/// started with is still the current one.
#[derive(Debug, Default, Clone, Copy)]
struct MapState {
    range: MappedRange,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct TexelView {
    format: Format,
    offset: u64,
    count: u64,
    view: NativeBufferView,
}

pub struct Buffer {
    resource: GpuResource,
    native: NativeBuffer,
    desc: BufferDesc,
    map: Mutex<MapState>,
    views: Mutex<Vec<TexelView>>,
}

impl Buffer {
    pub fn new(native: NativeBuffer, desc: BufferDesc) -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
            native,
            desc,
            map: Mutex::new(MapState::default()),
            views: Mutex::new(Vec::new()),
        })
    }

    pub fn native(&self) -> NativeBuffer {
        self.native
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    pub fn can_map(&self) -> bool {
        self.desc.host_visible && !self.desc.memory.contains(MemoryHints::GPU_ONLY)
    }

    pub fn is_mapped(&self) -> bool {
        self.map.lock().range.size > 0
    }

    pub fn mapped_range(&self) -> Option<MappedRange> {
        let map = self.map.lock().range;
        (map.size > 0).then_some(map)
    }

    /// Maps `size` bytes at `offset`. Read maps of synchronized buffers first wait for the last
    /// submission that used the buffer.
    pub fn map<B: Backend>(
        &self,
        device: &Device<B>,
        flags: MapFlags,
        offset: u64,
        size: u64,
    ) -> Result<MappedRange> {
        let size = if size == crate::sync::WHOLE_SIZE {
            self.desc.size.saturating_sub(offset)
        } else {
            size
        };
        if offset.checked_add(size).map_or(true, |end| end > self.desc.size) || size == 0 {
            return Err(GPUError::out_of_range("Attempting to map outside of buffer range."));
        }

        let range = MappedRange {
            offset,
            size,
            write: flags.contains(MapFlags::WRITE),
        };
        let (generation, last_used_submit) = {
            let mut map = self.map.lock();
            if map.range.size > 0 {
                return Err(GPUError::permission_denied("Buffer is already mapped."));
            }
            if !self.can_map() {
                return Err(GPUError::permission_denied(
                    "Buffer memory not accessible to be mapped.",
                ));
            }
            map.range = range;
            map.generation += 1;
            (map.generation, self.resource.last_used_submit())
        };

        if flags.contains(MapFlags::READ)
            && self.desc.memory.contains(MemoryHints::SYNCHRONIZE)
            && last_used_submit != NOT_SUBMITTED
        {
            let result =
                device.wait_for_submit(last_used_submit, device.config().map_read_timeout_ns)?;
            self.finish_read_wait(generation, result)?;
        }
        Ok(range)
    }

    /// Settles a read map taken as `generation` once its wait returned `result`. Fails if the
    /// map was released, or released and taken again, in the meantime.
    fn finish_read_wait(&self, generation: u64, result: FenceResult) -> Result<()> {
        let mut map = self.map.lock();
        let still_ours = map.generation == generation && map.range.size > 0;
        match result {
            FenceResult::Success if still_ours => Ok(()),
            FenceResult::Success => Err(GPUError::permission_denied(
                "Buffer was unlocked while waiting.",
            )),
            FenceResult::WaitingToQueue => {
                if still_ours {
                    map.range = MappedRange::default();
                }
                Err(GPUError::permission_denied(
                    "Buffer still queued to be rendered.",
                ))
            }
            FenceResult::Timeout => {
                if still_ours {
                    map.range = MappedRange::default();
                }
                Err(GPUError::timeout())
            }
        }
    }

    pub fn unmap(&self) -> Result<()> {
        let mut map = self.map.lock();
        if map.range.size == 0 {
            return Err(GPUError::permission_denied("Buffer isn't mapped."));
        }
        map.range = MappedRange::default();
        Ok(())
    }

    /// Queues the write-to-read barrier for a buffer about to be consumed by the GPU. Buffers
    /// nothing can write skip the barrier.
    pub fn add_memory_barrier(
        &self,
        barriers: &mut BarrierBatch,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        let can_map = self.can_map();
        if !buffer_is_gpu_writable(self.desc.usage, can_map) {
            return Ok(());
        }

        let barrier = BufferBarrier {
            src_access: buffer_write_access(self.desc.usage, can_map),
            dst_access: buffer_read_access(self.desc.usage),
            buffer: self.native,
            offset,
            size,
        };
        if barriers.recently_added_buffer(&barrier) {
            return Ok(());
        }
        *barriers.add_buffer_barrier()? = barrier;
        Ok(())
    }

    /// Texel view over `count` elements at `offset`, created on first use and cached.
    pub fn texel_view<B: Backend + ?Sized>(
        &self,
        backend: &B,
        format: Format,
        offset: u64,
        count: u64,
    ) -> Result<NativeBufferView> {
        let mut views = self.views.lock();
        if let Some(v) = views
            .iter()
            .find(|v| v.format == format && v.offset == offset && v.count == count)
        {
            return Ok(v.view);
        }

        let block = format
            .block_size()
            .ok_or_else(|| GPUError::unsupported_format(format))?;
        views.try_reserve(1)?;
        let view = backend.create_buffer_view(self.native, format, offset, count * block as u64)?;
        views.push(TexelView {
            format,
            offset,
            count,
            view,
        });
        Ok(view)
    }
}

impl Tracked for Buffer {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        let mut objects: SmallVec<[NativeObject; 2]> = self
            .views
            .lock()
            .iter()
            .map(|v| NativeObject::BufferView(v.view))
            .collect();
        objects.push(NativeObject::Buffer(self.native));
        objects
    }
}
