//! Lifetime tracking for anything the GPU may still be reading.
//!
//! Every resource embeds a [`GpuResource`]: the number of command buffers currently holding a
//! use, and the last submission it took part in. A resource is only safe to destroy or to read
//! back once both say the GPU is done with it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::gpu::driver::types::NativeObject;
use crate::gpu::error::Result;
use crate::utils::recently_added;

pub mod buffer;
pub mod fence;
pub mod surface;
pub mod texture;

pub use buffer::{Buffer, BufferDesc, MappedRange};
pub use fence::{FenceResult, GfxFence};
pub use surface::{Framebuffer, FramebufferSurface, QueryPool, RenderSurface};
pub use texture::Texture;

/// `last_used_submit` of a resource that never reached the GPU.
pub const NOT_SUBMITTED: u64 = u64::MAX;

#[derive(Debug)]
pub struct GpuResource {
    command_buffer_count: AtomicU32,
    last_used_submit: Mutex<u64>,
}

impl Default for GpuResource {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuResource {
    pub fn new() -> Self {
        Self {
            command_buffer_count: AtomicU32::new(0),
            last_used_submit: Mutex::new(NOT_SUBMITTED),
        }
    }

    pub fn command_buffer_count(&self) -> u32 {
        self.command_buffer_count.load(Ordering::Acquire)
    }

    pub fn last_used_submit(&self) -> u64 {
        *self.last_used_submit.lock()
    }

    pub(crate) fn acquire(&self) {
        self.command_buffer_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        // Saturate instead of wrapping on unbalanced releases.
        let _ = self
            .command_buffer_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1));
    }

    /// Stamps the submission number, then drops the command buffer's hold.
    pub(crate) fn submitted(&self, submit_count: u64) {
        let mut last = self.last_used_submit.lock();
        *last = submit_count;
        self.release();
    }

    pub(crate) fn reset_submit(&self) {
        *self.last_used_submit.lock() = NOT_SUBMITTED;
    }

    pub fn is_in_use(&self, finished_submit_count: u64) -> bool {
        if self.command_buffer_count() > 0 {
            return true;
        }
        let last = self.last_used_submit();
        last != NOT_SUBMITTED && last > finished_submit_count
    }
}

/// Anything with a [`GpuResource`] header and native objects to free once unused.
pub trait Tracked: Send + Sync {
    fn resource(&self) -> &GpuResource;
    fn native_objects(&self) -> SmallVec<[NativeObject; 2]>;
}

pub type ResourceRef = Arc<dyn Tracked>;

fn same_resource(a: &dyn Tracked, b: &dyn Tracked) -> bool {
    std::ptr::eq(a.resource(), b.resource())
}

/// Resources used by one command buffer, deduplicated over a recency window.
pub struct UsedResources {
    entries: Vec<ResourceRef>,
    window: usize,
}

impl UsedResources {
    pub fn new(window: usize) -> Self {
        Self {
            entries: Vec::new(),
            window,
        }
    }

    /// Returns `false` when `resource` was already among the most recent entries.
    pub fn add(&mut self, resource: &ResourceRef) -> Result<bool> {
        if recently_added(&self.entries, self.window, |r| {
            same_resource(r.as_ref(), resource.as_ref())
        }) {
            return Ok(false);
        }

        self.entries.try_reserve(1)?;
        resource.resource().acquire();
        self.entries.push(Arc::clone(resource));
        Ok(true)
    }

    pub fn add_tracked<T: Tracked + 'static>(&mut self, item: &Arc<T>) -> Result<bool> {
        let resource: ResourceRef = item.clone();
        self.add(&resource)
    }

    /// Adds every entry of `other`, taking a fresh use for each.
    pub fn extend_from(&mut self, other: &UsedResources) -> Result<()> {
        self.entries.try_reserve(other.entries.len())?;
        for r in &other.entries {
            r.resource().acquire();
            self.entries.push(Arc::clone(r));
        }
        Ok(())
    }

    /// Drops every use without recording a submission.
    pub fn clear(&mut self) {
        for r in self.entries.drain(..) {
            r.resource().release();
        }
    }

    pub fn submitted(&mut self, submit_count: u64) {
        for r in self.entries.drain(..) {
            r.resource().submitted(submit_count);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceRef> {
        self.entries.iter()
    }
}

impl Drop for UsedResources {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Small list deduplicated by a full scan. Holds a use on each entry like [`UsedResources`].
pub struct TrackedSet<T: Tracked> {
    entries: Vec<Arc<T>>,
}

impl<T: Tracked> Default for TrackedSet<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Tracked> TrackedSet<T> {
    pub fn add(&mut self, item: &Arc<T>) -> Result<bool> {
        if self.entries.iter().any(|e| Arc::ptr_eq(e, item)) {
            return Ok(false);
        }
        self.entries.try_reserve(1)?;
        item.resource().acquire();
        self.entries.push(Arc::clone(item));
        Ok(true)
    }

    pub fn extend_from(&mut self, other: &TrackedSet<T>) -> Result<()> {
        for item in &other.entries {
            self.add(item)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        for e in self.entries.drain(..) {
            e.resource().release();
        }
    }

    /// Stamps and releases every entry, handing them back for any per-kind bookkeeping.
    pub fn submitted(&mut self, submit_count: u64) -> Vec<Arc<T>> {
        let entries: Vec<Arc<T>> = self.entries.drain(..).collect();
        for e in &entries {
            e.resource().submitted(submit_count);
        }
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter()
    }
}

impl<T: Tracked> Drop for TrackedSet<T> {
    fn drop(&mut self) {
        self.clear();
    }
}
