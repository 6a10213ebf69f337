use crate::gpu::driver::command::Backend;
use crate::gpu::resource::{ResourceRef, Tracked};
use crate::utils::PerFrame;

/// Resources waiting for the GPU to let go of them, split over two lists. Deletions go into the
/// current list; each flush takes it and requeues whatever is still in use into the other one.
pub struct DeferredDeletes {
    lists: PerFrame<Vec<ResourceRef>>,
}

impl Default for DeferredDeletes {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredDeletes {
    pub fn new() -> Self {
        Self {
            lists: PerFrame::new(2),
        }
    }

    pub fn push(&mut self, resource: ResourceRef) {
        self.lists.curr_mut().push(resource);
    }

    pub fn len(&self) -> usize {
        let mut len = 0;
        self.lists.for_each(|l| len += l.len());
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the current list and makes the other one current.
    pub fn take_pending(&mut self) -> Vec<ResourceRef> {
        self.lists.take_and_advance()
    }

    pub fn drain_all(&mut self) -> Vec<ResourceRef> {
        let mut all = Vec::new();
        self.lists.for_each_mut(|l| all.append(l));
        all
    }
}

/// Destroys every native object behind `item`.
pub fn destroy_tracked<B: Backend + ?Sized>(backend: &B, item: &dyn Tracked) {
    for object in item.native_objects() {
        backend.destroy_native(object);
    }
}
