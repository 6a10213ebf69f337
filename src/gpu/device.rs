//! Device context shared by every command buffer and resource of one backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::gpu::config::DeviceConfig;
use crate::gpu::deferred::{destroy_tracked, DeferredDeletes};
use crate::gpu::driver::command::{Backend, FenceWait};
use crate::gpu::driver::types::NativeCommandBuffer;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::{FenceResult, ResourceRef, Tracked};
use crate::gpu::submit::SubmitRing;

pub struct Device<B: Backend> {
    backend: B,
    config: DeviceConfig,
    ring: Mutex<SubmitRing>,
    /// Notified when the last fence waiter leaves.
    ring_idle: Condvar,
    deletes: Mutex<DeferredDeletes>,
    shut_down: AtomicBool,
}

impl<B: Backend> Device<B> {
    pub fn new(backend: B, config: DeviceConfig) -> Result<Arc<Self>> {
        let ring = SubmitRing::new(&backend, config.max_submits())?;
        log::debug!(
            target: "strata::render",
            "device created with {} submit slots",
            ring.len()
        );
        Ok(Arc::new(Self {
            backend,
            config,
            ring: Mutex::new(ring),
            ring_idle: Condvar::new(),
            deletes: Mutex::new(DeferredDeletes::new()),
            shut_down: AtomicBool::new(false),
        }))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Number of the last queued submission; zero before the first one.
    pub fn submit_count(&self) -> u64 {
        self.ring.lock().submit_count()
    }

    /// Every submission up to this number has finished on the GPU.
    pub fn finished_submit_count(&self) -> u64 {
        self.ring.lock().finished_submit_count()
    }

    //===------------------------------------------------------------------===//
    // Submission
    //===------------------------------------------------------------------===//

    /// Waits until the ring slot the next submission takes is free, then refreshes the finished
    /// submission count from the fences that have signaled since.
    pub(crate) fn wait_for_submit_slot(&self) -> Result<()> {
        let mut ring = self.ring.lock();
        while ring.waiters > 0 {
            self.ring_idle.wait(&mut ring);
        }

        let slot = ring.curr_slot();
        if slot.submit_index != 0 && slot.submit_index > ring.finished_submit_count() {
            match self
                .backend
                .wait_for_fences(&[slot.fence], self.config.wait_timeout_ns)?
            {
                FenceWait::Signaled => ring.mark_finished(slot.submit_index),
                FenceWait::Timeout => {
                    log::warn!(
                        target: "strata::render",
                        "timed out waiting for submit {} to free its slot",
                        slot.submit_index
                    );
                    return Err(GPUError::timeout());
                }
            }
        }

        for pending in ring.pending() {
            if !self.backend.fence_status(pending.fence)? {
                break;
            }
            ring.mark_finished(pending.submit_index);
        }
        Ok(())
    }

    /// Queues `buffers` with the fence of the current ring slot. Returns the submission number.
    pub(crate) fn queue_submit(&self, buffers: &[NativeCommandBuffer]) -> Result<u64> {
        let mut ring = self.ring.lock();
        while ring.waiters > 0 {
            self.ring_idle.wait(&mut ring);
        }

        let fence = ring.curr_slot().fence;
        self.backend.reset_fences(&[fence])?;
        self.backend.queue_submit(buffers, fence)?;
        let submit = ring.record_submit();
        log::debug!(
            target: "strata::render",
            "submit {}: {} command buffers",
            submit,
            buffers.len()
        );
        Ok(submit)
    }

    /// Waits up to `timeout_ns` for submission `submit` to finish.
    pub fn wait_for_submit(&self, submit: u64, timeout_ns: u64) -> Result<FenceResult> {
        let fences = {
            let mut ring = self.ring.lock();
            if ring.finished_submit_count() >= submit {
                return Ok(FenceResult::Success);
            }
            if submit > ring.submit_count() {
                return Ok(FenceResult::WaitingToQueue);
            }
            let fences = ring.fences_through(submit);
            if fences.is_empty() {
                ring.mark_finished(submit);
                return Ok(FenceResult::Success);
            }
            ring.waiters += 1;
            fences
        };

        let waited = self.backend.wait_for_fences(&fences, timeout_ns);

        let mut ring = self.ring.lock();
        ring.waiters -= 1;
        if ring.waiters == 0 {
            self.ring_idle.notify_all();
        }
        match waited? {
            FenceWait::Signaled => {
                ring.mark_finished(submit);
                Ok(FenceResult::Success)
            }
            FenceWait::Timeout => Ok(FenceResult::Timeout),
        }
    }

    /// Blocks until the GPU is idle. Everything submitted counts as finished afterwards.
    pub fn wait_until_idle(&self) -> Result<()> {
        let mut ring = self.ring.lock();
        while ring.waiters > 0 {
            self.ring_idle.wait(&mut ring);
        }
        self.backend.wait_idle()?;
        let submitted = ring.submit_count();
        ring.mark_finished(submitted);
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Deferred deletion
    //===------------------------------------------------------------------===//

    /// Destroys `item` once no command buffer holds it and its last submission has finished.
    pub fn delete_resource<T: Tracked + 'static>(&self, item: Arc<T>) {
        let resource: ResourceRef = item;
        if self.shut_down.load(Ordering::Acquire) {
            destroy_tracked(&self.backend, resource.as_ref());
            return;
        }
        self.deletes.lock().push(resource);
    }

    /// Destroys deferred resources that are no longer in use and requeues the rest. Returns the
    /// number destroyed.
    pub fn free_deferred(&self) -> usize {
        let finished = self.finished_submit_count();
        let mut deletes = self.deletes.lock();
        let pending = deletes.take_pending();
        let mut freed = 0;
        for resource in pending {
            if resource.resource().is_in_use(finished) {
                deletes.push(resource);
            } else {
                destroy_tracked(&self.backend, resource.as_ref());
                freed += 1;
            }
        }
        if freed > 0 {
            log::debug!(
                target: "strata::render",
                "freed {} deferred resources, {} still pending",
                freed,
                deletes.len()
            );
        }
        freed
    }

    pub fn pending_deletes(&self) -> usize {
        self.deletes.lock().len()
    }

    /// Waits for the GPU, then destroys every deferred resource and the submit fences. Later
    /// deletions are destroyed right away.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let idle = self.wait_until_idle();
        for resource in self.deletes.lock().drain_all() {
            destroy_tracked(&self.backend, resource.as_ref());
        }
        self.ring.lock().destroy_all(&self.backend);
        idle
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!(target: "strata::render", "device shutdown failed: {}", err);
        }
    }
}
