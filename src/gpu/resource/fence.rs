use std::sync::Arc;

use smallvec::SmallVec;

use crate::gpu::device::Device;
use crate::gpu::driver::command::Backend;
use crate::gpu::driver::types::NativeObject;
use crate::gpu::error::{GPUError, Result};

use super::{GpuResource, Tracked, NOT_SUBMITTED};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FenceResult {
    Success,
    Timeout,
    /// The submission hasn't been queued yet; the command buffer still needs a flush.
    WaitingToQueue,
}

/// User-facing fence. Signals once the submission it was set on finishes; backed by the
/// device's submit ring rather than a native fence of its own.
pub struct GfxFence {
    resource: GpuResource,
}

impl GfxFence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
        })
    }

    pub fn is_set(&self) -> bool {
        self.resource.command_buffer_count() > 0
            || self.resource.last_used_submit() != NOT_SUBMITTED
    }

    pub fn wait<B: Backend>(&self, device: &Device<B>, timeout_ns: u64) -> Result<FenceResult> {
        if self.resource.command_buffer_count() > 0 {
            return Ok(FenceResult::WaitingToQueue);
        }
        let submit = self.resource.last_used_submit();
        if submit == NOT_SUBMITTED {
            return Err(GPUError::permission_denied(
                "Fence must be set on a command buffer before waiting.",
            ));
        }
        device.wait_for_submit(submit, timeout_ns)
    }

    pub fn reset(&self) -> Result<()> {
        if self.resource.command_buffer_count() > 0 {
            return Err(GPUError::permission_denied(
                "Cannot reset a fence that is still queued.",
            ));
        }
        self.resource.reset_submit();
        Ok(())
    }
}

impl Tracked for GfxFence {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        SmallVec::new()
    }
}
