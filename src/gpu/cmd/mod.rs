//! Logical command buffers.
//!
//! A [`CommandBuffer`] records into native primary buffers it starts on demand, plus one
//! secondary buffer per subpass while a render pass is open. The device's main command buffer
//! rotates through one recording slot per in-flight submission; pooled command buffers own a
//! single slot and are handed to the main one through [`CommandBuffer::submit`].

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::gpu::binding::{BindingScope, Shader, SharedBindingSets, VolatileBindingSets};
use crate::gpu::device::Device;
use crate::gpu::driver::command::{Backend, CommandBufferBegin};
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::{
    FenceResult, GfxFence, GpuResource, RenderSurface, ResourceRef, Texture, Tracked, TrackedSet,
    UsedResources, NOT_SUBMITTED,
};
use crate::sync::barrier_batch::BarrierBatch;

pub mod copy;
pub mod draw;
pub mod flush;
pub mod native_pool;
pub mod pool;
pub mod query;
pub mod render_pass;

pub use copy::{TextureBlitRegion, TextureCopyRegion, TexturePosition, MAX_BUFFER_UPDATE_SIZE};
pub use native_pool::NativeBufferPool;
pub use pool::CommandBufferPool;
pub use render_pass::{ActivePass, AttachmentInfo, AttachmentUsage, RenderPass};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecorderKind {
    /// The device's main command buffer. Flushed, never begun or ended.
    Primary,
    /// Owned by a [`CommandBufferPool`]; recorded between `begin` and `end`, then submitted into
    /// the main command buffer.
    Pooled,
}

/// Lifetime token of one logical command buffer. Submissions stamp it like any resource; the
/// native pools are moved in on drop so they outlive every submission that used them.
pub struct CommandBufferResource {
    resource: GpuResource,
    retired: Mutex<SmallVec<[NativeObject; 2]>>,
}

impl CommandBufferResource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            resource: GpuResource::new(),
            retired: Mutex::new(SmallVec::new()),
        })
    }
}

impl Tracked for CommandBufferResource {
    fn resource(&self) -> &GpuResource {
        &self.resource
    }

    fn native_objects(&self) -> SmallVec<[NativeObject; 2]> {
        self.retired.lock().clone()
    }
}

/// Native command pool and volatile binding pools recorded into together.
struct RecordingSlot {
    natives: NativeBufferPool,
    volatile: VolatileBindingSets,
    /// Submission that last used this slot.
    parked_submit: u64,
}

impl RecordingSlot {
    fn new<B: Backend>(device: &Device<B>) -> Result<Self> {
        Ok(Self {
            natives: NativeBufferPool::new(device.backend())?,
            volatile: VolatileBindingSets::new(device.config().binding_pool_sizes),
            parked_submit: NOT_SUBMITTED,
        })
    }

    fn recycle<B: Backend>(&mut self, backend: &B) -> Result<()> {
        self.parked_submit = NOT_SUBMITTED;
        self.natives.reset(backend)?;
        self.volatile.clear(backend)
    }

    fn retire(&mut self, out: &mut SmallVec<[NativeObject; 2]>) {
        if let Some(raw) = self.natives.retire() {
            out.push(NativeObject::CommandPool(raw));
        }
        out.extend(
            self.volatile
                .take_pools()
                .into_iter()
                .map(NativeObject::BindingPool),
        );
    }
}

enum Recorder {
    /// Slots are created on first use, one per in-flight submission.
    Primary {
        slots: Vec<Option<RecordingSlot>>,
        current: usize,
    },
    Pooled(RecordingSlot),
}

impl Recorder {
    fn kind(&self) -> RecorderKind {
        match self {
            Recorder::Primary { .. } => RecorderKind::Primary,
            Recorder::Pooled(_) => RecorderKind::Pooled,
        }
    }

    fn slot_mut<B: Backend>(&mut self, device: &Device<B>) -> Result<&mut RecordingSlot> {
        match self {
            Recorder::Pooled(slot) => Ok(slot),
            Recorder::Primary { slots, current } => {
                let entry = &mut slots[*current];
                if entry.is_none() {
                    *entry = Some(RecordingSlot::new(device)?);
                    log::debug!(
                        target: "strata::render",
                        "main command buffer slot {} created",
                        current
                    );
                }
                entry
                    .as_mut()
                    .ok_or_else(|| GPUError::backend("Recording slot missing."))
            }
        }
    }
}

/// Bound state of the native buffer currently recorded into, to skip redundant binds.
#[derive(Debug, Default)]
pub(crate) struct BoundState {
    pub(crate) pipeline: Option<NativePipeline>,
    pub(crate) first_vertex_binding: u32,
    pub(crate) vertex_buffers: SmallVec<[(NativeBuffer, u64); 4]>,
    pub(crate) index_buffer: Option<(NativeBuffer, u64, IndexType)>,
}

/// Command recorder. Tracks the render pass, bound shaders and render surface, the resources
/// every recorded command touches and the barriers still waiting to be emitted.
pub struct CommandBuffer<B: Backend> {
    device: Arc<Device<B>>,
    usage: CommandBufferUsage,
    recorder: Recorder,
    owner: Arc<CommandBufferResource>,

    /// Primary buffer recorded into outside of render passes.
    active: Option<NativeCommandBuffer>,
    /// Finished primaries, in submission order.
    submit_buffers: Vec<NativeCommandBuffer>,

    used: UsedResources,
    readback_offscreens: TrackedSet<Texture>,
    render_surfaces: TrackedSet<RenderSurface>,
    /// Barriers for binds; emitted around render passes and before dispatches.
    barriers: BarrierBatch,
    /// Barriers for copies, blits and clears; emitted immediately.
    copy_barriers: BarrierBatch,

    render_pass: Option<ActivePass>,
    bound_shader: Option<Arc<Shader>>,
    bound_compute_shader: Option<Arc<Shader>>,
    bound_surface: Option<Arc<RenderSurface>>,
    bound: BoundState,

    shared_global: SharedBindingSets,
    shared_instance: SharedBindingSets,
    fence_set: bool,
}

impl<B: Backend> CommandBuffer<B> {
    pub(crate) fn new_primary(device: Arc<Device<B>>) -> Self {
        let slots = (0..device.config().max_submits()).map(|_| None).collect();
        let recorder = Recorder::Primary { slots, current: 0 };
        Self::with_recorder(device, CommandBufferUsage::empty(), recorder)
    }

    pub(crate) fn new_pooled(device: Arc<Device<B>>, usage: CommandBufferUsage) -> Result<Self> {
        let slot = RecordingSlot::new(&device)?;
        Ok(Self::with_recorder(device, usage, Recorder::Pooled(slot)))
    }

    fn with_recorder(device: Arc<Device<B>>, usage: CommandBufferUsage, recorder: Recorder) -> Self {
        let window = device.config().recently_added_window;
        Self {
            device,
            usage,
            recorder,
            owner: CommandBufferResource::new(),
            active: None,
            submit_buffers: Vec::new(),
            used: UsedResources::new(window),
            readback_offscreens: TrackedSet::default(),
            render_surfaces: TrackedSet::default(),
            barriers: BarrierBatch::new(window),
            copy_barriers: BarrierBatch::new(window),
            render_pass: None,
            bound_shader: None,
            bound_compute_shader: None,
            bound_surface: None,
            bound: BoundState::default(),
            shared_global: SharedBindingSets::new(BindingScope::Global),
            shared_instance: SharedBindingSets::new(BindingScope::Instance),
            fence_set: false,
        }
    }

    pub fn device(&self) -> &Arc<Device<B>> {
        &self.device
    }

    pub fn kind(&self) -> RecorderKind {
        self.recorder.kind()
    }

    pub fn is_primary(&self) -> bool {
        self.kind() == RecorderKind::Primary
    }

    pub fn usage(&self) -> CommandBufferUsage {
        self.usage
    }

    pub fn render_pass(&self) -> Option<&ActivePass> {
        self.render_pass.as_ref()
    }

    pub fn in_render_pass(&self) -> bool {
        self.render_pass.is_some()
    }

    pub fn bound_shader(&self) -> Option<&Arc<Shader>> {
        self.bound_shader.as_ref()
    }

    pub fn bound_compute_shader(&self) -> Option<&Arc<Shader>> {
        self.bound_compute_shader.as_ref()
    }

    pub fn bound_surface(&self) -> Option<&Arc<RenderSurface>> {
        self.bound_surface.as_ref()
    }

    pub fn used_resources(&self) -> &UsedResources {
        &self.used
    }

    pub fn readback_offscreens(&self) -> &TrackedSet<Texture> {
        &self.readback_offscreens
    }

    pub fn render_surfaces(&self) -> &TrackedSet<RenderSurface> {
        &self.render_surfaces
    }

    /// Barriers queued by binds and not yet emitted.
    pub fn pending_barriers(&self) -> &BarrierBatch {
        &self.barriers
    }

    /// Finished native primaries waiting for submission.
    pub fn submit_buffers(&self) -> &[NativeCommandBuffer] {
        &self.submit_buffers
    }

    /// Whether a fence waits for the next flush of this command buffer.
    pub fn has_pending_fence(&self) -> bool {
        self.fence_set
    }

    pub(crate) fn owner(&self) -> &Arc<CommandBufferResource> {
        &self.owner
    }

    //===------------------------------------------------------------------===//
    // Native buffers
    //===------------------------------------------------------------------===//

    /// Native buffer commands are recorded into: the current subpass buffer inside a render
    /// pass, the active primary otherwise. A primary is started when none is active.
    pub fn get_command_buffer(&mut self) -> Result<NativeCommandBuffer> {
        if let Some(pass) = &self.render_pass {
            return pass.current_buffer();
        }
        self.primary_buffer()
    }

    /// Active primary buffer, even while a render pass is being recorded.
    pub(crate) fn primary_buffer(&mut self) -> Result<NativeCommandBuffer> {
        if let Some(cmd) = self.active {
            return Ok(cmd);
        }

        let device = Arc::clone(&self.device);
        let backend = device.backend();
        self.submit_buffers.try_reserve(1)?;
        let cmd = self
            .recorder
            .slot_mut(&device)?
            .natives
            .alloc(backend, CommandBufferLevel::Primary)?;
        backend.begin_command_buffer(
            cmd,
            &CommandBufferBegin {
                one_time_submit: self.usage.is_single_use(),
                simultaneous_use: self.usage.contains(CommandBufferUsage::MULTI_SUBMIT),
                inheritance: None,
            },
        )?;
        self.submit_buffers.push(cmd);
        self.active = Some(cmd);
        self.bound = BoundState::default();
        Ok(cmd)
    }

    /// Ends the active primary so the next command starts a new one.
    pub fn finish_command_buffer(&mut self) -> Result<()> {
        if let Some(cmd) = self.active.take() {
            self.bound = BoundState::default();
            self.device.backend().end_command_buffer(cmd)?;
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Lifecycle
    //===------------------------------------------------------------------===//

    pub fn begin(&mut self) -> Result<()> {
        if self.is_primary() {
            return Err(GPUError::permission_denied(
                "Cannot begin the main command buffer.",
            ));
        }
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        if self.is_primary() {
            return Err(GPUError::permission_denied(
                "Cannot end the main command buffer.",
            ));
        }
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot end a command buffer inside of a render pass.",
            ));
        }
        if self.bound_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot end a command buffer while a shader is bound.",
            ));
        }
        if self.bound_compute_shader.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot end a command buffer while a compute shader is bound.",
            ));
        }
        if self.bound_surface.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot end a command buffer while a render surface is bound.",
            ));
        }
        self.finish_command_buffer()
    }

    /// Readies a pooled command buffer for recording again. Everything recorded since the last
    /// prepare is dropped without being submitted.
    pub fn prepare(&mut self) -> Result<()> {
        if self.is_primary() {
            return Err(GPUError::permission_denied(
                "Cannot prepare the main command buffer.",
            ));
        }

        self.active = None;
        self.submit_buffers.clear();
        self.clear_used_resources();
        self.barriers.reset();
        self.copy_barriers.reset();
        self.render_pass = None;
        self.bound_shader = None;
        self.bound_compute_shader = None;
        self.bound_surface = None;
        self.bound = BoundState::default();
        self.shared_global.clear_last_set(&self.device);
        self.shared_instance.clear_last_set(&self.device);
        self.fence_set = false;

        let backend = self.device.backend();
        match &mut self.recorder {
            Recorder::Pooled(slot) => slot.recycle(backend),
            Recorder::Primary { .. } => Ok(()),
        }
    }

    //===------------------------------------------------------------------===//
    // Resource tracking
    //===------------------------------------------------------------------===//

    /// Holds a use on `resource` until the next submission. Returns `false` if it was already
    /// among the most recently added.
    pub fn add_resource(&mut self, resource: &ResourceRef) -> Result<bool> {
        self.used.add(resource)
    }

    pub fn add_tracked<T: Tracked + 'static>(&mut self, item: &Arc<T>) -> Result<bool> {
        self.used.add_tracked(item)
    }

    pub fn add_readback_offscreen(&mut self, texture: &Arc<Texture>) -> Result<bool> {
        self.readback_offscreens.add(texture)
    }

    pub fn add_render_surface(&mut self, surface: &Arc<RenderSurface>) -> Result<bool> {
        self.render_surfaces.add(surface)
    }

    /// Drops every tracked use without recording a submission.
    pub fn clear_used_resources(&mut self) {
        self.used.clear();
        self.readback_offscreens.clear();
        self.render_surfaces.clear();
    }

    /// Stamps every tracked resource with `submit` and drops the uses.
    pub fn submitted_resources(&mut self, submit: u64) {
        self.used.submitted(submit);
        for texture in self.readback_offscreens.submitted(submit) {
            texture.set_last_draw_submit(submit);
        }
        self.render_surfaces.submitted(submit);
    }

    //===------------------------------------------------------------------===//
    // Submission
    //===------------------------------------------------------------------===//

    /// Appends the recorded work of `src` to this command buffer. Resources used by `src` are
    /// held until this command buffer is submitted.
    pub fn submit(&mut self, src: &mut CommandBuffer<B>) -> Result<()> {
        if src.is_primary() {
            return Err(GPUError::permission_denied(
                "Cannot submit the main command buffer.",
            ));
        }
        if !Arc::ptr_eq(&self.device, &src.device) {
            return Err(GPUError::invalid_argument(
                "Command buffers were created from different devices.",
            ));
        }
        if self.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot submit a command buffer inside of a render pass.",
            ));
        }
        if src.render_pass.is_some() {
            return Err(GPUError::permission_denied(
                "Cannot submit a command buffer that is inside of a render pass.",
            ));
        }
        if self.bound_shader.is_some()
            || src.bound_shader.is_some()
            || self.bound_compute_shader.is_some()
            || src.bound_compute_shader.is_some()
        {
            return Err(GPUError::permission_denied(
                "Cannot submit a command buffer when a shader is bound.",
            ));
        }

        src.finish_command_buffer()?;
        self.used.add_tracked(&src.owner)?;
        self.used.extend_from(&src.used)?;
        self.readback_offscreens
            .extend_from(&src.readback_offscreens)?;
        self.render_surfaces.extend_from(&src.render_surfaces)?;

        if !src.submit_buffers.is_empty() {
            self.finish_command_buffer()?;
            self.submit_buffers.try_reserve(src.submit_buffers.len())?;
            self.submit_buffers.extend_from_slice(&src.submit_buffers);
        }

        if src.usage.is_single_use() {
            src.clear_used_resources();
        }

        if src.fence_set {
            src.fence_set = false;
            self.submit_fence()?;
        }
        Ok(())
    }

    /// Signals `fences` once the work recorded so far finishes. On the main command buffer
    /// outside of a render pass this flushes right away.
    pub fn set_fences(&mut self, fences: &[Arc<GfxFence>]) -> Result<()> {
        if fences.is_empty() {
            return Err(GPUError::invalid_argument(
                "At least one fence must be provided.",
            ));
        }
        if fences.iter().any(|f| f.is_set()) {
            return Err(GPUError::permission_denied(
                "Fence has already been set; reset it first.",
            ));
        }
        for fence in fences {
            self.used.add_tracked(fence)?;
        }
        self.submit_fence()
    }

    fn submit_fence(&mut self) -> Result<()> {
        if self.is_primary() && self.render_pass.is_none() {
            self.fence_set = false;
            self.flush()?;
        } else {
            self.fence_set = true;
        }
        Ok(())
    }

    /// Moves the main command buffer to its next recording slot after submission `submit`,
    /// recycling the slot once the submission that last used it has finished.
    fn advance_slot(&mut self, submit: u64) -> Result<()> {
        let Recorder::Primary { slots, current } = &mut self.recorder else {
            return Ok(());
        };
        if let Some(slot) = slots[*current].as_mut() {
            slot.parked_submit = submit;
        }
        *current = (*current + 1) % slots.len();

        let Some(slot) = slots[*current].as_mut() else {
            return Ok(());
        };
        if slot.parked_submit == NOT_SUBMITTED {
            return Ok(());
        }
        let parked = slot.parked_submit;
        let timeout = self.device.config().wait_timeout_ns;
        match self.device.wait_for_submit(parked, timeout)? {
            FenceResult::Success => {}
            other => log::warn!(
                target: "strata::render",
                "reusing recording slot of submit {} before it finished ({:?})",
                parked,
                other
            ),
        }
        slot.recycle(self.device.backend())
    }
}

impl<B: Backend> Drop for CommandBuffer<B> {
    fn drop(&mut self) {
        self.clear_used_resources();
        self.barriers.reset();
        self.copy_barriers.reset();

        let mut retired = SmallVec::new();
        match &mut self.recorder {
            Recorder::Primary { slots, .. } => {
                for slot in slots.iter_mut().flatten() {
                    slot.retire(&mut retired);
                }
            }
            Recorder::Pooled(slot) => slot.retire(&mut retired),
        }
        *self.owner.retired.lock() = retired;

        self.shared_global.shutdown(&self.device);
        self.shared_instance.shutdown(&self.device);
        self.device.delete_resource(Arc::clone(&self.owner));
    }
}
