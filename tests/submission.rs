mod common;

use common::TestRenderer;
use serial_test::serial;
use strata::{
    clear_last_error, last_error, BindPoint, BufferCopy, BufferUsage, CommandBuffer,
    CommandBufferUsage, DeviceConfig, ErrorCode, FenceResult, GPUError, GfxFence, MapFlags,
    MaterialValues, NativeObject, NullBackend, NullCall, RecorderKind, Tracked,
};

#[test]
#[serial]
fn fences_on_the_main_buffer_flush_right_away() {
    let mut renderer = TestRenderer::new().unwrap();
    let device = renderer.device();
    let fence = GfxFence::new();

    assert!(matches!(
        fence.wait(&device, 0),
        Err(GPUError::PermissionDenied(_))
    ));

    device.backend().set_auto_signal(false);
    renderer
        .main_command_buffer()
        .set_fences(&[fence.clone()])
        .unwrap();
    assert_eq!(device.submit_count(), 1);
    assert!(fence.is_set());
    assert_eq!(fence.wait(&device, 0).unwrap(), FenceResult::Timeout);

    // A set fence has to be reset before it can be set again.
    assert!(renderer
        .main_command_buffer()
        .set_fences(&[fence.clone()])
        .is_err());
    assert!(renderer.main_command_buffer().set_fences(&[]).is_err());

    device.backend().signal_all();
    assert_eq!(fence.wait(&device, 0).unwrap(), FenceResult::Success);
    assert_eq!(device.finished_submit_count(), 1);

    fence.reset().unwrap();
    assert!(!fence.is_set());
}

#[test]
fn fences_set_inside_a_pass_wait_for_its_end() {
    let mut renderer = TestRenderer::new().unwrap();
    let device = renderer.device();
    let target = renderer.color_target(16, 16, 1, false);
    let fence = GfxFence::new();
    let clear = target.clear_values();

    let cmd = renderer.main_command_buffer();
    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    cmd.set_fences(&[fence.clone()]).unwrap();
    assert!(cmd.has_pending_fence());
    assert_eq!(fence.wait(&device, 0).unwrap(), FenceResult::WaitingToQueue);
    assert_eq!(device.submit_count(), 0);

    cmd.end_render_pass(&target.pass).unwrap();
    assert!(!cmd.has_pending_fence());
    assert_eq!(device.submit_count(), 1);
    assert_eq!(fence.wait(&device, 0).unwrap(), FenceResult::Success);
}

#[test]
#[serial]
fn pooled_buffers_submit_through_the_main_one() {
    let mut renderer = TestRenderer::new().unwrap();
    let src = renderer.buffer(256, BufferUsage::COPY_FROM);
    let dst = renderer.buffer(256, BufferUsage::COPY_TO | BufferUsage::VERTEX);
    let mut pool = renderer
        .create_command_buffer_pool(2, CommandBufferUsage::empty())
        .unwrap();
    assert_eq!(pool.len(), 2);

    let pooled = pool.get_mut(0).unwrap();
    assert_eq!(pooled.kind(), RecorderKind::Pooled);
    pooled.begin().unwrap();
    pooled
        .copy_buffer(
            &src,
            &dst,
            &[BufferCopy {
                src_offset: 0,
                dst_offset: 64,
                size: 128,
            }],
        )
        .unwrap();
    assert!(pooled.flush().is_err());
    pooled.end().unwrap();
    let recorded = pooled.submit_buffers().to_vec();
    assert_eq!(recorded.len(), 1);
    assert_eq!(dst.resource().command_buffer_count(), 1);

    renderer.submit_command_buffer(pooled).unwrap();
    // Single-use buffers hand their resources over on submit.
    assert!(pooled.used_resources().is_empty());
    assert_eq!(dst.resource().command_buffer_count(), 1);

    assert_eq!(renderer.flush().unwrap(), 1);
    assert_eq!(dst.resource().command_buffer_count(), 0);
    assert_eq!(dst.resource().last_used_submit(), 1);
    assert_eq!(src.resource().last_used_submit(), 1);

    let submitted = renderer
        .backend()
        .calls()
        .into_iter()
        .find_map(|c| match c {
            NullCall::QueueSubmit { buffers, .. } => Some(buffers),
            _ => None,
        })
        .unwrap();
    assert_eq!(submitted[0], recorded[0]);
    assert_eq!(submitted.len(), 2);

    pool.prepare().unwrap();
    assert!(pool.get(0).unwrap().submit_buffers().is_empty());
}

#[test]
fn prepare_drops_everything_recorded_mid_pass() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(16, 16, 1, false);
    let src = renderer.buffer(64, BufferUsage::COPY_FROM);
    let dst = renderer.buffer(64, BufferUsage::COPY_TO);
    let mut pool = renderer
        .create_command_buffer_pool(1, CommandBufferUsage::MULTI_FRAME)
        .unwrap();
    let clear = target.clear_values();

    let pooled = pool.get_mut(0).unwrap();
    pooled.begin().unwrap();
    pooled
        .copy_buffer(
            &src,
            &dst,
            &[BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: 64,
            }],
        )
        .unwrap();
    pooled
        .begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    assert_eq!(dst.resource().command_buffer_count(), 1);

    pooled.prepare().unwrap();
    assert!(!pooled.in_render_pass());
    assert!(pooled.used_resources().is_empty());
    assert!(pooled.pending_barriers().is_empty());
    assert!(pooled.submit_buffers().is_empty());
    assert_eq!(dst.resource().command_buffer_count(), 0);
    assert!(!dst.resource().is_in_use(0));

    // The recorder is usable again right away.
    pooled.begin().unwrap();
    pooled
        .begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    pooled.end_render_pass(&target.pass).unwrap();
    pooled.end().unwrap();
    assert_eq!(pooled.submit_buffers().len(), 1);
}

fn denied(renderer: &mut TestRenderer, pooled: &mut CommandBuffer<NullBackend>) -> bool {
    clear_last_error();
    let result = renderer.submit_command_buffer(pooled);
    matches!(result, Err(GPUError::PermissionDenied(_)))
        && last_error() == ErrorCode::PermissionDenied
}

#[test]
#[serial]
fn submits_wait_for_passes_and_shaders_to_end() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(16, 16, 1, false);
    let graphics = renderer.shader(Vec::new(), BindPoint::Graphics);
    let compute = renderer.shader(Vec::new(), BindPoint::Compute);
    let values = MaterialValues::new();
    let clear = target.clear_values();
    let mut pool = renderer
        .create_command_buffer_pool(1, CommandBufferUsage::MULTI_SUBMIT)
        .unwrap();
    let pooled = pool.get_mut(0).unwrap();
    pooled.begin().unwrap();

    // Source inside a pass, then with a graphics shader bound.
    pooled
        .begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    assert!(denied(&mut renderer, pooled));
    pooled.bind_shader(&graphics, &values, None).unwrap();
    assert!(denied(&mut renderer, pooled));
    pooled.unbind_shader(&graphics).unwrap();
    pooled.end_render_pass(&target.pass).unwrap();

    // Source with a compute shader bound.
    pooled.bind_compute_shader(&compute, &values, None).unwrap();
    assert!(denied(&mut renderer, pooled));
    pooled.unbind_compute_shader(&compute).unwrap();

    // Destination inside a pass, then with a compute shader bound.
    renderer
        .main_command_buffer()
        .begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    assert!(denied(&mut renderer, pooled));
    renderer
        .main_command_buffer()
        .end_render_pass(&target.pass)
        .unwrap();
    renderer
        .main_command_buffer()
        .bind_compute_shader(&compute, &values, None)
        .unwrap();
    assert!(denied(&mut renderer, pooled));
    renderer
        .main_command_buffer()
        .unbind_compute_shader(&compute)
        .unwrap();

    pooled.end().unwrap();
    renderer.submit_command_buffer(pooled).unwrap();
    assert_eq!(renderer.flush().unwrap(), 1);
}

#[test]
#[serial]
fn the_main_buffer_is_never_begun_or_submitted() {
    let mut renderer = TestRenderer::new().unwrap();
    let mut pool = renderer
        .create_command_buffer_pool(1, CommandBufferUsage::MULTI_SUBMIT)
        .unwrap();

    let main = renderer.main_command_buffer();
    assert!(main.is_primary());
    assert!(main.begin().is_err());
    assert!(main.end().is_err());
    assert!(main.prepare().is_err());
    assert_eq!(strata::last_error(), ErrorCode::PermissionDenied);

    let pooled = pool.get_mut(0).unwrap();
    let other = TestRenderer::new().unwrap();
    let mut foreign = other
        .create_command_buffer_pool(1, CommandBufferUsage::empty())
        .unwrap();
    assert!(matches!(
        pooled.submit(foreign.get_mut(0).unwrap()),
        Err(GPUError::InvalidArgument(_))
    ));
}

#[test]
fn deferred_deletes_wait_for_the_gpu() {
    let mut renderer = TestRenderer::new().unwrap();
    let device = renderer.device();
    let buffer = renderer.buffer(64, BufferUsage::COPY_TO);
    let native = buffer.native();
    let destroyed = |r: &TestRenderer| {
        r.count(|c| *c == NullCall::Destroy(NativeObject::Buffer(native)))
    };

    device.backend().set_auto_signal(false);
    renderer
        .main_command_buffer()
        .copy_buffer_data(&buffer, 0, &[0u8; 64])
        .unwrap();
    assert_eq!(renderer.flush().unwrap(), 1);
    device.delete_resource(buffer);

    assert_eq!(renderer.flush().unwrap(), 2);
    assert_eq!(destroyed(&renderer), 0);
    assert_eq!(device.pending_deletes(), 1);

    device.backend().signal_all();
    device.backend().set_auto_signal(true);
    assert_eq!(renderer.flush().unwrap(), 3);
    assert_eq!(destroyed(&renderer), 1);
    assert_eq!(device.pending_deletes(), 0);
}

#[test]
fn recording_slots_are_recycled_once_their_submit_finishes() {
    let config = DeviceConfig::default()
        .delay_frames(1)
        .expected_frame_flushes(2);
    let mut renderer = TestRenderer::with_config(config).unwrap();

    assert_eq!(renderer.flush().unwrap(), 1);
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::ResetCommandPool(_))),
        0
    );
    assert_eq!(renderer.flush().unwrap(), 2);
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::ResetCommandPool(_))),
        1
    );
    assert_eq!(renderer.flush().unwrap(), 3);
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::CreateCommandPool(_))),
        2
    );
}

#[test]
#[serial]
fn read_maps_wait_for_the_last_submission() {
    let mut renderer = TestRenderer::new().unwrap();
    let device = renderer.device();
    let readback = renderer.readable_buffer(256, BufferUsage::COPY_TO);

    device.backend().set_auto_signal(false);
    renderer
        .main_command_buffer()
        .copy_buffer_data(&readback, 0, &[7u8; 16])
        .unwrap();
    renderer.flush().unwrap();

    assert!(matches!(
        readback.map(&device, MapFlags::READ, 0, 16),
        Err(GPUError::Timeout)
    ));
    assert!(!readback.is_mapped());

    // Write maps never wait.
    readback.map(&device, MapFlags::WRITE, 0, 16).unwrap();
    readback.unmap().unwrap();

    device.backend().signal_all();
    let range = readback.map(&device, MapFlags::READ, 0, 16).unwrap();
    assert_eq!((range.offset, range.size), (0, 16));
    assert!(readback.map(&device, MapFlags::READ, 0, 16).is_err());
    readback.unmap().unwrap();
    assert!(readback.map(&device, MapFlags::READ, 200, 100).is_err());
}

#[test]
fn waiting_for_idle_flushes_pending_work() {
    let mut renderer = TestRenderer::new().unwrap();
    let buffer = renderer.buffer(64, BufferUsage::COPY_TO);
    renderer
        .main_command_buffer()
        .copy_buffer_data(&buffer, 0, &[1u8; 4])
        .unwrap();

    renderer.wait_until_idle().unwrap();
    assert_eq!(renderer.device().submit_count(), 1);
    assert_eq!(renderer.device().finished_submit_count(), 1);
    assert_eq!(renderer.count(|c| *c == NullCall::WaitIdle), 1);
    assert!(!buffer.resource().is_in_use(1));
}
