mod common;

use common::TestRenderer;
use serial_test::serial;
use common::position;
use strata::{
    clear_last_error, last_error, Access, BindPoint, BindingScope, BufferUsage, ClearValue, Draw,
    DrawIndexed, ElementType, ErrorCode, Filter, Format, GPUError, IndexType, Layout,
    MaterialElement, MaterialValues, NullCall, RenderSurface, TextureBlitRegion, TextureInfo,
    TexturePosition, TextureUsage, Tracked, Viewport,
};

#[test]
#[serial]
fn draws_need_a_pass_and_a_shader() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let shader = renderer.shader(Vec::new(), BindPoint::Graphics);
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    clear_last_error();
    let err = cmd.draw(&Draw::default()).unwrap_err();
    assert!(matches!(err, GPUError::PermissionDenied(_)));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);

    assert!(cmd
        .bind_shader(&shader, &MaterialValues::new(), None)
        .is_err());

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    assert!(matches!(
        cmd.draw(&Draw::default()),
        Err(GPUError::PermissionDenied(_))
    ));

    cmd.bind_shader(&shader, &MaterialValues::new(), None)
        .unwrap();
    assert!(cmd
        .bind_shader(&shader, &MaterialValues::new(), None)
        .is_err());
    cmd.draw(&Draw::default()).unwrap();

    clear_last_error();
    assert!(matches!(
        cmd.draw_indexed(&DrawIndexed::default()),
        Err(GPUError::InvalidArgument(_))
    ));
    assert_eq!(last_error(), ErrorCode::InvalidArgument);

    assert!(cmd.end_render_pass(&target.pass).is_err());
    cmd.unbind_shader(&shader).unwrap();
    cmd.end_render_pass(&target.pass).unwrap();
}

#[test]
#[serial]
fn transfers_are_rejected_inside_a_pass() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let buffer = renderer.buffer(64, BufferUsage::COPY_TO);
    let texture = renderer.texture(
        TextureInfo::default(),
        TextureUsage::TEXTURE | TextureUsage::COPY_TO,
    );
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.copy_buffer_data(&buffer, 0, &[0u8; 16]),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);
    assert!(cmd
        .clear_color_surface(&texture, &ClearValue::Color([1.0; 4]))
        .is_err());
    assert!(cmd.flush().is_err());
    cmd.end_render_pass(&target.pass).unwrap();

    cmd.copy_buffer_data(&buffer, 0, &[0u8; 16]).unwrap();
    cmd.clear_color_surface(&texture, &ClearValue::Color([1.0; 4]))
        .unwrap();
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::UpdateBuffer { .. })),
        1
    );
}

#[test]
#[serial]
fn buffer_updates_are_validated() {
    let mut renderer = TestRenderer::new().unwrap();
    let buffer = renderer.buffer(128, BufferUsage::COPY_TO);
    let vertex_only = renderer.buffer(128, BufferUsage::VERTEX);
    let cmd = renderer.main_command_buffer();

    assert!(matches!(
        cmd.copy_buffer_data(&buffer, 0, &[]),
        Err(GPUError::InvalidArgument(_))
    ));
    assert!(matches!(
        cmd.copy_buffer_data(&buffer, 2, &[0u8; 4]),
        Err(GPUError::InvalidArgument(_))
    ));
    assert!(matches!(
        cmd.copy_buffer_data(&buffer, 0, &[0u8; 6]),
        Err(GPUError::InvalidArgument(_))
    ));
    clear_last_error();
    assert!(matches!(
        cmd.copy_buffer_data(&buffer, 64, &[0u8; 128]),
        Err(GPUError::OutOfRange(_))
    ));
    assert_eq!(last_error(), ErrorCode::OutOfRange);
    assert!(cmd.copy_buffer_data(&vertex_only, 0, &[0u8; 4]).is_err());

    cmd.copy_buffer_data_pod(&buffer, 64, &[1u32, 2, 3, 4])
        .unwrap();
}

#[test]
#[serial]
fn pass_arguments_are_checked() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let cmd = renderer.main_command_buffer();

    clear_last_error();
    assert!(matches!(
        cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &[]),
        Err(GPUError::InvalidArgument(_))
    ));
    assert_eq!(last_error(), ErrorCode::InvalidArgument);

    let two = [ClearValue::default(), ClearValue::default()];
    assert!(cmd
        .begin_render_pass(&target.pass, &target.framebuffer, None, &two)
        .is_err());

    let too_wide = Viewport {
        width: 64.0,
        height: 32.0,
        max_depth: 1.0,
        ..Default::default()
    };
    clear_last_error();
    assert!(matches!(
        cmd.begin_render_pass(
            &target.pass,
            &target.framebuffer,
            Some(too_wide),
            &target.clear_values()
        ),
        Err(GPUError::OutOfRange(_))
    ));
    assert_eq!(last_error(), ErrorCode::OutOfRange);
    assert!(!cmd.in_render_pass());

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &target.clear_values())
        .unwrap();
    assert!(cmd
        .begin_render_pass(&target.pass, &target.framebuffer, None, &target.clear_values())
        .is_err());
    cmd.end_render_pass(&target.pass).unwrap();
    assert!(cmd.end_render_pass(&target.pass).is_err());
}

#[test]
#[serial]
fn compute_runs_outside_of_passes() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let storage = renderer.buffer(256, BufferUsage::UNIFORM_BUFFER);
    let compute = renderer.shader(
        vec![MaterialElement::new(
            "particles",
            ElementType::UniformBuffer,
            BindingScope::Material,
            0,
        )],
        BindPoint::Compute,
    );
    let graphics = renderer.shader(Vec::new(), BindPoint::Graphics);
    let mut values = MaterialValues::new();
    values.set_buffer("particles", storage.clone(), 0, 0);
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    assert!(cmd.dispatch(1, 1, 1).is_err());
    assert!(cmd.bind_compute_shader(&graphics, &values, None).is_err());

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    assert!(cmd.bind_compute_shader(&compute, &values, None).is_err());
    cmd.end_render_pass(&target.pass).unwrap();

    cmd.bind_compute_shader(&compute, &values, None).unwrap();
    assert!(cmd
        .begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .is_err());
    cmd.dispatch(8, 1, 1).unwrap();
    cmd.unbind_compute_shader(&compute).unwrap();

    // The storage buffer's write-to-read barrier is emitted right before the dispatch.
    let calls = renderer.backend().calls();
    let dispatch = calls
        .iter()
        .position(|c| matches!(c, NullCall::Dispatch { .. }))
        .unwrap();
    match &calls[dispatch - 1] {
        NullCall::PipelineBarrier { buffers, .. } => {
            assert_eq!(buffers.len(), 1);
            assert_eq!(buffers[0].buffer, storage.native());
            assert_eq!(buffers[0].size, 256);
        }
        other => panic!("expected a barrier before the dispatch, got {:?}", other),
    }
}

#[test]
#[serial]
fn copies_within_one_texture_are_rejected() {
    let mut renderer = TestRenderer::new().unwrap();
    let texture = renderer.texture(
        TextureInfo {
            width: 16,
            height: 16,
            mip_levels: 5,
            ..Default::default()
        },
        TextureUsage::TEXTURE | TextureUsage::COPY_FROM | TextureUsage::COPY_TO,
    );
    let staging = renderer.buffer(16 * 16 * 4, BufferUsage::COPY_FROM);
    let cmd = renderer.main_command_buffer();

    assert!(matches!(
        cmd.copy_texture(&texture, &texture, &[]),
        Err(GPUError::InvalidArgument(_))
    ));

    let beyond = TexturePosition {
        mip_level: 5,
        ..Default::default()
    };
    assert!(matches!(
        cmd.copy_texture_data(&texture, &beyond, 1, 1, 1, &staging, 0),
        Err(GPUError::OutOfRange(_))
    ));

    cmd.copy_texture_data(&texture, &TexturePosition::default(), 16, 16, 1, &staging, 0)
        .unwrap();
    cmd.generate_mipmaps(&texture).unwrap();
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::BlitImage { .. })),
        4
    );
}

#[test]
#[serial]
fn render_surfaces_are_bracketed_outside_of_shaders() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let backend = renderer.backend();
    let surface = RenderSurface::new(
        backend.create_image().unwrap(),
        backend.create_image_view().unwrap(),
        Format::BGRA8Unorm,
        32,
        32,
    );
    let other = RenderSurface::new(
        backend.create_image().unwrap(),
        backend.create_image_view().unwrap(),
        Format::BGRA8Unorm,
        32,
        32,
    );
    let compute = renderer.shader(Vec::new(), BindPoint::Compute);
    let graphics = renderer.shader(Vec::new(), BindPoint::Graphics);
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.begin_render_surface(&surface),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);
    cmd.end_render_pass(&target.pass).unwrap();

    cmd.bind_compute_shader(&compute, &MaterialValues::new(), None)
        .unwrap();
    assert!(matches!(
        cmd.begin_render_surface(&surface),
        Err(GPUError::PermissionDenied(_))
    ));
    cmd.unbind_compute_shader(&compute).unwrap();

    cmd.begin_render_surface(&surface).unwrap();
    assert!(matches!(
        cmd.begin_render_surface(&other),
        Err(GPUError::PermissionDenied(_))
    ));
    assert!(cmd.end_render_surface(&other).is_err());

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    cmd.bind_shader(&graphics, &MaterialValues::new(), None)
        .unwrap();
    assert!(cmd.end_render_surface(&surface).is_err());
    cmd.unbind_shader(&graphics).unwrap();
    assert!(cmd.end_render_surface(&surface).is_err());
    cmd.end_render_pass(&target.pass).unwrap();

    cmd.bind_compute_shader(&compute, &MaterialValues::new(), None)
        .unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.end_render_surface(&surface),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);
    cmd.unbind_compute_shader(&compute).unwrap();
    cmd.end_render_surface(&surface).unwrap();
    cmd.begin_render_surface(&other).unwrap();
    cmd.end_render_surface(&other).unwrap();

    let to_present = renderer.count(|c| {
        matches!(c, NullCall::PipelineBarrier { images, .. }
            if images.len() == 1 && images[0].new_layout == Layout::Present)
    });
    assert_eq!(to_present, 2);
}

#[test]
#[serial]
fn blits_are_wrapped_in_transfer_barriers() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let info = TextureInfo {
        width: 32,
        height: 32,
        ..Default::default()
    };
    let src = renderer.texture(info, TextureUsage::TEXTURE | TextureUsage::COPY_FROM);
    let dst = renderer.texture(info, TextureUsage::TEXTURE | TextureUsage::COPY_TO);
    let region = TextureBlitRegion {
        src: TexturePosition::default(),
        dst: TexturePosition::default(),
        src_width: 32,
        src_height: 32,
        dst_width: 16,
        dst_height: 16,
        layers: 1,
    };
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.blit_texture(&src, &dst, &[region], Filter::Linear),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);
    cmd.end_render_pass(&target.pass).unwrap();
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::BlitImage { .. })),
        0
    );

    let cmd = renderer.main_command_buffer();
    assert!(matches!(
        cmd.blit_texture(&dst, &src, &[region], Filter::Linear),
        Err(GPUError::InvalidArgument(_))
    ));
    cmd.blit_texture(&src, &dst, &[region], Filter::Linear)
        .unwrap();
    assert_eq!(src.resource().command_buffer_count(), 1);
    assert_eq!(dst.resource().command_buffer_count(), 1);

    let calls = renderer.backend().calls();
    let blit = position(&calls, |c| matches!(c, NullCall::BlitImage { .. }));
    match &calls[blit] {
        NullCall::BlitImage {
            src: from,
            dst: to,
            regions,
            filter,
            ..
        } => {
            assert_eq!(*from, src.native());
            assert_eq!(*to, dst.native());
            assert_eq!(regions.len(), 1);
            assert_eq!(regions[0].dst_offsets[1].x, 16);
            assert_eq!(*filter, Filter::Linear);
        }
        _ => unreachable!(),
    }
    match &calls[blit - 1] {
        NullCall::PipelineBarrier { images, .. } => {
            assert_eq!(images.len(), 2);
            assert_eq!(images[0].new_layout, Layout::TransferSrc);
            assert_eq!(images[1].new_layout, Layout::TransferDst);
        }
        other => panic!("expected a barrier before the blit, got {:?}", other),
    }
    match &calls[blit + 1] {
        NullCall::PipelineBarrier { images, .. } => {
            assert_eq!(images.len(), 2);
            assert_eq!(images[0].old_layout, Layout::TransferSrc);
            assert_eq!(images[1].old_layout, Layout::TransferDst);
        }
        other => panic!("expected a barrier after the blit, got {:?}", other),
    }
}

#[test]
#[serial]
fn indirect_draws_read_their_arguments_from_a_buffer() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let shader = renderer.shader(Vec::new(), BindPoint::Graphics);
    let args = renderer.buffer(256, BufferUsage::INDIRECT_DRAW | BufferUsage::COPY_TO);
    let plain = renderer.buffer(256, BufferUsage::VERTEX);
    let indices = renderer.buffer(256, BufferUsage::INDEX);
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    clear_last_error();
    assert!(matches!(
        cmd.draw_indirect(&args, 0, 1, 16),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    assert!(matches!(
        cmd.draw_indirect(&args, 0, 1, 16),
        Err(GPUError::PermissionDenied(_))
    ));
    cmd.bind_shader(&shader, &MaterialValues::new(), None)
        .unwrap();

    clear_last_error();
    assert!(matches!(
        cmd.draw_indirect(&plain, 0, 1, 16),
        Err(GPUError::InvalidArgument(_))
    ));
    assert_eq!(last_error(), ErrorCode::InvalidArgument);
    assert!(matches!(
        cmd.draw_indirect(&args, 2, 1, 16),
        Err(GPUError::InvalidArgument(_))
    ));
    assert!(matches!(
        cmd.draw_indirect(&args, 0, 2, 12),
        Err(GPUError::InvalidArgument(_))
    ));
    clear_last_error();
    assert!(matches!(
        cmd.draw_indirect(&args, 192, 5, 16),
        Err(GPUError::OutOfRange(_))
    ));
    assert_eq!(last_error(), ErrorCode::OutOfRange);
    assert_eq!(args.resource().command_buffer_count(), 0);

    cmd.draw_indirect(&args, 0, 4, 16).unwrap();
    assert_eq!(args.resource().command_buffer_count(), 1);
    let pending = cmd.pending_barriers().buffers();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].buffer, args.native());
    assert_eq!(pending[0].size, 64);
    assert!(pending[0]
        .dst_access
        .contains(Access::INDIRECT_COMMAND_READ));

    // Indexed records are 20 bytes, and need an index buffer.
    assert!(matches!(
        cmd.draw_indexed_indirect(&args, 0, 1, 20),
        Err(GPUError::InvalidArgument(_))
    ));
    cmd.bind_index_buffer(&indices, 0, IndexType::U16).unwrap();
    assert!(cmd.draw_indexed_indirect(&args, 0, 2, 16).is_err());
    cmd.draw_indexed_indirect(&args, 64, 2, 20).unwrap();

    cmd.unbind_shader(&shader).unwrap();
    cmd.end_render_pass(&target.pass).unwrap();

    let draws: Vec<_> = renderer
        .backend()
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            NullCall::DrawIndirect { draw, indexed, .. } => Some((draw, indexed)),
            _ => None,
        })
        .collect();
    assert_eq!(draws.len(), 2);
    assert!(!draws[0].1);
    assert_eq!(draws[0].0.buffer, args.native());
    assert_eq!((draws[0].0.count, draws[0].0.stride), (4, 16));
    assert!(draws[1].1);
    assert_eq!((draws[1].0.offset, draws[1].0.stride), (64, 20));
}

#[test]
#[serial]
fn indirect_dispatches_run_outside_of_passes() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(32, 32, 1, false);
    let compute = renderer.shader(Vec::new(), BindPoint::Compute);
    let args = renderer.buffer(64, BufferUsage::INDIRECT_DISPATCH | BufferUsage::COPY_TO);
    let draw_args = renderer.buffer(64, BufferUsage::INDIRECT_DRAW | BufferUsage::COPY_TO);
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    assert!(matches!(
        cmd.dispatch_indirect(&args, 0),
        Err(GPUError::PermissionDenied(_))
    ));
    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.dispatch_indirect(&args, 0),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);
    cmd.end_render_pass(&target.pass).unwrap();

    cmd.bind_compute_shader(&compute, &MaterialValues::new(), None)
        .unwrap();
    assert!(matches!(
        cmd.dispatch_indirect(&draw_args, 0),
        Err(GPUError::InvalidArgument(_))
    ));
    assert!(matches!(
        cmd.dispatch_indirect(&args, 56),
        Err(GPUError::OutOfRange(_))
    ));
    cmd.dispatch_indirect(&args, 52).unwrap();
    cmd.unbind_compute_shader(&compute).unwrap();
    assert_eq!(args.resource().command_buffer_count(), 1);

    let calls = renderer.backend().calls();
    let dispatch = position(&calls, |c| matches!(c, NullCall::DispatchIndirect { .. }));
    match &calls[dispatch] {
        NullCall::DispatchIndirect { buffer, offset, .. } => {
            assert_eq!(*buffer, args.native());
            assert_eq!(*offset, 52);
        }
        _ => unreachable!(),
    }
    match &calls[dispatch - 1] {
        NullCall::PipelineBarrier { buffers, .. } => {
            assert_eq!(buffers.len(), 1);
            assert_eq!(buffers[0].buffer, args.native());
            assert_eq!((buffers[0].offset, buffers[0].size), (52, 12));
        }
        other => panic!("expected a barrier before the dispatch, got {:?}", other),
    }
}
