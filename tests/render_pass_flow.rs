mod common;

use common::{position, TestRenderer};
use strata::{
    BindPoint, BindingScope, BufferUsage, Draw, ElementType, Layout, MaterialElement,
    MaterialValues, NullCall, TextureInfo, TextureUsage, Tracked,
};

#[test]
fn two_subpasses_are_stitched_into_one_submission() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(64, 64, 2, true);
    let sampled = renderer.texture(
        TextureInfo::default(),
        TextureUsage::TEXTURE | TextureUsage::COPY_TO,
    );
    let vertices = renderer.buffer(256, BufferUsage::VERTEX);
    let shader = renderer.shader(
        vec![MaterialElement::new(
            "albedo",
            ElementType::Texture,
            BindingScope::Material,
            0,
        )],
        BindPoint::Graphics,
    );
    let mut values = MaterialValues::new();
    values.set_texture("albedo", sampled.clone());

    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();
    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    for subpass in 0..2 {
        if subpass > 0 {
            cmd.next_subpass(&target.pass).unwrap();
        }
        cmd.bind_shader(&shader, &values, None).unwrap();
        cmd.bind_vertex_buffers(0, &[(&vertices, 0)]).unwrap();
        cmd.draw(&Draw {
            vertex_count: 3,
            instance_count: 1,
            ..Default::default()
        })
        .unwrap();
        if subpass == 0 {
            assert!(cmd.next_subpass(&target.pass).is_err());
        }
        cmd.unbind_shader(&shader).unwrap();
    }
    assert_eq!(cmd.render_pass().unwrap().subpass_buffers().len(), 2);
    cmd.end_render_pass(&target.pass).unwrap();
    assert!(!cmd.in_render_pass());

    assert_eq!(renderer.flush().unwrap(), 1);

    let calls = renderer.backend().calls();
    let begin = position(&calls, |c| matches!(c, NullCall::BeginRenderPass { .. }));
    let end = position(&calls, |c| matches!(c, NullCall::EndRenderPass(_)));
    let readback = position(&calls, |c| matches!(c, NullCall::CopyImage { .. }));
    let submit = position(&calls, |c| matches!(c, NullCall::QueueSubmit { .. }));
    assert!(begin < end && end < readback && readback < submit);

    match &calls[begin] {
        NullCall::BeginRenderPass {
            secondary_contents, ..
        } => assert!(secondary_contents),
        _ => unreachable!(),
    }

    // Both draws land in their own subpass buffer, executed in order.
    let draws: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            NullCall::Draw { cmd, .. } => Some(*cmd),
            _ => None,
        })
        .collect();
    let executed: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            NullCall::ExecuteCommands { secondaries, .. } => Some(secondaries[0]),
            _ => None,
        })
        .collect();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws, executed);
    assert_ne!(draws[0], draws[1]);
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::NextSubpass { .. })),
        1
    );

    // The attachment transition and the sampled texture's barrier go out together before the
    // pass begins.
    let before_pass = calls[..begin]
        .iter()
        .rev()
        .find_map(|c| match c {
            NullCall::PipelineBarrier { images, .. } => Some(images.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(before_pass.len(), 2);
    assert!(before_pass.iter().any(|b| b.image == target.texture.native()
        && b.old_layout == Layout::General
        && b.new_layout == Layout::ColorAttachment));
    assert!(before_pass
        .iter()
        .any(|b| b.image == sampled.native() && b.new_layout == Layout::ShaderReadOnly));

    // The material set built for the first subpass is reused by the second.
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::UpdateBindingSets(_))),
        1
    );
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::BindBindingSets { .. })),
        2
    );

    match &calls[readback] {
        NullCall::CopyImage { src, dst, .. } => {
            assert_eq!(*src, target.texture.native());
            assert_eq!(Some(*dst), target.texture.host_image());
        }
        _ => unreachable!(),
    }

    assert_eq!(target.texture.last_draw_submit(), 1);
    for resource in [
        vertices.resource(),
        sampled.resource(),
        target.framebuffer.resource(),
    ] {
        assert_eq!(resource.command_buffer_count(), 0);
        assert_eq!(resource.last_used_submit(), 1);
    }
}

#[test]
fn every_flush_takes_the_next_submission_number() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(16, 16, 1, false);
    let clear = target.clear_values();

    for expected in 1..=3 {
        let cmd = renderer.main_command_buffer();
        cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
            .unwrap();
        cmd.end_render_pass(&target.pass).unwrap();
        assert_eq!(renderer.flush().unwrap(), expected);
        assert_eq!(target.texture.resource().last_used_submit(), expected);
    }
    assert_eq!(renderer.device().submit_count(), 3);
    // Offscreens without a host image are never read back.
    assert_eq!(renderer.count(|c| matches!(c, NullCall::CopyImage { .. })), 0);
}

#[test]
fn subpasses_must_all_be_recorded() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(16, 16, 2, false);
    let clear = target.clear_values();

    let cmd = renderer.main_command_buffer();
    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    assert!(cmd.end_render_pass(&target.pass).is_err());
    cmd.next_subpass(&target.pass).unwrap();
    assert!(cmd.next_subpass(&target.pass).is_err());
    cmd.end_render_pass(&target.pass).unwrap();
}
