mod common;

use std::sync::Arc;

use common::{position, TestRenderer};
use serial_test::serial;
use strata::{
    clear_last_error, last_error, Access, BufferUsage, ErrorCode, GPUError, NullCall, QueryCopy,
    QueryPool, QueryType, Tracked,
};

fn query_pool(renderer: &TestRenderer, ty: QueryType, count: u32) -> Arc<QueryPool> {
    QueryPool::new(renderer.backend().create_query_pool().unwrap(), ty, count)
}

#[test]
#[serial]
fn occlusion_queries_bracket_draw_work() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(16, 16, 1, false);
    let samples = query_pool(&renderer, QueryType::SamplesPassed, 4);
    let any = query_pool(&renderer, QueryType::AnySamplesPassed, 4);
    let timestamps = query_pool(&renderer, QueryType::Timestamp, 4);
    let clear = target.clear_values();
    let cmd = renderer.main_command_buffer();

    cmd.reset_queries(&samples, 0, 4).unwrap();
    cmd.reset_queries(&any, 0, 0).unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.reset_queries(&samples, 2, 3),
        Err(GPUError::OutOfRange(_))
    ));
    assert_eq!(last_error(), ErrorCode::OutOfRange);

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.reset_queries(&samples, 0, 1),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);

    assert!(matches!(
        cmd.begin_query(&timestamps, 0),
        Err(GPUError::PermissionDenied(_))
    ));
    assert!(matches!(
        cmd.end_query(&timestamps, 0),
        Err(GPUError::PermissionDenied(_))
    ));
    assert!(matches!(
        cmd.begin_query(&samples, 4),
        Err(GPUError::OutOfRange(_))
    ));
    cmd.begin_query(&samples, 1).unwrap();
    cmd.end_query(&samples, 1).unwrap();
    cmd.begin_query(&any, 3).unwrap();
    cmd.end_query(&any, 3).unwrap();
    cmd.end_render_pass(&target.pass).unwrap();

    assert_eq!(samples.resource().command_buffer_count(), 1);
    assert_eq!(timestamps.resource().command_buffer_count(), 0);

    let calls = renderer.backend().calls();
    let resets: Vec<_> = calls
        .iter()
        .filter(|c| matches!(c, NullCall::ResetQueryPool { .. }))
        .collect();
    assert_eq!(resets.len(), 1);
    let begins: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            NullCall::BeginQuery {
                pool,
                query,
                precise,
                ..
            } => Some((*pool, *query, *precise)),
            _ => None,
        })
        .collect();
    // Only sample counts ask for exact results.
    assert_eq!(
        begins,
        vec![(samples.native(), 1, true), (any.native(), 3, false)]
    );
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::EndQuery { .. })),
        2
    );
}

#[test]
#[serial]
fn timestamps_need_a_timestamp_pool() {
    let mut renderer = TestRenderer::new().unwrap();
    let samples = query_pool(&renderer, QueryType::SamplesPassed, 2);
    let timestamps = query_pool(&renderer, QueryType::Timestamp, 2);
    let cmd = renderer.main_command_buffer();

    clear_last_error();
    assert!(matches!(
        cmd.query_timestamp(&samples, 0),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);
    assert!(matches!(
        cmd.query_timestamp(&timestamps, 2),
        Err(GPUError::OutOfRange(_))
    ));
    cmd.query_timestamp(&timestamps, 0).unwrap();
    cmd.query_timestamp(&timestamps, 1).unwrap();

    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::WriteTimestamp { .. })),
        2
    );
    assert_eq!(timestamps.resource().command_buffer_count(), 1);
}

#[test]
#[serial]
fn query_values_are_copied_between_transfer_barriers() {
    let mut renderer = TestRenderer::new().unwrap();
    let target = renderer.color_target(16, 16, 1, false);
    let timestamps = query_pool(&renderer, QueryType::Timestamp, 8);
    let results = renderer.buffer(128, BufferUsage::COPY_TO | BufferUsage::UNIFORM_BUFFER);
    let read_only = renderer.buffer(128, BufferUsage::UNIFORM_BUFFER);
    let clear = target.clear_values();
    let copy = QueryCopy {
        first: 0,
        count: 4,
        offset: 32,
        stride: 16,
        element_size: 8,
        with_availability: true,
    };
    let cmd = renderer.main_command_buffer();

    cmd.begin_render_pass(&target.pass, &target.framebuffer, None, &clear)
        .unwrap();
    clear_last_error();
    assert!(matches!(
        cmd.copy_query_values(&timestamps, &results, &copy),
        Err(GPUError::PermissionDenied(_))
    ));
    assert_eq!(last_error(), ErrorCode::PermissionDenied);
    cmd.end_render_pass(&target.pass).unwrap();

    let rejected = [
        (QueryCopy { count: 9, ..copy }, ErrorCode::OutOfRange),
        (QueryCopy { element_size: 2, ..copy }, ErrorCode::InvalidArgument),
        (QueryCopy { offset: 36, ..copy }, ErrorCode::InvalidArgument),
        (QueryCopy { stride: 8, ..copy }, ErrorCode::InvalidArgument),
        (QueryCopy { offset: 96, ..copy }, ErrorCode::OutOfRange),
    ];
    for (bad, code) in rejected {
        clear_last_error();
        assert!(cmd.copy_query_values(&timestamps, &results, &bad).is_err());
        assert_eq!(last_error(), code, "{:?}", bad);
    }
    assert!(matches!(
        cmd.copy_query_values(&timestamps, &read_only, &copy),
        Err(GPUError::InvalidArgument(_))
    ));
    assert_eq!(
        renderer.count(|c| matches!(c, NullCall::CopyQueryResults { .. })),
        0
    );

    let cmd = renderer.main_command_buffer();
    cmd.copy_query_values(&timestamps, &results, &copy).unwrap();
    assert_eq!(timestamps.resource().command_buffer_count(), 1);
    assert_eq!(results.resource().command_buffer_count(), 1);

    let calls = renderer.backend().calls();
    let copied = position(&calls, |c| matches!(c, NullCall::CopyQueryResults { .. }));
    match &calls[copied] {
        NullCall::CopyQueryResults { pool, dst, copy: recorded, .. } => {
            assert_eq!(*pool, timestamps.native());
            assert_eq!(*dst, results.native());
            assert_eq!(*recorded, copy);
        }
        _ => unreachable!(),
    }
    // 3 strides plus one value and its availability word.
    match &calls[copied - 1] {
        NullCall::PipelineBarrier { buffers, .. } => {
            assert_eq!(buffers.len(), 1);
            assert_eq!((buffers[0].offset, buffers[0].size), (32, 64));
            assert_eq!(buffers[0].dst_access, Access::TRANSFER_WRITE);
        }
        other => panic!("expected a barrier before the copy, got {:?}", other),
    }
    match &calls[copied + 1] {
        NullCall::PipelineBarrier { buffers, .. } => {
            assert_eq!(buffers.len(), 1);
            assert_eq!(buffers[0].src_access, Access::TRANSFER_WRITE);
            assert!(buffers[0].dst_access.contains(Access::SHADER_READ));
        }
        other => panic!("expected a barrier after the copy, got {:?}", other),
    }
}
