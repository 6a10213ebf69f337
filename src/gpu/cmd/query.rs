use std::sync::Arc;

use crate::gpu::driver::command::{Backend, QueryCopy};
use crate::gpu::driver::types::*;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resource::{Buffer, QueryPool};

use super::copy::{range, Role};
use super::CommandBuffer;

fn check_query(queries: &QueryPool, query: u32, what: &str) -> Result<()> {
    if query >= queries.count() {
        return Err(GPUError::out_of_range(format!(
            "Attempting to {} a query out of range.",
            what
        )));
    }
    Ok(())
}

fn check_queries(queries: &QueryPool, first: u32, count: u32) -> Result<()> {
    if !range(u64::from(queries.count()), u64::from(first), u64::from(count)) {
        return Err(GPUError::out_of_range(
            "Attempting to access queries out of range.",
        ));
    }
    Ok(())
}

impl<B: Backend> CommandBuffer<B> {
    //===------------------------------------------------------------------===//
    // Queries
    //===------------------------------------------------------------------===//

    pub fn reset_queries(
        &mut self,
        queries: &Arc<QueryPool>,
        first: u32,
        count: u32,
    ) -> Result<()> {
        self.check_outside_pass("Resetting query pools")?;
        check_queries(queries, first, count)?;
        if count == 0 {
            return Ok(());
        }

        let cmd = self.get_command_buffer()?;
        self.device
            .backend()
            .reset_query_pool(cmd, queries.native(), first, count)?;
        self.used.add_tracked(queries)?;
        Ok(())
    }

    pub fn begin_query(&mut self, queries: &Arc<QueryPool>, query: u32) -> Result<()> {
        if queries.query_type() == QueryType::Timestamp {
            return Err(GPUError::permission_denied("Cannot begin a timestamp query."));
        }
        check_query(queries, query, "begin")?;

        let precise = queries.query_type() == QueryType::SamplesPassed;
        let cmd = self.get_command_buffer()?;
        self.device
            .backend()
            .begin_query(cmd, queries.native(), query, precise)?;
        self.used.add_tracked(queries)?;
        Ok(())
    }

    pub fn end_query(&mut self, queries: &Arc<QueryPool>, query: u32) -> Result<()> {
        if queries.query_type() == QueryType::Timestamp {
            return Err(GPUError::permission_denied("Cannot end a timestamp query."));
        }
        check_query(queries, query, "end")?;

        let cmd = self.get_command_buffer()?;
        self.device
            .backend()
            .end_query(cmd, queries.native(), query)?;
        self.used.add_tracked(queries)?;
        Ok(())
    }

    pub fn query_timestamp(&mut self, queries: &Arc<QueryPool>, query: u32) -> Result<()> {
        if queries.query_type() != QueryType::Timestamp {
            return Err(GPUError::permission_denied(
                "Must use a timestamp query when getting the timestamp.",
            ));
        }
        check_query(queries, query, "write the timestamp of")?;

        let cmd = self.get_command_buffer()?;
        self.device
            .backend()
            .write_timestamp(cmd, queries.native(), query)?;
        self.used.add_tracked(queries)?;
        Ok(())
    }

    /// Writes query results into `buffer`, wrapped in the same transfer barriers as buffer
    /// copies.
    pub fn copy_query_values(
        &mut self,
        queries: &Arc<QueryPool>,
        buffer: &Arc<Buffer>,
        copy: &QueryCopy,
    ) -> Result<()> {
        self.check_outside_pass("Copying query values")?;
        check_queries(queries, copy.first, copy.count)?;
        if !buffer.usage().contains(BufferUsage::COPY_TO) {
            return Err(GPUError::invalid_argument(
                "Attempting to copy data to a buffer without the copy to usage flag set.",
            ));
        }
        if copy.element_size != 4 && copy.element_size != 8 {
            return Err(GPUError::invalid_argument("Invalid query element size."));
        }
        if copy.offset % copy.element_size != 0 || copy.stride % copy.element_size != 0 {
            return Err(GPUError::invalid_argument(
                "Query data not properly aligned.",
            ));
        }
        let element = copy.element_size * if copy.with_availability { 2 } else { 1 };
        if copy.stride < element {
            return Err(GPUError::invalid_argument(
                "Stride is less than the minimum size for each query element.",
            ));
        }
        if copy.count == 0 {
            return Ok(());
        }
        let Some(size) = copy
            .stride
            .checked_mul(u64::from(copy.count - 1))
            .and_then(|s| s.checked_add(element))
            .filter(|size| range(buffer.size(), copy.offset, *size))
        else {
            return Err(GPUError::out_of_range("Query copy out of buffer range."));
        };

        let cmd = self.get_command_buffer()?;
        self.queue_buffer_transfer(buffer, copy.offset, size, Role::Dst, true)?;
        self.flush_copy_barriers(cmd, true)?;
        self.device
            .backend()
            .copy_query_results(cmd, queries.native(), buffer.native(), copy)?;
        self.queue_buffer_transfer(buffer, copy.offset, size, Role::Dst, false)?;
        self.flush_copy_barriers(cmd, false)?;
        self.used.add_tracked(queries)?;
        self.used.add_tracked(buffer)?;
        Ok(())
    }
}
