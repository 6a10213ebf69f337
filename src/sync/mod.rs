pub mod barrier_batch;
pub mod state;

pub use barrier_batch::{BarrierBatch, BufferBarrier, ImageBarrier, MemoryBarrier, WHOLE_SIZE};
pub use state::{Access, Aspect, Layout, Stage, SubresourceRange, REMAINING};
