//! GPU command recording and synchronization engine.
//!
//! Resources track which submissions still use them, barrier batches insert the memory and
//! layout dependencies between uses, and the submit ring numbers every queue submission so
//! destruction, mapping and pool reuse can wait for exactly the work that matters.

pub mod gpu;
pub mod sync;
pub mod utils;

pub use gpu::*;
pub use sync::{
    Access, Aspect, BarrierBatch, BufferBarrier, ImageBarrier, Layout, Stage, SubresourceRange,
};
