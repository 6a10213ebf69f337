pub mod handle;
pub mod per_frame;
pub mod recent;

pub use handle::{Handle, Pool};
pub use per_frame::PerFrame;
pub use recent::recently_added;
