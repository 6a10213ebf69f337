pub mod command;
pub mod state;
pub mod types;

pub use command::*;
pub use types::*;
