//! Process management interfaces

pub mod interface;
pub mod types;

pub use interface::*;
pub use types::*;
