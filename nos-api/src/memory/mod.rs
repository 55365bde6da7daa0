//! Address-space and user-memory interfaces

pub mod interface;

pub use interface::*;
