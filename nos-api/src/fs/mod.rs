//! Volume-node layer interfaces and flag types

pub mod interface;
pub mod types;

pub use interface::*;
pub use types::*;
