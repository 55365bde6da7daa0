//! File layer of the process core
//!
//! - `file`: the shared, reference-counted open-file registry
//! - `fdtable`: the per-process descriptor table pointing into it

pub mod fdtable;
pub mod file;

pub use fdtable::FdTable;
pub use file::{FileRef, FileRegistry, OpenFile};
