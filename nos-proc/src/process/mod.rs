//! Process management
//!
//! - `proc`: the process record and its locks
//! - `table`: PID allocation
//! - `manager`: lifecycle (create, fork, exit, wait, destroy)
//! - `exec` / `argbuf`: replacing a process image

pub mod argbuf;
pub mod exec;
pub mod manager;
pub mod proc;
pub mod table;

pub use argbuf::{ArgBuf, ArgLimits, UserArgs};
pub use exec::{ExecError, LoadedImage};
pub use manager::{KERNEL_PROC_NAME, ProcManager, Services};
pub use proc::{ProcStatus, Process};
pub use table::ProcTable;
