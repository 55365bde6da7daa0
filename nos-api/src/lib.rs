//! NOS API - Core interfaces and types for the NOS process subsystem
//!
//! This crate provides the identity types, the unified error type and the
//! collaborator interfaces that the process-management core is written
//! against. Everything the core treats as an external contract lives here
//! as a trait, so the core can be linked into a kernel or exercised on a
//! host with in-memory doubles.
//!
//! # Architecture
//!
//! - **Core**: Identity types and fixed constants (`Pid`, `Fd`, `UserPtr`)
//! - **Error**: The `Error` taxonomy and errno mapping
//! - **Memory**: Address spaces and user-memory copy primitives
//! - **FS**: Volume-node layer (open/close/read/write/size)
//! - **Process**: Schedulable units, binary loader, trap frames
//!
//! # Usage
//!
//! ```rust
//! use nos_api::{Error, OpenFlags, AccessMode};
//!
//! let flags = OpenFlags::RDWR | OpenFlags::APPEND;
//! assert_eq!(flags.access_mode(), Ok(AccessMode::ReadWrite));
//! assert_eq!(Error::NoSuchChild.errno(), nos_api::error::errno::ECHILD);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

// Core modules
pub mod core;
pub mod error;
pub mod fs;
pub mod memory;
pub mod process;
pub mod sync;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{Error, Result};
pub use crate::fs::interface::{Vfs, Vnode};
pub use crate::fs::types::{AccessMode, OpenFlags, Whence};
pub use crate::memory::interface::{AddressSpace, UserMemory, VmManager};
pub use crate::process::interface::{Loader, ThreadSystem};
pub use crate::process::types::{
    ExecImage, SIGSEGV, ThreadStart, TrapFrame, WaitMode, mkwait_exit, mkwait_sig, wexitstatus,
    wifexited,
};
