//! NOS Process Core
//!
//! Process management for the NOS kernel: the process table, process
//! records and their lifecycle, per-process descriptor tables over a shared
//! open-file registry, and argument marshalling for `execv`.
//!
//! # Architecture
//!
//! - **Config**: limits (`ProcConfig`)
//! - **Sync**: spin locks, a condition variable and a counting semaphore
//! - **FS**: `FileRegistry` (shared open files) and `FdTable` (per process)
//! - **Process**: `Process`, `ProcTable`, `ProcManager`, exec support
//! - **Syscalls**: handlers translating raw arguments into core calls
//!
//! The address-space, volume, loader and thread layers are reached through
//! the traits in `nos-api`, so the core runs unchanged on a host against the
//! doubles in `testing` (enabled by the `std` feature).
//!
//! # Usage
//!
//! ```rust
//! use nos_proc::testing::TestKernel;
//! use nos_api::{TrapFrame, WaitMode};
//!
//! let kernel = TestKernel::new();
//! let parent = kernel.spawn_user("init");
//! let child_pid = kernel.manager.fork(&parent, &TrapFrame::new()).unwrap();
//!
//! let child = kernel.manager.lookup(child_pid).unwrap();
//! kernel.manager.exit(&child, 7);
//! assert_eq!(kernel.manager.wait(&parent, child_pid, WaitMode::Block), Ok(Some(7)));
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod config;
pub mod fs;
pub mod process;
pub mod sync;
pub mod syscalls;

#[cfg(any(test, feature = "std"))]
pub mod testing;

// Re-export commonly used types
pub use config::ProcConfig;
pub use fs::{FdTable, FileRef, FileRegistry, OpenFile};
pub use process::{ExecError, ProcManager, ProcStatus, ProcTable, Process, Services};
pub use syscalls::{SyscallContext, SyscallResult, dispatch, result_to_raw};
