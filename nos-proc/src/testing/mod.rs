//! In-memory collaborators for host builds
//!
//! Enough of a volume layer, VM system, loader and thread system to drive
//! the process core from tests and benchmarks:
//! - `MemFs`: files plus a non-seekable console, with open/close counters
//! - `FakeSpace` / `FakeVm`: sparse byte-addressed address spaces
//! - `FakeLoader`: accepts images starting with the ELF magic
//! - `FakeThreads`: records spawned units instead of running them
//! - `TestKernel`: all of the above wired into a `ProcManager`

mod fs;
mod kernel;
mod threads;
mod vm;

pub use fs::{ConsoleNode, MemFile, MemFs};
pub use kernel::TestKernel;
pub use threads::{EnteredUser, FakeThreads, SpawnRecord, ThreadExited};
pub use vm::{DATA_BASE, DATA_SIZE, ENTRY_POINT, FakeLoader, FakeSpace, FakeVm, STACK_TOP, VmStats};
