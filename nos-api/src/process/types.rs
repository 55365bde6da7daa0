//! Process management types

use alloc::boxed::Box;

use crate::core::types::{UserPtr, VirtAddr};
use crate::error::{Error, Result};

/// Saved user register state at syscall entry
///
/// The process core only snapshots and hands it to the thread system; the
/// register layout is the trap handler's business.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    /// General purpose registers
    pub regs: [usize; 32],
    /// Exception program counter
    pub epc: usize,
    /// Status register
    pub status: usize,
}

impl TrapFrame {
    pub const fn new() -> Self {
        Self {
            regs: [0; 32],
            epc: 0,
            status: 0,
        }
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything user mode needs to start a freshly loaded program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecImage {
    /// Entry address reported by the loader
    pub entry: VirtAddr,
    /// Stack pointer, pointing at the base of the argv array
    pub stack_top: VirtAddr,
    /// Number of arguments
    pub argc: usize,
    /// User address of the argv array
    pub argv: UserPtr,
}

/// How a newly spawned schedulable unit begins executing
#[derive(Debug)]
pub enum ThreadStart {
    /// Resume a forked child from a heap copy of the parent's trap frame
    Forked(Box<TrapFrame>),
    /// Enter a newly loaded program
    Exec(ExecImage),
}

/// Blocking behaviour of `waitpid`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Block until the child exits
    Block,
    /// Return immediately if the child has not exited
    NoHang,
}

impl WaitMode {
    /// `WNOHANG` option bit
    pub const WNOHANG: i32 = 1;

    /// Decode a raw `options` argument; anything but 0 or `WNOHANG` is invalid
    pub fn from_options(options: i32) -> Result<Self> {
        match options {
            0 => Ok(WaitMode::Block),
            Self::WNOHANG => Ok(WaitMode::NoHang),
            _ => Err(Error::InvalidOption),
        }
    }
}

/// Encode a normal exit code the way `waitpid` reports it (`_MKWAIT_EXIT`)
#[inline]
pub const fn mkwait_exit(code: i32) -> i32 {
    (code & 0xff) << 2
}

/// Segmentation violation, used when a process is killed by a bad access
pub const SIGSEGV: i32 = 11;

/// Encode termination by signal (`_MKWAIT_SIG`)
#[inline]
pub const fn mkwait_sig(sig: i32) -> i32 {
    ((sig & 0x3f) << 2) | 1
}

/// Whether the status word reports a normal exit (`WIFEXITED`)
#[inline]
pub const fn wifexited(status: i32) -> bool {
    status & 3 == 0
}

/// Decode the exit code from a `waitpid` status word (`WEXITSTATUS`)
#[inline]
pub const fn wexitstatus(status: i32) -> i32 {
    (status >> 2) & 0xff
}
