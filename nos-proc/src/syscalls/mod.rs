//! System call layer
//!
//! Thin handlers that decode raw arguments, move data across the user
//! boundary and call into `ProcManager`. Each handler returns a
//! `SyscallResult`; `dispatch` routes by call number and `result_to_raw`
//! turns the outcome into the value left in the return register.

pub mod common;
pub mod file_io;
pub mod process;

use alloc::sync::Arc;

use nos_api::{Error, TrapFrame};

use crate::process::{ProcManager, Process};

pub use common::{SyscallResult, extract_args, result_to_raw};

/// Call numbers understood by `dispatch`
pub mod numbers {
    pub const SYS_FORK: usize = 0;
    pub const SYS_EXECV: usize = 2;
    pub const SYS_EXIT: usize = 3;
    pub const SYS_WAITPID: usize = 4;
    pub const SYS_GETPID: usize = 5;
    pub const SYS_OPEN: usize = 45;
    pub const SYS_DUP2: usize = 48;
    pub const SYS_CLOSE: usize = 49;
    pub const SYS_READ: usize = 50;
    pub const SYS_WRITE: usize = 55;
    pub const SYS_LSEEK: usize = 59;
}

/// The process a syscall runs on behalf of, and the core it runs against
pub struct SyscallContext<'a> {
    pub manager: &'a ProcManager,
    pub current: Arc<Process>,
}

impl<'a> SyscallContext<'a> {
    pub fn new(manager: &'a ProcManager, current: Arc<Process>) -> Self {
        Self { manager, current }
    }
}

/// Route a system call to its handler
///
/// `exit`, and `execv` on success, do not return.
pub fn dispatch(ctx: &SyscallContext<'_>, num: usize, args: &[u64], frame: &TrapFrame) -> SyscallResult {
    use numbers::*;

    match num {
        SYS_FORK => process::handle_fork(ctx, frame),
        SYS_EXECV => {
            let args = extract_args(args, 2)?;
            process::handle_execv(ctx, args[0] as usize, args[1] as usize)
        }
        SYS_EXIT => {
            let args = extract_args(args, 1)?;
            process::handle_exit(ctx, args[0] as i32)
        }
        SYS_WAITPID => {
            let args = extract_args(args, 3)?;
            process::handle_waitpid(ctx, args[0] as i32, args[1] as usize, args[2] as i32)
        }
        SYS_GETPID => process::handle_getpid(ctx),
        SYS_OPEN => {
            let args = extract_args(args, 3)?;
            file_io::handle_open(ctx, args[0] as usize, args[1] as i32, args[2] as u32)
        }
        SYS_DUP2 => {
            let args = extract_args(args, 2)?;
            file_io::handle_dup2(ctx, args[0] as i32, args[1] as i32)
        }
        SYS_CLOSE => {
            let args = extract_args(args, 1)?;
            file_io::handle_close(ctx, args[0] as i32)
        }
        SYS_READ => {
            let args = extract_args(args, 3)?;
            file_io::handle_read(ctx, args[0] as i32, args[1] as usize, args[2] as usize)
        }
        SYS_WRITE => {
            let args = extract_args(args, 3)?;
            file_io::handle_write(ctx, args[0] as i32, args[1] as usize, args[2] as usize)
        }
        SYS_LSEEK => {
            let args = extract_args(args, 3)?;
            file_io::handle_lseek(ctx, args[0] as i32, args[1] as i64, args[2] as i32)
        }
        _ => {
            log::warn!("syscall: unknown call {} from pid {}", num, ctx.current.pid());
            Err(Error::NoSuchSyscall)
        }
    }
}
