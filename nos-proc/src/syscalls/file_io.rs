// File descriptor system calls
//
// Data moves between user memory and the node in chunks while the open
// file's lock is held, so a read or write through a shared entry is never
// split by another one.

use nos_api::{Error, Fd, OpenFlags, UserMemory, UserPtr, Whence};

use crate::config::FIRST_USER_FD;
use crate::syscalls::SyscallContext;
use crate::syscalls::common::{SyscallResult, copy_in_path};

/// open: returns the lowest free descriptor at or above 3
pub fn handle_open(ctx: &SyscallContext<'_>, path_ptr: UserPtr, flags: i32, mode: u32) -> SyscallResult {
    let path = {
        let guard = ctx.current.space();
        let space = guard.as_deref().ok_or(Error::BadUserAddress)?;
        copy_in_path(space, path_ptr, ctx.manager.config().path_max)?
    };
    // Bits outside the known set (O_NOCTTY and the like) are dropped
    let flags = OpenFlags::from_bits_truncate(flags as u32);

    let registry = ctx.manager.files();
    let file = registry.open(&path, flags, mode)?;
    let installed = ctx.current.files().install(FIRST_USER_FD, file);
    match installed {
        Ok(fd) => {
            log::debug!("open: pid {} opened {} as fd {}", ctx.current.pid(), path, fd);
            Ok(fd as u64)
        }
        Err(file) => {
            registry.close(file);
            Err(Error::TooManyOpenFilesPerProcess)
        }
    }
}

pub fn handle_close(ctx: &SyscallContext<'_>, fd: Fd) -> SyscallResult {
    ctx.current.files().close(ctx.manager.files(), fd)?;
    Ok(0)
}

/// read: returns the number of bytes transferred, 0 at end of file
pub fn handle_read(ctx: &SyscallContext<'_>, fd: Fd, buf_ptr: UserPtr, len: usize) -> SyscallResult {
    let file = ctx.current.files().get(fd)?;
    if buf_ptr == 0 {
        return Err(Error::BadUserAddress);
    }

    let mut guard = ctx.current.space();
    let space = guard.as_deref_mut().ok_or(Error::BadUserAddress)?;
    let n = file.read_chunked(len, |at, chunk| space.copy_out(chunk, buf_ptr + at))?;
    Ok(n as u64)
}

pub fn handle_write(ctx: &SyscallContext<'_>, fd: Fd, buf_ptr: UserPtr, len: usize) -> SyscallResult {
    let file = ctx.current.files().get(fd)?;
    if buf_ptr == 0 {
        return Err(Error::BadUserAddress);
    }

    let guard = ctx.current.space();
    let space = guard.as_deref().ok_or(Error::BadUserAddress)?;
    let n = file.write_chunked(len, |at, chunk| space.copy_in(buf_ptr + at, chunk))?;
    Ok(n as u64)
}

/// lseek: returns the new cursor position
pub fn handle_lseek(ctx: &SyscallContext<'_>, fd: Fd, offset: i64, whence: i32) -> SyscallResult {
    let file = ctx.current.files().get(fd)?;
    let whence = Whence::from_raw(whence)?;
    let pos = file.seek(offset, whence)?;
    Ok(pos)
}

/// dup2: returns `new_fd`
pub fn handle_dup2(ctx: &SyscallContext<'_>, old_fd: Fd, new_fd: Fd) -> SyscallResult {
    let fd = ctx.current.files().dup2(ctx.manager.files(), old_fd, new_fd)?;
    Ok(fd as u64)
}
