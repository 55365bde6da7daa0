//! 进程系统调用处理函数
//!
//! 本模块包含进程相关系统调用的具体实现逻辑，包括：
//! - 进程创建（fork）和程序替换（execv）
//! - 进程终止（_exit）和回收（waitpid）
//! - 进程标识查询（getpid）

use nos_api::{
    Error, Pid, SIGSEGV, TrapFrame, UserMemory, UserPtr, WaitMode, mkwait_exit, mkwait_sig,
};

use crate::process::ExecError;
use crate::syscalls::SyscallContext;
use crate::syscalls::common::{SyscallResult, copy_in_path};

/// fork系统调用处理函数
///
/// 创建当前进程的副本，子进程从 `frame` 的副本恢复执行。
///
/// # 返回值
///
/// * `Ok(u64)` - 子进程ID（父进程中）
/// * `Err(Error)` - 进程表已满、内存不足或线程创建失败
pub fn handle_fork(ctx: &SyscallContext<'_>, frame: &TrapFrame) -> SyscallResult {
    let pid = ctx.manager.fork(&ctx.current, frame)?;
    log::debug!("fork syscall: pid {} created child {}", ctx.current.pid(), pid);
    Ok(pid as u64)
}

/// _exit系统调用处理函数
///
/// 记录退出状态、唤醒父进程，然后结束当前线程。不返回。
pub fn handle_exit(ctx: &SyscallContext<'_>, code: i32) -> ! {
    log::debug!("_exit syscall: pid {} code {}", ctx.current.pid(), code);
    ctx.manager.exit(&ctx.current, mkwait_exit(code));
    ctx.manager.threads().exit_current()
}

/// waitpid系统调用处理函数
///
/// # 参数
///
/// * `pid` - 要等待的子进程ID
/// * `status_ptr` - 用户空间状态字地址，可以为空
/// * `options` - 0 或 `WNOHANG`
///
/// # 返回值
///
/// * `Ok(pid)` - 子进程已被回收
/// * `Ok(0)` - `WNOHANG` 且子进程仍在运行
pub fn handle_waitpid(ctx: &SyscallContext<'_>, pid: Pid, status_ptr: UserPtr, options: i32) -> SyscallResult {
    let current = &ctx.current;
    if pid == current.pid() {
        return Err(Error::NoSuchChild);
    }
    if status_ptr % core::mem::align_of::<i32>() != 0 {
        return Err(Error::BadUserAddress);
    }
    if !current.has_child(pid) {
        return Err(Error::NoSuchChild);
    }
    let mode = WaitMode::from_options(options)?;

    // 回收会销毁子进程，之后无法撤销；先确认状态字可写
    if status_ptr != 0 {
        let mut guard = current.space();
        let space = guard.as_deref_mut().ok_or(Error::BadUserAddress)?;
        space.copy_out(&0i32.to_ne_bytes(), status_ptr)?;
    }

    let Some(status) = ctx.manager.wait(current, pid, mode)? else {
        return Ok(0);
    };

    if status_ptr != 0 {
        let mut guard = current.space();
        let space = guard.as_deref_mut().ok_or(Error::BadUserAddress)?;
        space.copy_out(&status.to_ne_bytes(), status_ptr)?;
    }
    Ok(pid as u64)
}

/// getpid系统调用处理函数
pub fn handle_getpid(ctx: &SyscallContext<'_>) -> SyscallResult {
    Ok(ctx.current.pid() as u64)
}

/// execv系统调用处理函数
///
/// 成功时进入新程序，不返回。旧映像已销毁后的失败无法报告给调用者，
/// 此时进程以 SIGSEGV 状态终止。
///
/// # 参数
///
/// * `path_ptr` - 程序路径
/// * `argv_ptr` - 以空指针结尾的参数数组
pub fn handle_execv(ctx: &SyscallContext<'_>, path_ptr: UserPtr, argv_ptr: UserPtr) -> SyscallResult {
    if argv_ptr == 0 {
        return Err(Error::BadUserAddress);
    }

    let path = {
        let guard = ctx.current.space();
        let space = guard.as_deref().ok_or(Error::BadUserAddress)?;
        copy_in_path(space, path_ptr, ctx.manager.config().path_max)?
    };

    match ctx.manager.execv(&ctx.current, &path, argv_ptr) {
        Ok(image) => ctx.manager.threads().enter_user(image),
        Err(ExecError::Recoverable(err)) => {
            log::debug!("execv syscall: {} failed: {}", path, err);
            Err(err)
        }
        Err(ExecError::Fatal(err)) => {
            log::error!("execv syscall: pid {} lost its image loading {}: {}", ctx.current.pid(), path, err);
            ctx.manager.exit(&ctx.current, mkwait_sig(SIGSEGV));
            ctx.manager.threads().exit_current()
        }
    }
}
