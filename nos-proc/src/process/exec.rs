//! Program loading
//!
//! `execv` replaces the image of a running process; `run_program` starts a
//! program in a brand new process on behalf of the kernel. Both go through
//! `load_image`, which only swaps the new address space in once the loader
//! and the stack definition have succeeded.

use alloc::sync::Arc;
use core::fmt;

use nos_api::{Error, ExecImage, OpenFlags, Pid, Result, ThreadStart, UserPtr, VirtAddr};

use crate::process::argbuf::{ArgBuf, ArgLimits};
use crate::process::manager::ProcManager;
use crate::process::proc::Process;
use crate::sync::Semaphore;

/// Failure of `execv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// The old image is untouched; the error goes back to the caller
    Recoverable(Error),
    /// The old image is already gone; the process has to be terminated
    Fatal(Error),
}

impl ExecError {
    pub fn error(self) -> Error {
        match self {
            ExecError::Recoverable(err) | ExecError::Fatal(err) => err,
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, ExecError::Fatal(_))
    }
}

impl From<Error> for ExecError {
    fn from(err: Error) -> Self {
        ExecError::Recoverable(err)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Recoverable(err) => write!(f, "exec failed: {}", err),
            ExecError::Fatal(err) => write!(f, "exec failed past the point of no return: {}", err),
        }
    }
}

/// Entry point and stack of a freshly installed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: VirtAddr,
    pub stack_top: VirtAddr,
}

impl ProcManager {
    pub fn arg_limits(&self) -> ArgLimits {
        ArgLimits {
            fast_path: self.config().arg_fast_path,
            max: self.config().arg_max,
        }
    }

    /// Throttle bounding how many full-size argument buffers exist at once
    pub fn exec_throttle(&self) -> &Semaphore {
        &self.exec_throttle
    }

    /// Load the executable at `path` into a fresh address space for `proc`
    ///
    /// On success the new space replaces the old one, which is destroyed,
    /// and is activated if `proc` is running on the calling unit. On
    /// failure `proc` keeps its old space.
    pub fn load_image(&self, proc: &Process, path: &str) -> Result<LoadedImage> {
        let vfs = self.files().vfs().clone();
        let node = vfs.open(path, OpenFlags::RDONLY, 0)?;

        let mut fresh = match self.vm.create() {
            Ok(space) => space,
            Err(err) => {
                vfs.close(node);
                return Err(err);
            }
        };

        let loaded = self.loader.load(&*node, &mut *fresh);
        vfs.close(node);
        let entry = loaded.inspect_err(|err| log::debug!("exec: loading {} failed: {}", path, err))?;
        let stack_top = fresh.define_stack()?;

        let old = proc.set_space(Some(fresh));
        if self.threads.current_pid() == Some(proc.pid()) {
            if let Some(space) = proc.space().as_deref() {
                space.activate();
            }
        }
        drop(old);

        Ok(LoadedImage { entry, stack_top })
    }

    /// Replace the image of `proc` with the program at `path`
    ///
    /// `uargv` is read from the current address space before it is
    /// replaced. The returned image is ready to be entered; nothing is
    /// started here.
    pub fn execv(&self, proc: &Arc<Process>, path: &str, uargv: UserPtr) -> core::result::Result<ExecImage, ExecError> {
        let args = {
            let guard = proc.space();
            let space = guard.as_deref().ok_or(Error::BadUserAddress)?;
            ArgBuf::from_user(space, uargv, self.arg_limits(), &self.exec_throttle, &*self.threads)?
        };

        let image = self.load_image(proc, path)?;

        // The old image is gone from here on.
        let uargs = {
            let mut guard = proc.space();
            let space = guard
                .as_deref_mut()
                .ok_or(ExecError::Fatal(Error::BadUserAddress))?;
            args.copy_out(space, image.stack_top).map_err(ExecError::Fatal)?
        };
        drop(args);

        proc.set_name(path);
        log::debug!("exec: pid {} now running {} ({} args)", proc.pid(), path, uargs.argc);
        Ok(ExecImage {
            entry: image.entry,
            stack_top: uargs.stack_top,
            argc: uargs.argc,
            argv: uargs.argv,
        })
    }

    /// Start `path` in a new process, as a child of `creator`
    ///
    /// With no `args`, the program gets its path as its only argument.
    pub fn run_program(&self, creator: &Arc<Process>, path: &str, args: &[&str]) -> Result<Pid> {
        let args = if args.is_empty() {
            ArgBuf::from_strs(&[path], self.config().arg_max)?
        } else {
            ArgBuf::from_strs(args, self.config().arg_max)?
        };

        let proc = self.create_for_run(creator, path)?;
        let pid = proc.pid();

        let prepared = self.load_image(&proc, path).and_then(|image| {
            let mut guard = proc.space();
            let space = guard.as_deref_mut().ok_or(Error::OutOfMemory)?;
            let uargs = args.copy_out(space, image.stack_top)?;
            Ok(ExecImage {
                entry: image.entry,
                stack_top: uargs.stack_top,
                argc: uargs.argc,
                argv: uargs.argv,
            })
        });
        let image = match prepared {
            Ok(image) => image,
            Err(err) => {
                log::warn!("runprogram: {} failed: {}", path, err);
                self.destroy(proc);
                return Err(err);
            }
        };

        self.adopt(creator, &proc);
        proc.attach_thread();
        if let Err(err) = self.threads.spawn(path, pid, ThreadStart::Exec(image)) {
            log::warn!("runprogram: could not start {}: {}", path, err);
            proc.detach_thread();
            self.destroy(proc);
            return Err(err);
        }

        log::info!("runprogram: started {} as pid {}", path, pid);
        Ok(pid)
    }
}
