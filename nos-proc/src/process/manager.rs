//! Core Process Management
//!
//! `ProcManager` owns the process table, the open-file registry and the
//! kernel process, and implements the lifecycle on top of them:
//! - creation (plain, for running a program, by fork)
//! - exit and the parent/child hand-off
//! - wait and reaping
//! - destruction
//!
//! Program loading (`execv`, `run_program`) lives in `exec`.
//!
//! Lock order: two process records are always locked in ascending PID order
//! (`lock_pair`); a record's `state` lock is never held while taking its
//! `space` or `files` lock, or the registry's.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use nos_api::{
    Error, KERNEL_PID, Loader, OpenFlags, Pid, Result, STDERR_FILENO, STDIN_FILENO,
    STDOUT_FILENO, ThreadStart, ThreadSystem, TrapFrame, Vfs, VmManager, WaitMode,
};

use crate::config::ProcConfig;
use crate::fs::FileRegistry;
use crate::process::proc::{Process, lock_pair};
use crate::process::table::ProcTable;
use crate::sync::Semaphore;

/// Name of the kernel bookkeeping process
pub const KERNEL_PROC_NAME: &str = "[kernel]";

/// Mode bits passed when opening the console
const CONSOLE_MODE: u32 = 0o664;

/// External subsystems the process core is wired to
#[derive(Clone)]
pub struct Services {
    pub vfs: Arc<dyn Vfs>,
    pub vm: Arc<dyn VmManager>,
    pub threads: Arc<dyn ThreadSystem>,
    pub loader: Arc<dyn Loader>,
}

pub struct ProcManager {
    config: ProcConfig,
    table: ProcTable,
    files: FileRegistry,
    kproc: Arc<Process>,
    pub(crate) exec_throttle: Semaphore,
    pub(crate) vm: Arc<dyn VmManager>,
    pub(crate) threads: Arc<dyn ThreadSystem>,
    pub(crate) loader: Arc<dyn Loader>,
}

impl ProcManager {
    /// Bring up the process subsystem
    ///
    /// Creates the kernel process (PID 0, outside the table) and the
    /// exec throttle. Fails only on an invalid configuration.
    pub fn new(config: ProcConfig, services: Services) -> Result<Self> {
        config.validate()?;

        let kproc = Arc::new(Process::new(KERNEL_PID, KERNEL_PROC_NAME, config.open_max));
        let manager = Self {
            table: ProcTable::new(config.max_procs),
            files: FileRegistry::new(services.vfs, config.system_open_max),
            kproc,
            exec_throttle: Semaphore::new(config.exec_throttle),
            vm: services.vm,
            threads: services.threads,
            loader: services.loader,
            config,
        };

        log::info!(
            "proc: bootstrap complete ({} process slots, {} open files, {} descriptors each)",
            manager.config.max_procs,
            manager.config.system_open_max,
            manager.config.open_max
        );
        Ok(manager)
    }

    pub fn config(&self) -> &ProcConfig {
        &self.config
    }

    /// The kernel process
    pub fn kernel_process(&self) -> &Arc<Process> {
        &self.kproc
    }

    /// Shared open-file registry
    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    pub fn threads(&self) -> &Arc<dyn ThreadSystem> {
        &self.threads
    }

    /// Number of live user processes
    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    /// PIDs of every live user process
    pub fn pids(&self) -> Vec<Pid> {
        self.table.pids()
    }

    /// Look up a live user process
    pub fn lookup(&self, pid: Pid) -> Result<Arc<Process>> {
        self.table.lookup(pid).ok_or(Error::NoSuchProcess)
    }

    /// Like `lookup`, but also resolves the kernel process
    fn resolve(&self, pid: Pid) -> Option<Arc<Process>> {
        if pid == KERNEL_PID {
            Some(self.kproc.clone())
        } else {
            self.table.lookup(pid)
        }
    }

    /// Allocate an empty record and bind it to a fresh PID
    pub fn create(&self, name: &str) -> Result<Arc<Process>> {
        let open_max = self.config.open_max;
        let proc = self
            .table
            .allocate(|pid| Process::new(pid, name, open_max))
            .inspect_err(|_| log::warn!("proc: process table full creating {}", name))?;
        log::debug!("proc: created pid {} ({})", proc.pid(), name);
        Ok(proc)
    }

    /// `create` plus the creator's working directory
    fn create_inheriting(&self, creator: &Process, name: &str) -> Result<Arc<Process>> {
        let proc = self.create(name)?;
        let cwd = creator.lock_state().cwd.clone();
        proc.set_cwd(cwd);
        Ok(proc)
    }

    /// Create a process that is about to run a program
    ///
    /// Descriptors 0, 1 and 2 are bound to the console and the creator's
    /// working directory is shared.
    pub fn create_for_run(&self, creator: &Process, name: &str) -> Result<Arc<Process>> {
        let proc = self.create_inheriting(creator, name)?;
        if let Err(err) = self.bind_console(&proc) {
            log::warn!("proc: console binding failed for pid {}: {}", proc.pid(), err);
            self.destroy(proc);
            return Err(err);
        }
        Ok(proc)
    }

    fn bind_console(&self, proc: &Process) -> Result<()> {
        let bindings = [
            (STDIN_FILENO, OpenFlags::RDONLY),
            (STDOUT_FILENO, OpenFlags::WRONLY),
            (STDERR_FILENO, OpenFlags::WRONLY),
        ];

        let mut files = proc.files();
        for (fd, flags) in bindings {
            let file = self.files.open(&self.config.console_path, flags, CONSOLE_MODE)?;
            if let Some(previous) = files.install_at(fd, file)? {
                self.files.close(previous);
            }
        }
        Ok(())
    }

    /// Duplicate `parent` and start the copy from `frame`
    ///
    /// The child gets a copy of the address space, a descriptor table
    /// sharing every open entry, and the parent's working directory. It is
    /// linked as the parent's child before its unit starts. Returns the
    /// child's PID; on any failure nothing of the child remains.
    pub fn fork(&self, parent: &Arc<Process>, frame: &TrapFrame) -> Result<Pid> {
        let name = parent.name();
        let child = self.create_inheriting(parent, &name)?;
        let pid = child.pid();

        let copied = parent.space().as_ref().map(|space| space.copy()).transpose();
        let space = match copied {
            Ok(space) => space,
            Err(err) => {
                log::warn!("fork: address space copy failed for pid {}: {}", parent.pid(), err);
                self.destroy(child);
                return Err(err);
            }
        };
        child.set_space(space);

        let inherited = parent.files().fork_copy(&self.files);
        *child.files() = inherited;

        let frame = Box::new(*frame);

        {
            let (mut p, mut c) = lock_pair(parent, &child);
            p.children.insert(pid);
            c.parent = Some(parent.pid());
        }

        child.attach_thread();
        if let Err(err) = self.threads.spawn(&name, pid, ThreadStart::Forked(frame)) {
            log::warn!("fork: could not start child {} of {}: {}", pid, parent.pid(), err);
            child.detach_thread();
            self.destroy(child);
            return Err(err);
        }

        log::debug!("fork: pid {} -> child {}", parent.pid(), pid);
        Ok(pid)
    }

    /// Terminate the calling unit's process with `status`
    ///
    /// Children are orphaned first. The status is then published and the
    /// parent woken; a process with no parent destroys itself here since
    /// nobody will reap it. The caller still has to end its unit.
    pub fn exit(&self, proc: &Arc<Process>, status: i32) {
        debug_assert_ne!(proc.pid(), KERNEL_PID);
        self.orphan_children(proc);

        let destroy_now = {
            let mut state = proc.lock_state();
            state.status = status;
            state.terminated = true;
            debug_assert!(state.threads > 0, "exit from a process with no units");
            state.threads = state.threads.saturating_sub(1);
            state.parent.is_none() && state.claim()
        };
        proc.exited.notify_all();

        log::debug!("exit: pid {} status {:#x}", proc.pid(), status);
        if destroy_now {
            self.destroy(proc.clone());
        }
    }

    /// Detach every child of `proc`; exited children nobody can reap are
    /// destroyed
    fn orphan_children(&self, proc: &Process) {
        let children: Vec<Pid> = proc.lock_state().children.iter().copied().collect();
        for pid in children {
            let Some(child) = self.table.lookup(pid) else {
                proc.lock_state().children.remove(&pid);
                continue;
            };

            let destroy_child = {
                let (mut p, mut c) = lock_pair(proc, &child);
                p.children.remove(&pid);
                if c.parent != Some(proc.pid()) {
                    continue;
                }
                c.parent = None;
                c.terminated && c.claim()
            };

            if destroy_child {
                log::debug!("exit: reclaiming orphaned zombie {}", pid);
                self.destroy(child);
            }
        }
    }

    /// Wait for child `pid` of `parent` to exit and reap it
    ///
    /// Returns the recorded status, or `None` under `NoHang` when the child
    /// is still running.
    pub fn wait(&self, parent: &Arc<Process>, pid: Pid, mode: WaitMode) -> Result<Option<i32>> {
        if pid == parent.pid() || !parent.has_child(pid) {
            return Err(Error::NoSuchChild);
        }
        let child = self.lookup(pid)?;

        let status = {
            let mut state = child.lock_state();
            loop {
                if state.parent != Some(parent.pid()) || state.claimed {
                    return Err(Error::NoSuchChild);
                }
                if state.terminated {
                    break;
                }
                if mode == WaitMode::NoHang {
                    return Ok(None);
                }
                state = child.exited.wait(&child.state, state, &*self.threads);
            }
            state.claim();
            state.status
        };

        self.destroy(child);
        log::debug!("wait: pid {} reaped {} (status {:#x})", parent.pid(), pid, status);
        Ok(Some(status))
    }

    /// PID of some child of `parent` that has exited and awaits reaping
    pub fn has_exited_child(&self, parent: &Process) -> Option<Pid> {
        parent
            .children()
            .into_iter()
            .filter_map(|pid| self.table.lookup(pid))
            .find(|child| child.has_exited())
            .map(|child| child.pid())
    }

    /// Tear down a process record
    ///
    /// Releases the working directory, the address space (deactivating it
    /// first if it is the running one) and every descriptor, unlinks the
    /// record from its parent and frees its PID. The caller must hold the
    /// only right to destroy `proc`, and no unit may still be attached.
    pub fn destroy(&self, proc: Arc<Process>) {
        let pid = proc.pid();
        assert_ne!(pid, KERNEL_PID, "the kernel process is never destroyed");

        drop(proc.set_cwd(None));

        if let Some(space) = proc.set_space(None) {
            if self.threads.current_pid() == Some(pid) {
                space.deactivate();
            }
            drop(space);
        }

        assert_eq!(proc.thread_count(), 0, "destroying pid {} with attached units", pid);

        proc.files().release_all(&self.files);

        let parent = proc.lock_state().parent.take();
        if let Some(parent) = parent.and_then(|ppid| self.resolve(ppid)) {
            parent.lock_state().children.remove(&pid);
        }
        self.orphan_children(&proc);

        self.table.release(&proc);
        log::debug!("proc: destroyed pid {}", pid);
    }

    /// Link `child` under `parent`
    pub fn adopt(&self, parent: &Process, child: &Process) {
        let (mut p, mut c) = lock_pair(parent, child);
        p.children.insert(child.pid());
        c.parent = Some(parent.pid());
    }
}

impl core::fmt::Debug for ProcManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcManager")
            .field("processes", &self.table.len())
            .field("open_files", &self.files.in_use())
            .field("config", &self.config)
            .finish()
    }
}
