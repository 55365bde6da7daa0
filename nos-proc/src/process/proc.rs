//! Process record
//!
//! A `Process` is shared (`Arc`) between the table, its parent's child set
//! (by PID) and whichever units are running on its behalf. Each part of it
//! has its own lock:
//!
//! - `state`: lifecycle, parent/child links, cwd
//! - `space`: the address space
//! - `files`: the descriptor table
//!
//! When two records must be locked together, `lock_pair` takes them in
//! ascending PID order.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashSet;
use nos_api::{AddressSpace, Pid, Vnode};

use crate::fs::FdTable;
use crate::sync::{CondVar, Mutex, MutexGuard};

/// Lifecycle as observed from outside the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcStatus {
    /// At least one unit may still run on its behalf
    Running,
    /// `exit` has run; the value is the recorded status word
    Exited(i32),
}

/// State guarded by the record's main lock
pub struct ProcState {
    pub(crate) threads: usize,
    pub(crate) status: i32,
    pub(crate) terminated: bool,
    /// Set once by whoever takes on destroying the record
    pub(crate) claimed: bool,
    pub(crate) parent: Option<Pid>,
    pub(crate) children: HashSet<Pid>,
    pub(crate) cwd: Option<Arc<dyn Vnode>>,
}

impl ProcState {
    fn new() -> Self {
        Self {
            threads: 0,
            status: 0,
            terminated: false,
            claimed: false,
            parent: None,
            children: HashSet::new(),
            cwd: None,
        }
    }

    /// Take the right to destroy the record; true for exactly one caller
    pub(crate) fn claim(&mut self) -> bool {
        !core::mem::replace(&mut self.claimed, true)
    }
}

pub struct Process {
    pid: Pid,
    name: Mutex<String>,
    pub(crate) state: Mutex<ProcState>,
    /// Signalled when the process exits
    pub(crate) exited: CondVar,
    space: Mutex<Option<Box<dyn AddressSpace>>>,
    files: Mutex<FdTable>,
}

impl Process {
    pub(crate) fn new(pid: Pid, name: &str, open_max: usize) -> Self {
        Self {
            pid,
            name: Mutex::new(String::from(name)),
            state: Mutex::new(ProcState::new()),
            exited: CondVar::new(),
            space: Mutex::new(None),
            files: Mutex::new(FdTable::new(open_max)),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock() = String::from(name);
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ProcState> {
        self.state.lock()
    }

    pub fn parent(&self) -> Option<Pid> {
        self.state.lock().parent
    }

    /// Current children, in no particular order
    pub fn children(&self) -> Vec<Pid> {
        self.state.lock().children.iter().copied().collect()
    }

    pub fn has_child(&self, pid: Pid) -> bool {
        self.state.lock().children.contains(&pid)
    }

    pub fn thread_count(&self) -> usize {
        self.state.lock().threads
    }

    /// Bind one more schedulable unit to this process
    pub fn attach_thread(&self) {
        self.state.lock().threads += 1;
    }

    /// Unbind a schedulable unit
    pub fn detach_thread(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.threads > 0, "pid {} has no attached thread", self.pid);
        state.threads = state.threads.saturating_sub(1);
    }

    pub fn status(&self) -> ProcStatus {
        let state = self.state.lock();
        if state.terminated {
            ProcStatus::Exited(state.status)
        } else {
            ProcStatus::Running
        }
    }

    pub fn has_exited(&self) -> bool {
        self.state.lock().terminated
    }

    /// Current working directory
    pub fn cwd(&self) -> Option<Arc<dyn Vnode>> {
        self.state.lock().cwd.clone()
    }

    /// Replace the current working directory, returning the old one
    pub fn set_cwd(&self, cwd: Option<Arc<dyn Vnode>>) -> Option<Arc<dyn Vnode>> {
        core::mem::replace(&mut self.state.lock().cwd, cwd)
    }

    /// Address space lock
    pub fn space(&self) -> MutexGuard<'_, Option<Box<dyn AddressSpace>>> {
        self.space.lock()
    }

    /// Install an address space, returning the previous one
    pub fn set_space(&self, space: Option<Box<dyn AddressSpace>>) -> Option<Box<dyn AddressSpace>> {
        core::mem::replace(&mut *self.space.lock(), space)
    }

    pub fn has_space(&self) -> bool {
        self.space.lock().is_some()
    }

    /// Descriptor table lock
    pub fn files(&self) -> MutexGuard<'_, FdTable> {
        self.files.lock()
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &*self.name.lock())
            .field("status", &self.status())
            .finish()
    }
}

/// Lock the state of two distinct records in ascending PID order
///
/// Guards come back in argument order.
pub(crate) fn lock_pair<'a>(
    a: &'a Process,
    b: &'a Process,
) -> (MutexGuard<'a, ProcState>, MutexGuard<'a, ProcState>) {
    debug_assert_ne!(a.pid, b.pid, "lock_pair on a single record");
    if a.pid < b.pid {
        let ga = a.state.lock();
        let gb = b.state.lock();
        (ga, gb)
    } else {
        let gb = b.state.lock();
        let ga = a.state.lock();
        (ga, gb)
    }
}
