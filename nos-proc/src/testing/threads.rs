use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nos_api::{Error, ExecImage, Pid, Result, ThreadStart, ThreadSystem};

use crate::sync::Mutex;

thread_local! {
    static CURRENT: Cell<Option<Pid>> = const { Cell::new(None) };
}

/// A unit `FakeThreads` was asked to start
#[derive(Debug)]
pub struct SpawnRecord {
    pub name: String,
    pub pid: Pid,
    pub start: ThreadStart,
}

/// Panic payload standing in for a jump to user mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnteredUser(pub ExecImage);

/// Panic payload standing in for the end of the calling unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadExited(pub Option<Pid>);

/// Thread system that records spawns instead of running them
///
/// The "current process" is tracked per host thread, so a test can play a
/// unit of any process by calling `set_current`.
#[derive(Default)]
pub struct FakeThreads {
    spawned: Mutex<Vec<SpawnRecord>>,
    fail_spawn: AtomicBool,
    yields: AtomicUsize,
}

impl FakeThreads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the calling host thread to `pid`
    pub fn set_current(pid: Option<Pid>) {
        CURRENT.with(|current| current.set(pid));
    }

    pub fn fail_spawn(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }

    /// Times a blocked waiter gave up the CPU
    pub fn yield_count(&self) -> usize {
        self.yields.load(Ordering::SeqCst)
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub fn take_spawned(&self) -> Vec<SpawnRecord> {
        core::mem::take(&mut *self.spawned.lock())
    }

    /// PIDs spawned so far, in order
    pub fn spawned_pids(&self) -> Vec<Pid> {
        self.spawned.lock().iter().map(|record| record.pid).collect()
    }

    /// Run `f`, which must end by entering user mode
    pub fn expect_enter_user<F: FnOnce()>(f: F) -> ExecImage {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Err(payload) => match payload.downcast::<EnteredUser>() {
                Ok(entered) => entered.0,
                Err(other) => panic::resume_unwind(other),
            },
            Ok(()) => panic!("expected a jump to user mode"),
        }
    }

    /// Run `f`, which must end by exiting the calling unit
    pub fn expect_thread_exit<F: FnOnce()>(f: F) -> Option<Pid> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Err(payload) => match payload.downcast::<ThreadExited>() {
                Ok(exited) => exited.0,
                Err(other) => panic::resume_unwind(other),
            },
            Ok(()) => panic!("expected the unit to exit"),
        }
    }
}

impl ThreadSystem for FakeThreads {
    fn spawn(&self, name: &str, pid: Pid, start: ThreadStart) -> Result<()> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory);
        }
        self.spawned.lock().push(SpawnRecord {
            name: name.to_string(),
            pid,
            start,
        });
        Ok(())
    }

    fn current_pid(&self) -> Option<Pid> {
        CURRENT.with(Cell::get)
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        std::thread::yield_now();
    }

    fn enter_user(&self, image: ExecImage) -> ! {
        panic::panic_any(EnteredUser(image))
    }

    fn exit_current(&self) -> ! {
        panic::panic_any(ThreadExited(self.current_pid()))
    }
}
