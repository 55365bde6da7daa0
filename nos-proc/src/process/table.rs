//! Process table
//!
//! Slot `i` holds the record whose PID is `i`; slot 0 stays empty because
//! the kernel process is never assigned from the table. PIDs are handed out
//! round-robin starting after the most recently assigned one, so a freed
//! PID is not reused until the scan wraps around to it.

use alloc::sync::Arc;
use alloc::vec::Vec;

use nos_api::{Error, Pid, Result};

use crate::process::proc::Process;
use crate::sync::Mutex;

struct TableInner {
    slots: Vec<Option<Arc<Process>>>,
    last_pid: usize,
    count: usize,
}

pub struct ProcTable {
    inner: Mutex<TableInner>,
    max_procs: usize,
}

impl ProcTable {
    pub fn new(max_procs: usize) -> Self {
        let mut slots = Vec::with_capacity(max_procs + 1);
        slots.resize_with(max_procs + 1, || None);
        Self {
            inner: Mutex::new(TableInner {
                slots,
                last_pid: 0,
                count: 0,
            }),
            max_procs,
        }
    }

    /// Highest assignable PID
    pub fn capacity(&self) -> usize {
        self.max_procs
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick a free PID and bind the record built by `make` to it
    ///
    /// The scan and the bind happen under one lock acquisition, so two
    /// concurrent callers can never be handed the same PID.
    pub fn allocate<F>(&self, make: F) -> Result<Arc<Process>>
    where
        F: FnOnce(Pid) -> Process,
    {
        let mut inner = self.inner.lock();
        let mut candidate = inner.last_pid;
        for _ in 0..self.max_procs {
            candidate = if candidate >= self.max_procs { 1 } else { candidate + 1 };
            if inner.slots[candidate].is_none() {
                let proc = Arc::new(make(candidate as Pid));
                inner.slots[candidate] = Some(proc.clone());
                inner.last_pid = candidate;
                inner.count += 1;
                return Ok(proc);
            }
        }
        Err(Error::TooManyProcesses)
    }

    /// Record bound to `pid`, if any
    pub fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        let idx = usize::try_from(pid).ok().filter(|&idx| idx >= 1 && idx <= self.max_procs)?;
        self.inner.lock().slots[idx].clone()
    }

    /// Unbind `proc`'s slot, making its PID reusable
    ///
    /// Does nothing if the slot has since been bound to another record.
    pub fn release(&self, proc: &Arc<Process>) -> bool {
        let Some(idx) = usize::try_from(proc.pid()).ok().filter(|&idx| idx >= 1 && idx <= self.max_procs)
        else {
            return false;
        };
        let mut inner = self.inner.lock();
        match &inner.slots[idx] {
            Some(bound) if Arc::ptr_eq(bound, proc) => {
                inner.slots[idx] = None;
                inner.count -= 1;
                true
            }
            _ => false,
        }
    }

    /// PIDs of every live record, ascending
    pub fn pids(&self) -> Vec<Pid> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|_| idx as Pid))
            .collect()
    }
}
