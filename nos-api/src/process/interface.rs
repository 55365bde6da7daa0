//! Process management interface
//!
//! The schedulable-unit layer and the binary loader sit outside the process
//! core. The core binds schedulable units to processes by PID.

use crate::core::types::{Pid, VirtAddr};
use crate::error::Result;
use crate::fs::interface::Vnode;
use crate::memory::interface::AddressSpace;
use crate::process::types::{ExecImage, ThreadStart};

/// Trait for the schedulable-unit (thread) system
pub trait ThreadSystem: Send + Sync {
    /// Start a new unit bound to process `pid`
    ///
    /// `Forked` resumes from the copied trap frame with a zero return value;
    /// `Exec` enters user mode at the image's entry point.
    fn spawn(&self, name: &str, pid: Pid, start: ThreadStart) -> Result<()>;

    /// PID of the process the calling unit belongs to, if any
    fn current_pid(&self) -> Option<Pid>;

    /// Give the CPU to another runnable unit
    ///
    /// Called in a loop by blocked waiters (`waitpid`, the exec throttle)
    /// between checks of their condition.
    fn yield_now(&self);

    /// Leave the kernel and start executing a freshly loaded image
    fn enter_user(&self, image: ExecImage) -> !;

    /// Terminate the calling unit
    fn exit_current(&self) -> !;
}

/// Trait for the executable loader
pub trait Loader: Send + Sync {
    /// Map the segments of `node` into `space` and report the entry address
    fn load(&self, node: &dyn Vnode, space: &mut dyn AddressSpace) -> Result<VirtAddr>;
}
