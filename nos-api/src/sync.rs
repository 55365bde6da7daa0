//! Synchronization primitives for the NOS process subsystem
//!
//! Every lock in the core is a spin lock; blocking waits are layered on top
//! in `nos-proc::sync`.

pub use spin::Mutex;
pub use spin::MutexGuard;
pub use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
