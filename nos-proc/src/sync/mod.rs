//! Synchronization for the process core
//!
//! Locks are `spin` mutexes. Blocking waits (exit/wait, the exec throttle)
//! are built from them plus the primitives in `primitives`.

pub mod primitives;

pub use nos_api::sync::{Mutex, MutexGuard};
pub use primitives::{CondVar, Permit, Semaphore};
