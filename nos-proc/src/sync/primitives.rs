// Blocking synchronization primitives
//
// The process core has no scheduler of its own. A blocked caller hands the
// CPU back to the thread system between checks of its condition.

use core::sync::atomic::{AtomicUsize, Ordering};

use nos_api::ThreadSystem;

use crate::sync::{Mutex, MutexGuard};

// ============================================================================
// Condition Variable Implementation
// ============================================================================

/// Condition variable paired with a `spin::Mutex`
///
/// Waiters sample a generation counter while still holding the mutex and
/// then wait for it to move. A notifier changes the guarded state under the
/// same mutex before bumping the counter, so a wakeup issued after the
/// waiter released the lock is never lost.
pub struct CondVar {
    generation: AtomicUsize,
    /// Number of waiting threads
    waiters: AtomicUsize,
}

impl CondVar {
    /// Create a new condition variable
    pub const fn new() -> Self {
        Self {
            generation: AtomicUsize::new(0),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Release `guard`, wait for a notification, and re-acquire `mutex`
    ///
    /// Wakeups may be spurious; callers re-check their condition in a loop.
    pub fn wait<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        threads: &dyn ThreadSystem,
    ) -> MutexGuard<'a, T> {
        let seen = self.generation.load(Ordering::Acquire);
        self.waiters.fetch_add(1, Ordering::AcqRel);
        drop(guard);

        while self.generation.load(Ordering::Acquire) == seen {
            threads.yield_now();
        }

        self.waiters.fetch_sub(1, Ordering::AcqRel);
        mutex.lock()
    }

    /// Wake every waiter
    pub fn notify_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Get number of waiting threads
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Semaphore
// ============================================================================

/// Counting semaphore
pub struct Semaphore {
    /// Current semaphore value
    value: AtomicUsize,
}

impl Semaphore {
    /// Create a new semaphore with initial value
    pub const fn new(initial_value: usize) -> Self {
        Self {
            value: AtomicUsize::new(initial_value),
        }
    }

    /// Wait (decrement) on the semaphore, yielding while it is zero
    pub fn wait(&self, threads: &dyn ThreadSystem) {
        while !self.try_wait() {
            threads.yield_now();
        }
    }

    /// Try to wait (non-blocking)
    pub fn try_wait(&self) -> bool {
        let mut current = self.value.load(Ordering::Acquire);
        while current > 0 {
            match self.value.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// Signal (increment) the semaphore
    pub fn signal(&self) {
        self.value.fetch_add(1, Ordering::AcqRel);
    }

    /// Wait and return a permit that signals when dropped
    pub fn acquire(&self, threads: &dyn ThreadSystem) -> Permit<'_> {
        self.wait(threads);
        Permit { sem: self }
    }

    /// Get current semaphore value
    pub fn value(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }
}

/// RAII permit from `Semaphore::acquire`
pub struct Permit<'a> {
    sem: &'a Semaphore,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.sem.signal();
    }
}

impl core::fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Permit").field("remaining", &self.sem.value()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeThreads;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_semaphore_permits() {
        let threads = FakeThreads::new();
        let sem = Semaphore::new(2);
        let a = sem.acquire(&threads);
        assert!(sem.try_wait());
        assert_eq!(sem.value(), 0);
        assert!(!sem.try_wait());
        drop(a);
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn test_semaphore_blocks_until_signal() {
        let threads = Arc::new(FakeThreads::new());
        let sem = Arc::new(Semaphore::new(1));
        let released = Arc::new(AtomicBool::new(false));
        let permit = sem.acquire(&*threads);

        let waiter = {
            let sem = sem.clone();
            let released = released.clone();
            let threads = threads.clone();
            thread::spawn(move || {
                let _permit = sem.acquire(&*threads);
                assert!(released.load(Ordering::SeqCst));
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        released.store(true, Ordering::SeqCst);
        drop(permit);
        waiter.join().unwrap();
        assert_eq!(sem.value(), 1);
        assert!(threads.yield_count() > 0);
    }

    #[test]
    fn test_condvar_wakes_waiter() {
        let threads = Arc::new(FakeThreads::new());
        let state = Arc::new((Mutex::new(false), CondVar::new()));

        let waiter = {
            let state = state.clone();
            let threads = threads.clone();
            thread::spawn(move || {
                let (lock, cv) = &*state;
                let mut ready = lock.lock();
                while !*ready {
                    ready = cv.wait(lock, ready, &*threads);
                }
            })
        };

        {
            let (lock, cv) = &*state;
            *lock.lock() = true;
            cv.notify_all();
        }
        waiter.join().unwrap();
        assert_eq!(state.1.waiter_count(), 0);
    }
}
