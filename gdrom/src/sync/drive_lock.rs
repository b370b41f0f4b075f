// =============================================================================
// GD-ROM Driver — Drive Lock
// =============================================================================
//
// The process-wide mutual-exclusion lock for the hardware command
// interface. One word of state: the id of the owning thread, 0 when free.
//
// Three things distinguish it from an ordinary mutex:
//
//   - Acquisition is a cooperative yield loop, not a spin: polling the
//     command server already burns the caller's timeslice, so waiters
//     hand the CPU to whoever holds the lock.
//   - try_lock exists for interrupt-adjacent status queries, which must
//     fail fast instead of deadlocking against the interrupted owner.
//   - unlock_from releases the lock on behalf of a thread that suspended
//     on the completion signal while still logically holding it. The DMA
//     interrupt handler is the intended caller.
//
// A thread must not re-acquire the lock it already holds; owner identity
// is tracked, so the debug build catches that immediately.
// =============================================================================

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::hw::{Platform, ThreadId};

/// Free-state sentinel; real thread ids are nonzero.
const UNOWNED: usize = 0;

/// The drive's mutual-exclusion lock. See the module header.
pub struct DriveLock {
    /// Id of the owning thread, [`UNOWNED`] when free.
    owner: AtomicUsize,
}

impl DriveLock {
    /// A new, unowned lock. `const` so it can live in the driver context
    /// without runtime setup.
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(UNOWNED),
        }
    }

    /// Acquire the lock for the calling thread, yielding cooperatively
    /// while another thread holds it.
    pub fn lock<P: Platform>(&self, plat: &P) {
        let me = plat.thread_id().0;
        debug_assert_ne!(me, UNOWNED, "thread id 0 is reserved");
        debug_assert_ne!(
            self.owner.load(Ordering::Relaxed),
            me,
            "recursive drive lock acquisition"
        );

        while self
            .owner
            .compare_exchange_weak(UNOWNED, me, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            plat.yield_now();
        }
    }

    /// Try to acquire the lock without waiting. Returns `false` if it is
    /// held. Safe to call from interrupt context.
    pub fn try_lock<P: Platform>(&self, plat: &P) -> bool {
        let me = plat.thread_id().0;
        self.owner
            .compare_exchange(UNOWNED, me, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock. The caller must be the current owner.
    pub fn unlock(&self) {
        debug_assert_ne!(
            self.owner.load(Ordering::Relaxed),
            UNOWNED,
            "unlocking an unowned drive lock"
        );
        self.owner.store(UNOWNED, Ordering::Release);
    }

    /// Release the lock on behalf of `thread`, which suspended while
    /// holding it. Returns `false` (and leaves the lock alone) if
    /// `thread` is not the current owner — the waiter may already have
    /// been released by another waker.
    pub fn unlock_from(&self, thread: ThreadId) -> bool {
        self.owner
            .compare_exchange(thread.0, UNOWNED, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    /// Whether any thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != UNOWNED
    }

    /// The current owner, if any.
    pub fn holder(&self) -> Option<ThreadId> {
        match self.owner.load(Ordering::Relaxed) {
            UNOWNED => None,
            id => Some(ThreadId(id)),
        }
    }
}

impl Default for DriveLock {
    fn default() -> Self {
        Self::new()
    }
}
