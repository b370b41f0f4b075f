//! Counting completion signal.
//!
//! The hand-off point between the DMA interrupt handler and a thread
//! blocked in a streaming request: the waiter consumes one count, the
//! handler (or `stream_stop`) produces one. A count posted before the
//! waiter arrives is not lost, so the signal-then-suspend race resolves
//! itself.
//!
//! `signal` is a single atomic increment and is interrupt-safe; `wait`
//! parks the caller in a cooperative yield loop.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::hw::Platform;

/// A counting wait primitive. See the module docs.
pub struct CompletionSignal {
    count: AtomicU32,
}

impl CompletionSignal {
    /// A new signal with no pending counts.
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Post one completion. Never blocks; callable from interrupt
    /// context.
    pub fn signal(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Consume one completion, yielding until one is available.
    pub fn wait<P: Platform>(&self, plat: &P) {
        loop {
            let n = self.count.load(Ordering::Acquire);
            if n > 0
                && self
                    .count
                    .compare_exchange(n, n - 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return;
            }
            plat.yield_now();
        }
    }

    /// Consume one completion if one is already pending.
    pub fn try_wait(&self) -> bool {
        self.count
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
