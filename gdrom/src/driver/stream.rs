// =============================================================================
// GD-ROM Driver — Streaming Engine and DMA Completion Handler
// =============================================================================
//
// A streaming session decomposes one long read command into many short
// transfer requests sharing a single command handle:
//
//   stream_start   — establish the session (aborting any prior command)
//   stream_request — move the next chunk, non-blocking or blocking
//   stream_progress— probe bytes moved / in-flight state
//   stream_stop    — tear the session down, waking any stuck waiter
//
// Blocking DMA requests suspend on the completion signal while logically
// holding the drive lock; whoever wakes them (the completion interrupt or
// stream_stop) first releases the lock on their behalf. Non-blocking
// requests drop the lock before returning and the in-progress flag alone
// guards the race with the interrupt.
// =============================================================================

use core::sync::atomic::Ordering;

use crate::error::{CdError, CdResult};
use crate::hw::{
    CmdState, CmdStatus, Command, CommandHandle, CommandParam, HwInterface, Platform, ThreadId,
    TransferCheck, TransferMode,
};

use super::Cdrom;

/// Deadline handed to the aborts issued while (re)arranging a session.
const STREAM_ABORT_TIMEOUT_MS: u64 = 1000;

impl<H: HwInterface, P: Platform> Cdrom<H, P> {
    /// Establish a streaming-read session over `count` sectors starting
    /// at `sector`.
    ///
    /// Session changes are mutually exclusive: an already-active command
    /// is aborted first. On success the session handle stays live until
    /// [`stream_stop`](Self::stream_stop) or the final transfer drains
    /// it.
    pub fn stream_start(&self, sector: u32, count: u32, mode: TransferMode) -> CdResult<()> {
        if self.current_handle().is_some() {
            let _ = self.abort_cmd(STREAM_ABORT_TIMEOUT_MS);
        }

        let cmd = match mode {
            TransferMode::Dma => Command::DmaReadStream,
            TransferMode::Pio => Command::PioReadStream,
        };
        self.exec_cmd(cmd, &CommandParam::Stream { sector, count })?;

        self.session.lock().stream_mode = mode;
        Ok(())
    }

    /// Request the next `buf.len()` bytes of the stream.
    ///
    /// Fails with `NoActive` if no session is established and `Sys` if a
    /// prior request is still in flight. Buffer alignment rules match
    /// [`read_sectors_ex`](Self::read_sectors_ex) and are checked before
    /// any hardware call.
    ///
    /// DMA: the transfer runs asynchronously. With `block` false this
    /// returns immediately and completion is observed via
    /// [`stream_progress`](Self::stream_progress); with `block` true the
    /// calling thread suspends until the completion interrupt (or
    /// [`stream_stop`](Self::stream_stop)) wakes it.
    ///
    /// PIO: performed synchronously by ticking the command server; no
    /// interrupt is involved.
    pub fn stream_request(&self, buf: &mut [u8], block: bool) -> CdResult<()> {
        let Some(hnd) = self.current_handle() else {
            return Err(CdError::NoActive);
        };
        if self.stream_progress()?.0 {
            log::error!("stream_request: previous request in progress");
            return Err(CdError::Sys);
        }

        let mode = self.session.lock().stream_mode;
        let addr = buf.as_mut_ptr() as usize;
        let len = buf.len();
        let hw_addr = match mode {
            TransferMode::Dma => self.dma_prepare(addr, len)?,
            TransferMode::Pio => self.pio_prepare(addr)?,
        };

        self.lock.lock(&self.plat);

        match mode {
            TransferMode::Dma => {
                self.dma_in_progress.store(true, Ordering::Release);
                self.dma_blocking.store(block, Ordering::Release);
                self.dma_waiter
                    .store(self.plat.thread_id().0, Ordering::Release);

                if self.hw.dma_transfer(hnd, hw_addr, len).is_err() {
                    self.dma_in_progress.store(false, Ordering::Release);
                    self.dma_blocking.store(false, Ordering::Release);
                    self.dma_waiter.store(0, Ordering::Release);
                    self.lock.unlock();
                    return Err(CdError::Sys);
                }

                if !block {
                    self.lock.unlock();
                    return Ok(());
                }

                // Suspend while logically holding the drive lock; the
                // waker releases it as this thread before signaling.
                self.dma_done.wait(&self.plat);

                // Reacquire for the confirmation poll.
                self.lock.lock(&self.plat);
                self.dma_waiter.store(0, Ordering::Release);
                let rv = self.drain_transfer(hnd, mode);
                self.lock.unlock();
                rv
            }
            TransferMode::Pio => {
                if self.hw.pio_transfer(hnd, hw_addr, len).is_err() {
                    self.lock.unlock();
                    return Err(CdError::Sys);
                }
                let rv = self.drain_transfer(hnd, mode);
                self.lock.unlock();
                rv
            }
        }
    }

    /// Poll an in-flight transfer to quiescence. Clears the handle when
    /// the session itself reached a terminal state. Drive lock held by
    /// the caller.
    fn drain_transfer(&self, hnd: CommandHandle, mode: TransferMode) -> CdResult<()> {
        let mut status = CmdStatus::default();
        loop {
            self.hw.tick();
            match self.hw.poll(hnd, &mut status) {
                CmdState::Failed => return Err(CdError::Sys),
                CmdState::Completed | CmdState::NoActive => {
                    self.handle.store(0, Ordering::Release);
                    return Ok(());
                }
                _ => {}
            }
            let check = match mode {
                TransferMode::Dma => self.hw.dma_check(hnd),
                TransferMode::Pio => self.hw.pio_check(hnd),
            };
            if matches!(check, TransferCheck::Idle { .. }) {
                return Ok(());
            }
            self.plat.yield_now();
        }
    }

    /// Non-blocking probe of the current stream transfer: whether one is
    /// in flight, and the bytes it has moved so far.
    ///
    /// From interrupt-adjacent context the drive lock is tried, not
    /// taken; contention reports [`CdError::Busy`] instead of blocking.
    pub fn stream_progress(&self) -> CdResult<(bool, u32)> {
        let Some(hnd) = self.current_handle() else {
            return Ok((false, 0));
        };

        if self.plat.in_irq() {
            if !self.lock.try_lock(&self.plat) {
                return Err(CdError::Busy);
            }
        } else {
            self.lock.lock(&self.plat);
        }

        let mode = self.session.lock().stream_mode;
        let check = match mode {
            TransferMode::Dma => self.hw.dma_check(hnd),
            TransferMode::Pio => self.hw.pio_check(hnd),
        };
        let out = match check {
            TransferCheck::InFlight { bytes } => (true, bytes),
            TransferCheck::Idle { bytes } => {
                // Idle: keep the command server moving so the stream
                // can accept the next request.
                self.hw.tick();
                (false, bytes)
            }
        };

        self.lock.unlock();
        Ok(out)
    }

    /// Tear down the streaming session.
    ///
    /// Skips taking the drive lock when a DMA transfer is in flight —
    /// the completion interrupt owns the hand-off then, and a blocked
    /// requester may be holding the lock in its sleep. Polls the session
    /// to a terminal state (aborting it if still streaming), clears any
    /// pending DMA state, and wakes a thread stuck in a blocking
    /// request. A stuck waiter is always unblocked.
    pub fn stream_stop(&self) -> CdResult<()> {
        let Some(hnd) = self.current_handle() else {
            return Ok(());
        };
        let mode = self.session.lock().stream_mode;
        let dma_pending =
            mode == TransferMode::Dma && self.dma_in_progress.load(Ordering::Acquire);

        let mut locked = false;
        if !dma_pending {
            self.lock.lock(&self.plat);
            locked = true;
        }

        let mut status = CmdStatus::default();
        let mut rv = Ok(());
        let mut claimed = false;
        loop {
            self.hw.tick();
            match self.hw.poll(hnd, &mut status) {
                CmdState::Failed => {
                    rv = Err(CdError::Sys);
                    break;
                }
                CmdState::Completed | CmdState::NoActive => break,
                CmdState::Streaming => {
                    if locked {
                        self.lock.unlock();
                        locked = false;
                    }
                    // Claim the wakeup with the same swap pair the
                    // interrupt handler uses before touching the
                    // waiter's lock. Losing the claim means the
                    // interrupt already released the waiter, which may
                    // be running again and must keep its lock.
                    claimed = self.dma_in_progress.swap(false, Ordering::AcqRel)
                        && self.dma_blocking.swap(false, Ordering::AcqRel);
                    if claimed {
                        self.lock
                            .unlock_from(ThreadId(self.dma_waiter.load(Ordering::Acquire)));
                    }
                    let _ = self.abort_cmd(STREAM_ABORT_TIMEOUT_MS);
                    break;
                }
                _ => self.plat.yield_now(),
            }
        }

        self.handle.store(0, Ordering::Release);
        if locked {
            self.lock.unlock();
        }

        // Claim any request the interrupt never finalized on the other
        // exit paths, then wake the claimed waiter. The signal comes
        // after teardown so the waiter's confirmation poll finds a
        // terminal state; the irq handler will find nothing to do.
        if !claimed
            && self.dma_in_progress.swap(false, Ordering::AcqRel)
            && self.dma_blocking.swap(false, Ordering::AcqRel)
        {
            self.lock
                .unlock_from(ThreadId(self.dma_waiter.load(Ordering::Acquire)));
            claimed = true;
        }
        if claimed {
            self.dma_done.signal();
        }

        rv
    }

    // =========================================================================
    // DMA completion handler
    // =========================================================================

    /// Finalize a DMA stream transfer from interrupt context.
    ///
    /// Wire this to the DMA-complete, overrun and illegal-address events
    /// hooked by [`init`](Self::init). Acknowledges completion to the
    /// transfer layer, clears the in-progress flag and, if a thread is
    /// suspended in a blocking request, releases the drive lock on its
    /// behalf, posts the completion signal and requests a scheduler
    /// pass.
    ///
    /// Never blocks and takes no locks.
    pub fn dma_irq(&self) {
        if self.dma_in_progress.swap(false, Ordering::AcqRel) {
            self.hw.dma_ack();

            if self.dma_blocking.swap(false, Ordering::AcqRel) {
                let waiter = ThreadId(self.dma_waiter.load(Ordering::Acquire));
                // The waiter went to sleep still logically owning the
                // drive lock.
                self.lock.unlock_from(waiter);
                self.dma_done.signal();
                self.plat.schedule();
            }
        }
    }
}
