// =============================================================================
// GD-ROM Driver — Command Channel
// =============================================================================
//
// One command at a time: every submission takes the drive lock, retries
// the submit a bounded number of times, then ticks the command server and
// polls the handle to a terminal state. Raw hardware status words are
// translated to `CdError` here and nowhere else.
//
// The handle is published to the context at submission time, under the
// lock, so the timeout path's abort cancels the command actually in
// flight. It stays published after a terminal state only when that state
// is Streaming — later streaming operations reuse it.
// =============================================================================

use core::sync::atomic::Ordering;

use crate::error::{CdError, CdResult};
use crate::hw::{CmdState, CmdStatus, Command, CommandHandle, CommandParam, HwInterface, Platform};

use super::Cdrom;

/// Bound on submission retries before giving up with `Sys`.
const MAX_SUBMIT_ATTEMPTS: usize = 10;

/// Primary hardware error code for an empty drive.
const HW_ERR_NO_DISC: i32 = 2;

/// Primary hardware error code for a disc swap mid-command.
const HW_ERR_DISC_CHANGED: i32 = 6;

impl<H: HwInterface, P: Platform> Cdrom<H, P> {
    /// Execute a command and wait for it to finish, with no deadline.
    pub fn exec_cmd(&self, cmd: Command, param: &CommandParam) -> CdResult<()> {
        self.exec_cmd_timed(cmd, param, 0)
    }

    /// Execute a command and wait for it to finish.
    ///
    /// `timeout_ms` is a monotonic-millisecond deadline; 0 waits
    /// forever. On expiry the in-flight command is aborted (which may
    /// escalate to a full reset) and `Timeout` is returned.
    pub fn exec_cmd_timed(
        &self,
        cmd: Command,
        param: &CommandParam,
        timeout_ms: u64,
    ) -> CdResult<()> {
        self.lock.lock(&self.plat);

        // Submit, giving the command server a bounded number of chances
        // to accept.
        let mut hnd = None;
        for _ in 0..MAX_SUBMIT_ATTEMPTS {
            hnd = self.hw.submit(cmd, param);
            if hnd.is_some() {
                break;
            }
            self.hw.tick();
            self.plat.yield_now();
        }
        let Some(hnd) = hnd else {
            self.lock.unlock();
            return Err(CdError::Sys);
        };
        self.handle.store(hnd.raw(), Ordering::Release);

        // Wait for the command to finish.
        let begin = if timeout_ms != 0 { self.plat.now_ms() } else { 0 };
        let mut status = CmdStatus::default();
        let state = loop {
            self.hw.tick();
            let state = self.hw.poll(hnd, &mut status);
            if state.is_terminal() {
                break state;
            }
            if timeout_ms != 0 && self.plat.now_ms().saturating_sub(begin) >= timeout_ms {
                log::error!("exec_cmd_timed: {:?} exceeded {} ms deadline", cmd, timeout_ms);
                self.lock.unlock();
                // Abort the handle held here, not whatever is published
                // by then: another thread may grab the lock and submit
                // in this window.
                let _ = self.abort_cmd_for(hnd, timeout_ms);
                return Err(CdError::Timeout);
            }
            self.plat.yield_now();
        };

        // Keep the handle only for an established stream.
        if state != CmdState::Streaming {
            self.handle.store(0, Ordering::Release);
        }
        self.lock.unlock();

        match state {
            CmdState::Completed | CmdState::Streaming => Ok(()),
            CmdState::NoActive => Err(CdError::NoActive),
            _ => Err(translate_status(&status)),
        }
    }

    /// Cancel the in-flight command.
    ///
    /// Polls for the cancellation to be confirmed; if `timeout_ms`
    /// (nonzero) elapses first, the drive is hard-reset and
    /// reinitialized as last-resort recovery and `Timeout` is returned.
    pub fn abort_cmd(&self, timeout_ms: u64) -> CdResult<()> {
        let Some(hnd) = self.current_handle() else {
            return Err(CdError::NoActive);
        };
        self.abort_cmd_for(hnd, timeout_ms)
    }

    /// Abort a specific command. Clears the published handle only if it
    /// is still `hnd`'s; a command submitted after the caller sampled
    /// `hnd` keeps its own.
    fn abort_cmd_for(&self, hnd: CommandHandle, timeout_ms: u64) -> CdResult<()> {
        self.lock.lock(&self.plat);
        self.hw.abort(hnd);

        let begin = if timeout_ms != 0 { self.plat.now_ms() } else { 0 };
        let mut status = CmdStatus::default();
        let mut rv = Ok(());
        loop {
            self.hw.tick();
            let state = self.hw.poll(hnd, &mut status);
            if matches!(state, CmdState::NoActive | CmdState::Completed | CmdState::Failed) {
                break;
            }
            if timeout_ms != 0 && self.plat.now_ms().saturating_sub(begin) >= timeout_ms {
                log::error!("abort_cmd: {} ms deadline exceeded, resetting drive", timeout_ms);
                rv = Err(CdError::Timeout);
                self.hw.reset();
                self.hw.init();
                break;
            }
            self.plat.yield_now();
        }

        let _ = self
            .handle
            .compare_exchange(hnd.raw(), 0, Ordering::AcqRel, Ordering::Relaxed);
        self.lock.unlock();
        rv
    }
}

/// Translate a failed command's raw status payload. The secondary error
/// code has no taxonomy of its own; it is logged and folds into `Sys`.
fn translate_status(status: &CmdStatus) -> CdError {
    match status.err1 {
        HW_ERR_NO_DISC => CdError::NoDisc,
        HW_ERR_DISC_CHANGED => CdError::DiscChanged,
        _ => {
            if status.err2 != 0 {
                log::error!(
                    "command failed: err1={} err2={} ata_status={:#x}",
                    status.err1,
                    status.err2,
                    status.ata_status
                );
            }
            CdError::Sys
        }
    }
}
