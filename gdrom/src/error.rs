//! Driver error taxonomy.
//!
//! Raw hardware status words are translated exactly once, at the command
//! channel boundary (`driver::channel`). Everything above that layer deals
//! in `CdError` and never re-interprets device status.

use core::fmt;

/// Result alias used throughout the driver.
pub type CdResult<T> = Result<T, CdError>;

/// Errors returned by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdError {
    /// The drive reports no disc inserted.
    NoDisc,
    /// The disc was swapped while a command was in flight. Retried
    /// internally by `reinit`; surfaced only from the command channel.
    DiscChanged,
    /// Command submission failed, the hardware reported an unclassified
    /// error, or a buffer precondition was violated before dispatch.
    Sys,
    /// The command did not reach a terminal state within its deadline.
    /// The in-flight command has been aborted (possibly via full reset).
    Timeout,
    /// An operation that needs an in-flight command found none.
    NoActive,
    /// The drive lock could not be taken from interrupt-adjacent context;
    /// try again later. Never returned from blocking entry points.
    Busy,
}

impl fmt::Display for CdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdError::NoDisc => write!(f, "no disc in drive"),
            CdError::DiscChanged => write!(f, "disc changed during command"),
            CdError::Sys => write!(f, "system error"),
            CdError::Timeout => write!(f, "command timed out"),
            CdError::NoActive => write!(f, "no active command"),
            CdError::Busy => write!(f, "drive busy, try again later"),
        }
    }
}
