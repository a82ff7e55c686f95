//! # Setup Errors
//!
//! The runtime has no recoverable errors once it is running: handoff
//! back-pressure is a `bool`/`Option` outcome and spurious ticks are
//! ignored. Only `init` can fail.

use thiserror::Error;

/// Errors returned while bringing the runtime up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// `init` was already called on this runtime.
    #[error("runtime already initialized")]
    AlreadyInitialized,

    /// The background stack cannot hold a context frame.
    #[error("background stack of {size} bytes is below the {min} byte minimum")]
    StackTooSmall { size: usize, min: usize },

    /// The tick period cannot be programmed into the timer.
    #[error("tick period of {period_us} us does not fit the timer")]
    PeriodOutOfRange { period_us: u32 },

    /// The hosted port could not start the background thread.
    #[error("failed to spawn the background thread")]
    Spawn,
}

pub type Result<T> = core::result::Result<T, Error>;
