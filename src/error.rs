//! The error taxonomy for the engine (spec §7).
//!
//! Every fallible operation in this crate returns [`Result<T>`], a
//! thin alias over [`std::result::Result`] with [`Error`] as its
//! error type. `WouldBlock` is not really an error — it is the
//! continuation signal asynchronous callers use to know "nothing is
//! ready yet, come back later" — but it is carried in the same enum
//! so that a single `match` at the call site covers every outcome.

use thiserror::Error;

/// The error kinds the engine can report.
#[derive(Debug, Error)]
pub enum Error {
    /// The input descriptor is not a terminal, or the terminal is on
    /// the unsupported blacklist (`TERM=dumb`, etc.).
    #[error("not a tty, or unsupported terminal")]
    NoTty,

    /// An unrecoverable read/write failure. EINTR is retried
    /// transparently and never surfaces here; EAGAIN/EWOULDBLOCK in
    /// async mode surfaces as [`Error::WouldBlock`] instead.
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer growth or another allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// A caller-supplied argument violates a precondition (e.g. a nil
    /// prompt where one is required, or a zero-size buffer request).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// End-of-file was reached with an empty edit buffer (or CTRL_D on
    /// an empty buffer).
    #[error("input closed")]
    Closed,

    /// The user pressed CTRL_C on an empty buffer, or the external
    /// `cancel` flag was observed set.
    #[error("cancelled")]
    Cancelled,

    /// Asynchronous mode only: no input is currently available. Not a
    /// true error — callers should treat this as "resume me once the
    /// descriptor is readable" rather than log or propagate it.
    #[error("would block")]
    WouldBlock,
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the two kinds that represent a deliberate line
    /// termination rather than a failure: [`Error::Closed`] and
    /// [`Error::Cancelled`].
    pub fn is_terminal_signal(&self) -> bool {
        matches!(self, Error::Closed | Error::Cancelled)
    }
}
