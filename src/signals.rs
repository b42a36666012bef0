//! Cooperative signal integration (spec §5): mask `SIGINT`/`SIGALRM`/
//! `SIGWINCH` for the life of a session so they cannot tear a read out
//! from under the decoder with `EINTR`, then atomically unblock them
//! only for the span of the blocking wait via `pselect` so a signal
//! arriving there is still observed rather than lost in the gap
//! between unblocking and blocking.
//!
//! Grounded on the teacher's `signal_hook::flag::register(SIGWINCH,
//! ...)` in `src/main.rs`, generalized to the full mask-and-pselect
//! discipline spec §5 asks for; `flag::register`'s own "sample a bool"
//! half is reused unchanged for the window-resize signal.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::select::{pselect, FdSet};
use nix::sys::signal::{self, SigSet, Signal, SigmaskHow};
use nix::sys::time::TimeSpec;
use signal_hook::consts::signal::SIGWINCH;
use tracing::trace;

use crate::error::{Error, Result};

fn watched_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGALRM);
    set.add(Signal::SIGWINCH);
    set
}

/// Blocks the three watched signals for as long as it is held,
/// restoring the previous process mask on drop. A session installs
/// one of these for its whole lifetime; [`wait_readable`] is the only
/// place the mask is briefly lifted.
pub struct SignalMaskGuard {
    previous: SigSet,
}

impl SignalMaskGuard {
    pub fn install() -> Result<SignalMaskGuard> {
        let watched = watched_signals();
        let previous = signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&watched), None)
            .map_err(|e| Error::Io(std::io::Error::from(e)))?;
        Ok(SignalMaskGuard { previous })
    }

    /// The mask to hand `pselect` while waiting: the process mask as it
    /// was before this guard blocked the watched signals, minus the
    /// watched signals themselves. This unblocks exactly `SIGINT`/
    /// `SIGALRM`/`SIGWINCH` for the span of the wait while leaving any
    /// other signal the host had already blocked untouched.
    fn pselect_mask(&self) -> SigSet {
        let mut mask = self.previous.clone();
        mask.remove(Signal::SIGINT);
        mask.remove(Signal::SIGALRM);
        mask.remove(Signal::SIGWINCH);
        mask
    }
}

impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

/// A window-resize notification sampled from `SIGWINCH` (spec §5,
/// §4.8 `update_size`/"the host may also call this directly"). Built
/// on `signal_hook::flag::register`, the same primitive the teacher
/// uses.
pub struct WinchFlag(Arc<AtomicBool>);

impl WinchFlag {
    pub fn register() -> Result<WinchFlag> {
        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGWINCH, Arc::clone(&flag))
            .map_err(Error::Io)?;
        Ok(WinchFlag(flag))
    }

    /// Consume the pending flag, if set, returning whether a resize
    /// was observed since the last call.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// A cooperative cancellation flag (spec §5 "the caller's cancel flag
/// was observed set" -> [`crate::key::Key::Cancelled`]). Cloning
/// shares the same underlying flag, so a caller can hand a clone to
/// another thread and call [`CancelFlag::set`] from there to interrupt
/// a blocking `read_line`.
#[derive(Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the same `CancelFlag` can be reused for a
    /// subsequent `read_line` call.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for CancelFlag {
    fn default() -> CancelFlag {
        CancelFlag::new()
    }
}

/// Run `f` with the three watched signals briefly unblocked, then
/// re-block them (spec §5 async mode: "the signal mask is only held
/// while actually reading"). A signal arriving during `f` interrupts
/// the underlying syscall with `EINTR`, which [`crate::terminal::
/// read_some`] retries transparently.
pub fn with_signals_unblocked<T>(f: impl FnOnce() -> T) -> T {
    let watched = watched_signals();
    let _ = signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&watched), None);
    let result = f();
    let _ = signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&watched), None);
    result
}

/// Outcome of [`wait_readable`].
#[derive(Debug, PartialEq, Eq)]
pub enum Wait {
    /// `fd` has data ready to read.
    Readable,
    /// `timeout` elapsed with nothing to read (spec §4.2's 50ms ESC
    /// disambiguation window fires this way).
    TimedOut,
    /// A watched signal arrived during the wait; the caller should
    /// re-check window size / the cancel flag and retry.
    Signaled,
}

/// Wait for `fd` to become readable, `timeout` to elapse, or a watched
/// signal to arrive, whichever comes first, atomically unblocking
/// exactly `SIGINT`/`SIGALRM`/`SIGWINCH` (per `mask_guard`'s saved
/// process mask) only for the span of the underlying `pselect` call
/// (spec §5 "Suspension points"). Any other signal the host had
/// already blocked stays blocked during the wait.
pub fn wait_readable(fd: RawFd, timeout: Option<Duration>, mask_guard: &SignalMaskGuard) -> Result<Wait> {
    let mut read_fds = FdSet::new();
    read_fds.insert(fd);

    let unblocked_during_wait = mask_guard.pselect_mask();
    let ts = timeout.map(|d| TimeSpec::new(d.as_secs() as i64, i64::from(d.subsec_nanos())));

    let outcome = pselect(
        Some(fd + 1),
        Some(&mut read_fds),
        None,
        None,
        ts,
        Some(&unblocked_during_wait),
    );

    match outcome {
        Ok(n) if n > 0 && read_fds.contains(fd) => Ok(Wait::Readable),
        Ok(_) => Ok(Wait::TimedOut),
        Err(Errno::EINTR) => {
            trace!("wait_readable interrupted by a watched signal");
            Ok(Wait::Signaled)
        }
        Err(e) => Err(Error::Io(std::io::Error::from(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_starts_clear() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
    }

    #[test]
    fn cancel_flag_set_is_visible_through_clone() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.set();
        assert!(flag.is_set());
    }

    #[test]
    fn cancel_flag_clear_resets() {
        let flag = CancelFlag::new();
        flag.set();
        flag.clear();
        assert!(!flag.is_set());
    }

    #[test]
    fn wait_readable_times_out_on_a_never_ready_fd() {
        // /dev/null is always open but never becomes "readable" with
        // pending data beyond EOF; a zero timeout must return promptly
        // either way without blocking the test suite.
        let file = std::fs::File::open("/dev/null").unwrap();
        use std::os::unix::io::AsRawFd;
        let guard = SignalMaskGuard::install().unwrap();
        let result = wait_readable(file.as_raw_fd(), Some(Duration::from_millis(1)), &guard);
        assert!(result.is_ok());
    }
}
