//! The process-wide raw-mode singleton (spec §3 "Global singleton"):
//! only one file descriptor may be in raw mode at a time, and its
//! original attributes must be restored even if the process exits
//! through an unexpected path.
//!
//! Grounded on `r3bl-open-core/tui/src/core/ansi/terminal_raw_mode.rs`'s
//! `static ... LazyLock<Mutex<Option<Termios>>>` + `RawModeGuard`
//! pattern, adapted from that crate's `rustix` termios wrapper to
//! `nix::sys::termios` (the teacher's own termios crate), since the
//! teacher itself only ever restored attributes by unwinding its own
//! `main`.

use std::sync::{Mutex, Once, OnceLock};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::terminal::{self, SavedAttrs};

struct ActiveRawMode {
    fd: i32,
    saved: SavedAttrs,
}

fn registry() -> &'static Mutex<Option<ActiveRawMode>> {
    static REGISTRY: OnceLock<Mutex<Option<ActiveRawMode>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(None))
}

/// `libc::atexit` callback: unconditionally restores whatever descriptor
/// is currently held in raw mode (spec §3 "a process-exit hook...
/// restores the saved attributes" and §4.1 "restored on every exit
/// path, including abnormal termination via the exit hook"). Must be
/// `extern "C"` with no captures, per `atexit`'s C ABI.
extern "C" fn exit_hook() {
    restore_if_active();
}

/// Install [`exit_hook`] with `libc::atexit` exactly once per process
/// (spec §3 "Global singleton... exit-handler installed flag").
fn ensure_exit_hook_installed() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        unsafe {
            nix::libc::atexit(exit_hook);
        }
    });
}

/// Holds `fd` in raw mode until dropped, restoring its original
/// attributes then. Only one `RawModeGuard` may exist at a time across
/// the whole process (spec §3); a second concurrent attempt fails with
/// [`Error::InvalidArgument`] rather than silently stacking, since
/// nested raw-mode enable/disable on the same fd is not a meaningful
/// operation.
pub struct RawModeGuard {
    fd: i32,
}

impl RawModeGuard {
    pub fn acquire(fd: i32) -> Result<RawModeGuard> {
        ensure_exit_hook_installed();
        let mut slot = registry().lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(Error::InvalidArgument(
                "a terminal is already in raw mode in this process",
            ));
        }
        let saved = terminal::enable_raw(fd)?;
        *slot = Some(ActiveRawMode { fd, saved });
        debug!(fd, "raw mode acquired");
        Ok(RawModeGuard { fd })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut slot = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = slot.take() {
            if active.fd != self.fd {
                // Should be unreachable (acquire() refuses a second
                // guard), but never leave the registry pointing at a
                // descriptor this guard doesn't own.
                *slot = Some(active);
                return;
            }
            if let Err(err) = terminal::disable_raw(active.fd, &active.saved) {
                warn!(fd = active.fd, ?err, "failed to restore terminal attributes");
            } else {
                debug!(fd = active.fd, "raw mode released");
            }
        }
    }
}

/// Force-restore whatever descriptor is currently held in raw mode,
/// without requiring the owning `RawModeGuard` (spec §4.8 "the host
/// process may be torn down by a signal handler that cannot hold a
/// borrowed guard"). Safe to call even if nothing is currently raw.
pub fn restore_if_active() {
    let mut slot = registry().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(active) = slot.take() {
        let _ = terminal::disable_raw(active.fd, &active.saved);
    }
}

/// The "custom output" primitive a completion callback must use before
/// doing its own terminal I/O (spec §6 "Completion callback contract"):
/// leaves raw mode on whatever descriptor is currently held raw, and
/// restores it again on drop. `begin` returns `None` if nothing is
/// currently raw (e.g. the editor is running over the blacklist
/// fallback path), in which case the callback's I/O needs no help from
/// this guard at all.
pub struct CustomOutputGuard {
    fd: i32,
}

impl CustomOutputGuard {
    pub fn begin() -> Option<CustomOutputGuard> {
        let (fd, saved) = {
            let slot = registry().lock().unwrap_or_else(|e| e.into_inner());
            let active = slot.as_ref()?;
            (active.fd, active.saved.clone())
        };
        if terminal::disable_raw(fd, &saved).is_err() {
            return None;
        }
        debug!(fd, "raw mode suspended for custom output");
        Some(CustomOutputGuard { fd })
    }
}

impl Drop for CustomOutputGuard {
    fn drop(&mut self) {
        match terminal::enable_raw(self.fd) {
            Ok(saved) => {
                let mut slot = registry().lock().unwrap_or_else(|e| e.into_inner());
                if let Some(active) = slot.as_mut() {
                    active.saved = saved;
                }
                debug!(fd = self.fd, "raw mode resumed after custom output");
            }
            Err(err) => warn!(fd = self.fd, ?err, "failed to resume raw mode after custom output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn acquiring_raw_mode_on_a_non_tty_fails() {
        // fd -1 is never a tty; enable_raw must reject it before the
        // registry is touched.
        let result = RawModeGuard::acquire(-1);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn registry_is_empty_after_a_failed_acquire() {
        let _ = RawModeGuard::acquire(-1);
        let slot = registry().lock().unwrap();
        assert!(slot.is_none());
    }
}
