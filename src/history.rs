//! Bounded history store (spec §4.5).
//!
//! Grounded on the teacher's file-backed `Buffer::from_file`/
//! `to_string` line handling, generalized from "one string per line of
//! a file being edited" to "one string per previously entered line".

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::debug;

use crate::error::Result;

const DEFAULT_MAX_LEN: usize = 100;

/// An ordered, capped history of previously entered lines.
///
/// While a session is active the tail entry is a *sentinel*: the line
/// currently being edited, kept in sync so that browsing away and
/// back with CTRL_P/CTRL_N preserves in-progress edits (spec §4.5).
pub struct History {
    entries: Vec<String>,
    max_len: usize,
    /// 0 while no sentinel is held; Some(true) once `enter_session`
    /// has pushed the sentinel tail entry.
    has_sentinel: bool,
}

impl History {
    pub fn new() -> History {
        History {
            entries: Vec::new(),
            max_len: DEFAULT_MAX_LEN,
            has_sentinel: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `line`, dropping the oldest entry if already at cap
    /// (spec §8 "adding when full drops entry 0, not the newest").
    pub fn add(&mut self, line: String) {
        if self.entries.len() >= self.max_len {
            self.entries.remove(0);
        }
        self.entries.push(line);
    }

    /// Shrink (or grow) the cap, dropping the oldest entries first if
    /// shrinking below the current length.
    pub fn set_max(&mut self, n: usize) {
        self.max_len = n;
        while self.entries.len() > self.max_len {
            self.entries.remove(0);
        }
    }

    /// Called when the engine enters READ: pushes the sentinel
    /// "current edit" entry at the tail.
    pub fn enter_session(&mut self, initial: String) {
        debug_assert!(!self.has_sentinel);
        self.entries.push(initial);
        self.has_sentinel = true;
    }

    /// Called on ENTER/cancel: releases the sentinel. If `committed`
    /// is `Some`, the sentinel is replaced by the caller's committed
    /// line (host policy decides whether to keep empty lines); if
    /// `None`, the sentinel is simply dropped.
    pub fn leave_session(&mut self, committed: Option<String>) {
        if !self.has_sentinel {
            return;
        }
        self.entries.pop();
        self.has_sentinel = false;
        if let Some(line) = committed {
            if !line.is_empty() {
                self.add(line);
            }
        }
    }

    /// Entry at `newest - index`, where `index = 0` is the sentinel
    /// (the entry currently being edited), matching spec §3
    /// `history_index`.
    fn slot(&self, index: usize) -> Option<usize> {
        let len = self.entries.len();
        if index >= len {
            None
        } else {
            Some(len - 1 - index)
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slot(index).map(|i| self.entries[i].as_str())
    }

    /// Overwrite the entry at `index` (used to snapshot the in-progress
    /// buffer before navigating away from it, spec §4.5 `next`).
    pub fn set_at(&mut self, index: usize, line: String) {
        if let Some(i) = self.slot(index) {
            self.entries[i] = line;
        }
    }

    /// Highest valid history index (the oldest entry), or `0` if only
    /// the sentinel exists.
    pub fn max_index(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(|s| s.as_str())
    }

    /// One entry per line, LF-terminated, no escaping (spec §6).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = fs::File::create(path)?;
        for entry in &self.entries {
            file.write_all(entry.as_bytes())?;
            file.write_all(b"\n")?;
        }
        debug!(count = self.entries.len(), "history saved");
        Ok(())
    }

    /// Lenient load: strips the first trailing CR or LF per line;
    /// empty lines become empty entries (spec §6).
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.entries.clear();
        for raw_line in contents.split('\n') {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            self.entries.push(line.to_string());
        }
        // `split('\n')` yields a trailing empty entry for
        // LF-terminated files; drop it so save-then-load round-trips.
        if self.entries.last().map(|s| s.is_empty()).unwrap_or(false) {
            self.entries.pop();
        }
        while self.entries.len() > self.max_len {
            self.entries.remove(0);
        }
        debug!(count = self.entries.len(), "history loaded");
        Ok(())
    }
}

impl Default for History {
    fn default() -> History {
        History::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn add_drops_oldest_when_full() {
        let mut h = History::new();
        h.set_max(2);
        h.add("one".into());
        h.add("two".into());
        h.add("three".into());
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(0), Some("three"));
        assert_eq!(h.get(1), Some("two"));
    }

    #[test]
    fn set_max_shrinks_by_dropping_oldest() {
        let mut h = History::new();
        h.add("one".into());
        h.add("two".into());
        h.add("three".into());
        h.set_max(1);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(0), Some("three"));
    }

    #[test]
    fn sentinel_lifecycle_round_trips() {
        let mut h = History::new();
        h.add("one".into());
        h.add("two".into());
        h.enter_session(String::new());
        assert_eq!(h.get(0), Some(""));
        assert_eq!(h.get(1), Some("two"));
        h.leave_session(Some("three".into()));
        assert_eq!(h.get(0), Some("three"));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn leave_session_without_commit_drops_sentinel() {
        let mut h = History::new();
        h.add("one".into());
        h.enter_session("scratch".into());
        h.leave_session(None);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(0), Some("one"));
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut h = History::new();
        h.add("echo hello".into());
        h.add("ls -la".into());
        let mut path = env::temp_dir();
        path.push(format!("liner-engine-history-test-{}.txt", std::process::id()));
        h.save(&path).unwrap();

        let mut loaded = History::new();
        loaded.load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.get(0), Some("ls -la"));
        assert_eq!(loaded.get(1), Some("echo hello"));
        assert_eq!(loaded.len(), 2);
    }
}
