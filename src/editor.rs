//! The editor session (spec §4.6, §4.8): the `Editor` type tying every
//! other module together, its NORMAL/COMPLETION/REVERSE_SEARCH
//! dispatch tables, and the sync/async `read_line` entry points.
//!
//! Grounded on the teacher's `Context`-holds-everything /
//! `event_loop`-drives-dispatch shape (`src/context.rs`,
//! `src/event_loop.rs`, `src/dispatcher.rs`), re-targeted from
//! Emacs-keymap-tree dispatch to the fixed three-mode table spec §4.6
//! names. Mode is a tagged variant per spec §9 rather than nullable
//! fields, so "search state exists iff mode is REVERSE_SEARCH" is
//! structural.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::buffer::EditBuffer;
use crate::completion::{Completion, CompletionBuilder, CompletionSet};
use crate::decoder::{Decoder, Feed};
use crate::display::{self, RefreshState};
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use crate::guard::RawModeGuard;
use crate::history::History;
use crate::key::{CtrlKey, EditKey, Key};
use crate::search::SearchState;
use crate::signals::{self, CancelFlag, SignalMaskGuard, WinchFlag};
use crate::terminal::{self, Screen};

const ESC_TIMEOUT: Duration = Duration::from_millis(50);

/// How a `read_line`/`read_line_step` call ended (spec §4.6
/// "Termination").
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// ENTER, or CLOSED with a non-empty buffer: the accepted line.
    HaveText(String),
    /// End-of-file with an empty buffer.
    Closed,
    /// CTRL_C on an empty buffer, or the cancel flag was observed set.
    Cancelled,
    /// Asynchronous mode only: no more input is currently available;
    /// call `read_line_step` again once the descriptor is readable.
    Continue,
}

type CompletionCallback = Box<dyn FnMut(&[u8], usize, &mut CompletionBuilder)>;

enum Mode {
    Normal,
    Completion(CompletionSet),
    ReverseSearch(SearchState),
}

/// One line-editing session (spec §3). Construct once per input/output
/// descriptor pair and reuse across calls to `read_line`.
pub struct Editor {
    input_fd: i32,
    output_fd: i32,
    enc: Encoding,
    prompt: Vec<u8>,
    temp_prompt: Option<Vec<u8>>,
    multiline: bool,
    columns: usize,
    history: History,
    history_index: usize,
    decoder: Decoder,
    screen: Screen,
    refresh: RefreshState,
    mode: Mode,
    buffer: EditBuffer,
    cancel: CancelFlag,
    winch: Option<WinchFlag>,
    esc_deadline: Option<Instant>,
    completion_callback: Option<CompletionCallback>,
    raw_guard: Option<RawModeGuard>,
    mask_guard: Option<SignalMaskGuard>,
    /// Buffer contents as they were just before CTRL_R was pressed,
    /// restored if the search is cancelled (spec §4.6 "return to
    /// NORMAL with the buffer as it was before search began").
    search_buffer_backup: Option<(Vec<u8>, usize)>,
    /// `true` when `input_fd` is not a capable terminal (not a tty, or
    /// `TERM` is blacklisted): `read_line` falls back to buffered
    /// line-at-a-time reads instead of raw-mode key dispatch (spec §8
    /// "Terminal blacklist").
    needs_fallback: bool,
    /// Whether CTRL_G-style notifications emit a bell byte (SPEC_FULL
    /// B.1 `set_beep_enabled`); default `true`.
    beep_enabled: bool,
    /// When set, the buffer is displayed with every byte replaced by
    /// this mask byte instead of its real contents, for password-style
    /// entry (SPEC_FULL B.2 `set_mask_mode`). The real buffer contents
    /// are untouched; only the on-screen rendering is affected.
    mask_byte: Option<u8>,
}

impl Editor {
    pub fn new(input_fd: i32, output_fd: i32) -> Editor {
        let needs_fallback = terminal::is_unsupported_term(input_fd);
        let columns = terminal::get_columns(input_fd, output_fd);
        Editor {
            input_fd,
            output_fd,
            enc: Encoding::default(),
            prompt: b"> ".to_vec(),
            temp_prompt: None,
            multiline: false,
            columns,
            history: History::new(),
            history_index: 0,
            decoder: Decoder::new(),
            screen: Screen::new(output_fd),
            refresh: RefreshState::new(),
            mode: Mode::Normal,
            buffer: EditBuffer::new(),
            cancel: CancelFlag::new(),
            winch: None,
            esc_deadline: None,
            completion_callback: None,
            raw_guard: None,
            mask_guard: None,
            search_buffer_backup: None,
            needs_fallback,
            beep_enabled: true,
            mask_byte: None,
        }
    }

    // ---- Public API (spec §4.8) ----

    pub fn set_prompt(&mut self, prompt: impl AsRef<[u8]>) {
        self.prompt = prompt.as_ref().to_vec();
    }

    pub fn set_temp_prompt(&mut self, prompt: impl AsRef<[u8]>) {
        self.temp_prompt = Some(prompt.as_ref().to_vec());
    }

    pub fn set_multiline_mode(&mut self, enabled: bool) {
        self.multiline = enabled;
        self.refresh.reset();
    }

    pub fn set_completion_callback(
        &mut self,
        callback: impl FnMut(&[u8], usize, &mut CompletionBuilder) + 'static,
    ) {
        self.completion_callback = Some(Box::new(callback));
    }

    pub fn set_encoding_hooks(&mut self, enc: Encoding) {
        self.enc = enc;
    }

    /// Suppress the bell byte entirely (SPEC_FULL B.1). Enabled by
    /// default; some embedders consider an audible/visual bell
    /// obnoxious inside a larger TUI host.
    pub fn set_beep_enabled(&mut self, enabled: bool) {
        self.beep_enabled = enabled;
    }

    /// Render the buffer on screen with every byte replaced by `mask`
    /// instead of its real contents, for password-style entry
    /// (SPEC_FULL B.2). `None` restores normal echo. The real buffer
    /// contents are never affected, only the display.
    pub fn set_mask_mode(&mut self, mask: Option<u8>) {
        self.mask_byte = mask;
        self.refresh.reset();
    }

    /// Emit the bell byte, unless suppressed by [`Editor::set_beep_enabled`].
    fn bell(&mut self) {
        if self.beep_enabled {
            self.screen.bell();
        }
    }

    /// A thread-safe, cloneable handle that can be used to cancel a
    /// blocking `read_line` from another thread or a signal handler
    /// (spec §5 "Cancellation").
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Start observing `SIGWINCH` and sampling window-size changes
    /// between keys (spec §5). Optional: callers that only ever invoke
    /// `update_size` manually don't need this.
    pub fn watch_winch(&mut self) -> Result<()> {
        self.winch = Some(WinchFlag::register()?);
        Ok(())
    }

    pub fn show_prompt(&mut self) -> Result<()> {
        self.refresh();
        self.screen.flush()
    }

    pub fn clear_screen(&mut self) -> Result<()> {
        self.screen.clear_screen();
        self.refresh.reset();
        self.refresh();
        self.screen.flush()
    }

    pub fn update_size(&mut self) {
        self.columns = terminal::get_columns(self.input_fd, self.output_fd);
    }

    pub fn history_add(&mut self, line: impl Into<String>) {
        self.history.add(line.into());
    }

    pub fn history_save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.history.save(path)
    }

    pub fn history_load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.history.load(path)
    }

    pub fn history_set_max(&mut self, n: usize) {
        self.history.set_max(n);
    }

    /// Read one line synchronously, blocking until it is accepted,
    /// cancelled, or the input is closed.
    pub fn read_line(&mut self) -> Result<Outcome> {
        if self.needs_fallback {
            return self.read_line_fallback();
        }
        loop {
            if let Some(outcome) = self.step(true)? {
                return Ok(outcome);
            }
        }
    }

    /// Advance the session by whatever input is currently available
    /// without blocking, returning [`Outcome::Continue`] if nothing
    /// completed the line yet (spec §5 "Asynchronous mode").
    pub fn read_line_step(&mut self) -> Result<Outcome> {
        if self.needs_fallback {
            return self.read_line_fallback();
        }
        match self.step(false)? {
            Some(outcome) => Ok(outcome),
            None => Ok(Outcome::Continue),
        }
    }

    // ---- Session plumbing ----

    fn step(&mut self, blocking: bool) -> Result<Option<Outcome>> {
        if self.raw_guard.is_none() {
            self.raw_guard = Some(RawModeGuard::acquire(self.input_fd)?);
            self.mask_guard = Some(SignalMaskGuard::install()?);
            self.begin_session();
        }

        let key = match self.next_key(blocking) {
            Ok(key) => key,
            Err(Error::WouldBlock) => return Ok(None),
            Err(e) => {
                self.teardown();
                return Err(e);
            }
        };

        let outcome = self.dispatch_key(key);
        let _ = self.screen.flush();
        if outcome.is_some() {
            self.teardown();
        }
        Ok(outcome)
    }

    fn begin_session(&mut self) {
        self.buffer.clear();
        self.history.enter_session(String::new());
        self.history_index = 0;
        self.mode = Mode::Normal;
        self.temp_prompt = None;
        self.decoder = Decoder::new();
        self.refresh = RefreshState::new();
        self.esc_deadline = None;
        self.search_buffer_backup = None;
        self.refresh();
        let _ = self.screen.flush();
    }

    fn teardown(&mut self) {
        self.raw_guard = None;
        self.mask_guard = None;
    }

    /// TERM is blacklisted, or the descriptor is not a tty at all:
    /// read a line the ordinary buffered way (spec §8).
    fn read_line_fallback(&mut self) -> Result<Outcome> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match terminal::read_some(self.input_fd, &mut byte) {
                Ok(0) => {
                    return Ok(if line.is_empty() {
                        Outcome::Closed
                    } else {
                        Outcome::HaveText(String::from_utf8_lossy(&line).into_owned())
                    });
                }
                Ok(_) if byte[0] == b'\n' => {
                    return Ok(Outcome::HaveText(String::from_utf8_lossy(&line).into_owned()));
                }
                Ok(_) => line.push(byte[0]),
                Err(e) => return Err(e),
            }
        }
    }

    fn sample_winch(&mut self) {
        if let Some(winch) = &self.winch {
            if winch.take() {
                self.update_size();
            }
        }
    }

    /// Block the watched signals for this process, then wait for the
    /// next byte (sync) or try exactly once without blocking (async),
    /// feeding it to the decoder until a complete key emerges (spec
    /// §5 "Suspension points").
    fn next_key(&mut self, blocking: bool) -> Result<Key> {
        if let Some(key) = self.decoder.take_pushback() {
            return Ok(key);
        }
        if self.cancel.is_set() {
            self.cancel.clear();
            return Ok(Key::Cancelled);
        }
        self.sample_winch();

        loop {
            if self.decoder.awaiting_esc_continuation() {
                let deadline = *self.esc_deadline.get_or_insert_with(|| Instant::now() + ESC_TIMEOUT);
                if Instant::now() >= deadline {
                    self.esc_deadline = None;
                    return Ok(self.decoder.esc_timeout_elapsed());
                }
            } else {
                self.esc_deadline = None;
            }

            let mut byte = [0u8; 1];
            let bytes_read = if blocking {
                let timeout = self
                    .esc_deadline
                    .map(|deadline| deadline.saturating_duration_since(Instant::now()));
                let mask_guard = self.mask_guard.as_ref().expect("session holds a signal mask guard");
                match signals::wait_readable(self.input_fd, timeout, mask_guard)? {
                    signals::Wait::Readable => Some(terminal::read_some(self.input_fd, &mut byte)?),
                    signals::Wait::TimedOut => None,
                    signals::Wait::Signaled => {
                        self.sample_winch();
                        if self.cancel.is_set() {
                            self.cancel.clear();
                            return Ok(Key::Cancelled);
                        }
                        None
                    }
                }
            } else {
                match signals::with_signals_unblocked(|| terminal::read_some(self.input_fd, &mut byte)) {
                    Ok(n) => Some(n),
                    Err(Error::WouldBlock) => return Err(Error::WouldBlock),
                    Err(e) => return Err(e),
                }
            };

            match bytes_read {
                Some(0) => return Ok(Key::Closed),
                Some(_) => match self.decoder.feed_byte(byte[0]) {
                    Feed::Complete(key) => return Ok(key),
                    Feed::ArmEscTimer => self.esc_deadline = Some(Instant::now() + ESC_TIMEOUT),
                    Feed::Overflow(bytes) => {
                        self.decoder
                            .push_back_many(bytes.into_iter().map(Key::Printable).collect());
                        if let Some(key) = self.decoder.take_pushback() {
                            return Ok(key);
                        }
                    }
                    Feed::Pending => {}
                },
                None if !blocking => return Err(Error::WouldBlock),
                None => {}
            }
        }
    }

    // ---- Dispatch (spec §4.6) ----

    fn dispatch_key(&mut self, key: Key) -> Option<Outcome> {
        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.dispatch_normal(key),
            Mode::Completion(set) => self.dispatch_completion(key, set),
            Mode::ReverseSearch(search) => self.dispatch_reverse_search(key, search),
        }
    }

    fn dispatch_normal(&mut self, key: Key) -> Option<Outcome> {
        match key {
            Key::Ctrl(CtrlKey::Enter) => {
                let text = self.buffer.to_string_lossy();
                self.history.leave_session(Some(text.clone()));
                return Some(Outcome::HaveText(text));
            }
            Key::Ctrl(CtrlKey::C) | Key::Cancelled => {
                if self.buffer.is_empty() {
                    self.history.leave_session(None);
                    return Some(Outcome::Cancelled);
                }
                self.echo_and_newline(b"^C");
                self.buffer.clear();
                self.history_index = 0;
            }
            Key::Ctrl(CtrlKey::D) => {
                if self.buffer.is_empty() {
                    self.history.leave_session(None);
                    return Some(Outcome::Closed);
                }
                self.buffer.delete_forward(&self.enc);
            }
            Key::Ctrl(CtrlKey::Backspace) | Key::Ctrl(CtrlKey::H) => self.buffer.backspace(&self.enc),
            Key::Ctrl(CtrlKey::T) => self.buffer.transpose(),
            Key::Ctrl(CtrlKey::B) | Key::Edit(EditKey::Left) => self.buffer.move_left(&self.enc),
            Key::Ctrl(CtrlKey::F) | Key::Edit(EditKey::Right) => self.buffer.move_right(&self.enc),
            Key::Ctrl(CtrlKey::P) | Key::Edit(EditKey::Up) => {
                if self.mask_byte.is_none() {
                    self.history_prev();
                } else {
                    self.bell();
                }
            }
            Key::Ctrl(CtrlKey::N) | Key::Edit(EditKey::Down) => {
                if self.mask_byte.is_none() {
                    self.history_next();
                } else {
                    self.bell();
                }
            }
            Key::Ctrl(CtrlKey::A) | Key::Edit(EditKey::Home) => self.buffer.move_home(),
            Key::Ctrl(CtrlKey::E) | Key::Edit(EditKey::End) => self.buffer.move_end(),
            Key::Ctrl(CtrlKey::U) => self.buffer.kill_line(),
            Key::Ctrl(CtrlKey::K) => self.buffer.kill_to_end(),
            Key::Ctrl(CtrlKey::W) => self.buffer.delete_previous_word(),
            Key::Ctrl(CtrlKey::L) => {
                self.screen.clear_screen();
                self.refresh.reset();
            }
            Key::Ctrl(CtrlKey::Tab) => {
                if self.completion_callback.is_some() {
                    debug!("NORMAL -> COMPLETION");
                    self.enter_completion();
                } else {
                    self.buffer.insert_byte(b'\t');
                }
            }
            Key::Ctrl(CtrlKey::R) => {
                if self.mask_byte.is_none() {
                    debug!("NORMAL -> REVERSE_SEARCH");
                    self.enter_reverse_search();
                } else {
                    self.bell();
                }
            }
            Key::Edit(EditKey::Delete) => self.buffer.delete_forward(&self.enc),
            Key::Printable(byte) => self.buffer.insert_byte(byte),
            Key::Closed => {
                if self.buffer.is_empty() {
                    self.history.leave_session(None);
                    return Some(Outcome::Closed);
                }
                let text = self.buffer.to_string_lossy();
                self.history.leave_session(Some(text.clone()));
                return Some(Outcome::HaveText(text));
            }
            Key::Error => {
                self.history.leave_session(None);
            }
            Key::Esc => {}
        }
        self.refresh();
        None
    }

    fn enter_completion(&mut self) {
        let Some(mut callback) = self.completion_callback.take() else {
            return;
        };
        // Ensure the engine's own writes are on screen before a
        // callback might call `custom_output` and clear the line out
        // from under a stale reconciliation (spec §5 "Ordering").
        let _ = self.screen.flush();
        let mut builder = CompletionBuilder::with_output_fd(self.output_fd);
        callback(self.buffer.as_bytes(), self.buffer.cursor(), &mut builder);
        self.completion_callback = Some(callback);
        let set = builder.into_set();

        if set.is_empty() {
            self.bell();
            return;
        }

        if set.len() == 1 {
            self.apply_single_completion(set.current());
            return;
        }

        self.apply_completion_prefix(&set);
        self.print_completion_listing(&set);
        self.mode = Mode::Completion(set);
    }

    fn apply_single_completion(&mut self, candidate: &Completion) {
        let mut text = candidate.replacement.clone();
        let mut cursor = candidate.cursor;
        if !text.ends_with('/') {
            let was_at_end = cursor == text.len();
            text.push(' ');
            if was_at_end {
                cursor += 1;
            }
        }
        self.buffer.set(text.as_bytes(), cursor);
    }

    fn apply_completion_prefix(&mut self, set: &CompletionSet) {
        let prefix = set.longest_common_prefix().to_string();
        let cursor = prefix.len();
        self.buffer.set(prefix.as_bytes(), cursor);
    }

    /// Move to a fresh row, list every candidate in column-major order
    /// (spec §4.6), asking for confirmation first when there are 100
    /// or more.
    fn print_completion_listing(&mut self, set: &CompletionSet) {
        self.screen.write_bytes(b"\r\n");

        if set.len() >= 100 {
            self.screen.write_str(&format!("Display all {} possibilities? (y or n)", set.len()));
            if self.screen.flush().is_ok() {
                let mut byte = [0u8; 1];
                let answered_yes = terminal::read_some(self.input_fd, &mut byte)
                    .map(|_| matches!(byte[0], b'y' | b'Y'))
                    .unwrap_or(false);
                self.screen.write_bytes(b"\r\n");
                if !answered_yes {
                    self.refresh.reset();
                    return;
                }
            }
        }

        let columns = self.columns.max(1);
        let cols = set.listing_columns(columns);
        let cell_width = set.max_suggestion_width() + 2;
        let grid = set.column_major_order(columns);
        for (i, entry) in grid.iter().enumerate() {
            if let Some(candidate) = entry {
                self.screen
                    .write_str(&format!("{:<width$}", candidate.suggestion, width = cell_width));
            }
            if (i + 1) % cols == 0 {
                self.screen.write_bytes(b"\r\n");
            }
        }
        if grid.len() % cols != 0 {
            self.screen.write_bytes(b"\r\n");
        }
        self.refresh.reset();
    }

    fn dispatch_completion(&mut self, key: Key, mut set: CompletionSet) -> Option<Outcome> {
        match key {
            Key::Ctrl(CtrlKey::Tab) => {
                let candidate = set.advance();
                self.buffer.set(candidate.replacement.as_bytes(), candidate.cursor);
                self.mode = Mode::Completion(set);
            }
            other => {
                debug!("COMPLETION -> NORMAL");
                self.decoder.push_back(other);
                self.mode = Mode::Normal;
            }
        }
        self.refresh();
        None
    }

    fn enter_reverse_search(&mut self) {
        self.search_buffer_backup = Some((self.buffer.as_bytes().to_vec(), self.buffer.cursor()));
        let search = SearchState::new(self.history_index);
        self.temp_prompt = Some(search.prompt().into_bytes());
        self.mode = Mode::ReverseSearch(search);
    }

    fn show_search_match(&mut self, search: &SearchState, result: Option<(usize, usize)>) {
        match result {
            Some((index, cursor)) => {
                if let Some(text) = self.history.get(index) {
                    self.buffer.set(text.as_bytes(), cursor);
                }
            }
            None => self.bell(),
        }
        self.temp_prompt = Some(search.prompt().into_bytes());
    }

    fn dispatch_reverse_search(&mut self, key: Key, mut search: SearchState) -> Option<Outcome> {
        match key {
            Key::Printable(byte) => {
                search.push_char(byte as char);
                let result = search.search(&self.history);
                self.show_search_match(&search, result);
                self.mode = Mode::ReverseSearch(search);
            }
            Key::Ctrl(CtrlKey::Backspace) | Key::Ctrl(CtrlKey::H) => {
                if search.pop_char() {
                    self.temp_prompt = Some(search.prompt().into_bytes());
                } else {
                    let result = search.search(&self.history);
                    self.show_search_match(&search, result);
                }
                self.mode = Mode::ReverseSearch(search);
            }
            Key::Ctrl(CtrlKey::R) => {
                if search.query.is_empty() {
                    if self.history.max_index() > 0 {
                        search.current_index = self.history_index;
                    }
                } else if search.found {
                    let result = search.advance(&self.history);
                    self.show_search_match(&search, result);
                } else {
                    self.bell();
                }
                self.temp_prompt = Some(search.prompt().into_bytes());
                self.mode = Mode::ReverseSearch(search);
            }
            Key::Ctrl(CtrlKey::C) | Key::Cancelled => {
                debug!("REVERSE_SEARCH -> NORMAL (cancelled)");
                self.temp_prompt = None;
                if let Some((bytes, cursor)) = self.search_buffer_backup.take() {
                    self.buffer.set(&bytes, cursor);
                }
                self.echo_and_newline(b"^C");
                self.mode = Mode::Normal;
            }
            Key::Closed => {
                self.temp_prompt = None;
                self.search_buffer_backup = None;
                self.mode = Mode::Normal;
                self.decoder.push_back(Key::Closed);
            }
            other => {
                debug!("REVERSE_SEARCH -> NORMAL");
                self.temp_prompt = None;
                self.search_buffer_backup = None;
                self.mode = Mode::Normal;
                self.decoder.push_back(other);
            }
        }
        self.refresh();
        None
    }

    fn history_prev(&mut self) {
        if self.history_index < self.history.max_index() {
            self.history.set_at(self.history_index, self.buffer.to_string_lossy());
            self.history_index += 1;
            if let Some(text) = self.history.get(self.history_index) {
                let len = text.len();
                self.buffer.set(text.as_bytes(), len);
            }
        } else {
            self.bell();
        }
    }

    fn history_next(&mut self) {
        if self.history_index > 0 {
            self.history.set_at(self.history_index, self.buffer.to_string_lossy());
            self.history_index -= 1;
            if let Some(text) = self.history.get(self.history_index) {
                let len = text.len();
                self.buffer.set(text.as_bytes(), len);
            }
        } else {
            self.bell();
        }
    }

    fn echo_and_newline(&mut self, text: &[u8]) {
        self.screen.write_bytes(text);
        self.screen.write_bytes(b"\r\n");
    }

    fn effective_prompt(&self) -> Vec<u8> {
        self.temp_prompt.clone().unwrap_or_else(|| self.prompt.clone())
    }

    fn refresh(&mut self) {
        let prompt = self.effective_prompt();
        let prompt_cols = display::prompt_column_width(&prompt);
        let masked;
        let display_buf: &[u8] = match self.mask_byte {
            Some(mask) => {
                masked = vec![mask; self.buffer.len()];
                &masked
            }
            None => self.buffer.as_bytes(),
        };
        if self.multiline {
            display::refresh_multi_line(
                &mut self.screen,
                &mut self.refresh,
                &prompt,
                prompt_cols,
                display_buf,
                self.buffer.cursor(),
                self.columns,
                &self.enc,
            );
        } else {
            display::refresh_single_line(
                &mut self.screen,
                &mut self.refresh,
                &prompt,
                prompt_cols,
                display_buf,
                self.buffer.cursor(),
                self.columns,
                &self.enc,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> Editor {
        let mut e = Editor::new(-1, -1);
        e.begin_session();
        e
    }

    fn feed(e: &mut Editor, keys: &[Key]) -> Option<Outcome> {
        let mut last = None;
        for key in keys {
            last = e.dispatch_key(*key);
            if last.is_some() {
                break;
            }
        }
        last
    }

    #[test]
    fn plain_input_then_enter_returns_text() {
        let mut e = editor();
        let keys: Vec<Key> = "hello".bytes().map(Key::Printable).collect();
        assert_eq!(feed(&mut e, &keys), None);
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::Enter));
        assert_eq!(outcome, Some(Outcome::HaveText("hello".to_string())));
    }

    #[test]
    fn edit_and_accept() {
        let mut e = editor();
        let mut keys: Vec<Key> = "abc".bytes().map(Key::Printable).collect();
        keys.push(Key::Edit(EditKey::Left));
        keys.push(Key::Edit(EditKey::Left));
        keys.push(Key::Printable(b'x'));
        feed(&mut e, &keys);
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::Enter));
        assert_eq!(outcome, Some(Outcome::HaveText("axbc".to_string())));
    }

    #[test]
    fn history_navigation_round_trips() {
        let mut e = Editor::new(-1, -1);
        e.history_add("one".to_string());
        e.history_add("two".to_string());
        e.begin_session();

        e.dispatch_key(Key::Edit(EditKey::Up));
        assert_eq!(e.buffer.to_string_lossy(), "two");
        e.dispatch_key(Key::Edit(EditKey::Up));
        assert_eq!(e.buffer.to_string_lossy(), "one");
        e.dispatch_key(Key::Edit(EditKey::Down));
        assert_eq!(e.buffer.to_string_lossy(), "two");
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::Enter));
        assert_eq!(outcome, Some(Outcome::HaveText("two".to_string())));
    }

    #[test]
    fn tab_completion_single_candidate_appends_trailing_space() {
        let mut e = editor();
        e.set_completion_callback(|buf, _cursor, builder| {
            if buf == b"he" {
                builder.add("hello", "hello", 5);
            }
        });
        feed(&mut e, &[Key::Printable(b'h'), Key::Printable(b'e'), Key::Ctrl(CtrlKey::Tab)]);
        assert_eq!(e.buffer.to_string_lossy(), "hello ");
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::Enter));
        assert_eq!(outcome, Some(Outcome::HaveText("hello ".to_string())));
    }

    #[test]
    fn tab_completion_with_no_candidates_beeps_and_stays_normal() {
        let mut e = editor();
        e.set_completion_callback(|_buf, _cursor, _builder| {});
        let outcome = feed(&mut e, &[Key::Printable(b'x'), Key::Ctrl(CtrlKey::Tab)]);
        assert_eq!(outcome, None);
        assert_eq!(e.buffer.to_string_lossy(), "x");
    }

    #[test]
    fn reverse_search_finds_and_accepts_entry() {
        let mut e = Editor::new(-1, -1);
        e.history_add("echo hello".to_string());
        e.history_add("ls -la".to_string());
        e.begin_session();

        feed(
            &mut e,
            &[
                Key::Ctrl(CtrlKey::R),
                Key::Printable(b'e'),
                Key::Printable(b'c'),
                Key::Printable(b'h'),
            ],
        );
        assert_eq!(e.buffer.to_string_lossy(), "echo hello");

        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::Enter));
        assert_eq!(outcome, Some(Outcome::HaveText("echo hello".to_string())));
    }

    #[test]
    fn reverse_search_cancel_restores_prior_buffer() {
        let mut e = Editor::new(-1, -1);
        e.history_add("echo hello".to_string());
        e.begin_session();
        feed(&mut e, &[Key::Printable(b'x'), Key::Printable(b'y')]);

        feed(&mut e, &[Key::Ctrl(CtrlKey::R), Key::Printable(b'e')]);
        assert_eq!(e.buffer.to_string_lossy(), "echo hello");

        e.dispatch_key(Key::Ctrl(CtrlKey::C));
        assert_eq!(e.buffer.to_string_lossy(), "xy");
    }

    #[test]
    fn ctrl_c_on_empty_buffer_cancels() {
        let mut e = editor();
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::C));
        assert_eq!(outcome, Some(Outcome::Cancelled));
    }

    #[test]
    fn ctrl_c_on_nonempty_buffer_clears_and_continues() {
        let mut e = editor();
        feed(&mut e, &[Key::Printable(b'x')]);
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::C));
        assert_eq!(outcome, None);
        assert_eq!(e.buffer.to_string_lossy(), "");
    }

    #[test]
    fn ctrl_d_on_empty_buffer_closes() {
        let mut e = editor();
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::D));
        assert_eq!(outcome, Some(Outcome::Closed));
    }

    #[test]
    fn esc_is_ignored_in_normal_mode() {
        let mut e = editor();
        feed(&mut e, &[Key::Printable(b'x')]);
        let outcome = e.dispatch_key(Key::Esc);
        assert_eq!(outcome, None);
        assert_eq!(e.buffer.to_string_lossy(), "x");
    }

    #[test]
    fn mask_mode_leaves_real_buffer_untouched() {
        let mut e = editor();
        e.set_mask_mode(Some(b'*'));
        feed(&mut e, &[Key::Printable(b's'), Key::Printable(b'e'), Key::Printable(b'c')]);
        assert_eq!(e.buffer.to_string_lossy(), "sec");
        let outcome = e.dispatch_key(Key::Ctrl(CtrlKey::Enter));
        assert_eq!(outcome, Some(Outcome::HaveText("sec".to_string())));
    }

    #[test]
    fn beep_disabled_suppresses_bell_byte() {
        let mut e = editor();
        e.set_beep_enabled(false);
        e.set_completion_callback(|_buf, _cursor, _builder| {});
        feed(&mut e, &[Key::Printable(b'x'), Key::Ctrl(CtrlKey::Tab)]);
        assert!(e.screen.peek_buffer().iter().all(|&b| b != 0x07));
    }
}
