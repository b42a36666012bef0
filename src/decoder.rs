//! The input decoder (spec §4.2): a byte-at-a-time ECMA-48-style state
//! machine that turns a raw byte stream into [`Key`] events, with
//! bare-ESC disambiguation and a bounded LIFO pushback stack.
//!
//! No teacher precedent for the escape-sequence grammar itself (the
//! teacher only ever reads a bare byte off stdin); the state names
//! (`IDLE`, `INTERMEDIATE`, `CSI_PARAM`/`CSI_INTER` merged into one
//! collecting state, `SS_CHAR`, `FINAL`) and the recognized-finals
//! table are exactly spec §4.2's.

use tracing::trace;

use crate::key::{CtrlKey, EditKey, Key};

/// Bytes collected mid-escape-sequence beyond this bound are pushed
/// back as raw printable input instead of being silently dropped
/// (spec §4.2 "unless `escape_buffer` overflows").
const ESCAPE_BUFFER_CAP: usize = 16;

/// Minimum capacity of the pushback stack (spec §3 "pushback: bounded
/// (>=32) stack of key events").
const PUSHBACK_CAP: usize = 64;

#[derive(Debug)]
enum State {
    Idle,
    /// Right after a bare ESC; `buf` accumulates intermediate bytes
    /// (`0x20..=0x2F`) seen before a final byte, `[`, or `N`/`O`.
    Intermediate(Vec<u8>),
    /// Inside a CSI sequence (after `ESC [`); `buf` accumulates every
    /// parameter/intermediate byte seen before the final byte.
    Csi(Vec<u8>),
    /// After `ESC N` or `ESC O` (SS2/SS3): exactly one more byte ends
    /// the sequence.
    Ss,
}

/// Outcome of feeding one byte to the decoder.
pub enum Feed {
    /// More bytes are needed before a key can be produced.
    Pending,
    /// The decoder just entered the bare-ESC disambiguation window;
    /// the caller should arm the 50ms timer (spec §4.2).
    ArmEscTimer,
    /// A complete key event was decoded.
    Complete(Key),
    /// The escape buffer overflowed; these raw bytes should be
    /// redelivered as printable input.
    Overflow(Vec<u8>),
}

/// The decoder's state machine plus its pushback stack.
pub struct Decoder {
    state: State,
    pushback: Vec<Key>,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder {
            state: State::Idle,
            pushback: Vec::with_capacity(PUSHBACK_CAP),
        }
    }

    /// True while the decoder is in the bare-ESC disambiguation
    /// window: a bare ESC has been seen and no continuation byte has
    /// arrived yet. The caller should wait for the next byte with the
    /// 50ms timeout rather than indefinitely (spec §5 "Suspension
    /// points").
    pub fn awaiting_esc_continuation(&self) -> bool {
        matches!(self.state, State::Intermediate(ref buf) if buf.is_empty())
    }

    /// Push a key event to be delivered before the next byte is read
    /// (spec §4.2 "pushback primitive"). Silently dropped if the
    /// bounded stack is full — a safety bound not expected to be hit
    /// in practice.
    pub fn push_back(&mut self, key: Key) {
        if self.pushback.len() < PUSHBACK_CAP {
            self.pushback.push(key);
        }
    }

    /// Push several keys so they pop off in the same order they are
    /// given (used for escape-buffer-overflow redelivery).
    pub fn push_back_many(&mut self, keys: Vec<Key>) {
        for key in keys.into_iter().rev() {
            self.push_back(key);
        }
    }

    /// Pop the next pending pushback entry, if any.
    pub fn take_pushback(&mut self) -> Option<Key> {
        self.pushback.pop()
    }

    /// Called when the 50ms ESC-disambiguation timer fires with no
    /// continuation byte: emits a raw ESC key (spec §4.2).
    pub fn esc_timeout_elapsed(&mut self) -> Key {
        if let State::Intermediate(buf) = std::mem::replace(&mut self.state, State::Idle) {
            if !buf.is_empty() {
                // A continuation byte or two arrived but the sequence
                // never reached a final; surface them as printable so
                // nothing is lost.
                self.push_back_many(buf.into_iter().map(Key::Printable).collect());
            }
        }
        Key::Esc
    }

    /// Feed one raw byte to the state machine.
    pub fn feed_byte(&mut self, byte: u8) -> Feed {
        let result = match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => self.feed_idle(byte),
            State::Intermediate(buf) => self.feed_intermediate(buf, byte),
            State::Csi(buf) => self.feed_csi(buf, byte),
            State::Ss => self.feed_ss(byte),
        };
        trace!(byte, kind = feed_kind(&result), "decoder fed byte");
        result
    }

    fn feed_idle(&mut self, byte: u8) -> Feed {
        if byte == 0x1b {
            self.state = State::Intermediate(Vec::new());
            return Feed::ArmEscTimer;
        }
        if byte == 0x7f {
            return Feed::Complete(Key::Ctrl(CtrlKey::Backspace));
        }
        if let Some(ctrl) = CtrlKey::from_byte(byte) {
            return Feed::Complete(Key::Ctrl(ctrl));
        }
        if byte >= 0x20 {
            return Feed::Complete(Key::Printable(byte));
        }
        // An unrecognized C0 control byte: filtered out silently
        // (spec §6 "filtering C0 and C1 controls it does not
        // recognize").
        Feed::Pending
    }

    fn feed_intermediate(&mut self, mut buf: Vec<u8>, byte: u8) -> Feed {
        match byte {
            b'[' => {
                self.state = State::Csi(Vec::new());
                Feed::Pending
            }
            b'N' | b'O' => {
                self.state = State::Ss;
                Feed::Pending
            }
            0x20..=0x2f => {
                buf.push(byte);
                if buf.len() > ESCAPE_BUFFER_CAP {
                    Feed::Overflow(buf)
                } else {
                    self.state = State::Intermediate(buf);
                    Feed::Pending
                }
            }
            0x30..=0x7e => {
                // A final byte for a non-CSI, non-SS escape: this
                // engine has no named key for it, so the whole
                // sequence is dropped silently.
                Feed::Pending
            }
            _ => Feed::Pending,
        }
    }

    fn feed_csi(&mut self, mut buf: Vec<u8>, byte: u8) -> Feed {
        match byte {
            0x40..=0x7e => decode_csi_final(&buf, byte),
            0x20..=0x3f => {
                buf.push(byte);
                if buf.len() > ESCAPE_BUFFER_CAP {
                    Feed::Overflow(buf)
                } else {
                    self.state = State::Csi(buf);
                    Feed::Pending
                }
            }
            _ => Feed::Pending,
        }
    }

    fn feed_ss(&mut self, byte: u8) -> Feed {
        match byte {
            b'A' => Feed::Complete(Key::Edit(EditKey::Up)),
            b'B' => Feed::Complete(Key::Edit(EditKey::Down)),
            b'C' => Feed::Complete(Key::Edit(EditKey::Right)),
            b'D' => Feed::Complete(Key::Edit(EditKey::Left)),
            b'H' => Feed::Complete(Key::Edit(EditKey::Home)),
            b'F' => Feed::Complete(Key::Edit(EditKey::End)),
            _ => Feed::Pending,
        }
    }
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder::new()
    }
}

fn decode_csi_final(params: &[u8], final_byte: u8) -> Feed {
    if params.is_empty() {
        let edit = match final_byte {
            b'A' => Some(EditKey::Up),
            b'B' => Some(EditKey::Down),
            b'C' => Some(EditKey::Right),
            b'D' => Some(EditKey::Left),
            b'F' => Some(EditKey::End),
            b'H' => Some(EditKey::Home),
            _ => None,
        };
        return match edit {
            Some(e) => Feed::Complete(Key::Edit(e)),
            None => Feed::Pending,
        };
    }

    if final_byte == b'~' {
        let digits: Vec<u8> = params.iter().copied().take_while(u8::is_ascii_digit).collect();
        if let Ok(text) = std::str::from_utf8(&digits) {
            if let Ok(n) = text.parse::<u32>() {
                let edit = match n {
                    1 => Some(EditKey::Home),
                    3 => Some(EditKey::Delete),
                    4 => Some(EditKey::End),
                    _ => None,
                };
                if let Some(e) = edit {
                    return Feed::Complete(Key::Edit(e));
                }
            }
        }
    }

    Feed::Pending
}

fn feed_kind(feed: &Feed) -> &'static str {
    match feed {
        Feed::Pending => "pending",
        Feed::ArmEscTimer => "arm-esc-timer",
        Feed::Complete(_) => "complete",
        Feed::Overflow(_) => "overflow",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut Decoder, bytes: &[u8]) -> Vec<Feed> {
        bytes.iter().map(|b| decoder.feed_byte(*b)).collect()
    }

    #[test]
    fn printable_byte_decodes_immediately() {
        let mut d = Decoder::new();
        match d.feed_byte(b'x') {
            Feed::Complete(Key::Printable(b'x')) => {}
            _ => panic!("expected printable"),
        }
    }

    #[test]
    fn known_control_byte_decodes_to_named_ctrl() {
        let mut d = Decoder::new();
        match d.feed_byte(0x12) {
            Feed::Complete(Key::Ctrl(CtrlKey::R)) => {}
            _ => panic!("expected CTRL_R"),
        }
    }

    #[test]
    fn esc_alone_arms_timer_and_awaits_continuation() {
        let mut d = Decoder::new();
        match d.feed_byte(0x1b) {
            Feed::ArmEscTimer => {}
            _ => panic!("expected ArmEscTimer"),
        }
        assert!(d.awaiting_esc_continuation());
    }

    #[test]
    fn esc_timeout_with_no_continuation_emits_esc() {
        let mut d = Decoder::new();
        d.feed_byte(0x1b);
        assert_eq!(d.esc_timeout_elapsed(), Key::Esc);
    }

    #[test]
    fn csi_cursor_up_decodes_after_three_bytes() {
        let mut d = Decoder::new();
        let results = feed_all(&mut d, b"\x1b[A");
        assert!(matches!(results[0], Feed::ArmEscTimer));
        assert!(matches!(results[1], Feed::Pending));
        assert!(matches!(results[2], Feed::Complete(Key::Edit(EditKey::Up))));
    }

    #[test]
    fn csi_delete_with_tilde_parameter() {
        let mut d = Decoder::new();
        let results = feed_all(&mut d, b"\x1b[3~");
        match results.last().unwrap() {
            Feed::Complete(Key::Edit(EditKey::Delete)) => {}
            _ => panic!("expected DELETE"),
        }
    }

    #[test]
    fn csi_home_with_one_tilde_parameter() {
        let mut d = Decoder::new();
        let results = feed_all(&mut d, b"\x1b[1~");
        match results.last().unwrap() {
            Feed::Complete(Key::Edit(EditKey::Home)) => {}
            _ => panic!("expected HOME"),
        }
    }

    #[test]
    fn unknown_csi_final_is_dropped_silently() {
        let mut d = Decoder::new();
        let results = feed_all(&mut d, b"\x1b[Z");
        assert!(matches!(results.last().unwrap(), Feed::Pending));
    }

    #[test]
    fn ss3_cursor_sequences_decode() {
        let mut d = Decoder::new();
        let results = feed_all(&mut d, b"\x1bOA");
        assert!(matches!(results.last().unwrap(), Feed::Complete(Key::Edit(EditKey::Up))));
    }

    #[test]
    fn overflowing_csi_buffer_pushes_back_raw_bytes() {
        let mut d = Decoder::new();
        d.feed_byte(0x1b);
        d.feed_byte(b'[');
        let mut overflowed = None;
        for _ in 0..ESCAPE_BUFFER_CAP + 1 {
            if let Feed::Overflow(bytes) = d.feed_byte(b'0') {
                overflowed = Some(bytes);
                break;
            }
        }
        assert!(overflowed.is_some());
    }

    #[test]
    fn esc_then_bracket_a_within_window_is_one_key() {
        let mut d = Decoder::new();
        feed_all(&mut d, b"\x1b");
        assert!(d.awaiting_esc_continuation());
        let results = feed_all(&mut d, b"[A");
        assert!(matches!(results.last().unwrap(), Feed::Complete(Key::Edit(EditKey::Up))));
    }
}
