//! An embeddable interactive line editor for character-cell terminals.
//!
//! [`Editor`] owns one editing session: raw-mode terminal I/O, an
//! escape-sequence decoder, the edit buffer, history, tab completion,
//! and reverse-incremental search. Call [`Editor::read_line`] to block
//! for one line, or [`Editor::read_line_step`] to drive the same
//! session from an external event loop without blocking.

pub mod buffer;
pub mod completion;
pub mod decoder;
pub mod display;
pub mod editor;
pub mod encoding;
pub mod error;
pub mod guard;
pub mod history;
pub mod key;
pub mod search;
pub mod signals;
pub mod terminal;

pub use editor::{Editor, Outcome};
pub use encoding::Encoding;
pub use error::{Error, Result};
pub use history::History;
pub use key::Key;
