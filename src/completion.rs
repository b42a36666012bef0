//! The completion set and its builder (spec §4.6, §6, §3 "Completion
//! set").
//!
//! No teacher precedent exists for this (the teacher dispatches
//! through a static Emacs keymap, never a dynamic candidate list); the
//! column-major listing layout mirrors the kind of multi-column
//! terminal listing helper found in `r3bl-open-core`'s `tuify` crate.

use crate::guard::CustomOutputGuard;
use crate::terminal::{ErasePart, Screen};

/// One completion candidate.
#[derive(Debug, Clone)]
pub struct Completion {
    /// What is shown in the candidate listing.
    pub suggestion: String,
    /// The full text to splice into the buffer if this candidate is
    /// chosen.
    pub replacement: String,
    /// Where the cursor should land within `replacement`.
    pub cursor: usize,
}

/// The builder passed to the completion callback (spec §6 "the
/// builder exposes `add(suggestion, replacement_text,
/// new_cursor_offset)`").
pub struct CompletionBuilder {
    completions: Vec<Completion>,
    /// The engine's output descriptor, used only by
    /// [`CompletionBuilder::custom_output`]. `-1` (as set by
    /// [`CompletionBuilder::new`]) never resolves to a live terminal,
    /// so calling `custom_output` on a builder built that way is
    /// harmless and simply returns `None`.
    output_fd: i32,
}

impl Default for CompletionBuilder {
    fn default() -> CompletionBuilder {
        CompletionBuilder::new()
    }
}

impl CompletionBuilder {
    pub fn new() -> CompletionBuilder {
        CompletionBuilder {
            completions: Vec::new(),
            output_fd: -1,
        }
    }

    pub(crate) fn with_output_fd(output_fd: i32) -> CompletionBuilder {
        CompletionBuilder {
            completions: Vec::new(),
            output_fd,
        }
    }

    pub fn add(&mut self, suggestion: impl Into<String>, replacement: impl Into<String>, cursor: usize) {
        self.completions.push(Completion {
            suggestion: suggestion.into(),
            replacement: replacement.into(),
            cursor,
        });
    }

    /// The "custom output" primitive a completion callback must call
    /// before doing its own terminal I/O (spec §6): clears the current
    /// display line, then leaves raw mode. Raw mode is restored
    /// automatically when the returned guard is dropped. Returns `None`
    /// if the engine isn't currently holding any descriptor raw (e.g.
    /// the blacklist fallback path, or a builder constructed outside a
    /// live session).
    pub fn custom_output(&mut self) -> Option<CustomOutputGuard> {
        let mut screen = Screen::new(self.output_fd);
        screen.carriage_return();
        screen.erase_line(ErasePart::ToEnd);
        let _ = screen.flush();
        CustomOutputGuard::begin()
    }

    pub fn into_set(self) -> CompletionSet {
        CompletionSet::new(self.completions)
    }
}

/// The live candidate list held while `mode == COMPLETION` (spec §3).
pub struct CompletionSet {
    candidates: Vec<Completion>,
    /// Index of the candidate currently shown; advances on each
    /// subsequent TAB once there are 2+ candidates.
    cursor: usize,
    max_suggestion_width: usize,
}

impl CompletionSet {
    fn new(mut candidates: Vec<Completion>) -> CompletionSet {
        candidates.sort_by(|a, b| a.replacement.cmp(&b.replacement));
        let max_suggestion_width = candidates
            .iter()
            .map(|c| c.suggestion.len())
            .max()
            .unwrap_or(0);
        CompletionSet {
            candidates,
            cursor: 0,
            max_suggestion_width,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn max_suggestion_width(&self) -> usize {
        self.max_suggestion_width
    }

    pub fn candidates(&self) -> &[Completion] {
        &self.candidates
    }

    /// The candidate currently selected for insertion.
    pub fn current(&self) -> &Completion {
        &self.candidates[self.cursor]
    }

    /// Advance to the next candidate, wrapping around (subsequent-TAB
    /// rotation, spec §4.6).
    pub fn advance(&mut self) -> &Completion {
        self.cursor = (self.cursor + 1) % self.candidates.len();
        self.current()
    }

    /// The longest common prefix shared by every replacement text
    /// (spec §4.6 "compute and insert the longest common prefix").
    pub fn longest_common_prefix(&self) -> &str {
        if self.candidates.is_empty() {
            return "";
        }
        let mut prefix = self.candidates[0].replacement.as_str();
        for c in &self.candidates[1..] {
            let common = common_prefix_len(prefix, &c.replacement);
            prefix = &prefix[..common];
        }
        prefix
    }

    /// Number of listing columns for a terminal `columns` wide, given
    /// each cell takes `max_suggestion_width + 2` characters
    /// (spec §4.6). Always at least 1.
    pub fn listing_columns(&self, columns: usize) -> usize {
        let cell_width = self.max_suggestion_width + 2;
        (columns / cell_width.max(1)).max(1)
    }

    /// Number of listing rows needed for `columns` listing columns.
    pub fn listing_rows(&self, columns: usize) -> usize {
        let cols = self.listing_columns(columns);
        (self.candidates.len() + cols - 1) / cols
    }

    /// Lay the candidates out column-major: row-major iteration order
    /// over a grid filled down each column first (spec §4.6 "print
    /// them in column-major order").
    pub fn column_major_order(&self, columns: usize) -> Vec<Option<&Completion>> {
        let cols = self.listing_columns(columns);
        let rows = self.listing_rows(columns);
        let mut grid = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let index = col * rows + row;
                grid.push(self.candidates.get(index));
            }
        }
        grid
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_candidate_is_trivially_sorted() {
        let mut builder = CompletionBuilder::new();
        builder.add("hello", "hello", 5);
        let set = builder.into_set();
        assert_eq!(set.len(), 1);
        assert_eq!(set.current().replacement, "hello");
    }

    #[test]
    fn custom_output_with_nothing_raw_returns_none() {
        // A builder built via `new()` (output_fd -1) outside a live
        // session, and no raw-mode guard held anywhere in this test
        // process: the primitive must be a harmless no-op.
        let mut builder = CompletionBuilder::new();
        assert!(builder.custom_output().is_none());
    }

    #[test]
    fn candidates_sort_lexicographically() {
        let mut builder = CompletionBuilder::new();
        builder.add("zeta", "zeta", 4);
        builder.add("alpha", "alpha", 5);
        let set = builder.into_set();
        assert_eq!(set.candidates()[0].replacement, "alpha");
        assert_eq!(set.candidates()[1].replacement, "zeta");
    }

    #[test]
    fn longest_common_prefix_of_replacements() {
        let mut builder = CompletionBuilder::new();
        builder.add("help", "help", 4);
        builder.add("hello", "hello", 5);
        let set = builder.into_set();
        assert_eq!(set.longest_common_prefix(), "hel");
    }

    #[test]
    fn advance_rotates_and_wraps() {
        let mut builder = CompletionBuilder::new();
        builder.add("a", "a", 1);
        builder.add("b", "b", 1);
        let mut set = builder.into_set();
        assert_eq!(set.current().replacement, "a");
        assert_eq!(set.advance().replacement, "b");
        assert_eq!(set.advance().replacement, "a");
    }

    #[test]
    fn listing_columns_is_at_least_one() {
        let mut builder = CompletionBuilder::new();
        builder.add("a-very-long-suggestion-indeed", "x", 1);
        let set = builder.into_set();
        assert_eq!(set.listing_columns(10), 1);
    }

    #[test]
    fn column_major_order_fills_down_columns_first() {
        let mut builder = CompletionBuilder::new();
        for s in ["a", "b", "c", "d", "e"] {
            builder.add(s, s, 1);
        }
        let set = builder.into_set();
        // max_suggestion_width = 1, cell width = 3, so with columns=9
        // we get 3 listing columns and 2 rows ([a,b,c], [d,e]).
        let cols = set.listing_columns(9);
        assert_eq!(cols, 3);
        let grid = set.column_major_order(9);
        let names: Vec<_> = grid
            .iter()
            .map(|c| c.map(|c| c.suggestion.as_str()).unwrap_or("-"))
            .collect();
        assert_eq!(names, vec!["a", "c", "e", "b", "d", "-"]);
    }
}
