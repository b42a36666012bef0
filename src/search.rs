//! Reverse-incremental-search state (spec §4.6 REVERSE_SEARCH, §3
//! "search_state").
//!
//! No teacher precedent; grounded directly on spec §4.6's description
//! of the rightmost-substring search and the prompt-replacement
//! contract.

use crate::history::History;

/// State owned only while `mode == REVERSE_SEARCH` (spec §9 "mode as
/// tagged variant").
pub struct SearchState {
    pub query: String,
    /// History index currently being searched from.
    pub current_index: usize,
    pub found: bool,
}

impl SearchState {
    /// Begin a search rooted at `start_index` (the history index the
    /// session was at when CTRL_R was pressed).
    pub fn new(start_index: usize) -> SearchState {
        SearchState {
            query: String::new(),
            current_index: start_index,
            found: false,
        }
    }

    /// Format the temporary prompt shown while searching (spec
    /// §4.6): `(reverse-i-search\`<query>'): `, or the empty-query
    /// variant.
    pub fn prompt(&self) -> String {
        format!("(reverse-i-search`{}'): ", self.query)
    }

    /// Search from `self.current_index` toward older entries for the
    /// rightmost occurrence of `self.query` as a substring, updating
    /// `current_index`/`found` and returning the matched entry's
    /// index and the byte offset just past the match, if any.
    pub fn search(&mut self, history: &History) -> Option<(usize, usize)> {
        if self.query.is_empty() {
            self.found = false;
            return None;
        }
        let max_index = history.max_index();
        let mut index = self.current_index;
        loop {
            if let Some(entry) = history.get(index) {
                if let Some(pos) = entry.rfind(self.query.as_str()) {
                    self.current_index = index;
                    self.found = true;
                    return Some((index, pos + self.query.len()));
                }
            }
            if index >= max_index {
                break;
            }
            index += 1;
        }
        self.found = false;
        None
    }

    /// Advance the search one entry further back (subsequent CTRL_R
    /// with a non-empty query and an existing match, spec §4.6).
    pub fn advance(&mut self, history: &History) -> Option<(usize, usize)> {
        if !self.found {
            return None;
        }
        if self.current_index >= history.max_index() {
            self.found = false;
            return None;
        }
        self.current_index += 1;
        self.search(history)
    }

    pub fn push_char(&mut self, ch: char) {
        self.query.push(ch);
    }

    /// Shorten the query by one character (BACKSPACE while searching).
    /// Returns `true` if the query is now empty.
    pub fn pop_char(&mut self) -> bool {
        self.query.pop();
        self.query.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with(entries: &[&str]) -> History {
        let mut h = History::new();
        for e in entries {
            h.add((*e).to_string());
        }
        h
    }

    #[test]
    fn finds_rightmost_occurrence_from_current_index() {
        let history = history_with(&["echo hello", "ls -la"]);
        let mut search = SearchState::new(0);
        search.push_char('e');
        search.push_char('c');
        search.push_char('h');
        let result = search.search(&history);
        // history.get(0) is the newest entry, "ls -la", which has no
        // match, so it must walk to the older "echo hello".
        assert!(result.is_some());
        let (_, cursor) = result.unwrap();
        assert_eq!(cursor, "ech".len());
        assert!(search.found);
    }

    #[test]
    fn no_match_sets_found_false() {
        let history = history_with(&["echo hello", "ls -la"]);
        let mut search = SearchState::new(0);
        search.push_char('z');
        search.push_char('z');
        assert!(search.search(&history).is_none());
        assert!(!search.found);
    }

    #[test]
    fn advance_moves_to_an_older_match() {
        let history = history_with(&["echo one", "echo two"]);
        let mut search = SearchState::new(0);
        search.push_char('e');
        search.push_char('c');
        search.push_char('h');
        search.push_char('o');
        let first = search.search(&history).unwrap();
        let second = search.advance(&history).unwrap();
        assert_ne!(first.0, second.0);
    }

    #[test]
    fn empty_query_is_never_found() {
        let history = history_with(&["echo hello"]);
        let mut search = SearchState::new(0);
        assert!(search.search(&history).is_none());
        assert!(!search.found);
    }
}
