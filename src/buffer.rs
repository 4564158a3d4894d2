//! The editable source buffer and its selection.
//!
//! Offsets are byte offsets into the UTF-8 text and always sit on character
//! boundaries. The selection is ordered (`start <= end`); the caret is the end
//! the user last moved.

use crate::lines::{self, floor_char_boundary, LineRange};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn caret(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<LineRange> for Selection {
    fn from(range: LineRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EditBuffer {
    text: String,
    selection: Selection,
    /// Which end of the selection the caret is on.
    caret_at_start: bool,
    /// Column remembered across vertical moves.
    goal_column: Option<usize>,
}

impl EditBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn selected_text(&self) -> &str {
        &self.text[self.selection.start..self.selection.end]
    }

    pub fn caret(&self) -> usize {
        if self.caret_at_start {
            self.selection.start
        } else {
            self.selection.end
        }
    }

    /// 0-based (line, column-in-chars) of the caret.
    pub fn caret_position(&self) -> (usize, usize) {
        let caret = self.caret();
        let line = lines::line_index_of(&self.text, caret);
        let start = lines::line_start_of(&self.text, caret);
        (line, self.text[start..caret].chars().count())
    }

    pub fn line_count(&self) -> usize {
        lines::line_count(&self.text)
    }

    /// Replaces the whole text and puts the caret at the start.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.selection = Selection::default();
        self.caret_at_start = false;
        self.goal_column = None;
    }

    /// Replaces the text, keeping the selection where it still fits.
    pub fn reload(&mut self, text: impl Into<String>) {
        let selection = self.selection;
        self.text = text.into();
        self.select(selection.start, selection.end);
    }

    /// Selects `start..end`, clamped to the text and snapped to char boundaries.
    pub fn select(&mut self, start: usize, end: usize) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.selection = Selection {
            start: floor_char_boundary(&self.text, start),
            end: floor_char_boundary(&self.text, end),
        };
        self.caret_at_start = false;
        self.goal_column = None;
    }

    pub fn select_all(&mut self) {
        self.select(0, self.text.len());
    }

    /// Replaces the selection with `text` and leaves the caret after it.
    pub fn insert(&mut self, text: &str) {
        let Selection { start, end } = self.selection;
        self.text.replace_range(start..end, text);
        self.set_caret(start + text.len());
    }

    /// Replaces the selection with `text` and selects the inserted text.
    pub fn insert_selected(&mut self, text: &str) {
        let start = self.selection.start;
        self.insert(text);
        self.select(start, start + text.len());
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.insert(ch.encode_utf8(&mut buf));
    }

    /// Deletes the selection, or the character before the caret.
    pub fn backspace(&mut self) {
        if !self.selection.is_empty() {
            self.insert("");
            return;
        }
        let caret = self.selection.end;
        if let Some(prev) = self.prev_boundary(caret) {
            self.text.replace_range(prev..caret, "");
            self.set_caret(prev);
        }
    }

    /// Deletes the selection, or the character after the caret.
    pub fn delete_forward(&mut self) {
        if !self.selection.is_empty() {
            self.insert("");
            return;
        }
        let caret = self.selection.end;
        if let Some(next) = self.next_boundary(caret) {
            self.text.replace_range(caret..next, "");
            self.set_caret(caret);
        }
    }

    pub fn move_left(&mut self, extend: bool) {
        if !extend && !self.selection.is_empty() {
            self.set_caret(self.selection.start);
            return;
        }
        let target = self.prev_boundary(self.caret()).unwrap_or(0);
        self.move_caret(target, extend);
    }

    pub fn move_right(&mut self, extend: bool) {
        if !extend && !self.selection.is_empty() {
            self.set_caret(self.selection.end);
            return;
        }
        let target = self.next_boundary(self.caret()).unwrap_or(self.text.len());
        self.move_caret(target, extend);
    }

    pub fn move_home(&mut self, extend: bool) {
        let target = lines::line_start_of(&self.text, self.caret());
        self.move_caret(target, extend);
    }

    pub fn move_end(&mut self, extend: bool) {
        let target = lines::line_end_of(&self.text, self.caret());
        self.move_caret(target, extend);
    }

    /// Moves the caret `delta` lines up (negative) or down, keeping the column.
    pub fn move_vertical(&mut self, delta: isize, extend: bool) {
        let (line, column) = self.caret_position();
        let goal = self.goal_column.unwrap_or(column);
        let last = self.line_count().saturating_sub(1);
        let target_line = line.saturating_add_signed(delta).min(last);

        let range = lines::line_range(&self.text, target_line + 1);
        let target = self.text[range.start..range.end]
            .char_indices()
            .nth(goal)
            .map_or(range.end, |(idx, _)| range.start + idx);

        self.move_caret(target, extend);
        self.goal_column = Some(goal);
    }

    fn set_caret(&mut self, offset: usize) {
        self.select(offset, offset);
    }

    fn move_caret(&mut self, target: usize, extend: bool) {
        if !extend {
            self.set_caret(target);
            return;
        }
        let anchor = if self.caret_at_start {
            self.selection.end
        } else {
            self.selection.start
        };
        self.select(anchor, target);
        self.caret_at_start = target < anchor;
    }

    fn prev_boundary(&self, offset: usize) -> Option<usize> {
        self.text[..offset].char_indices().next_back().map(|(idx, _)| idx)
    }

    fn next_boundary(&self, offset: usize) -> Option<usize> {
        self.text[offset..]
            .chars()
            .next()
            .map(|ch| offset + ch.len_utf8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_selection() {
        let mut buf = EditBuffer::new("hello world");
        buf.select(6, 11);
        buf.insert("there");
        assert_eq!(buf.text(), "hello there");
        assert_eq!(buf.selection(), Selection::caret(11));
    }

    #[test]
    fn insert_selected_keeps_inserted_text_selected() {
        let mut buf = EditBuffer::new("ab");
        buf.select(1, 1);
        buf.insert_selected("XY");
        assert_eq!(buf.text(), "aXYb");
        assert_eq!(buf.selected_text(), "XY");
    }

    #[test]
    fn backspace_and_delete_respect_utf8() {
        let mut buf = EditBuffer::new("aéb");
        buf.select(3, 3);
        buf.backspace();
        assert_eq!(buf.text(), "ab");
        assert_eq!(buf.caret(), 1);
        buf.delete_forward();
        assert_eq!(buf.text(), "a");
        buf.backspace();
        buf.backspace();
        assert_eq!(buf.text(), "");
    }

    #[test]
    fn select_clamps_and_orders() {
        let mut buf = EditBuffer::new("abc");
        buf.select(10, 1);
        assert_eq!(buf.selection(), Selection { start: 1, end: 3 });
    }

    #[test]
    fn vertical_moves_keep_goal_column() {
        let mut buf = EditBuffer::new("abcd\nx\nabcd");
        buf.select(3, 3);
        buf.move_vertical(1, false);
        assert_eq!(buf.caret_position(), (1, 1));
        buf.move_vertical(1, false);
        assert_eq!(buf.caret_position(), (2, 3));
        buf.move_vertical(-5, false);
        assert_eq!(buf.caret_position(), (0, 3));
    }

    #[test]
    fn shift_moves_extend_from_anchor() {
        let mut buf = EditBuffer::new("abcdef");
        buf.select(3, 3);
        buf.move_left(true);
        buf.move_left(true);
        assert_eq!(buf.selection(), Selection { start: 1, end: 3 });
        assert_eq!(buf.caret(), 1);
        buf.move_end(true);
        assert_eq!(buf.selection(), Selection { start: 3, end: 6 });
        buf.move_left(false);
        assert_eq!(buf.selection(), Selection::caret(3));
    }

    #[test]
    fn reload_keeps_selection_in_bounds() {
        let mut buf = EditBuffer::new("a long line");
        buf.select(2, 6);
        buf.reload("abc");
        assert_eq!(buf.selection(), Selection { start: 2, end: 3 });
    }
}
