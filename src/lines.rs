//! Line ↔ byte-offset mapping over the source buffer.
//!
//! Lines are separated by `'\n'` only. A trailing newline opens one more (empty)
//! line, so `"a\n"` has two lines and empty text has one.

/// Byte range of one source line, excluding its terminating newline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Number of lines in `text`.
pub fn line_count(text: &str) -> usize {
    newline_count(text) + 1
}

fn newline_count(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// Returns the byte range of the 1-based `line_number`.
///
/// A line past the end of the text maps to the empty range at `text.len()`.
/// Line 0 is treated as line 1.
pub fn line_range(text: &str, line_number: usize) -> LineRange {
    let target = line_number.saturating_sub(1);
    let mut start = 0usize;

    for (idx, line) in text.split('\n').enumerate() {
        if idx == target {
            return LineRange {
                start,
                end: start + line.len(),
            };
        }
        start += line.len() + 1;
    }

    let end = text.len();
    LineRange { start: end, end }
}

/// 0-based line index containing byte `offset` (clamped to the text).
pub fn line_index_of(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    newline_count(&text[..floor_char_boundary(text, offset)])
}

/// Byte offset of the start of the line containing `offset`.
pub fn line_start_of(text: &str, offset: usize) -> usize {
    let offset = floor_char_boundary(text, offset.min(text.len()));
    text[..offset].rfind('\n').map_or(0, |idx| idx + 1)
}

/// Byte offset of the end of the line containing `offset` (before its newline).
pub fn line_end_of(text: &str, offset: usize) -> usize {
    let offset = floor_char_boundary(text, offset.min(text.len()));
    text[offset..]
        .find('\n')
        .map_or(text.len(), |idx| offset + idx)
}

pub(crate) fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    if offset >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_of_short_text() {
        assert_eq!(line_range("a\nbb\nccc", 1), LineRange { start: 0, end: 1 });
    }

    #[test]
    fn middle_and_last_lines() {
        let text = "a\nbb\nccc";
        assert_eq!(line_range(text, 2), LineRange { start: 2, end: 4 });
        assert_eq!(line_range(text, 3), LineRange { start: 5, end: 8 });
    }

    #[test]
    fn repeated_calls_agree() {
        let text = "one\ntwo\nthree\n";
        assert_eq!(line_range(text, 2), line_range(text, 2));
    }

    #[test]
    fn past_the_end_is_empty_at_text_end() {
        let text = "a\nbb\nccc";
        let range = line_range(text, 42);
        assert_eq!(range, LineRange { start: 8, end: 8 });
        assert!(range.is_empty());
    }

    #[test]
    fn trailing_newline_opens_an_empty_line() {
        let text = "a\n";
        assert_eq!(line_count(text), 2);
        assert_eq!(line_range(text, 2), LineRange { start: 2, end: 2 });
        assert_eq!(line_count(""), 1);
    }

    #[test]
    fn carriage_returns_stay_in_the_line() {
        assert_eq!(line_range("ab\r\ncd", 2), LineRange { start: 4, end: 6 });
    }

    #[test]
    fn offset_helpers_follow_lines() {
        let text = "ab\ncde\nf";
        assert_eq!(line_index_of(text, 0), 0);
        assert_eq!(line_index_of(text, 3), 1);
        assert_eq!(line_index_of(text, 100), 2);
        assert_eq!(line_start_of(text, 5), 3);
        assert_eq!(line_end_of(text, 4), 6);
        assert_eq!(line_end_of(text, 7), 8);
    }

    #[test]
    fn multibyte_lines_use_byte_lengths() {
        let text = "é\nß";
        assert_eq!(line_range(text, 2), LineRange { start: 3, end: 5 });
        assert_eq!(line_index_of(text, 1), 0);
    }
}
