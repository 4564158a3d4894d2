//! reStructuredText formatting actions applied to the edit buffer.

use crate::buffer::EditBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatAction {
    Heading(u8),
    Bold,
    Italic,
    InlineCode,
    BulletList,
    NumberedList,
    Link,
    Image,
    CodeBlock,
    Blockquote,
    Table,
}

const PLACEHOLDER: &str = "text";

const TABLE: &str = "\
+------------+------------+------------+
| Header 1   | Header 2   | Header 3   |
+============+============+============+
| Row 1, C1  | Row 1, C2  | Row 1, C3  |
+------------+------------+------------+
| Row 2, C1  | Row 2, C2  | Row 2, C3  |
+------------+------------+------------+

";

impl FormatAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Heading(1) => "heading 1",
            Self::Heading(2) => "heading 2",
            Self::Heading(_) => "heading 3",
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::InlineCode => "inline code",
            Self::BulletList => "bullet list",
            Self::NumberedList => "numbered list",
            Self::Link => "link",
            Self::Image => "image",
            Self::CodeBlock => "code block",
            Self::Blockquote => "blockquote",
            Self::Table => "table",
        }
    }

    /// Applies the action at the buffer's selection.
    pub fn apply(self, buffer: &mut EditBuffer) {
        let selected = buffer.selected_text().to_string();
        match self {
            Self::Heading(level) => {
                let underline = match level {
                    1 => '=',
                    2 => '-',
                    _ => '~',
                };
                let title = if selected.is_empty() {
                    format!("Heading {}", level.clamp(1, 3))
                } else {
                    selected
                };
                let rule: String = std::iter::repeat(underline)
                    .take(title.chars().count())
                    .collect();
                buffer.insert(&format!("{title}\n{rule}\n\n"));
            }
            Self::Bold => wrap(buffer, "**", "**"),
            Self::Italic => wrap(buffer, "*", "*"),
            Self::InlineCode => wrap(buffer, "``", "``"),
            Self::BulletList => {
                if selected.is_empty() {
                    buffer.insert("- Item 1\n- Item 2\n- Item 3\n");
                } else {
                    let list = map_lines(&selected, |_, line| format!("- {line}"));
                    buffer.insert(&format!("{list}\n"));
                }
            }
            Self::NumberedList => {
                if selected.is_empty() {
                    buffer.insert("1. Item 1\n2. Item 2\n3. Item 3\n");
                } else {
                    let list = map_lines(&selected, |idx, line| format!("{}. {line}", idx + 1));
                    buffer.insert(&format!("{list}\n"));
                }
            }
            Self::Link => {
                if selected.is_empty() {
                    buffer.insert_selected("`Link text <https://example.com>`_");
                } else {
                    buffer.insert(&format!("`{selected} <https://example.com>`_"));
                }
            }
            Self::Image => {
                buffer.insert(".. image:: /path/to/image.png\n   :alt: Image description\n   :width: 400\n\n");
            }
            Self::CodeBlock => {
                let body = if selected.is_empty() {
                    "# Your code here\nprint(\"Hello, World!\")".to_string()
                } else {
                    selected
                };
                let body = body.replace('\n', "\n   ");
                buffer.insert(&format!(".. code-block:: python\n\n   {body}\n\n"));
            }
            Self::Blockquote => {
                if selected.is_empty() {
                    buffer.insert("   This is a blockquote.\n   It can span multiple lines.\n\n");
                } else {
                    let quote = selected
                        .split('\n')
                        .map(|line| format!("   {line}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    buffer.insert(&format!("{quote}\n\n"));
                }
            }
            Self::Table => buffer.insert(TABLE),
        }
    }
}

fn wrap(buffer: &mut EditBuffer, prefix: &str, suffix: &str) {
    let selection = buffer.selection();
    let inner = if selection.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        buffer.selected_text().to_string()
    };
    buffer.insert(&format!("{prefix}{inner}{suffix}"));
    let start = selection.start + prefix.len();
    buffer.select(start, start + inner.len());
}

/// Rewrites each non-blank line; blank lines become empty.
fn map_lines(text: &str, f: impl Fn(usize, &str) -> String) -> String {
    text.split('\n')
        .enumerate()
        .map(|(idx, line)| {
            if line.trim().is_empty() {
                String::new()
            } else {
                f(idx, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_selection(text: &str, start: usize, end: usize) -> EditBuffer {
        let mut buf = EditBuffer::new(text);
        buf.select(start, end);
        buf
    }

    #[test]
    fn bold_wraps_selection_and_keeps_it_selected() {
        let mut buf = buffer_with_selection("say hi now", 4, 6);
        FormatAction::Bold.apply(&mut buf);
        assert_eq!(buf.text(), "say **hi** now");
        assert_eq!(buf.selected_text(), "hi");
    }

    #[test]
    fn wrap_without_selection_inserts_placeholder() {
        let mut buf = buffer_with_selection("ab", 1, 1);
        FormatAction::InlineCode.apply(&mut buf);
        assert_eq!(buf.text(), "a``text``b");
        assert_eq!(buf.selected_text(), "text");
    }

    #[test]
    fn heading_underline_matches_title_width() {
        let mut buf = buffer_with_selection("Intro", 0, 5);
        FormatAction::Heading(2).apply(&mut buf);
        assert_eq!(buf.text(), "Intro\n-----\n\n");

        let mut empty = EditBuffer::new("");
        FormatAction::Heading(3).apply(&mut empty);
        assert_eq!(empty.text(), "Heading 3\n~~~~~~~~~\n\n");
    }

    #[test]
    fn numbered_list_numbers_by_line_position() {
        let mut buf = buffer_with_selection("one\n\nthree", 0, 10);
        FormatAction::NumberedList.apply(&mut buf);
        assert_eq!(buf.text(), "1. one\n\n3. three\n");
    }

    #[test]
    fn code_block_indents_selected_lines() {
        let mut buf = buffer_with_selection("a = 1\nb = 2", 0, 11);
        FormatAction::CodeBlock.apply(&mut buf);
        assert_eq!(buf.text(), ".. code-block:: python\n\n   a = 1\n   b = 2\n\n");
    }

    #[test]
    fn link_placeholder_is_selected() {
        let mut buf = EditBuffer::new("");
        FormatAction::Link.apply(&mut buf);
        assert_eq!(buf.selected_text(), "`Link text <https://example.com>`_");
    }
}
