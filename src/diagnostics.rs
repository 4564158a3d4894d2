//! Diagnostic extraction from rendered HTML.
//!
//! The converter reports problems inline as `system-message` blocks. Each block
//! starts with a header paragraph such as `ERROR/3 (<stdin>, line 42)` and is
//! followed by message paragraphs. Blocks whose header does not parse are not
//! line diagnostics and are skipped.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::html::{HtmlEvent, Tokenizer};

/// Class marking a diagnostic block in the rendered output.
pub const DIAGNOSTIC_BLOCK_CLASS: &str = "system-message";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    fn from_tag(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("error") {
            Some(Self::Error)
        } else if tag.eq_ignore_ascii_case("warning") {
            Some(Self::Warning)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem reported by the converter, tied to a 1-based source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub level: u32,
    pub line: usize,
    pub message: String,
}

/// The parsed `SEVERITY/LEVEL (SOURCE, line N)` header of a diagnostic block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub severity: Severity,
    pub level: u32,
    pub line: usize,
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(WARNING|ERROR)\s*/\s*(\d+)\s*\([^,()]*,\s*line\s*(\d+)\)")
            .unwrap_or_else(|err| panic!("diagnostic header pattern is invalid: {err}"))
    })
}

/// Parses a diagnostic header out of `text`.
///
/// Returns `None` for anything that is not a warning or error with a numeric
/// level and a line number of at least 1.
pub fn try_parse_header(text: &str) -> Option<Header> {
    let caps = header_pattern().captures(text)?;
    let severity = Severity::from_tag(caps.get(1)?.as_str())?;
    let level = caps.get(2)?.as_str().parse().ok()?;
    let line = caps.get(3)?.as_str().parse().ok().filter(|line| *line >= 1)?;
    Some(Header {
        severity,
        level,
        line,
    })
}

/// Paragraph texts of one diagnostic block, in document order.
#[derive(Debug, Default)]
struct RawBlock {
    paragraphs: Vec<String>,
}

impl RawBlock {
    fn into_diagnostic(self) -> Option<Diagnostic> {
        let (first, rest) = self.paragraphs.split_first()?;
        let header = try_parse_header(first)?;

        let message = rest
            .iter()
            .map(|para| para.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let message = if message.trim().is_empty() {
            first.clone()
        } else {
            message
        };

        Some(Diagnostic {
            severity: header.severity,
            level: header.level,
            line: header.line,
            message,
        })
    }
}

/// Collects the paragraphs of every diagnostic block in `html`.
fn collect_blocks(html: &str) -> Vec<RawBlock> {
    let mut blocks = Vec::new();

    let mut current: Option<RawBlock> = None;
    // Element depth inside the current block; the block element itself is 1.
    let mut depth = 0usize;
    let mut paragraph: Option<(String, usize)> = None;

    for event in Tokenizer::new(html) {
        match event {
            HtmlEvent::Start(tag) => {
                if current.is_none() {
                    if tag.has_class(DIAGNOSTIC_BLOCK_CLASS) && !tag.is_void() {
                        current = Some(RawBlock::default());
                        depth = 1;
                    }
                    continue;
                }
                if tag.is_void() {
                    continue;
                }
                if tag.name == "p" {
                    // An unclosed paragraph ends where the next one begins.
                    if let (Some(block), Some((text, para_depth))) =
                        (current.as_mut(), paragraph.take())
                    {
                        block.paragraphs.push(text);
                        depth = para_depth - 1;
                    }
                    depth += 1;
                    paragraph = Some((String::new(), depth));
                } else {
                    depth += 1;
                }
            }
            HtmlEvent::Text(text) => {
                if let Some((buf, _)) = paragraph.as_mut() {
                    buf.push_str(&text);
                }
            }
            HtmlEvent::End(name) => {
                let Some(block) = current.as_mut() else {
                    continue;
                };
                if name == "p" && paragraph.as_ref().is_some_and(|(_, d)| *d == depth) {
                    if let Some((text, _)) = paragraph.take() {
                        block.paragraphs.push(text);
                    }
                }
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some((text, _)) = paragraph.take() {
                        block.paragraphs.push(text);
                    }
                    blocks.extend(current.take());
                }
            }
        }
    }

    if let Some(mut block) = current.take() {
        if let Some((text, _)) = paragraph.take() {
            block.paragraphs.push(text);
        }
        blocks.push(block);
    }

    blocks
}

/// Extracts every line diagnostic from rendered output, in document order.
pub fn extract(html: &str) -> Vec<Diagnostic> {
    collect_blocks(html)
        .into_iter()
        .filter_map(RawBlock::into_diagnostic)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(header: &str, messages: &[&str]) -> String {
        let mut out = format!(
            "<div class=\"system-message\">\n<p class=\"system-message-title\">System Message: {header}</p>\n"
        );
        for message in messages {
            out.push_str(&format!("<p>{message}</p>\n"));
        }
        out.push_str("</div>\n");
        out
    }

    #[test]
    fn header_parses_severity_level_and_line() {
        assert_eq!(
            try_parse_header("ERROR/3 (<string>, line 42)"),
            Some(Header {
                severity: Severity::Error,
                level: 3,
                line: 42,
            })
        );
        assert_eq!(
            try_parse_header("System Message: warning / 2 (<stdin>,line 7); backlink"),
            Some(Header {
                severity: Severity::Warning,
                level: 2,
                line: 7,
            })
        );
    }

    #[test]
    fn header_rejects_other_shapes() {
        assert_eq!(try_parse_header("INFO/1 (<stdin>, line 3)"), None);
        assert_eq!(try_parse_header("ERROR/3 (<stdin>, line x)"), None);
        assert_eq!(try_parse_header("ERROR/3 (<stdin>)"), None);
        assert_eq!(try_parse_header("ERROR/3 (<stdin>, line 0)"), None);
        assert_eq!(try_parse_header("ERROR/3 (<stdin>, line 99999999999999999999)"), None);
    }

    #[test]
    fn no_blocks_no_diagnostics() {
        assert!(extract("<h1>Title</h1><p>All fine.</p>").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn single_error_with_message() {
        let html = block("ERROR/3 (&lt;string&gt;, line 42)", &["bad token"]);
        assert_eq!(
            extract(&html),
            vec![Diagnostic {
                severity: Severity::Error,
                level: 3,
                line: 42,
                message: "bad token".to_string(),
            }]
        );
    }

    #[test]
    fn message_paragraphs_join_with_spaces() {
        let html = block("WARNING/2 (&lt;stdin&gt;, line 5)", &["  first part ", "second <em>part</em>"]);
        let diags = extract(&html);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "first part second part");
    }

    #[test]
    fn header_only_block_falls_back_to_header_text() {
        let html = block("WARNING/2 (&lt;stdin&gt;, line 5)", &[]);
        let diags = extract(&html);
        assert_eq!(diags[0].message, "System Message: WARNING/2 (<stdin>, line 5)");
    }

    #[test]
    fn nested_markup_in_header_is_flattened() {
        let html = "<div class=\"system-message\"><p class=\"system-message-title\">System Message: ERROR/3 (<span class=\"docutils literal\">&lt;stdin&gt;</span>, line 9); <em><a href=\"#r1\">backlink</a></em></p><p>Unknown directive type \"foo\".</p><pre class=\"literal-block\">.. foo::</pre></div>";
        let diags = extract(html);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 9);
        assert_eq!(diags[0].message, "Unknown directive type \"foo\".");
    }

    #[test]
    fn unmatched_and_empty_blocks_are_skipped() {
        let html = format!(
            "{}<div class=\"system-message\"></div>{}{}",
            block("INFO/1 (&lt;stdin&gt;, line 2)", &["Duplicate implicit target."]),
            block("ERROR/3 (&lt;stdin&gt;, line 3)", &["kept"]),
            block("SEVERE/4 (&lt;stdin&gt;, line 4)", &["dropped"]),
        );
        let diags = extract(&html);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "kept");
    }

    #[test]
    fn document_order_and_duplicates_are_preserved() {
        let html = format!(
            "<p>intro</p>{}<section>{}</section>{}",
            block("ERROR/3 (&lt;stdin&gt;, line 10)", &["b"]),
            block("WARNING/2 (&lt;stdin&gt;, line 2)", &["a"]),
            block("WARNING/2 (&lt;stdin&gt;, line 10)", &["c"]),
        );
        let lines: Vec<(usize, &str)> = extract(&html)
            .iter()
            .map(|d| (d.line, d.severity.as_str()))
            .collect();
        assert_eq!(lines, vec![(10, "error"), (2, "warning"), (10, "warning")]);
    }

    #[test]
    fn unclosed_block_at_end_of_input_is_kept() {
        let html = "<div class=\"system-message\"><p>ERROR/3 (&lt;stdin&gt;, line 1)<p>trailing";
        let diags = extract(html);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "trailing");
    }
}
