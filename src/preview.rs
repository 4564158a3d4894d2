//! Renders converter HTML into styled terminal lines for the preview pane.

use ratatui::style::{Modifier, Style};
use syntect::easy::HighlightLines;
use syntect::highlighting::Theme;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::diagnostics::DIAGNOSTIC_BLOCK_CLASS;
use crate::html::{HtmlEvent, StartTag, Tokenizer};
use crate::theme::Palette;

#[derive(Clone, Debug)]
pub struct StyledSegment {
    pub text: String,
    pub style: Style,
}

#[derive(Clone, Debug, Default)]
pub struct RenderedLine {
    pub segments: Vec<StyledSegment>,
    pub plain: String,
}

#[derive(Clone, Debug)]
pub struct HeadingEntry {
    pub level: u8,
    pub title: String,
    pub line: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RenderedDocument {
    pub lines: Vec<RenderedLine>,
    pub headings: Vec<HeadingEntry>,
}

impl RenderedDocument {
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for (idx, line) in self.lines.iter().enumerate() {
            out.push_str(&line.plain);
            if idx + 1 < self.lines.len() {
                out.push('\n');
            }
        }
        out
    }
}

#[derive(Default)]
struct InlineState {
    emphasis: usize,
    strong: usize,
    code: usize,
    link_depth: usize,
}

#[derive(Clone, Debug)]
struct ListState {
    ordered: bool,
    next_index: u64,
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    header_rows: usize,
    current_row: Option<Vec<String>>,
    current_cell: Option<String>,
    in_head: bool,
}

/// What an open element does to rendering; consulted again when it closes.
#[derive(Clone, Debug)]
enum Kind {
    Block,
    Paragraph,
    Heading(u8),
    Blockquote,
    Indent,
    List,
    Item,
    Emphasis,
    Strong,
    Code,
    Link,
    Pre,
    Table,
    TableHead,
    Row,
    Cell,
    Diagnostic,
    Hidden,
    Inline,
}

struct Open {
    name: String,
    kind: Kind,
}

struct Renderer<'a> {
    syntax_set: &'a SyntaxSet,
    theme: &'a Theme,
    palette: Palette,

    lines: Vec<RenderedLine>,
    headings: Vec<HeadingEntry>,

    stack: Vec<Open>,
    inline: InlineState,
    current_segments: Vec<StyledSegment>,
    current_plain: String,

    heading_level: Option<u8>,
    blockquote_depth: usize,
    indent_depth: usize,
    diagnostic_depth: usize,
    hidden_depth: usize,
    list_stack: Vec<ListState>,

    pre: Option<(String, String)>,
    table: Option<TableState>,
    /// A list bullet was written and its item text has not started yet.
    item_pending: bool,
}

impl<'a> Renderer<'a> {
    fn new(syntax_set: &'a SyntaxSet, theme: &'a Theme, palette: Palette) -> Self {
        Self {
            syntax_set,
            theme,
            palette,
            lines: Vec::new(),
            headings: Vec::new(),
            stack: Vec::new(),
            inline: InlineState::default(),
            current_segments: Vec::new(),
            current_plain: String::new(),
            heading_level: None,
            blockquote_depth: 0,
            indent_depth: 0,
            diagnostic_depth: 0,
            hidden_depth: 0,
            list_stack: Vec::new(),
            pre: None,
            table: None,
            item_pending: false,
        }
    }

    fn finish(mut self) -> RenderedDocument {
        while let Some(open) = self.stack.pop() {
            self.close(open.kind);
        }
        self.flush_line(false);
        while self.lines.last().is_some_and(|line| line.plain.is_empty()) {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(RenderedLine::default());
        }
        RenderedDocument {
            lines: self.lines,
            headings: self.headings,
        }
    }

    fn inline_style(&self) -> Style {
        let mut style = Style::default();
        if self.diagnostic_depth > 0 {
            style = style.fg(self.palette.error);
        }
        if let Some(level) = self.heading_level {
            style = style
                .fg(self.palette.heading(level))
                .add_modifier(Modifier::BOLD);
        }
        if self.inline.emphasis > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.inline.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.inline.code > 0 {
            style = style.fg(self.palette.inline_code);
        }
        if self.inline.link_depth > 0 {
            style = style
                .fg(self.palette.link)
                .add_modifier(Modifier::UNDERLINED);
        }
        style
    }

    fn push_text(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        self.current_plain.push_str(text);
        self.current_segments.push(StyledSegment {
            text: text.to_string(),
            style,
        });
    }

    fn push_prefix_if_needed(&mut self) {
        if !self.current_plain.is_empty() {
            return;
        }
        let muted = Style::default().fg(self.palette.muted);
        if self.indent_depth > 0 {
            self.push_text(&"  ".repeat(self.indent_depth), muted);
        }
        if self.blockquote_depth > 0 {
            self.push_text(&"│ ".repeat(self.blockquote_depth), muted);
        }
        if self.diagnostic_depth > 0 {
            self.push_text("▌ ", Style::default().fg(self.palette.error));
        }
    }

    fn flush_line(&mut self, force_empty: bool) {
        if !force_empty && self.current_segments.is_empty() && self.current_plain.is_empty() {
            return;
        }
        let line = RenderedLine {
            segments: std::mem::take(&mut self.current_segments),
            plain: std::mem::take(&mut self.current_plain),
        };
        self.lines.push(line);
    }

    fn blank_line(&mut self) {
        self.flush_line(false);
        if self
            .lines
            .last()
            .map_or(true, |line| line.plain.is_empty())
        {
            return;
        }
        self.flush_line(true);
    }

    fn add_text(&mut self, text: &str) {
        if self.hidden_depth > 0 {
            return;
        }
        if let Some((_, buf)) = self.pre.as_mut() {
            buf.push_str(text);
            return;
        }
        if let Some(cell) = self.table.as_mut().and_then(|t| t.current_cell.as_mut()) {
            cell.push_str(text);
            return;
        }

        let collapsed = collapse_whitespace(text);
        let collapsed = if self.current_plain.is_empty() || self.current_plain.ends_with(' ') {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        if collapsed.is_empty() {
            return;
        }
        self.push_prefix_if_needed();
        let style = self.inline_style();
        self.push_text(collapsed, style);
        self.item_pending = false;
    }

    fn start(&mut self, tag: StartTag) {
        if tag.is_void() {
            self.void_element(&tag);
            return;
        }

        let kind = self.open(&tag);
        self.stack.push(Open {
            name: tag.name,
            kind,
        });
    }

    fn void_element(&mut self, tag: &StartTag) {
        if self.hidden_depth > 0 {
            return;
        }
        match tag.name.as_str() {
            "br" => {
                if let Some((_, buf)) = self.pre.as_mut() {
                    buf.push('\n');
                } else {
                    self.flush_line(false);
                }
            }
            "hr" => self.add_rule(),
            "img" => {
                let alt = tag
                    .attr("alt")
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .unwrap_or("image");
                let src = tag.attr("src").unwrap_or_default();
                let placeholder = format!("[image: {alt}] ({src})");
                self.push_prefix_if_needed();
                self.push_text(&placeholder, Style::default().fg(self.palette.link));
            }
            _ => {}
        }
    }

    fn open(&mut self, tag: &StartTag) -> Kind {
        if self.hidden_depth > 0
            || matches!(tag.name.as_str(), "head" | "title" | "script" | "style")
        {
            self.hidden_depth += 1;
            return Kind::Hidden;
        }

        if self.pre.is_some() {
            if tag.name == "code" {
                if let Some(lang) = tag.classes().find_map(|c| c.strip_prefix("language-")) {
                    if let Some((current, _)) = self.pre.as_mut() {
                        *current = lang.to_string();
                    }
                }
            }
            return Kind::Inline;
        }

        if let Some(table) = self.table.as_mut() {
            match tag.name.as_str() {
                "thead" => {
                    table.in_head = true;
                    return Kind::TableHead;
                }
                "tr" => {
                    table.current_row = Some(Vec::new());
                    return Kind::Row;
                }
                "td" | "th" => {
                    table.current_cell = Some(String::new());
                    return Kind::Cell;
                }
                _ => {}
            }
            if table.current_cell.is_some() {
                return Kind::Inline;
            }
        }

        if tag.has_class(DIAGNOSTIC_BLOCK_CLASS) {
            self.flush_line(false);
            self.diagnostic_depth += 1;
            return Kind::Diagnostic;
        }

        match tag.name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_line(false);
                let level = tag.name[1..].parse().unwrap_or(1);
                self.heading_level = Some(level);
                Kind::Heading(level)
            }
            "p" => {
                if !self.item_pending {
                    self.flush_line(false);
                }
                Kind::Paragraph
            }
            "blockquote" => {
                self.flush_line(false);
                self.blockquote_depth += 1;
                Kind::Blockquote
            }
            "dd" => {
                self.flush_line(false);
                self.indent_depth += 1;
                Kind::Indent
            }
            "ul" | "ol" => {
                self.flush_line(false);
                let start = tag.attr("start").and_then(|s| s.parse().ok()).unwrap_or(1);
                self.list_stack.push(ListState {
                    ordered: tag.name == "ol",
                    next_index: start,
                });
                Kind::List
            }
            "li" => {
                self.flush_line(false);
                let depth = self.list_stack.len().saturating_sub(1);
                let indent = "  ".repeat(depth);
                let bullet = match self.list_stack.last_mut() {
                    Some(list) if list.ordered => {
                        let bullet = format!("{}. ", list.next_index);
                        list.next_index = list.next_index.saturating_add(1);
                        bullet
                    }
                    _ => "- ".to_string(),
                };
                self.push_prefix_if_needed();
                self.push_text(
                    &format!("{indent}{bullet}"),
                    Style::default().fg(self.palette.muted),
                );
                self.item_pending = true;
                Kind::Item
            }
            "em" | "i" | "cite" => {
                self.inline.emphasis += 1;
                Kind::Emphasis
            }
            "strong" | "b" | "dt" => {
                if tag.name == "dt" {
                    self.flush_line(false);
                }
                self.inline.strong += 1;
                Kind::Strong
            }
            "code" | "tt" | "kbd" | "samp" => {
                self.inline.code += 1;
                Kind::Code
            }
            "span" if tag.has_class("literal") => {
                self.inline.code += 1;
                Kind::Code
            }
            "a" => {
                self.inline.link_depth += 1;
                Kind::Link
            }
            "pre" => {
                self.flush_line(false);
                let lang = tag
                    .classes()
                    .find(|c| {
                        !matches!(*c, "code" | "literal-block" | "highlight" | "doctest-block")
                    })
                    .unwrap_or_default()
                    .to_string();
                self.pre = Some((lang, String::new()));
                Kind::Pre
            }
            "table" => {
                self.flush_line(false);
                self.table = Some(TableState::default());
                Kind::Table
            }
            "div" | "section" | "main" | "article" | "header" | "footer" | "nav" | "aside"
            | "dl" | "figure" | "figcaption" | "caption" => {
                self.flush_line(false);
                Kind::Block
            }
            _ => Kind::Inline,
        }
    }

    fn end(&mut self, name: &str) {
        // Unmatched end tags are ignored; matching ones also close anything
        // left open inside them.
        let Some(pos) = self.stack.iter().rposition(|open| open.name == name) else {
            return;
        };
        while self.stack.len() > pos {
            if let Some(open) = self.stack.pop() {
                self.close(open.kind);
            }
        }
    }

    fn close(&mut self, kind: Kind) {
        match kind {
            Kind::Hidden => self.hidden_depth = self.hidden_depth.saturating_sub(1),
            Kind::Inline => {}
            Kind::Block => self.flush_line(false),
            Kind::Item => {
                self.flush_line(false);
                self.item_pending = false;
            }
            Kind::Paragraph => self.blank_line(),
            Kind::Heading(level) => {
                self.flush_line(false);
                let line = self.lines.len().saturating_sub(1);
                let title = self
                    .lines
                    .get(line)
                    .map(|l| l.plain.trim().to_string())
                    .unwrap_or_default();
                if !title.is_empty() {
                    self.headings.push(HeadingEntry { level, title, line });
                }
                self.heading_level = None;
                self.blank_line();
            }
            Kind::Blockquote => {
                self.flush_line(false);
                self.blockquote_depth = self.blockquote_depth.saturating_sub(1);
                self.blank_line();
            }
            Kind::Indent => {
                self.flush_line(false);
                self.indent_depth = self.indent_depth.saturating_sub(1);
            }
            Kind::List => {
                self.flush_line(false);
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.blank_line();
                }
            }
            Kind::Emphasis => self.inline.emphasis = self.inline.emphasis.saturating_sub(1),
            Kind::Strong => {
                self.inline.strong = self.inline.strong.saturating_sub(1);
            }
            Kind::Code => self.inline.code = self.inline.code.saturating_sub(1),
            Kind::Link => self.inline.link_depth = self.inline.link_depth.saturating_sub(1),
            Kind::Pre => {
                if let Some((lang, code)) = self.pre.take() {
                    self.render_code_block(&lang, &code);
                }
                self.blank_line();
            }
            Kind::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = false;
                }
            }
            Kind::Row => {
                if let Some(table) = self.table.as_mut() {
                    if let Some(row) = table.current_row.take() {
                        if table.in_head {
                            table.header_rows += 1;
                        }
                        table.rows.push(row);
                    }
                }
            }
            Kind::Cell => {
                if let Some(table) = self.table.as_mut() {
                    if let Some(cell) = table.current_cell.take() {
                        let cell = collapse_whitespace(&cell).trim().to_string();
                        table.current_row.get_or_insert_with(Vec::new).push(cell);
                    }
                }
            }
            Kind::Table => {
                let table = self.table.take().unwrap_or_default();
                self.render_table(&table);
                self.blank_line();
            }
            Kind::Diagnostic => {
                self.flush_line(false);
                self.diagnostic_depth = self.diagnostic_depth.saturating_sub(1);
                self.blank_line();
            }
        }
    }

    fn add_rule(&mut self) {
        self.flush_line(false);
        self.push_text(
            "────────────────────────────────────────────────────────────────",
            Style::default().fg(self.palette.muted),
        );
        self.flush_line(false);
        self.blank_line();
    }

    fn render_code_block(&mut self, lang: &str, code: &str) {
        let syntax = if lang.trim().is_empty() {
            self.syntax_set.find_syntax_plain_text()
        } else {
            self.syntax_set
                .find_syntax_by_token(lang)
                .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
        };

        let mut highlighter = HighlightLines::new(syntax, self.theme);
        let code = code.trim_matches('\n');

        for line in LinesWithEndings::from(code) {
            let clean = line.trim_end_matches(['\n', '\r']);
            self.push_prefix_if_needed();
            self.push_text("  ", Style::default().fg(self.palette.muted));

            let highlighted_tokens = highlighter
                .highlight_line(line, self.syntax_set)
                .unwrap_or_default();

            if highlighted_tokens.is_empty() {
                self.push_text(clean, Style::default().fg(self.palette.code_fallback));
            } else {
                for (syn_style, token) in highlighted_tokens {
                    let style = Style::default().fg(ratatui::style::Color::Rgb(
                        syn_style.foreground.r,
                        syn_style.foreground.g,
                        syn_style.foreground.b,
                    ));
                    let token = token.trim_end_matches(['\n', '\r']);
                    self.push_text(token, style);
                }
            }
            self.flush_line(true);
        }
    }

    fn render_table(&mut self, table: &TableState) {
        let col_count = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        if col_count == 0 {
            return;
        }

        let mut widths = vec![3usize; col_count];
        for row in &table.rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            let header = row_idx < table.header_rows;
            let style = if header {
                Style::default()
                    .fg(self.palette.heading(1))
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let line = format_table_row(row, &widths);
            self.push_prefix_if_needed();
            self.push_text(&line, style);
            self.flush_line(false);

            if header && row_idx + 1 == table.header_rows {
                let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                self.push_prefix_if_needed();
                self.push_text(
                    &format_table_row(&sep, &widths),
                    Style::default().fg(self.palette.muted),
                );
                self.flush_line(false);
            }
        }
    }
}

fn format_table_row(row: &[String], widths: &[usize]) -> String {
    let mut output = String::from("| ");
    for (idx, width) in widths.iter().enumerate() {
        let cell = row.get(idx).map_or("", String::as_str);
        output.push_str(&format!("{cell:<width$}"));
        output.push_str(" | ");
    }
    output.trim_end().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() && ch != '\u{a0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Renders an HTML fragment for display in the terminal.
pub fn render_html(
    html: &str,
    syntax_set: &SyntaxSet,
    theme: &Theme,
    palette: Palette,
) -> RenderedDocument {
    let mut renderer = Renderer::new(syntax_set, theme, palette);
    for event in Tokenizer::new(html) {
        match event {
            HtmlEvent::Start(tag) => renderer.start(tag),
            HtmlEvent::End(name) => renderer.end(&name),
            HtmlEvent::Text(text) => renderer.add_text(&text),
        }
    }
    renderer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syntect::highlighting::ThemeSet;

    fn render(html: &str) -> RenderedDocument {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let themes = ThemeSet::load_defaults();
        let theme = crate::theme::resolve_syntax_theme(&themes, true);
        render_html(html, &syntax_set, &theme, Palette::dark())
    }

    #[test]
    fn paragraphs_are_separated_and_whitespace_collapsed() {
        let doc = render("<p>Hello\n   <em>big</em>   world</p>\n<p>Second</p>");
        assert_eq!(doc.plain_text(), "Hello big world\n\nSecond");
    }

    #[test]
    fn headings_are_recorded() {
        let doc = render("<h1 class=\"title\">Guide</h1><section><h2>Install</h2><p>run it</p></section>");
        let titles: Vec<(u8, &str, usize)> = doc
            .headings
            .iter()
            .map(|h| (h.level, h.title.as_str(), h.line))
            .collect();
        assert_eq!(titles, vec![(1, "Guide", 0), (2, "Install", 2)]);
    }

    #[test]
    fn lists_get_bullets_and_numbers() {
        let doc = render("<ul><li>a</li><li>b<ol start=\"3\"><li>c</li></ol></li></ul>");
        assert_eq!(doc.plain_text(), "- a\n- b\n  3. c");
    }

    #[test]
    fn literal_blocks_keep_their_lines() {
        let doc = render("<pre class=\"code python literal-block\"><span class=\"k\">def</span> f():\n    return 1\n</pre>");
        assert_eq!(doc.plain_text(), "  def f():\n      return 1");
    }

    #[test]
    fn diagnostic_blocks_are_marked() {
        let doc = render("<div class=\"system-message\"><p class=\"system-message-title\">System Message: ERROR/3 (&lt;stdin&gt;, line 2)</p><p>Unexpected indentation.</p></div>");
        assert_eq!(
            doc.plain_text(),
            "▌ System Message: ERROR/3 (<stdin>, line 2)\n\n▌ Unexpected indentation."
        );
    }

    #[test]
    fn tables_are_aligned() {
        let doc = render("<table><thead><tr><th>Name</th><th>Qty</th></tr></thead><tbody><tr><td>apple</td><td>3</td></tr></tbody></table>");
        assert_eq!(
            doc.plain_text(),
            "| Name  | Qty |\n| ----- | --- |\n| apple | 3   |"
        );
    }

    #[test]
    fn empty_input_yields_one_blank_line() {
        let doc = render("");
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.plain_text(), "");
    }
}
