//! Interactive terminal editor: source pane, problems panel, live preview.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode, KeyEvent,
    KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, ExecutableCommand};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::prelude::{Color, Modifier, Rect, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::block::Padding;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;

use crate::buffer::EditBuffer;
use crate::convert::Converter;
use crate::debounce::Debouncer;
use crate::export;
use crate::format::FormatAction;
use crate::lines;
use crate::pipeline::{Outcome, Pipeline};
use crate::prefs::Prefs;
use crate::preview::{render_html, RenderedDocument};
use crate::session::Session;
use crate::theme::{resolve_syntax_theme, Palette};

/// Source lines never wrap, so every line is one row tall.
const LINE_HEIGHT: f32 = 1.0;
const NOTICE_TTL: Duration = Duration::from_secs(3);
const PANEL_MAX_ROWS: u16 = 8;
const PANE_STEP: f32 = 5.0;
const TICK: Duration = Duration::from_millis(50);

pub struct AppConfig {
    pub path: Option<PathBuf>,
    pub watch: bool,
    pub debounce: Duration,
    pub prefs_path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Focus {
    Editor,
    Panel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NoticeKind {
    Info,
    Success,
    Error,
}

struct Notice {
    text: String,
    kind: NoticeKind,
    expires: Instant,
}

struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
}

/// Screen geometry from the last draw, used to map mouse clicks.
#[derive(Clone, Copy, Default)]
struct Hitboxes {
    editor: Rect,
    gutter: u16,
    panel_header: Rect,
    panel_list: Rect,
    preview: Rect,
}

pub struct App {
    config: AppConfig,
    prefs: Prefs,
    palette: Palette,
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    syntax_theme: Theme,

    session: Session,
    preview: RenderedDocument,
    debouncer: Debouncer<u64>,
    pipeline: Pipeline,
    initialized: bool,
    init_error: Option<String>,
    dirty: bool,
    quit_armed: bool,

    focus: Focus,
    source_scroll: usize,
    preview_scroll: u16,
    panel_scroll: usize,
    editor_rows: u16,
    hitboxes: Hitboxes,

    notice: Option<Notice>,

    watcher: Option<FileWatcher>,
    watch_requested: bool,
}

impl App {
    pub fn new(config: AppConfig, text: String, converter: Box<dyn Converter>) -> Result<Self> {
        let prefs = config
            .prefs_path
            .as_deref()
            .map(Prefs::load)
            .unwrap_or_default();
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();
        let syntax_theme = resolve_syntax_theme(&theme_set, prefs.dark_mode);

        let mut pipeline = Pipeline::spawn(converter).context("Failed to start converter thread")?;
        let session = Session::new(text, LINE_HEIGHT);
        // The first conversion skips the quiet window.
        pipeline.submit(session.generation(), session.buffer().text().to_string());

        Ok(Self {
            palette: Palette::for_mode(prefs.dark_mode),
            debouncer: Debouncer::new(config.debounce),
            config,
            prefs,
            syntax_set,
            theme_set,
            syntax_theme,
            session,
            preview: RenderedDocument::default(),
            pipeline,
            initialized: false,
            init_error: None,
            dirty: false,
            quit_armed: false,
            focus: Focus::Editor,
            source_scroll: 0,
            preview_scroll: 0,
            panel_scroll: 0,
            editor_rows: 1,
            hitboxes: Hitboxes::default(),
            notice: None,
            watcher: None,
            watch_requested: false,
        })
    }

    fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            kind,
            expires: Instant::now() + NOTICE_TTL,
        });
    }

    fn display_name(&self) -> String {
        self.config
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .map_or_else(|| "<untitled>".to_string(), |n| n.to_string_lossy().into_owned())
    }

    // --- pipeline -------------------------------------------------------

    fn tick(&mut self) {
        if let Some(generation) = self.debouncer.poll() {
            if self.init_error.is_none() {
                let source = self.session.buffer().text().to_string();
                if !self.pipeline.submit(generation, source) {
                    self.notify(NoticeKind::Error, "Converter thread stopped");
                }
            }
        }

        while let Some(outcome) = self.pipeline.poll() {
            self.apply_outcome(outcome);
        }

        self.poll_watch();
        if self.watch_requested {
            self.watch_requested = false;
            if let Err(err) = self.reload_from_disk() {
                self.notify(NoticeKind::Error, format!("Reload failed: {err:#}"));
            }
        }

        if self.notice.as_ref().is_some_and(|n| n.expires <= Instant::now()) {
            self.notice = None;
        }
    }

    fn apply_outcome(&mut self, outcome: Outcome) {
        let generation = outcome.generation;
        if self.init_error.is_some() {
            tracing::debug!(generation, "dropping outcome after failed initialization");
            return;
        }
        match outcome.result {
            Ok(rendered) => {
                self.preview = render_html(
                    &rendered.html,
                    &self.syntax_set,
                    &self.syntax_theme,
                    self.palette,
                );
                self.session.apply(generation, rendered);
                if !self.session.panel().is_visible() {
                    self.focus = Focus::Editor;
                }
                self.initialized = true;
                self.clamp_preview_scroll();
                tracing::info!(
                    generation,
                    errors = self.session.panel().error_count(),
                    warnings = self.session.panel().warning_count(),
                    highlighted = self.session.overlay().regions().len(),
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "applied conversion"
                );
            }
            Err(err) => {
                let err = anyhow::Error::from(err);
                if self.initialized {
                    self.notify(NoticeKind::Error, format!("Conversion failed: {err:#}"));
                } else {
                    tracing::error!(error = %format!("{err:#}"), "initialization failed");
                    self.init_error = Some(format!("Initialization failed: {err:#}"));
                    self.debouncer.cancel();
                }
            }
        }
    }

    /// How long the event loop may block before the next tick is due.
    fn poll_timeout(&self) -> Duration {
        self.debouncer
            .remaining()
            .map_or(TICK, |remaining| remaining.min(TICK))
    }

    fn rerender_preview(&mut self) {
        self.preview = render_html(
            self.session.html(),
            &self.syntax_set,
            &self.syntax_theme,
            self.palette,
        );
        self.clamp_preview_scroll();
    }

    fn edit(&mut self, f: impl FnOnce(&mut EditBuffer)) {
        let (generation, ()) = self.session.edit(f);
        self.dirty = true;
        self.quit_armed = false;
        self.debouncer.schedule(generation);
        self.ensure_caret_visible();
    }

    fn move_cursor(&mut self, f: impl FnOnce(&mut EditBuffer)) {
        f(self.session.cursor());
        self.ensure_caret_visible();
    }

    // --- file watching ----------------------------------------------------

    pub fn ensure_watcher(&mut self) -> Result<()> {
        if !self.config.watch {
            self.watcher = None;
            return Ok(());
        }

        let Some(path) = self.config.path.clone().filter(|p| p.exists()) else {
            self.watcher = None;
            return Ok(());
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(FileWatcher {
            _watcher: watcher,
            rx,
        });
        Ok(())
    }

    fn poll_watch(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            while let Ok(event) = watcher.rx.try_recv() {
                if event.is_ok() {
                    self.watch_requested = true;
                }
            }
        }
    }

    fn reload_from_disk(&mut self) -> Result<()> {
        let Some(path) = self.config.path.clone() else {
            return Ok(());
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to reload {}", path.display()))?;
        if text == self.session.buffer().text() {
            return Ok(());
        }
        if self.dirty {
            self.notify(
                NoticeKind::Info,
                format!("{} changed on disk; keeping unsaved edits", path.display()),
            );
            return Ok(());
        }

        let generation = self.session.reload(text);
        self.debouncer.schedule(generation);
        self.ensure_caret_visible();
        tracing::info!(path = %path.display(), generation, "reloaded from disk");
        self.notify(NoticeKind::Info, format!("Reloaded {}", path.display()));
        // Editors that save by rename replace the watched inode.
        self.ensure_watcher()?;
        Ok(())
    }

    // --- actions ------------------------------------------------------------

    fn save(&mut self) {
        let cwd = Path::new(".");
        let target = export::source_target(self.config.path.as_deref(), cwd);
        match export::save_source(&target, self.session.buffer().text()) {
            Ok(path) => {
                self.dirty = false;
                self.quit_armed = false;
                tracing::info!(path = %path.display(), "saved source");
                self.notify(NoticeKind::Success, format!("Saved {}", path.display()));
                if self.config.path.is_none() {
                    self.config.path = Some(path);
                    if let Err(err) = self.ensure_watcher() {
                        tracing::warn!(error = %err, "could not watch saved file");
                    }
                }
            }
            Err(err) => {
                let err = anyhow::Error::from(err);
                tracing::warn!(error = %format!("{err:#}"), "save failed");
                self.notify(NoticeKind::Error, format!("Save failed: {err:#}"));
            }
        }
    }

    fn export_html(&mut self) {
        let cwd = Path::new(".");
        let target = export::html_target(self.config.path.as_deref(), cwd);
        let title = self
            .preview
            .headings
            .first()
            .map_or_else(|| self.display_name(), |h| h.title.clone());
        match export::export_html(&target, &title, self.session.html()) {
            Ok(path) => {
                self.notify(NoticeKind::Success, format!("Exported {}", path.display()));
            }
            Err(err) => {
                let err = anyhow::Error::from(err);
                tracing::warn!(error = %format!("{err:#}"), "export failed");
                self.notify(NoticeKind::Error, format!("Export failed: {err:#}"));
            }
        }
    }

    fn persist_prefs(&mut self) {
        let Some(path) = self.config.prefs_path.clone() else {
            return;
        };
        if let Err(err) = self.prefs.save(&path) {
            let err = anyhow::Error::from(err);
            tracing::warn!(error = %format!("{err:#}"), "could not store preferences");
            self.notify(NoticeKind::Error, format!("Preferences not saved: {err:#}"));
        }
    }

    fn toggle_dark_mode(&mut self) {
        self.prefs.dark_mode = !self.prefs.dark_mode;
        self.palette = Palette::for_mode(self.prefs.dark_mode);
        self.syntax_theme = resolve_syntax_theme(&self.theme_set, self.prefs.dark_mode);
        self.rerender_preview();
        self.persist_prefs();
    }

    fn resize_panes(&mut self, delta: f32) {
        self.prefs.panes.shift(delta);
        self.persist_prefs();
    }

    fn toggle_panel(&mut self) {
        let state = self.session.toggle_panel();
        if self.session.panel().is_collapsed() && self.focus == Focus::Panel {
            self.focus = Focus::Editor;
        }
        tracing::debug!(?state, "problems panel toggled");
    }

    fn activate_entry(&mut self, index: usize) {
        let Some(nav) = self.session.activate(index, f32::from(self.editor_rows)) else {
            return;
        };
        let last = self.session.buffer().line_count().saturating_sub(1);
        self.source_scroll = (nav.scroll_top / LINE_HEIGHT) as usize;
        self.source_scroll = self.source_scroll.min(last);
        self.ensure_caret_visible();
        self.focus = Focus::Editor;

        let total = self.session.buffer().line_count();
        if nav.line > total {
            self.notify(
                NoticeKind::Info,
                format!("Line {} is past the end of the buffer ({total} lines)", nav.line),
            );
        } else {
            self.notify(NoticeKind::Info, format!("Line {}", nav.line));
        }
    }

    fn jump_relative(&mut self, reverse: bool) {
        if !self.session.panel().is_visible() {
            self.notify(NoticeKind::Info, "No problems");
            return;
        }
        let panel = self.session.panel_mut();
        if reverse {
            panel.select_prev();
        } else {
            panel.select_next();
        }
        if let Some(index) = self.session.panel().selected() {
            self.activate_entry(index);
        }
    }

    // --- scrolling ----------------------------------------------------------

    fn ensure_caret_visible(&mut self) {
        let (line, _) = self.session.buffer().caret_position();
        let rows = usize::from(self.editor_rows.max(1));
        if line < self.source_scroll {
            self.source_scroll = line;
        } else if line >= self.source_scroll + rows {
            self.source_scroll = line + 1 - rows;
        }
    }

    fn scroll_source(&mut self, delta: isize) {
        let last = self.session.buffer().line_count().saturating_sub(1);
        self.source_scroll = self.source_scroll.saturating_add_signed(delta).min(last);
    }

    fn max_preview_scroll(&self) -> u16 {
        let total = self.preview.lines.len();
        let visible = usize::from(self.hitboxes.preview.height.max(1));
        u16::try_from(total.saturating_sub(visible)).unwrap_or(u16::MAX)
    }

    fn clamp_preview_scroll(&mut self) {
        self.preview_scroll = self.preview_scroll.min(self.max_preview_scroll());
    }

    fn scroll_preview(&mut self, delta: i32) {
        let next = i32::from(self.preview_scroll).saturating_add(delta).max(0);
        self.preview_scroll = u16::try_from(next).unwrap_or(u16::MAX);
        self.clamp_preview_scroll();
    }

    // --- drawing --------------------------------------------------------------

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let root = frame.size();
        let chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(root);
        let body = chunks[0];
        let status = chunks[1];

        let editor_percent = self.prefs.panes.editor_percent().round().clamp(0.0, 100.0) as u16;
        let cols = Layout::horizontal([
            Constraint::Percentage(editor_percent),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(body);

        let panel = self.session.panel();
        let panel_height = if !panel.is_visible() {
            0
        } else if panel.is_collapsed() {
            1
        } else {
            let rows = u16::try_from(panel.diagnostics().len()).unwrap_or(u16::MAX);
            rows.min(PANEL_MAX_ROWS) + 1
        };
        let left = Layout::vertical([Constraint::Min(1), Constraint::Length(panel_height)])
            .split(cols[0]);

        self.draw_editor(frame, left[0]);
        if panel_height > 0 {
            self.draw_panel(frame, left[1]);
        } else {
            self.hitboxes.panel_header = Rect::default();
            self.hitboxes.panel_list = Rect::default();
        }
        self.draw_preview(frame, cols[2]);
        self.draw_status(frame, status);
    }

    fn draw_editor(&mut self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let dirty = if self.dirty { " ●" } else { "" };
        let block = Block::default()
            .title(format!(" {}{dirty} ", self.display_name()))
            .borders(Borders::TOP)
            .border_style(Style::default().fg(if self.focus == Focus::Editor {
                self.palette.focus
            } else {
                self.palette.border
            }));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        self.editor_rows = inner.height.max(1);
        let buffer = self.session.buffer();
        let text = buffer.text();
        let selection = buffer.selection();
        let line_count = buffer.line_count();
        let gutter_digits = line_count.to_string().len().max(3);
        let gutter = u16::try_from(gutter_digits + 2).unwrap_or(u16::MAX);
        let content_width = usize::from(inner.width.saturating_sub(gutter));

        let first = self.source_scroll.min(line_count.saturating_sub(1));
        let mut offset = lines::line_range(text, first + 1).start;
        let mut rows = Vec::with_capacity(usize::from(inner.height));

        for (idx, line) in text
            .split('\n')
            .enumerate()
            .skip(first)
            .take(usize::from(inner.height))
        {
            let severity = self.session.overlay().severity_at(idx);
            let line_bg = severity.map(|s| self.palette.severity_line(s));
            let base = line_bg.map_or_else(Style::default, |bg| Style::default().bg(bg));

            let number_style = match severity {
                Some(s) => base.fg(self.palette.severity(s)).add_modifier(Modifier::BOLD),
                None => base.fg(self.palette.muted),
            };
            let mut spans = vec![Span::styled(
                format!("{:>width$}  ", idx + 1, width = gutter_digits),
                number_style,
            )];

            let line_start = offset;
            let line_end = offset + line.len();
            let sel_start = selection.start.clamp(line_start, line_end) - line_start;
            let sel_end = selection.end.clamp(line_start, line_end) - line_start;
            let parts = [
                (&line[..sel_start], base),
                (&line[sel_start..sel_end], base.bg(self.palette.selection)),
                (&line[sel_end..], base),
            ];
            let mut used = 0usize;
            for (part, style) in parts {
                if part.is_empty() {
                    continue;
                }
                let shown: String = part.chars().map(|c| if c == '\t' { ' ' } else { c }).collect();
                used += shown.chars().count();
                spans.push(Span::styled(shown, style));
            }
            if line_bg.is_some() && used < content_width {
                spans.push(Span::styled(" ".repeat(content_width - used), base));
            }

            rows.push(Line::from(spans));
            offset = line_end + 1;
        }

        frame.render_widget(Paragraph::new(Text::from(rows)), inner);

        if self.focus == Focus::Editor {
            let (line, column) = buffer.caret_position();
            if line >= first && line < first + usize::from(inner.height) {
                let row = u16::try_from(line - first).unwrap_or(0);
                let col = u16::try_from(column)
                    .unwrap_or(u16::MAX)
                    .min(inner.width.saturating_sub(gutter + 1));
                frame.set_cursor(inner.x + gutter + col, inner.y + row);
            }
        }

        self.hitboxes.editor = inner;
        self.hitboxes.gutter = gutter;
    }

    fn draw_panel(&mut self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let panel = self.session.panel();
        let chevron = if panel.is_collapsed() { "▸" } else { "▾" };
        let title = Line::from(vec![
            Span::raw(format!(" {chevron} Problems  ")),
            Span::styled(
                format!("✖ {}", panel.error_count()),
                Style::default().fg(self.palette.error),
            ),
            Span::raw("  "),
            Span::styled(
                format!("⚠ {}", panel.warning_count()),
                Style::default().fg(self.palette.warning),
            ),
            Span::raw(" "),
        ]);
        let block = Block::default()
            .title(title)
            .borders(Borders::TOP)
            .border_style(Style::default().fg(if self.focus == Focus::Panel {
                self.palette.focus
            } else {
                self.palette.border
            }));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        self.hitboxes.panel_header = Rect {
            height: 1,
            ..area
        };
        self.hitboxes.panel_list = inner;
        if panel.is_collapsed() || inner.height == 0 {
            return;
        }

        let visible = usize::from(inner.height);
        let selected = panel.selected().unwrap_or(0);
        if selected < self.panel_scroll {
            self.panel_scroll = selected;
        } else if selected >= self.panel_scroll + visible {
            self.panel_scroll = selected + 1 - visible;
        }
        self.panel_scroll = self
            .panel_scroll
            .min(panel.diagnostics().len().saturating_sub(visible));

        let rows: Vec<Line> = panel
            .diagnostics()
            .iter()
            .enumerate()
            .skip(self.panel_scroll)
            .take(visible)
            .map(|(idx, diag)| {
                let is_selected = idx == selected && self.focus == Focus::Panel;
                let marker = if is_selected { "> " } else { "  " };
                let icon = match diag.severity {
                    crate::diagnostics::Severity::Error => "✖",
                    crate::diagnostics::Severity::Warning => "⚠",
                };
                let mut line = Line::from(vec![
                    Span::raw(marker),
                    Span::styled(
                        format!("{icon} {:<7}", diag.severity.label()),
                        Style::default().fg(self.palette.severity(diag.severity)),
                    ),
                    Span::styled(
                        format!(" Line {:<5} ", diag.line),
                        Style::default().fg(self.palette.muted),
                    ),
                    Span::raw(diag.message.clone()),
                ]);
                if is_selected {
                    line = line.bold();
                }
                line
            })
            .collect();

        frame.render_widget(Paragraph::new(Text::from(rows)), inner);
    }

    fn draw_preview(&mut self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let stale = if self.init_error.is_some() {
            ""
        } else if self.pipeline.in_flight() > 0 {
            " · converting…"
        } else if self.session.is_stale() {
            " · updating…"
        } else {
            ""
        };
        let title = format!(" preview · {}{stale} ", self.pipeline.converter_name());

        let lines: Vec<Line> = self
            .preview
            .lines
            .iter()
            .map(|line| {
                if line.segments.is_empty() {
                    Line::raw("")
                } else {
                    Line::from(
                        line.segments
                            .iter()
                            .map(|segment| Span::styled(segment.text.clone(), segment.style))
                            .collect::<Vec<_>>(),
                    )
                }
            })
            .collect();

        let block = Block::default()
            .title(title)
            .borders(Borders::TOP)
            .border_style(Style::default().fg(self.palette.border))
            .padding(Padding::new(1, 1, 0, 0));
        self.hitboxes.preview = block.inner(area);
        self.clamp_preview_scroll();

        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .scroll((self.preview_scroll, 0))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn draw_status(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let (line, column) = self.session.buffer().caret_position();
        let position = format!("Ln {}, Col {}", line + 1, column + 1);
        let focus_hint = match self.focus {
            Focus::Editor => "Tab: problems",
            Focus::Panel => "Enter: go to line · Esc: editor",
        };

        let (message, style) = if let Some(err) = &self.init_error {
            (
                err.clone(),
                Style::default().fg(self.palette.error).add_modifier(Modifier::BOLD),
            )
        } else if let Some(notice) = &self.notice {
            let color = match notice.kind {
                NoticeKind::Info => Color::Gray,
                NoticeKind::Success => Color::Green,
                NoticeKind::Error => self.palette.error,
            };
            (notice.text.clone(), Style::default().fg(color))
        } else if !self.initialized {
            ("Converting…".to_string(), Style::default().fg(Color::Gray))
        } else {
            (
                "^S save · ^E export · ^P panel · ^D theme · ^Q quit".to_string(),
                Style::default().fg(self.palette.muted),
            )
        };

        let status = Line::from(vec![
            Span::styled(
                format!(" {position} | {focus_hint} | "),
                Style::default().fg(Color::Gray),
            ),
            Span::styled(message, style),
        ]);
        frame.render_widget(Paragraph::new(status), area);
    }

    // --- input ------------------------------------------------------------

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);

        if ctrl {
            match key.code {
                KeyCode::Char('q') | KeyCode::Char('c') => {
                    if self.dirty && !self.quit_armed {
                        self.quit_armed = true;
                        self.notify(
                            NoticeKind::Error,
                            "Unsaved changes: press Ctrl-Q again to quit",
                        );
                        return Ok(false);
                    }
                    return Ok(true);
                }
                KeyCode::Char('s') => self.save(),
                KeyCode::Char('e') => self.export_html(),
                KeyCode::Char('d') => self.toggle_dark_mode(),
                KeyCode::Char('p') => self.toggle_panel(),
                KeyCode::Char('a') => self.move_cursor(EditBuffer::select_all),
                KeyCode::Up => self.scroll_preview(-1),
                KeyCode::Down => self.scroll_preview(1),
                _ => {}
            }
            return Ok(false);
        }

        if alt {
            let action = match key.code {
                KeyCode::Left => {
                    self.resize_panes(-PANE_STEP);
                    None
                }
                KeyCode::Right => {
                    self.resize_panes(PANE_STEP);
                    None
                }
                KeyCode::Char('1') => Some(FormatAction::Heading(1)),
                KeyCode::Char('2') => Some(FormatAction::Heading(2)),
                KeyCode::Char('3') => Some(FormatAction::Heading(3)),
                KeyCode::Char('b') => Some(FormatAction::Bold),
                KeyCode::Char('i') => Some(FormatAction::Italic),
                KeyCode::Char('c') => Some(FormatAction::InlineCode),
                KeyCode::Char('u') => Some(FormatAction::BulletList),
                KeyCode::Char('o') => Some(FormatAction::NumberedList),
                KeyCode::Char('l') => Some(FormatAction::Link),
                KeyCode::Char('m') => Some(FormatAction::Image),
                KeyCode::Char('k') => Some(FormatAction::CodeBlock),
                KeyCode::Char('q') => Some(FormatAction::Blockquote),
                KeyCode::Char('t') => Some(FormatAction::Table),
                _ => None,
            };
            if let Some(action) = action {
                self.focus = Focus::Editor;
                self.edit(|buffer| action.apply(buffer));
                self.notify(NoticeKind::Info, format!("Inserted {}", action.label()));
            }
            return Ok(false);
        }

        match key.code {
            KeyCode::F(8) => {
                self.jump_relative(shift);
                return Ok(false);
            }
            KeyCode::PageUp if self.focus == Focus::Panel => {
                self.scroll_preview(-i32::from(self.hitboxes.preview.height.max(1)));
                return Ok(false);
            }
            KeyCode::PageDown if self.focus == Focus::Panel => {
                self.scroll_preview(i32::from(self.hitboxes.preview.height.max(1)));
                return Ok(false);
            }
            _ => {}
        }

        match self.focus {
            Focus::Panel => self.handle_panel_key(key),
            Focus::Editor => self.handle_editor_key(key),
        }
        Ok(false)
    }

    fn handle_panel_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Tab | KeyCode::BackTab => self.focus = Focus::Editor,
            KeyCode::Up | KeyCode::Char('k') => self.session.panel_mut().select_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.session.panel_mut().select_next(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(index) = self.session.panel().selected() {
                    self.activate_entry(index);
                }
            }
            _ => {}
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let page = isize::try_from(self.editor_rows.max(1)).unwrap_or(1);
        match key.code {
            KeyCode::Tab => {
                let panel = self.session.panel();
                if panel.is_visible() && !panel.is_collapsed() {
                    self.focus = Focus::Panel;
                } else {
                    self.edit(|buffer| buffer.insert("   "));
                }
            }
            KeyCode::Char(ch) => self.edit(|buffer| buffer.insert_char(ch)),
            KeyCode::Enter => self.edit(|buffer| buffer.insert("\n")),
            KeyCode::Backspace => self.edit(EditBuffer::backspace),
            KeyCode::Delete => self.edit(EditBuffer::delete_forward),
            KeyCode::Left => self.move_cursor(|buffer| buffer.move_left(shift)),
            KeyCode::Right => self.move_cursor(|buffer| buffer.move_right(shift)),
            KeyCode::Up => self.move_cursor(|buffer| buffer.move_vertical(-1, shift)),
            KeyCode::Down => self.move_cursor(|buffer| buffer.move_vertical(1, shift)),
            KeyCode::Home => self.move_cursor(|buffer| buffer.move_home(shift)),
            KeyCode::End => self.move_cursor(|buffer| buffer.move_end(shift)),
            KeyCode::PageUp => self.move_cursor(|buffer| buffer.move_vertical(-page, shift)),
            KeyCode::PageDown => self.move_cursor(|buffer| buffer.move_vertical(page, shift)),
            KeyCode::Esc => {
                let caret = self.session.buffer().caret();
                self.move_cursor(|buffer| buffer.select(caret, caret));
            }
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let (x, y) = (mouse.column, mouse.row);
        let inside = |rect: Rect| {
            rect.width > 0
                && rect.height > 0
                && x >= rect.x
                && x < rect.x + rect.width
                && y >= rect.y
                && y < rect.y + rect.height
        };

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if inside(self.hitboxes.panel_header) {
                    self.toggle_panel();
                } else if inside(self.hitboxes.panel_list) && !self.session.panel().is_collapsed()
                {
                    let index = self.panel_scroll + usize::from(y - self.hitboxes.panel_list.y);
                    if index < self.session.panel().diagnostics().len() {
                        self.session.panel_mut().select(index);
                        self.activate_entry(index);
                    }
                } else if inside(self.hitboxes.editor) {
                    self.focus = Focus::Editor;
                    let line = self.source_scroll + usize::from(y - self.hitboxes.editor.y);
                    let column = usize::from(
                        x.saturating_sub(self.hitboxes.editor.x + self.hitboxes.gutter),
                    );
                    let text = self.session.buffer().text();
                    let range = lines::line_range(text, line + 1);
                    let offset = text[range.start..range.end]
                        .char_indices()
                        .nth(column)
                        .map_or(range.end, |(idx, _)| range.start + idx);
                    self.move_cursor(|buffer| buffer.select(offset, offset));
                }
            }
            MouseEventKind::ScrollUp => {
                if inside(self.hitboxes.preview) {
                    self.scroll_preview(-3);
                } else if inside(self.hitboxes.editor) {
                    self.scroll_source(-3);
                }
            }
            MouseEventKind::ScrollDown => {
                if inside(self.hitboxes.preview) {
                    self.scroll_preview(3);
                } else if inside(self.hitboxes.editor) {
                    self.scroll_source(3);
                }
            }
            _ => {}
        }
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        io::stdout().execute(EnableMouseCapture)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), DisableMouseCapture);
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

pub fn run_interactive(mut app: App) -> Result<()> {
    let _guard = TerminalGuard::enter()?;
    app.ensure_watcher()?;

    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    loop {
        terminal.draw(|frame| app.draw(frame))?;
        app.tick();

        if event::poll(app.poll_timeout())? {
            match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key)? {
                        break;
                    }
                }
                CEvent::Mouse(mouse) => app.handle_mouse(mouse),
                _ => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConvertError;
    use ratatui::backend::TestBackend;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config() -> AppConfig {
        AppConfig {
            path: None,
            watch: false,
            debounce: Duration::ZERO,
            prefs_path: None,
        }
    }

    fn echo(source: &str) -> Result<String, ConvertError> {
        Ok(source.to_string())
    }

    fn settle(app: &mut App) {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            app.tick();
            if !app.session.is_stale() || app.init_error.is_some() || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    const TWO_PROBLEMS: &str = "<p>intro</p>\n<div class=\"system-message\"><p>ERROR/3 (&lt;stdin&gt;, line 2)</p><p>first</p></div>\n<div class=\"system-message\"><p>WARNING/2 (&lt;stdin&gt;, line 40)</p><p>second</p></div>";

    #[test]
    fn initial_conversion_populates_panel_and_preview() {
        let mut app = App::new(config(), TWO_PROBLEMS.to_string(), Box::new(echo)).expect("app");
        settle(&mut app);
        assert!(app.initialized);
        assert_eq!(app.session.panel().error_count(), 1);
        assert_eq!(app.session.panel().warning_count(), 1);
        assert_eq!(app.session.overlay().regions().len(), 1);
        assert!(app.preview.plain_text().contains("intro"));
    }

    #[test]
    fn failed_first_conversion_is_persistent() {
        let failing = |_: &str| -> Result<String, ConvertError> {
            Err(ConvertError::Other("no docutils".to_string()))
        };
        let mut app = App::new(config(), "x".to_string(), Box::new(failing)).expect("app");
        settle(&mut app);
        let err = app.init_error.clone().unwrap_or_default();
        assert!(err.contains("no docutils"), "{err}");

        app.handle_key(key(KeyCode::Char('y'))).expect("key");
        app.tick();
        assert_eq!(app.pipeline.in_flight(), 0);
        assert!(app.session.is_stale());
        assert!(app.init_error.is_some());
    }

    #[test]
    fn typing_schedules_a_new_conversion() {
        let mut app = App::new(config(), String::new(), Box::new(echo)).expect("app");
        settle(&mut app);
        app.handle_key(key(KeyCode::Char('h'))).expect("key");
        app.handle_key(key(KeyCode::Char('i'))).expect("key");
        assert!(app.dirty);
        assert!(app.session.is_stale());
        settle(&mut app);
        assert_eq!(app.session.buffer().text(), "hi");
        assert_eq!(app.session.html(), "hi");
    }

    #[test]
    fn queued_success_after_failed_start_is_ignored() {
        let converter = |source: &str| -> Result<String, ConvertError> {
            if source == "bad" {
                Err(ConvertError::Other("broken start".to_string()))
            } else {
                Ok(format!("<p>{source}</p>"))
            }
        };
        let mut app = App::new(config(), "bad".to_string(), Box::new(converter)).expect("app");
        app.handle_key(key(KeyCode::Char('!'))).expect("key");

        let deadline = Instant::now() + TIMEOUT;
        app.tick();
        while app.pipeline.in_flight() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            app.tick();
        }

        assert_eq!(app.pipeline.in_flight(), 0);
        assert!(app.init_error.is_some());
        assert!(!app.initialized);
        assert_eq!(app.session.html(), "");
    }

    #[test]
    fn event_wait_shrinks_to_the_quiet_window() {
        let config = AppConfig {
            debounce: Duration::from_millis(20),
            ..config()
        };
        let mut app = App::new(config, String::new(), Box::new(echo)).expect("app");
        assert_eq!(app.poll_timeout(), TICK);
        app.handle_key(key(KeyCode::Char('a'))).expect("key");
        assert!(app.poll_timeout() <= Duration::from_millis(20));
    }

    #[test]
    fn focus_returns_to_editor_when_panel_empties() {
        let mut app = App::new(config(), TWO_PROBLEMS.to_string(), Box::new(echo)).expect("app");
        settle(&mut app);

        app.handle_key(KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL))
            .expect("key");
        app.handle_key(key(KeyCode::Char('x'))).expect("key");
        app.handle_key(key(KeyCode::Tab)).expect("key");
        assert_eq!(app.focus, Focus::Panel);

        settle(&mut app);
        assert!(!app.session.panel().is_visible());
        assert_eq!(app.focus, Focus::Editor);

        app.handle_key(key(KeyCode::Char('y'))).expect("key");
        assert_eq!(app.session.buffer().text(), "xy");
    }

    #[test]
    fn panel_activation_moves_caret_and_tab_focuses_panel() {
        let text = format!("{TWO_PROBLEMS}\nsecond line\nthird");
        let mut app = App::new(config(), text, Box::new(echo)).expect("app");
        settle(&mut app);

        app.handle_key(key(KeyCode::Tab)).expect("key");
        assert_eq!(app.focus, Focus::Panel);
        app.handle_key(key(KeyCode::Enter)).expect("key");
        assert_eq!(app.focus, Focus::Editor);
        assert_eq!(app.session.buffer().caret_position().0, 1);

        app.jump_relative(false);
        let end = app.session.buffer().text().len();
        assert_eq!(app.session.buffer().caret(), end);
    }

    #[test]
    fn collapse_survives_updates_and_draw_renders() {
        let mut app = App::new(config(), TWO_PROBLEMS.to_string(), Box::new(echo)).expect("app");
        settle(&mut app);
        app.toggle_panel();
        app.handle_key(key(KeyCode::Char(' '))).expect("key");
        settle(&mut app);
        assert!(app.session.panel().is_collapsed());

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).expect("terminal");
        terminal.draw(|frame| app.draw(frame)).expect("draw");
        let buffer = terminal.backend().buffer().clone();
        let rendered: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(rendered.contains("Problems"));
    }

    #[test]
    fn format_shortcut_edits_buffer() {
        let mut app = App::new(config(), String::new(), Box::new(echo)).expect("app");
        app.handle_key(KeyEvent::new(KeyCode::Char('b'), KeyModifiers::ALT))
            .expect("key");
        assert_eq!(app.session.buffer().text(), "**text**");
        assert_eq!(app.session.buffer().selected_text(), "text");
    }
}
