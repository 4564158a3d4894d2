//! Diagnostic summary panel: counts, entry list, collapse state, navigation.

use crate::buffer::EditBuffer;
use crate::diagnostics::{Diagnostic, Severity};
use crate::lines::{self, LineRange};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanelState {
    #[default]
    Expanded,
    Collapsed,
}

/// Where an activated entry moved the editor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Navigation {
    pub line: usize,
    pub selection: LineRange,
    /// Vertical scroll offset that puts the target line mid-viewport, in the
    /// same unit as the line height. Never negative.
    pub scroll_top: f32,
}

/// Selects source line `line` (1-based) in `buffer` and computes the scroll
/// offset that centres it.
///
/// A line past the end of the buffer selects the empty range at end of text.
pub fn navigate_to_line(
    buffer: &mut EditBuffer,
    line: usize,
    line_height: f32,
    viewport_height: f32,
) -> Navigation {
    let selection = lines::line_range(buffer.text(), line);
    buffer.select(selection.start, selection.end);

    let line_index = lines::line_index_of(buffer.text(), selection.start);
    let scroll_top = (line_index as f32 * line_height - viewport_height / 2.0).max(0.0);
    Navigation {
        line,
        selection,
        scroll_top,
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticPanel {
    state: PanelState,
    diagnostics: Vec<Diagnostic>,
    selected: usize,
}

impl DiagnosticPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the listed diagnostics. The collapse state is left alone.
    pub fn update(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics = diagnostics;
        self.selected = self.selected.min(self.diagnostics.len().saturating_sub(1));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn is_collapsed(&self) -> bool {
        self.state == PanelState::Collapsed
    }

    pub fn toggle(&mut self) -> PanelState {
        self.state = match self.state {
            PanelState::Expanded => PanelState::Collapsed,
            PanelState::Collapsed => PanelState::Expanded,
        };
        self.state
    }

    /// The panel shows whenever there is something to show.
    pub fn is_visible(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == severity)
            .count()
    }

    pub fn summary(&self) -> String {
        let errors = self.error_count();
        let warnings = self.warning_count();
        format!(
            "{errors} error{} · {warnings} warning{}",
            if errors == 1 { "" } else { "s" },
            if warnings == 1 { "" } else { "s" }
        )
    }

    pub fn selected(&self) -> Option<usize> {
        (!self.diagnostics.is_empty()).then_some(self.selected)
    }

    pub fn selected_diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostics.get(self.selected)
    }

    pub fn select(&mut self, index: usize) {
        if index < self.diagnostics.len() {
            self.selected = index;
        }
    }

    pub fn select_next(&mut self) {
        let len = self.diagnostics.len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    pub fn select_prev(&mut self) {
        let len = self.diagnostics.len();
        if len > 0 {
            self.selected = self.selected.checked_sub(1).unwrap_or(len - 1);
        }
    }

    /// Navigates `buffer` to the line of entry `index`.
    pub fn activate(
        &mut self,
        index: usize,
        buffer: &mut EditBuffer,
        line_height: f32,
        viewport_height: f32,
    ) -> Option<Navigation> {
        let line = self.diagnostics.get(index)?.line;
        self.selected = index;
        Some(navigate_to_line(buffer, line, line_height, viewport_height))
    }
}
