//! One editing session: the buffer plus the diagnostic views derived from it.
//!
//! Conversion results are applied wholesale. The panel and the overlay are
//! always rebuilt from the same diagnostic list, and the overlay is synced
//! against the buffer as it is when the result arrives, which may already be
//! newer than the text that was converted.

use crate::buffer::EditBuffer;
use crate::diagnostics::Diagnostic;
use crate::overlay::HighlightOverlay;
use crate::panel::{DiagnosticPanel, Navigation, PanelState};
use crate::pipeline::Rendered;

#[derive(Debug)]
pub struct Session {
    buffer: EditBuffer,
    panel: DiagnosticPanel,
    overlay: HighlightOverlay,
    html: String,
    line_height: f32,
    generation: u64,
    applied: Option<u64>,
}

impl Session {
    pub fn new(text: impl Into<String>, line_height: f32) -> Self {
        Self {
            buffer: EditBuffer::new(text),
            panel: DiagnosticPanel::new(),
            overlay: HighlightOverlay::new(),
            html: String::new(),
            line_height,
            generation: 0,
            applied: None,
        }
    }

    pub fn buffer(&self) -> &EditBuffer {
        &self.buffer
    }

    /// Caret and selection changes that leave the text alone.
    pub fn cursor(&mut self) -> &mut EditBuffer {
        &mut self.buffer
    }

    /// Runs a text edit and returns the new generation to schedule.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut EditBuffer) -> R) -> (u64, R) {
        let out = f(&mut self.buffer);
        self.generation += 1;
        (self.generation, out)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the preview may not reflect the latest edit yet.
    pub fn is_stale(&self) -> bool {
        self.applied != Some(self.generation)
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn panel(&self) -> &DiagnosticPanel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut DiagnosticPanel {
        &mut self.panel
    }

    pub fn overlay(&self) -> &HighlightOverlay {
        &self.overlay
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.panel.diagnostics()
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    /// Changes the line metric and recomputes highlight geometry.
    pub fn set_line_height(&mut self, line_height: f32) {
        self.line_height = line_height;
        self.sync_overlay();
    }

    /// Replaces preview and diagnostics with a finished conversion.
    pub fn apply(&mut self, generation: u64, rendered: Rendered) {
        self.html = rendered.html;
        self.panel.update(rendered.diagnostics);
        self.sync_overlay();
        self.applied = Some(generation);
    }

    fn sync_overlay(&mut self) {
        if self.panel.is_visible() {
            self.overlay
                .sync(self.panel.diagnostics(), self.buffer.text(), self.line_height);
        } else {
            self.overlay.clear();
        }
    }

    /// Replaces the buffer text from outside (file reload) and returns the
    /// generation to schedule.
    pub fn reload(&mut self, text: impl Into<String>) -> u64 {
        self.buffer.reload(text);
        self.generation += 1;
        self.generation
    }

    pub fn toggle_panel(&mut self) -> PanelState {
        self.panel.toggle()
    }

    /// Activates panel entry `index`, moving the selection to its line.
    pub fn activate(&mut self, index: usize, viewport_height: f32) -> Option<Navigation> {
        self.panel
            .activate(index, &mut self.buffer, self.line_height, viewport_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    fn rendered(lines: &[usize]) -> Rendered {
        Rendered {
            html: "<p>x</p>".to_string(),
            diagnostics: lines
                .iter()
                .map(|line| Diagnostic {
                    severity: Severity::Error,
                    level: 3,
                    line: *line,
                    message: "bad".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn apply_updates_panel_and_overlay_together() {
        let mut session = Session::new("a\nb\nc", 1.0);
        session.apply(0, rendered(&[2, 99]));
        assert_eq!(session.panel().error_count(), 2);
        assert_eq!(session.overlay().regions().len(), 1);
        assert!(!session.is_stale());
    }

    #[test]
    fn empty_result_hides_panel_and_clears_overlay() {
        let mut session = Session::new("a\nb\nc", 1.0);
        session.apply(0, rendered(&[1]));
        session.apply(0, rendered(&[]));
        assert!(!session.panel().is_visible());
        assert!(session.overlay().is_empty());
    }

    #[test]
    fn edits_bump_generation_and_mark_stale() {
        let mut session = Session::new("", 1.0);
        session.apply(0, rendered(&[]));
        let (generation, ()) = session.edit(|buf| buf.insert("x"));
        assert_eq!(generation, 1);
        assert!(session.is_stale());
        session.apply(generation, rendered(&[]));
        assert!(!session.is_stale());
    }

    #[test]
    fn overlay_uses_buffer_at_apply_time() {
        let mut session = Session::new("a\nb\nc", 1.0);
        // The conversion saw three lines, but the user deleted two meanwhile.
        session.edit(|buf| buf.set_text("a"));
        session.apply(0, rendered(&[3]));
        assert!(session.overlay().is_empty());
        assert_eq!(session.panel().error_count(), 1);
    }

    #[test]
    fn line_height_change_rescales_regions() {
        let mut session = Session::new("a\nb\nc", 1.0);
        session.apply(0, rendered(&[3]));
        session.set_line_height(18.0);
        assert_eq!(session.overlay().regions()[0].top, 36.0);
    }
}
