//! Line highlight overlay for the source pane.

use crate::diagnostics::{Diagnostic, Severity};
use crate::lines::line_count;

/// One highlighted source line.
///
/// `top` and `height` are in the caller's layout unit (rows in the terminal),
/// derived from the line index and the line height passed to
/// [`HighlightOverlay::sync`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HighlightRegion {
    pub line_index: usize,
    pub top: f32,
    pub height: f32,
    pub severity: Severity,
}

/// The set of highlight regions for the current diagnostics.
///
/// Every sync replaces the whole set; nothing carries over between cycles.
#[derive(Debug, Default)]
pub struct HighlightOverlay {
    regions: Vec<HighlightRegion>,
}

impl HighlightOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the overlay from `diagnostics` against the current `text`.
    ///
    /// Diagnostics pointing past the last line of `text` get no region.
    pub fn sync(
        &mut self,
        diagnostics: &[Diagnostic],
        text: &str,
        line_height: f32,
    ) -> &[HighlightRegion] {
        let lines = line_count(text);
        self.regions.clear();
        self.regions.extend(diagnostics.iter().filter_map(|diag| {
            let line_index = diag.line.checked_sub(1)?;
            if line_index >= lines {
                return None;
            }
            Some(HighlightRegion {
                line_index,
                top: line_index as f32 * line_height,
                height: line_height,
                severity: diag.severity,
            })
        }));
        &self.regions
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn regions(&self) -> &[HighlightRegion] {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The most severe region on `line_index`, if any.
    pub fn severity_at(&self, line_index: usize) -> Option<Severity> {
        self.regions
            .iter()
            .filter(|region| region.line_index == line_index)
            .map(|region| region.severity)
            .max_by_key(|severity| matches!(severity, Severity::Error))
    }
}
