//! Colours for the light and dark modes.

use ratatui::style::Color;
use syntect::highlighting::{Theme, ThemeSet};

use crate::diagnostics::Severity;

const DARK_SYNTAX_THEME: &str = "base16-ocean.dark";
const LIGHT_SYNTAX_THEME: &str = "InspiredGitHub";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub text: Color,
    pub muted: Color,
    pub border: Color,
    pub headings: [Color; 3],
    pub inline_code: Color,
    pub code_fallback: Color,
    pub link: Color,
    pub error: Color,
    pub warning: Color,
    pub error_line: Color,
    pub warning_line: Color,
    pub selection: Color,
    pub focus: Color,
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            text: Color::Reset,
            muted: Color::DarkGray,
            border: Color::DarkGray,
            headings: [Color::Yellow, Color::LightMagenta, Color::LightCyan],
            inline_code: Color::LightYellow,
            code_fallback: Color::LightGreen,
            link: Color::Cyan,
            error: Color::LightRed,
            warning: Color::Yellow,
            error_line: Color::Rgb(72, 24, 24),
            warning_line: Color::Rgb(64, 56, 16),
            selection: Color::Rgb(40, 60, 110),
            focus: Color::Yellow,
        }
    }

    pub fn light() -> Self {
        Self {
            text: Color::Reset,
            muted: Color::Gray,
            border: Color::Gray,
            headings: [Color::Blue, Color::Magenta, Color::Cyan],
            inline_code: Color::Rgb(160, 80, 0),
            code_fallback: Color::Green,
            link: Color::Blue,
            error: Color::Red,
            warning: Color::Rgb(180, 120, 0),
            error_line: Color::Rgb(254, 226, 226),
            warning_line: Color::Rgb(254, 243, 199),
            selection: Color::Rgb(191, 219, 254),
            focus: Color::Blue,
        }
    }

    pub fn for_mode(dark: bool) -> Self {
        if dark {
            Self::dark()
        } else {
            Self::light()
        }
    }

    pub fn heading(&self, level: u8) -> Color {
        let idx = usize::from(level.clamp(1, 3)) - 1;
        self.headings[idx]
    }

    pub fn severity(&self, severity: Severity) -> Color {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
        }
    }

    pub fn severity_line(&self, severity: Severity) -> Color {
        match severity {
            Severity::Error => self.error_line,
            Severity::Warning => self.warning_line,
        }
    }
}

/// Picks the syntect theme for the mode, falling back to any bundled theme.
pub fn resolve_syntax_theme(theme_set: &ThemeSet, dark: bool) -> Theme {
    let name = if dark {
        DARK_SYNTAX_THEME
    } else {
        LIGHT_SYNTAX_THEME
    };
    if let Some(theme) = theme_set.themes.get(name) {
        return theme.clone();
    }
    theme_set
        .themes
        .values()
        .next()
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_themes_resolve_for_both_modes() {
        let themes = ThemeSet::load_defaults();
        assert_eq!(
            resolve_syntax_theme(&themes, true).name.as_deref(),
            themes.themes.get(DARK_SYNTAX_THEME).and_then(|t| t.name.as_deref())
        );
        assert!(themes.themes.contains_key(LIGHT_SYNTAX_THEME));
    }

    #[test]
    fn heading_levels_past_three_share_a_colour() {
        let palette = Palette::dark();
        assert_eq!(palette.heading(5), palette.heading(3));
        assert_eq!(palette.heading(0), palette.heading(1));
    }
}
