//! Live reStructuredText editing in the terminal: a source buffer, a
//! rendered preview, and the converter's diagnostics mapped back onto the
//! source lines.

pub mod app;
pub mod buffer;
pub mod convert;
pub mod debounce;
pub mod diagnostics;
pub mod export;
pub mod format;
pub mod html;
pub mod lines;
pub mod overlay;
pub mod panel;
pub mod pipeline;
pub mod prefs;
pub mod preview;
pub mod session;
pub mod theme;
