//! Writing the source and the rendered document to disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// File name used when the buffer has no path of its own.
pub const DEFAULT_SOURCE_NAME: &str = "document.rst";

const PREVIEW_CSS: &str = r#"body{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,"Helvetica Neue",Arial,sans-serif;line-height:1.6;color:#1f2937;max-width:900px;margin:0 auto;padding:2rem;background-color:#fff}
#preview h1,#preview h2{font-weight:700;margin-top:1.5rem;margin-bottom:1rem}
#preview h1{font-size:1.875rem}#preview h2{font-size:1.5rem}#preview h3{font-size:1.25rem;font-weight:600}
#preview p{margin-bottom:1rem}
#preview a{color:#2563eb;text-decoration:underline}
#preview code{background-color:#f3f4f6;padding:.125rem .375rem;border-radius:.25rem;font-family:ui-monospace,monospace}
#preview pre{background-color:#1f2937;color:#f3f4f6;padding:1rem;border-radius:.5rem;overflow-x:auto;font-family:ui-monospace,monospace}
#preview blockquote{border-left:4px solid #d1d5db;padding-left:1rem;font-style:italic;color:#6b7280}
#preview table{border-collapse:collapse;width:100%}
#preview th,#preview td{border:1px solid #d1d5db;padding:.5rem 1rem}
#preview .system-message{border-left:4px solid #dc2626;background:#fef2f2;padding:.5rem 1rem}"#;

#[derive(Debug, Error)]
#[error("failed to write {}", path.display())]
pub struct ExportError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

fn write(path: &Path, contents: &str) -> Result<PathBuf, ExportError> {
    fs::write(path, contents).map_err(|source| ExportError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// Where the source should be saved: its own path, or `document.rst` in `dir`.
pub fn source_target(path: Option<&Path>, dir: &Path) -> PathBuf {
    path.map_or_else(|| dir.join(DEFAULT_SOURCE_NAME), Path::to_path_buf)
}

/// `<stem>.html` next to the source, or `document.html` in `dir`.
pub fn html_target(path: Option<&Path>, dir: &Path) -> PathBuf {
    match path {
        Some(path) => path.with_extension("html"),
        None => dir.join(DEFAULT_SOURCE_NAME).with_extension("html"),
    }
}

pub fn save_source(target: &Path, text: &str) -> Result<PathBuf, ExportError> {
    write(target, text)
}

/// Wraps a rendered body in a self-contained page.
pub fn standalone_html(title: &str, body: &str) -> String {
    let title = title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>{title}</title>\n<style>\n{PREVIEW_CSS}\n</style>\n</head>\n<body>\n<div id=\"preview\">\n{body}\n</div>\n</body>\n</html>\n"
    )
}

pub fn export_html(target: &Path, title: &str, body: &str) -> Result<PathBuf, ExportError> {
    write(target, &standalone_html(title, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_follow_the_source_path() {
        let dir = Path::new("/tmp/work");
        assert_eq!(
            html_target(Some(Path::new("docs/guide.rst")), dir),
            PathBuf::from("docs/guide.html")
        );
        assert_eq!(html_target(None, dir), dir.join("document.html"));
        assert_eq!(source_target(None, dir), dir.join("document.rst"));
    }

    #[test]
    fn standalone_page_embeds_body_and_escapes_title() {
        let page = standalone_html("a<b", "<p>hi</p>");
        assert!(page.contains("<title>a&lt;b</title>"));
        assert!(page.contains("<div id=\"preview\">\n<p>hi</p>\n</div>"));
    }

    #[test]
    fn writes_and_reports_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.html");
        let written = export_html(&target, "t", "<p>x</p>").expect("export");
        assert!(fs::read_to_string(written).expect("read back").contains("<p>x</p>"));

        let missing = dir.path().join("no/such/dir/file.rst");
        let err = save_source(&missing, "x").expect_err("missing dir");
        assert_eq!(err.path, missing);
    }
}
