//! Source → HTML converters.
//!
//! The converter is a black box to the rest of the editor: source text in,
//! HTML body out. reStructuredText goes through an external docutils program;
//! markdown is rendered in process.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;

use pulldown_cmark::{html, Options, Parser as MdParser};
use regex::Regex;
use thiserror::Error;

/// Default external converter.
pub const DEFAULT_PROGRAM: &str = "rst2html5";

/// docutils flags: report warnings and errors, never halt on them.
pub const DEFAULT_ARGS: &[&str] = &["--report=2", "--halt=5"];

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error talking to `{program}`")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("`{program}` produced non-UTF-8 output")]
    Utf8 { program: String },
    #[error("{0}")]
    Other(String),
}

pub trait Converter: Send {
    /// Short name shown in the status line.
    fn name(&self) -> &str;

    /// Renders `source` to an HTML fragment.
    fn render(&self, source: &str) -> Result<String, ConvertError>;
}

impl<F> Converter for F
where
    F: Fn(&str) -> Result<String, ConvertError> + Send,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn render(&self, source: &str) -> Result<String, ConvertError> {
        self(source)
    }
}

/// Runs an external program with the source on stdin and HTML on stdout.
#[derive(Clone, Debug)]
pub struct CommandConverter {
    program: String,
    args: Vec<OsString>,
}

impl CommandConverter {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn docutils() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_ARGS.iter().copied())
    }
}

impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn render(&self, source: &str) -> Result<String, ConvertError> {
        if source.trim().is_empty() {
            return Ok(String::new());
        }

        let program = self.program.clone();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Feed stdin from a separate thread so a large document cannot deadlock
        // against a full stdout pipe.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConvertError::Other(format!("`{program}` has no stdin")))?;
        let input = source.to_owned();
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        // Both pipes drain together; docutils can report more to stderr than
        // the pipe buffer holds before it writes any HTML.
        let output = child.wait_with_output().map_err(|source| ConvertError::Io {
            program: program.clone(),
            source,
        })?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(source)) if source.kind() != io::ErrorKind::BrokenPipe => {
                return Err(ConvertError::Io { program, source });
            }
            Ok(Err(_)) => {}
            Err(_) => {
                return Err(ConvertError::Other(format!(
                    "stdin writer for `{program}` panicked"
                )));
            }
        }

        if !output.status.success() && output.stdout.is_empty() {
            return Err(ConvertError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let html = String::from_utf8(output.stdout).map_err(|_| ConvertError::Utf8 { program })?;
        Ok(extract_body(&html))
    }
}

/// In-process markdown rendering. Never reports diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownConverter;

impl Converter for MarkdownConverter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn render(&self, source: &str) -> Result<String, ConvertError> {
        if source.trim().is_empty() {
            return Ok(String::new());
        }

        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);

        let parser = MdParser::new_ext(source, options);
        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}

pub fn is_markdown_path(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase);
    matches!(ext.as_deref(), Some("md" | "markdown" | "mdx"))
}

/// Picks the converter for a document: markdown files render in process,
/// everything else goes through docutils.
pub fn converter_for_path(path: Option<&Path>) -> Box<dyn Converter> {
    match path {
        Some(path) if is_markdown_path(path) => Box::new(MarkdownConverter),
        _ => Box::new(CommandConverter::docutils()),
    }
}

fn body_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<body[^>]*>(.*?)</body>")
            .unwrap_or_else(|err| panic!("body pattern is invalid: {err}"))
    })
}

fn document_open_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*<div class="document"[^>]*>"#)
            .unwrap_or_else(|err| panic!("document pattern is invalid: {err}"))
    })
}

fn trailing_div_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"</div>\s*$").unwrap_or_else(|err| panic!("div pattern is invalid: {err}"))
    })
}

/// Reduces a full HTML page to its body, without the docutils document wrapper.
pub fn extract_body(html: &str) -> String {
    let body = body_pattern()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map_or(html, |m| m.as_str());

    if document_open_pattern().is_match(body) {
        let body = document_open_pattern().replace(body, "");
        return trailing_div_pattern().replace(&body, "").trim().to_string();
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_PROGRAM: &str = "definitely-not-a-real-program-rstlive";

    #[test]
    fn body_is_unwrapped() {
        let page = "<!DOCTYPE html>\n<html><head><title>x</title></head>\n<body>\n<div class=\"document\">\n<p>Hi</p>\n</div>\n</body>\n</html>\n";
        assert_eq!(extract_body(page), "<p>Hi</p>");
    }

    #[test]
    fn fragment_without_body_is_kept() {
        assert_eq!(extract_body("  <p>frag</p>\n"), "<p>frag</p>");
    }

    #[test]
    fn html5_main_wrapper_is_left_alone() {
        let page = "<body>\n<main>\n<p>x</p>\n</main>\n</body>";
        assert_eq!(extract_body(page), "<main>\n<p>x</p>\n</main>");
    }

    #[test]
    fn markdown_renders_in_process() {
        let html = MarkdownConverter.render("# Title\n\n*hi*").unwrap_or_default();
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>hi</em>"));
    }

    #[test]
    fn blank_source_skips_the_program() {
        let converter = CommandConverter::new(MISSING_PROGRAM, Vec::<OsString>::new());
        assert_eq!(converter.render("  \n\t").ok(), Some(String::new()));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let converter = CommandConverter::new(MISSING_PROGRAM, Vec::<OsString>::new());
        let err = converter.render("Title\n=====\n").err();
        assert!(matches!(err, Some(ConvertError::Spawn { .. })), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn program_output_is_used_as_html() {
        let converter = CommandConverter::new("cat", Vec::<OsString>::new());
        let html = converter.render("<body><p>echo</p></body>").ok();
        assert_eq!(html.as_deref(), Some("<p>echo</p>"));
    }

    #[cfg(unix)]
    #[test]
    fn heavy_stderr_does_not_block_the_render() {
        let converter = CommandConverter::new(
            "sh",
            [
                "-c",
                "cat >/dev/null; head -c 200000 /dev/zero | tr '\\0' 'w' >&2; echo '<p>ok</p>'",
            ],
        );
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(converter.render("Title\n=====\n").ok());
        });
        let html = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("render finished");
        assert_eq!(html.as_deref(), Some("<p>ok</p>"));
    }

    #[test]
    fn picks_converter_by_extension() {
        assert_eq!(converter_for_path(Some(Path::new("a/README.md"))).name(), "markdown");
        assert_eq!(converter_for_path(Some(Path::new("index.rst"))).name(), DEFAULT_PROGRAM);
        assert_eq!(converter_for_path(None).name(), DEFAULT_PROGRAM);
    }
}
