use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use tracing_subscriber::EnvFilter;

use rstlive::app::{run_interactive, App, AppConfig};
use rstlive::convert::{self, CommandConverter, Converter, DEFAULT_ARGS, DEFAULT_PROGRAM};
use rstlive::diagnostics::Severity;
use rstlive::pipeline::run_once;
use rstlive::prefs;
use rstlive::preview::render_html;
use rstlive::theme::{resolve_syntax_theme, Palette};

const LOG_ENV: &str = "RSTLIVE_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "rstlive",
    version,
    about = "Edit reStructuredText with a live preview and inline diagnostics"
)]
struct Cli {
    /// Source file path. Use '-' to read from stdin. A missing file starts empty.
    input: Option<String>,

    /// Force the interactive editor.
    #[arg(short, long)]
    interactive: bool,

    /// Convert once and print the rendered preview to stdout.
    #[arg(long, conflicts_with = "interactive")]
    plain: bool,

    /// Convert once and print diagnostics; exit 1 if any error was reported.
    #[arg(long, conflicts_with_all = ["interactive", "plain"])]
    check: bool,

    /// Reload when the file changes on disk (file input only).
    #[arg(long, conflicts_with_all = ["plain", "check"])]
    watch: bool,

    /// Converter program reading source on stdin and writing HTML to stdout.
    #[arg(long, value_name = "PROGRAM")]
    converter: Option<String>,

    /// Argument passed to the converter program. Repeatable.
    #[arg(long = "converter-arg", value_name = "ARG", allow_hyphen_values = true)]
    converter_args: Vec<String>,

    /// Quiet period after the last edit before reconverting.
    #[arg(long, value_name = "MS", default_value_t = 300)]
    debounce_ms: u64,

    /// Preferences file (defaults to $XDG_CONFIG_HOME/rstlive/prefs.json).
    #[arg(long, value_name = "PATH")]
    prefs: Option<PathBuf>,

    /// Write logs to this file. Filter with RSTLIVE_LOG.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

struct LoadResult {
    path: Option<PathBuf>,
    source: String,
}

enum InputSource {
    File(PathBuf),
    Stdin,
    Untitled,
}

fn detect_input(cli: &Cli) -> Result<InputSource> {
    match cli.input.as_deref() {
        Some("-") => Ok(InputSource::Stdin),
        Some(path) => Ok(InputSource::File(PathBuf::from(path))),
        None if !io::stdin().is_terminal() => Ok(InputSource::Stdin),
        None if cli.plain || cli.check => Err(anyhow!(
            "No input provided. Pass a reStructuredText file or pipe it into stdin."
        )),
        None => Ok(InputSource::Untitled),
    }
}

fn read_input(source: &InputSource, allow_missing: bool) -> Result<LoadResult> {
    match source {
        InputSource::File(path) if allow_missing && !path.exists() => {
            tracing::info!(path = %path.display(), "starting a new file");
            Ok(LoadResult {
                path: Some(path.clone()),
                source: String::new(),
            })
        }
        InputSource::File(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(LoadResult {
                path: Some(path.clone()),
                source,
            })
        }
        InputSource::Stdin => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read source from stdin")?;
            Ok(LoadResult {
                path: None,
                source: buf,
            })
        }
        InputSource::Untitled => Ok(LoadResult {
            path: None,
            source: String::new(),
        }),
    }
}

fn default_interactive(input: &InputSource) -> bool {
    !matches!(input, InputSource::Stdin) && io::stdout().is_terminal()
}

/// Logging goes to a file only; the terminal belongs to the editor.
fn init_logging(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|err| anyhow!("Failed to install logger: {err}"))?;
    Ok(())
}

fn select_converter(cli: &Cli, path: Option<&Path>) -> Box<dyn Converter> {
    match cli.converter.as_deref() {
        Some(program) if cli.converter_args.is_empty() && program == DEFAULT_PROGRAM => {
            Box::new(CommandConverter::new(program, DEFAULT_ARGS.iter().copied()))
        }
        Some(program) => Box::new(CommandConverter::new(program, cli.converter_args.clone())),
        None => convert::converter_for_path(path),
    }
}

fn display_name(path: Option<&Path>) -> String {
    path.map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string())
}

fn run_plain(converter: &dyn Converter, load: &LoadResult) -> Result<ExitCode> {
    let rendered = run_once(converter, &load.source)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Failed to convert {}", display_name(load.path.as_deref())))?;

    let syntax_set = SyntaxSet::load_defaults_newlines();
    let theme_set = ThemeSet::load_defaults();
    let theme = resolve_syntax_theme(&theme_set, true);
    let document = render_html(&rendered.html, &syntax_set, &theme, Palette::dark());
    println!("{}", document.plain_text());
    Ok(ExitCode::SUCCESS)
}

fn run_check(converter: &dyn Converter, load: &LoadResult) -> Result<ExitCode> {
    let name = display_name(load.path.as_deref());
    let rendered = run_once(converter, &load.source)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Failed to convert {name}"))?;

    for diag in &rendered.diagnostics {
        println!(
            "{name}:{}: {}/{}: {}",
            diag.line, diag.severity, diag.level, diag.message
        );
    }
    let has_errors = rendered
        .diagnostics
        .iter()
        .any(|diag| diag.severity == Severity::Error);
    Ok(if has_errors {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let input = detect_input(&cli)?;
    if cli.watch && !matches!(input, InputSource::File(_)) {
        return Err(anyhow!("--watch requires file input"));
    }

    let interactive = if cli.interactive {
        true
    } else if cli.plain || cli.check {
        false
    } else {
        default_interactive(&input)
    };

    let load = read_input(&input, interactive)?;
    let converter = select_converter(&cli, load.path.as_deref());
    tracing::info!(
        converter = converter.name(),
        path = %display_name(load.path.as_deref()),
        interactive,
        "starting"
    );

    if cli.check {
        return run_check(converter.as_ref(), &load);
    }
    if !interactive {
        return run_plain(converter.as_ref(), &load);
    }

    let prefs_path = cli.prefs.clone().or_else(prefs::default_path);
    let config = AppConfig {
        path: load.path,
        watch: cli.watch,
        debounce: Duration::from_millis(cli.debounce_ms),
        prefs_path,
    };
    let app = App::new(config, load.source, converter)?;
    run_interactive(app)?;
    Ok(ExitCode::SUCCESS)
}
