//! CLI binary for office2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use office2pdf::backend::candidate_table;
use office2pdf::office_locate::Locator;
use office2pdf::{
    diagnostics, probe_detailed, Attempt, ConversionConfig, ConversionObserver,
    ConversionOutcome, ConversionRequest, Converter, FailureReason, Observer,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner naming the backend currently being tried,
/// with one log line per skipped or failed backend.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionObserver for CliObserver {
    fn on_conversion_start(&self, source: &Path, backends: usize) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!(
            "{} ({backends} backends)",
            source.display()
        ));
    }

    fn on_backend_skipped(&self, backend: &str, reason: &FailureReason) {
        self.bar.println(format!(
            "  {} {:<8} {}",
            dim("–"),
            backend,
            dim(&format!("skipped: {reason}"))
        ));
    }

    fn on_attempt_start(&self, backend: &str, index: usize, total: usize) {
        self.bar
            .set_message(format!("trying {} ({}/{total})", bold(backend), index + 1));
    }

    fn on_attempt_failed(&self, backend: &str, reason: &FailureReason) {
        self.bar.println(format!(
            "  {} {:<8} {}",
            red("✗"),
            backend,
            red(&truncate(&reason.to_string(), 100))
        ));
    }

    fn on_conversion_complete(&self, _outcome: &ConversionOutcome) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert next to the input (report.docx -> report.pdf)
  office2pdf convert report.docx

  # Explicit output, Word first
  office2pdf --backends word,soffice convert memo.doc -o out/memo.pdf

  # Which converters are installed?
  office2pdf probe

  # Where did we look for them?
  office2pdf debug

  # HTTP service on port 8080
  office2pdf serve --port 8080

BACKENDS:
  soffice   LibreOffice, headless (Linux, macOS, Windows)
  word      Microsoft Word via osascript (macOS) or PowerShell COM (Windows)

ENVIRONMENT VARIABLES:
  OFFICE2PDF_BACKENDS      Backend order, comma-separated (default: soffice,word)
  OFFICE2PDF_TIMEOUT       Per-backend timeout in seconds (default: 120)
  OFFICE2PDF_SOFFICE       Extra soffice binary to try first
  OFFICE2PDF_PROFILE_DIR   Writable HOME for LibreOffice's user profile
  OFFICE2PDF_UPLOAD_DIR    Scratch directory for the HTTP service
  PORT                     HTTP port for `serve` (default: 5000)
  RUST_LOG                 Log filter, overrides --verbose / --quiet
"#;

/// Convert Word documents to PDF with LibreOffice or Microsoft Word.
#[derive(Parser, Debug)]
#[command(
    name = "office2pdf",
    version,
    about = "Convert Word documents to PDF with LibreOffice or Microsoft Word",
    long_about = "Convert .doc/.docx documents to PDF by driving whichever converter is \
installed: headless LibreOffice or Microsoft Word. Backends are tried in priority order \
until one succeeds.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Backend order, comma-separated (soffice, word).
    #[arg(long, global = true, env = "OFFICE2PDF_BACKENDS", value_delimiter = ',')]
    backends: Option<Vec<String>>,

    /// Per-backend timeout in seconds.
    #[arg(long, global = true, env = "OFFICE2PDF_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Extra soffice binary (path or command name) to try before the built-in list.
    #[arg(long, global = true, env = "OFFICE2PDF_SOFFICE")]
    soffice: Vec<PathBuf>,

    /// Writable HOME for LibreOffice's user profile.
    #[arg(long, global = true, env = "OFFICE2PDF_PROFILE_DIR")]
    profile_dir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OFFICE2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OFFICE2PDF_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "OFFICE2PDF_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one document to PDF.
    Convert {
        /// The .doc/.docx file to convert.
        input: PathBuf,

        /// Where to write the PDF (default: <input stem>.pdf beside the input).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the ConversionOutcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report which backends are available.
    Probe {
        /// Print the status list as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the environment diagnostics report as JSON.
    Debug,

    /// Run the HTTP conversion service.
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (all interfaces).
        #[arg(long, env = "PORT", default_value_t = 5000)]
        port: u16,

        /// Scratch directory for uploads and converted files.
        #[arg(long, env = "OFFICE2PDF_UPLOAD_DIR", default_value = "uploads")]
        upload_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active; the
    // observer prints everything that matters.
    let show_progress = matches!(cli.command, Command::Convert { json: false, .. })
        && !g.quiet
        && !g.no_progress;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(g)?;
    let locator = Arc::new(Locator::new(candidate_table(&config)));
    let converter = Converter::from_config_with_locator(&config, Arc::clone(&locator))
        .context("Failed to set up conversion backends")?;

    match cli.command {
        Command::Convert {
            ref input,
            ref output,
            json,
        } => {
            let observer: Option<Observer> = if show_progress {
                Some(CliObserver::new() as Arc<dyn ConversionObserver>)
            } else {
                None
            };
            let converter = match observer {
                Some(obs) => converter.with_observer(obs),
                None => converter,
            };
            let output = output.clone().unwrap_or_else(|| default_output(input));
            run_convert(&converter, &config, input, &output, json, g.quiet).await
        }
        Command::Probe { json } => {
            let statuses = probe_detailed(converter.registry()).await;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&statuses).context("Failed to serialise status")?
                );
            } else {
                for s in &statuses {
                    match &s.reason {
                        None => println!("  {} {:<8} available", green("✓"), s.name),
                        Some(reason) => {
                            println!("  {} {:<8} {}", red("✗"), s.name, dim(&reason.to_string()))
                        }
                    }
                }
                println!("{}", office2pdf::probe::summary(&statuses));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Debug => {
            let report = tokio::task::spawn_blocking(move || diagnostics::collect(&locator))
                .await
                .context("Diagnostics task failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
            Ok(ExitCode::SUCCESS)
        }
        #[cfg(feature = "server")]
        Command::Serve { port, upload_dir } => {
            let state = office2pdf::server::AppState::from_parts(converter, config, locator, upload_dir);
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
            office2pdf::server::serve(state, addr)
                .await
                .with_context(|| format!("HTTP server on {addr} failed"))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_convert(
    converter: &Converter,
    config: &ConversionConfig,
    input: &Path,
    output: &Path,
    json: bool,
    quiet: bool,
) -> Result<ExitCode> {
    let request = ConversionRequest::with_extensions(input, output, &config.allowed_extensions)
        .context("Invalid conversion request")?;
    let outcome = converter.convert(&request).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
        return Ok(exit_code(&outcome));
    }

    match &outcome {
        ConversionOutcome::Success(pdf) => {
            if !quiet {
                eprintln!(
                    "{}  {}  {}  via {}  {}",
                    green("✔"),
                    bold(&pdf.output_path.display().to_string()),
                    dim(&human_size(pdf.byte_size)),
                    pdf.backend,
                    dim(&format!("{}ms", pdf.elapsed_ms)),
                );
            }
            println!("{}", pdf.output_path.display());
        }
        ConversionOutcome::Failure { attempts } => {
            eprintln!("{} Conversion failed: {}", red("✘"), input.display());
            print_attempts(attempts);
        }
    }
    Ok(exit_code(&outcome))
}

fn print_attempts(attempts: &[Attempt]) {
    if attempts.is_empty() {
        eprintln!("  {}", yellow("no backends are configured (see --backends)"));
        return;
    }
    for a in attempts {
        let mark = if a.is_skip() { yellow("skipped") } else { red("failed ") };
        eprintln!("  {:<8} {}  {}", a.backend, mark, a.reason);
    }
}

fn exit_code(outcome: &ConversionOutcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Map global CLI args to `ConversionConfig`.
fn build_config(g: &GlobalArgs) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder().timeout_secs(g.timeout);
    if let Some(ref order) = g.backends {
        builder = builder.backend_order(order.iter().cloned());
    }
    if let Some(ref dir) = g.profile_dir {
        builder = builder.profile_dir(dir);
    }
    for path in &g.soffice {
        builder = builder.extra_candidate(path);
    }
    builder.build().context("Invalid configuration")
}

/// `dir/report.docx` → `dir/report.pdf`.
fn default_output(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}\u{2026}")
}
