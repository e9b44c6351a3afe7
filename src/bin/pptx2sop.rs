//! CLI binary for pptx2sop.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ConversionConfig`, then either runs a batch or serves the
//! web form.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pptx2sop::prompts::load_prompt;
use pptx2sop::{
    collect_decks, inspect, inspect_template, BatchOutput, ConversionConfig,
    ConversionProgressCallback, ProgressCallback, SopError, SopGenerator, TemplateReport,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per deck. Works when decks finish out
/// of order (`--concurrency > 1`).
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} decks  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} deck(s)…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, file: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(file.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, output: &Path) {
        let secs = self.elapsed_secs(index);
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        let msg = if error.chars().count() > 100 {
            let cut: String = error.chars().take(99).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_files: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every deck in a folder
  pptx2sop --input input/ --template templates/LS-sop.docx

  # One deck, custom prompt file, identifier prefix
  pptx2sop -i wi_cassette.pptx -p prompts/sop.txt --id-prefix MANGO-2024-

  # Show what the model would be sent (no API key needed)
  pptx2sop --inspect-only -i input/

  # Check a template's placeholders before using it
  pptx2sop --inspect-template templates/LS-sop.docx

  # Machine-readable results
  pptx2sop -i input/ --json > results.json

  # Web form on http://localhost:5000
  pptx2sop --web

ENVIRONMENT VARIABLES:
  CLAUDE_API_KEY     Anthropic API key
  USER_NAME          Author recorded in the revision table
  MANGO_ID_PREFIX    Prefix for synthesized document identifiers
  RUST_LOG           Log filter (overrides --verbose / --quiet)
"#;

/// Convert PowerPoint work instructions into Word SOP documents.
#[derive(Parser, Debug)]
#[command(
    name = "pptx2sop",
    version,
    about = "Convert PowerPoint work instructions into Word SOP documents using an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// A .pptx file, or a directory of them.
    #[arg(short, long, required_unless_present_any = ["web", "inspect_template"])]
    input: Option<PathBuf>,

    /// Word template (.docx).
    #[arg(short, long, env = "PPTX2SOP_TEMPLATE", default_value = "templates/LS-sop.docx")]
    template: PathBuf,

    /// Instruction prompt: a path to a text file, or the prompt text itself.
    #[arg(short, long, env = "PPTX2SOP_PROMPT")]
    prompt: Option<String>,

    /// Anthropic API key.
    #[arg(short = 'k', long, env = "CLAUDE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory rendered documents are written to.
    #[arg(short, long, env = "PPTX2SOP_OUTPUT_DIR", default_value = "outputs")]
    output_dir: PathBuf,

    /// Author recorded in the document and revision table.
    #[arg(long, env = "USER_NAME", default_value = pptx2sop::config::DEFAULT_USER_NAME)]
    user_name: String,

    /// Prefix for synthesized document identifiers.
    #[arg(long, env = "MANGO_ID_PREFIX")]
    id_prefix: Option<String>,

    /// Model identifier.
    #[arg(long, env = "PPTX2SOP_MODEL", default_value = pptx2sop::config::DEFAULT_MODEL)]
    model: String,

    /// Max tokens the model may generate per deck.
    #[arg(long, env = "PPTX2SOP_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: u32,

    /// Model call timeout in seconds.
    #[arg(long, env = "PPTX2SOP_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Decks whose model calls may be in flight at once.
    #[arg(short, long, env = "PPTX2SOP_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Print the batch result as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PPTX2SOP_NO_PROGRESS")]
    no_progress: bool,

    /// Extract and print each deck's text; no model call.
    #[arg(long)]
    inspect_only: bool,

    /// List the placeholders and row loops a .docx template uses and flag
    /// any the generated documents cannot fill; no deck needed.
    #[arg(long, value_name = "DOCX")]
    inspect_template: Option<PathBuf>,

    /// Serve the upload form instead of running a batch.
    #[arg(long)]
    web: bool,

    /// Address the web form binds to.
    #[arg(long, env = "PPTX2SOP_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port the web form listens on.
    #[arg(long, env = "PPTX2SOP_PORT", default_value_t = 5000)]
    port: u16,

    /// Folder template names submitted through the web form resolve in.
    #[arg(long, env = "PPTX2SOP_TEMPLATE_DIR", default_value = "templates")]
    template_dir: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PPTX2SOP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PPTX2SOP_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level per-deck logs.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && !cli.web
        && !cli.inspect_only
        && cli.inspect_template.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    // ── Inspect modes ────────────────────────────────────────────────────
    if let Some(ref template) = cli.inspect_template {
        return run_inspect_template(template, cli.json);
    }
    if cli.inspect_only {
        return run_inspect(&cli).await;
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    if cli.web {
        return run_web(&cli, config).await;
    }

    // ── Batch mode ───────────────────────────────────────────────────────
    let input = cli.input.as_deref().context("--input is required")?;
    let decks = match collect_decks(input) {
        Ok(decks) => decks,
        Err(SopError::NoDecksFound { path }) => {
            eprintln!("No PowerPoint files found in {}", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to collect input decks"),
    };

    let generator = SopGenerator::new(&config).context("Configuration error")?;
    let batch = generator.process_batch(&decks).await;

    if cli.json {
        let json = serde_json::to_string_pretty(&batch).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&batch);
    }

    Ok(())
}

async fn run_inspect(cli: &Cli) -> Result<()> {
    let input = cli.input.as_deref().context("--input is required")?;
    let decks = match collect_decks(input) {
        Ok(decks) => decks,
        Err(SopError::NoDecksFound { path }) => {
            eprintln!("No PowerPoint files found in {}", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to collect input decks"),
    };

    let mut report = Vec::with_capacity(decks.len());
    for deck in &decks {
        match inspect(deck).await {
            Ok(text) => {
                if !cli.json {
                    println!("{text}");
                }
                report.push(serde_json::json!({ "file": deck, "text": text }));
            }
            Err(e) => {
                eprintln!("{} {}", red("✗"), e);
                report.push(serde_json::json!({ "file": deck, "error": e }));
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
    }
    Ok(())
}

fn run_inspect_template(path: &Path, json: bool) -> Result<()> {
    let report = inspect_template(path).context("Failed to read template")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
    } else {
        print_template_report(&report);
    }
    if !report.is_renderable() {
        anyhow::bail!(
            "template '{}' cannot be rendered: {} unknown field(s), {} unsupported tag(s)",
            path.display(),
            report.unknown.len(),
            report.unsupported.len()
        );
    }
    Ok(())
}

fn print_template_report(report: &TemplateReport) {
    println!("{} {}", cyan("◆"), bold(&report.path.display().to_string()));
    println!("  parts: {}", report.parts.join(", "));
    println!("  placeholders ({}):", report.placeholders.len());
    for name in &report.placeholders {
        let mark = if report.unknown.contains(name) { red("✗") } else { green("✓") };
        println!("    {mark} {name}");
    }
    for row_loop in &report.row_loops {
        println!("  row loop: {} in {}", row_loop.variable, row_loop.list);
    }
    for name in report.unknown.iter().filter(|n| !report.placeholders.contains(n)) {
        println!("  {} unknown loop list: {name}", red("✗"));
    }
    for tag in &report.unsupported {
        println!("  {} unsupported tag: {}", red("✗"), dim(tag));
    }
}

#[cfg(feature = "web")]
async fn run_web(cli: &Cli, config: ConversionConfig) -> Result<()> {
    use pptx2sop::web::{start_server, AppState};

    let addr: std::net::SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    std::fs::create_dir_all(&cli.template_dir)
        .with_context(|| format!("Failed to create {}", cli.template_dir.display()))?;

    let mut config = config;
    if config.template_path == Path::new("templates/LS-sop.docx") {
        config.template_path = cli.template_dir.join(pptx2sop::web::DEFAULT_TEMPLATE_NAME);
    }

    eprintln!("{} Serving SOP generator on http://{}", cyan("◆"), addr);
    start_server(addr, AppState::new(config, cli.template_dir.clone()))
        .await
        .context("Web server failed")
}

#[cfg(not(feature = "web"))]
async fn run_web(_cli: &Cli, _config: ConversionConfig) -> Result<()> {
    anyhow::bail!("this build does not include the web form; rebuild with --features web")
}

fn print_summary(batch: &BatchOutput) {
    let stats = &batch.stats;
    let mark = if stats.failed_files == 0 {
        green("✔")
    } else if stats.processed_files == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{} Completed: {}/{} files processed successfully",
        mark, stats.processed_files, stats.total_files
    );
    if stats.degraded_files > 0 {
        eprintln!(
            "   {} document(s) need manual review (model reply was not JSON)",
            stats.degraded_files
        );
    }
    for path in batch.successful() {
        println!("  → {}", bold(&path.display().to_string()));
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out  —  {}ms total",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
        stats.total_duration_ms,
    );
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .template_path(&cli.template)
        .output_dir(&cli.output_dir)
        .user_name(&cli.user_name)
        .model(&cli.model)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .concurrency(cli.concurrency);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref prefix) = cli.id_prefix {
        builder = builder.id_prefix(prefix);
    }
    if let Some(ref prompt) = cli.prompt {
        builder = builder.prompt(load_prompt(prompt).await.context("Failed to load prompt")?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
